//! OS path resolution for gateway state
//!
//! Everything lives under `~/.modelscan/`.

use ms_types::{GatewayError, GatewayResult};
use std::path::PathBuf;

/// Get the state directory
///
/// All platforms: `~/.modelscan/`
pub fn state_dir() -> GatewayResult<PathBuf> {
    let dir = dirs::home_dir()
        .ok_or_else(|| GatewayError::Corrupt("could not determine home directory".to_string()))?
        .join(".modelscan");

    Ok(dir)
}

/// Get the settings file path
pub fn settings_file() -> GatewayResult<PathBuf> {
    Ok(state_dir()?.join("settings.yaml"))
}

/// Get the SQLite database path
pub fn database_file() -> GatewayResult<PathBuf> {
    Ok(state_dir()?.join("modelscan.db"))
}

/// Get the PID file path
pub fn pid_file() -> GatewayResult<PathBuf> {
    Ok(state_dir()?.join("modelscan.pid"))
}

/// Get the logs directory
pub fn logs_dir() -> GatewayResult<PathBuf> {
    Ok(state_dir()?.join("logs"))
}

/// Get the daemon log file path
pub fn daemon_log_file() -> GatewayResult<PathBuf> {
    Ok(logs_dir()?.join("daemon.log"))
}

/// Ensure a directory exists, creating it if necessary.
///
/// On unix the directory is created mode 0700; the PID file and settings
/// live here and should not be world-readable by default.
pub fn ensure_dir_exists(path: &PathBuf) -> GatewayResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| {
            GatewayError::Transient(format!(
                "failed to create directory {}: {}",
                path.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(path, perms).map_err(|e| {
                GatewayError::Transient(format!(
                    "failed to set permissions on {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_dir() {
        let dir = state_dir().unwrap();
        assert!(!dir.as_os_str().is_empty());
        assert!(dir.to_string_lossy().ends_with(".modelscan"));
    }

    #[test]
    fn test_settings_file() {
        let file = settings_file().unwrap();
        assert!(file.to_string_lossy().ends_with("settings.yaml"));
    }

    #[test]
    fn test_pid_file() {
        let file = pid_file().unwrap();
        assert!(file.to_string_lossy().ends_with("modelscan.pid"));
    }

    #[test]
    fn test_logs_dir() {
        let dir = logs_dir().unwrap();
        assert!(dir.to_string_lossy().contains(".modelscan"));
        assert!(dir.to_string_lossy().ends_with("logs"));
    }
}
