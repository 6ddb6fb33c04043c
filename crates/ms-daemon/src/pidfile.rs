//! PID file handling
//!
//! The PID file is JSON in a 0700 directory, written with a temp-file plus
//! atomic rename so a concurrent reader never sees a half-written record.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Contents of the PID file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidRecord {
    pub pid: u32,
    pub port: u16,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub version: String,
}

impl PidRecord {
    pub fn for_current_process(host: &str, port: u16, version: &str) -> Self {
        Self {
            pid: std::process::id(),
            port,
            host: host.to_string(),
            started_at: Utc::now(),
            version: version.to_string(),
        }
    }
}

/// Write the PID record atomically. The parent directory is created 0700
/// if missing; the file itself is world-readable (0644) so `status` works
/// from other users.
pub fn write(path: &Path, record: &PidRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        ms_utils::paths::ensure_dir_exists(&parent.to_path_buf())
            .map_err(|e| anyhow::anyhow!("{}", e))?;
    }

    let json = serde_json::to_vec_pretty(record).context("serialize pid record")?;

    let temp_path = path.with_extension("pid.tmp");
    std::fs::write(&temp_path, &json).context("write pid temp file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o644))
            .context("set pid file permissions")?;
    }

    std::fs::rename(&temp_path, path).context("rename pid file into place")?;
    debug!("Wrote PID file at {:?}: pid={}", path, record.pid);
    Ok(())
}

/// Read and parse the PID file. `Ok(None)` when it does not exist.
pub fn read(path: &Path) -> Result<Option<PidRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).context("read pid file")?;
    let record = serde_json::from_str(&contents).context("parse pid file")?;
    Ok(Some(record))
}

/// Remove the PID file if present.
pub fn remove(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed PID file at {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context("remove pid file"),
    }
}
