//! Settings storage - loading and saving the YAML file

use crate::types::Settings;
use ms_types::{GatewayError, GatewayResult};
use std::path::Path;
use tracing::{debug, info};

/// Load settings from a file.
///
/// If the file doesn't exist, writes and returns the defaults so the user
/// has something to edit.
pub fn load_settings(path: &Path) -> GatewayResult<Settings> {
    if let Some(parent) = path.parent() {
        ms_utils::paths::ensure_dir_exists(&parent.to_path_buf())?;
    }

    if !path.exists() {
        info!(
            "Settings file not found at {:?}, creating default settings",
            path
        );
        let defaults = Settings::default();
        save_settings(&defaults, path)?;
        return Ok(defaults);
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| GatewayError::Transient(format!("failed to read settings file: {}", e)))?;

    let settings: Settings = serde_yaml::from_str(&contents)
        .map_err(|e| GatewayError::Corrupt(format!("failed to parse settings file: {}", e)))?;

    debug!("Settings loaded from {:?}", path);
    Ok(settings)
}

/// Save settings atomically: write to a temp file then rename over the
/// target.
pub fn save_settings(settings: &Settings, path: &Path) -> GatewayResult<()> {
    if let Some(parent) = path.parent() {
        ms_utils::paths::ensure_dir_exists(&parent.to_path_buf())?;
    }

    let yaml = serde_yaml::to_string(settings)
        .map_err(|e| GatewayError::Corrupt(format!("failed to serialize settings: {}", e)))?;

    let temp_path = path.with_extension("yaml.tmp");
    std::fs::write(&temp_path, yaml)
        .map_err(|e| GatewayError::Transient(format!("failed to write settings file: {}", e)))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| GatewayError::Transient(format!("failed to rename settings file: {}", e)))?;

    debug!("Settings saved to {:?}", path);
    Ok(())
}
