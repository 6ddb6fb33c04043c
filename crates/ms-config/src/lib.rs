//! Configuration management
//!
//! Loads the YAML settings file (creating defaults on first run), applies
//! `MODELSCAN_*` environment overrides, and exposes the safe-to-reload
//! subset used by SIGHUP handling.

mod env;
mod storage;
mod types;

pub use env::apply_env_overrides;
pub use storage::{load_settings, save_settings};
pub use types::{
    DaemonSettings, DiscoverySettings, RateLimitSettings, ServerSettings, Settings,
};

use ms_types::GatewayResult;
use std::path::{Path, PathBuf};

/// Load settings from the default location with env overrides applied.
pub fn load() -> GatewayResult<Settings> {
    load_from_path(&ms_utils::paths::settings_file()?)
}

/// Load settings from a specific path with env overrides applied.
pub fn load_from_path(path: &Path) -> GatewayResult<Settings> {
    let mut settings = load_settings(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

impl Settings {
    /// Resolved PID file path (override or default).
    pub fn pid_path(&self) -> GatewayResult<PathBuf> {
        match &self.daemon.pid_path {
            Some(p) => Ok(p.clone()),
            None => ms_utils::paths::pid_file(),
        }
    }

    /// Resolved daemon log path (override or default).
    pub fn log_path(&self) -> GatewayResult<PathBuf> {
        match &self.daemon.log_path {
            Some(p) => Ok(p.clone()),
            None => ms_utils::paths::daemon_log_file(),
        }
    }
}
