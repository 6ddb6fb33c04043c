//! `MODELSCAN_*` environment variable overrides
//!
//! Precedence is defaults < settings file < environment. Overrides are
//! applied field by field after the YAML parse; an unparsable value is
//! logged and skipped rather than failing startup.

use crate::types::Settings;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

fn env_parse<T: FromStr>(settings_field: &mut T, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<T>() {
            Ok(v) => *settings_field = v,
            Err(_) => warn!("Ignoring unparsable {}={:?}", var, raw),
        }
    }
}

/// Apply every recognised `MODELSCAN_*` variable onto `settings`.
pub fn apply_env_overrides(settings: &mut Settings) {
    env_parse(&mut settings.server.host, "MODELSCAN_SERVER_HOST");
    env_parse(&mut settings.server.port, "MODELSCAN_SERVER_PORT");

    env_parse(
        &mut settings.ratelimit.cache_ttl_secs,
        "MODELSCAN_RATELIMIT_CACHE_TTL_SECS",
    );
    env_parse(
        &mut settings.ratelimit.degrade_duration_secs,
        "MODELSCAN_RATELIMIT_DEGRADE_DURATION_SECS",
    );
    env_parse(
        &mut settings.ratelimit.minute_window_secs,
        "MODELSCAN_RATELIMIT_MINUTE_WINDOW_SECS",
    );
    env_parse(
        &mut settings.ratelimit.daily_window_secs,
        "MODELSCAN_RATELIMIT_DAILY_WINDOW_SECS",
    );

    env_parse(
        &mut settings.discovery.parallel_batch,
        "MODELSCAN_DISCOVERY_PARALLEL_BATCH",
    );
    env_parse(
        &mut settings.discovery.cache_days,
        "MODELSCAN_DISCOVERY_CACHE_DAYS",
    );

    if let Ok(raw) = std::env::var("MODELSCAN_DAEMON_LOG_PATH") {
        settings.daemon.log_path = Some(PathBuf::from(raw));
    }
    if let Ok(raw) = std::env::var("MODELSCAN_DAEMON_PID_PATH") {
        settings.daemon.pid_path = Some(PathBuf::from(raw));
    }

    env_parse(&mut settings.log_level, "MODELSCAN_LOG_LEVEL");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_overrides_file_values() {
        std::env::set_var("MODELSCAN_SERVER_PORT", "10042");
        std::env::set_var("MODELSCAN_LOG_LEVEL", "trace");

        let mut settings = Settings::default();
        apply_env_overrides(&mut settings);

        assert_eq!(settings.server.port, 10042);
        assert_eq!(settings.log_level, "trace");

        std::env::remove_var("MODELSCAN_SERVER_PORT");
        std::env::remove_var("MODELSCAN_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_unparsable_value_is_skipped() {
        std::env::set_var("MODELSCAN_SERVER_PORT", "not-a-port");

        let mut settings = Settings::default();
        apply_env_overrides(&mut settings);

        assert_eq!(settings.server.port, 0);

        std::env::remove_var("MODELSCAN_SERVER_PORT");
    }

    #[test]
    #[serial]
    fn test_daemon_paths_from_env() {
        std::env::set_var("MODELSCAN_DAEMON_PID_PATH", "/tmp/ms.pid");

        let mut settings = Settings::default();
        apply_env_overrides(&mut settings);

        assert_eq!(settings.daemon.pid_path, Some(PathBuf::from("/tmp/ms.pid")));

        std::env::remove_var("MODELSCAN_DAEMON_PID_PATH");
    }
}
