//! Settings schema
//!
//! The schema is fixed; values are tunable via the settings file and
//! `MODELSCAN_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_degrade_duration_secs() -> u64 {
    900
}

fn default_minute_window_secs() -> u64 {
    30
}

fn default_daily_window_secs() -> u64 {
    3600
}

fn default_parallel_batch() -> u32 {
    4
}

fn default_cache_days() -> u32 {
    7
}

/// Bind address. `port = 0` enables dynamic port discovery in the
/// configured range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
        }
    }
}

/// Rate limiting and key-health tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Key manager hot-list TTL
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Cooldown applied when a key is marked degraded
    #[serde(default = "default_degrade_duration_secs")]
    pub degrade_duration_secs: u64,
    /// Minute-counter sweeper period
    #[serde(default = "default_minute_window_secs")]
    pub minute_window_secs: u64,
    /// Daily-counter sweeper period
    #[serde(default = "default_daily_window_secs")]
    pub daily_window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            degrade_duration_secs: default_degrade_duration_secs(),
            minute_window_secs: default_minute_window_secs(),
            daily_window_secs: default_daily_window_secs(),
        }
    }
}

/// Hints passed through to the external discovery agent. The gateway does
/// not interpret these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    #[serde(default = "default_parallel_batch")]
    pub parallel_batch: u32,
    #[serde(default = "default_cache_days")]
    pub cache_days: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            parallel_batch: default_parallel_batch(),
            cache_days: default_cache_days(),
        }
    }
}

/// Daemon path overrides. `None` falls back to `~/.modelscan/` defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_path: Option<PathBuf>,
}

/// Root settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub ratelimit: RateLimitSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Settings {
    /// Overlay the safe-to-reload subset of `newer` onto `self`, returning
    /// the names of changed fields that were ignored because they require a
    /// full restart.
    ///
    /// Reloadable: log level, daemon paths, window durations. Everything
    /// else keeps its running value.
    pub fn apply_reloadable(&mut self, newer: &Settings) -> Vec<&'static str> {
        let mut ignored = Vec::new();

        self.log_level = newer.log_level.clone();
        self.daemon = newer.daemon.clone();
        self.ratelimit.minute_window_secs = newer.ratelimit.minute_window_secs;
        self.ratelimit.daily_window_secs = newer.ratelimit.daily_window_secs;

        if self.server != newer.server {
            ignored.push("server");
        }
        if self.ratelimit.cache_ttl_secs != newer.ratelimit.cache_ttl_secs {
            ignored.push("ratelimit.cache_ttl_secs");
        }
        if self.ratelimit.degrade_duration_secs != newer.ratelimit.degrade_duration_secs {
            ignored.push("ratelimit.degrade_duration_secs");
        }
        if self.discovery != newer.discovery {
            ignored.push("discovery");
        }

        ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 0);
        assert_eq!(s.ratelimit.cache_ttl_secs, 300);
        assert_eq!(s.ratelimit.degrade_duration_secs, 900);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let s: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_partial_yaml_fills_rest() {
        let s: Settings = serde_yaml::from_str("server:\n  port: 10100\n").unwrap();
        assert_eq!(s.server.port, 10100);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.ratelimit.minute_window_secs, 30);
    }

    #[test]
    fn test_apply_reloadable_takes_safe_subset() {
        let mut running = Settings::default();
        let mut newer = Settings::default();
        newer.log_level = "debug".to_string();
        newer.ratelimit.minute_window_secs = 10;
        newer.server.port = 9000;
        newer.ratelimit.cache_ttl_secs = 60;

        let ignored = running.apply_reloadable(&newer);

        assert_eq!(running.log_level, "debug");
        assert_eq!(running.ratelimit.minute_window_secs, 10);
        // Unsafe fields keep running values
        assert_eq!(running.server.port, 0);
        assert_eq!(running.ratelimit.cache_ttl_secs, 300);
        assert!(ignored.contains(&"server"));
        assert!(ignored.contains(&"ratelimit.cache_ttl_secs"));
    }
}
