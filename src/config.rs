use std::time::Duration;

/// Daemon settings, read from `TOOLRENT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub sweep_interval: Duration,
    pub metrics_port: Option<u16>,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://toolrent.db?mode=rwc".into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(3),
            sweep_interval: Duration::from_secs(3600),
            metrics_port: None,
            log_filter: "info".into(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparsable numbers keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            database_url: lookup("TOOLRENT_DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: parsed("TOOLRENT_MAX_CONNECTIONS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            acquire_timeout: parsed("TOOLRENT_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            sweep_interval: parsed("TOOLRENT_SWEEP_INTERVAL_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            metrics_port: parsed("TOOLRENT_METRICS_PORT").and_then(|n| u16::try_from(n).ok()),
            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
        }
    }
}
