use std::time::Duration;

use serde::Deserialize;

pub mod queue;

pub use queue::{ConfigKey, QueueConfig};

/// Process-level settings, read from `QUEUECTL_*` environment variables.
///
/// Queue policy (retries, backoff, timeouts) is not here: it lives in the
/// store so that every worker process sees the same values.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// SQLite connection string (e.g., "sqlite://queue.db")
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// HTTP API bind address for `queuectl serve`
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Prometheus listener for the worker daemon. Disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,

    /// Number of worker loops the daemon runs
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub log_json: bool,

    /// How long a store write waits on SQLite's lock before giving up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_url() -> String {
    "sqlite://queue.db".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_worker_count() -> usize {
    1
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            bind_addr: default_bind_addr(),
            metrics_addr: None,
            worker_count: default_worker_count(),
            log_json: false,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl AppConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("QUEUECTL_").from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let vars: Vec<(String, String)> = Vec::new();
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.database_url, "sqlite://queue.db");
        assert_eq!(config.worker_count, 1);
        assert!(config.metrics_addr.is_none());
        assert!(!config.log_json);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "sqlite:///tmp/q.db".to_string()),
            ("WORKER_COUNT".to_string(), "4".to_string()),
            ("LOG_JSON".to_string(), "true".to_string()),
            ("BUSY_TIMEOUT_MS".to_string(), "250".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.database_url, "sqlite:///tmp/q.db");
        assert_eq!(config.worker_count, 4);
        assert!(config.log_json);
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
    }
}
