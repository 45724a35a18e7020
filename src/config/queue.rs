use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::QueueError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: u32 = 2;
pub const DEFAULT_POLL_INTERVAL_SEC: f64 = 1.0;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Longest accepted job timeout (one year). Keeps `timeout * 1000 + grace`
/// inside an `i64` millisecond timestamp.
pub const MAX_TIMEOUT_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Keys accepted by `config set`. Both `snake_case` and `kebab-case` parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConfigKey {
    #[strum(to_string = "max_retries", serialize = "max-retries")]
    MaxRetries,
    #[strum(to_string = "backoff_base", serialize = "backoff-base")]
    BackoffBase,
    #[strum(to_string = "poll_interval_sec", serialize = "poll-interval-sec")]
    PollIntervalSec,
    #[strum(to_string = "timeout_seconds", serialize = "timeout-seconds")]
    TimeoutSeconds,
}

impl ConfigKey {
    /// Column value used in the `config` table.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Process-wide queue defaults.
///
/// Captured by value into each job at enqueue time; workers re-read it every
/// cycle for `poll_interval_sec` only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_retries: u32,
    pub backoff_base: u32,
    pub poll_interval_sec: f64,
    pub timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            poll_interval_sec: DEFAULT_POLL_INTERVAL_SEC,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_sec)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SEC))
    }

    /// Apply a raw `key=value` pair, validating the value for that key.
    pub fn apply(&mut self, key: ConfigKey, value: &str) -> Result<(), QueueError> {
        let value = value.trim();
        match key {
            ConfigKey::MaxRetries => self.max_retries = parse_positive(key, value)?,
            ConfigKey::BackoffBase => self.backoff_base = parse_positive(key, value)?,
            ConfigKey::TimeoutSeconds => {
                let secs: u64 = parse_positive(key, value)?;
                if secs > MAX_TIMEOUT_SECONDS {
                    return Err(QueueError::Validation(format!(
                        "{} must be at most {}, got '{}'",
                        key, MAX_TIMEOUT_SECONDS, value
                    )));
                }
                self.timeout_seconds = secs;
            }
            ConfigKey::PollIntervalSec => {
                let secs = f64::from_str(value).map_err(|_| invalid(key, value))?;
                if secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                    return Err(invalid(key, value));
                }
                self.poll_interval_sec = secs;
            }
        }
        Ok(())
    }

    /// Persisted string form of a key's current value.
    pub fn value_of(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::MaxRetries => self.max_retries.to_string(),
            ConfigKey::BackoffBase => self.backoff_base.to_string(),
            ConfigKey::PollIntervalSec => self.poll_interval_sec.to_string(),
            ConfigKey::TimeoutSeconds => self.timeout_seconds.to_string(),
        }
    }
}

pub fn parse_key(key: &str) -> Result<ConfigKey, QueueError> {
    ConfigKey::from_str(key.trim()).map_err(|_| QueueError::UnknownConfigKey(key.to_string()))
}

fn parse_positive<T>(key: ConfigKey, value: &str) -> Result<T, QueueError>
where
    T: FromStr + PartialOrd + Default,
{
    match value.parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: ConfigKey, value: &str) -> QueueError {
    QueueError::Validation(format!("{} must be a positive number, got '{}'", key, value))
}
