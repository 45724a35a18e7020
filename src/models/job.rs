use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::config::queue::MAX_TIMEOUT_SECONDS;

/// Lifecycle state of a queued job.
///
/// `Failed` is a transient marker: a failing job is resolved into either a
/// rescheduled `Pending` or a terminal `Dead` in the same write, so it is never
/// observed as a resting state in the store.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// A persisted unit of work.
///
/// Policy fields (`max_retries`, `timeout_seconds`, `backoff_base`) are
/// captured at enqueue time and never follow later configuration changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub status: JobStatus,
    pub run_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub backoff_base: u32,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub failed_at: Option<DateTime<Utc>>,
}

/// Enqueue payload. Omitted policy fields inherit the current `QueueConfig`.
///
/// `id` and `command` default to empty so that a missing field is reported as
/// a validation error rather than a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewJob {
    #[serde(default)]
    #[garde(length(min = 1, max = 256))]
    pub id: String,

    #[serde(default)]
    #[garde(length(min = 1))]
    pub command: String,

    #[serde(default)]
    #[garde(skip)]
    pub run_at: Option<DateTime<Utc>>,

    #[serde(default)]
    #[garde(range(min = 1))]
    pub max_retries: Option<u32>,

    #[serde(default)]
    #[garde(range(min = 1, max = MAX_TIMEOUT_SECONDS))]
    pub timeout_seconds: Option<u64>,

    #[serde(default)]
    #[garde(range(min = 1))]
    pub backoff_base: Option<u32>,
}

impl NewJob {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn backoff_base(mut self, backoff_base: u32) -> Self {
        self.backoff_base = Some(backoff_base);
        self
    }
}

/// Listing row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub id: String,
    pub status: JobStatus,
    pub command: String,
    pub attempts: u32,
    pub run_at: DateTime<Utc>,
}
