use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal record of a job that exhausted its retries.
///
/// Carries the command and captured policy so the job can be rebuilt by a
/// DLQ retry without consulting the original row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DlqEntry {
    pub id: String,
    pub command: String,
    pub attempts: u32,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub backoff_base: u32,
    pub failed_at: DateTime<Utc>,
    pub last_error: String,
}
