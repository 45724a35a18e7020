//! Pure job lifecycle transitions.
//!
//! The store applies these as conditional writes; nothing here touches I/O.
//!
//! ```text
//! pending --Claim--> processing --Succeed--> completed
//!                        |
//!                        +--Fail--> pending (attempts < max_retries)
//!                        +--Fail--> dead    (attempts >= max_retries)
//!                        +--Reap--> pending (attempts unchanged)
//! dead --Requeue--> pending
//! ```

use serde::Serialize;

use crate::error::QueueError;
use crate::models::job::JobStatus;
use crate::services::backoff::{RetryDecision, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobEvent {
    Claim,
    Succeed,
    /// `attempts` is the count after the claim's increment.
    Fail { attempts: u32, max_retries: u32 },
    Reap,
    Requeue,
}

/// Resting state reached by applying `event` to a job in `from`.
pub fn transition(from: JobStatus, event: JobEvent) -> Result<JobStatus, QueueError> {
    let to = match (from, event) {
        (JobStatus::Pending, JobEvent::Claim) => JobStatus::Processing,
        (JobStatus::Processing, JobEvent::Succeed) => JobStatus::Completed,
        (JobStatus::Processing, JobEvent::Fail { attempts, max_retries }) => {
            match RetryPolicy::decide(attempts, max_retries) {
                RetryDecision::Retry => JobStatus::Pending,
                RetryDecision::DeadLetter => JobStatus::Dead,
            }
        }
        (JobStatus::Processing, JobEvent::Reap) => JobStatus::Pending,
        (JobStatus::Dead, JobEvent::Requeue) => JobStatus::Pending,
        _ => return Err(QueueError::InvalidTransition { from, event }),
    };
    Ok(to)
}
