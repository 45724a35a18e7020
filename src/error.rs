use crate::models::job::JobStatus;
use crate::services::state_machine::JobEvent;

/// Errors raised by the job lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid job: {0}")]
    Validation(String),

    #[error("Job '{0}' already exists")]
    DuplicateJob(String),

    #[error("Job '{0}' not found")]
    JobNotFound(String),

    #[error("DLQ entry '{0}' not found")]
    DlqEntryNotFound(String),

    #[error("Unknown config key: {0}")]
    UnknownConfigKey(String),

    #[error("Invalid transition: {event:?} is not allowed from {from}")]
    InvalidTransition { from: JobStatus, event: JobEvent },

    /// Lost a race for the store's write lock. Never leaves the claim loop.
    #[error("Claim conflict: {0}")]
    ClaimConflict(#[source] sqlx::Error),

    #[error("Job '{0}' is no longer owned by this worker")]
    ClaimLost(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl QueueError {
    /// Caller-facing input errors.
    pub fn is_validation(&self) -> bool {
        matches!(self, QueueError::Validation(_) | QueueError::DuplicateJob(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            QueueError::JobNotFound(_)
                | QueueError::DlqEntryNotFound(_)
                | QueueError::UnknownConfigKey(_)
        )
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        if is_lock_contention(&err) {
            return QueueError::StoreUnavailable(err);
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                QueueError::StoreUnavailable(err)
            }
            other => QueueError::Database(other),
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED, including their extended result codes.
pub(crate) fn is_lock_contention(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| matches!(code & 0xff, 5 | 6))
        .unwrap_or(false)
}

/// Unique or primary key constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

pub type Result<T> = std::result::Result<T, QueueError>;
