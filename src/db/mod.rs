use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use crate::models::dlq::DlqEntry;
use crate::models::job::{Job, JobStatus};
use crate::models::worker::{WorkerRecord, WorkerState};

pub mod config_queries;
pub mod dlq_queries;
pub mod queries;
pub mod worker_queries;

/// How long a connection waits on SQLite's write lock before reporting BUSY.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the SQLite connection pool.
///
/// WAL journaling lets readers proceed while one writer holds the lock, which
/// is what every worker process contends on during a claim.
pub async fn init_pool(
    database_url: &str,
    busy_timeout: Duration,
) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .connect_with(options)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {}", ms).into()))
}

/// Checked bind for unsigned columns stored as SQLite INTEGER.
pub(crate) fn to_i64(value: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Checked read of an INTEGER column into an unsigned field.
fn get_unsigned<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: TryFrom<i64>,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    let value: i64 = row.try_get(column)?;
    T::try_from(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn opt_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    ms.map(from_millis).transpose()
}

pub(crate) fn job_from_row(row: &SqliteRow) -> Result<Job, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Job {
        id: row.try_get("id")?,
        command: row.try_get("command")?,
        status,
        run_at: from_millis(row.try_get("run_at")?)?,
        attempts: get_unsigned(row, "attempts")?,
        max_retries: get_unsigned(row, "max_retries")?,
        timeout_seconds: get_unsigned(row, "timeout_seconds")?,
        backoff_base: get_unsigned(row, "backoff_base")?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_at: opt_millis(row.try_get("claimed_at")?)?,
        last_error: row.try_get("last_error")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        failed_at: opt_millis(row.try_get("failed_at")?)?,
    })
}

pub(crate) fn dlq_from_row(row: &SqliteRow) -> Result<DlqEntry, sqlx::Error> {
    Ok(DlqEntry {
        id: row.try_get("id")?,
        command: row.try_get("command")?,
        attempts: get_unsigned(row, "attempts")?,
        max_retries: get_unsigned(row, "max_retries")?,
        timeout_seconds: get_unsigned(row, "timeout_seconds")?,
        backoff_base: get_unsigned(row, "backoff_base")?,
        failed_at: from_millis(row.try_get("failed_at")?)?,
        last_error: row.try_get("last_error")?,
    })
}

pub(crate) fn worker_from_row(row: &SqliteRow) -> Result<WorkerRecord, sqlx::Error> {
    let state: String = row.try_get("state")?;
    Ok(WorkerRecord {
        worker_id: row.try_get("worker_id")?,
        pid: get_unsigned(row, "pid")?,
        state: WorkerState::from_str(&state).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        started_at: from_millis(row.try_get("started_at")?)?,
        last_heartbeat: from_millis(row.try_get("last_heartbeat")?)?,
    })
}
