//! Job table statements.
//!
//! Every state change here is one conditional write (or a transaction whose
//! first statement is the write), so SQLite's writer lock is the only
//! serialization point between worker processes.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::{job_from_row, to_i64, to_millis};
use crate::models::job::{Job, JobStatus, JobSummary};
use crate::models::status::JobCounts;

/// Insert a new job row.
pub async fn insert_job(pool: &SqlitePool, job: &Job) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO jobs (id, command, status, run_at, attempts, max_retries, timeout_seconds,
                          backoff_base, claimed_by, claimed_at, last_error, created_at,
                          updated_at, failed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, NULL, ?9, ?9, NULL)
        "#,
    )
    .bind(&job.id)
    .bind(&job.command)
    .bind(job.status.as_str())
    .bind(to_millis(job.run_at))
    .bind(i64::from(job.attempts))
    .bind(i64::from(job.max_retries))
    .bind(to_i64(job.timeout_seconds)?)
    .bind(i64::from(job.backoff_base))
    .bind(to_millis(job.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &SqlitePool, job_id: &str) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// List jobs in creation order, optionally filtered by status.
pub async fn list_jobs(
    pool: &SqlitePool,
    status: Option<JobStatus>,
) -> Result<Vec<JobSummary>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM jobs
        WHERE ?1 IS NULL OR status = ?1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| {
            let job = job_from_row(r)?;
            Ok(JobSummary {
                id: job.id,
                status: job.status,
                command: job.command,
                attempts: job.attempts,
                run_at: job.run_at,
            })
        })
        .collect()
}

/// Count jobs grouped by status.
pub async fn count_by_status(pool: &SqlitePool) -> Result<JobCounts, sqlx::Error> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
        .fetch_all(pool)
        .await?;

    let mut counts = JobCounts::default();
    for row in rows {
        let status: String = row.try_get("status")?;
        let n: i64 = row.try_get("n")?;
        if let Ok(status) = status.parse::<JobStatus>() {
            counts.set(status, n as u64);
        }
    }
    Ok(counts)
}

/// Atomically move the next eligible job to `processing` for `worker_id`.
///
/// Eligible means `pending` with `run_at <= now`; ties break on `(run_at, id)`.
/// Returns `None` when nothing is eligible.
pub async fn claim_next(
    pool: &SqlitePool,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'processing',
            claimed_by = ?1,
            claimed_at = ?2,
            attempts = attempts + 1,
            updated_at = ?2
        WHERE id = (
            SELECT id FROM jobs
            WHERE status = 'pending' AND run_at <= ?2
            ORDER BY run_at ASC, id ASC
            LIMIT 1
        )
        AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(worker_id)
    .bind(to_millis(now))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// `processing -> completed`. Returns false if `worker_id` no longer owns the job.
pub async fn complete_job(
    pool: &SqlitePool,
    job: &Job,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'completed',
            claimed_by = NULL,
            claimed_at = NULL,
            last_error = NULL,
            updated_at = ?4
        WHERE id = ?1 AND status = 'processing' AND claimed_by = ?2 AND attempts = ?3
        "#,
    )
    .bind(&job.id)
    .bind(worker_id)
    .bind(i64::from(job.attempts))
    .bind(to_millis(now))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// `processing -> pending` with a future `run_at`.
///
/// Guarded on the attempt count seen at claim time, so a report from a worker
/// whose job was reaped and re-claimed elsewhere is rejected.
pub async fn reschedule_job(
    pool: &SqlitePool,
    job: &Job,
    worker_id: &str,
    run_at: DateTime<Utc>,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'pending',
            run_at = ?4,
            claimed_by = NULL,
            claimed_at = NULL,
            last_error = ?5,
            failed_at = ?6,
            updated_at = ?6
        WHERE id = ?1 AND status = 'processing' AND claimed_by = ?2 AND attempts = ?3
        "#,
    )
    .bind(&job.id)
    .bind(worker_id)
    .bind(i64::from(job.attempts))
    .bind(to_millis(run_at))
    .bind(error)
    .bind(to_millis(now))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// `processing -> dead` plus the DLQ record, in one transaction.
pub async fn bury_job(
    pool: &SqlitePool,
    job: &Job,
    worker_id: &str,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let now_ms = to_millis(now);
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'dead',
            claimed_by = NULL,
            claimed_at = NULL,
            last_error = ?4,
            failed_at = ?5,
            updated_at = ?5
        WHERE id = ?1 AND status = 'processing' AND claimed_by = ?2 AND attempts = ?3
        "#,
    )
    .bind(&job.id)
    .bind(worker_id)
    .bind(i64::from(job.attempts))
    .bind(error)
    .bind(now_ms)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() != 1 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO dlq (id, command, attempts, max_retries, timeout_seconds, backoff_base,
                         failed_at, last_error)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT (id) DO UPDATE SET
            command = excluded.command,
            attempts = excluded.attempts,
            max_retries = excluded.max_retries,
            timeout_seconds = excluded.timeout_seconds,
            backoff_base = excluded.backoff_base,
            failed_at = excluded.failed_at,
            last_error = excluded.last_error
        "#,
    )
    .bind(&job.id)
    .bind(&job.command)
    .bind(i64::from(job.attempts))
    .bind(i64::from(job.max_retries))
    .bind(to_i64(job.timeout_seconds)?)
    .bind(i64::from(job.backoff_base))
    .bind(now_ms)
    .bind(error)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Return orphaned `processing` jobs to `pending`, keeping their attempt count.
///
/// A job is orphaned once it was claimed more than `timeout + grace` ago and
/// its owner has no live worker record with a heartbeat inside that window.
/// Returns the ids of reaped jobs.
pub async fn reap_stale(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    grace_ms: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'pending',
            run_at = ?1,
            last_error = 'Worker ' || claimed_by || ' stopped heartbeating',
            claimed_by = NULL,
            claimed_at = NULL,
            updated_at = ?1
        WHERE status = 'processing'
          AND claimed_at + timeout_seconds * 1000 + ?2 <= ?1
          AND NOT EXISTS (
              SELECT 1 FROM workers w
              WHERE w.worker_id = jobs.claimed_by
                AND w.state IN ('running', 'stopping')
                AND w.last_heartbeat + jobs.timeout_seconds * 1000 + ?2 > ?1
          )
        RETURNING id
        "#,
    )
    .bind(to_millis(now))
    .bind(grace_ms)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| r.try_get("id")).collect()
}
