use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::{dlq_from_row, job_from_row, to_i64, to_millis};
use crate::models::dlq::DlqEntry;
use crate::models::job::Job;

/// Outcome of moving a DLQ entry back onto the queue.
#[derive(Debug)]
pub enum Requeue {
    Requeued(Job),
    /// No DLQ entry with that id.
    Missing,
    /// The entry exists but its job row is not `dead`; nothing was changed.
    NotDead,
}

/// All DLQ entries, most recent failure first.
pub async fn list_dlq(pool: &SqlitePool) -> Result<Vec<DlqEntry>, sqlx::Error> {
    let rows = sqlx::query("SELECT * FROM dlq ORDER BY failed_at DESC, id ASC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(dlq_from_row).collect()
}

pub async fn count_dlq(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM dlq")
        .fetch_one(pool)
        .await?;

    Ok(row.try_get::<i64, _>("n")? as u64)
}

/// Remove a DLQ entry and rebuild its job as fresh `pending` work.
///
/// The job keeps its captured policy and `created_at`; attempts reset to 0
/// and it becomes due at `now`.
pub async fn requeue_dead(
    pool: &SqlitePool,
    job_id: &str,
    now: DateTime<Utc>,
) -> Result<Requeue, sqlx::Error> {
    let now_ms = to_millis(now);
    let mut tx = pool.begin().await?;

    let entry = sqlx::query("DELETE FROM dlq WHERE id = ?1 RETURNING *")
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(entry) = entry else {
        tx.rollback().await?;
        return Ok(Requeue::Missing);
    };
    let entry = dlq_from_row(&entry)?;

    let row = sqlx::query(
        r#"
        INSERT INTO jobs (id, command, status, run_at, attempts, max_retries, timeout_seconds,
                          backoff_base, claimed_by, claimed_at, last_error, created_at,
                          updated_at, failed_at)
        VALUES (?1, ?2, 'pending', ?3, 0, ?4, ?5, ?6, NULL, NULL, NULL, ?3, ?3, NULL)
        ON CONFLICT (id) DO UPDATE SET
            command = excluded.command,
            status = 'pending',
            run_at = excluded.run_at,
            attempts = 0,
            max_retries = excluded.max_retries,
            timeout_seconds = excluded.timeout_seconds,
            backoff_base = excluded.backoff_base,
            claimed_by = NULL,
            claimed_at = NULL,
            last_error = NULL,
            updated_at = excluded.updated_at,
            failed_at = NULL
        WHERE jobs.status = 'dead'
        RETURNING *
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.command)
    .bind(now_ms)
    .bind(i64::from(entry.max_retries))
    .bind(to_i64(entry.timeout_seconds)?)
    .bind(i64::from(entry.backoff_base))
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(Requeue::NotDead);
    };
    let job = job_from_row(&row)?;

    tx.commit().await?;
    Ok(Requeue::Requeued(job))
}
