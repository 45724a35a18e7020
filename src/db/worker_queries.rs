use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::{to_millis, worker_from_row};
use crate::models::worker::{WorkerRecord, WorkerState};

/// Register (or re-register) a running worker.
pub async fn register_worker(
    pool: &SqlitePool,
    worker_id: &str,
    pid: u32,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO workers (worker_id, pid, state, started_at, last_heartbeat)
        VALUES (?1, ?2, 'running', ?3, ?3)
        ON CONFLICT (worker_id) DO UPDATE SET
            pid = excluded.pid,
            state = 'running',
            started_at = excluded.started_at,
            last_heartbeat = excluded.last_heartbeat
        "#,
    )
    .bind(worker_id)
    .bind(i64::from(pid))
    .bind(to_millis(now))
    .execute(pool)
    .await?;

    Ok(())
}

/// Refresh the heartbeat and return the worker's current state.
///
/// `None` means the record is gone, which the worker treats as a stop request.
pub async fn heartbeat(
    pool: &SqlitePool,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<WorkerState>, sqlx::Error> {
    let row = sqlx::query(
        "UPDATE workers SET last_heartbeat = ?2 WHERE worker_id = ?1 RETURNING state",
    )
    .bind(worker_id)
    .bind(to_millis(now))
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => {
            let state: String = r.try_get("state")?;
            let state = state
                .parse::<WorkerState>()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
            Ok(Some(state))
        }
        None => Ok(None),
    }
}

pub async fn set_worker_state(
    pool: &SqlitePool,
    worker_id: &str,
    state: WorkerState,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE workers SET state = ?2, last_heartbeat = ?3 WHERE worker_id = ?1")
        .bind(worker_id)
        .bind(state.as_str())
        .bind(to_millis(now))
        .execute(pool)
        .await?;

    Ok(())
}

/// Ask every running worker to stop after its current cycle.
pub async fn request_stop_all(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE workers SET state = 'stopping' WHERE state = 'running'")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Workers that have not finished shutting down.
pub async fn list_live_workers(pool: &SqlitePool) -> Result<Vec<WorkerRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM workers
        WHERE state <> 'stopped'
        ORDER BY started_at ASC, worker_id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(worker_from_row).collect()
}
