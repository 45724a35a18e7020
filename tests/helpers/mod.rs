//! Shared setup for integration tests: each test gets its own SQLite file.

#![allow(dead_code)]

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use queuectl::JobQueue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use tempfile::TempDir;

/// A migrated store in a temporary directory, removed on drop.
pub struct TestStore {
    pub queue: JobQueue,
    pub url: String,
    pub dir: TempDir,
}

impl TestStore {
    /// Open a second, independent pool on the same database, the way a
    /// separate worker process would.
    pub async fn reopen(&self) -> JobQueue {
        JobQueue::connect(&self.url)
            .await
            .expect("Failed to reopen test store")
    }

    /// Reopen with a short lock wait so contention surfaces quickly.
    pub async fn reopen_with(&self, busy_timeout: Duration) -> JobQueue {
        JobQueue::connect_with(&self.url, busy_timeout)
            .await
            .expect("Failed to reopen test store")
    }

    /// Take SQLite's write lock from a separate connection and keep it until
    /// [`release_write_lock`].
    pub async fn hold_write_lock(&self) -> SqliteConnection {
        let mut conn = SqliteConnectOptions::from_str(&self.url)
            .expect("Invalid test store url")
            .connect()
            .await
            .expect("Failed to open lock connection");
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut conn)
            .await
            .expect("Failed to take write lock");
        conn
    }
}

pub async fn release_write_lock(mut conn: SqliteConnection) {
    sqlx::query("ROLLBACK")
        .execute(&mut conn)
        .await
        .expect("Failed to release write lock");
}

/// Lock wait used by contention tests.
pub const SHORT_BUSY_TIMEOUT: Duration = Duration::from_millis(50);

pub async fn test_store() -> TestStore {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());
    let queue = JobQueue::connect(&url)
        .await
        .expect("Failed to open test store");
    TestStore { queue, url, dir }
}

/// Fixed reference instant so backoff deltas can be asserted exactly.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

pub fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check().await
}
