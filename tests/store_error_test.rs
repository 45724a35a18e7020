mod helpers;

use std::time::{Duration, Instant};

use chrono::Utc;
use helpers::{release_write_lock, test_store, wait_until, SHORT_BUSY_TIMEOUT};
use queuectl::models::job::{JobStatus, NewJob};
use queuectl::services::executor::JobExecutor;
use queuectl::services::supervisor::Supervisor;
use queuectl::services::worker::Worker;
use queuectl::QueueError;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_claim_gives_up_while_write_lock_is_held() {
    let store = test_store().await;
    store.queue.enqueue(NewJob::new("a", "true")).await.unwrap();
    let queue = store.reopen_with(SHORT_BUSY_TIMEOUT).await;

    let lock = store.hold_write_lock().await;
    let started = Instant::now();
    let err = assert_err!(queue.claim_next("w-1", Utc::now()).await);
    let elapsed = started.elapsed();
    release_write_lock(lock).await;

    assert!(matches!(err, QueueError::StoreUnavailable(_)), "got {err:?}");
    // Every retry waited out the lock before the conflict was escalated.
    assert!(elapsed >= SHORT_BUSY_TIMEOUT * 4, "gave up after {elapsed:?}");

    let job = store.queue.get_job("a").await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_claim_retries_until_lock_is_released() {
    let store = test_store().await;
    store.queue.enqueue(NewJob::new("a", "true")).await.unwrap();
    let queue = store.reopen_with(SHORT_BUSY_TIMEOUT).await;

    let lock = store.hold_write_lock().await;
    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        release_write_lock(lock).await;
    });

    let claimed = assert_ok!(queue.claim_next("w-1", Utc::now()).await);
    releaser.await.unwrap();

    let job = claimed.expect("job should be claimed once the lock clears");
    assert_eq!(job.id, "a");
    assert_eq!(job.claimed_by.as_deref(), Some("w-1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_survives_locked_store() {
    let store = test_store().await;
    store.queue.config_set("poll_interval_sec", "0.05").await.unwrap();
    let queue = store.reopen_with(SHORT_BUSY_TIMEOUT).await;

    let shutdown = CancellationToken::new();
    let worker = Worker::new(queue, JobExecutor::default(), shutdown.clone());
    let handle = tokio::spawn(worker.run());

    let registered = wait_until(Duration::from_secs(5), || {
        let queue = store.queue.clone();
        async move { queue.list_workers().await.unwrap().len() == 1 }
    })
    .await;
    assert!(registered, "worker did not register");

    let lock = store.hold_write_lock().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!handle.is_finished(), "worker exited on store errors");
    release_write_lock(lock).await;

    store.queue.enqueue(NewJob::new("after", "true")).await.unwrap();
    let completed = wait_until(Duration::from_secs(10), || {
        let queue = store.queue.clone();
        async move { queue.get_job("after").await.unwrap().status == JobStatus::Completed }
    })
    .await;
    assert!(completed, "worker stopped processing after the lock cleared");

    shutdown.cancel();
    assert_ok!(handle.await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_outcome_report_is_retried_until_written() {
    let store = test_store().await;
    store.queue.config_set("poll_interval_sec", "0.05").await.unwrap();
    store.queue.enqueue(NewJob::new("slow", "sleep 1")).await.unwrap();
    let queue = store.reopen_with(SHORT_BUSY_TIMEOUT).await;

    let shutdown = CancellationToken::new();
    let worker = Worker::new(queue, JobExecutor::default(), shutdown.clone());
    let handle = tokio::spawn(worker.run());

    let claimed = wait_until(Duration::from_secs(5), || {
        let queue = store.queue.clone();
        async move { queue.get_job("slow").await.unwrap().status == JobStatus::Processing }
    })
    .await;
    assert!(claimed, "job was never claimed");

    // The command finishes while the store is locked, so the first reports fail.
    let lock = store.hold_write_lock().await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        store.queue.get_job("slow").await.unwrap().status,
        JobStatus::Processing
    );
    release_write_lock(lock).await;

    let completed = wait_until(Duration::from_secs(10), || {
        let queue = store.queue.clone();
        async move { queue.get_job("slow").await.unwrap().status == JobStatus::Completed }
    })
    .await;
    assert!(completed, "outcome was never written");

    let job = store.queue.get_job("slow").await.unwrap();
    assert_eq!(job.attempts, 1);
    assert!(job.claimed_by.is_none());

    shutdown.cancel();
    assert_ok!(handle.await.unwrap());
}

#[tokio::test]
async fn test_supervisor_rejects_zero_workers() {
    let store = test_store().await;

    let err = assert_err!(
        Supervisor::new(store.queue.clone(), 0)
            .run(CancellationToken::new())
            .await
    );

    assert!(matches!(err, QueueError::Validation(_)));
}
