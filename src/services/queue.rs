use std::time::Duration;

use chrono::{DateTime, Utc};
use garde::Validate;
use rand::Rng;
use sqlx::SqlitePool;

use crate::config::queue::{parse_key, QueueConfig};
use crate::db::dlq_queries::Requeue;
use crate::db::{self, config_queries, dlq_queries, queries, worker_queries};
use crate::error::{is_lock_contention, is_unique_violation, QueueError, Result};
use crate::models::dlq::DlqEntry;
use crate::models::job::{Job, JobStatus, JobSummary, NewJob};
use crate::models::status::StatusSnapshot;
use crate::models::worker::{WorkerRecord, WorkerState};
use crate::services::backoff::RetryPolicy;
use crate::services::executor::ExecutionOutcome;
use crate::services::state_machine::{transition, JobEvent};
use crate::telemetry;

/// Tries per claim before a lock conflict is reported as `StoreUnavailable`.
const CLAIM_MAX_ATTEMPTS: u32 = 5;
const CLAIM_RETRY_MIN_MS: u64 = 10;
const CLAIM_RETRY_MAX_MS: u64 = 100;

/// Slack added to a job's timeout before its claim is considered orphaned.
pub const REAP_GRACE: Duration = Duration::from_secs(30);

/// SQLite-backed job queue: enqueue, claim, outcome reporting, DLQ and config.
///
/// Holds no in-memory job state; any number of instances (in one process or
/// many) can share the same database file.
#[derive(Debug, Clone)]
pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, db::DEFAULT_BUSY_TIMEOUT).await
    }

    /// Like [`JobQueue::connect`], with an explicit wait on the write lock.
    pub async fn connect_with(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let pool = db::init_pool(database_url, busy_timeout).await?;
        db::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Check store connectivity (for health checks).
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn enqueue(&self, new_job: NewJob) -> Result<Job> {
        self.enqueue_at(new_job, Utc::now()).await
    }

    /// Validate and insert a job, filling omitted policy from the current config.
    pub async fn enqueue_at(&self, new_job: NewJob, now: DateTime<Utc>) -> Result<Job> {
        new_job
            .validate()
            .map_err(|e| QueueError::Validation(e.to_string()))?;
        if new_job.id.trim().is_empty() || new_job.command.trim().is_empty() {
            return Err(QueueError::Validation(
                "id and command must not be blank".to_string(),
            ));
        }

        let defaults = self.config_get().await?;
        let job = Job {
            id: new_job.id,
            command: new_job.command,
            status: JobStatus::Pending,
            run_at: new_job.run_at.unwrap_or(now),
            attempts: 0,
            max_retries: new_job.max_retries.unwrap_or(defaults.max_retries),
            timeout_seconds: new_job.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            backoff_base: new_job.backoff_base.unwrap_or(defaults.backoff_base),
            claimed_by: None,
            claimed_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            failed_at: None,
        };

        match queries::insert_job(&self.pool, &job).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => return Err(QueueError::DuplicateJob(job.id)),
            Err(e) => return Err(e.into()),
        }

        metrics::counter!(telemetry::JOBS_ENQUEUED).increment(1);
        tracing::info!(job_id = %job.id, run_at = %job.run_at, "Enqueued job");
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        queries::get_job(&self.pool, job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<JobSummary>> {
        Ok(queries::list_jobs(&self.pool, status).await?)
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        Ok(StatusSnapshot {
            jobs: queries::count_by_status(&self.pool).await?,
            dlq: dlq_queries::count_dlq(&self.pool).await?,
            workers: worker_queries::list_live_workers(&self.pool).await?,
        })
    }

    /// Claim the next eligible job for `worker_id`.
    ///
    /// Lock conflicts are retried with a short random delay; `Ok(None)` means
    /// nothing is due.
    pub async fn claim_next(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut attempt = 0;
        loop {
            match self.try_claim(worker_id, now).await {
                Err(QueueError::ClaimConflict(e)) => {
                    attempt += 1;
                    if attempt >= CLAIM_MAX_ATTEMPTS {
                        return Err(QueueError::StoreUnavailable(e));
                    }
                    let jitter = rand::rng().random_range(CLAIM_RETRY_MIN_MS..CLAIM_RETRY_MAX_MS);
                    tracing::debug!(
                        worker_id,
                        attempt,
                        jitter_ms = jitter,
                        "Claim conflict, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
                Ok(Some(job)) => {
                    metrics::counter!(telemetry::JOBS_CLAIMED).increment(1);
                    tracing::info!(
                        job_id = %job.id,
                        worker_id,
                        attempts = job.attempts,
                        "Claimed job"
                    );
                    return Ok(Some(job));
                }
                other => return other,
            }
        }
    }

    async fn try_claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
        queries::claim_next(&self.pool, worker_id, now)
            .await
            .map_err(|e| {
                if is_lock_contention(&e) {
                    QueueError::ClaimConflict(e)
                } else {
                    e.into()
                }
            })
    }

    /// Return orphaned claims to `pending`. Returns the reaped job ids.
    pub async fn reap_stale(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let reaped = queries::reap_stale(&self.pool, now, REAP_GRACE.as_millis() as i64).await?;
        if !reaped.is_empty() {
            metrics::counter!(telemetry::JOBS_REAPED).increment(reaped.len() as u64);
            tracing::warn!(jobs = ?reaped, "Reaped jobs from unresponsive workers");
        }
        Ok(reaped)
    }

    /// `processing -> completed` for a job claimed by `worker_id`.
    pub async fn succeed(&self, job: &Job, worker_id: &str, now: DateTime<Utc>) -> Result<()> {
        transition(job.status, JobEvent::Succeed)?;
        if !queries::complete_job(&self.pool, job, worker_id, now).await? {
            return Err(QueueError::ClaimLost(job.id.clone()));
        }

        metrics::counter!(telemetry::JOBS_COMPLETED).increment(1);
        tracing::info!(job_id = %job.id, worker_id, "Job completed successfully");
        Ok(())
    }

    /// Record a failed attempt. Returns the job's new resting state:
    /// `Pending` when rescheduled, `Dead` when moved to the DLQ.
    pub async fn fail(
        &self,
        job: &Job,
        worker_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<JobStatus> {
        let next = transition(
            job.status,
            JobEvent::Fail {
                attempts: job.attempts,
                max_retries: job.max_retries,
            },
        )?;

        let owned = if next == JobStatus::Pending {
            let run_at = RetryPolicy::next_run_at(now, job.backoff_base, job.attempts);
            let owned =
                queries::reschedule_job(&self.pool, job, worker_id, run_at, error, now).await?;
            if owned {
                metrics::counter!(telemetry::JOBS_RETRIED).increment(1);
                tracing::warn!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    max_retries = job.max_retries,
                    retry_in_secs = RetryPolicy::delay_secs(job.backoff_base, job.attempts),
                    error,
                    "Job failed, retrying"
                );
            }
            owned
        } else {
            let owned = queries::bury_job(&self.pool, job, worker_id, error, now).await?;
            if owned {
                metrics::counter!(telemetry::JOBS_DEAD).increment(1);
                tracing::warn!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    error,
                    "Job moved to DLQ"
                );
            }
            owned
        };

        if !owned {
            return Err(QueueError::ClaimLost(job.id.clone()));
        }
        Ok(next)
    }

    /// Feed an execution outcome into the state machine.
    pub async fn report(
        &self,
        job: &Job,
        worker_id: &str,
        outcome: &ExecutionOutcome,
        now: DateTime<Utc>,
    ) -> Result<JobStatus> {
        match outcome.error_message() {
            None => {
                self.succeed(job, worker_id, now).await?;
                Ok(JobStatus::Completed)
            }
            Some(message) => self.fail(job, worker_id, message, now).await,
        }
    }

    pub async fn dlq_list(&self) -> Result<Vec<DlqEntry>> {
        Ok(dlq_queries::list_dlq(&self.pool).await?)
    }

    /// Re-enqueue a dead job with a fresh attempt budget.
    pub async fn dlq_retry(&self, job_id: &str, now: DateTime<Utc>) -> Result<Job> {
        match dlq_queries::requeue_dead(&self.pool, job_id, now).await? {
            Requeue::Requeued(job) => {
                metrics::counter!(telemetry::DLQ_RETRIED).increment(1);
                tracing::info!(job_id, "Re-enqueued DLQ job");
                Ok(job)
            }
            Requeue::Missing => Err(QueueError::DlqEntryNotFound(job_id.to_string())),
            Requeue::NotDead => {
                let from = self.get_job(job_id).await?.status;
                Err(QueueError::InvalidTransition {
                    from,
                    event: JobEvent::Requeue,
                })
            }
        }
    }

    pub async fn config_get(&self) -> Result<QueueConfig> {
        Ok(config_queries::load_config(&self.pool).await?)
    }

    /// Validate and persist one config value. Only jobs enqueued afterwards
    /// pick it up.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<QueueConfig> {
        let key = parse_key(key)?;
        let mut config = self.config_get().await?;
        config.apply(key, value)?;
        config_queries::set_config(&self.pool, key, &config.value_of(key)).await?;

        tracing::info!(key = %key, value = %config.value_of(key), "Updated config");
        Ok(config)
    }

    pub async fn register_worker(
        &self,
        worker_id: &str,
        pid: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Ok(worker_queries::register_worker(&self.pool, worker_id, pid, now).await?)
    }

    /// Refresh liveness; `None` means the worker record was removed.
    pub async fn heartbeat(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkerState>> {
        Ok(worker_queries::heartbeat(&self.pool, worker_id, now).await?)
    }

    pub async fn mark_worker(
        &self,
        worker_id: &str,
        state: WorkerState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Ok(worker_queries::set_worker_state(&self.pool, worker_id, state, now).await?)
    }

    /// Signal every running worker, in any process, to stop gracefully.
    pub async fn request_stop_all(&self) -> Result<u64> {
        Ok(worker_queries::request_stop_all(&self.pool).await?)
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerRecord>> {
        Ok(worker_queries::list_live_workers(&self.pool).await?)
    }
}
