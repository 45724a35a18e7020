use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{QueueError, Result};
use crate::models::job::Job;
use crate::models::worker::WorkerState;
use crate::services::executor::{ExecutionOutcome, ExecutionResult, JobExecutor};
use crate::services::queue::JobQueue;
use crate::telemetry;

/// Heartbeat cadence while a job is executing.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Backoff after a failed cycle when no config could be read.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Bounds for retrying an outcome report against an unavailable store.
const REPORT_BACKOFF_MIN: Duration = Duration::from_millis(100);
const REPORT_BACKOFF_MAX: Duration = Duration::from_secs(10);

enum Cycle {
    Processed,
    Idle(Duration),
    Stop,
}

/// A single polling loop: reap, claim, execute, report.
///
/// Workers share nothing but the store. Stop requests (the shutdown token or a
/// `stopping` worker record) are honoured between cycles only.
pub struct Worker {
    id: String,
    queue: JobQueue,
    executor: JobExecutor,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(queue: JobQueue, executor: JobExecutor, shutdown: CancellationToken) -> Self {
        Self {
            id: new_worker_id(),
            queue,
            executor,
            shutdown,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn run(self) -> Result<()> {
        self.queue
            .register_worker(&self.id, std::process::id(), Utc::now())
            .await?;
        metrics::gauge!(telemetry::WORKERS_ACTIVE).increment(1.0);
        tracing::info!(worker_id = %self.id, pid = std::process::id(), "Worker started");

        while !self.shutdown.is_cancelled() {
            match self.cycle().await {
                Ok(Cycle::Processed) => {
                    tracing::debug!(worker_id = %self.id, "Job processed, checking for next job");
                }
                Ok(Cycle::Idle(poll_interval)) => {
                    tracing::trace!(worker_id = %self.id, "No jobs available, sleeping");
                    self.pause(poll_interval).await;
                }
                Ok(Cycle::Stop) => break,
                Err(e) => {
                    tracing::error!(
                        worker_id = %self.id,
                        error = %e,
                        "Worker cycle failed, will retry"
                    );
                    let backoff = self
                        .queue
                        .config_get()
                        .await
                        .map(|c| c.poll_interval())
                        .unwrap_or(ERROR_BACKOFF);
                    self.pause(backoff).await;
                }
            }
        }

        if let Err(e) = self
            .queue
            .mark_worker(&self.id, WorkerState::Stopped, Utc::now())
            .await
        {
            tracing::error!(worker_id = %self.id, error = %e, "Failed to deregister worker");
        }
        metrics::gauge!(telemetry::WORKERS_ACTIVE).decrement(1.0);
        tracing::info!(worker_id = %self.id, "Worker stopped gracefully");
        Ok(())
    }

    async fn cycle(&self) -> Result<Cycle> {
        match self.queue.heartbeat(&self.id, Utc::now()).await? {
            Some(WorkerState::Running) => {}
            Some(state) => {
                tracing::info!(worker_id = %self.id, state = %state, "Stop requested");
                return Ok(Cycle::Stop);
            }
            None => {
                tracing::warn!(worker_id = %self.id, "Worker record removed, stopping");
                return Ok(Cycle::Stop);
            }
        }

        let config = self.queue.config_get().await?;
        self.queue.reap_stale(Utc::now()).await?;

        let Some(job) = self.queue.claim_next(&self.id, Utc::now()).await? else {
            return Ok(Cycle::Idle(config.poll_interval()));
        };

        let result = self.execute_with_heartbeat(&job).await;
        metrics::histogram!(telemetry::JOB_DURATION).record(result.duration.as_secs_f64());

        self.report_outcome(&job, &result.outcome).await?;
        Ok(Cycle::Processed)
    }

    /// Record the outcome, retrying store errors until it is written or the
    /// claim is lost.
    ///
    /// Heartbeats pause while retrying, so a worker stuck here long enough has
    /// its job reaped by others and the next attempt returns `ClaimLost`. On
    /// shutdown the outcome is dropped and the job is left for the reaper.
    async fn report_outcome(&self, job: &Job, outcome: &ExecutionOutcome) -> Result<()> {
        let mut backoff = REPORT_BACKOFF_MIN;
        loop {
            match self.queue.report(job, &self.id, outcome, Utc::now()).await {
                Ok(_) => return Ok(()),
                Err(QueueError::ClaimLost(job_id)) => {
                    tracing::warn!(
                        worker_id = %self.id,
                        job_id = %job_id,
                        "Job was reaped while executing, outcome discarded"
                    );
                    return Ok(());
                }
                Err(e) if self.shutdown.is_cancelled() => {
                    tracing::error!(
                        worker_id = %self.id,
                        job_id = %job.id,
                        error = %e,
                        "Shutting down with unreported outcome, job left for the reaper"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        worker_id = %self.id,
                        job_id = %job.id,
                        error = %e,
                        retry_in_ms = backoff.as_millis() as u64,
                        "Failed to report outcome, retrying"
                    );
                    self.pause(backoff).await;
                    backoff = (backoff * 2).min(REPORT_BACKOFF_MAX);
                }
            }
        }
    }

    /// Run the job while keeping this worker's heartbeat fresh, so long jobs
    /// are not mistaken for orphans.
    async fn execute_with_heartbeat(&self, job: &Job) -> ExecutionResult {
        let execution = self.executor.execute(job);
        tokio::pin!(execution);

        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                result = &mut execution => return result,
                _ = ticker.tick() => {
                    if let Err(e) = self.queue.heartbeat(&self.id, Utc::now()).await {
                        tracing::warn!(worker_id = %self.id, error = %e, "Heartbeat failed");
                    }
                }
            }
        }
    }

    /// Sleep between cycles; shutdown cuts it short.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = sleep(duration) => {}
        }
    }
}

fn new_worker_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("w-{}", &uuid[..8])
}
