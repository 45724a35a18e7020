use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{QueueError, Result};
use crate::services::executor::JobExecutor;
use crate::services::queue::JobQueue;
use crate::services::worker::Worker;

/// Runs `count` independent worker loops until they are all stopped.
pub struct Supervisor {
    queue: JobQueue,
    executor: JobExecutor,
    count: usize,
}

impl Supervisor {
    pub fn new(queue: JobQueue, count: usize) -> Self {
        Self {
            queue,
            executor: JobExecutor::default(),
            count,
        }
    }

    /// Spawn the workers and wait for them.
    ///
    /// Cancelling `shutdown` (or `queuectl worker stop`) lets every loop finish
    /// its current job, deregister and exit. Returns the first worker error.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        if self.count == 0 {
            return Err(QueueError::Validation(
                "worker count must be at least 1".to_string(),
            ));
        }

        let mut workers = JoinSet::new();
        for _ in 0..self.count {
            let worker = Worker::new(self.queue.clone(), self.executor.clone(), shutdown.clone());
            tracing::debug!(worker_id = %worker.id(), "Spawning worker");
            workers.spawn(worker.run());
        }
        tracing::info!(count = self.count, "Started workers");

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Worker exited with error");
                    first_error.get_or_insert(e);
                }
                Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            }
        }

        tracing::info!("All workers stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
