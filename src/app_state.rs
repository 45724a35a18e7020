use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::services::queue::JobQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub prometheus: Arc<PrometheusHandle>,
}

impl AppState {
    pub fn new(queue: JobQueue, prometheus: PrometheusHandle) -> Self {
        Self {
            queue: Arc::new(queue),
            prometheus: Arc::new(prometheus),
        }
    }
}
