//! Logging setup and metric names shared by both binaries.

use tracing_subscriber::EnvFilter;

pub const JOBS_ENQUEUED: &str = "queuectl_jobs_enqueued_total";
pub const JOBS_CLAIMED: &str = "queuectl_jobs_claimed_total";
pub const JOBS_COMPLETED: &str = "queuectl_jobs_completed_total";
pub const JOBS_RETRIED: &str = "queuectl_jobs_retried_total";
pub const JOBS_DEAD: &str = "queuectl_jobs_dead_total";
pub const JOBS_REAPED: &str = "queuectl_jobs_reaped_total";
pub const DLQ_RETRIED: &str = "queuectl_dlq_retried_total";
pub const JOB_DURATION: &str = "queuectl_job_duration_seconds";
pub const WORKERS_ACTIVE: &str = "queuectl_workers_active";

/// Initialize structured logging. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(JOBS_ENQUEUED, "Total jobs enqueued");
    metrics::describe_counter!(JOBS_CLAIMED, "Total job claims by workers");
    metrics::describe_counter!(JOBS_COMPLETED, "Total jobs completed successfully");
    metrics::describe_counter!(JOBS_RETRIED, "Total failed attempts rescheduled for retry");
    metrics::describe_counter!(JOBS_DEAD, "Total jobs moved to the dead-letter queue");
    metrics::describe_counter!(JOBS_REAPED, "Total orphaned jobs returned to pending");
    metrics::describe_counter!(DLQ_RETRIED, "Total DLQ entries re-enqueued");
    metrics::describe_histogram!(JOB_DURATION, "Wall time of a single job execution");
    metrics::describe_gauge!(WORKERS_ACTIVE, "Worker loops running in this process");
}

/// Install the global Prometheus recorder with its own HTTP listener.
pub fn install_prometheus_listener(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: std::net::SocketAddr = addr.parse()?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}
