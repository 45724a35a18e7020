use queuectl::config::AppConfig;
use queuectl::services::shutdown::install_shutdown_handler;
use queuectl::services::supervisor::Supervisor;
use queuectl::telemetry;
use queuectl::JobQueue;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    telemetry::init_tracing(true);

    tracing::info!("Starting queuectl worker daemon");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    if let Some(addr) = &config.metrics_addr {
        telemetry::install_prometheus_listener(addr)
            .expect("Failed to install Prometheus exporter");
    }

    // Open the job store and apply migrations
    tracing::info!(database_url = %config.database_url, "Opening job store");
    let queue = JobQueue::connect_with(&config.database_url, config.busy_timeout())
        .await
        .expect("Failed to open job store");

    let shutdown = install_shutdown_handler();

    tracing::info!(count = config.worker_count, "Worker daemon ready, starting workers");

    if let Err(e) = Supervisor::new(queue, config.worker_count).run(shutdown).await {
        tracing::error!(error = %e, "Worker daemon exited with error");
        std::process::exit(1);
    }
}
