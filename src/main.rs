use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;

use queuectl::app_state::AppState;
use queuectl::config::AppConfig;
use queuectl::models::job::{JobStatus, NewJob};
use queuectl::models::status::StatusSnapshot;
use queuectl::routes;
use queuectl::services::shutdown::install_shutdown_handler;
use queuectl::services::supervisor::Supervisor;
use queuectl::telemetry;
use queuectl::JobQueue;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about = "CLI job queue with retries and a dead-letter queue")]
struct Cli {
    /// SQLite database URL (overrides QUEUECTL_DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize the database
    Init,
    /// Add a job from inline JSON or @file.json
    Enqueue { payload: String },
    /// List jobs
    List {
        /// Only show jobs in this state
        #[arg(long)]
        state: Option<JobStatus>,
    },
    /// Show job counts and active workers
    Status,
    /// Manage workers
    #[command(subcommand)]
    Worker(WorkerCommand),
    /// Manage the dead-letter queue
    #[command(subcommand)]
    Dlq(DlqCommand),
    /// Manage queue configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Serve the HTTP API
    Serve {
        /// Bind address (overrides QUEUECTL_BIND_ADDR)
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum WorkerCommand {
    /// Run workers in the foreground until interrupted or stopped
    Start {
        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        count: usize,
    },
    /// Ask all running workers to stop after their current job
    Stop,
}

#[derive(Debug, Subcommand)]
enum DlqCommand {
    /// List dead jobs
    List,
    /// Re-enqueue a dead job
    Retry { job_id: String },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Show all config values
    Get,
    /// Set a config key (max-retries, backoff-base, poll-interval-sec, timeout-seconds)
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    telemetry::init_tracing(config.log_json);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: AppConfig) -> CliResult {
    let queue = JobQueue::connect_with(&config.database_url, config.busy_timeout()).await?;

    match command {
        Command::Init => {
            println!("Database initialized at {}", config.database_url);
        }
        Command::Enqueue { payload } => {
            let job = queue.enqueue(load_payload(&payload)?).await?;
            println!("Enqueued job '{}' (scheduled at {})", job.id, job.run_at.to_rfc3339());
        }
        Command::List { state } => {
            let jobs = queue.list_jobs(state).await?;
            if jobs.is_empty() {
                println!("No jobs found");
            }
            for job in jobs {
                println!(
                    "{}\t{}\t{}\t(attempts: {}, run_at: {})",
                    job.id,
                    job.status,
                    job.command,
                    job.attempts,
                    job.run_at.to_rfc3339()
                );
            }
        }
        Command::Status => print_status(&config, &queue.status().await?),
        Command::Worker(WorkerCommand::Start { count }) => {
            if let Some(addr) = &config.metrics_addr {
                telemetry::install_prometheus_listener(addr)?;
            }
            let shutdown = install_shutdown_handler();
            Supervisor::new(queue, count).run(shutdown).await?;
        }
        Command::Worker(WorkerCommand::Stop) => {
            let signalled = queue.request_stop_all().await?;
            println!("Signaled {} worker(s) to stop gracefully", signalled);
        }
        Command::Dlq(DlqCommand::List) => {
            let entries = queue.dlq_list().await?;
            if entries.is_empty() {
                println!("Dead Letter Queue is empty");
            } else {
                println!("id\tattempts\tfailed_at\tlast_error");
            }
            for entry in entries {
                let error: String = entry.last_error.chars().take(50).collect();
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.id,
                    entry.attempts,
                    entry.failed_at.to_rfc3339(),
                    error
                );
            }
        }
        Command::Dlq(DlqCommand::Retry { job_id }) => {
            let job = queue.dlq_retry(&job_id, Utc::now()).await?;
            println!("Re-enqueued DLQ job '{}'", job.id);
        }
        Command::Config(ConfigCommand::Get) => {
            let current = queue.config_get().await?;
            println!("max_retries = {}", current.max_retries);
            println!("backoff_base = {}", current.backoff_base);
            println!("poll_interval_sec = {}", current.poll_interval_sec);
            println!("timeout_seconds = {}", current.timeout_seconds);
        }
        Command::Config(ConfigCommand::Set { key, value }) => {
            queue.config_set(&key, &value).await?;
            println!("Set {} = {}", key, value);
        }
        Command::Serve { bind } => serve(queue, bind.unwrap_or(config.bind_addr)).await?,
    }

    Ok(())
}

async fn serve(queue: JobQueue, bind_addr: String) -> CliResult {
    let prometheus = PrometheusBuilder::new().install_recorder()?;
    telemetry::describe_metrics();

    let app = routes::router(AppState::new(queue, prometheus));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    let shutdown = install_shutdown_handler();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Parse an enqueue payload given inline or as `@path/to/job.json`.
fn load_payload(arg: &str) -> CliResult<NewJob> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&raw)?)
}

fn print_status(config: &AppConfig, status: &StatusSnapshot) {
    println!("=== queuectl status ===");
    println!("Database: {}\n", config.database_url);
    println!("Jobs:");
    for state in [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Dead,
    ] {
        println!("  {:<10} {}", state, status.jobs.get(state));
    }
    println!("  {:<10} {}\n", "dlq", status.dlq);
    println!("Workers:");
    if status.workers.is_empty() {
        println!("  (no active workers)");
    }
    for worker in &status.workers {
        println!(
            "  {}\tPID={}\tstate={}\tlast_heartbeat={}",
            worker.worker_id,
            worker.pid,
            worker.state,
            worker.last_heartbeat.to_rfc3339()
        );
    }
}
