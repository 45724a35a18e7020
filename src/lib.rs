//! Single-node background job queue.
//!
//! Jobs are shell commands persisted in SQLite. Worker loops (in one process
//! or many) claim them atomically, run them under a timeout, retry failures
//! with exponential backoff and move exhausted jobs to a dead-letter queue.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod telemetry;

pub use error::{QueueError, Result};
pub use services::queue::JobQueue;
