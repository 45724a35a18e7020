use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::error::QueueError;

pub mod config;
pub mod dlq;
pub mod health;
pub mod jobs;
pub mod status;

/// Build the HTTP API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(status::prometheus_metrics))
        .route("/api/v1/status", get(status::get_status))
        .route("/api/v1/jobs", get(jobs::list_jobs).post(jobs::enqueue_job))
        .route("/api/v1/jobs/{id}", get(jobs::get_job))
        .route("/api/v1/dlq", get(dlq::list_dlq))
        .route("/api/v1/dlq/{id}/retry", post(dlq::retry_dlq))
        .route("/api/v1/config", get(config::get_config))
        .route("/api/v1/config/{key}", put(config::set_config))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB limit
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `QueueError` rendered as a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub QueueError);

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueueError::DuplicateJob(_) | QueueError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            QueueError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
