use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::ApiResult;
use crate::app_state::AppState;
use crate::models::job::{Job, JobStatus, JobSummary, NewJob};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<JobStatus>,
}

/// POST /api/v1/jobs: enqueue a job.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(payload): Json<NewJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = state.queue.enqueue(payload).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/v1/jobs: list jobs, optionally filtered with `?status=`.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<JobSummary>>> {
    Ok(Json(state.queue.list_jobs(params.status).await?))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.queue.get_job(&id).await?))
}
