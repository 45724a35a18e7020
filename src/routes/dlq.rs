use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use super::ApiResult;
use crate::app_state::AppState;
use crate::models::dlq::DlqEntry;
use crate::models::job::Job;

/// GET /api/v1/dlq
pub async fn list_dlq(State(state): State<AppState>) -> ApiResult<Json<Vec<DlqEntry>>> {
    Ok(Json(state.queue.dlq_list().await?))
}

/// POST /api/v1/dlq/{id}/retry: move a dead job back to `pending`.
pub async fn retry_dlq(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.queue.dlq_retry(&id, Utc::now()).await?))
}
