use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use super::ApiResult;
use crate::app_state::AppState;
use crate::models::status::StatusSnapshot;

/// GET /api/v1/status: snapshot of job counts and live workers.
pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StatusSnapshot>> {
    Ok(Json(state.queue.status().await?))
}

/// GET /metrics: Prometheus text exposition format.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.prometheus.render()
}
