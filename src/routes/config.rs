use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::ApiResult;
use crate::app_state::AppState;
use crate::config::QueueConfig;

#[derive(Debug, Deserialize)]
pub struct SetConfigRequest {
    /// Accepts `"5"` as well as `5`.
    pub value: serde_json::Value,
}

/// GET /api/v1/config
pub async fn get_config(State(state): State<AppState>) -> ApiResult<Json<QueueConfig>> {
    Ok(Json(state.queue.config_get().await?))
}

/// PUT /api/v1/config/{key}
pub async fn set_config(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<SetConfigRequest>,
) -> ApiResult<Json<QueueConfig>> {
    let value = match request.value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    Ok(Json(state.queue.config_set(&key, &value).await?))
}
