use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let initialized = state.catalog.is_initialized().await?;
    Ok(Json(json!({
        "status": "ok",
        "initialized": initialized,
        "live_sessions": state.sessions.len(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
    })))
}
