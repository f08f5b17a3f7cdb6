use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub session_token: String,
}

/// Removing an unknown token is not an error.
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.session_token.trim().is_empty() {
        return Err(ApiError::InvalidArgument("session_token is empty".to_string()));
    }
    let was_live = state.sessions.remove(&payload.session_token);
    Ok(Json(json!({"cancelled": was_live})))
}
