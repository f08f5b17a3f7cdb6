use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::chat::ChatTurnRequest;
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatTurnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let orchestrator = state.chat_orchestrator().await?;
    let response = orchestrator.run(payload).await?;
    Ok(Json(response))
}
