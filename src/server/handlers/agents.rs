use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::agent::AgentRunRequest;
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn run_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AgentRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut run = state.agents.start(payload).await?;
    let mut messages = Vec::new();
    while let Some(message) = run.next_message().await? {
        messages.push(message);
    }
    Ok(Json(json!({
        "messages": messages,
        "stop_reason": run.stop_reason(),
    })))
}
