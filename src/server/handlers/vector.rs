use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::ingest::EmbeddingRequest;
use crate::retrieval::{Retriever, VectorSearchRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchPayload {
    pub vector_search_requests: Vec<VectorSearchRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertPayload {
    pub embedding_request: EmbeddingRequest,
}

#[derive(Debug, Deserialize)]
pub struct DeleteTarget {
    #[serde(alias = "descriptor_name")]
    pub name: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub folder_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeletePayload {
    pub embedding_request: DeleteTarget,
}

#[derive(Debug, Deserialize)]
pub struct CollectionDeletePayload {
    #[serde(alias = "vector_db_name")]
    pub name: String,
    #[serde(default = "default_true")]
    pub include_parents: bool,
}

fn default_true() -> bool {
    true
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state.retrieval.search(&payload.vector_search_requests).await?;
    Ok(Json(json!({"documents": documents})))
}

pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpsertPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let request = payload.embedding_request;
    let report = state.ingestion.upsert(&request).await?;
    Ok(Json(json!({
        "log": format!("indexed {} chunks for {}", report.chunks, request.source_id),
        "replaced_rows": report.replaced_rows,
        "chunks": report.chunks,
    })))
}

/// Deletes by `source_id`, or by `folder_path` when no source is given.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeletePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let target = payload.embedding_request;
    let deleted = match (target.source_id.as_deref(), target.folder_path.as_deref()) {
        (Some(source_id), _) if !source_id.trim().is_empty() => {
            state.ingestion.delete_source(&target.name, source_id).await?
        }
        (_, Some(folder_path)) if !folder_path.trim().is_empty() => {
            let folder = state
                .catalog
                .get_folder_by_path(folder_path, false)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("folder '{}'", folder_path)))?;
            state.ingestion.delete_folder(&target.name, &folder.id).await?
        }
        _ => {
            return Err(ApiError::InvalidArgument(
                "source_id or folder_path is required".to_string(),
            ))
        }
    };
    Ok(Json(json!({"deleted": deleted})))
}

pub async fn delete_collection(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CollectionDeletePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .ingestion
        .delete_collection(&payload.name, payload.include_parents)
        .await?;
    Ok(Json(json!({"deleted": deleted})))
}
