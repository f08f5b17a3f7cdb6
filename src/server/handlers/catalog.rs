use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::catalog::{Folder, VectorDbDescriptor};
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VectorDbPayload {
    pub vector_db: VectorDbDescriptor,
}

#[derive(Debug, Default, Deserialize)]
pub struct FolderQuery {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FolderPayload {
    #[serde(default)]
    pub folder: Option<Folder>,
    /// Resolves (and creates) a slash-separated path instead of upserting one folder.
    #[serde(default)]
    pub folder_path: Option<String>,
}

pub async fn list_vector_dbs(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let list = state.catalog.list_vector_dbs().await?;
    Ok(Json(json!({"vector_db_list": list})))
}

pub async fn upsert_vector_db(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VectorDbPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state.catalog.upsert_vector_db(payload.vector_db).await?;
    Ok(Json(json!({"vector_db": saved})))
}

pub async fn list_folders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FolderQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(path) = query.path.as_deref() {
        let folder = state
            .catalog
            .get_folder_by_path(path, false)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("folder '{}'", path)))?;
        return Ok(Json(json!({"folder": folder})));
    }
    let list = state.catalog.list_folders(query.parent_id.as_deref()).await?;
    Ok(Json(json!({"folder_list": list})))
}

pub async fn upsert_folder(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FolderPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = match (payload.folder, payload.folder_path) {
        (Some(folder), _) => state.catalog.upsert_folder(folder).await?,
        (None, Some(path)) => state
            .catalog
            .get_folder_by_path(&path, true)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("folder '{}'", path)))?,
        (None, None) => {
            return Err(ApiError::InvalidArgument(
                "folder or folder_path is required".to_string(),
            ))
        }
    };
    Ok(Json(json!({"folder": folder})))
}

pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Path(folder_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.catalog.delete_folder(&folder_id).await?;
    if deleted.is_empty() {
        return Err(ApiError::NotFound(format!("folder '{}'", folder_id)));
    }
    Ok(Json(json!({"deleted_ids": deleted})))
}
