//! Named-descriptor semantic search with `folder_path` filter rewriting.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::CatalogStore;
use crate::core::errors::ApiError;
use crate::vector::{Document, SearchFilter, VectorStoreRegistry};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchKwargs {
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub filter: Option<SearchFilter>,
    #[serde(default)]
    pub score_threshold: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchRequest {
    #[serde(alias = "descriptor_name")]
    pub name: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub search_kwargs: SearchKwargs,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Runs every request in order and concatenates the results.
    async fn search(&self, requests: &[VectorSearchRequest]) -> Result<Vec<Document>, ApiError>;
}

#[derive(Clone)]
pub struct RetrievalService {
    catalog: CatalogStore,
    vectors: Arc<VectorStoreRegistry>,
}

impl RetrievalService {
    pub fn new(catalog: CatalogStore, vectors: Arc<VectorStoreRegistry>) -> Self {
        Self { catalog, vectors }
    }

    /// Replaces `folder_path` with the resolved `folder_id`. Other keys are kept as-is.
    pub async fn rewrite_filter(
        &self,
        filter: Option<SearchFilter>,
    ) -> Result<Option<SearchFilter>, ApiError> {
        let Some(mut filter) = filter else {
            return Ok(None);
        };
        let Some(path) = filter.remove("folder_path") else {
            return Ok(Some(filter));
        };

        let path = path.as_str().ok_or_else(|| {
            ApiError::InvalidArgument("filter.folder_path must be a string".to_string())
        })?;
        let folder = self
            .catalog
            .get_folder_by_path(path, false)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("folder '{}'", path)))?;

        filter.insert("folder_id".to_string(), Value::String(folder.id));
        Ok(Some(filter))
    }

    pub async fn search_one(&self, request: &VectorSearchRequest) -> Result<Vec<Document>, ApiError> {
        if request.query.trim().is_empty() {
            return Err(ApiError::InvalidArgument("query is empty".to_string()));
        }

        let descriptor = self.vectors.descriptor(&request.name).await?;
        let k = request.search_kwargs.k.unwrap_or(descriptor.default_k);
        let threshold = request.search_kwargs.score_threshold.or(
            (descriptor.default_score_threshold > 0.0).then_some(descriptor.default_score_threshold),
        );
        let filter = self
            .rewrite_filter(request.search_kwargs.filter.clone())
            .await?;

        let adapter = self
            .vectors
            .open_descriptor(descriptor, request.model.as_deref())
            .await?;
        let documents = adapter
            .similarity_search(&request.query, k, filter.as_ref(), threshold)
            .await?;

        debug!(
            "Search on '{}' returned {} documents",
            request.name,
            documents.len()
        );
        Ok(documents)
    }
}

#[async_trait]
impl Retriever for RetrievalService {
    async fn search(&self, requests: &[VectorSearchRequest]) -> Result<Vec<Document>, ApiError> {
        let mut documents = Vec::new();
        for request in requests {
            documents.extend(self.search_one(request).await?);
        }
        Ok(documents)
    }
}
