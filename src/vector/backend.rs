use async_trait::async_trait;

use super::document::{Document, SearchFilter};
use crate::core::errors::ApiError;

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub document: Document,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub id: String,
    pub document: Document,
    /// Relevance in `[-1, 1]`, higher is closer.
    pub score: f32,
}

/// Embedding rows of one collection.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), ApiError>;

    /// Top `k` rows by descending score among those matching `filter`.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredDocument>, ApiError>;

    /// Rows matching `filter` as `(id, document)`.
    async fn get_where(&self, filter: &SearchFilter) -> Result<Vec<(String, Document)>, ApiError>;

    async fn delete(&self, ids: &[String]) -> Result<u64, ApiError>;

    async fn drop_collection(&self) -> Result<u64, ApiError>;

    async fn count(&self) -> Result<u64, ApiError>;
}

/// Key/value store of parent documents keyed by `doc_id`.
#[async_trait]
pub trait ParentStore: Send + Sync {
    async fn mset(&self, items: Vec<(String, Document)>) -> Result<(), ApiError>;

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Document>>, ApiError>;

    async fn mdelete(&self, keys: &[String]) -> Result<u64, ApiError>;

    async fn clear(&self) -> Result<u64, ApiError>;
}
