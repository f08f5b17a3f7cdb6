use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::sanitize::sanitize_text;
use super::splitter::split_fixed_width;
use crate::catalog::CatalogStore;
use crate::core::errors::ApiError;
use crate::vector::{Document, DocumentMetadata, VectorStoreRegistry};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    #[serde(alias = "name")]
    pub descriptor_name: String,
    #[serde(default)]
    pub model: Option<String>,
    pub source_id: String,
    #[serde(default)]
    pub folder_path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Vector rows removed for the previous version of the source.
    pub replaced_rows: u64,
    /// Parent chunks indexed.
    pub chunks: usize,
}

/// `doc_id` of one parent chunk: stable for the same source, position and text.
pub fn chunk_doc_id(source_id: &str, index: usize, chunk: &str) -> String {
    let digest = hex::encode(Sha256::digest(chunk.as_bytes()));
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}:{}", source_id, index, digest).as_bytes(),
    )
    .to_string()
}

#[derive(Clone)]
pub struct IngestionPipeline {
    catalog: CatalogStore,
    vectors: Arc<VectorStoreRegistry>,
}

impl IngestionPipeline {
    pub fn new(catalog: CatalogStore, vectors: Arc<VectorStoreRegistry>) -> Self {
        Self { catalog, vectors }
    }

    /// Replaces everything indexed for `request.source_id` with the new content.
    pub async fn upsert(&self, request: &EmbeddingRequest) -> Result<IngestReport, ApiError> {
        if request.source_id.trim().is_empty() {
            return Err(ApiError::InvalidArgument("source_id is required".to_string()));
        }

        let descriptor = self.vectors.descriptor(&request.descriptor_name).await?;
        let chunk_size = descriptor.chunk_size;
        let adapter = self
            .vectors
            .open_descriptor(descriptor, request.model.as_deref())
            .await?;

        let replaced_rows = adapter.delete_by_source_id(&request.source_id).await?;

        let text = sanitize_text(&request.content);
        if text.trim().is_empty() {
            return Ok(IngestReport {
                replaced_rows,
                chunks: 0,
            });
        }

        let folder_id = self.resolve_folder_id(&request.folder_path).await?;

        let documents: Vec<Document> = split_fixed_width(&text, chunk_size)
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let metadata = DocumentMetadata {
                    doc_id: chunk_doc_id(&request.source_id, index, &chunk),
                    source_id: request.source_id.clone(),
                    folder_id: folder_id.clone(),
                    folder_path: request.folder_path.clone(),
                    source_path: request.source_path.clone(),
                    description: request.description.clone(),
                    source_type: 0,
                    score: 0.0,
                    ..Default::default()
                };
                Document::new(chunk, metadata)
            })
            .collect();

        let chunks = documents.len();
        adapter.add_documents(documents).await?;

        info!(
            "Ingested source {} into '{}' ({} chunks, {} rows replaced)",
            request.source_id, request.descriptor_name, chunks, replaced_rows
        );
        Ok(IngestReport {
            replaced_rows,
            chunks,
        })
    }

    async fn resolve_folder_id(&self, folder_path: &str) -> Result<String, ApiError> {
        if folder_path.trim().is_empty() {
            return Ok(String::new());
        }
        match self.catalog.get_folder_by_path(folder_path, false).await? {
            Some(folder) => Ok(folder.id),
            None => {
                warn!("Folder '{}' not found, indexing without folder_id", folder_path);
                Ok(String::new())
            }
        }
    }

    pub async fn delete_source(
        &self,
        descriptor_name: &str,
        source_id: &str,
    ) -> Result<u64, ApiError> {
        self.vectors
            .open(descriptor_name, None)
            .await?
            .delete_by_source_id(source_id)
            .await
    }

    pub async fn delete_folder(
        &self,
        descriptor_name: &str,
        folder_id: &str,
    ) -> Result<u64, ApiError> {
        self.vectors
            .open(descriptor_name, None)
            .await?
            .delete_by_folder(folder_id)
            .await
    }

    pub async fn delete_collection(
        &self,
        descriptor_name: &str,
        include_parents: bool,
    ) -> Result<u64, ApiError> {
        self.vectors
            .open(descriptor_name, None)
            .await?
            .delete_collection(include_parents)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_ids_are_deterministic() {
        let a = chunk_doc_id("s1", 0, "alpha");
        assert_eq!(a, chunk_doc_id("s1", 0, "alpha"));
        assert_ne!(a, chunk_doc_id("s1", 1, "alpha"));
        assert_ne!(a, chunk_doc_id("s2", 0, "alpha"));
        assert_ne!(a, chunk_doc_id("s1", 0, "beta"));
    }

    #[test]
    fn request_accepts_name_alias() {
        let request: EmbeddingRequest = serde_json::from_value(serde_json::json!({
            "name": "default",
            "source_id": "s1",
            "content": "text"
        }))
        .unwrap();
        assert_eq!(request.descriptor_name, "default");
        assert!(request.model.is_none());
    }
}
