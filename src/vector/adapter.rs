use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::backend::{ParentStore, ScoredDocument, VectorBackend, VectorRecord};
use super::document::{Document, SearchFilter};
use crate::catalog::VectorDbDescriptor;
use crate::core::errors::ApiError;
use crate::core::retry::RetryPolicy;
use crate::ingest::splitter::RecursiveCharacterSplitter;
use crate::llm::Embedder;

/// One descriptor's collection: child/parent rows behind a single lock.
pub struct VectorStoreAdapter {
    descriptor: VectorDbDescriptor,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorBackend>,
    parents: Option<Arc<dyn ParentStore>>,
    child_splitter: RecursiveCharacterSplitter,
    retry: RetryPolicy,
    lock: Arc<Mutex<()>>,
}

impl VectorStoreAdapter {
    /// `parents` must be `Some` exactly when the descriptor uses multi-vector mode.
    pub fn new(
        descriptor: VectorDbDescriptor,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorBackend>,
        parents: Option<Arc<dyn ParentStore>>,
        child_chunk_size: usize,
        retry: RetryPolicy,
        lock: Arc<Mutex<()>>,
    ) -> Result<Self, ApiError> {
        if descriptor.use_multi_vector && parents.is_none() {
            return Err(ApiError::InvalidArgument(format!(
                "vector db '{}' uses multi-vector retrieval but has no parent store",
                descriptor.name
            )));
        }
        Ok(Self {
            descriptor,
            embedder,
            vectors,
            parents,
            child_splitter: RecursiveCharacterSplitter::new(child_chunk_size),
            retry,
            lock,
        })
    }

    pub fn descriptor(&self) -> &VectorDbDescriptor {
        &self.descriptor
    }

    pub fn is_multi_vector(&self) -> bool {
        self.parents.is_some()
    }

    /// Indexes parent documents. In multi-vector mode the children go to the vector
    /// index and the parents to the parent store keyed by `doc_id`.
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<usize, ApiError> {
        if documents.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().await;

        let records = match &self.parents {
            Some(parents) => {
                let mut children = Vec::new();
                let mut parent_rows = Vec::with_capacity(documents.len());
                for document in documents {
                    let doc_id = document.metadata.doc_id.clone();
                    for (index, text) in self
                        .child_splitter
                        .split(&document.page_content)
                        .into_iter()
                        .enumerate()
                    {
                        let id = Uuid::new_v5(
                            &Uuid::NAMESPACE_OID,
                            format!("{}:{}", doc_id, index).as_bytes(),
                        )
                        .to_string();
                        children.push((id, Document::new(text, document.metadata.clone())));
                    }
                    parent_rows.push((doc_id, document));
                }
                parents.mset(parent_rows).await?;
                children
            }
            None => documents
                .into_iter()
                .map(|document| {
                    let id = if document.metadata.doc_id.is_empty() {
                        Uuid::new_v4().to_string()
                    } else {
                        document.metadata.doc_id.clone()
                    };
                    (id, document)
                })
                .collect::<Vec<_>>(),
        };

        let count = records.len();
        self.upsert_with_retry(records).await?;
        debug!(
            "Indexed {} vector rows into '{}'",
            count,
            self.descriptor.collection()
        );
        Ok(count)
    }

    async fn upsert_with_retry(&self, rows: Vec<(String, Document)>) -> Result<(), ApiError> {
        let texts: Vec<String> = rows.iter().map(|(_, d)| d.page_content.clone()).collect();
        let this = self;
        let texts = &texts;
        let rows = &rows;

        self.retry
            .run("add_documents", || async move {
                let embeddings = this.embedder.embed(texts).await?;
                if embeddings.len() != rows.len() {
                    return Err(ApiError::Upstream(format!(
                        "embedder returned {} vectors for {} texts",
                        embeddings.len(),
                        rows.len()
                    )));
                }
                let records = rows
                    .iter()
                    .zip(embeddings)
                    .map(|((id, document), embedding)| VectorRecord {
                        id: id.clone(),
                        document: document.clone(),
                        embedding,
                    })
                    .collect();
                this.vectors.upsert(records).await
            })
            .await
    }

    pub async fn delete(&self, ids: &[String]) -> Result<u64, ApiError> {
        let _guard = self.lock.lock().await;
        self.vectors.delete(ids).await
    }

    /// Deletes every vector row whose metadata `key` equals `value`, plus the parents
    /// those rows point at. Returns the number of vector rows removed.
    pub async fn delete_where(&self, key: &str, value: Value) -> Result<u64, ApiError> {
        let _guard = self.lock.lock().await;

        let mut filter = SearchFilter::new();
        filter.insert(key.to_string(), value);
        let matches = self.vectors.get_where(&filter).await?;
        if matches.is_empty() {
            return Ok(0);
        }

        let mut seen = HashSet::new();
        let mut doc_ids = Vec::new();
        let mut ids = Vec::with_capacity(matches.len());
        for (id, document) in matches {
            let doc_id = document.metadata.doc_id;
            if !doc_id.is_empty() && seen.insert(doc_id.clone()) {
                doc_ids.push(doc_id);
            }
            ids.push(id);
        }

        let deleted = self.vectors.delete(&ids).await?;
        if let Some(parents) = &self.parents {
            parents.mdelete(&doc_ids).await?;
        }
        Ok(deleted)
    }

    pub async fn delete_by_source_id(&self, source_id: &str) -> Result<u64, ApiError> {
        self.delete_where("source_id", Value::String(source_id.to_string()))
            .await
    }

    pub async fn delete_by_folder(&self, folder_id: &str) -> Result<u64, ApiError> {
        self.delete_where("folder_id", Value::String(folder_id.to_string()))
            .await
    }

    /// Drops the vector collection. The parent store is cleared only on request.
    pub async fn delete_collection(&self, include_parents: bool) -> Result<u64, ApiError> {
        let _guard = self.lock.lock().await;
        let deleted = self.vectors.drop_collection().await?;
        if include_parents {
            if let Some(parents) = &self.parents {
                parents.clear().await?;
            }
        }
        Ok(deleted)
    }

    pub async fn count(&self) -> Result<u64, ApiError> {
        self.vectors.count().await
    }

    /// Scored hits with `metadata.score` stamped; parents in multi-vector mode.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<Document>, ApiError> {
        let embedding = self.embedder.embed_query(query).await?;
        let hits = self.vectors.query(&embedding, k, filter).await?;

        let threshold = score_threshold.unwrap_or(f32::NEG_INFINITY);
        let children: Vec<Document> = hits
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .map(|ScoredDocument { mut document, score, .. }| {
                document.metadata.score = score;
                document
            })
            .collect();

        match &self.parents {
            Some(parents) => self.retrieve(parents.as_ref(), children).await,
            None => Ok(children),
        }
    }

    /// Collapses score-ordered children into their parents. A parent appears once, in
    /// the order of its best child, with `sub_docs` holding its children.
    async fn retrieve(
        &self,
        parents: &dyn ParentStore,
        children: Vec<Document>,
    ) -> Result<Vec<Document>, ApiError> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Document>> = HashMap::new();
        for child in children {
            let doc_id = child.metadata.doc_id.clone();
            groups
                .entry(doc_id.clone())
                .or_insert_with(|| {
                    order.push(doc_id);
                    Vec::new()
                })
                .push(child);
        }

        let fetched = parents.mget(&order).await?;
        let mut results = Vec::with_capacity(order.len());
        for (doc_id, parent) in order.into_iter().zip(fetched) {
            let Some(mut parent) = parent else {
                warn!(
                    "Parent document {} missing from '{}', skipping its hits",
                    doc_id,
                    self.descriptor.collection()
                );
                continue;
            };
            let mut sub_docs = groups.remove(&doc_id).unwrap_or_default();
            sub_docs.sort_by(|a, b| b.metadata.score.total_cmp(&a.metadata.score));
            parent.metadata.score = sub_docs.first().map(|d| d.metadata.score).unwrap_or(0.0);
            parent.metadata.sub_docs = sub_docs;
            results.push(parent);
        }
        Ok(results)
    }
}
