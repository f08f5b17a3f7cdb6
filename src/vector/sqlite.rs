//! Embedded SQLite vector and parent stores.
//!
//! Rows are scoped by collection name. Embeddings are little-endian f32 blobs and
//! search is brute-force cosine similarity over the collection.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use super::backend::{ParentStore, ScoredDocument, VectorBackend, VectorRecord};
use super::document::{matches_filter, Document, DocumentMetadata, SearchFilter};
use crate::core::errors::ApiError;

pub async fn open_pool(db_path: &Path) -> Result<SqlitePool, ApiError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(ApiError::internal)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(ApiError::internal)?;

    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<(), ApiError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS vector_rows (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            page_content TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (collection, id)
        )",
    )
    .execute(pool)
    .await
    .map_err(ApiError::internal)?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS parent_documents (
            collection TEXT NOT NULL,
            doc_key TEXT NOT NULL,
            document TEXT NOT NULL,
            PRIMARY KEY (collection, doc_key)
        )",
    )
    .execute(pool)
    .await
    .map_err(ApiError::internal)?;

    Ok(())
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

fn row_to_document(row: &SqliteRow) -> Document {
    let raw: String = row.get("metadata");
    let metadata = match serde_json::from_str::<DocumentMetadata>(&raw) {
        Ok(metadata) => metadata,
        Err(err) => {
            let id: String = row.get("id");
            warn!(
                "Vector row {} has unreadable metadata ({}), it is only reachable by id",
                id, err
            );
            DocumentMetadata::default()
        }
    };
    Document {
        page_content: row.get("page_content"),
        metadata,
    }
}

#[derive(Clone)]
pub struct SqliteVectorBackend {
    pool: SqlitePool,
    collection: String,
}

impl SqliteVectorBackend {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    async fn load_rows(&self) -> Result<Vec<SqliteRow>, ApiError> {
        sqlx::query(
            "SELECT id, page_content, metadata, embedding FROM vector_rows
             WHERE collection = ?1 ORDER BY created_at, id",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)
    }
}

#[async_trait]
impl VectorBackend for SqliteVectorBackend {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), ApiError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        for record in &records {
            let mut document = record.document.clone();
            document.metadata.sub_docs.clear();
            let metadata = serde_json::to_string(&document.metadata).map_err(ApiError::internal)?;

            sqlx::query(
                "INSERT OR REPLACE INTO vector_rows (collection, id, page_content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&self.collection)
            .bind(&record.id)
            .bind(&document.page_content)
            .bind(&metadata)
            .bind(serialize_embedding(&record.embedding))
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredDocument>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredDocument> = self
            .load_rows()
            .await?
            .iter()
            .filter_map(|row| {
                let document = row_to_document(row);
                if let Some(filter) = filter {
                    if !matches_filter(&document.metadata_value(), filter) {
                        return None;
                    }
                }
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(embedding, &deserialize_embedding(&blob));
                Some(ScoredDocument {
                    id: row.get("id"),
                    document,
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn get_where(&self, filter: &SearchFilter) -> Result<Vec<(String, Document)>, ApiError> {
        Ok(self
            .load_rows()
            .await?
            .iter()
            .filter_map(|row| {
                let document = row_to_document(row);
                matches_filter(&document.metadata_value(), filter)
                    .then(|| (row.get::<String, _>("id"), document))
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<u64, ApiError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let mut deleted = 0;
        for id in ids {
            deleted += sqlx::query("DELETE FROM vector_rows WHERE collection = ?1 AND id = ?2")
                .bind(&self.collection)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?
                .rows_affected();
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(deleted)
    }

    async fn drop_collection(&self) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM vector_rows WHERE collection = ?1")
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_rows WHERE collection = ?1")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count.max(0) as u64)
    }
}

#[derive(Clone)]
pub struct SqliteParentStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteParentStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl ParentStore for SqliteParentStore {
    async fn mset(&self, items: Vec<(String, Document)>) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        for (key, document) in &items {
            let body = serde_json::to_string(document).map_err(ApiError::internal)?;
            sqlx::query(
                "INSERT OR REPLACE INTO parent_documents (collection, doc_key, document)
                 VALUES (?1, ?2, ?3)",
            )
            .bind(&self.collection)
            .bind(key)
            .bind(&body)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Document>>, ApiError> {
        let mut documents = Vec::with_capacity(keys.len());
        for key in keys {
            let body: Option<String> = sqlx::query_scalar(
                "SELECT document FROM parent_documents WHERE collection = ?1 AND doc_key = ?2",
            )
            .bind(&self.collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

            let document = match body {
                Some(raw) => match serde_json::from_str::<Document>(&raw) {
                    Ok(document) => Some(document),
                    Err(err) => {
                        warn!(
                            "Parent document {} in '{}' is unreadable ({}), treating it as missing",
                            key, self.collection, err
                        );
                        None
                    }
                },
                None => None,
            };
            documents.push(document);
        }
        Ok(documents)
    }

    async fn mdelete(&self, keys: &[String]) -> Result<u64, ApiError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let mut deleted = 0;
        for key in keys {
            deleted += sqlx::query(
                "DELETE FROM parent_documents WHERE collection = ?1 AND doc_key = ?2",
            )
            .bind(&self.collection)
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?
            .rows_affected();
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(deleted)
    }

    async fn clear(&self) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM parent_documents WHERE collection = ?1")
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, source: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            document: Document::new(
                format!("text of {}", id),
                DocumentMetadata {
                    doc_id: id.to_string(),
                    source_id: source.to_string(),
                    ..Default::default()
                },
            ),
            embedding,
        }
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn query_orders_by_score_and_scopes_collection() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("vectors.db")).await.unwrap();
        let a = SqliteVectorBackend::new(pool.clone(), "a");
        let b = SqliteVectorBackend::new(pool, "b");

        a.upsert(vec![
            record("near", "s1", vec![1.0, 0.1]),
            record("far", "s2", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();
        b.upsert(vec![record("other", "s1", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = a.query(&[1.0, 0.0], 5, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);

        let filter = json!({"source_id": "s2"}).as_object().cloned().unwrap();
        let filtered = a.query(&[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "far");

        assert_eq!(a.delete(&["missing".to_string()]).await.unwrap(), 0);
        assert_eq!(a.drop_collection().await.unwrap(), 2);
        assert_eq!(b.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn parent_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("docs.db")).await.unwrap();
        let store = SqliteParentStore::new(pool, "c");

        let doc = Document::new("parent", DocumentMetadata::default());
        store.mset(vec![("k1".into(), doc.clone())]).await.unwrap();

        let fetched = store.mget(&["k1".into(), "k2".into()]).await.unwrap();
        assert_eq!(fetched, vec![Some(doc), None]);
        assert_eq!(store.mdelete(&["k1".into(), "k2".into()]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unreadable_rows_degrade_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("corrupt.db")).await.unwrap();
        let backend = SqliteVectorBackend::new(pool.clone(), "c");
        backend
            .upsert(vec![record("good", "s1", vec![1.0, 0.0])])
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO vector_rows (collection, id, page_content, metadata, embedding)
             VALUES ('c', 'bad', 'text', '{not json', ?1)",
        )
        .bind(serialize_embedding(&[1.0, 0.0]))
        .execute(&pool)
        .await
        .unwrap();

        let hits = backend.query(&[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        let bad = hits.iter().find(|h| h.id == "bad").unwrap();
        assert_eq!(bad.document.metadata, DocumentMetadata::default());
        assert_eq!(backend.delete(&["bad".to_string()]).await.unwrap(), 1);

        let store = SqliteParentStore::new(pool.clone(), "c");
        sqlx::query(
            "INSERT INTO parent_documents (collection, doc_key, document) VALUES ('c', 'p', '{broken')",
        )
        .execute(&pool)
        .await
        .unwrap();
        assert_eq!(store.mget(&["p".to_string()]).await.unwrap(), vec![None]);
    }
}
