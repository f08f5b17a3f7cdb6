use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{new_id, require, CatalogStore, VectorDbDescriptor, VectorDbKind};
use crate::core::errors::ApiError;

const DESCRIPTOR_COLUMNS: &str = "id, name, description, vector_db_type, vector_db_url, \
     is_use_multi_vector_retriever, doc_store_url, collection_name, chunk_size, \
     default_search_result_limit, default_score_threshold, is_enabled, is_system";

fn row_to_descriptor(row: &SqliteRow) -> VectorDbDescriptor {
    let kind: String = row.get("vector_db_type");
    VectorDbDescriptor {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        kind: VectorDbKind::parse(&kind),
        storage_url: row.get("vector_db_url"),
        use_multi_vector: row.get::<i64, _>("is_use_multi_vector_retriever") != 0,
        parent_store_url: row.get("doc_store_url"),
        collection_name: row.get("collection_name"),
        chunk_size: row.get::<i64, _>("chunk_size").max(1) as usize,
        default_k: row.get::<i64, _>("default_search_result_limit").max(1) as usize,
        default_score_threshold: row.get::<f64, _>("default_score_threshold") as f32,
        enabled: row.get::<i64, _>("is_enabled") != 0,
        system: row.get::<i64, _>("is_system") != 0,
    }
}

impl CatalogStore {
    pub async fn get_vector_db(&self, id: &str) -> Result<Option<VectorDbDescriptor>, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM VectorDBItems WHERE id = ?1",
            DESCRIPTOR_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_descriptor))
    }

    pub async fn get_vector_db_by_name(
        &self,
        name: &str,
    ) -> Result<Option<VectorDbDescriptor>, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM VectorDBItems WHERE name = ?1",
            DESCRIPTOR_COLUMNS
        ))
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_descriptor))
    }

    pub async fn list_vector_dbs(&self) -> Result<Vec<VectorDbDescriptor>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM VectorDBItems ORDER BY is_system DESC, name",
            DESCRIPTOR_COLUMNS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(rows.iter().map(row_to_descriptor).collect())
    }

    pub async fn upsert_vector_db(
        &self,
        mut descriptor: VectorDbDescriptor,
    ) -> Result<VectorDbDescriptor, ApiError> {
        require("name", &descriptor.name)?;
        require("storage_url", &descriptor.storage_url)?;
        if descriptor.chunk_size == 0 {
            return Err(ApiError::InvalidArgument("chunk_size must be positive".to_string()));
        }
        let same_name = self.get_vector_db_by_name(&descriptor.name).await?;
        if descriptor.id.trim().is_empty() {
            descriptor.id = match same_name {
                Some(existing) => existing.id,
                None => new_id(),
            };
        } else if let Some(existing) = same_name {
            if existing.id != descriptor.id {
                return Err(ApiError::InvalidArgument(format!(
                    "a vector database named '{}' already exists",
                    descriptor.name
                )));
            }
        }

        sqlx::query(
            "INSERT INTO VectorDBItems
                (id, name, description, vector_db_type, vector_db_url,
                 is_use_multi_vector_retriever, doc_store_url, collection_name, chunk_size,
                 default_search_result_limit, default_score_threshold, is_enabled, is_system)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                vector_db_type = excluded.vector_db_type,
                vector_db_url = excluded.vector_db_url,
                is_use_multi_vector_retriever = excluded.is_use_multi_vector_retriever,
                doc_store_url = excluded.doc_store_url,
                collection_name = excluded.collection_name,
                chunk_size = excluded.chunk_size,
                default_search_result_limit = excluded.default_search_result_limit,
                default_score_threshold = excluded.default_score_threshold,
                is_enabled = excluded.is_enabled,
                is_system = excluded.is_system",
        )
        .bind(&descriptor.id)
        .bind(&descriptor.name)
        .bind(&descriptor.description)
        .bind(descriptor.kind.as_str())
        .bind(&descriptor.storage_url)
        .bind(descriptor.use_multi_vector as i64)
        .bind(&descriptor.parent_store_url)
        .bind(&descriptor.collection_name)
        .bind(descriptor.chunk_size as i64)
        .bind(descriptor.default_k as i64)
        .bind(descriptor.default_score_threshold as f64)
        .bind(descriptor.enabled as i64)
        .bind(descriptor.system as i64)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(descriptor)
    }

    pub async fn delete_vector_db(&self, name: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM VectorDBItems WHERE name = ?1")
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::open_temp;

    fn descriptor(id: &str, name: &str) -> VectorDbDescriptor {
        VectorDbDescriptor {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind: VectorDbKind::Chroma,
            storage_url: format!("{}.db", name),
            use_multi_vector: false,
            parent_store_url: None,
            collection_name: name.into(),
            chunk_size: 512,
            default_k: 4,
            default_score_threshold: 0.0,
            enabled: true,
            system: false,
        }
    }

    #[tokio::test]
    async fn upsert_by_name_keeps_id() {
        let (_dir, store) = open_temp().await;
        let first = store.upsert_vector_db(descriptor("", "notes")).await.unwrap();

        let mut changed = descriptor("", "notes");
        changed.default_k = 9;
        let second = store.upsert_vector_db(changed).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list_vector_dbs().await.unwrap().len(), 1);
        assert_eq!(
            store.get_vector_db(&first.id).await.unwrap().unwrap().default_k,
            9
        );
    }

    #[tokio::test]
    async fn renaming_onto_another_descriptor_is_rejected() {
        let (_dir, store) = open_temp().await;
        store.upsert_vector_db(descriptor("a", "notes")).await.unwrap();
        store.upsert_vector_db(descriptor("b", "papers")).await.unwrap();

        let err = store
            .upsert_vector_db(descriptor("b", "notes"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
        assert_eq!(
            store.get_vector_db("b").await.unwrap().unwrap().name,
            "papers"
        );
    }
}
