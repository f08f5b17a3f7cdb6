use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::info;

use super::adapter::VectorStoreAdapter;
use super::backend::ParentStore;
use super::sqlite::{open_pool, SqliteParentStore, SqliteVectorBackend};
use crate::catalog::{CatalogStore, VectorDbDescriptor, VectorDbKind};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;
use crate::core::retry::RetryPolicy;
use crate::llm::ModelProvider;

/// Opens adapters by descriptor name. Pools are cached per storage file and every
/// adapter for the same descriptor shares one lock.
pub struct VectorStoreRegistry {
    catalog: CatalogStore,
    paths: AppPaths,
    models: Arc<dyn ModelProvider>,
    retry: RetryPolicy,
    child_chunk_size: usize,
    pools: Mutex<HashMap<PathBuf, SqlitePool>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl VectorStoreRegistry {
    pub fn new(
        catalog: CatalogStore,
        paths: AppPaths,
        models: Arc<dyn ModelProvider>,
        retry: RetryPolicy,
        child_chunk_size: usize,
    ) -> Self {
        Self {
            catalog,
            paths,
            models,
            retry,
            child_chunk_size,
            pools: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn descriptor(&self, name: &str) -> Result<VectorDbDescriptor, ApiError> {
        self.catalog
            .get_vector_db_by_name(name)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("vector db '{}'", name)))
    }

    pub async fn open(
        &self,
        name: &str,
        model: Option<&str>,
    ) -> Result<VectorStoreAdapter, ApiError> {
        let descriptor = self.descriptor(name).await?;
        self.open_descriptor(descriptor, model).await
    }

    pub async fn open_descriptor(
        &self,
        descriptor: VectorDbDescriptor,
        model: Option<&str>,
    ) -> Result<VectorStoreAdapter, ApiError> {
        if !descriptor.enabled {
            return Err(ApiError::InvalidArgument(format!(
                "vector db '{}' is disabled",
                descriptor.name
            )));
        }
        if descriptor.kind == VectorDbKind::PgVector {
            return Err(ApiError::InvalidArgument(format!(
                "vector db '{}': pgvector backends are not supported by this server",
                descriptor.name
            )));
        }

        let collection = descriptor.collection().to_string();
        let vector_pool = self.pool_for(&descriptor.storage_url).await?;
        let vectors = Arc::new(SqliteVectorBackend::new(vector_pool.clone(), collection.clone()));

        let parents = if descriptor.use_multi_vector {
            let pool = match descriptor.parent_store_url.as_deref() {
                Some(url) if !url.trim().is_empty() => self.pool_for(url).await?,
                _ => vector_pool,
            };
            Some(Arc::new(SqliteParentStore::new(pool, collection)) as Arc<dyn ParentStore>)
        } else {
            None
        };

        let embedder = self.models.embedder(model)?;
        let lock = self.lock_for(&descriptor.name).await;

        VectorStoreAdapter::new(
            descriptor,
            embedder,
            vectors,
            parents,
            self.child_chunk_size,
            self.retry.clone(),
            lock,
        )
    }

    async fn pool_for(&self, storage_url: &str) -> Result<SqlitePool, ApiError> {
        let path = self.paths.resolve_storage(storage_url);
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(&path) {
            return Ok(pool.clone());
        }
        info!("Opening vector storage at {}", path.display());
        let pool = open_pool(&path).await?;
        pools.insert(path, pool.clone());
        Ok(pool)
    }

    async fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
