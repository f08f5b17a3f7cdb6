//! Durable metadata: folders, content, prompts, vector DB descriptors and agent definitions.
//!
//! Everything lives in one SQLite file (`server_main.db`). Accessors are grouped per
//! entity in submodules and all hang off [`CatalogStore`].

mod autogen;
mod content;
mod folders;
mod prompts;
mod rules;
mod schema;
mod seed;
mod types;
mod vector_db;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use crate::core::errors::ApiError;

pub use seed::{system_prompt_id, SeedDefaults, DEFAULT_GROUP_CHAT, DEFAULT_NAME, PLANNER_AGENT};
pub use types::*;

const INITIALIZED_KEY: &str = "initialized";

#[derive(Debug, Clone)]
pub struct CatalogStore {
    db_path: PathBuf,
    pool: SqlitePool,
}

impl CatalogStore {
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self, ApiError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(ApiError::internal)?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { db_path, pool };
        store.create_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(&self) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        for statement in schema::STATEMENTS {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn is_initialized(&self) -> Result<bool, ApiError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM DBProperties WHERE name = ?1")
                .bind(INITIALIZED_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        Ok(value.as_deref() == Some("true"))
    }

    /// Seeds defaults once. Later calls are no-ops returning `false`.
    pub async fn initialize(&self, defaults: &SeedDefaults) -> Result<bool, ApiError> {
        if self.is_initialized().await? {
            return Ok(false);
        }

        seed::seed(self, defaults).await?;

        sqlx::query(
            "INSERT INTO DBProperties (name, value) VALUES (?1, 'true')
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(INITIALIZED_KEY)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        info!("Catalog initialized at {}", self.db_path.display());
        Ok(true)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(ApiError::internal)
}

fn from_json<T: DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidArgument(format!("{} is required", field)));
    }
    Ok(())
}
