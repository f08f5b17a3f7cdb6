use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::agent::{AgentFactory, ToolPolicy};
use crate::catalog::{CatalogStore, LlmConfig, SeedDefaults, DEFAULT_NAME};
use crate::chat::ChatOrchestrator;
use crate::core::config::{AppPaths, EnvConfig, ServerSettings};
use crate::core::errors::ApiError;
use crate::extract::TextExtractor;
use crate::ingest::IngestionPipeline;
use crate::llm::{ModelProvider, OpenAiModelProvider};
use crate::retrieval::{RetrievalService, Retriever};
use crate::session::SessionRegistry;
use crate::vector::VectorStoreRegistry;

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<ServerSettings>,
    pub catalog: CatalogStore,
    pub models: Arc<dyn ModelProvider>,
    pub vectors: Arc<VectorStoreRegistry>,
    pub ingestion: IngestionPipeline,
    pub retrieval: Arc<RetrievalService>,
    pub sessions: SessionRegistry,
    pub agents: AgentFactory,
    pub extractor: TextExtractor,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Reads the environment, opens and seeds the catalog and wires the services.
    pub async fn initialize() -> Result<Arc<Self>, ApiError> {
        let paths = AppPaths::from_env()?;
        let env = EnvConfig::from_env()?;
        let settings = ServerSettings::load(&paths.settings_path)?;

        let catalog = CatalogStore::open(paths.main_db_path.clone()).await?;
        let defaults = SeedDefaults::new(&paths, &env);
        if catalog.initialize(&defaults).await? {
            info!("Seeded catalog at {}", paths.main_db_path.display());
        }

        let models: Arc<dyn ModelProvider> = Arc::new(OpenAiModelProvider::new(
            defaults.llm.clone(),
            env.embedding_model.clone(),
            env.proxy.clone(),
        ));
        let extractor = TextExtractor::new(&env.proxy)?;
        Ok(Arc::new(Self::from_parts(
            paths, settings, catalog, models, extractor,
        )))
    }

    pub fn from_parts(
        paths: AppPaths,
        settings: ServerSettings,
        catalog: CatalogStore,
        models: Arc<dyn ModelProvider>,
        extractor: TextExtractor,
    ) -> Self {
        let vectors = Arc::new(VectorStoreRegistry::new(
            catalog.clone(),
            paths.clone(),
            Arc::clone(&models),
            settings.retry.embedding.to_policy(),
            settings.vector.multi_vector_chunk_size,
        ));
        let ingestion = IngestionPipeline::new(catalog.clone(), Arc::clone(&vectors));
        let retrieval = Arc::new(RetrievalService::new(catalog.clone(), Arc::clone(&vectors)));
        let sessions = SessionRegistry::new();
        let agents = AgentFactory::new(
            catalog.clone(),
            Arc::clone(&models),
            Arc::clone(&retrieval) as Arc<dyn Retriever>,
            sessions.clone(),
            ToolPolicy::from_settings(&settings.tools),
            paths.work_dir.clone(),
        )
        .with_tool_timeout(Duration::from_secs(settings.tools.execution_timeout_secs))
        .with_retry(settings.retry.completion.to_policy());

        Self {
            paths: Arc::new(paths),
            settings: Arc::new(settings),
            catalog,
            models,
            vectors,
            ingestion,
            retrieval,
            sessions,
            agents,
            extractor,
            started_at: Utc::now(),
        }
    }

    async fn default_llm_config(&self) -> Result<LlmConfig, ApiError> {
        self.catalog
            .get_llm_config(DEFAULT_NAME)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("llm config '{}'", DEFAULT_NAME)))
    }

    /// Chat orchestrator bound to the `default` LLM config.
    pub async fn chat_orchestrator(&self) -> Result<ChatOrchestrator, ApiError> {
        let config = self.default_llm_config().await?;
        let completion = self.models.completion(&config)?;
        Ok(ChatOrchestrator::new(
            completion,
            Arc::clone(&self.retrieval) as Arc<dyn Retriever>,
            config.model,
        )
        .with_retry(self.settings.retry.completion.to_policy())
        .with_split_history(self.settings.chat.split_history))
    }
}
