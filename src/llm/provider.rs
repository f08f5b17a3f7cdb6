use std::sync::Arc;

use async_trait::async_trait;

use super::types::{ChatRequest, Completion};
use crate::catalog::LlmConfig;
use crate::core::errors::ApiError;

/// One chat completion round trip.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ApiError>;
}

/// Text to fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ApiError> {
        self.embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Upstream("embedding response was empty".to_string()))
    }
}

/// Builds providers from stored LLM configurations.
pub trait ModelProvider: Send + Sync {
    fn completion(&self, config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>, ApiError>;

    /// Embedder for `model`, or the default embedding model when `None`.
    fn embedder(&self, model: Option<&str>) -> Result<Arc<dyn Embedder>, ApiError>;

    fn default_completion_model(&self) -> &str;
}
