//! OpenAI-compatible HTTP client covering direct and gateway-hosted credentials.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use super::provider::{CompletionProvider, Embedder, ModelProvider};
use super::types::{ChatRequest, Completion};
use crate::catalog::{ApiKind, LlmConfig};
use crate::core::config::ProxySettings;
use crate::core::errors::ApiError;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const EMBED_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub enum Credentials {
    Direct {
        api_key: String,
        base_url: String,
    },
    Gateway {
        api_key: String,
        endpoint: String,
        api_version: String,
    },
}

impl Credentials {
    pub fn from_llm_config(config: &LlmConfig) -> Result<Self, ApiError> {
        if config.api_key.trim().is_empty() {
            return Err(ApiError::InvalidArgument(format!(
                "LLM config '{}' has no api_key",
                config.name
            )));
        }

        match config.api_kind {
            ApiKind::Direct => Ok(Credentials::Direct {
                api_key: config.api_key.clone(),
                base_url: config
                    .base_url
                    .clone()
                    .filter(|url| !url.trim().is_empty())
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            }),
            ApiKind::Gateway => {
                let endpoint = config
                    .base_url
                    .clone()
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| {
                        ApiError::InvalidArgument(format!(
                            "gateway LLM config '{}' requires an endpoint",
                            config.name
                        ))
                    })?;
                let api_version = config
                    .api_version
                    .clone()
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| {
                        ApiError::InvalidArgument(format!(
                            "gateway LLM config '{}' requires an api_version",
                            config.name
                        ))
                    })?;
                Ok(Credentials::Gateway {
                    api_key: config.api_key.clone(),
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    api_version,
                })
            }
        }
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    credentials: Credentials,
}

impl OpenAiClient {
    pub fn new(credentials: Credentials, proxy: &ProxySettings) -> Result<Self, ApiError> {
        let http = proxy.http_client(Duration::from_secs(600))?;
        Ok(Self { http, credentials })
    }

    fn endpoint(&self, model: &str, operation: &str) -> String {
        match &self.credentials {
            Credentials::Direct { base_url, .. } => format!("{}/{}", base_url, operation),
            Credentials::Gateway {
                endpoint,
                api_version,
                ..
            } => format!(
                "{}/openai/deployments/{}/{}?api-version={}",
                endpoint, model, operation, api_version
            ),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Direct { api_key, .. } => builder.bearer_auth(api_key),
            Credentials::Gateway { api_key, .. } => builder.header("api-key", api_key),
        }
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, ApiError> {
        let res = self
            .authorize(self.http.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::RateLimited(text));
        }
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("HTTP {}: {}", status, text)));
        }

        res.json().await.map_err(|e| ApiError::Upstream(e.to_string()))
    }

    pub async fn chat(&self, request: &ChatRequest, model: &str) -> Result<Completion, ApiError> {
        let url = self.endpoint(model, "chat/completions");

        let mut body = json!({
            "model": model,
            "messages": request.messages,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(format) = &request.response_format {
                obj.insert("response_format".to_string(), format.clone());
            }
        }

        let payload = self.post(&url, &body).await?;
        let output = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let total_tokens = payload["usage"]["total_tokens"].as_u64().unwrap_or(0);

        Ok(Completion {
            output,
            total_tokens,
        })
    }

    pub async fn embed(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = self.endpoint(model, "embeddings");
        let mut embeddings = Vec::with_capacity(inputs.len());

        for batch in inputs.chunks(EMBED_BATCH_SIZE) {
            let payload = self
                .post(&url, &json!({ "model": model, "input": batch }))
                .await?;

            let mut items: Vec<(u64, Vec<f32>)> = payload["data"]
                .as_array()
                .map(|data| {
                    data.iter()
                        .enumerate()
                        .map(|(pos, item)| {
                            let index = item["index"].as_u64().unwrap_or(pos as u64);
                            let vector = item["embedding"]
                                .as_array()
                                .map(|vals| {
                                    vals.iter()
                                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                                        .collect()
                                })
                                .unwrap_or_default();
                            (index, vector)
                        })
                        .collect()
                })
                .unwrap_or_default();

            if items.len() != batch.len() {
                return Err(ApiError::Upstream(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    items.len()
                )));
            }
            items.sort_by_key(|(index, _)| *index);
            embeddings.extend(items.into_iter().map(|(_, vector)| vector));
        }

        Ok(embeddings)
    }
}

pub struct OpenAiCompletion {
    client: OpenAiClient,
    default_model: String,
}

impl OpenAiCompletion {
    pub fn new(client: OpenAiClient, default_model: impl Into<String>) -> Self {
        Self {
            client,
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ApiError> {
        let model = request
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model);
        self.client.chat(request, model).await
    }
}

pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        self.client.embed(inputs, &self.model).await
    }
}

/// Builds OpenAI-compatible providers; embeddings use the default config's credentials.
pub struct OpenAiModelProvider {
    default_config: LlmConfig,
    embedding_model: String,
    proxy: ProxySettings,
}

impl OpenAiModelProvider {
    pub fn new(default_config: LlmConfig, embedding_model: String, proxy: ProxySettings) -> Self {
        Self {
            default_config,
            embedding_model,
            proxy,
        }
    }
}

impl ModelProvider for OpenAiModelProvider {
    fn completion(&self, config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>, ApiError> {
        let client = OpenAiClient::new(Credentials::from_llm_config(config)?, &self.proxy)?;
        Ok(Arc::new(OpenAiCompletion::new(client, config.model.clone())))
    }

    fn embedder(&self, model: Option<&str>) -> Result<Arc<dyn Embedder>, ApiError> {
        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.embedding_model);
        let client = OpenAiClient::new(
            Credentials::from_llm_config(&self.default_config)?,
            &self.proxy,
        )?;
        Ok(Arc::new(OpenAiEmbedder::new(client, model)))
    }

    fn default_completion_model(&self) -> &str {
        &self.default_config.model
    }
}
