use std::env;
use std::time::Duration;

use crate::core::errors::ApiError;

pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_VECTOR_DB_NAME: &str = "default";

/// Credentials and model defaults read from the process environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_key: String,
    pub azure: bool,
    pub azure_endpoint: Option<String>,
    pub azure_api_version: Option<String>,
    pub base_url: Option<String>,
    pub completion_model: String,
    pub embedding_model: String,
    pub vector_db_name: String,
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl ProxySettings {
    /// HTTP client honoring `HTTPS_PROXY` / `NO_PROXY`.
    pub fn http_client(&self, timeout: Duration) -> Result<reqwest::Client, ApiError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(proxy_url) = self.https_proxy.as_deref() {
            let mut https = reqwest::Proxy::https(proxy_url).map_err(ApiError::invalid)?;
            if let Some(no_proxy) = self.no_proxy.as_deref() {
                https = https.no_proxy(reqwest::NoProxy::from_string(no_proxy));
            }
            builder = builder.proxy(https);
        }
        builder.build().map_err(ApiError::internal)
    }
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| ApiError::FatalConfig("OPENAI_API_KEY is not set".to_string()))?;

        let azure = get("AZURE_OPENAI")
            .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let azure_endpoint = get("AZURE_OPENAI_ENDPOINT");
        let azure_api_version = get("AZURE_OPENAI_API_VERSION");
        if azure {
            if azure_endpoint.is_none() {
                return Err(ApiError::FatalConfig(
                    "AZURE_OPENAI_ENDPOINT is required when AZURE_OPENAI is enabled".to_string(),
                ));
            }
            if azure_api_version.is_none() {
                return Err(ApiError::FatalConfig(
                    "AZURE_OPENAI_API_VERSION is required when AZURE_OPENAI is enabled".to_string(),
                ));
            }
        }

        Ok(Self {
            api_key,
            azure,
            azure_endpoint,
            azure_api_version,
            base_url: get("OPENAI_BASE_URL"),
            completion_model: get("OPENAI_COMPLETION_MODEL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            embedding_model: get("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            vector_db_name: get("VECTOR_DB_NAME")
                .unwrap_or_else(|| DEFAULT_VECTOR_DB_NAME.to_string()),
            proxy: ProxySettings {
                https_proxy: get("HTTPS_PROXY").or_else(|| get("https_proxy")),
                no_proxy: get("NO_PROXY").or_else(|| get("no_proxy")),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn direct_mode_defaults() {
        let cfg = EnvConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert!(!cfg.azure);
        assert_eq!(cfg.completion_model, "gpt-4o");
        assert_eq!(cfg.embedding_model, "text-embedding-3-small");
        assert_eq!(cfg.vector_db_name, "default");
        assert!(cfg.base_url.is_none());
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let err = EnvConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ApiError::FatalConfig(_)));
    }

    #[test]
    fn gateway_mode_requires_endpoint_and_version() {
        let err = EnvConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "k"),
            ("AZURE_OPENAI", "true"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ApiError::FatalConfig(_)));

        let cfg = EnvConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "k"),
            ("AZURE_OPENAI", "True"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
            ("AZURE_OPENAI_API_VERSION", "2024-02-01"),
            ("NO_PROXY", "localhost"),
        ]))
        .unwrap();
        assert!(cfg.azure);
        assert_eq!(cfg.azure_api_version.as_deref(), Some("2024-02-01"));
        assert_eq!(cfg.proxy.no_proxy.as_deref(), Some("localhost"));
    }
}
