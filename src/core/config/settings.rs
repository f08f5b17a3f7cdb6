use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::core::retry::{Backoff, RetryPolicy};

/// Tunables loaded from `<APP_DATA_PATH>/server/config.yml`. Every field has a default,
/// so a missing file is equivalent to an empty one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub server: ServerSection,
    pub retry: RetrySection,
    pub chat: ChatSection,
    pub vector: VectorSection,
    pub tools: ToolsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Empty means the localhost defaults.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5100,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub embedding: RetrySettings,
    pub completion: RetrySettings,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            embedding: RetrySettings::from(&RetryPolicy::embedding()),
            completion: RetrySettings::from(&RetryPolicy::completion()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Exponential,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff: BackoffKind,
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
}

fn default_growth_factor() -> f64 {
    2.0
}

impl From<&RetryPolicy> for RetrySettings {
    fn from(policy: &RetryPolicy) -> Self {
        let (backoff, growth_factor) = match policy.backoff {
            Backoff::Exponential { factor } => (BackoffKind::Exponential, factor),
            Backoff::Linear => (BackoffKind::Linear, 1.0),
        };
        Self {
            max_retries: policy.max_retries,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            backoff,
            growth_factor,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff {
            BackoffKind::Exponential => Backoff::Exponential {
                factor: self.growth_factor,
            },
            BackoffKind::Linear => Backoff::Linear,
        };
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_delay_ms),
            backoff,
        )
    }
}

/// How prior turns are treated when the anchor message is split into chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitHistoryPolicy {
    /// Each chunk is sent as a single-message conversation.
    #[default]
    Discard,
    /// System messages are kept ahead of each chunk.
    KeepSystem,
    /// The full history is kept, with the anchor replaced by the chunk.
    KeepAll,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub split_history: SplitHistoryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSection {
    pub multi_vector_chunk_size: usize,
}

impl Default for VectorSection {
    fn default() -> Self {
        Self {
            multi_vector_chunk_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub allow_user_tools: bool,
    pub execution_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            allow_user_tools: false,
            execution_timeout_secs: 120,
        }
    }
}

impl ServerSettings {
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(ApiError::internal)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ApiError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
            .map_err(|e| ApiError::FatalConfig(format!("Invalid settings file: {}", e)))
    }
}
