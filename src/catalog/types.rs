use serde::{Deserialize, Serialize};
use serde_json::Value;

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn default_folder_type() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub folder_name: String,
    #[serde(default = "default_folder_type")]
    pub folder_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default = "empty_object")]
    pub extended_properties: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(default)]
    pub id: String,
    pub folder_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default = "empty_object")]
    pub extended_properties: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub id: String,
    pub tag: String,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptItem {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt_template_text: String,
    #[serde(default)]
    pub prompt_template_type: String,
    #[serde(default = "empty_object")]
    pub extended_properties: Value,
    #[serde(default)]
    pub system: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDbKind {
    Chroma,
    #[serde(rename = "pgvector")]
    PgVector,
    Other,
}

impl VectorDbKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorDbKind::Chroma => "chroma",
            VectorDbKind::PgVector => "pgvector",
            VectorDbKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "chroma" => VectorDbKind::Chroma,
            "pgvector" => VectorDbKind::PgVector,
            _ => VectorDbKind::Other,
        }
    }
}

fn default_chunk_size() -> usize {
    4096
}

fn default_k() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// Named vector collection plus where its rows and parent documents live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDbDescriptor {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: VectorDbKind,
    pub storage_url: String,
    #[serde(default)]
    pub use_multi_vector: bool,
    #[serde(default)]
    pub parent_store_url: Option<String>,
    #[serde(default)]
    pub collection_name: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default)]
    pub default_score_threshold: f32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub system: bool,
}

impl VectorDbDescriptor {
    pub fn collection(&self) -> &str {
        if self.collection_name.trim().is_empty() {
            &self.name
        } else {
            &self.collection_name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    #[serde(alias = "openai")]
    Direct,
    #[serde(alias = "azure")]
    Gateway,
}

impl ApiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKind::Direct => "direct",
            ApiKind::Gateway => "gateway",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "gateway" | "azure" => ApiKind::Gateway,
            _ => ApiKind::Direct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub name: String,
    pub api_kind: ApiKind,
    #[serde(default)]
    pub api_version: Option<String>,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub path: String,
}

/// Descriptor reference carried by an agent; each becomes one retrieval tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentVectorDbItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub score_threshold: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_message: String,
    #[serde(default)]
    pub code_execution: bool,
    #[serde(default)]
    pub llm_config_name: String,
    #[serde(default)]
    pub tool_names: Vec<String>,
    #[serde(default)]
    pub vector_db_items: Vec<AgentVectorDbItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupChatDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub llm_config_name: String,
    #[serde(default)]
    pub agent_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoProcessItem {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub item_type: String,
    #[serde(default)]
    pub action_type: String,
    #[serde(default = "empty_object")]
    pub extended_properties: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoProcessRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub target_folder_id: Option<String>,
    #[serde(default)]
    pub auto_process_item_id: Option<String>,
    #[serde(default)]
    pub destination_folder_id: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub search_text: String,
    #[serde(default = "empty_object")]
    pub search_condition: Value,
}
