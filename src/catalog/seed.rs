use serde_json::json;
use uuid::Uuid;

use super::{
    AgentDefinition, ApiKind, CatalogStore, GroupChatDefinition, LlmConfig, PromptItem,
    VectorDbDescriptor, VectorDbKind,
};
use crate::core::config::{AppPaths, EnvConfig};
use crate::core::errors::ApiError;

pub const DEFAULT_NAME: &str = "default";
pub const PLANNER_AGENT: &str = "planner";
pub const DEFAULT_GROUP_CHAT: &str = "default_group_chat";

const PLANNER_SYSTEM_MESSAGE: &str = "You are a planner. Break the user's request into concrete \
steps, delegate each step to the most suitable agent or tool, check the results, and reply \
with the final answer. When the task is complete, end your reply with TERMINATE.";

const SYSTEM_PROMPTS: &[(&str, &str, &str)] = &[
    (
        "title",
        "Title generation",
        "Create a short, descriptive title for the following text. Reply with the title only.",
    ),
    (
        "summary",
        "Summary",
        "Summarize the following text concisely while keeping every important fact.",
    ),
    (
        "tags",
        "Tag extraction",
        "List up to five keywords that describe the following text, comma separated.",
    ),
    (
        "background_information",
        "Background information",
        "Describe the background knowledge a reader needs to understand the following text.",
    ),
    (
        "related_information",
        "Related information",
        "The following is related information retrieved from the knowledge base. Use it when it \
         helps answer the request.",
    ),
    (
        "summarize_split_outputs",
        "Merge split outputs",
        "The following are answers produced for consecutive parts of one long request. Merge \
         them into a single coherent answer.",
    ),
];

/// Stable id of a library prompt, identical across installations.
pub fn system_prompt_id(name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("system-prompt:{}", name).as_bytes()).to_string()
}

/// Values the first initialization writes into an empty catalog.
#[derive(Debug, Clone)]
pub struct SeedDefaults {
    pub vector_storage_url: String,
    pub parent_store_url: String,
    pub llm: LlmConfig,
}

impl SeedDefaults {
    pub fn new(paths: &AppPaths, env: &EnvConfig) -> Self {
        let (api_kind, base_url, api_version) = if env.azure {
            (
                ApiKind::Gateway,
                env.azure_endpoint.clone(),
                env.azure_api_version.clone(),
            )
        } else {
            (ApiKind::Direct, env.base_url.clone(), None)
        };

        Self {
            vector_storage_url: paths
                .vector_db_dir
                .join("default_vectors.db")
                .to_string_lossy()
                .into_owned(),
            parent_store_url: paths
                .vector_db_dir
                .join("default_doc_store.db")
                .to_string_lossy()
                .into_owned(),
            llm: LlmConfig {
                name: DEFAULT_NAME.to_string(),
                api_kind,
                api_version,
                model: env.completion_model.clone(),
                api_key: env.api_key.clone(),
                base_url,
            },
        }
    }
}

pub(super) async fn seed(store: &CatalogStore, defaults: &SeedDefaults) -> Result<(), ApiError> {
    if store.get_vector_db_by_name(DEFAULT_NAME).await?.is_none() {
        store
            .upsert_vector_db(VectorDbDescriptor {
                id: String::new(),
                name: DEFAULT_NAME.to_string(),
                description: "Default knowledge base".to_string(),
                kind: VectorDbKind::Chroma,
                storage_url: defaults.vector_storage_url.clone(),
                use_multi_vector: true,
                parent_store_url: Some(defaults.parent_store_url.clone()),
                collection_name: "ai_app_default_collection".to_string(),
                chunk_size: 4096,
                default_k: 5,
                default_score_threshold: 0.0,
                enabled: true,
                system: true,
            })
            .await?;
    }

    store.upsert_llm_config(&defaults.llm).await?;

    store
        .upsert_agent(&AgentDefinition {
            name: PLANNER_AGENT.to_string(),
            description: "Plans the work and coordinates the other agents".to_string(),
            system_message: PLANNER_SYSTEM_MESSAGE.to_string(),
            code_execution: false,
            llm_config_name: DEFAULT_NAME.to_string(),
            tool_names: Vec::new(),
            vector_db_items: Vec::new(),
        })
        .await?;

    store
        .upsert_group_chat(&GroupChatDefinition {
            name: DEFAULT_GROUP_CHAT.to_string(),
            description: "Planner-led group chat".to_string(),
            llm_config_name: DEFAULT_NAME.to_string(),
            agent_names: vec![PLANNER_AGENT.to_string()],
        })
        .await?;

    for (name, description, text) in SYSTEM_PROMPTS {
        store
            .upsert_prompt(PromptItem {
                id: system_prompt_id(name),
                name: name.to_string(),
                description: description.to_string(),
                prompt_template_text: text.to_string(),
                prompt_template_type: "system".to_string(),
                extended_properties: json!({}),
                system: true,
            })
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::open_temp;

    fn defaults() -> SeedDefaults {
        SeedDefaults {
            vector_storage_url: "default_vectors.db".into(),
            parent_store_url: "default_doc_store.db".into(),
            llm: LlmConfig {
                name: DEFAULT_NAME.into(),
                api_kind: ApiKind::Direct,
                api_version: None,
                model: "gpt-4o".into(),
                api_key: "sk-test".into(),
                base_url: None,
            },
        }
    }

    #[tokio::test]
    async fn seeds_once() {
        let (_dir, store) = open_temp().await;

        assert!(store.initialize(&defaults()).await.unwrap());
        assert!(!store.initialize(&defaults()).await.unwrap());

        let descriptor = store.get_vector_db_by_name("default").await.unwrap().unwrap();
        assert!(descriptor.use_multi_vector);
        assert_eq!(descriptor.chunk_size, 4096);

        let group = store.get_group_chat(DEFAULT_GROUP_CHAT).await.unwrap().unwrap();
        assert_eq!(group.agent_names, vec![PLANNER_AGENT.to_string()]);
        assert_eq!(
            store.get_llm_config("default").await.unwrap().unwrap().model,
            "gpt-4o"
        );

        let summary = store.get_prompt_by_name("summary").await.unwrap().unwrap();
        assert_eq!(summary.id, system_prompt_id("summary"));
        assert!(matches!(
            store.delete_prompt(&summary.id).await,
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn gateway_env_seeds_gateway_config() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_root(tmp.path());
        let env = EnvConfig::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("k".into()),
            "AZURE_OPENAI" => Some("true".into()),
            "AZURE_OPENAI_ENDPOINT" => Some("https://gw.example.com".into()),
            "AZURE_OPENAI_API_VERSION" => Some("2024-02-01".into()),
            _ => None,
        })
        .unwrap();

        let seeded = SeedDefaults::new(&paths, &env);
        assert_eq!(seeded.llm.api_kind, ApiKind::Gateway);
        assert_eq!(seeded.llm.base_url.as_deref(), Some("https://gw.example.com"));
        assert!(seeded.vector_storage_url.ends_with("default_vectors.db"));
    }
}
