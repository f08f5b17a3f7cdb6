//! Builds agents and group runs from catalog definitions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::assistant::{AssistantAgent, ChatAgent, CodeExecutorAgent};
use super::context::RunContext;
use super::executor::CodeExecutor;
use super::group::{GroupChat, GroupChatRun, SpeakerSelection};
use super::policy::ToolPolicy;
use super::termination::TerminationSpec;
use super::tools::{ScriptTool, ToolRegistry, VectorSearchTool};
use crate::catalog::{AgentDefinition, CatalogStore, DEFAULT_NAME};
use crate::core::errors::ApiError;
use crate::core::retry::RetryPolicy;
use crate::llm::{CompletionProvider, ModelProvider};
use crate::retrieval::Retriever;
use crate::session::SessionRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    #[default]
    RoundRobin,
    Model,
}

/// Exactly one of `agent_name` / `group_chat_name` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRunRequest {
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub group_chat_name: Option<String>,
    pub task: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub termination: TerminationSpec,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub venv_path: Option<PathBuf>,
    #[serde(default)]
    pub selector: SelectorKind,
}

#[derive(Clone)]
pub struct AgentFactory {
    catalog: CatalogStore,
    models: Arc<dyn ModelProvider>,
    retriever: Arc<dyn Retriever>,
    sessions: SessionRegistry,
    policy: ToolPolicy,
    work_dir: PathBuf,
    tool_timeout: Duration,
    retry: RetryPolicy,
}

impl AgentFactory {
    pub fn new(
        catalog: CatalogStore,
        models: Arc<dyn ModelProvider>,
        retriever: Arc<dyn Retriever>,
        sessions: SessionRegistry,
        policy: ToolPolicy,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            models,
            retriever,
            sessions,
            policy,
            work_dir,
            tool_timeout: Duration::from_secs(120),
            retry: RetryPolicy::completion(),
        }
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Completion provider plus model for an LLM config name; blank means `default`.
    pub async fn completion_for(
        &self,
        llm_config_name: &str,
    ) -> Result<(Arc<dyn CompletionProvider>, String), ApiError> {
        let name = if llm_config_name.trim().is_empty() {
            DEFAULT_NAME
        } else {
            llm_config_name
        };
        let config = self
            .catalog
            .get_llm_config(name)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("llm config '{}'", name)))?;
        let completion = self.models.completion(&config)?;
        Ok((completion, config.model))
    }

    pub async fn build_tools(&self, definition: &AgentDefinition) -> Result<ToolRegistry, ApiError> {
        let mut tools = ToolRegistry::new();
        for name in &definition.tool_names {
            let tool = self
                .catalog
                .get_tool(name)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("tool '{}'", name)))?;
            tools.register(Arc::new(ScriptTool::new(tool)), &self.policy)?;
        }
        for item in &definition.vector_db_items {
            tools.register(Arc::new(VectorSearchTool::new(item.clone())), &self.policy)?;
        }
        Ok(tools)
    }

    pub async fn build_agent(
        &self,
        definition: &AgentDefinition,
        work_dir: &Path,
        venv_path: Option<&Path>,
    ) -> Result<Arc<dyn ChatAgent>, ApiError> {
        if definition.code_execution {
            let executor = CodeExecutor::new(
                work_dir.to_path_buf(),
                venv_path.map(Path::to_path_buf),
                self.tool_timeout,
            );
            return Ok(Arc::new(CodeExecutorAgent::new(
                definition.name.clone(),
                definition.description.clone(),
                executor,
            )));
        }

        let (completion, model) = self.completion_for(&definition.llm_config_name).await?;
        let tools = self.build_tools(definition).await?;
        Ok(Arc::new(
            AssistantAgent::new(
                definition.name.clone(),
                definition.description.clone(),
                definition.system_message.clone(),
                completion,
                model,
                tools,
            )
            .with_retry(self.retry.clone()),
        ))
    }

    async fn load_agent(&self, name: &str) -> Result<AgentDefinition, ApiError> {
        self.catalog
            .get_agent(name)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("agent '{}'", name)))
    }

    /// Builds the run and registers its session token. The run removes the token
    /// itself when it finishes on its own.
    pub async fn start(&self, request: AgentRunRequest) -> Result<GroupChatRun, ApiError> {
        if request.task.trim().is_empty() {
            return Err(ApiError::InvalidArgument("task is empty".to_string()));
        }
        let work_dir = request.work_dir.clone().unwrap_or_else(|| self.work_dir.clone());
        let venv = request.venv_path.as_deref();

        let chat = match (&request.agent_name, &request.group_chat_name) {
            (Some(agent_name), None) => {
                let definition = self.load_agent(agent_name).await?;
                let agent = self.build_agent(&definition, &work_dir, venv).await?;
                let mut termination = request.termination.clone();
                termination.max_messages.get_or_insert(2);
                GroupChat::new(vec![agent], SpeakerSelection::RoundRobin, termination.build())?
            }
            (None, Some(group_name)) => {
                let group = self
                    .catalog
                    .get_group_chat(group_name)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(format!("group chat '{}'", group_name)))?;
                let mut agents = Vec::with_capacity(group.agent_names.len());
                for agent_name in &group.agent_names {
                    let definition = self.load_agent(agent_name).await?;
                    agents.push(self.build_agent(&definition, &work_dir, venv).await?);
                }
                let selection = match request.selector {
                    SelectorKind::RoundRobin => SpeakerSelection::RoundRobin,
                    SelectorKind::Model => {
                        let (completion, model) = self.completion_for(&group.llm_config_name).await?;
                        SpeakerSelection::Selector { completion, model }
                    }
                };
                GroupChat::new(agents, selection, request.termination.build())?
            }
            _ => {
                return Err(ApiError::InvalidArgument(
                    "set exactly one of agent_name or group_chat_name".to_string(),
                ))
            }
        };

        if let Some(token) = request.session_token.as_deref() {
            if self.sessions.is_live(token) {
                warn!("Session {} is already registered", token);
            }
            self.sessions.register(token);
        }
        info!(
            "Starting agent run with participants {:?}",
            chat.participants()
        );

        let ctx = RunContext {
            session_token: request.session_token.clone(),
            sessions: self.sessions.clone(),
            work_dir,
            venv_path: request.venv_path.clone(),
            retriever: Arc::clone(&self.retriever),
            tool_timeout: self.tool_timeout,
        };
        Ok(chat.start(request.task, ctx))
    }

    pub async fn run_to_completion(&self, request: AgentRunRequest) -> Result<Vec<String>, ApiError> {
        self.start(request).await?.collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::open_temp;
    use crate::catalog::{AgentVectorDbItem, ApiKind, GroupChatDefinition, LlmConfig, ToolDefinition};
    use crate::llm::{ChatRequest, Completion, Embedder};
    use crate::retrieval::VectorSearchRequest;
    use crate::vector::{Document, DocumentMetadata};
    use async_trait::async_trait;

    struct FixedCompletion(String);

    #[async_trait]
    impl CompletionProvider for FixedCompletion {
        async fn complete(&self, _: &ChatRequest) -> Result<Completion, ApiError> {
            Ok(Completion {
                output: self.0.clone(),
                total_tokens: 3,
            })
        }
    }

    struct FakeModels;

    impl ModelProvider for FakeModels {
        fn completion(&self, config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>, ApiError> {
            Ok(Arc::new(FixedCompletion(format!("answer from {}", config.model))))
        }

        fn embedder(&self, _: Option<&str>) -> Result<Arc<dyn Embedder>, ApiError> {
            Err(ApiError::Internal("no embeddings in this test".into()))
        }

        fn default_completion_model(&self) -> &str {
            "gpt-4o"
        }
    }

    struct OneDoc;

    #[async_trait]
    impl Retriever for OneDoc {
        async fn search(&self, _: &[VectorSearchRequest]) -> Result<Vec<Document>, ApiError> {
            Ok(vec![Document::new("doc", DocumentMetadata::default())])
        }
    }

    async fn factory(catalog: CatalogStore, sessions: SessionRegistry) -> AgentFactory {
        catalog
            .upsert_llm_config(&LlmConfig {
                name: "default".into(),
                api_kind: ApiKind::Direct,
                api_version: None,
                model: "gpt-test".into(),
                api_key: "k".into(),
                base_url: None,
            })
            .await
            .unwrap();
        AgentFactory::new(
            catalog,
            Arc::new(FakeModels),
            Arc::new(OneDoc),
            sessions,
            ToolPolicy::default(),
            std::env::temp_dir(),
        )
        .with_retry(RetryPolicy::none())
    }

    fn agent(name: &str) -> AgentDefinition {
        AgentDefinition {
            name: name.into(),
            description: format!("{} agent", name),
            system_message: "help".into(),
            code_execution: false,
            llm_config_name: String::new(),
            tool_names: Vec::new(),
            vector_db_items: Vec::new(),
        }
    }

    #[tokio::test]
    async fn single_agent_run_replies_once() {
        let (_dir, catalog) = open_temp().await;
        let sessions = SessionRegistry::new();
        let factory = factory(catalog.clone(), sessions.clone()).await;
        catalog.upsert_agent(&agent("solo")).await.unwrap();

        let messages = factory
            .run_to_completion(AgentRunRequest {
                agent_name: Some("solo".into()),
                task: "hello".into(),
                session_token: Some("tok".into()),
                ..AgentRunRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(
            messages,
            vec!["user: hello".to_string(), "solo: answer from gpt-test".to_string()]
        );
        assert!(!sessions.is_live("tok"));
    }

    #[tokio::test]
    async fn cancelling_after_first_message_ends_cleanly() {
        let (_dir, catalog) = open_temp().await;
        let sessions = SessionRegistry::new();
        let factory = factory(catalog.clone(), sessions.clone()).await;
        catalog.upsert_agent(&agent("a")).await.unwrap();
        catalog.upsert_agent(&agent("b")).await.unwrap();
        catalog
            .upsert_group_chat(&GroupChatDefinition {
                name: "team".into(),
                description: String::new(),
                llm_config_name: String::new(),
                agent_names: vec!["a".into(), "b".into()],
            })
            .await
            .unwrap();

        let mut run = factory
            .start(AgentRunRequest {
                group_chat_name: Some("team".into()),
                task: "plan".into(),
                session_token: Some("t".into()),
                ..AgentRunRequest::default()
            })
            .await
            .unwrap();
        assert!(sessions.is_live("t"));

        assert!(run.next_message().await.unwrap().is_some());
        sessions.remove("t");
        assert_eq!(run.next_message().await.unwrap(), None);
        assert!(!sessions.is_live("t"));
    }

    #[tokio::test]
    async fn rejects_ambiguous_or_unknown_targets() {
        let (_dir, catalog) = open_temp().await;
        let factory = factory(catalog, SessionRegistry::new()).await;

        let err = factory
            .start(AgentRunRequest {
                agent_name: Some("a".into()),
                group_chat_name: Some("g".into()),
                task: "x".into(),
                ..AgentRunRequest::default()
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::InvalidArgument(_)));

        let err = factory
            .start(AgentRunRequest {
                agent_name: Some("ghost".into()),
                task: "x".into(),
                ..AgentRunRequest::default()
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn binds_vector_tools_and_gates_scripts() {
        let (_dir, catalog) = open_temp().await;
        let factory = factory(catalog.clone(), SessionRegistry::new()).await;

        let mut with_search = agent("researcher");
        with_search.vector_db_items.push(AgentVectorDbItem {
            name: "default".into(),
            description: "docs".into(),
            model: None,
            k: None,
            filter: None,
            score_threshold: None,
        });
        let tools = factory.build_tools(&with_search).await.unwrap();
        assert_eq!(tools.names().len(), 1);
        assert!(tools.names()[0].starts_with("vector_search_tool_"));

        catalog
            .upsert_tool(&ToolDefinition {
                name: "fetch".into(),
                description: "fetch".into(),
                path: "fetch.py".into(),
            })
            .await
            .unwrap();
        let mut with_script = agent("scripted");
        with_script.tool_names.push("fetch".into());
        let err = factory.build_tools(&with_script).await.err().unwrap();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
