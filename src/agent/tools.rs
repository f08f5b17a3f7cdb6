//! Tools an agent can call: the per-descriptor retrieval tool and user scripts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::Validator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::context::RunContext;
use super::executor::{python_interpreter, run_process};
use super::policy::ToolPolicy;
use crate::catalog::{AgentVectorDbItem, ToolDefinition};
use crate::core::errors::ApiError;
use crate::retrieval::{SearchKwargs, VectorSearchRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    BuiltIn,
    UserScript,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn describe(&self) -> ToolSchema;

    fn kind(&self) -> ToolKind;

    async fn invoke(&self, args: Value, ctx: &RunContext) -> Result<String, ApiError>;
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VectorSearchArgs {
    /// Natural-language search query.
    pub query: String,
    /// Maximum number of documents to return.
    #[serde(default)]
    pub k: Option<usize>,
}

/// Semantic search over one descriptor, bound with the agent's defaults.
pub struct VectorSearchTool {
    name: String,
    item: AgentVectorDbItem,
}

impl VectorSearchTool {
    pub fn new(item: AgentVectorDbItem) -> Self {
        Self {
            name: format!("vector_search_tool_{}", Uuid::new_v4().simple()),
            item,
        }
    }

    fn request(&self, args: VectorSearchArgs) -> VectorSearchRequest {
        let filter = match &self.item.filter {
            Some(Value::Object(map)) if !map.is_empty() => Some(map.clone()),
            _ => None,
        };
        VectorSearchRequest {
            name: self.item.name.clone(),
            query: args.query,
            model: self.item.model.clone(),
            search_kwargs: SearchKwargs {
                k: args.k.or(self.item.k),
                filter,
                score_threshold: self.item.score_threshold,
            },
        }
    }
}

#[async_trait]
impl Tool for VectorSearchTool {
    fn describe(&self) -> ToolSchema {
        let description = if self.item.description.trim().is_empty() {
            format!("Searches the '{}' vector database.", self.item.name)
        } else {
            self.item.description.clone()
        };
        ToolSchema {
            name: self.name.clone(),
            description,
            parameters: serde_json::to_value(schemars::schema_for!(VectorSearchArgs))
                .unwrap_or_else(|_| json!({"type": "object"})),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::BuiltIn
    }

    async fn invoke(&self, args: Value, ctx: &RunContext) -> Result<String, ApiError> {
        let args: VectorSearchArgs = serde_json::from_value(args)?;
        let documents = ctx.retriever.search(&[self.request(args)]).await?;
        if documents.is_empty() {
            return Ok("No matching documents.".to_string());
        }
        Ok(documents
            .iter()
            .map(|doc| doc.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// A user-registered script. Arguments arrive as JSON on stdin; stdout is the result.
pub struct ScriptTool {
    definition: ToolDefinition,
}

impl ScriptTool {
    pub fn new(definition: ToolDefinition) -> Self {
        Self { definition }
    }

    fn resolve_path(&self, ctx: &RunContext) -> PathBuf {
        let path = PathBuf::from(&self.definition.path);
        if path.is_absolute() {
            path
        } else {
            ctx.work_dir.join(path)
        }
    }
}

#[async_trait]
impl Tool for ScriptTool {
    fn describe(&self) -> ToolSchema {
        ToolSchema {
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            parameters: json!({"type": "object"}),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::UserScript
    }

    async fn invoke(&self, args: Value, ctx: &RunContext) -> Result<String, ApiError> {
        let script = self.resolve_path(ctx);
        if !script.is_file() {
            return Err(ApiError::NotFound(format!(
                "tool script {}",
                script.display()
            )));
        }

        let (program, argv) = match script.extension().and_then(|ext| ext.to_str()) {
            Some("py") => (
                python_interpreter(ctx.venv_path.as_deref()),
                vec![script.display().to_string()],
            ),
            Some("sh") => (PathBuf::from("sh"), vec![script.display().to_string()]),
            _ => (script.clone(), Vec::new()),
        };

        let input = serde_json::to_string(&args)?;
        let output = run_process(
            &program,
            &argv,
            Some(&input),
            &ctx.work_dir,
            ctx.venv_path.as_deref(),
            ctx.tool_timeout,
        )
        .await?;

        if output.exit_code != 0 {
            return Err(ApiError::Upstream(format!(
                "tool {} exited with {}: {}",
                self.definition.name,
                output.exit_code,
                output.output.trim()
            )));
        }
        Ok(output.output.trim_end().to_string())
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: Validator,
}

/// Tools bound to one agent, keyed by name, with compiled argument validators.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>, policy: &ToolPolicy) -> Result<(), ApiError> {
        let schema = tool.describe();
        if !policy.is_tool_allowed(&schema.name, tool.kind()) {
            return Err(ApiError::Forbidden(format!(
                "tool '{}' is not allowed by the current policy",
                schema.name
            )));
        }
        if self.tools.contains_key(&schema.name) {
            return Err(ApiError::InvalidArgument(format!(
                "tool '{}' is registered twice",
                schema.name
            )));
        }

        let validator = jsonschema::validator_for(&schema.parameters).map_err(|e| {
            ApiError::InvalidArgument(format!("tool '{}' has an invalid schema: {}", schema.name, e))
        })?;
        debug!("Registered tool {}", schema.name);
        self.order.push(schema.name.clone());
        self.tools
            .insert(schema.name, RegisteredTool { tool, validator });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|entry| entry.tool.describe())
            .collect()
    }

    pub async fn invoke(&self, name: &str, args: Value, ctx: &RunContext) -> Result<String, ApiError> {
        let Some(entry) = self.tools.get(name) else {
            return Err(ApiError::NotFound(format!("tool '{}'", name)));
        };
        if let Err(err) = entry.validator.validate(&args) {
            return Err(ApiError::InvalidArgument(format!(
                "invalid arguments for '{}': {}",
                name, err
            )));
        }
        info!("Invoking tool {}", name);
        entry.tool.invoke(args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Retriever;
    use crate::session::SessionRegistry;
    use crate::vector::{Document, DocumentMetadata};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRetriever {
        seen: Mutex<Vec<VectorSearchRequest>>,
    }

    #[async_trait]
    impl Retriever for RecordingRetriever {
        async fn search(&self, requests: &[VectorSearchRequest]) -> Result<Vec<Document>, ApiError> {
            self.seen.lock().unwrap().extend_from_slice(requests);
            Ok(vec![Document::new("found it", DocumentMetadata::default())])
        }
    }

    fn context(retriever: Arc<dyn Retriever>) -> RunContext {
        RunContext {
            session_token: None,
            sessions: SessionRegistry::new(),
            work_dir: std::env::temp_dir(),
            venv_path: None,
            retriever,
            tool_timeout: Duration::from_secs(5),
        }
    }

    fn item() -> AgentVectorDbItem {
        AgentVectorDbItem {
            name: "default".into(),
            description: "Company handbook".into(),
            model: None,
            k: Some(3),
            filter: Some(json!({"source_type": 1})),
            score_threshold: Some(0.4),
        }
    }

    #[tokio::test]
    async fn vector_tool_applies_bound_defaults() {
        let retriever = Arc::new(RecordingRetriever::default());
        let ctx = context(retriever.clone());
        let mut registry = ToolRegistry::new();
        let tool = Arc::new(VectorSearchTool::new(item()));
        let name = tool.describe().name;
        assert!(name.starts_with("vector_search_tool_"));
        registry.register(tool, &ToolPolicy::default()).unwrap();

        let output = registry
            .invoke(&name, json!({"query": "leave policy"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output, "found it");

        let seen = retriever.seen.lock().unwrap();
        assert_eq!(seen[0].name, "default");
        assert_eq!(seen[0].search_kwargs.k, Some(3));
        assert_eq!(seen[0].search_kwargs.score_threshold, Some(0.4));
        assert_eq!(
            seen[0].search_kwargs.filter.as_ref().unwrap().get("source_type"),
            Some(&json!(1))
        );
    }

    #[tokio::test]
    async fn rejects_arguments_that_fail_the_schema() {
        let ctx = context(Arc::new(RecordingRetriever::default()));
        let mut registry = ToolRegistry::new();
        let tool = Arc::new(VectorSearchTool::new(item()));
        let name = tool.describe().name;
        registry.register(tool, &ToolPolicy::default()).unwrap();

        let err = registry
            .invoke(&name, json!({"k": 2}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));

        let err = registry
            .invoke("missing", json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn script_tools_follow_policy() {
        let script = Arc::new(ScriptTool::new(ToolDefinition {
            name: "fetch".into(),
            description: "Fetches a page".into(),
            path: "fetch.py".into(),
        }));

        let mut registry = ToolRegistry::new();
        let err = registry
            .register(script.clone(), &ToolPolicy::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let open = ToolPolicy {
            allow_user_tools: true,
            ..ToolPolicy::default()
        };
        registry.register(script.clone(), &open).unwrap();
        let err = registry.register(script, &open).unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
        assert_eq!(registry.names(), vec!["fetch".to_string()]);
    }
}
