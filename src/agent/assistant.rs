//! Agents that take part in a group run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::context::RunContext;
use super::executor::{extract_code_blocks, CodeExecutor};
use super::tools::{ToolRegistry, ToolSchema};
use crate::core::errors::ApiError;
use crate::core::retry::RetryPolicy;
use crate::llm::{ChatMessage, ChatRequest, CompletionProvider};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub source: String,
    pub content: String,
}

impl AgentMessage {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }

    /// Streamed shape: `"<source>: <content>"`.
    pub fn render(&self) -> String {
        format!("{}: {}", self.source, self.content)
    }
}

#[async_trait]
pub trait ChatAgent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn respond(&self, history: &[AgentMessage], ctx: &RunContext) -> Result<String, ApiError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentDecision {
    ToolCall { name: String, args: Value },
    Final(String),
}

pub fn parse_agent_decision(text: &str) -> AgentDecision {
    parse_json_from_text(text)
        .and_then(|value| decision_from_value(&value))
        .unwrap_or_else(|| AgentDecision::Final(text.trim().to_string()))
}

pub(crate) fn parse_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

fn decision_from_value(value: &Value) -> Option<AgentDecision> {
    let kind = value
        .get("type")
        .or_else(|| value.get("action"))
        .and_then(Value::as_str)?;

    match kind {
        "tool_call" => {
            let name = value
                .get("tool_name")
                .or_else(|| value.get("name"))
                .and_then(Value::as_str)?;
            let args = value
                .get("tool_args")
                .or_else(|| value.get("args"))
                .cloned()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            Some(AgentDecision::ToolCall {
                name: name.to_string(),
                args,
            })
        }
        "final" => Some(AgentDecision::Final(
            value
                .get("content")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        )),
        _ => None,
    }
}

fn tool_instructions(schemas: &[ToolSchema]) -> String {
    let tools = schemas
        .iter()
        .map(|schema| {
            format!(
                "- {}: {}\n  parameters: {}",
                schema.name, schema.description, schema.parameters
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You have access to the following tools:\n{tools}\n\
When you need to use a tool, respond ONLY with JSON in this format:\n\
{{\"type\":\"tool_call\",\"tool_name\":\"<tool>\",\"tool_args\":{{...}}}}\n\
When you have the final answer, respond ONLY with JSON in this format:\n\
{{\"type\":\"final\",\"content\":\"...\"}}\n\
Do not include any extra text outside the JSON."
    )
}

/// Model-backed agent. With tools bound it runs the tool-call / final loop.
pub struct AssistantAgent {
    name: String,
    description: String,
    system_message: String,
    completion: Arc<dyn CompletionProvider>,
    model: String,
    tools: ToolRegistry,
    retry: RetryPolicy,
    max_tool_rounds: usize,
}

impl AssistantAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_message: impl Into<String>,
        completion: Arc<dyn CompletionProvider>,
        model: impl Into<String>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_message: system_message.into(),
            completion,
            model: model.into(),
            tools,
            retry: RetryPolicy::completion(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    fn prompt(&self, history: &[AgentMessage]) -> Vec<ChatMessage> {
        let mut system = self.system_message.clone();
        if !self.tools.is_empty() {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(&tool_instructions(&self.tools.schemas()));
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        for message in history {
            if message.source == self.name {
                messages.push(ChatMessage::assistant(message.content.clone()));
            } else {
                messages.push(ChatMessage::user(message.render()));
            }
        }
        messages
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let request = ChatRequest::new(messages).with_model(self.model.clone());
        let request = &request;
        let completion = self
            .retry
            .run(&format!("agent {}", self.name), || async move {
                self.completion.complete(request).await
            })
            .await?;
        Ok(completion.output)
    }
}

#[async_trait]
impl ChatAgent for AssistantAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn respond(&self, history: &[AgentMessage], ctx: &RunContext) -> Result<String, ApiError> {
        let mut messages = self.prompt(history);
        if self.tools.is_empty() {
            return self.complete(messages).await;
        }

        let mut last_output = String::new();
        for round in 0..self.max_tool_rounds {
            let output = self.complete(messages.clone()).await?;
            let (name, args) = match parse_agent_decision(&output) {
                AgentDecision::Final(content) => return Ok(content),
                AgentDecision::ToolCall { name, args } => (name, args),
            };

            if !ctx.is_live() {
                return Err(ApiError::Cancelled);
            }

            debug!("{} round {} calls {}", self.name, round + 1, name);
            let result = match self.tools.invoke(&name, args, ctx).await {
                Ok(result) => result,
                Err(err) => {
                    warn!("Tool {} failed: {}", name, err);
                    format!("Error: {}", err)
                }
            };
            messages.push(ChatMessage::assistant(output.clone()));
            messages.push(ChatMessage::user(format!("Tool result ({}):\n{}", name, result)));
            last_output = result;
        }

        warn!(
            "{} reached {} tool rounds without a final answer",
            self.name, self.max_tool_rounds
        );
        Ok(last_output)
    }
}

/// Runs the fenced code blocks of the latest message that has any.
pub struct CodeExecutorAgent {
    name: String,
    description: String,
    executor: CodeExecutor,
}

impl CodeExecutorAgent {
    pub fn new(name: impl Into<String>, description: impl Into<String>, executor: CodeExecutor) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            executor,
        }
    }
}

#[async_trait]
impl ChatAgent for CodeExecutorAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn respond(&self, history: &[AgentMessage], _ctx: &RunContext) -> Result<String, ApiError> {
        let blocks = history
            .iter()
            .rev()
            .filter(|message| message.source != self.name)
            .map(|message| extract_code_blocks(&message.content))
            .find(|blocks| !blocks.is_empty());

        let Some(blocks) = blocks else {
            return Ok("No code blocks found in the thread. Provide at least one fenced code block to execute.".to_string());
        };

        let result = self.executor.execute(&blocks).await?;
        Ok(format!(
            "exitcode: {}\nCode output: {}",
            result.exit_code, result.output
        ))
    }
}
