//! Group runs: speaker selection, termination and cooperative cancellation.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::assistant::{AgentMessage, ChatAgent};
use super::context::RunContext;
use super::termination::TerminationCondition;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, CompletionProvider};

pub enum SpeakerSelection {
    RoundRobin,
    /// Asks a model which participant speaks next; falls back to round-robin when
    /// the answer names nobody.
    Selector {
        completion: Arc<dyn CompletionProvider>,
        model: String,
    },
}

pub struct GroupChat {
    agents: Vec<Arc<dyn ChatAgent>>,
    selection: SpeakerSelection,
    termination: TerminationCondition,
}

impl GroupChat {
    pub fn new(
        agents: Vec<Arc<dyn ChatAgent>>,
        selection: SpeakerSelection,
        termination: TerminationCondition,
    ) -> Result<Self, ApiError> {
        if agents.is_empty() {
            return Err(ApiError::InvalidArgument(
                "a group needs at least one agent".to_string(),
            ));
        }
        Ok(Self {
            agents,
            selection,
            termination,
        })
    }

    pub fn participants(&self) -> Vec<String> {
        self.agents.iter().map(|agent| agent.name().to_string()).collect()
    }

    pub fn start(self, task: impl Into<String>, ctx: RunContext) -> GroupChatRun {
        GroupChatRun {
            chat: self,
            ctx,
            task: Some(task.into()),
            transcript: Vec::new(),
            started: Instant::now(),
            turn: 0,
            stop_reason: None,
        }
    }
}

/// A running group conversation. Each call to [`GroupChatRun::next_message`] advances
/// it by one message.
pub struct GroupChatRun {
    chat: GroupChat,
    ctx: RunContext,
    task: Option<String>,
    transcript: Vec<AgentMessage>,
    started: Instant,
    turn: usize,
    stop_reason: Option<String>,
}

impl GroupChatRun {
    pub fn transcript(&self) -> &[AgentMessage] {
        &self.transcript
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.ctx.session_token.as_deref()
    }

    fn finish(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        info!("Group run finished: {}", reason);
        self.stop_reason = Some(reason);
        self.ctx.release();
    }

    fn cancel(&mut self) {
        info!("Group run cancelled");
        self.stop_reason = Some("cancelled".to_string());
    }

    /// Next rendered message, or `None` once the run has stopped or its session was
    /// removed.
    pub async fn next_message(&mut self) -> Result<Option<String>, ApiError> {
        if self.stop_reason.is_some() {
            return Ok(None);
        }

        if let Some(task) = self.task.take() {
            let message = AgentMessage::new("user", task);
            let rendered = message.render();
            self.transcript.push(message);
            return Ok(Some(rendered));
        }

        if !self.ctx.is_live() {
            self.cancel();
            return Ok(None);
        }

        if let Some(reason) = self.chat.termination.check(&self.transcript, self.started) {
            self.finish(reason);
            return Ok(None);
        }

        let speaker = self.select_speaker().await;
        debug!("Turn {} goes to {}", self.turn, speaker.name());
        self.turn += 1;

        let content = match speaker.respond(&self.transcript, &self.ctx).await {
            Ok(content) => content,
            Err(ApiError::Cancelled) => {
                self.cancel();
                return Ok(None);
            }
            Err(err) => {
                self.finish(format!("error: {}", err));
                return Err(err);
            }
        };

        if !self.ctx.is_live() {
            self.cancel();
            return Ok(None);
        }

        let message = AgentMessage::new(speaker.name(), content);
        let rendered = message.render();
        self.transcript.push(message);
        Ok(Some(rendered))
    }

    /// Drains the run, collecting every rendered message.
    pub async fn collect(mut self) -> Result<Vec<String>, ApiError> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message().await? {
            messages.push(message);
        }
        Ok(messages)
    }

    async fn select_speaker(&self) -> Arc<dyn ChatAgent> {
        let agents = &self.chat.agents;
        let fallback = Arc::clone(&agents[self.turn % agents.len()]);
        let SpeakerSelection::Selector { completion, model } = &self.chat.selection else {
            return fallback;
        };
        if agents.len() == 1 {
            return fallback;
        }

        let roles = agents
            .iter()
            .map(|agent| format!("{}: {}", agent.name(), agent.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let history = self
            .transcript
            .iter()
            .map(AgentMessage::render)
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You are in a role play game. The following roles are available:\n{}\n\n\
Read the following conversation. Then select the next role to play. Only return the role name.\n\n{}",
            roles, history
        );

        let request = ChatRequest::new(vec![ChatMessage::user(prompt)]).with_model(model.clone());
        match completion.complete(&request).await {
            Ok(reply) => pick_named(agents, &reply.output).unwrap_or(fallback),
            Err(err) => {
                warn!("Speaker selection failed, using round-robin: {}", err);
                fallback
            }
        }
    }
}

/// Exact name first, then the longest name mentioned in the reply.
fn pick_named(agents: &[Arc<dyn ChatAgent>], reply: &str) -> Option<Arc<dyn ChatAgent>> {
    let reply = reply.trim();
    if let Some(agent) = agents.iter().find(|agent| agent.name() == reply) {
        return Some(Arc::clone(agent));
    }
    agents
        .iter()
        .filter(|agent| reply.contains(agent.name()))
        .max_by_key(|agent| agent.name().len())
        .map(Arc::clone)
}
