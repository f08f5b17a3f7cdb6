use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::assistant::AgentMessage;

pub const DEFAULT_TERMINATION_TEXT: &str = "TERMINATE";
pub const DEFAULT_MAX_MESSAGES: usize = 20;

/// Stop rules for a group run. `Any` stops when one of its members does.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationCondition {
    MaxMessages(usize),
    TextMention(String),
    Timeout(Duration),
    Any(Vec<TerminationCondition>),
}

impl TerminationCondition {
    /// Returns the reason the run should stop, if it should.
    pub fn check(&self, transcript: &[AgentMessage], started: Instant) -> Option<String> {
        match self {
            TerminationCondition::MaxMessages(limit) => (transcript.len() >= *limit)
                .then(|| format!("Maximum number of messages {} reached", limit)),
            TerminationCondition::TextMention(text) => transcript
                .last()
                .filter(|message| message.source != "user" && message.content.contains(text.as_str()))
                .map(|_| format!("Text '{}' mentioned", text)),
            TerminationCondition::Timeout(limit) => (started.elapsed() >= *limit)
                .then(|| format!("Timeout of {}s reached", limit.as_secs())),
            TerminationCondition::Any(conditions) => conditions
                .iter()
                .find_map(|condition| condition.check(transcript, started)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminationSpec {
    #[serde(default)]
    pub max_messages: Option<usize>,
    #[serde(default)]
    pub termination_text: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl TerminationSpec {
    pub fn build(&self) -> TerminationCondition {
        let text = self
            .termination_text
            .clone()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TERMINATION_TEXT.to_string());
        let mut conditions = vec![
            TerminationCondition::TextMention(text),
            TerminationCondition::MaxMessages(self.max_messages.unwrap_or(DEFAULT_MAX_MESSAGES)),
        ];
        if let Some(secs) = self.timeout_secs.filter(|secs| *secs > 0) {
            conditions.push(TerminationCondition::Timeout(Duration::from_secs(secs)));
        }
        TerminationCondition::Any(conditions)
    }
}
