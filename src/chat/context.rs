use serde::{Deserialize, Serialize};

use crate::core::config::SplitHistoryPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    #[default]
    None,
    Normal,
    SplitAndSummarize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagMode {
    #[default]
    None,
    Normal,
    Prompt,
}

pub const DEFAULT_SPLIT_TOKEN_COUNT: usize = 8000;
pub const DEFAULT_RELATED_INFORMATION_PROMPT: &str =
    "The following is related information retrieved from the knowledge base:";

fn default_split_token_count() -> usize {
    DEFAULT_SPLIT_TOKEN_COUNT
}

fn default_related_information_prompt() -> String {
    DEFAULT_RELATED_INFORMATION_PROMPT.to_string()
}

/// Per-turn policy for splitting, retrieval injection and summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default, alias = "PromptTemplateText")]
    pub prompt_template_text: String,
    #[serde(default, alias = "SplitMode")]
    pub split_mode: SplitMode,
    #[serde(default = "default_split_token_count", alias = "SplitTokenCount")]
    pub split_token_count: usize,
    #[serde(default, alias = "RAGMode")]
    pub rag_mode: RagMode,
    #[serde(
        default = "default_related_information_prompt",
        alias = "RelatedInformationPromptText"
    )]
    pub related_information_prompt_text: String,
    #[serde(default, alias = "SummarizePromptText")]
    pub summarize_prompt_text: String,
    /// Overrides the server-wide `chat.split_history` for this turn.
    #[serde(default)]
    pub split_history: Option<SplitHistoryPolicy>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            prompt_template_text: String::new(),
            split_mode: SplitMode::None,
            split_token_count: DEFAULT_SPLIT_TOKEN_COUNT,
            rag_mode: RagMode::None,
            related_information_prompt_text: default_related_information_prompt(),
            summarize_prompt_text: String::new(),
            split_history: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_legacy_field_names() {
        let ctx: RequestContext = serde_json::from_value(json!({
            "PromptTemplateText": "Translate:",
            "SplitMode": "split_and_summarize",
            "SplitTokenCount": 100,
            "RAGMode": "normal"
        }))
        .unwrap();
        assert_eq!(ctx.split_mode, SplitMode::SplitAndSummarize);
        assert_eq!(ctx.split_token_count, 100);
        assert_eq!(ctx.rag_mode, RagMode::Normal);
        assert_eq!(ctx.related_information_prompt_text, DEFAULT_RELATED_INFORMATION_PROMPT);
    }

    #[test]
    fn rejects_unknown_split_mode() {
        let err = serde_json::from_value::<RequestContext>(json!({"split_mode": "sometimes"}));
        assert!(err.is_err());
    }
}
