use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::context::{RagMode, RequestContext, SplitMode};
use super::split::split_by_tokens;
use crate::core::config::SplitHistoryPolicy;
use crate::core::errors::ApiError;
use crate::core::retry::RetryPolicy;
use crate::llm::{
    BpeTokenCounter, ChatMessage, ChatRequest, Completion, CompletionProvider, ContentPart, Role,
    TokenCounter,
};
use crate::retrieval::{Retriever, VectorSearchRequest};
use crate::vector::Document;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    pub chat_request: ChatRequest,
    #[serde(default)]
    pub chat_request_context: RequestContext,
    #[serde(default)]
    pub vector_search_requests: Vec<VectorSearchRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatResponse {
    pub output: String,
    pub total_tokens: u64,
    pub documents: Vec<Document>,
}

struct Anchor {
    message_index: usize,
    part_index: usize,
    text: String,
}

struct PreparedChunk {
    message: ChatMessage,
    documents: Vec<Document>,
}

/// Runs one chat turn: split the last user message, inject retrieved context,
/// complete each chunk and combine the outputs.
pub struct ChatOrchestrator {
    completion: Arc<dyn CompletionProvider>,
    retriever: Arc<dyn Retriever>,
    retry: RetryPolicy,
    default_model: String,
    split_history: SplitHistoryPolicy,
    token_counter: Option<Arc<dyn TokenCounter>>,
}

impl ChatOrchestrator {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        retriever: Arc<dyn Retriever>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            completion,
            retriever,
            retry: RetryPolicy::completion(),
            default_model: default_model.into(),
            split_history: SplitHistoryPolicy::default(),
            token_counter: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_split_history(mut self, policy: SplitHistoryPolicy) -> Self {
        self.split_history = policy;
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.token_counter = Some(counter);
        self
    }

    pub async fn run(&self, request: ChatTurnRequest) -> Result<ChatResponse, ApiError> {
        let ChatTurnRequest {
            chat_request,
            chat_request_context: context,
            vector_search_requests,
        } = request;

        let anchor = locate_anchor(&chat_request.messages)?;
        let chunks = self.split(&anchor.text, &context, &chat_request)?;
        debug!(
            "Chat turn: {} chunk(s), split={:?}, rag={:?}",
            chunks.len(),
            context.split_mode,
            context.rag_mode
        );

        let mut outputs = Vec::with_capacity(chunks.len());
        let mut total_tokens = 0;
        let mut documents = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let prepared = self
                .prepare_chunk(
                    index,
                    chunk,
                    &anchor,
                    &chat_request,
                    &context,
                    &vector_search_requests,
                )
                .await?;
            merge_documents(&mut documents, prepared.documents);

            let messages = self.conversation_for(
                &chat_request.messages,
                &anchor,
                &context,
                prepared.message,
            );
            let completion = self.complete(&chat_request.with_messages(messages)).await?;
            total_tokens += completion.total_tokens;
            outputs.push(completion.output);
        }

        let output = match context.split_mode {
            SplitMode::None | SplitMode::Normal => outputs.join("\n"),
            SplitMode::SplitAndSummarize => {
                let mut parts = Vec::new();
                if !context.prompt_template_text.is_empty() {
                    parts.push(context.prompt_template_text.clone());
                }
                if !context.summarize_prompt_text.is_empty() {
                    parts.push(context.summarize_prompt_text.clone());
                }
                parts.push(outputs.join("\n"));

                let summary_request =
                    chat_request.with_messages(vec![ChatMessage::user(parts.join("\n"))]);
                let summary = self.complete(&summary_request).await?;
                total_tokens += summary.total_tokens;
                summary.output
            }
        };

        info!(
            "Chat turn completed: {} completion call(s), {} tokens",
            chunks.len() + usize::from(context.split_mode == SplitMode::SplitAndSummarize),
            total_tokens
        );

        Ok(ChatResponse {
            output,
            total_tokens,
            documents,
        })
    }

    fn split(
        &self,
        text: &str,
        context: &RequestContext,
        chat_request: &ChatRequest,
    ) -> Result<Vec<String>, ApiError> {
        if context.split_mode == SplitMode::None {
            return Ok(vec![text.to_string()]);
        }
        if context.split_token_count == 0 {
            return Err(ApiError::InvalidArgument(
                "split_token_count must be positive".to_string(),
            ));
        }

        let counter: Arc<dyn TokenCounter> = match &self.token_counter {
            Some(counter) => counter.clone(),
            None => {
                let model = chat_request.model.as_deref().unwrap_or(&self.default_model);
                Arc::new(BpeTokenCounter::for_model(model)?)
            }
        };
        Ok(split_by_tokens(text, context.split_token_count, counter.as_ref()))
    }

    async fn prepare_chunk(
        &self,
        index: usize,
        chunk: &str,
        anchor: &Anchor,
        chat_request: &ChatRequest,
        context: &RequestContext,
        search_requests: &[VectorSearchRequest],
    ) -> Result<PreparedChunk, ApiError> {
        let mut parts: Vec<String> = Vec::new();
        if index > 0 && !context.prompt_template_text.is_empty() {
            parts.push(context.prompt_template_text.clone());
        }

        let mut documents = Vec::new();
        if context.rag_mode != RagMode::None
            && !search_requests.is_empty()
            && !chunk.trim().is_empty()
        {
            let query = match context.rag_mode {
                RagMode::Prompt if !context.prompt_template_text.is_empty() => {
                    format!("{}\n{}", context.prompt_template_text, chunk)
                }
                _ => chunk.to_string(),
            };
            let requests: Vec<VectorSearchRequest> = search_requests
                .iter()
                .map(|r| VectorSearchRequest {
                    query: query.clone(),
                    ..r.clone()
                })
                .collect();

            documents = self.retriever.search(&requests).await?;
            if !documents.is_empty() {
                if !context.related_information_prompt_text.is_empty() {
                    parts.push(context.related_information_prompt_text.clone());
                }
                parts.push(
                    documents
                        .iter()
                        .map(|d| d.page_content.as_str())
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
            }
        }
        parts.push(chunk.to_string());

        let mut message = chat_request.messages[anchor.message_index].clone();
        message.content[anchor.part_index] = ContentPart::text(parts.join("\n"));
        Ok(PreparedChunk { message, documents })
    }

    fn conversation_for(
        &self,
        history: &[ChatMessage],
        anchor: &Anchor,
        context: &RequestContext,
        message: ChatMessage,
    ) -> Vec<ChatMessage> {
        if context.split_mode == SplitMode::None {
            let mut messages = history.to_vec();
            messages[anchor.message_index] = message;
            return messages;
        }

        let prior = &history[..anchor.message_index];
        let mut messages: Vec<ChatMessage> =
            match context.split_history.unwrap_or(self.split_history) {
                SplitHistoryPolicy::Discard => Vec::new(),
                SplitHistoryPolicy::KeepSystem => prior
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .cloned()
                    .collect(),
                SplitHistoryPolicy::KeepAll => prior.to_vec(),
            };
        messages.push(message);
        messages
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ApiError> {
        let mut request = request.clone();
        if request.model.as_deref().map_or(true, str::is_empty) {
            request.model = Some(self.default_model.clone());
        }
        let completion = &self.completion;
        let request = &request;
        self.retry
            .run("completion", || async move { completion.complete(request).await })
            .await
    }
}

fn locate_anchor(messages: &[ChatMessage]) -> Result<Anchor, ApiError> {
    let message_index = messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .ok_or_else(|| ApiError::InvalidArgument("no user message in chat_request".to_string()))?;

    let (part_index, text) = messages[message_index]
        .content
        .iter()
        .enumerate()
        .find_map(|(i, part)| part.as_text().map(|t| (i, t.to_string())))
        .ok_or_else(|| {
            ApiError::InvalidArgument("the last user message has no text content".to_string())
        })?;

    Ok(Anchor {
        message_index,
        part_index,
        text,
    })
}

/// Appends documents not already present (by `doc_id`, or content when unset).
fn merge_documents(into: &mut Vec<Document>, incoming: Vec<Document>) {
    let mut seen: HashSet<String> = into.iter().map(document_key).collect();
    for document in incoming {
        if seen.insert(document_key(&document)) {
            into.push(document);
        }
    }
}

fn document_key(document: &Document) -> String {
    if document.metadata.doc_id.is_empty() {
        document.page_content.clone()
    } else {
        document.metadata.doc_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::DocumentMetadata;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCompletion {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl CompletionProvider for RecordingCompletion {
        async fn complete(&self, request: &ChatRequest) -> Result<Completion, ApiError> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            Ok(Completion {
                output: format!("out{}", requests.len()),
                total_tokens: 10 * requests.len() as u64,
            })
        }
    }

    struct FixedRetriever(Vec<&'static str>);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn search(
            &self,
            _requests: &[VectorSearchRequest],
        ) -> Result<Vec<Document>, ApiError> {
            Ok(self
                .0
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    Document::new(
                        *text,
                        DocumentMetadata {
                            doc_id: format!("d{}", i),
                            ..Default::default()
                        },
                    )
                })
                .collect())
        }
    }

    struct CharCounter;

    impl TokenCounter for CharCounter {
        fn count(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    fn orchestrator(
        completion: Arc<RecordingCompletion>,
        retriever: Vec<&'static str>,
    ) -> ChatOrchestrator {
        ChatOrchestrator::new(completion, Arc::new(FixedRetriever(retriever)), "gpt-4o")
            .with_retry(RetryPolicy::none())
            .with_token_counter(Arc::new(CharCounter))
    }

    fn search_request() -> VectorSearchRequest {
        VectorSearchRequest {
            name: "default".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn split_and_summarize_issues_one_call_per_chunk_plus_summary() {
        let completion = Arc::new(RecordingCompletion::default());
        let line = "x".repeat(100);
        let text = format!("{line}\n{line}\n{line}");

        let response = orchestrator(completion.clone(), vec![])
            .run(ChatTurnRequest {
                chat_request: ChatRequest::new(vec![
                    ChatMessage::system("be brief"),
                    ChatMessage::user(text),
                ]),
                chat_request_context: RequestContext {
                    split_mode: SplitMode::SplitAndSummarize,
                    split_token_count: 100,
                    ..Default::default()
                },
                vector_search_requests: vec![],
            })
            .await
            .unwrap();

        let requests = completion.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        assert_eq!(response.total_tokens, 10 + 20 + 30 + 40);
        assert_eq!(response.output, "out4");
        for chunk_request in &requests[..3] {
            assert_eq!(chunk_request.messages.len(), 1);
            assert_eq!(chunk_request.messages[0].text(), line);
        }
        assert_eq!(requests[3].messages[0].text(), "out1\nout2\nout3");
    }

    #[tokio::test]
    async fn rag_none_sends_user_text_verbatim() {
        let completion = Arc::new(RecordingCompletion::default());
        let response = orchestrator(completion.clone(), vec!["x", "y"])
            .run(ChatTurnRequest {
                chat_request: ChatRequest::new(vec![
                    ChatMessage::user("earlier"),
                    ChatMessage::assistant("reply"),
                    ChatMessage::user("question"),
                ]),
                chat_request_context: RequestContext::default(),
                vector_search_requests: vec![search_request()],
            })
            .await
            .unwrap();

        let requests = completion.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 3);
        assert_eq!(requests[0].messages[2].text(), "question");
        assert_eq!(requests[0].model.as_deref(), Some("gpt-4o"));
        assert!(response.documents.is_empty());
    }

    #[tokio::test]
    async fn rag_normal_prepends_related_information() {
        let completion = Arc::new(RecordingCompletion::default());
        let response = orchestrator(completion.clone(), vec!["x", "y"])
            .run(ChatTurnRequest {
                chat_request: ChatRequest::new(vec![ChatMessage::user("question")]),
                chat_request_context: RequestContext {
                    rag_mode: RagMode::Normal,
                    related_information_prompt_text: "Related:".into(),
                    prompt_template_text: "Template".into(),
                    ..Default::default()
                },
                vector_search_requests: vec![search_request()],
            })
            .await
            .unwrap();

        let requests = completion.requests.lock().unwrap();
        assert_eq!(requests[0].messages[0].text(), "Related:\nx\ny\nquestion");
        assert_eq!(response.documents.len(), 2);
        assert_eq!(response.output, "out1");
    }

    #[tokio::test]
    async fn template_is_prepended_after_the_first_chunk() {
        let completion = Arc::new(RecordingCompletion::default());
        orchestrator(completion.clone(), vec!["x"])
            .run(ChatTurnRequest {
                chat_request: ChatRequest::new(vec![ChatMessage::user("aaaa\nbbbb")]),
                chat_request_context: RequestContext {
                    split_mode: SplitMode::Normal,
                    split_token_count: 4,
                    rag_mode: RagMode::Normal,
                    prompt_template_text: "T".into(),
                    related_information_prompt_text: "R".into(),
                    ..Default::default()
                },
                vector_search_requests: vec![search_request()],
            })
            .await
            .unwrap();

        let requests = completion.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages[0].text(), "R\nx\naaaa");
        assert_eq!(requests[1].messages[0].text(), "T\nR\nx\nbbbb");
    }

    #[tokio::test]
    async fn keep_system_history_under_splitting() {
        let completion = Arc::new(RecordingCompletion::default());
        orchestrator(completion.clone(), vec![])
            .with_split_history(SplitHistoryPolicy::KeepSystem)
            .run(ChatTurnRequest {
                chat_request: ChatRequest::new(vec![
                    ChatMessage::system("rules"),
                    ChatMessage::assistant("old"),
                    ChatMessage::user("line"),
                ]),
                chat_request_context: RequestContext {
                    split_mode: SplitMode::Normal,
                    split_token_count: 100,
                    ..Default::default()
                },
                vector_search_requests: vec![],
            })
            .await
            .unwrap();

        let requests = completion.requests.lock().unwrap();
        let roles: Vec<Role> = requests[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
    }

    #[tokio::test]
    async fn blank_user_text_skips_retrieval() {
        let completion = Arc::new(RecordingCompletion::default());
        let response = orchestrator(completion.clone(), vec!["x"])
            .run(ChatTurnRequest {
                chat_request: ChatRequest::new(vec![ChatMessage::user(" \n")]),
                chat_request_context: RequestContext {
                    split_mode: SplitMode::Normal,
                    split_token_count: 1,
                    rag_mode: RagMode::Normal,
                    related_information_prompt_text: "R".into(),
                    ..Default::default()
                },
                vector_search_requests: vec![search_request()],
            })
            .await
            .unwrap();

        let requests = completion.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].text(), " \n");
        assert!(response.documents.is_empty());
    }

    #[tokio::test]
    async fn missing_user_message_is_invalid() {
        let completion = Arc::new(RecordingCompletion::default());
        let err = orchestrator(completion, vec![])
            .run(ChatTurnRequest {
                chat_request: ChatRequest::new(vec![ChatMessage::system("only")]),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }
}
