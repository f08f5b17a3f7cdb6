use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use assistant_backend::catalog::{CatalogStore, LlmConfig, SeedDefaults};
use assistant_backend::chat::{ChatTurnRequest, RagMode, RequestContext, SplitMode};
use assistant_backend::core::config::{AppPaths, EnvConfig, ProxySettings, ServerSettings};
use assistant_backend::core::errors::ApiError;
use assistant_backend::extract::TextExtractor;
use assistant_backend::ingest::{EmbeddingRequest, IngestReport};
use assistant_backend::llm::{
    ChatMessage, ChatRequest, Completion, CompletionProvider, Embedder, ModelProvider,
};
use assistant_backend::retrieval::{Retriever, SearchKwargs, VectorSearchRequest};
use assistant_backend::state::AppState;
use assistant_backend::vector::sqlite::{open_pool, SqliteParentStore, SqliteVectorBackend};
use assistant_backend::vector::{ParentStore, VectorBackend};

const VOCABULARY: [&str; 6] = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];

/// Bag-of-words over a fixed vocabulary, so cosine scores are predictable.
struct VocabularyEmbedder;

#[async_trait]
impl Embedder for VocabularyEmbedder {
    fn model(&self) -> &str {
        "vocabulary"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|word| lower.split_whitespace().filter(|w| w == word).count() as f32)
                    .collect()
            })
            .collect())
    }
}

struct EchoCompletion;

#[async_trait]
impl CompletionProvider for EchoCompletion {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ApiError> {
        Ok(Completion {
            output: request
                .messages
                .last()
                .map(|message| message.text())
                .unwrap_or_default(),
            total_tokens: 1,
        })
    }
}

struct FakeModels;

impl ModelProvider for FakeModels {
    fn completion(&self, _: &LlmConfig) -> Result<Arc<dyn CompletionProvider>, ApiError> {
        Ok(Arc::new(EchoCompletion))
    }

    fn embedder(&self, _: Option<&str>) -> Result<Arc<dyn Embedder>, ApiError> {
        Ok(Arc::new(VocabularyEmbedder))
    }

    fn default_completion_model(&self) -> &str {
        "gpt-4o"
    }
}

async fn fresh_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::with_root(dir.path());
    let env = EnvConfig::from_lookup(|key| match key {
        "OPENAI_API_KEY" => Some("test-key".to_string()),
        _ => None,
    })
    .unwrap();

    let catalog = CatalogStore::open(paths.main_db_path.clone()).await.unwrap();
    assert!(catalog
        .initialize(&SeedDefaults::new(&paths, &env))
        .await
        .unwrap());

    let state = AppState::from_parts(
        paths,
        ServerSettings::default(),
        catalog,
        Arc::new(FakeModels),
        TextExtractor::new(&ProxySettings::default()).unwrap(),
    );
    (dir, state)
}

/// Creates the folder (if any) the way a client would, then indexes the content.
async fn ingest(state: &AppState, source_id: &str, folder_path: &str, content: &str) -> IngestReport {
    if !folder_path.is_empty() {
        state
            .catalog
            .get_folder_by_path(folder_path, true)
            .await
            .unwrap();
    }
    state
        .ingestion
        .upsert(&EmbeddingRequest {
            descriptor_name: "default".into(),
            source_id: source_id.into(),
            folder_path: folder_path.into(),
            content: content.into(),
            ..EmbeddingRequest::default()
        })
        .await
        .unwrap()
}

fn search(query: &str) -> VectorSearchRequest {
    VectorSearchRequest {
        name: "default".into(),
        query: query.into(),
        model: None,
        search_kwargs: SearchKwargs {
            k: Some(3),
            filter: None,
            score_threshold: Some(0.2),
        },
    }
}

#[tokio::test]
async fn fresh_ingest_then_search() {
    let (_dir, state) = fresh_state().await;
    ingest(&state, "s1", "kb/a", "alpha beta gamma").await;

    let documents = state.retrieval.search(&[search("alpha")]).await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].page_content, "alpha beta gamma");
    assert_eq!(documents[0].metadata.source_id, "s1");
    assert_eq!(documents[0].metadata.folder_path, "kb/a");
    assert_eq!(documents[0].metadata.sub_docs.len(), 1);
}

#[tokio::test]
async fn reingest_replaces_previous_content() {
    let (_dir, state) = fresh_state().await;
    ingest(&state, "s1", "kb/a", "alpha beta gamma").await;
    let report = ingest(&state, "s1", "", "delta").await;
    assert_eq!(report.replaced_rows, 1);

    assert!(state.retrieval.search(&[search("alpha")]).await.unwrap().is_empty());
    let documents = state.retrieval.search(&[search("delta")]).await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].metadata.source_id, "s1");
    assert_eq!(documents[0].page_content, "delta");
}

/// `(row ids, parent keys)` currently stored for `source_id` in the default collection.
async fn stored_rows(dir: &tempfile::TempDir, source_id: &str) -> (Vec<String>, Vec<String>) {
    let vector_dir = AppPaths::with_root(dir.path()).vector_db_dir;
    let rows = SqliteVectorBackend::new(
        open_pool(&vector_dir.join("default_vectors.db")).await.unwrap(),
        "ai_app_default_collection",
    )
    .get_where(&json!({"source_id": source_id}).as_object().cloned().unwrap())
    .await
    .unwrap();

    let mut ids: Vec<String> = rows.iter().map(|(id, _)| id.clone()).collect();
    ids.sort();

    let parent_pool = open_pool(&vector_dir.join("default_doc_store.db"))
        .await
        .unwrap();
    let mut keys: Vec<String> = sqlx::query_scalar(
        "SELECT doc_key FROM parent_documents WHERE collection = 'ai_app_default_collection'",
    )
    .fetch_all(&parent_pool)
    .await
    .unwrap();
    keys.sort();
    (ids, keys)
}

#[tokio::test]
async fn repeated_ingest_is_idempotent() {
    let (dir, state) = fresh_state().await;
    let content = "alpha beta gamma\ndelta epsilon\nzeta alpha\nbeta beta gamma";

    let first = ingest(&state, "s1", "kb/a", content).await;
    let after_first = stored_rows(&dir, "s1").await;
    assert!(!after_first.0.is_empty());
    assert!(!after_first.1.is_empty());

    let second = ingest(&state, "s1", "kb/a", content).await;
    assert_eq!(second.chunks, first.chunks);
    assert_eq!(second.replaced_rows, after_first.0.len() as u64);
    assert_eq!(stored_rows(&dir, "s1").await, after_first);

    let documents = state.retrieval.search(&[search("alpha")]).await.unwrap();
    assert_eq!(documents.len(), first.chunks);
}

#[tokio::test]
async fn long_line_with_trailing_newline_chats_with_rag() {
    let (_dir, state) = fresh_state().await;
    ingest(&state, "s1", "kb/a", "alpha beta gamma").await;

    let text = format!("{}\n", "alpha ".repeat(300));
    let mut lookup = search("");
    lookup.search_kwargs.score_threshold = Some(0.1);

    let response = state
        .chat_orchestrator()
        .await
        .unwrap()
        .run(ChatTurnRequest {
            chat_request: ChatRequest::new(vec![ChatMessage::user(text.clone())]),
            chat_request_context: RequestContext {
                split_mode: SplitMode::Normal,
                split_token_count: 100,
                rag_mode: RagMode::Normal,
                related_information_prompt_text: "Related:".into(),
                ..RequestContext::default()
            },
            vector_search_requests: vec![lookup],
        })
        .await
        .unwrap();

    // One completion call, carrying the retrieved text ahead of the whole message.
    assert_eq!(response.total_tokens, 1);
    assert_eq!(response.documents.len(), 1);
    assert_eq!(response.output, format!("Related:\nalpha beta gamma\n{}", text));
}

#[tokio::test]
async fn folder_delete_cascades_to_parents() {
    let (dir, state) = fresh_state().await;
    ingest(&state, "f-doc", "kb/f", "epsilon alpha").await;
    ingest(&state, "g-doc", "kb/g", "zeta alpha").await;

    let f_hits = state.retrieval.search(&[search("epsilon")]).await.unwrap();
    let f_doc_id = f_hits[0].metadata.doc_id.clone();
    let f_folder = state
        .catalog
        .get_folder_by_path("kb/f", false)
        .await
        .unwrap()
        .unwrap();

    let adapter = state.vectors.open("default", None).await.unwrap();
    assert_eq!(adapter.count().await.unwrap(), 2);
    adapter.delete_by_folder(&f_folder.id).await.unwrap();
    assert_eq!(adapter.count().await.unwrap(), 1);

    let remaining = state.retrieval.search(&[search("alpha")]).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].metadata.source_id, "g-doc");

    let parent_db = AppPaths::with_root(dir.path())
        .vector_db_dir
        .join("default_doc_store.db");
    let parents = SqliteParentStore::new(
        open_pool(&parent_db).await.unwrap(),
        "ai_app_default_collection",
    );
    assert_eq!(parents.mget(&[f_doc_id]).await.unwrap(), vec![None]);
}

#[tokio::test]
async fn folder_path_filter_is_resolved() {
    let (_dir, state) = fresh_state().await;
    ingest(&state, "a", "kb/a", "alpha beta").await;
    ingest(&state, "b", "kb/b", "alpha gamma").await;

    let mut request = search("alpha");
    request.search_kwargs.filter = Some(
        json!({"folder_path": "kb/b"})
            .as_object()
            .cloned()
            .unwrap(),
    );
    let documents = state.retrieval.search(&[request.clone()]).await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].metadata.source_id, "b");

    request.search_kwargs.filter = Some(
        json!({"folder_path": "kb/missing"})
            .as_object()
            .cloned()
            .unwrap(),
    );
    let err = state.retrieval.search(&[request]).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let (_dir, state) = fresh_state().await;
    let err = state.retrieval.search(&[search("  ")]).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidArgument(_)));
}
