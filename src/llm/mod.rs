pub mod openai;
pub mod provider;
pub mod tokenizer;
pub mod types;

pub use openai::{Credentials, OpenAiClient, OpenAiModelProvider};
pub use provider::{CompletionProvider, Embedder, ModelProvider};
pub use tokenizer::{BpeTokenCounter, TokenCounter};
pub use types::{ChatMessage, ChatRequest, Completion, ContentPart, Role};
