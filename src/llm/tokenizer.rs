use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::core::errors::ApiError;

/// Counts tokens for splitting decisions only; never changes the completion model.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

pub struct BpeTokenCounter {
    bpe: CoreBPE,
}

impl BpeTokenCounter {
    /// Encoding registered for `model`, or `cl100k_base` when the family is unknown.
    pub fn for_model(model: &str) -> Result<Self, ApiError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                debug!("no registered encoding for {}, counting with cl100k_base", model);
                tiktoken_rs::cl100k_base().map_err(ApiError::internal)?
            }
        };
        Ok(Self { bpe })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}
