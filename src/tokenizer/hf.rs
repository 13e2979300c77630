//! HuggingFace tokenizers implementation.

use std::path::Path;

use tracing::warn;

use super::{HeuristicTokenCounter, TokenCounter};
use crate::error::{MimirError, Result};

/// Exact token counts from a HuggingFace `tokenizer.json`.
pub struct HfTokenCounter {
    inner: tokenizers::Tokenizer,
}

impl HfTokenCounter {
    /// Load tokenizer from HuggingFace Hub.
    ///
    /// Downloads the tokenizer if not cached locally.
    pub fn from_hub(repo_id: &str) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| MimirError::Configuration(format!("failed to initialize HF API: {e}")))?;

        let tokenizer_path = api
            .model(repo_id.to_string())
            .get("tokenizer.json")
            .map_err(|e| {
                MimirError::Configuration(format!(
                    "failed to download tokenizer from {repo_id}: {e}"
                ))
            })?;

        Self::from_file(&tokenizer_path)
    }

    /// Load tokenizer from local file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            MimirError::Configuration(format!("failed to load tokenizer from {path:?}: {e}"))
        })?;
        Ok(Self { inner })
    }
}

impl TokenCounter for HfTokenCounter {
    /// Falls back to the character heuristic if encoding fails.
    fn count_tokens(&self, text: &str) -> usize {
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                warn!(error = %e, "tokenization failed, estimating");
                HeuristicTokenCounter.count_tokens(text)
            }
        }
    }
}
