//! Token counting for the context budget.
//!
//! [`HeuristicTokenCounter`] is the default and needs no model files. With
//! the `local-inference` feature, [`HfTokenCounter`] counts with a real
//! HuggingFace tokenizer for exact budgets.

#[cfg(feature = "local-inference")]
mod hf;

#[cfg(feature = "local-inference")]
pub use hf::HfTokenCounter;

/// Counts tokens in prompt text.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Average characters per token for English prose under BPE tokenizers.
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximates tokens as one per [`CHARS_PER_TOKEN`] characters, rounded up.
///
/// ```rust
/// # use mimir::tokenizer::{HeuristicTokenCounter, TokenCounter};
/// assert_eq!(HeuristicTokenCounter.count_tokens(""), 0);
/// assert_eq!(HeuristicTokenCounter.count_tokens("abcde"), 2);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}
