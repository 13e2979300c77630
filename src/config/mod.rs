//! Retrieval pipeline configuration.
//!
//! [`RetrievalConfig`] is immutable once built: construct it through
//! [`RetrievalConfig::builder()`], which validates every field together.
//! File-based configuration for the CLI lives in [`file`] (feature `cli`).

#[cfg(feature = "cli")]
pub mod file;

use std::time::Duration;

use crate::cache::{DEFAULT_EMBEDDING_TTL, DEFAULT_SEARCH_TTL, TieredCacheConfig};
use crate::{MimirError, Result};

/// Default system prompt for grounded answers.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful medical information assistant. \
Answer using only the numbered sources provided. Cite every claim with its source label, \
for example [1]. If the sources do not contain the answer, say so plainly and do not guess. \
Do not give personal medical advice.";

/// Validated, immutable configuration for the retrieval pipeline.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    cache: TieredCacheConfig,
    embedding_model: Option<String>,
    embedding_ttl: Duration,
    search_ttl: Duration,
    context_token_budget: usize,
    default_top_k: usize,
    max_top_k: usize,
    default_score_threshold: f32,
    embed_timeout: Duration,
    search_timeout: Duration,
    generation_timeout: Duration,
    request_timeout: Duration,
    quote_chars: usize,
    system_prompt: String,
    stream_buffer: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            cache: TieredCacheConfig::default(),
            embedding_model: None,
            embedding_ttl: DEFAULT_EMBEDDING_TTL,
            search_ttl: DEFAULT_SEARCH_TTL,
            context_token_budget: 3_000,
            default_top_k: 5,
            max_top_k: 50,
            default_score_threshold: 0.3,
            embed_timeout: Duration::from_secs(5),
            search_timeout: Duration::from_secs(5),
            generation_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(90),
            quote_chars: 300,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            stream_buffer: 64,
        }
    }
}

impl RetrievalConfig {
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// Tiered cache settings (L1 capacity, L1 TTL, L2 timeout).
    pub fn cache(&self) -> &TieredCacheConfig {
        &self.cache
    }

    /// Model id used in cache keys, when overriding the backend's own.
    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    pub fn embedding_ttl(&self) -> Duration {
        self.embedding_ttl
    }

    pub fn search_ttl(&self) -> Duration {
        self.search_ttl
    }

    /// Token budget for the passages in the context window.
    pub fn context_token_budget(&self) -> usize {
        self.context_token_budget
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Largest `top_k` a request may ask for.
    pub fn max_top_k(&self) -> usize {
        self.max_top_k
    }

    pub fn default_score_threshold(&self) -> f32 {
        self.default_score_threshold
    }

    pub fn embed_timeout(&self) -> Duration {
        self.embed_timeout
    }

    pub fn search_timeout(&self) -> Duration {
        self.search_timeout
    }

    pub fn generation_timeout(&self) -> Duration {
        self.generation_timeout
    }

    /// Deadline for a whole query, all stages included.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Maximum characters quoted from a passage in a citation.
    pub fn quote_chars(&self) -> usize {
        self.quote_chars
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Events buffered between the pipeline and a slow stream consumer.
    pub fn stream_buffer(&self) -> usize {
        self.stream_buffer
    }

    fn validate(&self) -> Result<()> {
        self.cache.validate()?;

        let fail = |msg: String| Err(MimirError::Configuration(msg));
        if self.context_token_budget == 0 {
            return fail("context_token_budget must be greater than zero".into());
        }
        if self.max_top_k == 0 {
            return fail("max_top_k must be greater than zero".into());
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return fail(format!(
                "default_top_k must be between 1 and {}",
                self.max_top_k
            ));
        }
        if !(0.0..=1.0).contains(&self.default_score_threshold) {
            return fail("default_score_threshold must be within 0.0..=1.0".into());
        }
        for (name, ttl) in [
            ("embedding_ttl", self.embedding_ttl),
            ("search_ttl", self.search_ttl),
        ] {
            if ttl.is_zero() {
                return fail(format!("{name} must be greater than zero"));
            }
            if self.cache.l1_ttl > ttl {
                return fail(format!(
                    "l1_ttl ({:?}) must not exceed {name} ({ttl:?})",
                    self.cache.l1_ttl
                ));
            }
        }
        for (name, timeout) in [
            ("embed_timeout", self.embed_timeout),
            ("search_timeout", self.search_timeout),
            ("generation_timeout", self.generation_timeout),
        ] {
            if timeout.is_zero() || timeout >= self.request_timeout {
                return fail(format!(
                    "{name} ({timeout:?}) must be non-zero and shorter than request_timeout ({:?})",
                    self.request_timeout
                ));
            }
        }
        if self.quote_chars == 0 {
            return fail("quote_chars must be greater than zero".into());
        }
        if self.stream_buffer == 0 {
            return fail("stream_buffer must be greater than zero".into());
        }
        Ok(())
    }
}

/// Builder for [`RetrievalConfig`].
///
/// ```rust
/// # use mimir::config::RetrievalConfig;
/// # use std::time::Duration;
/// let config = RetrievalConfig::builder()
///     .context_token_budget(2_000)
///     .default_top_k(3)
///     .search_ttl(Duration::from_secs(600))
///     .build()
///     .unwrap();
/// assert_eq!(config.default_top_k(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    pub fn cache(mut self, cache: TieredCacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    pub fn l1_capacity(mut self, capacity: u64) -> Self {
        self.config.cache.l1_capacity = capacity;
        self
    }

    pub fn l1_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.l1_ttl = ttl;
        self
    }

    pub fn l2_timeout(mut self, timeout: Duration) -> Self {
        self.config.cache.l2_timeout = timeout;
        self
    }

    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = Some(model.into());
        self
    }

    pub fn embedding_ttl(mut self, ttl: Duration) -> Self {
        self.config.embedding_ttl = ttl;
        self
    }

    pub fn search_ttl(mut self, ttl: Duration) -> Self {
        self.config.search_ttl = ttl;
        self
    }

    pub fn context_token_budget(mut self, tokens: usize) -> Self {
        self.config.context_token_budget = tokens;
        self
    }

    pub fn default_top_k(mut self, top_k: usize) -> Self {
        self.config.default_top_k = top_k;
        self
    }

    pub fn max_top_k(mut self, top_k: usize) -> Self {
        self.config.max_top_k = top_k;
        self
    }

    pub fn default_score_threshold(mut self, threshold: f32) -> Self {
        self.config.default_score_threshold = threshold;
        self
    }

    pub fn embed_timeout(mut self, timeout: Duration) -> Self {
        self.config.embed_timeout = timeout;
        self
    }

    pub fn search_timeout(mut self, timeout: Duration) -> Self {
        self.config.search_timeout = timeout;
        self
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn quote_chars(mut self, chars: usize) -> Self {
        self.config.quote_chars = chars;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn stream_buffer(mut self, size: usize) -> Self {
        self.config.stream_buffer = size;
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<RetrievalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
