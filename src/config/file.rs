//! Configuration file loading for the `mimir` CLI.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.mimir/config.toml` (user)
//! 3. `/etc/mimir/config.toml` (system)
//!
//! With no file at all, defaults apply. API keys never live in the file;
//! they come from the provider's environment variable.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::RetrievalConfig;
use crate::{MimirError, Result};

/// Top-level file configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub generation: GenerationSection,
}

/// `[cache]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSection {
    pub l1_capacity: Option<u64>,
    pub l1_ttl_secs: Option<u64>,
    pub l2_timeout_ms: Option<u64>,
    /// Shared tier; requires the `redis` feature. Unset runs L1-only.
    pub redis_url: Option<String>,
}

/// `[retrieval]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrievalSection {
    pub embedding_ttl_secs: Option<u64>,
    pub search_ttl_secs: Option<u64>,
    pub context_token_budget: Option<usize>,
    pub default_top_k: Option<usize>,
    pub max_top_k: Option<usize>,
    pub default_score_threshold: Option<f32>,
    pub embed_timeout_secs: Option<u64>,
    pub search_timeout_secs: Option<u64>,
    pub generation_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub quote_chars: Option<usize>,
    pub system_prompt: Option<String>,
}

/// `[embedding]`
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSection {
    /// "openai" (any OpenAI-compatible server) or "local" (fastembed).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    crate::providers::DEFAULT_EMBEDDING_MODEL.to_string()
}

/// `[generation]`
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSection {
    /// "openrouter", "anthropic", "openai", "google" or "ollama".
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Ollama base URL (only used for the ollama provider).
    #[serde(default)]
    pub ollama_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            ollama_url: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

fn default_generation_provider() -> String {
    "openrouter".to_string()
}

fn default_generation_model() -> String {
    "anthropic/claude-sonnet-4".to_string()
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("openrouter", "OPENROUTER_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("google", "GOOGLE_API_KEY"),
];

/// API key for `provider` from its environment variable.
pub fn api_key(provider: &str) -> Option<String> {
    PROVIDER_ENV_VARS
        .iter()
        .find(|(name, _)| *name == provider)
        .and_then(|(_, env_var)| std::env::var(env_var).ok())
        .filter(|key| !key.is_empty())
}

impl FileConfig {
    /// Load configuration from the standard locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MimirError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }
        Ok(None)
    }

    /// Build a validated [`RetrievalConfig`]; unset keys keep their defaults.
    pub fn retrieval_config(&self) -> Result<RetrievalConfig> {
        let mut builder = RetrievalConfig::builder();
        let cache = &self.cache;
        let r = &self.retrieval;

        if let Some(v) = cache.l1_capacity {
            builder = builder.l1_capacity(v);
        }
        if let Some(v) = cache.l1_ttl_secs {
            builder = builder.l1_ttl(Duration::from_secs(v));
        }
        if let Some(v) = cache.l2_timeout_ms {
            builder = builder.l2_timeout(Duration::from_millis(v));
        }
        if let Some(v) = r.embedding_ttl_secs {
            builder = builder.embedding_ttl(Duration::from_secs(v));
        }
        if let Some(v) = r.search_ttl_secs {
            builder = builder.search_ttl(Duration::from_secs(v));
        }
        if let Some(v) = r.context_token_budget {
            builder = builder.context_token_budget(v);
        }
        if let Some(v) = r.default_top_k {
            builder = builder.default_top_k(v);
        }
        if let Some(v) = r.max_top_k {
            builder = builder.max_top_k(v);
        }
        if let Some(v) = r.default_score_threshold {
            builder = builder.default_score_threshold(v);
        }
        if let Some(v) = r.embed_timeout_secs {
            builder = builder.embed_timeout(Duration::from_secs(v));
        }
        if let Some(v) = r.search_timeout_secs {
            builder = builder.search_timeout(Duration::from_secs(v));
        }
        if let Some(v) = r.generation_timeout_secs {
            builder = builder.generation_timeout(Duration::from_secs(v));
        }
        if let Some(v) = r.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(v));
        }
        if let Some(v) = r.quote_chars {
            builder = builder.quote_chars(v);
        }
        if let Some(v) = &r.system_prompt {
            builder = builder.system_prompt(v.clone());
        }
        builder.build()
    }
}
