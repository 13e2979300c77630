//! Generation through the `llm` crate.
//!
//! [`LlmGenerationBackend`] stores backend configuration and builds an llm
//! provider per request, so one instance can be shared across tasks without
//! locking. Works with every backend compiled into the crate (OpenRouter,
//! Anthropic, OpenAI, Google, Ollama).

use async_trait::async_trait;
use futures_util::StreamExt;
use llm::LLMProvider;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, StreamChunk};
use tracing::instrument;

use super::traits::{GenerateStream, GenerationBackend};
use crate::types::{GenerateEvent, GenerateResponse, GenerationRequest};
use crate::{MimirError, Result};

/// Low temperature keeps answers close to the retrieved context.
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Generation backend over an llm crate provider.
///
/// # Example
///
/// ```ignore
/// use llm::builder::LLMBackend;
/// use mimir::providers::LlmGenerationBackend;
///
/// let backend = LlmGenerationBackend::new(
///     LLMBackend::OpenRouter,
///     Some("sk-or-your-key"),
///     "anthropic/claude-sonnet-4",
/// );
/// ```
pub struct LlmGenerationBackend {
    backend: LLMBackend,
    api_key: Option<String>,
    model: String,
    name: String,
    /// Ollama base URL (only used for Ollama backend)
    ollama_url: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout_secs: u64,
}

impl LlmGenerationBackend {
    pub fn new(backend: LLMBackend, api_key: Option<impl Into<String>>, model: impl Into<String>) -> Self {
        let name = format!("llm-{}", backend_label(&backend));
        Self {
            backend,
            api_key: api_key.map(|k| k.into()),
            model: model.into(),
            name,
            ollama_url: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            timeout_secs: 120,
        }
    }

    /// Set the Ollama base URL (only relevant for Ollama backend).
    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// HTTP timeout inside the llm crate. The orchestrator's generation
    /// deadline applies on top of it.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_provider(&self, system: Option<&str>) -> Result<Box<dyn LLMProvider>> {
        let mut builder = LLMBuilder::new()
            .backend(self.backend.clone())
            .model(&self.model)
            .temperature(self.temperature)
            .timeout_seconds(self.timeout_secs);
        if let Some(ref key) = self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(sys) = system {
            builder = builder.system(sys);
        }
        if let Some(max) = self.max_tokens {
            builder = builder.max_tokens(max);
        }
        if self.backend == LLMBackend::Ollama
            && let Some(ref url) = self.ollama_url
        {
            builder = builder.base_url(url.clone());
        }

        builder.build().map_err(MimirError::from)
    }
}

fn backend_label(backend: &LLMBackend) -> &'static str {
    match backend {
        LLMBackend::OpenRouter => "openrouter",
        LLMBackend::Anthropic => "anthropic",
        LLMBackend::OpenAI => "openai",
        LLMBackend::Google => "google",
        LLMBackend::Ollama => "ollama",
        _ => "other",
    }
}

#[async_trait]
impl GenerationBackend for LlmGenerationBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "llm.generate", skip(self, request), fields(model = %self.model, provider = %self.name))]
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerateResponse> {
        let provider = self.build_provider(request.system.as_deref())?;
        let messages = [ChatMessage::user().content(request.prompt.clone()).build()];

        let response = provider.chat(&messages).await.map_err(MimirError::from)?;
        let text = response.text().ok_or(MimirError::EmptyResponse)?;

        Ok(GenerateResponse {
            text,
            model: Some(self.model.clone()),
        })
    }

    #[instrument(name = "llm.generate_stream", skip(self, request), fields(model = %self.model, provider = %self.name))]
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<GenerateStream> {
        let provider = self.build_provider(request.system.as_deref())?;
        let messages = [ChatMessage::user().content(request.prompt.clone()).build()];

        let stream = provider
            .chat_stream_with_tools(&messages, None)
            .await
            .map_err(MimirError::from)?;

        let converted = stream.filter_map(|result| async move {
            match result {
                Ok(StreamChunk::Text(text)) => Some(Ok(GenerateEvent::Text(text))),
                Ok(StreamChunk::Done { .. }) => Some(Ok(GenerateEvent::Done)),
                Ok(_) => None,
                Err(e) => Some(Err(MimirError::from(e))),
            }
        });

        Ok(Box::pin(converted))
    }
}
