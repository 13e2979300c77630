//! OpenAI-compatible embeddings client.
//!
//! Speaks the `/v1/embeddings` protocol, which OpenAI, Azure-style gateways,
//! Ollama, vLLM and most self-hosted servers share.
//! See: <https://platform.openai.com/docs/api-reference/embeddings>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::traits::EmbeddingBackend;
use crate::{Embedding, MimirError, Result};

/// Default base URL for the OpenAI API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// HTTP-level timeout. Stage deadlines are enforced by the orchestrator.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for an OpenAI-compatible embeddings endpoint.
#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    api_key: Option<String>,
    http: Client,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddingClient {
    /// Create a client for the public OpenAI API.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(Some(api_key.into()), model, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (self-hosted servers, wiremock).
    ///
    /// `api_key = None` sends no `Authorization` header.
    pub fn with_base_url(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        let base_url: String = base_url.into();

        Self {
            api_key,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn request(&self, input: &[&str]) -> Result<Vec<Embedding>> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let mut request = self.http.post(&url).json(&EmbedRequest {
            model: &self.model,
            input,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MimirError::Http(e.to_string()))?;
        let response = check_status(response).await?;

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| MimirError::Http(e.to_string()))?;

        let mut data = body.data;
        if data.len() != input.len() {
            return Err(MimirError::DataError(format!(
                "expected {} embeddings, got {}",
                input.len(),
                data.len()
            )));
        }
        // The API may answer out of order
        data.sort_by_key(|d| d.index);

        data.into_iter()
            .map(|d| {
                if d.embedding.is_empty() {
                    Err(MimirError::EmptyResponse)
                } else {
                    Ok(Embedding::new(d.embedding, self.model.clone()))
                }
            })
            .collect()
    }
}

/// Map non-success responses to errors, keeping the server's message.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|e| e.error.message)
        .unwrap_or_else(|_| status.to_string());

    match status.as_u16() {
        401 | 403 => Err(MimirError::Configuration(format!(
            "embedding API rejected credentials: {message}"
        ))),
        400 | 422 => Err(MimirError::InvalidInput(message)),
        code => Err(MimirError::Api {
            status: code,
            message,
        }),
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddingClient {
    fn name(&self) -> &str {
        "openai-embeddings"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(name = "openai.embed", skip(self, text), fields(model = %self.model))]
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or(MimirError::EmptyResponse)
    }

    #[instrument(name = "openai.embed_batch", skip(self, texts), fields(model = %self.model, count = texts.len()))]
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}
