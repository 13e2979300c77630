//! Embedding cache.
//!
//! Query embeddings are deterministic for a given (text, model) pair, so
//! they are cached for a long time (24h by default) under the `embed`
//! namespace. Concurrent misses for the same key are coalesced into one
//! backend call. Failures are never cached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::codec;
use super::key::embedding_key;
use super::singleflight::SingleFlight;
use super::tiered::TieredCache;
use super::Resolved;
use crate::Result;
use crate::types::Embedding;

/// Default lifetime of a cached embedding.
pub const DEFAULT_EMBEDDING_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Embeddings keyed by normalized query text and model id.
pub struct EmbeddingCache {
    cache: Arc<TieredCache>,
    model: String,
    ttl: Duration,
    flights: SingleFlight<Resolved<Embedding>>,
}

impl EmbeddingCache {
    /// Cache embeddings produced by `model`.
    pub fn new(cache: Arc<TieredCache>, model: impl Into<String>) -> Self {
        Self {
            cache,
            model: model.into(),
            ttl: DEFAULT_EMBEDDING_TTL,
            flights: SingleFlight::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache key for `normalized_query` under this cache's model.
    pub fn key_for(&self, normalized_query: &str) -> String {
        embedding_key(normalized_query, &self.model)
    }

    /// Return the cached embedding for `normalized_query`, or run `compute`
    /// and cache its result.
    ///
    /// Callers racing on the same key share a single `compute` call and all
    /// observe its outcome. An error from `compute` is returned unchanged
    /// and leaves the cache untouched.
    pub async fn get_or_compute<F, Fut>(
        &self,
        normalized_query: &str,
        compute: F,
    ) -> Result<Resolved<Embedding>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Embedding>>,
    {
        let key = self.key_for(normalized_query);
        let key_ref = key.as_str();
        self.flights
            .run(key_ref, move || async move {
                if let Some(cached) = self.lookup(key_ref).await {
                    return Ok(Resolved::cached(cached));
                }
                let embedding = compute().await?;
                match codec::encode_embedding(&embedding) {
                    Ok(bytes) => self.cache.set(key_ref, bytes, self.ttl).await,
                    Err(e) => warn!(key = key_ref, error = %e, "not caching embedding"),
                }
                Ok(Resolved::computed(embedding))
            })
            .await
    }

    /// Drop the cached embedding for `normalized_query`.
    pub async fn forget(&self, normalized_query: &str) {
        self.cache.delete(&self.key_for(normalized_query)).await;
    }

    async fn lookup(&self, key: &str) -> Option<Embedding> {
        let bytes = self.cache.get(key).await?;
        match codec::decode_embedding(&bytes) {
            Ok(embedding) => {
                debug!(key, dimensions = embedding.dimensions, "embedding cache hit");
                Some(embedding)
            }
            Err(e) => {
                warn!(key, error = %e, "dropping undecodable embedding entry");
                self.cache.delete(key).await;
                None
            }
        }
    }
}
