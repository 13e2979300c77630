//! Search result cache.
//!
//! Ranked passages are cached for an hour by default under the `search`
//! namespace, keyed by every retrieval parameter. Any change to the corpus
//! drops the whole namespace: cheap to reason about, at the cost of
//! evicting entries the change did not affect.
//!
//! An invalidation epoch closes the race between a search that is still
//! running and an invalidation that lands meanwhile. Such a search still
//! answers its caller, but its results never reach the cache. A lookup
//! that overlaps an invalidation is likewise treated as a miss.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::codec;
use super::key::{SEARCH_NAMESPACE, namespace_prefix, search_key};
use super::tiered::TieredCache;
use super::Resolved;
use crate::Result;
use crate::providers::{CorpusChange, CorpusListener};
use crate::types::{FilterConditions, SearchResult, rank_results};

/// Default lifetime of cached search results.
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(60 * 60);

/// Ranked search results keyed by query and retrieval parameters.
pub struct SearchResultCache {
    cache: Arc<TieredCache>,
    model: String,
    ttl: Duration,
    epoch: AtomicU64,
}

impl SearchResultCache {
    /// Cache results for queries embedded with `model`.
    pub fn new(cache: Arc<TieredCache>, model: impl Into<String>) -> Self {
        Self {
            cache,
            model: model.into(),
            ttl: DEFAULT_SEARCH_TTL,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of invalidations seen so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Cache key for a search with these parameters.
    pub fn key_for(
        &self,
        normalized_query: &str,
        top_k: usize,
        score_threshold: f32,
        filter: &FilterConditions,
    ) -> String {
        search_key(normalized_query, &self.model, top_k, score_threshold, filter)
    }

    /// Return cached results for `key`, or run `search`, rank its output and
    /// cache it.
    ///
    /// Errors from `search` propagate unchanged and nothing is cached.
    pub async fn get_or_search<F, Fut>(
        &self,
        key: &str,
        search: F,
    ) -> Result<Resolved<Vec<SearchResult>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<SearchResult>>>,
    {
        let started = self.epoch();
        if let Some(results) = self.lookup(key).await {
            if self.epoch() == started {
                return Ok(Resolved::cached(results));
            }
            debug!(key, "corpus changed during lookup, ignoring cached results");
        }

        let mut results = search().await?;
        // NaN scores cannot be ranked or serialized
        results.retain(|r| !r.score.is_nan());
        rank_results(&mut results);

        if self.epoch() != started {
            debug!(key, "corpus changed during search, not caching results");
            return Ok(Resolved::computed(results));
        }
        match codec::encode_results(&results) {
            Ok(bytes) => {
                self.cache.set(key, bytes, self.ttl).await;
                // An invalidation may have slipped in between the check and the write
                if self.epoch() != started {
                    self.cache.delete(key).await;
                }
            }
            Err(e) => warn!(key, error = %e, "failed to encode search results"),
        }
        Ok(Resolved::computed(results))
    }

    /// Drop every cached search result, in both tiers.
    ///
    /// Returns the number of L1 entries removed.
    pub async fn invalidate_namespace(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let removed = self
            .cache
            .delete_by_prefix(&namespace_prefix(SEARCH_NAMESPACE))
            .await;
        info!(epoch, removed, "search cache invalidated");
        removed
    }

    async fn lookup(&self, key: &str) -> Option<Vec<SearchResult>> {
        let bytes = self.cache.get(key).await?;
        match codec::decode_results(&bytes) {
            Ok(results) => {
                debug!(key, results = results.len(), "search cache hit");
                Some(results)
            }
            Err(e) => {
                warn!(key, error = %e, "dropping undecodable search entry");
                self.cache.delete(key).await;
                None
            }
        }
    }
}

#[async_trait]
impl CorpusListener for SearchResultCache {
    async fn on_corpus_change(&self, change: &CorpusChange) {
        debug!(?change, "corpus change");
        self.invalidate_namespace().await;
    }
}
