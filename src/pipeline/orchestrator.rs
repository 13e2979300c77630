//! Retrieval orchestrator.
//!
//! ```text
//! normalize ─► embedding (EmbeddingCache ─miss─► EmbeddingBackend)
//!           ─► search    (SearchResultCache ─miss─► VectorIndex)
//!           ─► context   (token budget)
//!           ─► generate  (GenerationBackend)
//!           ─► citations
//! ```
//!
//! Each stage runs under its own deadline and the whole query under the
//! request deadline. A failing stage ends the query with a
//! [`MimirError`] tagged with that stage. Nothing is retried here; cache
//! writes made before a failure stay valid, so an immediate retry by the
//! caller skips the stages that already succeeded.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, instrument, warn};

use super::citation::extract_citations;
use super::context::{ContextWindow, build_context};
use super::prompt::build_request;
use super::stream::{EventSender, QueryStream, bounded_stream};
use crate::cache::{
    CacheStats, EmbeddingCache, SearchResultCache, SharedCache, TieredCache, normalize_query,
};
use crate::config::RetrievalConfig;
use crate::error::Stage;
use crate::providers::{CorpusChange, CorpusListener, EmbeddingBackend, GenerationBackend, VectorIndex};
use crate::telemetry;
use crate::tokenizer::{HeuristicTokenCounter, TokenCounter};
use crate::types::{
    CacheUsage, FilterConditions, GenerateEvent, QueryEvent, QueryRequest, QueryResponse,
    SearchQuery, SearchResult,
};
use crate::{MimirError, Result};

/// Outcome of the retrieval half of a query.
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// Ranked results as returned by the search stage.
    pub results: Vec<SearchResult>,
    /// Passages admitted into the context window.
    pub window: ContextWindow,
    pub used_cache: CacheUsage,
}

/// Query parameters after defaults and validation.
struct ResolvedQuery {
    question: String,
    normalized: String,
    top_k: usize,
    score_threshold: f32,
    filter: FilterConditions,
}

struct Inner {
    config: RetrievalConfig,
    cache: Arc<TieredCache>,
    embeddings: EmbeddingCache,
    searches: Arc<SearchResultCache>,
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn GenerationBackend>,
    tokens: Arc<dyn TokenCounter>,
}

/// Runs grounded queries against the cached retrieval pipeline.
///
/// Cheap to clone; clones share caches and collaborators.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = RetrievalOrchestrator::builder()
///     .embedder(Arc::new(embedder))
///     .index(index.clone())
///     .generator(Arc::new(generator))
///     .build()?;
/// index.add_listener(orchestrator.search_cache());
///
/// let response = orchestrator.query(QueryRequest::new("What is hypertension?")).await?;
/// ```
#[derive(Clone)]
pub struct RetrievalOrchestrator {
    inner: Arc<Inner>,
}

impl RetrievalOrchestrator {
    pub fn builder() -> RetrievalOrchestratorBuilder {
        RetrievalOrchestratorBuilder::default()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.inner.config
    }

    /// The search result cache, for registering with a corpus owner.
    pub fn search_cache(&self) -> Arc<SearchResultCache> {
        Arc::clone(&self.inner.searches)
    }

    /// The tiered cache shared by both specializations.
    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.inner.cache
    }

    /// Hit/miss counters per namespace and tier.
    pub fn cache_stats(&self) -> &CacheStats {
        self.inner.cache.stats()
    }

    /// Drop every cached search result.
    pub async fn invalidate_search_cache(&self) -> u64 {
        self.inner.searches.invalidate_namespace().await
    }

    /// Release cache resources. Later queries still work, uncached.
    pub async fn shutdown(&self) {
        self.inner.cache.shutdown().await;
    }

    /// Answer `request` with citations.
    #[instrument(name = "mimir.query", skip(self, request), fields(top_k = ?request.top_k))]
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let inner = &self.inner;
        let outcome = with_deadline(inner.config.request_timeout(), async {
            let query = inner.resolve(&request)?;
            let retrieval = inner.retrieve(&query).await?;
            inner.answer(&query, retrieval).await
        })
        .await;
        record_query(&outcome);
        outcome
    }

    /// Run only the retrieval half: embedding, search, context assembly.
    #[instrument(name = "mimir.retrieve", skip(self, request))]
    pub async fn retrieve(&self, request: &QueryRequest) -> Result<Retrieval> {
        let inner = &self.inner;
        with_deadline(inner.config.request_timeout(), async {
            let query = inner.resolve(request)?;
            inner.retrieve(&query).await
        })
        .await
    }

    /// Answer `request` as a stream of events.
    ///
    /// Yields [`QueryEvent::Retrieved`], then [`QueryEvent::Token`] deltas,
    /// then [`QueryEvent::Done`] with the full response. A failure is
    /// yielded as the last item. Dropping the stream cancels generation.
    pub fn query_stream(&self, request: QueryRequest) -> QueryStream {
        let inner = Arc::clone(&self.inner);
        bounded_stream(self.inner.config.stream_buffer(), move |tx| async move {
            let outcome = with_deadline(inner.config.request_timeout(), async {
                let query = inner.resolve(&request)?;
                inner.stream_answer(&query, &tx).await
            })
            .await;

            match outcome {
                Ok(Some(response)) => {
                    record_query::<()>(&Ok(()));
                    tx.send(Ok(QueryEvent::Done(response))).await;
                }
                Ok(None) => debug!("query stream consumer went away"),
                Err(e) => {
                    record_query::<()>(&Err(e.clone()));
                    tx.send(Err(e)).await;
                }
            }
        })
    }
}

#[async_trait]
impl CorpusListener for RetrievalOrchestrator {
    async fn on_corpus_change(&self, change: &CorpusChange) {
        self.inner.searches.on_corpus_change(change).await;
    }
}

impl Inner {
    fn resolve(&self, request: &QueryRequest) -> Result<ResolvedQuery> {
        let normalized = normalize_query(&request.text);
        if normalized.is_empty() {
            return Err(MimirError::InvalidInput("query text is empty".into()));
        }

        let top_k = request.top_k.unwrap_or(self.config.default_top_k());
        if top_k == 0 || top_k > self.config.max_top_k() {
            return Err(MimirError::InvalidInput(format!(
                "top_k must be between 1 and {}",
                self.config.max_top_k()
            )));
        }

        let score_threshold = request
            .score_threshold
            .unwrap_or(self.config.default_score_threshold());
        if !(0.0..=1.0).contains(&score_threshold) {
            return Err(MimirError::InvalidInput(
                "score_threshold must be within 0.0..=1.0".into(),
            ));
        }

        Ok(ResolvedQuery {
            question: request.text.trim().to_string(),
            normalized,
            top_k,
            score_threshold,
            filter: request.filter.clone(),
        })
    }

    async fn retrieve(&self, query: &ResolvedQuery) -> Result<Retrieval> {
        let started = Instant::now();
        let embedding = self
            .embeddings
            .get_or_compute(&query.normalized, || {
                backend_call(Stage::Embedding, self.config.embed_timeout(), async {
                    self.embedder.embed(&query.normalized).await
                })
            })
            .await
            .map_err(MimirError::embedding)?;
        record_stage(Stage::Embedding, started);

        let started = Instant::now();
        let key = self.searches.key_for(
            &query.normalized,
            query.top_k,
            query.score_threshold,
            &query.filter,
        );
        let search = SearchQuery {
            vector: embedding.value.values,
            top_k: query.top_k,
            score_threshold: query.score_threshold,
            filter: query.filter.clone(),
        };
        let found = self
            .searches
            .get_or_search(&key, || {
                backend_call(Stage::Search, self.config.search_timeout(), async {
                    self.index.search(&search).await
                })
            })
            .await
            .map_err(MimirError::search)?;
        record_stage(Stage::Search, started);

        let mut results = found.value;
        results.retain(|r| r.score >= query.score_threshold);
        results.truncate(query.top_k);

        let window = build_context(
            &results,
            self.config.context_token_budget(),
            self.tokens.as_ref(),
        );
        debug!(
            results = results.len(),
            passages = window.len(),
            tokens = window.used_tokens(),
            "context assembled"
        );

        Ok(Retrieval {
            results,
            window,
            used_cache: CacheUsage {
                embedding: embedding.cached,
                search: found.cached,
            },
        })
    }

    async fn answer(&self, query: &ResolvedQuery, retrieval: Retrieval) -> Result<QueryResponse> {
        let request = build_request(self.config.system_prompt(), &query.question, &retrieval.window);

        let started = Instant::now();
        let generated = backend_call(Stage::Generation, self.config.generation_timeout(), async {
            self.generator.generate(&request).await
        })
        .await
        .map_err(MimirError::generation)?;
        record_stage(Stage::Generation, started);

        Ok(self.respond(generated.text, &retrieval))
    }

    /// Streaming counterpart of [`answer`](Self::answer). `Ok(None)` means
    /// the consumer dropped the stream.
    async fn stream_answer(
        &self,
        query: &ResolvedQuery,
        tx: &EventSender,
    ) -> Result<Option<QueryResponse>> {
        let retrieval = self.retrieve(query).await?;
        let retrieved = QueryEvent::Retrieved {
            sources: retrieval.window.sources(),
            used_cache: retrieval.used_cache,
        };
        if !tx.send(Ok(retrieved)).await {
            return Ok(None);
        }

        let request = build_request(self.config.system_prompt(), &query.question, &retrieval.window);
        let started = Instant::now();
        let answer = with_deadline(self.config.generation_timeout(), async {
            let mut events = self.generator.generate_stream(&request).await?;
            let mut answer = String::new();
            while let Some(event) = events.next().await {
                match event? {
                    GenerateEvent::Text(text) => {
                        answer.push_str(&text);
                        if !tx.send(Ok(QueryEvent::Token(text))).await {
                            return Ok(None);
                        }
                    }
                    GenerateEvent::Done => return Ok(Some(answer)),
                }
            }
            Err(MimirError::Truncated(
                "generation stream ended before completion".into(),
            ))
        })
        .await;

        let answer = match answer {
            Ok(answer) => {
                count_backend_call(Stage::Generation, true);
                answer
            }
            Err(MimirError::RequestTimeout(limit)) => {
                count_backend_call(Stage::Generation, false);
                return Err(MimirError::generation(MimirError::Timeout(limit)));
            }
            Err(e) => {
                count_backend_call(Stage::Generation, false);
                return Err(MimirError::generation(e));
            }
        };
        record_stage(Stage::Generation, started);

        Ok(answer.map(|text| self.respond(text, &retrieval)))
    }

    fn respond(&self, answer: String, retrieval: &Retrieval) -> QueryResponse {
        let citations = extract_citations(&answer, &retrieval.window, self.config.quote_chars());
        if citations.is_empty() {
            debug!("answer carries no citations");
        }
        QueryResponse::new(answer, citations, retrieval.used_cache)
    }
}

/// Run `fut` under `limit`, mapping expiry to [`MimirError::RequestTimeout`].
async fn with_deadline<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(MimirError::RequestTimeout(limit)))
}

/// Call a backend under its stage deadline, counting the call.
async fn backend_call<T>(
    stage: Stage,
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    let outcome = match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(MimirError::Timeout(limit)),
    };
    if let Err(e) = &outcome {
        warn!(stage = stage.as_str(), error = %e, "backend call failed");
    }
    count_backend_call(stage, outcome.is_ok());
    outcome
}

fn count_backend_call(stage: Stage, ok: bool) {
    metrics::counter!(telemetry::BACKEND_CALLS_TOTAL,
        "stage" => stage.as_str(),
        "status" => if ok { "ok" } else { "error" },
    )
    .increment(1);
}

fn record_stage(stage: Stage, started: Instant) {
    metrics::histogram!(telemetry::STAGE_DURATION_SECONDS, "stage" => stage.as_str())
        .record(started.elapsed().as_secs_f64());
}

fn record_query<T>(outcome: &Result<T>) {
    let (status, stage) = match outcome {
        Ok(_) => ("ok", "none"),
        Err(e) => ("error", e.stage().map(|s| s.as_str()).unwrap_or("request")),
    };
    metrics::counter!(telemetry::QUERIES_TOTAL, "status" => status, "stage" => stage).increment(1);
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`RetrievalOrchestrator`].
///
/// The embedder, index and generator are required. Without an explicit
/// cache, one is created from the configuration and the optional shared
/// tier.
#[derive(Default)]
pub struct RetrievalOrchestratorBuilder {
    config: Option<RetrievalConfig>,
    cache: Option<Arc<TieredCache>>,
    shared: Option<Arc<dyn SharedCache>>,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    index: Option<Arc<dyn VectorIndex>>,
    generator: Option<Arc<dyn GenerationBackend>>,
    tokens: Option<Arc<dyn TokenCounter>>,
}

impl RetrievalOrchestratorBuilder {
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an existing tiered cache (e.g. shared with other orchestrators).
    pub fn cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach an L2 tier to the cache the builder creates.
    pub fn shared_cache(mut self, shared: Arc<dyn SharedCache>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn GenerationBackend>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Token counter for the context budget. Default: [`HeuristicTokenCounter`].
    pub fn token_counter(mut self, tokens: Arc<dyn TokenCounter>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn build(self) -> Result<RetrievalOrchestrator> {
        let missing = |what: &str| MimirError::Configuration(format!("{what} is required"));
        let embedder = self.embedder.ok_or_else(|| missing("embedder"))?;
        let index = self.index.ok_or_else(|| missing("vector index"))?;
        let generator = self.generator.ok_or_else(|| missing("generator"))?;

        let config = match self.config {
            Some(config) => config,
            None => RetrievalConfig::builder().build()?,
        };
        let cache = match (self.cache, self.shared) {
            (Some(_), Some(_)) => {
                return Err(MimirError::Configuration(
                    "set either cache or shared_cache, not both".into(),
                ));
            }
            (Some(cache), None) => cache,
            (None, shared) => Arc::new(TieredCache::init(config.cache().clone(), shared)?),
        };

        let model = config
            .embedding_model()
            .unwrap_or_else(|| embedder.model())
            .to_string();
        let embeddings = EmbeddingCache::new(Arc::clone(&cache), model.clone())
            .with_ttl(config.embedding_ttl());
        let searches = Arc::new(
            SearchResultCache::new(Arc::clone(&cache), model).with_ttl(config.search_ttl()),
        );

        Ok(RetrievalOrchestrator {
            inner: Arc::new(Inner {
                config,
                cache,
                embeddings,
                searches,
                embedder,
                index,
                generator,
                tokens: self
                    .tokens
                    .unwrap_or_else(|| Arc::new(HeuristicTokenCounter)),
            }),
        })
    }
}
