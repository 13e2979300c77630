//! Mimir - Cached retrieval pipeline for grounded medical question answering
//!
//! A query is normalized, embedded, matched against a vector index, packed
//! into a token-budgeted context window, answered by a language model and
//! returned with structured citations. Embeddings and search results are
//! cached in a two-tier cache (in-process L1, shared L2) so repeated and
//! equivalent questions skip the expensive stages.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use llm::builder::LLMBackend;
//! use mimir::providers::{InMemoryVectorIndex, LlmGenerationBackend, OpenAiEmbeddingClient};
//! use mimir::{QueryRequest, RetrievalOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let index = Arc::new(InMemoryVectorIndex::new());
//!     let orchestrator = RetrievalOrchestrator::builder()
//!         .embedder(Arc::new(OpenAiEmbeddingClient::new("sk-...", "text-embedding-3-small")))
//!         .index(index.clone())
//!         .generator(Arc::new(LlmGenerationBackend::new(
//!             LLMBackend::OpenRouter,
//!             Some("sk-or-..."),
//!             "anthropic/claude-sonnet-4",
//!         )))
//!         .build()?;
//!
//!     // Corpus mutations drop cached search results
//!     index.add_listener(orchestrator.search_cache());
//!
//!     let response = orchestrator
//!         .query(QueryRequest::new("What is the first-line treatment for hypertension?").top_k(3))
//!         .await?;
//!
//!     println!("{}", response.answer);
//!     for citation in &response.citations {
//!         println!("[{}] {} ({:.2})", citation.id, citation.title, citation.relevance_score);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Shared cache tier
//!
//! With the `redis` feature, a [`RedisSharedCache`](cache::RedisSharedCache)
//! lets several processes share cached embeddings and search results. Any
//! other store can be plugged in through [`SharedCache`](cache::SharedCache).

pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod telemetry;
pub mod tokenizer;
pub mod types;

// Re-export main types at crate root
pub use error::{MimirError, Result, Stage};
pub use cache::{TieredCache, TieredCacheConfig};
pub use config::{RetrievalConfig, RetrievalConfigBuilder};
pub use pipeline::{QueryStream, Retrieval, RetrievalOrchestrator, RetrievalOrchestratorBuilder};

// Re-export all types
pub use types::{
    CacheUsage, Citation, Embedding, FilterConditions, GenerateEvent, GenerateResponse,
    GenerationRequest, PassageMetadata, QueryEvent, QueryRequest, QueryResponse, SearchQuery,
    SearchResult,
};
