//! Query request/response types exposed by the orchestrator.

use serde::{Deserialize, Serialize};

use super::citation::Citation;
use super::search::{FilterConditions, SearchResult};

/// A user question plus optional retrieval overrides.
///
/// Unset parameters fall back to the orchestrator's
/// [`RetrievalConfig`](crate::config::RetrievalConfig) defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "FilterConditions::is_empty")]
    pub filter: FilterConditions,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    /// Add a metadata equality condition.
    pub fn filter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.filter.insert(key.into(), value);
        self
    }
}

/// Which cached stages served this query.
///
/// Exposed for observability and tests; not meant for behavioural
/// branching by callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUsage {
    pub embedding: bool,
    pub search: bool,
}

/// Grounded answer with its citations.
///
/// `citations` and `citation_count` are always serialized, so an answer
/// without sources is visibly flagged rather than missing a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub citation_count: usize,
    pub used_cache: CacheUsage,
}

impl QueryResponse {
    pub fn new(answer: String, citations: Vec<Citation>, used_cache: CacheUsage) -> Self {
        Self {
            answer,
            citation_count: citations.len(),
            citations,
            used_cache,
        }
    }

    /// Whether the answer is backed by at least one source.
    pub fn has_citations(&self) -> bool {
        self.citation_count > 0
    }
}

/// Events emitted by [`RetrievalOrchestrator::query_stream`](crate::pipeline::RetrievalOrchestrator::query_stream).
#[derive(Debug, Clone)]
pub enum QueryEvent {
    /// Retrieval finished; these passages made it into the context window.
    Retrieved {
        sources: Vec<SearchResult>,
        used_cache: CacheUsage,
    },
    /// Incremental answer text
    Token(String),
    /// Final response, citations included
    Done(QueryResponse),
}
