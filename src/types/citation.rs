//! Citations attached to generated answers

use serde::{Deserialize, Serialize};

/// A source backing part of a generated answer.
///
/// Derived from a [`SearchResult`](super::SearchResult) that made it into
/// the context window; `relevance_score` is the search score, never
/// recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based label matching the `[n]` marker in the context window.
    pub id: usize,
    pub passage_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub relevance_score: f32,
    pub quoted_text: String,
    /// Whether the answer text contains this citation's `[n]` marker.
    #[serde(default)]
    pub referenced: bool,
}
