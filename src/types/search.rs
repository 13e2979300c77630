//! Vector search types

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata equality filters passed through to the vector index.
///
/// A `BTreeMap` keeps keys sorted, so the serialized form is canonical and
/// can safely feed cache keys.
pub type FilterConditions = BTreeMap<String, serde_json::Value>;

/// Bibliographic and provenance metadata attached to a passage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    /// Identifier of the document this passage was cut from.
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Identifier in an external catalogue (e.g. a PubMed id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Free-form attributes matched by [`FilterConditions`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PassageMetadata {
    /// Metadata for a passage of `document_id`.
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            ..Self::default()
        }
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether every filter condition matches this metadata.
    ///
    /// Well-known keys (`document_id`, `source`, `doi`, `external_id`) are
    /// checked against their fields; all other keys against `extra`.
    pub fn matches(&self, filter: &FilterConditions) -> bool {
        filter.iter().all(|(key, expected)| match key.as_str() {
            "document_id" => str_eq(expected, Some(self.document_id.as_str())),
            "source" => str_eq(expected, self.source.as_deref()),
            "doi" => str_eq(expected, self.doi.as_deref()),
            "external_id" => str_eq(expected, self.external_id.as_deref()),
            _ => self.extra.get(key) == Some(expected),
        })
    }
}

fn str_eq(expected: &serde_json::Value, actual: Option<&str>) -> bool {
    matches!((expected.as_str(), actual), (Some(e), Some(a)) if e == a)
}

/// One scored passage returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub passage_id: String,
    /// Similarity in `0.0..=1.0`.
    pub score: f32,
    pub title: String,
    pub source_metadata: PassageMetadata,
    pub snippet: String,
}

impl SearchResult {
    pub fn new(
        passage_id: impl Into<String>,
        score: f32,
        title: impl Into<String>,
        snippet: impl Into<String>,
        source_metadata: PassageMetadata,
    ) -> Self {
        Self {
            passage_id: passage_id.into(),
            score,
            title: title.into(),
            source_metadata,
            snippet: snippet.into(),
        }
    }
}

/// Sort results by descending score, ties broken by ascending passage id.
///
/// Scores are clamped into `0.0..=1.0` first; NaN sorts last.
pub fn rank_results(results: &mut [SearchResult]) {
    for result in results.iter_mut() {
        if !result.score.is_nan() {
            result.score = result.score.clamp(0.0, 1.0);
        }
    }
    results.sort_by(compare_ranked);
}

fn compare_ranked(a: &SearchResult, b: &SearchResult) -> Ordering {
    match (a.score.is_nan(), b.score.is_nan()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => b
            .score
            .total_cmp(&a.score)
            .then_with(|| a.passage_id.cmp(&b.passage_id)),
    }
}

/// Request handed to a [`VectorIndex`](crate::providers::VectorIndex).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub score_threshold: f32,
    pub filter: FilterConditions,
}
