//! Brute-force in-memory vector index.
//!
//! Exact cosine-similarity scan over every stored passage. Fine for corpora
//! up to a few hundred thousand passages, tests, and the CLI. Every mutation
//! is reported to registered [`CorpusListener`]s, so a search cache wired
//! in through [`add_listener`](InMemoryVectorIndex::add_listener) never
//! serves results computed against an older corpus.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::traits::{CorpusChange, CorpusListener, VectorIndex};
use crate::types::{PassageMetadata, SearchQuery, SearchResult, rank_results};
use crate::{MimirError, Result};

/// A passage with its embedding, as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPassage {
    pub passage_id: String,
    pub title: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: PassageMetadata,
}

impl IndexedPassage {
    pub fn new(
        passage_id: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
        vector: Vec<f32>,
        metadata: PassageMetadata,
    ) -> Self {
        Self {
            passage_id: passage_id.into(),
            title: title.into(),
            text: text.into(),
            vector,
            metadata,
        }
    }
}

/// Vector index held entirely in memory.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    /// Passages grouped by document id.
    documents: RwLock<BTreeMap<String, Vec<IndexedPassage>>>,
    listeners: RwLock<Vec<Arc<dyn CorpusListener>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify `listener` of every future mutation.
    pub fn add_listener(&self, listener: Arc<dyn CorpusListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Replace all passages of `document_id`.
    ///
    /// Each passage's `metadata.document_id` is overwritten with `document_id`.
    pub async fn upsert_document(
        &self,
        document_id: &str,
        mut passages: Vec<IndexedPassage>,
    ) -> Result<()> {
        if let Some(p) = passages.iter().find(|p| p.vector.is_empty()) {
            return Err(MimirError::InvalidInput(format!(
                "passage {} has an empty vector",
                p.passage_id
            )));
        }
        for passage in &mut passages {
            passage.metadata.document_id = document_id.to_string();
        }

        let existed = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document_id.to_string(), passages)
            .is_some();

        let document_id = document_id.to_string();
        let change = if existed {
            CorpusChange::DocumentUpdated { document_id }
        } else {
            CorpusChange::DocumentAdded { document_id }
        };
        self.notify(change).await;
        Ok(())
    }

    /// Remove `document_id`. Returns whether it was present.
    pub async fn remove_document(&self, document_id: &str) -> bool {
        let removed = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(document_id)
            .is_some();
        if removed {
            self.notify(CorpusChange::DocumentDeleted {
                document_id: document_id.to_string(),
            })
            .await;
        }
        removed
    }

    /// Replace the whole corpus.
    pub async fn reindex(&self, passages: Vec<IndexedPassage>) {
        let mut documents: BTreeMap<String, Vec<IndexedPassage>> = BTreeMap::new();
        for passage in passages {
            documents
                .entry(passage.metadata.document_id.clone())
                .or_default()
                .push(passage);
        }
        *self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner) = documents;
        self.notify(CorpusChange::Reindexed).await;
    }

    pub fn document_count(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn passage_count(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    async fn notify(&self, change: CorpusChange) {
        // Clone out so no lock is held across await points
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(?change, listeners = listeners.len(), "corpus changed");
        for listener in listeners {
            listener.on_corpus_change(&change).await;
        }
    }
}

/// Cosine similarity; `0.0` when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "in-memory"
    }

    #[instrument(name = "memory_index.search", skip(self, query), fields(top_k = query.top_k))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        if query.top_k == 0 {
            return Ok(Vec::new());
        }
        let documents = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut results = Vec::new();
        for passage in documents.values().flatten() {
            if passage.vector.len() != query.vector.len() {
                return Err(MimirError::InvalidInput(format!(
                    "query has {} dimensions, passage {} has {}",
                    query.vector.len(),
                    passage.passage_id,
                    passage.vector.len()
                )));
            }
            if !passage.metadata.matches(&query.filter) {
                continue;
            }
            let score = cosine_similarity(&query.vector, &passage.vector).clamp(0.0, 1.0);
            if score < query.score_threshold {
                continue;
            }
            results.push(SearchResult::new(
                passage.passage_id.clone(),
                score,
                passage.title.clone(),
                passage.text.clone(),
                passage.metadata.clone(),
            ));
        }
        drop(documents);

        rank_results(&mut results);
        results.truncate(query.top_k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
