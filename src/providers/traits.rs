//! Collaborator traits for the retrieval pipeline.
//!
//! The orchestrator depends on three capability-specific traits rather than
//! one "god trait":
//! - [`EmbeddingBackend`] turns query text into a vector
//! - [`VectorIndex`] finds scored passages near a vector
//! - [`GenerationBackend`] writes the answer, optionally streamed
//!
//! Corpus owners report document mutations through [`CorpusListener`] so
//! caches holding search results can drop them.
//!
//! None of these traits retry. A failure is returned as-is and the
//! orchestrator tags it with the stage it came from.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, stream};

use crate::Result;
use crate::types::{Embedding, GenerateEvent, GenerateResponse, GenerationRequest, SearchQuery, SearchResult};

// ============================================================================
// Embedding Backend
// ============================================================================

/// Produces query embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Identifier of the model producing the vectors. Part of every cache key.
    fn model(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed several texts.
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

// ============================================================================
// Vector Index
// ============================================================================

/// Similarity search over the passage corpus.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Index name for logging/debugging.
    fn name(&self) -> &str;

    /// Return at most `query.top_k` passages scoring at least
    /// `query.score_threshold` and matching every filter condition.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>>;
}

// ============================================================================
// Generation Backend
// ============================================================================

/// Stream of generation events.
pub type GenerateStream = Pin<Box<dyn Stream<Item = Result<GenerateEvent>> + Send>>;

/// Writes the grounded answer.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Non-streaming generation.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerateResponse>;

    /// Streaming generation.
    ///
    /// Default implementation runs [`generate`](Self::generate) and emits the
    /// whole answer as one chunk.
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<GenerateStream> {
        let response = self.generate(request).await?;
        let events = vec![Ok(GenerateEvent::Text(response.text)), Ok(GenerateEvent::Done)];
        Ok(Box::pin(stream::iter(events)))
    }
}

// ============================================================================
// Corpus changes
// ============================================================================

/// A mutation of the indexed corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusChange {
    DocumentAdded { document_id: String },
    DocumentUpdated { document_id: String },
    DocumentDeleted { document_id: String },
    /// The whole index was rebuilt.
    Reindexed,
}

impl CorpusChange {
    /// Affected document, `None` for a full re-index.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            CorpusChange::DocumentAdded { document_id }
            | CorpusChange::DocumentUpdated { document_id }
            | CorpusChange::DocumentDeleted { document_id } => Some(document_id),
            CorpusChange::Reindexed => None,
        }
    }
}

/// Receives corpus mutations.
#[async_trait]
pub trait CorpusListener: Send + Sync {
    async fn on_corpus_change(&self, change: &CorpusChange);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    struct Echo;

    #[async_trait]
    impl GenerationBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse {
                text: request.prompt.clone(),
                model: None,
            })
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_generate() {
        let stream = Echo
            .generate_stream(&GenerationRequest::new("hello"))
            .await
            .unwrap();
        let events: Vec<_> = stream.map(|e| e.unwrap()).collect().await;
        assert_eq!(
            events,
            vec![GenerateEvent::Text("hello".into()), GenerateEvent::Done]
        );
    }

    #[test]
    fn reindex_has_no_document() {
        assert_eq!(CorpusChange::Reindexed.document_id(), None);
        let change = CorpusChange::DocumentDeleted {
            document_id: "d1".into(),
        };
        assert_eq!(change.document_id(), Some("d1"));
    }
}
