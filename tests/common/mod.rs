//! Shared test doubles for the retrieval pipeline.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use mimir::providers::{
    EmbeddingBackend, GenerateStream, GenerationBackend, IndexedPassage, InMemoryVectorIndex,
    VectorIndex,
};
use mimir::{
    Embedding, GenerateEvent, GenerateResponse, GenerationRequest, MimirError, PassageMetadata,
    Result, SearchQuery, SearchResult,
};

/// Terms the keyword embedder knows about, one dimension each.
pub const VOCABULARY: &[&str] = &[
    "hypertension",
    "blood",
    "pressure",
    "diabetes",
    "insulin",
    "glucose",
    "asthma",
    "inhaler",
    "treatment",
    "lifestyle",
];

/// Bag-of-keywords vector over [`VOCABULARY`].
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    VOCABULARY
        .iter()
        .map(|term| words.iter().filter(|w| *w == term).count() as f32)
        .collect()
}

// ============================================================================
// Embedding backend
// ============================================================================

/// Deterministic embedder counting its calls.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Option<Duration>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: None,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingBackend for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    fn model(&self) -> &str {
        "keyword-v1"
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MimirError::Api {
                status: 503,
                message: "embedding service overloaded".into(),
            });
        }
        Ok(Embedding::new(keyword_vector(text), "keyword-v1"))
    }
}

// ============================================================================
// Vector index
// ============================================================================

/// Wraps an [`InMemoryVectorIndex`], counting searches.
pub struct CountingIndex {
    pub inner: Arc<InMemoryVectorIndex>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl CountingIndex {
    pub fn new(inner: Arc<InMemoryVectorIndex>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for CountingIndex {
    fn name(&self) -> &str {
        "counting"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(MimirError::Http("index unreachable".into()));
        }
        self.inner.search(query).await
    }
}

// ============================================================================
// Generation backend
// ============================================================================

/// Returns a fixed answer, streamed word by word.
pub struct ScriptedGenerator {
    pub answer: String,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Stream ends without a `Done` event.
    pub truncate: bool,
    pub delay: Option<Duration>,
    pub prompts: std::sync::Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            truncate: false,
            delay: None,
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn truncating(answer: impl Into<String>) -> Self {
        Self {
            truncate: true,
            ..Self::new(answer)
        }
    }

    pub fn with_delay(answer: impl Into<String>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(answer)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn last_prompt(&self) -> Option<GenerationRequest> {
        self.prompts.lock().unwrap().last().cloned()
    }

    fn begin(&self, request: &GenerationRequest) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(MimirError::Api {
                status: 500,
                message: "generation failed".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerateResponse> {
        self.begin(request)?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(GenerateResponse {
            text: self.answer.clone(),
            model: Some("scripted".into()),
        })
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<GenerateStream> {
        self.begin(request)?;
        let mut events: Vec<Result<GenerateEvent>> = self
            .answer
            .split_inclusive(' ')
            .map(|word| Ok(GenerateEvent::Text(word.to_string())))
            .collect();
        if !self.truncate {
            events.push(Ok(GenerateEvent::Done));
        }
        Ok(Box::pin(stream::iter(events)))
    }
}

// ============================================================================
// Corpus
// ============================================================================

pub fn passage(id: &str, document: &str, title: &str, text: &str) -> IndexedPassage {
    IndexedPassage::new(
        id,
        title,
        text,
        keyword_vector(text),
        PassageMetadata::new(document).with_source("test-corpus"),
    )
}

/// A small cardiology/endocrinology corpus.
pub fn medical_corpus() -> Vec<IndexedPassage> {
    vec![
        passage(
            "htn-1",
            "guideline-htn",
            "Thiazide diuretics",
            "Thiazide diuretics are a first-line treatment for hypertension.",
        ),
        passage(
            "htn-2",
            "guideline-htn",
            "Lifestyle measures",
            "Lifestyle changes lower blood pressure in hypertension.",
        ),
        passage(
            "htn-3",
            "review-htn",
            "Definition",
            "Hypertension is persistently elevated blood pressure.",
        ),
        passage(
            "htn-4",
            "review-ace",
            "ACE inhibitors",
            "ACE inhibitors are a treatment option for hypertension and diabetes.",
        ),
        passage(
            "dm-1",
            "guideline-dm",
            "Insulin therapy",
            "Insulin treatment controls glucose in diabetes.",
        ),
        passage(
            "asthma-1",
            "guideline-asthma",
            "Inhalers",
            "Inhaler use in asthma.",
        ),
    ]
}

/// Index loaded with [`medical_corpus`].
pub async fn medical_index() -> Arc<InMemoryVectorIndex> {
    let index = Arc::new(InMemoryVectorIndex::new());
    index.reindex(medical_corpus()).await;
    index
}
