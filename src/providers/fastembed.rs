//! Local embeddings via fastembed-rs.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{info, instrument};

use super::traits::EmbeddingBackend;
use crate::error::{MimirError, Result};
use crate::types::Embedding;

/// Supported local embedding models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalEmbeddingModel {
    /// all-MiniLM-L6-v2 (384 dims, fast, good quality).
    AllMiniLmL6V2,
    /// all-MiniLM-L12-v2 (384 dims, slightly better).
    AllMiniLmL12V2,
    /// BGE-small-en (384 dims, strong retrieval).
    BgeSmallEn,
    /// BGE-base-en (768 dims, higher quality).
    BgeBaseEn,
}

impl LocalEmbeddingModel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::AllMiniLmL12V2 => "all-MiniLM-L12-v2",
            Self::BgeSmallEn => "BGE-small-en",
            Self::BgeBaseEn => "BGE-base-en",
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::AllMiniLmL12V2 | Self::BgeSmallEn => 384,
            Self::BgeBaseEn => 768,
        }
    }

    /// Parse a model name as accepted in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::AllMiniLmL6V2,
            Self::AllMiniLmL12V2,
            Self::BgeSmallEn,
            Self::BgeBaseEn,
        ]
        .into_iter()
        .find(|m| m.name().eq_ignore_ascii_case(name))
    }
}

impl From<LocalEmbeddingModel> for fastembed::EmbeddingModel {
    fn from(model: LocalEmbeddingModel) -> Self {
        match model {
            LocalEmbeddingModel::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
            LocalEmbeddingModel::AllMiniLmL12V2 => fastembed::EmbeddingModel::AllMiniLML12V2,
            LocalEmbeddingModel::BgeSmallEn => fastembed::EmbeddingModel::BGESmallENV15,
            LocalEmbeddingModel::BgeBaseEn => fastembed::EmbeddingModel::BGEBaseENV15,
        }
    }
}

/// Directory for downloaded model files.
///
/// `MIMIR_CACHE_DIR` wins, then the platform cache dir.
pub fn model_cache_dir() -> PathBuf {
    std::env::var("MIMIR_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("mimir")
                .join("models")
        })
}

/// Embedding backend running a fastembed model in-process.
///
/// Inference is CPU-bound, so it runs on the blocking thread pool.
pub struct LocalEmbeddingBackend {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    kind: LocalEmbeddingModel,
}

impl LocalEmbeddingBackend {
    /// Load `kind`, downloading it if not cached locally.
    pub fn new(kind: LocalEmbeddingModel) -> Result<Self> {
        let options = fastembed::InitOptions::new(kind.into())
            .with_show_download_progress(false)
            .with_cache_dir(model_cache_dir());

        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            MimirError::Configuration(format!("failed to load embedding model: {e}"))
        })?;
        info!(model = kind.name(), "local embedding model loaded");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            kind,
        })
    }

    pub fn kind(&self) -> LocalEmbeddingModel {
        self.kind
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
            model
                .embed(texts, None)
                .map_err(|e| MimirError::DataError(format!("embedding failed: {e}")))
        })
        .await
        .map_err(|e| MimirError::DataError(format!("embedding task failed: {e}")))?
    }
}

#[async_trait]
impl EmbeddingBackend for LocalEmbeddingBackend {
    fn name(&self) -> &str {
        "fastembed"
    }

    fn model(&self) -> &str {
        self.kind.name()
    }

    #[instrument(name = "fastembed.embed", skip(self, text), fields(model = self.kind.name()))]
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let values = self
            .run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(MimirError::EmptyResponse)?;
        Ok(Embedding::new(values, self.kind.name()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let vectors = self
            .run(texts.iter().map(|s| s.to_string()).collect())
            .await?;
        Ok(vectors
            .into_iter()
            .map(|values| Embedding::new(values, self.kind.name()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_round_trip() {
        assert_eq!(
            LocalEmbeddingModel::from_name("bge-small-en"),
            Some(LocalEmbeddingModel::BgeSmallEn)
        );
        assert_eq!(LocalEmbeddingModel::from_name("unknown"), None);
        assert_eq!(LocalEmbeddingModel::BgeBaseEn.dimensions(), 768);
    }
}
