//! Pipeline collaborators.
//!
//! Traits the orchestrator depends on, plus bundled implementations:
//! an in-memory vector index, an OpenAI-compatible embeddings client,
//! generation through the `llm` crate, and (feature `local-inference`)
//! fastembed embeddings.

#[cfg(feature = "local-inference")]
pub mod fastembed;
pub mod llm_generation;
pub mod memory_index;
pub mod openai_embeddings;
pub mod traits;

#[cfg(feature = "local-inference")]
pub use fastembed::{LocalEmbeddingBackend, LocalEmbeddingModel};
pub use llm_generation::LlmGenerationBackend;
pub use memory_index::{IndexedPassage, InMemoryVectorIndex, cosine_similarity};
pub use openai_embeddings::{DEFAULT_EMBEDDING_MODEL, OpenAiEmbeddingClient};
pub use traits::{
    CorpusChange, CorpusListener, EmbeddingBackend, GenerateStream, GenerationBackend, VectorIndex,
};
