//! Embedding vectors

use serde::{Deserialize, Serialize};

/// Dense vector produced by an embedding backend.
///
/// Treated as immutable once produced: caches replace embeddings
/// wholesale and never patch individual components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

impl Embedding {
    /// Build an embedding, deriving `dimensions` from the vector length.
    pub fn new(values: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            dimensions: values.len(),
            values,
            model: model.into(),
        }
    }
}
