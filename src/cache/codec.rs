//! Byte encodings for cached values.
//!
//! Embeddings use a compact binary layout that reproduces every `f32`
//! bit-for-bit:
//!
//! ```text
//! u32 LE model length | model (UTF-8) | f32 LE * dimensions
//! ```
//!
//! Search results are stored as JSON.

use crate::types::{Embedding, SearchResult};
use crate::{MimirError, Result};

const LEN_PREFIX: usize = 4;
const F32_BYTES: usize = 4;

/// Fails when the model name does not fit the `u32` length prefix.
pub fn encode_embedding(embedding: &Embedding) -> Result<Vec<u8>> {
    let model = embedding.model.as_bytes();
    let prefix = length_prefix(model.len())?;
    let mut out = Vec::with_capacity(LEN_PREFIX + model.len() + embedding.values.len() * F32_BYTES);
    out.extend_from_slice(&prefix);
    out.extend_from_slice(model);
    for value in &embedding.values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

fn length_prefix(len: usize) -> Result<[u8; LEN_PREFIX]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| MimirError::DataError(format!("model name of {len} bytes is too long")))
}

pub fn decode_embedding(bytes: &[u8]) -> Result<Embedding> {
    let prefix: [u8; LEN_PREFIX] = bytes
        .get(..LEN_PREFIX)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| MimirError::DataError("embedding entry too short".into()))?;
    let model_len = u32::from_le_bytes(prefix) as usize;

    let model_end = LEN_PREFIX
        .checked_add(model_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| MimirError::DataError("embedding model name out of bounds".into()))?;
    let model = std::str::from_utf8(&bytes[LEN_PREFIX..model_end])
        .map_err(|e| MimirError::DataError(format!("embedding model name: {e}")))?;

    let body = &bytes[model_end..];
    if body.is_empty() || body.len() % F32_BYTES != 0 {
        return Err(MimirError::DataError(format!(
            "embedding body of {} bytes is not a whole vector",
            body.len()
        )));
    }
    let values = body
        .chunks_exact(F32_BYTES)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(Embedding::new(values, model))
}

pub fn encode_results(results: &[SearchResult]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(results)?)
}

pub fn decode_results(bytes: &[u8]) -> Result<Vec<SearchResult>> {
    Ok(serde_json::from_slice(bytes)?)
}
