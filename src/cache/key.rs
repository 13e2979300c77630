//! Query normalization and cache key derivation.
//!
//! Keys are `"{namespace}:{sha256-hex}"`. SHA-256 over length-prefixed
//! components keeps keys stable across processes, which the shared tier
//! needs, and the namespace prefix lets [`delete_by_prefix`](super::TieredCache::delete_by_prefix)
//! drop a whole cache type at once.

use sha2::{Digest, Sha256};

use crate::types::FilterConditions;

/// Namespace for cached query embeddings.
pub const EMBED_NAMESPACE: &str = "embed";

/// Namespace for cached search results.
pub const SEARCH_NAMESPACE: &str = "search";

/// Normalize query text: trim, case-fold, collapse internal whitespace.
///
/// ```rust
/// # use mimir::cache::normalize_query;
/// assert_eq!(normalize_query("  What is\tDiabetes? "), "what is diabetes?");
/// ```
pub fn normalize_query(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.extend(word.chars().flat_map(char::to_lowercase));
    }
    normalized
}

/// Key prefix covering every entry of `namespace`.
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{namespace}:")
}

/// Logical namespace of a key (text before the first `:`).
pub fn namespace_of(key: &str) -> &str {
    key.split_once(':').map(|(ns, _)| ns).unwrap_or("default")
}

/// Embedding cache key for already-normalized text.
pub fn embedding_key(normalized_query: &str, model: &str) -> String {
    let mut hasher = KeyHasher::new(EMBED_NAMESPACE);
    hasher.field(model.as_bytes());
    hasher.field(normalized_query.as_bytes());
    hasher.finish()
}

/// Search-result cache key for already-normalized text.
///
/// Every retrieval parameter takes part in the hash, so changing the
/// threshold or a single filter value never reuses another entry.
pub fn search_key(
    normalized_query: &str,
    model: &str,
    top_k: usize,
    score_threshold: f32,
    filter: &FilterConditions,
) -> String {
    let mut canonical_filter = String::new();
    write_canonical_object(filter.iter(), &mut canonical_filter);

    let mut hasher = KeyHasher::new(SEARCH_NAMESPACE);
    hasher.field(model.as_bytes());
    hasher.field(normalized_query.as_bytes());
    hasher.field(&(top_k as u64).to_be_bytes());
    hasher.field(&score_threshold.to_bits().to_be_bytes());
    hasher.field(canonical_filter.as_bytes());
    hasher.finish()
}

struct KeyHasher {
    namespace: &'static str,
    inner: Sha256,
}

impl KeyHasher {
    fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            inner: Sha256::new(),
        }
    }

    /// Length prefix keeps `("ab", "c")` and `("a", "bc")` apart.
    fn field(&mut self, bytes: &[u8]) {
        self.inner.update((bytes.len() as u64).to_be_bytes());
        self.inner.update(bytes);
    }

    fn finish(self) -> String {
        format!("{}:{:x}", self.namespace, self.inner.finalize())
    }
}

/// Serialize JSON with object keys sorted at every depth.
fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            write_canonical_object(entries.into_iter(), out);
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_canonical_object<'a>(
    entries: impl Iterator<Item = (&'a String, &'a serde_json::Value)>,
    out: &mut String,
) {
    out.push('{');
    for (i, (key, value)) in entries.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&serde_json::Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(value, out);
    }
    out.push('}');
}
