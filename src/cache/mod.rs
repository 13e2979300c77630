//! Caching subsystem.
//!
//! - [`TieredCache`] — generic two-tier byte cache. L1 is a bounded
//!   in-process moka cache; L2 is any [`SharedCache`] (in-memory or redis).
//!   Lookups promote L2 hits into L1, writes go to both tiers, and L2
//!   failures degrade to misses.
//!
//! - [`EmbeddingCache`] — query embeddings under the `embed` namespace,
//!   long TTL, concurrent misses coalesced through [`SingleFlight`].
//!
//! - [`SearchResultCache`] — ranked passages under the `search` namespace,
//!   medium TTL, dropped wholesale whenever the corpus changes.

mod codec;
pub mod embedding;
pub mod key;
mod local;
#[cfg(feature = "redis")]
pub mod redis;
pub mod search;
pub mod shared;
pub mod singleflight;
pub mod stats;
pub mod tiered;

pub use embedding::{DEFAULT_EMBEDDING_TTL, EmbeddingCache};
pub use key::{EMBED_NAMESPACE, SEARCH_NAMESPACE, embedding_key, normalize_query, search_key};
pub use local::CacheValue;
#[cfg(feature = "redis")]
pub use self::redis::RedisSharedCache;
pub use search::{DEFAULT_SEARCH_TTL, SearchResultCache};
pub use shared::{MemorySharedCache, SharedCache, decode_envelope, encode_envelope};
pub use singleflight::SingleFlight;
pub use stats::{CacheStats, CacheTier, NamespaceStats};
pub use tiered::{CacheHit, TieredCache, TieredCacheConfig};

/// A value together with whether a cache supplied it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    /// `true` when served from either cache tier without calling the backend.
    pub cached: bool,
}

impl<T> Resolved<T> {
    pub fn cached(value: T) -> Self {
        Self {
            value,
            cached: true,
        }
    }

    pub fn computed(value: T) -> Self {
        Self {
            value,
            cached: false,
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
