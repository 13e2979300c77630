//! Shared L2 tier.
//!
//! [`SharedCache`] abstracts a networked store shared between processes
//! (redis in production, see the `redis` feature). Implementations report
//! failures as [`MimirError::CacheUnavailable`]; the
//! [`TieredCache`](super::TieredCache) absorbs them and degrades to a miss.
//!
//! Payloads written by the tiered cache carry their absolute expiry (see
//! [`encode_envelope`]), so a promotion into L1 never outlives the L2 entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::local::{EntryTtl, StoredEntry};
use crate::{MimirError, Result};

/// Networked key/value store used as the L2 tier.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Fetch raw bytes, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store raw bytes for `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key starting with `prefix`, returning how many were removed.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;

    /// Health check.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Envelope
// ============================================================================

const ENVELOPE_HEADER: usize = 8;

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Prefix `payload` with its absolute expiry (unix millis, big endian).
pub fn encode_envelope(payload: &[u8], ttl: Duration) -> Vec<u8> {
    let expires_at = unix_millis(SystemTime::now()).saturating_add(ttl.as_millis() as u64);
    let mut out = Vec::with_capacity(ENVELOPE_HEADER + payload.len());
    out.extend_from_slice(&expires_at.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Split an envelope into its remaining lifetime and payload.
///
/// Returns `None` for malformed or already-expired envelopes.
pub fn decode_envelope(bytes: &[u8]) -> Option<(Duration, &[u8])> {
    let header: [u8; ENVELOPE_HEADER] = bytes.get(..ENVELOPE_HEADER)?.try_into().ok()?;
    let expires_at = u64::from_be_bytes(header);
    let now = unix_millis(SystemTime::now());
    if expires_at <= now {
        return None;
    }
    Some((
        Duration::from_millis(expires_at - now),
        &bytes[ENVELOPE_HEADER..],
    ))
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Default capacity of [`MemorySharedCache`].
const DEFAULT_SHARED_CAPACITY: u64 = 100_000;

/// In-process stand-in for a shared store.
///
/// Useful for single-node deployments and tests. It can simulate an outage
/// ([`set_available`](Self::set_available)) or a slow network
/// ([`with_latency`](Self::with_latency)), and counts the calls it receives.
pub struct MemorySharedCache {
    entries: moka::sync::Cache<String, StoredEntry>,
    available: AtomicBool,
    latency: Option<Duration>,
    gets: AtomicU64,
    sets: AtomicU64,
}

impl MemorySharedCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SHARED_CAPACITY)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: moka::sync::Cache::builder()
                .max_capacity(capacity)
                .expire_after(EntryTtl)
                .build(),
            available: AtomicBool::new(true),
            latency: None,
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Toggle a simulated outage. While unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `get` calls received.
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `set` calls received.
    pub fn set_count(&self) -> u64 {
        self.sets.load(Ordering::SeqCst)
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    async fn enter(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MimirError::CacheUnavailable(
                "memory shared cache is offline".into(),
            ))
        }
    }
}

impl Default for MemorySharedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        if ttl.is_zero() {
            self.entries.invalidate(key);
        } else {
            self.entries
                .insert(key.to_owned(), StoredEntry::new(Arc::from(value), ttl));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.enter().await?;
        self.entries.invalidate(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        self.enter().await?;
        let doomed: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in &doomed {
            self.entries.invalidate(key.as_str());
        }
        Ok(doomed.len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.enter().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_remaining_ttl() {
        let bytes = encode_envelope(b"payload", Duration::from_secs(60));
        let (remaining, payload) = decode_envelope(&bytes).unwrap();
        assert_eq!(payload, b"payload");
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(55));
    }

    #[test]
    fn envelope_rejects_expired_and_malformed() {
        let expired = encode_envelope(b"x", Duration::ZERO);
        assert!(decode_envelope(&expired).is_none());
        assert!(decode_envelope(b"short").is_none());
    }

    #[tokio::test]
    async fn memory_cache_roundtrip_and_outage() {
        let cache = MemorySharedCache::new();
        cache
            .set("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        cache.set_available(false);
        assert!(matches!(
            cache.get("k").await,
            Err(MimirError::CacheUnavailable(_))
        ));

        cache.set_available(true);
        assert!(cache.contains("k"));
        assert_eq!(cache.get_count(), 2);
    }

    #[tokio::test]
    async fn memory_cache_prefix_delete() {
        let cache = MemorySharedCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("search:a", b"1", ttl).await.unwrap();
        cache.set("search:b", b"2", ttl).await.unwrap();
        cache.set("embed:a", b"3", ttl).await.unwrap();

        assert_eq!(cache.delete_by_prefix("search:").await.unwrap(), 2);
        assert!(!cache.contains("search:a"));
        assert!(cache.contains("embed:a"));
    }
}
