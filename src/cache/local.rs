//! In-process L1 tier.
//!
//! A bounded moka cache with LRU eviction and a per-entry TTL. Entries
//! can leave early through capacity pressure, and an expired entry is never
//! returned: moka expires it on its own schedule and [`LocalCache::get`]
//! re-checks `created_at + ttl` on every read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use moka::policy::EvictionPolicy;

/// Cached bytes, shared between tiers without copying.
pub type CacheValue = Arc<[u8]>;

/// A value plus the bookkeeping needed to expire it.
#[derive(Clone, Debug)]
pub(crate) struct StoredEntry {
    pub(crate) value: CacheValue,
    pub(crate) created_at: Instant,
    pub(crate) ttl: Duration,
}

impl StoredEntry {
    pub(crate) fn new(value: CacheValue, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// Expires each entry after its own TTL.
pub(crate) struct EntryTtl;

impl Expiry<String, StoredEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded in-process cache with LRU eviction and per-entry TTL.
///
/// Safe to share between tasks; all synchronization is internal.
pub(crate) struct LocalCache {
    entries: Cache<String, StoredEntry>,
}

impl LocalCache {
    pub(crate) fn new(capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryTtl)
            .build();
        Self { entries }
    }

    /// Look up a live entry. Expired entries are evicted and reported as a miss.
    pub(crate) async fn get(&self, key: &str) -> Option<CacheValue> {
        let entry = self.entries.get(key).await?;
        if entry.is_expired(Instant::now()) {
            self.entries.invalidate(key).await;
            return None;
        }
        Some(entry.value)
    }

    pub(crate) async fn insert(&self, key: &str, value: CacheValue, ttl: Duration) {
        if ttl.is_zero() {
            self.entries.invalidate(key).await;
            return;
        }
        self.entries
            .insert(key.to_owned(), StoredEntry::new(value, ttl))
            .await;
    }

    pub(crate) async fn remove(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    /// Remove every entry whose key starts with `prefix`. Returns the count removed.
    pub(crate) async fn remove_prefix(&self, prefix: &str) -> u64 {
        let doomed: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in &doomed {
            self.entries.invalidate(key.as_str()).await;
        }
        doomed.len() as u64
    }

    pub(crate) fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Approximate entry count (moka applies writes lazily).
    pub(crate) fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Apply pending evictions so counts are exact.
    pub(crate) async fn sync(&self) {
        self.entries.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> CacheValue {
        Arc::from(s.as_bytes())
    }

    #[tokio::test]
    async fn insert_then_get() {
        let cache = LocalCache::new(10);
        cache.insert("a", value("1"), Duration::from_secs(60)).await;
        assert_eq!(cache.get("a").await.as_deref(), Some(&b"1"[..]));
        assert!(cache.get("b").await.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let cache = LocalCache::new(10);
        cache.insert("a", value("1"), Duration::ZERO).await;
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let cache = LocalCache::new(10);
        cache.insert("a", value("1"), Duration::from_millis(30)).await;
        assert!(cache.get("a").await.is_some());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = LocalCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.insert("a", value("1"), ttl).await;
        cache.insert("b", value("2"), ttl).await;
        cache.sync().await;
        // Touch "a" so "b" becomes the LRU entry
        assert!(cache.get("a").await.is_some());
        cache.insert("c", value("3"), ttl).await;
        cache.sync().await;

        assert!(cache.entry_count() <= 2);
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
    }

    #[tokio::test]
    async fn remove_prefix_only_touches_namespace() {
        let cache = LocalCache::new(10);
        let ttl = Duration::from_secs(60);
        cache.insert("search:1", value("a"), ttl).await;
        cache.insert("search:2", value("b"), ttl).await;
        cache.insert("embed:1", value("c"), ttl).await;

        assert_eq!(cache.remove_prefix("search:").await, 2);
        assert!(cache.get("search:1").await.is_none());
        assert!(cache.get("search:2").await.is_none());
        assert!(cache.get("embed:1").await.is_some());
    }

    #[test]
    fn stored_entry_expiry_boundary() {
        let entry = StoredEntry::new(value("x"), Duration::from_secs(1));
        assert!(!entry.is_expired(entry.created_at));
        assert!(entry.is_expired(entry.created_at + Duration::from_secs(1)));
        assert!(entry.is_expired(entry.created_at + Duration::from_secs(2)));
    }
}
