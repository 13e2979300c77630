//! Two-tier cache with write-through and promotion.
//!
//! ```text
//! get ──► L1 (moka, bounded, short TTL) ──hit──► value
//!              │ miss
//!              ▼
//!         L2 (SharedCache, longer TTL) ──hit──► promote into L1 ──► value
//!              │ miss / error / timeout
//!              ▼
//!            miss  (caller computes the value and calls `set`)
//! ```
//!
//! L2 failures never reach the caller: they are logged, counted, and
//! treated as a miss. A cache outage costs latency, never correctness.
//!
//! A promotion that overlaps a prefix delete is discarded: the L2 read
//! may predate the delete, and inserting it into L1 afterwards would
//! resurrect an invalidated entry.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::key::namespace_of;
use super::local::{CacheValue, LocalCache};
use super::shared::{SharedCache, decode_envelope, encode_envelope};
use super::stats::{CacheStats, CacheTier};
use crate::telemetry;
use crate::{MimirError, Result};

/// Configuration for [`TieredCache`].
///
/// ```rust
/// # use mimir::cache::TieredCacheConfig;
/// # use std::time::Duration;
/// let config = TieredCacheConfig::new()
///     .l1_capacity(5_000)
///     .l1_ttl(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    /// Maximum number of L1 entries. Default: 10,000.
    pub l1_capacity: u64,
    /// Upper bound on L1 entry lifetime. Default: 60s.
    pub l1_ttl: Duration,
    /// Per-call deadline for L2 operations. Default: 250ms.
    pub l2_timeout: Duration,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 10_000,
            l1_ttl: Duration::from_secs(60),
            l2_timeout: Duration::from_millis(250),
        }
    }
}

impl TieredCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn l1_capacity(mut self, n: u64) -> Self {
        self.l1_capacity = n;
        self
    }

    pub fn l1_ttl(mut self, ttl: Duration) -> Self {
        self.l1_ttl = ttl;
        self
    }

    pub fn l2_timeout(mut self, timeout: Duration) -> Self {
        self.l2_timeout = timeout;
        self
    }

    /// Reject configurations the cache cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.l1_capacity == 0 {
            return Err(MimirError::Configuration(
                "l1_capacity must be greater than zero".into(),
            ));
        }
        if self.l2_timeout.is_zero() {
            return Err(MimirError::Configuration(
                "l2_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// A cache hit and the tier that served it.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub value: CacheValue,
    pub tier: CacheTier,
}

/// L1 + optional L2 behind one get/set/delete interface.
///
/// Create with [`init`](Self::init), share behind an `Arc`, and call
/// [`shutdown`](Self::shutdown) when the process is done with it. Every
/// method takes `&self`; callers never need their own locking.
pub struct TieredCache {
    l1: LocalCache,
    l2: Option<Arc<dyn SharedCache>>,
    config: TieredCacheConfig,
    stats: CacheStats,
    closed: AtomicBool,
    /// Bumped when a prefix delete completes.
    generation: AtomicU64,
    /// Prefix deletes currently running.
    invalidating: AtomicU64,
}

impl TieredCache {
    /// Validate `config` and build the cache. `l2 = None` runs L1-only.
    pub fn init(config: TieredCacheConfig, l2: Option<Arc<dyn SharedCache>>) -> Result<Self> {
        config.validate()?;
        if let Some(shared) = &l2 {
            info!(backend = shared.name(), l1_capacity = config.l1_capacity, "tiered cache ready");
        }
        Ok(Self {
            l1: LocalCache::new(config.l1_capacity),
            l2,
            config,
            stats: CacheStats::new(),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            invalidating: AtomicU64::new(0),
        })
    }

    /// L1-only cache with default configuration.
    pub fn local_only() -> Self {
        let config = TieredCacheConfig::default();
        Self {
            l1: LocalCache::new(config.l1_capacity),
            l2: None,
            config,
            stats: CacheStats::new(),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            invalidating: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Whether an L2 tier is attached.
    pub fn has_shared_tier(&self) -> bool {
        self.l2.is_some()
    }

    /// Drop all L1 entries and stop serving. L2 contents are left intact
    /// for other processes.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.l1.clear();
        self.l1.sync().await;
        info!("tiered cache shut down");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether a prefix delete ran or is running since `generation` was read.
    fn invalidated_since(&self, generation: u64) -> bool {
        self.invalidating.load(Ordering::SeqCst) > 0
            || self.generation.load(Ordering::SeqCst) != generation
    }

    /// Look up `key`, returning the value on a hit in either tier.
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        self.lookup(key).await.map(|hit| hit.value)
    }

    /// Look up `key`, reporting which tier answered.
    ///
    /// An L2 hit is promoted into L1 with a TTL no longer than the
    /// remaining L2 lifetime. An L2 read that overlaps a prefix delete is
    /// reported as a miss and never promoted.
    pub async fn lookup(&self, key: &str) -> Option<CacheHit> {
        if self.is_closed() {
            return None;
        }
        let namespace = namespace_of(key);

        if let Some(value) = self.l1.get(key).await {
            self.record_hit(namespace, CacheTier::L1);
            return Some(CacheHit {
                value,
                tier: CacheTier::L1,
            });
        }
        self.record_miss(namespace, CacheTier::L1);

        let l2 = self.l2.as_ref()?;
        let generation = self.generation.load(Ordering::SeqCst);
        let fetched = self.guarded(namespace, "get", l2.get(key)).await.flatten();
        let Some(bytes) = fetched else {
            self.record_miss(namespace, CacheTier::L2);
            return None;
        };
        let Some((remaining, payload)) = decode_envelope(&bytes) else {
            debug!(key, "discarding expired or malformed L2 entry");
            self.record_miss(namespace, CacheTier::L2);
            return None;
        };

        if self.invalidated_since(generation) {
            debug!(key, "prefix delete overlapped L2 read, not promoting");
            self.record_miss(namespace, CacheTier::L2);
            return None;
        }

        let value: CacheValue = Arc::from(payload);
        self.l1
            .insert(key, value.clone(), remaining.min(self.config.l1_ttl))
            .await;
        // The delete may have cleared L1 between the check and the insert
        if self.invalidated_since(generation) {
            self.l1.remove(key).await;
            debug!(key, "prefix delete raced promotion, entry dropped");
            self.record_miss(namespace, CacheTier::L2);
            return None;
        }
        self.stats.record_promotion(namespace);
        metrics::counter!(telemetry::CACHE_PROMOTIONS_TOTAL, "namespace" => namespace.to_owned())
            .increment(1);
        self.record_hit(namespace, CacheTier::L2);
        debug!(key, "promoted L2 entry into L1");

        Some(CacheHit {
            value,
            tier: CacheTier::L2,
        })
    }

    /// Write-through to both tiers.
    ///
    /// L2 keeps the entry for `ttl`; L1 for `min(ttl, l1_ttl)`, so the
    /// freshness tier never outlives the authority tier. A zero `ttl`
    /// removes the key instead.
    pub async fn set(&self, key: &str, value: impl Into<CacheValue>, ttl: Duration) {
        if self.is_closed() {
            return;
        }
        let value = value.into();
        self.l1
            .insert(key, value.clone(), ttl.min(self.config.l1_ttl))
            .await;

        if let Some(l2) = &self.l2 {
            let namespace = namespace_of(key);
            if ttl.is_zero() {
                self.guarded(namespace, "delete", l2.delete(key)).await;
            } else {
                let envelope = encode_envelope(&value, ttl);
                self.guarded(namespace, "set", l2.set(key, &envelope, ttl))
                    .await;
            }
        }
    }

    /// Remove `key` from both tiers.
    pub async fn delete(&self, key: &str) {
        self.l1.remove(key).await;
        if let Some(l2) = &self.l2 {
            self.guarded(namespace_of(key), "delete", l2.delete(key))
                .await;
        }
    }

    /// Remove every key starting with `prefix` (e.g. `"search:"`) from both tiers.
    ///
    /// L2 is cleared before L1 so that no promotion can refill L1 from a
    /// not yet cleared L2. Returns the number of L1 entries removed.
    pub async fn delete_by_prefix(&self, prefix: &str) -> u64 {
        self.invalidating.fetch_add(1, Ordering::SeqCst);
        let namespace = namespace_of(prefix);
        let shared_removed = match &self.l2 {
            Some(l2) => {
                self.guarded(namespace, "delete_by_prefix", l2.delete_by_prefix(prefix))
                    .await
            }
            None => None,
        };
        let removed = self.l1.remove_prefix(prefix).await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.invalidating.fetch_sub(1, Ordering::SeqCst);

        debug!(prefix, l1_removed = removed, l2_removed = ?shared_removed, "prefix delete");
        metrics::counter!(telemetry::CACHE_INVALIDATIONS_TOTAL, "namespace" => namespace.to_owned())
            .increment(1);
        removed
    }

    /// Approximate number of L1 entries.
    pub fn l1_entry_count(&self) -> u64 {
        self.l1.entry_count()
    }

    /// Flush pending L1 maintenance (evictions, counts).
    pub async fn run_pending_tasks(&self) {
        self.l1.sync().await;
    }

    /// Run an L2 call under the configured deadline, absorbing failures.
    async fn guarded<T>(
        &self,
        namespace: &str,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        let outcome = match tokio::time::timeout(self.config.l2_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(MimirError::Timeout(self.config.l2_timeout)),
        };
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(namespace, operation, error = %e, "shared cache unavailable, degrading");
                self.stats.record_error(namespace);
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL,
                    "namespace" => namespace.to_owned(),
                    "operation" => operation,
                )
                .increment(1);
                None
            }
        }
    }

    fn record_hit(&self, namespace: &str, tier: CacheTier) {
        self.stats.record_hit(namespace, tier);
        metrics::counter!(telemetry::CACHE_HITS_TOTAL,
            "tier" => tier.as_str(),
            "namespace" => namespace.to_owned(),
        )
        .increment(1);
    }

    fn record_miss(&self, namespace: &str, tier: CacheTier) {
        self.stats.record_miss(namespace, tier);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL,
            "tier" => tier.as_str(),
            "namespace" => namespace.to_owned(),
        )
        .increment(1);
    }
}
