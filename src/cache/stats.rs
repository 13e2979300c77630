//! In-process hit/miss counters.
//!
//! Mirrors the `mimir_cache_*` metrics so hit rates can be read without a
//! metrics recorder installed.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// In-process, bounded, short-lived.
    L1,
    /// Shared, slower, longer-lived.
    L2,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::L1 => "l1",
            CacheTier::L2 => "l2",
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one namespace.
///
/// Every lookup counts once against L1. The L2 counters only move when an
/// L2 tier is attached and consulted: on an L1-only cache an L1 miss has
/// no matching L2 miss, so `l2_hits + l2_misses` equals `l1_misses` only
/// in two-tier mode. An L2 read that fails or times out counts as both an
/// `l2_errors` and an `l2_misses`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceStats {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    /// Shared-tier failures absorbed as misses.
    pub l2_errors: u64,
    pub promotions: u64,
}

impl NamespaceStats {
    /// Total lookups (every lookup consults L1 first), in either mode.
    pub fn lookups(&self) -> u64 {
        self.l1_hits + self.l1_misses
    }

    /// Fraction of lookups answered by either tier. `0.0` with no lookups.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            return 0.0;
        }
        (self.l1_hits + self.l2_hits) as f64 / lookups as f64
    }
}

/// Thread-safe per-namespace counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    namespaces: Mutex<HashMap<String, NamespaceStats>>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, namespace: &str, f: impl FnOnce(&mut NamespaceStats)) {
        let mut namespaces = self
            .namespaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(namespaces.entry(namespace.to_owned()).or_default());
    }

    pub(crate) fn record_hit(&self, namespace: &str, tier: CacheTier) {
        self.update(namespace, |s| match tier {
            CacheTier::L1 => s.l1_hits += 1,
            CacheTier::L2 => s.l2_hits += 1,
        });
    }

    pub(crate) fn record_miss(&self, namespace: &str, tier: CacheTier) {
        self.update(namespace, |s| match tier {
            CacheTier::L1 => s.l1_misses += 1,
            CacheTier::L2 => s.l2_misses += 1,
        });
    }

    pub(crate) fn record_error(&self, namespace: &str) {
        self.update(namespace, |s| s.l2_errors += 1);
    }

    pub(crate) fn record_promotion(&self, namespace: &str) {
        self.update(namespace, |s| s.promotions += 1);
    }

    /// Counters for `namespace` (all zero if never touched).
    pub fn namespace(&self, namespace: &str) -> NamespaceStats {
        self.namespaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of every namespace, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, NamespaceStats)> {
        let mut all: Vec<_> = self
            .namespaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(ns, stats)| (ns.clone(), *stats))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
