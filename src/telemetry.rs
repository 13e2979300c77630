//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus,
//! statsd); without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `tier` — cache tier: "l1" or "l2"
//! - `namespace` — logical cache namespace (e.g. "embed", "search")
//! - `stage` — pipeline stage: "embedding", "search", "generation"
//! - `status` — outcome: "ok" or "error"

/// Cache lookups answered by a tier.
///
/// Labels: `tier`, `namespace`.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Cache lookups a tier could not answer.
///
/// Labels: `tier`, `namespace`.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Shared-tier failures absorbed by the tiered cache.
///
/// Labels: `namespace`, `operation` ("get" | "set" | "delete" | "delete_by_prefix").
pub const CACHE_ERRORS_TOTAL: &str = "mimir_cache_errors_total";

/// L2 hits copied into L1.
///
/// Labels: `namespace`.
pub const CACHE_PROMOTIONS_TOTAL: &str = "mimir_cache_promotions_total";

/// Namespace invalidations.
///
/// Labels: `namespace`.
pub const CACHE_INVALIDATIONS_TOTAL: &str = "mimir_cache_invalidations_total";

/// Queries handled by the orchestrator.
///
/// Labels: `status` ("ok" | "error"), `stage` (failing stage, "none" on success).
pub const QUERIES_TOTAL: &str = "mimir_queries_total";

/// Per-stage duration in seconds.
///
/// Labels: `stage`.
pub const STAGE_DURATION_SECONDS: &str = "mimir_stage_duration_seconds";

/// Calls made to external backends (cache misses that reached a backend).
///
/// Labels: `stage`, `status`.
pub const BACKEND_CALLS_TOTAL: &str = "mimir_backend_calls_total";
