//! Atomic usage counters and read-only statistics snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Statistics for one pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    /// Number of cache hits (acquired from pooled storage).
    pub hits: u64,
    /// Number of cache misses (created new).
    pub misses: u64,
    /// Number of evictions (not poolable or pool full).
    pub evictions: u64,
}

/// Atomic pool statistics for lock-free updates.
pub struct AtomicPoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl AtomicPoolStats {
    /// Create new zeroed stats.
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Take a snapshot of current stats.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Increment hit counter.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment miss counter.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment eviction counter.
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for AtomicPoolStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-free per-type usage counters for one managed object pool.
///
/// `last_access` is kept as milliseconds relative to the owning pool's
/// creation instant, which keeps the counter in a single atomic word.
pub struct TypeMetrics {
    cache_hits: AtomicU64,
    pool_accesses: AtomicU64,
    total_allocated: AtomicU64,
    last_access_ms: AtomicU64,
}

impl TypeMetrics {
    /// Create new zeroed metrics stamped at the given instant.
    pub fn new(now_ms: u64) -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            pool_accesses: AtomicU64::new(0),
            total_allocated: AtomicU64::new(0),
            last_access_ms: AtomicU64::new(now_ms),
        }
    }

    /// Record a rent satisfied by the per-thread fast path.
    pub fn record_cache_hit(&self, now_ms: u64) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.touch(now_ms);
    }

    /// Record a rent that fell through to the shared pool.
    pub fn record_pool_access(&self, now_ms: u64) {
        self.pool_accesses.fetch_add(1, Ordering::Relaxed);
        self.touch(now_ms);
    }

    /// Record construction of a brand-new instance.
    pub fn record_allocation(&self) {
        self.total_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Refresh the last-access stamp.
    pub fn touch(&self, now_ms: u64) {
        self.last_access_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Number of fast-path hits.
    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Number of shared-pool accesses.
    #[must_use]
    pub fn pool_accesses(&self) -> u64 {
        self.pool_accesses.load(Ordering::Relaxed)
    }

    /// Number of instances constructed from scratch.
    #[must_use]
    pub fn total_allocated(&self) -> u64 {
        self.total_allocated.load(Ordering::Relaxed)
    }

    /// Milliseconds stamp of the most recent access.
    #[must_use]
    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    /// Whether the pool has been idle longer than the threshold.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64, idle_threshold_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_access_ms()) > idle_threshold_ms
    }
}

/// Snapshot of one managed object pool.
#[derive(Debug, Clone, Serialize)]
pub struct TypePoolStats {
    /// Name of the pooled type.
    pub type_name: &'static str,
    /// Rents satisfied by the per-thread fast path.
    pub cache_hits: u64,
    /// Rents that fell through to the shared pool.
    pub pool_accesses: u64,
    /// Instances constructed from scratch.
    pub total_allocated: u64,
    /// Instances currently held by the shared pool.
    pub pooled: u64,
    /// Milliseconds since the most recent access.
    pub idle_ms: u64,
}

/// Snapshot of one array pool.
#[derive(Debug, Clone, Serialize)]
pub struct ArrayPoolStats {
    /// Element type of the pool.
    pub element: &'static str,
    /// Pool hit/miss/eviction counters.
    pub stats: PoolStats,
    /// Arrays currently live (rented and not yet returned).
    pub live_arrays: u64,
    /// Arrays currently retained across all buckets.
    pub pooled_arrays: u64,
}

/// Point-in-time snapshot of the whole pooling subsystem.
///
/// Purely derived and read-only; taking a snapshot never mutates pool state.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryPoolStatistics {
    /// Total rents satisfied by per-thread caches.
    pub cache_hits: u64,
    /// Total rents that fell through to the shared pools.
    pub pool_accesses: u64,
    /// Total instances constructed from scratch.
    pub total_allocated: u64,
    /// Fraction of rents satisfied by the fast path.
    pub hit_ratio: f64,
    /// Instances currently held across all shared object pools.
    pub pooled_objects: u64,
    /// Per-type object pool snapshots.
    pub object_pools: Vec<TypePoolStats>,
    /// Per-element-type array pool snapshots.
    pub arrays: Vec<ArrayPoolStats>,
    /// Running total of bytes handed out by the array pools.
    pub array_bytes_total: u64,
    /// Bytes still accounted as in active use.
    pub array_bytes_used: u64,
    /// Estimated fraction of retained-but-idle capacity.
    pub fragmentation_ratio: f64,
    /// Large objects currently tracked.
    pub large_tracked: u64,
    /// Estimated bytes of tracked large objects.
    pub large_tracked_bytes: u64,
    /// Used system memory, when native memory reporting is enabled.
    pub native_memory_bytes: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stats_are_zeroed() {
        let stats = AtomicPoolStats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.hits, 0);
        assert_eq!(snap.misses, 0);
        assert_eq!(snap.evictions, 0);
    }

    #[test]
    fn record_and_snapshot() {
        let stats = AtomicPoolStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_eviction();
        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.evictions, 1);
    }

    #[test]
    fn type_metrics_accounting() {
        let metrics = TypeMetrics::new(0);
        metrics.record_cache_hit(10);
        metrics.record_cache_hit(20);
        metrics.record_pool_access(30);
        metrics.record_allocation();
        assert_eq!(metrics.cache_hits(), 2);
        assert_eq!(metrics.pool_accesses(), 1);
        assert_eq!(metrics.total_allocated(), 1);
        assert_eq!(metrics.last_access_ms(), 30);
    }

    #[test]
    fn type_metrics_expiry() {
        let metrics = TypeMetrics::new(0);
        metrics.touch(1_000);
        assert!(!metrics.is_expired(1_500, 1_000));
        assert!(!metrics.is_expired(2_000, 1_000));
        assert!(metrics.is_expired(2_001, 1_000));
    }

    #[test]
    fn expiry_is_monotonic_safe() {
        // A stamp in the future must not underflow.
        let metrics = TypeMetrics::new(5_000);
        assert!(!metrics.is_expired(0, 1_000));
    }

    #[test]
    fn statistics_snapshot_serializes() {
        let snapshot = MemoryPoolStatistics {
            cache_hits: 3,
            pool_accesses: 1,
            total_allocated: 1,
            hit_ratio: 0.75,
            pooled_objects: 2,
            object_pools: vec![TypePoolStats {
                type_name: "alloc::string::String",
                cache_hits: 3,
                pool_accesses: 1,
                total_allocated: 1,
                pooled: 2,
                idle_ms: 12,
            }],
            arrays: Vec::new(),
            array_bytes_total: 4096,
            array_bytes_used: 2048,
            fragmentation_ratio: 0.5,
            large_tracked: 0,
            large_tracked_bytes: 0,
            native_memory_bytes: None,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"hit_ratio\":0.75"));
        assert!(json.contains("String"));
    }
}
