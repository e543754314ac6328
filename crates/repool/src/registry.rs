//! The pooling façade: typed object pools, array pools, the large-object
//! pool, and the background maintenance scheduler.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::array_pool::{ArrayPools, PoolElement};
use crate::buffer::ScopedBuffer;
use crate::cancel::CancellationToken;
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::large_object::{Large, LargeObjectPool, DEFAULT_LARGE_OBJECT_EXPIRY};
use crate::monitor::MemoryMonitor;
use crate::object_pool::ObjectPool;
use crate::poolable::Poolable;
use crate::stats::{MemoryPoolStatistics, TypeMetrics, TypePoolStats};
use crate::thread_cache;

/// How often expired pools are evicted and thread caches decayed.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
/// How often aggregate metrics are refreshed for external consumption.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);
/// A type pool with no access for this long is eligible for eviction.
const IDLE_THRESHOLD_MS: u64 = 5 * 60 * 1000;

/// Type-erased view of one managed object pool.
trait AnyPool: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn metrics(&self) -> &TypeMetrics;
    fn type_name(&self) -> &'static str;
    fn pooled(&self) -> usize;
    fn clear(&self);
}

/// A shared pool plus its usage counters, one per managed type.
struct TypedPool<T: Poolable> {
    pool: ObjectPool<T>,
    metrics: TypeMetrics,
}

impl<T: Poolable> AnyPool for TypedPool<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics(&self) -> &TypeMetrics {
        &self.metrics
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn pooled(&self) -> usize {
        self.pool.len()
    }

    fn clear(&self) {
        self.pool.clear();
    }
}

struct PoolInner {
    config: PoolConfig,
    pools: RwLock<HashMap<TypeId, Arc<dyn AnyPool>>>,
    arrays: ArrayPools,
    large: LargeObjectPool,
    monitor: Arc<MemoryMonitor>,
    decay_generation: AtomicU64,
    heavy_gate: Semaphore,
    shutting_down: AtomicBool,
    epoch: Instant,
}

impl PoolInner {
    /// Milliseconds since the façade was created.
    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Fetch or lazily create the managed pool for `T`.
    fn typed<T: Poolable>(&self) -> Arc<dyn AnyPool> {
        if let Some(pool) = self.pools.read().get(&TypeId::of::<T>()) {
            return Arc::clone(pool);
        }
        let mut pools = self.pools.write();
        Arc::clone(pools.entry(TypeId::of::<T>()).or_insert_with(|| {
            debug!(type_name = std::any::type_name::<T>(), "creating object pool");
            Arc::new(TypedPool::<T> {
                pool: ObjectPool::new(self.config.default_pool_size),
                metrics: TypeMetrics::new(self.now_ms()),
            })
        }))
    }

    /// Evict pools idle past the threshold and not referenced by any caller.
    fn evict_idle(&self, now_ms: u64, idle_threshold_ms: u64) -> usize {
        let mut evicted = 0usize;
        let mut pools = self.pools.write();
        pools.retain(|_, pool| {
            let expired = pool.metrics().is_expired(now_ms, idle_threshold_ms);
            if expired && Arc::strong_count(pool) == 1 {
                pool.clear();
                evicted += 1;
                false
            } else {
                true
            }
        });
        evicted
    }

    /// One cleanup cycle: expired pools, large-object sweep, cache decay.
    fn cleanup_pass(&self) {
        let evicted = self.evict_idle(self.now_ms(), IDLE_THRESHOLD_MS);
        if evicted > 0 {
            debug!(evicted, "evicted idle object pools");
        }
        self.large.sweep_expired();
        // Thread caches decay on their own next touch; see thread_cache.
        self.decay_generation.fetch_add(1, Ordering::Relaxed);
    }

    /// One metrics cycle: refresh aggregate counters for telemetry.
    fn metrics_pass(&self) {
        self.monitor.update_metrics();
        let pools = self.pools.read();
        let mut cache_hits = 0u64;
        let mut pool_accesses = 0u64;
        for pool in pools.values() {
            cache_hits += pool.metrics().cache_hits();
            pool_accesses += pool.metrics().pool_accesses();
        }
        debug!(
            pools = pools.len(),
            cache_hits, pool_accesses, "pool metrics refresh"
        );
    }

    /// Drop all pooled storage: objects and arrays alike.
    fn drain_all(&self) {
        let pools = self.pools.read();
        for pool in pools.values() {
            pool.clear();
        }
        drop(pools);
        self.arrays.clear_all();
        debug!("drained all pooled storage");
    }
}

fn run_scheduler(inner: &Arc<PoolInner>, shutdown_rx: &Receiver<()>) {
    let cleanup = tick(CLEANUP_INTERVAL);
    let metrics = tick(METRICS_INTERVAL);
    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(cleanup) -> _ => inner.cleanup_pass(),
            recv(metrics) -> _ => inner.metrics_pass(),
        }
    }
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// The pooling façade consumed by the rest of the system.
///
/// Rents are routed through the calling thread's private cache first, then
/// the shared per-type pool, constructing a fresh instance only when both
/// miss. Returns mirror that path. Neither direction can block or fail.
///
/// Two background jobs run on a dedicated maintenance thread: a cleanup job
/// evicting expired pools and a metrics job refreshing aggregate counters.
/// Both stop when the façade is dropped.
pub struct MemoryPool {
    inner: Arc<PoolInner>,
    id: u64,
    shutdown_tx: Sender<()>,
    scheduler: Option<JoinHandle<()>>,
}

impl MemoryPool {
    /// Create a pool with the given configuration.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let config = config.normalize();
        let monitor = Arc::new(MemoryMonitor::new(config.enable_native_memory));
        let inner = Arc::new(PoolInner {
            pools: RwLock::new(HashMap::new()),
            arrays: ArrayPools::new(
                config.max_array_length,
                config.max_arrays_per_bucket,
                &monitor,
                config.enable_prefetching,
            ),
            large: LargeObjectPool::new(
                config.large_object_threshold,
                config.max_large_objects,
                DEFAULT_LARGE_OBJECT_EXPIRY,
                Arc::clone(&monitor),
            ),
            monitor,
            decay_generation: AtomicU64::new(0),
            heavy_gate: Semaphore::new(config.max_concurrent_allocations),
            shutting_down: AtomicBool::new(false),
            epoch: Instant::now(),
            config,
        });

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let scheduler_inner = Arc::clone(&inner);
        let scheduler = match std::thread::Builder::new()
            .name("repool-maintenance".into())
            .spawn(move || run_scheduler(&scheduler_inner, &shutdown_rx))
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(%err, "failed to start maintenance thread");
                None
            }
        };

        Self {
            inner,
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            shutdown_tx,
            scheduler,
        }
    }

    /// Create a pool with the default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(PoolConfig::default())
    }

    /// Rent an instance of `T`.
    ///
    /// Fast path: the calling thread's cache. Slow path: the shared pool.
    /// A fresh instance is constructed only when both miss.
    #[must_use]
    pub fn rent<T: Poolable>(&self) -> T {
        let typed = self.inner.typed::<T>();
        let now = self.inner.now_ms();
        let generation = self.inner.decay_generation.load(Ordering::Relaxed);

        if let Some(obj) = thread_cache::try_rent::<T>(self.id, generation) {
            typed.metrics().record_cache_hit(now);
            return obj;
        }

        typed.metrics().record_pool_access(now);
        let Some(typed_pool) = typed.as_any().downcast_ref::<TypedPool<T>>() else {
            // The map is keyed by TypeId, so this arm is unreachable; fall
            // back to plain construction rather than panicking on the hot path.
            typed.metrics().record_allocation();
            return T::default();
        };
        match typed_pool.pool.try_get() {
            Some(obj) => obj,
            None => {
                typed.metrics().record_allocation();
                T::default()
            }
        }
    }

    /// Return an instance of `T` for reuse.
    ///
    /// The instance is reset exactly once, then offered to the calling
    /// thread's cache; overflow goes to the shared pool, and beyond that the
    /// instance is dropped.
    pub fn return_obj<T: Poolable>(&self, mut obj: T) {
        obj.reset();
        let generation = self.inner.decay_generation.load(Ordering::Relaxed);
        let limit = self.inner.config.thread_local_cache_size;
        if let Err(obj) = thread_cache::try_return(self.id, generation, obj, limit) {
            let typed = self.inner.typed::<T>();
            typed.metrics().touch(self.inner.now_ms());
            if let Some(typed_pool) = typed.as_any().downcast_ref::<TypedPool<T>>() {
                typed_pool.pool.insert(obj);
            }
        }
    }

    /// Rent an array of at least `min_len` elements of `T`.
    #[must_use]
    pub fn rent_array<T: PoolElement>(&self, min_len: usize) -> Vec<T> {
        T::pool(&self.inner.arrays).rent(min_len)
    }

    /// Return an array of `T`, optionally zeroing its contents first.
    pub fn return_array<T: PoolElement>(&self, array: Vec<T>, clear: bool) {
        T::pool(&self.inner.arrays).return_array(array, clear);
    }

    /// Rent a byte array of at least `min_len` elements.
    #[must_use]
    pub fn rent_bytes(&self, min_len: usize) -> Vec<u8> {
        self.rent_array(min_len)
    }

    /// Return a byte array.
    pub fn return_bytes(&self, array: Vec<u8>, clear: bool) {
        self.return_array(array, clear);
    }

    /// Rent a character array of at least `min_len` elements.
    #[must_use]
    pub fn rent_chars(&self, min_len: usize) -> Vec<char> {
        self.rent_array(min_len)
    }

    /// Return a character array.
    pub fn return_chars(&self, array: Vec<char>, clear: bool) {
        self.return_array(array, clear);
    }

    /// Rent an integer array of at least `min_len` elements.
    #[must_use]
    pub fn rent_ints(&self, min_len: usize) -> Vec<i32> {
        self.rent_array(min_len)
    }

    /// Return an integer array.
    pub fn return_ints(&self, array: Vec<i32>, clear: bool) {
        self.return_array(array, clear);
    }

    /// Rent a float array of at least `min_len` elements.
    #[must_use]
    pub fn rent_doubles(&self, min_len: usize) -> Vec<f64> {
        self.rent_array(min_len)
    }

    /// Return a float array.
    pub fn return_doubles(&self, array: Vec<f64>, clear: bool) {
        self.return_array(array, clear);
    }

    /// Construct a large object, tracked when it clears the size threshold.
    pub async fn rent_large_async<T: Poolable>(
        &self,
        cancel: &CancellationToken,
        estimated_size: usize,
    ) -> PoolResult<Large<T>> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }
        self.inner.large.rent_async(cancel, estimated_size).await
    }

    /// Release a large object and its tracking entry.
    pub async fn return_large_async<T>(
        &self,
        obj: Large<T>,
        cancel: &CancellationToken,
    ) -> PoolResult<()> {
        self.inner.large.return_async(obj, cancel).await
    }

    /// Rent a scoped buffer of `capacity` elements; the backing storage is
    /// returned automatically on scope exit.
    #[must_use]
    pub fn create_buffer<T: PoolElement>(&self, capacity: usize) -> ScopedBuffer<'_, T> {
        ScopedBuffer::new(self, capacity)
    }

    /// Take a read-only snapshot of pool usage for telemetry.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn statistics(&self) -> MemoryPoolStatistics {
        let now = self.inner.now_ms();
        let pools = self.inner.pools.read();
        let mut object_pools = Vec::with_capacity(pools.len());
        let mut cache_hits = 0u64;
        let mut pool_accesses = 0u64;
        let mut total_allocated = 0u64;
        let mut pooled_objects = 0u64;
        for pool in pools.values() {
            let metrics = pool.metrics();
            let snap = TypePoolStats {
                type_name: pool.type_name(),
                cache_hits: metrics.cache_hits(),
                pool_accesses: metrics.pool_accesses(),
                total_allocated: metrics.total_allocated(),
                pooled: pool.pooled() as u64,
                idle_ms: now.saturating_sub(metrics.last_access_ms()),
            };
            cache_hits += snap.cache_hits;
            pool_accesses += snap.pool_accesses;
            total_allocated += snap.total_allocated;
            pooled_objects += snap.pooled;
            object_pools.push(snap);
        }
        drop(pools);
        object_pools.sort_by_key(|s| s.type_name);

        let total_rents = cache_hits + pool_accesses;
        let hit_ratio = if total_rents == 0 {
            0.0
        } else {
            cache_hits as f64 / total_rents as f64
        };

        MemoryPoolStatistics {
            cache_hits,
            pool_accesses,
            total_allocated,
            hit_ratio,
            pooled_objects,
            object_pools,
            arrays: self.inner.arrays.snapshots(),
            array_bytes_total: self.inner.monitor.current_usage(),
            array_bytes_used: self.inner.monitor.used_memory(),
            fragmentation_ratio: self.inner.monitor.fragmentation_ratio(),
            large_tracked: self.inner.large.tracked_count() as u64,
            large_tracked_bytes: self.inner.large.tracked_bytes(),
            native_memory_bytes: self.inner.monitor.native_memory(),
        }
    }

    /// Explicit heavy maintenance pass, bounded by a concurrency gate.
    ///
    /// Forces a cleanup cycle (expired pools, large-object sweep, thread
    /// cache decay); with aggressive cleanup configured, additionally drains
    /// all pooled storage.
    pub async fn optimize_async(&self, cancel: &CancellationToken) -> PoolResult<()> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }
        cancel.check_cancelled()?;
        let _permit = self
            .inner
            .heavy_gate
            .acquire()
            .await
            .map_err(|_| PoolError::ShuttingDown)?;
        cancel.check_cancelled()?;

        self.inner.cleanup_pass();
        if self.inner.config.enable_aggressive_cleanup {
            self.inner.drain_all();
        }
        Ok(())
    }

    #[cfg(test)]
    fn inner(&self) -> &PoolInner {
        &self.inner
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.heavy_gate.close();
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
        // Final disposal: every pooled instance is dropped exactly once.
        let pools: Vec<_> = self
            .inner
            .pools
            .write()
            .drain()
            .map(|(_, pool)| pool)
            .collect();
        for pool in &pools {
            pool.clear();
        }
        self.inner.arrays.clear_all();
    }
}
