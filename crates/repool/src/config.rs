//! Pool configuration, applied once at construction.

/// Default per-type capacity of the shared object pools.
pub const DEFAULT_POOL_SIZE: usize = 64;
/// Default largest pooled array size class, in elements.
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1024 * 1024;
/// Default per-size-class retention bound.
pub const DEFAULT_MAX_ARRAYS_PER_BUCKET: usize = 16;
/// Default size, in bytes, at which an object takes the large-object path.
pub const DEFAULT_LARGE_OBJECT_THRESHOLD: usize = 85_000;
/// Default bound on individually tracked large objects.
pub const DEFAULT_MAX_LARGE_OBJECTS: usize = 32;
/// Default per-type bound of the per-thread caches.
pub const DEFAULT_THREAD_LOCAL_CACHE_SIZE: usize = 8;
/// Default number of concurrent heavy maintenance operations.
pub const DEFAULT_MAX_CONCURRENT_ALLOCATIONS: usize = 4;

/// Configuration for a [`MemoryPool`](crate::registry::MemoryPool).
///
/// All options are read once at construction; there is no live
/// reconfiguration. Zero values are clamped by [`PoolConfig::normalize`],
/// which the pool applies automatically.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct PoolConfig {
    /// Capacity of each shared per-type object pool.
    pub default_pool_size: usize,
    /// Largest array size class kept in the array pools, in elements.
    /// Rentals above this length fall back to direct allocation.
    pub max_array_length: usize,
    /// How many arrays each size-class bucket retains before discarding.
    pub max_arrays_per_bucket: usize,
    /// Estimated size, in bytes, at or above which an object is tracked
    /// individually by the large-object pool.
    pub large_object_threshold: usize,
    /// Bound on the number of individually tracked large objects.
    pub max_large_objects: usize,
    /// Per-type bound of the per-thread fast-path caches.
    pub thread_local_cache_size: usize,
    /// Permits on the gate bounding concurrent heavy maintenance operations.
    pub max_concurrent_allocations: usize,
    /// Include process memory readings in statistics snapshots.
    pub enable_native_memory: bool,
    /// Run a cache-warming pass over freshly rented numeric arrays.
    pub enable_prefetching: bool,
    /// Have maintenance drain all pooled storage instead of only expired pools.
    pub enable_aggressive_cleanup: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_pool_size: DEFAULT_POOL_SIZE,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
            max_arrays_per_bucket: DEFAULT_MAX_ARRAYS_PER_BUCKET,
            large_object_threshold: DEFAULT_LARGE_OBJECT_THRESHOLD,
            max_large_objects: DEFAULT_MAX_LARGE_OBJECTS,
            thread_local_cache_size: DEFAULT_THREAD_LOCAL_CACHE_SIZE,
            max_concurrent_allocations: DEFAULT_MAX_CONCURRENT_ALLOCATIONS,
            enable_native_memory: false,
            enable_prefetching: true,
            enable_aggressive_cleanup: false,
        }
    }
}

impl PoolConfig {
    /// Normalize the configuration, clamping out-of-range values.
    ///
    /// Every size bound is clamped to at least 1, and `max_array_length` is
    /// rounded up to a power of two no smaller than the minimum size class.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.default_pool_size = self.default_pool_size.max(1);
        self.max_arrays_per_bucket = self.max_arrays_per_bucket.max(1);
        self.large_object_threshold = self.large_object_threshold.max(1);
        self.max_large_objects = self.max_large_objects.max(1);
        self.thread_local_cache_size = self.thread_local_cache_size.max(1);
        self.max_concurrent_allocations = self.max_concurrent_allocations.max(1);
        self.max_array_length = self
            .max_array_length
            .max(crate::array_pool::MIN_ARRAY_CLASS)
            .next_power_of_two();
        self
    }

    /// Set the per-type capacity of the shared object pools.
    #[must_use]
    pub fn with_default_pool_size(mut self, size: usize) -> Self {
        self.default_pool_size = size;
        self
    }

    /// Set the largest pooled array size class.
    #[must_use]
    pub fn with_max_array_length(mut self, len: usize) -> Self {
        self.max_array_length = len;
        self
    }

    /// Set the per-size-class retention bound.
    #[must_use]
    pub fn with_max_arrays_per_bucket(mut self, count: usize) -> Self {
        self.max_arrays_per_bucket = count;
        self
    }

    /// Set the large-object threshold in bytes.
    #[must_use]
    pub fn with_large_object_threshold(mut self, bytes: usize) -> Self {
        self.large_object_threshold = bytes;
        self
    }

    /// Set the bound on tracked large objects.
    #[must_use]
    pub fn with_max_large_objects(mut self, count: usize) -> Self {
        self.max_large_objects = count;
        self
    }

    /// Set the per-type bound of the per-thread caches.
    #[must_use]
    pub fn with_thread_local_cache_size(mut self, size: usize) -> Self {
        self.thread_local_cache_size = size;
        self
    }

    /// Set the number of concurrent heavy maintenance operations.
    #[must_use]
    pub fn with_max_concurrent_allocations(mut self, count: usize) -> Self {
        self.max_concurrent_allocations = count;
        self
    }

    /// Enable or disable process memory readings in snapshots.
    #[must_use]
    pub fn with_native_memory(mut self, enabled: bool) -> Self {
        self.enable_native_memory = enabled;
        self
    }

    /// Enable or disable the cache-warming pass on numeric rents.
    #[must_use]
    pub fn with_prefetching(mut self, enabled: bool) -> Self {
        self.enable_prefetching = enabled;
        self
    }

    /// Enable or disable aggressive maintenance draining.
    #[must_use]
    pub fn with_aggressive_cleanup(mut self, enabled: bool) -> Self {
        self.enable_aggressive_cleanup = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.default_pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.max_array_length, DEFAULT_MAX_ARRAY_LENGTH);
        assert_eq!(config.large_object_threshold, DEFAULT_LARGE_OBJECT_THRESHOLD);
        assert!(!config.enable_native_memory);
        assert!(config.enable_prefetching);
    }

    #[test]
    fn normalize_clamps_zeros() {
        let config = PoolConfig {
            default_pool_size: 0,
            max_arrays_per_bucket: 0,
            large_object_threshold: 0,
            max_large_objects: 0,
            thread_local_cache_size: 0,
            max_concurrent_allocations: 0,
            ..Default::default()
        }
        .normalize();
        assert_eq!(config.default_pool_size, 1);
        assert_eq!(config.max_arrays_per_bucket, 1);
        assert_eq!(config.large_object_threshold, 1);
        assert_eq!(config.max_large_objects, 1);
        assert_eq!(config.thread_local_cache_size, 1);
        assert_eq!(config.max_concurrent_allocations, 1);
    }

    #[test]
    fn normalize_rounds_array_length() {
        let config = PoolConfig::default().with_max_array_length(3000).normalize();
        assert_eq!(config.max_array_length, 4096);

        let config = PoolConfig::default().with_max_array_length(0).normalize();
        assert_eq!(config.max_array_length, crate::array_pool::MIN_ARRAY_CLASS);
    }

    #[test]
    fn builder_chain() {
        let config = PoolConfig::default()
            .with_default_pool_size(8)
            .with_thread_local_cache_size(2)
            .with_aggressive_cleanup(true);
        assert_eq!(config.default_pool_size, 8);
        assert_eq!(config.thread_local_cache_size, 2);
        assert!(config.enable_aggressive_cleanup);
    }
}
