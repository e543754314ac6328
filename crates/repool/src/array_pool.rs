//! Size-classed array pools for fixed-size element types.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::monitor::{ElementKind, MemoryMonitor};
use crate::stats::{ArrayPoolStats, AtomicPoolStats, PoolStats};

/// Smallest array size class, in elements.
pub const MIN_ARRAY_CLASS: usize = 16;

/// Rented numeric arrays at or above this length get a cache-warming pass.
const PREFETCH_MIN_LEN: usize = 4096;

/// Walk the rented storage one cache line at a time so it is resident before
/// the caller's first real access. Purely a performance hint.
fn warm_touch<T: Copy>(slice: &[T]) {
    let size = std::mem::size_of::<T>();
    if size == 0 {
        return;
    }
    let stride = (64 / size).max(1);
    let mut i = 0;
    while i < slice.len() {
        std::hint::black_box(slice[i]);
        i += stride;
    }
}

/// Size-class bucketed array pool for one element type.
///
/// Classes are powers of two from [`MIN_ARRAY_CLASS`] up to the configured
/// maximum. Rentals round up to the nearest class; returns re-enter only the
/// bucket matching their exact class length.
pub struct ArrayPool<T> {
    buckets: Vec<ArrayQueue<Vec<T>>>,
    max_array_length: usize,
    kind: ElementKind,
    monitor: Arc<MemoryMonitor>,
    prefetch: bool,
    stats: AtomicPoolStats,
}

impl<T: Copy + Default + Send + 'static> ArrayPool<T> {
    /// Create a new pool.
    ///
    /// `max_array_length` is rounded up to a power of two no smaller than
    /// [`MIN_ARRAY_CLASS`]; `max_per_bucket` is clamped to at least 1.
    #[must_use]
    pub fn new(
        kind: ElementKind,
        max_array_length: usize,
        max_per_bucket: usize,
        monitor: Arc<MemoryMonitor>,
        prefetch: bool,
    ) -> Self {
        let max_array_length = max_array_length.max(MIN_ARRAY_CLASS).next_power_of_two();
        let classes = Self::index_of(max_array_length) + 1;
        let max_per_bucket = max_per_bucket.max(1);
        let buckets = (0..classes).map(|_| ArrayQueue::new(max_per_bucket)).collect();
        Self {
            buckets,
            max_array_length,
            kind,
            monitor,
            prefetch,
            stats: AtomicPoolStats::new(),
        }
    }

    /// Bucket index for a power-of-two class length.
    #[allow(clippy::cast_possible_truncation)]
    fn index_of(class_len: usize) -> usize {
        (class_len.trailing_zeros() - MIN_ARRAY_CLASS.trailing_zeros()) as usize
    }

    /// Class length for a bucket index.
    fn class_len(index: usize) -> usize {
        MIN_ARRAY_CLASS << index
    }

    /// Smallest size class covering `len`, or `None` beyond the largest class.
    fn class_index(&self, len: usize) -> Option<usize> {
        if len > self.max_array_length {
            return None;
        }
        Some(Self::index_of(len.max(MIN_ARRAY_CLASS).next_power_of_two()))
    }

    /// Rent an array of at least `min_len` elements.
    ///
    /// Zero-length requests return the empty sentinel, which is never pooled
    /// or recorded. Requests beyond the largest class fall back to a direct,
    /// untracked allocation of exactly the requested length.
    #[must_use]
    pub fn rent(&self, min_len: usize) -> Vec<T> {
        if min_len == 0 {
            return Vec::new();
        }
        let Some(index) = self.class_index(min_len) else {
            return vec![T::default(); min_len];
        };
        let len = Self::class_len(index);
        let array = match self.buckets[index].pop() {
            Some(array) => {
                self.stats.record_hit();
                array
            }
            None => {
                self.stats.record_miss();
                vec![T::default(); len]
            }
        };
        self.monitor.record_array_allocation(self.kind, len);
        if self.prefetch && self.kind.is_numeric() && len >= PREFETCH_MIN_LEN {
            warm_touch(&array);
        }
        array
    }

    /// Return an array to the pool.
    ///
    /// When `clear` is set the contents are zeroed before the array becomes
    /// available again. Arrays whose length is not an exact size class, and
    /// arrays arriving at a full bucket, are dropped. Empty input is a no-op.
    pub fn return_array(&self, mut array: Vec<T>, clear: bool) {
        if array.is_empty() {
            return;
        }
        let len = array.len();
        let Some(index) = self.class_index(len) else {
            // Oversize arrays came from the direct-allocation fallback.
            self.stats.record_eviction();
            return;
        };
        if Self::class_len(index) != len {
            self.stats.record_eviction();
            return;
        }
        self.monitor.record_array_return(self.kind);
        if clear {
            array.fill(T::default());
        }
        if self.buckets[index].push(array).is_err() {
            self.stats.record_eviction();
        }
    }

    /// Total arrays currently retained across all buckets.
    #[must_use]
    pub fn pooled_arrays(&self) -> usize {
        self.buckets.iter().map(ArrayQueue::len).sum()
    }

    /// Snapshot of hit/miss/eviction counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Full snapshot including live and retained array counts.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn snapshot(&self) -> ArrayPoolStats {
        ArrayPoolStats {
            element: self.kind.name(),
            stats: self.stats(),
            live_arrays: self.monitor.array_count(self.kind),
            pooled_arrays: self.pooled_arrays() as u64,
        }
    }

    /// Drop every retained array.
    pub fn clear(&self) {
        for bucket in &self.buckets {
            while bucket.pop().is_some() {}
        }
    }
}

/// The set of array pools owned by a façade, one per element type.
pub struct ArrayPools {
    pub(crate) bytes: ArrayPool<u8>,
    pub(crate) chars: ArrayPool<char>,
    pub(crate) ints: ArrayPool<i32>,
    pub(crate) doubles: ArrayPool<f64>,
}

impl ArrayPools {
    pub(crate) fn new(
        max_array_length: usize,
        max_per_bucket: usize,
        monitor: &Arc<MemoryMonitor>,
        prefetch: bool,
    ) -> Self {
        Self {
            bytes: ArrayPool::new(
                ElementKind::U8,
                max_array_length,
                max_per_bucket,
                Arc::clone(monitor),
                prefetch,
            ),
            chars: ArrayPool::new(
                ElementKind::Char,
                max_array_length,
                max_per_bucket,
                Arc::clone(monitor),
                prefetch,
            ),
            ints: ArrayPool::new(
                ElementKind::I32,
                max_array_length,
                max_per_bucket,
                Arc::clone(monitor),
                prefetch,
            ),
            doubles: ArrayPool::new(
                ElementKind::F64,
                max_array_length,
                max_per_bucket,
                Arc::clone(monitor),
                prefetch,
            ),
        }
    }

    pub(crate) fn snapshots(&self) -> Vec<ArrayPoolStats> {
        vec![
            self.bytes.snapshot(),
            self.chars.snapshot(),
            self.ints.snapshot(),
            self.doubles.snapshot(),
        ]
    }

    pub(crate) fn clear_all(&self) {
        self.bytes.clear();
        self.chars.clear();
        self.ints.clear();
        self.doubles.clear();
    }
}

/// Element types the façade pools arrays of.
pub trait PoolElement: Copy + Default + Send + 'static {
    /// Monitor element kind for this type.
    const KIND: ElementKind;

    /// Select this element's pool from a façade's pool set.
    #[doc(hidden)]
    fn pool(pools: &ArrayPools) -> &ArrayPool<Self>;
}

impl PoolElement for u8 {
    const KIND: ElementKind = ElementKind::U8;

    fn pool(pools: &ArrayPools) -> &ArrayPool<Self> {
        &pools.bytes
    }
}

impl PoolElement for char {
    const KIND: ElementKind = ElementKind::Char;

    fn pool(pools: &ArrayPools) -> &ArrayPool<Self> {
        &pools.chars
    }
}

impl PoolElement for i32 {
    const KIND: ElementKind = ElementKind::I32;

    fn pool(pools: &ArrayPools) -> &ArrayPool<Self> {
        &pools.ints
    }
}

impl PoolElement for f64 {
    const KIND: ElementKind = ElementKind::F64;

    fn pool(pools: &ArrayPools) -> &ArrayPool<Self> {
        &pools.doubles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max_len: usize, per_bucket: usize) -> ArrayPool<u8> {
        ArrayPool::new(
            ElementKind::U8,
            max_len,
            per_bucket,
            Arc::new(MemoryMonitor::new(false)),
            false,
        )
    }

    #[test]
    fn rent_rounds_up_to_class() {
        let p = pool(1024, 4);
        assert_eq!(p.rent(1).len(), 16);
        assert_eq!(p.rent(16).len(), 16);
        assert_eq!(p.rent(17).len(), 32);
        assert_eq!(p.rent(100).len(), 128);
        assert_eq!(p.rent(1024).len(), 1024);
    }

    #[test]
    fn zero_length_returns_sentinel() {
        let p = pool(1024, 4);
        let a = p.rent(0);
        assert!(a.is_empty());
        assert_eq!(p.stats().hits + p.stats().misses, 0);
        // Returning the sentinel is a no-op.
        p.return_array(a, false);
        assert_eq!(p.pooled_arrays(), 0);
    }

    #[test]
    fn oversize_falls_back_to_direct_allocation() {
        let p = pool(64, 4);
        let a = p.rent(100);
        assert_eq!(a.len(), 100);
        // Untracked: neither stats nor the monitor saw it.
        assert_eq!(p.stats().hits + p.stats().misses, 0);
        assert_eq!(p.monitor.array_count(ElementKind::U8), 0);
    }

    #[test]
    fn return_then_rent_reuses() {
        let p = pool(1024, 4);
        let mut a = p.rent(64);
        a[0] = 0xAB;
        p.return_array(a, false);
        assert_eq!(p.pooled_arrays(), 1);

        let b = p.rent(64);
        assert_eq!(b[0], 0xAB); // not cleared
        assert_eq!(p.stats().hits, 1);
    }

    #[test]
    fn clear_flag_zeroes_contents() {
        let p = pool(1024, 4);
        let mut a = p.rent(16);
        a.fill(0xFF);
        p.return_array(a, true);

        let b = p.rent(16);
        assert!(b.iter().all(|&x| x == 0));
    }

    #[test]
    fn non_class_length_is_not_pooled() {
        let p = pool(1024, 4);
        p.return_array(vec![0u8; 100], false);
        assert_eq!(p.pooled_arrays(), 0);
        assert_eq!(p.stats().evictions, 1);

        // Buckets stay usable afterwards.
        let a = p.rent(100);
        assert_eq!(a.len(), 128);
    }

    #[test]
    fn bucket_overflow_drops() {
        let p = pool(1024, 2);
        p.return_array(vec![0u8; 16], false);
        p.return_array(vec![0u8; 16], false);
        p.return_array(vec![0u8; 16], false); // bucket full
        assert_eq!(p.pooled_arrays(), 2);
        assert_eq!(p.stats().evictions, 1);
    }

    #[test]
    fn buckets_are_per_class() {
        let p = pool(1024, 4);
        p.return_array(vec![0u8; 16], false);
        p.return_array(vec![0u8; 64], false);
        assert_eq!(p.pooled_arrays(), 2);

        // A rent for 32 must not steal from the 16 or 64 buckets' classes.
        let a = p.rent(32);
        assert_eq!(a.len(), 32);
        assert_eq!(p.stats().misses, 1);
    }

    #[test]
    fn monitor_sees_allocations_and_returns() {
        let monitor = Arc::new(MemoryMonitor::new(false));
        let p = ArrayPool::<f64>::new(ElementKind::F64, 1024, 4, Arc::clone(&monitor), false);
        let a = p.rent(100); // class 128, 8 bytes per element
        assert_eq!(monitor.current_usage(), 1024);
        assert_eq!(monitor.array_count(ElementKind::F64), 1);
        p.return_array(a, false);
        assert_eq!(monitor.array_count(ElementKind::F64), 0);
        assert_eq!(monitor.current_usage(), 1024); // retained capacity
    }

    #[test]
    fn prefetch_pass_is_harmless() {
        let monitor = Arc::new(MemoryMonitor::new(false));
        let p = ArrayPool::<f64>::new(ElementKind::F64, 8192, 4, monitor, true);
        let a = p.rent(8000);
        assert_eq!(a.len(), 8192);
        assert!(a.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn clear_drains_buckets() {
        let p = pool(1024, 4);
        p.return_array(vec![0u8; 16], false);
        p.return_array(vec![0u8; 256], false);
        p.clear();
        assert_eq!(p.pooled_arrays(), 0);
    }

    #[test]
    fn tiny_max_length_still_works() {
        let p = pool(0, 1);
        // Rounded up to the minimum class.
        let a = p.rent(10);
        assert_eq!(a.len(), 16);
        assert!(p.rent(17).len() == 17); // beyond the single class: direct
    }
}
