//! Shared, bounded object pool: the slow path behind the per-thread caches.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam::queue::ArrayQueue;
use tracing::warn;

use crate::poolable::Poolable;

/// A thread-safe, bounded object pool backed by a lock-free queue.
///
/// `get` never blocks and never fails: an empty pool constructs a fresh
/// instance. `return_obj` never blocks either: a full pool simply drops the
/// instance, which bounds worst-case memory. The queue is FIFO per enqueueing
/// thread; under contention the pool behaves as an unordered bag.
pub struct ObjectPool<T> {
    queue: ArrayQueue<T>,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create a new pool with the given maximum capacity (clamped to 1).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: ArrayQueue::new(max_size.max(1)),
        }
    }

    /// Take a pooled instance, if one is available.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Take a pooled instance, or construct a fresh one.
    #[must_use]
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_default()
    }

    /// Return an instance to the pool for reuse.
    ///
    /// The instance is reset before it re-enters the pool. If the pool is at
    /// capacity the instance is dropped instead.
    pub fn return_obj(&self, mut obj: T) {
        if self.queue.is_full() {
            return;
        }
        obj.reset();
        let _ = self.queue.push(obj);
    }

    /// Enqueue an already-reset instance, dropping it if the pool is full.
    pub(crate) fn insert(&self, obj: T) {
        let _ = self.queue.push(obj);
    }

    /// Number of instances currently pooled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the pool currently holds no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of instances the pool retains.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Drain the pool, dropping every entry.
    ///
    /// A panic raised while dropping one entry is caught and logged so the
    /// remaining entries are still released.
    pub fn clear(&self) {
        while let Some(obj) = self.queue.pop() {
            if catch_unwind(AssertUnwindSafe(|| drop(obj))).is_err() {
                warn!(
                    type_name = std::any::type_name::<T>(),
                    "pooled instance panicked during disposal"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Scratch {
        data: Vec<u8>,
        resets: u32,
    }

    impl Poolable for Scratch {
        fn reset(&mut self) {
            self.data.clear();
            self.resets += 1;
        }
    }

    #[test]
    fn get_creates_new_when_empty() {
        let pool: ObjectPool<Scratch> = ObjectPool::new(4);
        let s = pool.get();
        assert_eq!(s.resets, 0);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn return_resets_and_pools() {
        let pool: ObjectPool<Scratch> = ObjectPool::new(4);
        let mut s = pool.get();
        s.data.extend_from_slice(b"dirty");
        pool.return_obj(s);
        assert_eq!(pool.len(), 1);

        let s = pool.get();
        assert!(s.data.is_empty());
        assert_eq!(s.resets, 1);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn return_respects_max_size() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(2);
        pool.return_obj(vec![1]);
        pool.return_obj(vec![2]);
        pool.return_obj(vec![3]); // Dropped
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(0);
        assert_eq!(pool.capacity(), 1);
        pool.return_obj(vec![1]);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn clear_drains_everything() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(4);
        pool.return_obj(vec![1]);
        pool.return_obj(vec![2]);
        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn pool_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ObjectPool<Vec<u8>>>();
    }

    #[test]
    fn multithreaded_get_return() {
        use std::sync::Arc;
        let pool = Arc::new(ObjectPool::<Vec<u8>>::new(8));
        let mut handles = vec![];

        for i in 0..4u8 {
            let p = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let mut v = p.get();
                    v.push(i);
                    p.return_obj(v);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        // Everything was returned and reset along the way.
        assert!(pool.len() >= 1 && pool.len() <= 4, "got {}", pool.len());
        while let Some(v) = pool.try_get() {
            assert!(v.is_empty());
        }
    }
}
