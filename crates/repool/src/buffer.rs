//! Scoped array rentals with guaranteed release.

use crate::array_pool::PoolElement;
use crate::registry::MemoryPool;

/// A scoped handle over pooled array storage.
///
/// Construction rents backing storage from the owning pool; the storage is
/// returned automatically when the handle goes out of scope, on every exit
/// path including early returns and panics.
///
/// The handle exposes exactly the requested capacity, even when the backing
/// storage was rounded up to a larger size class.
pub struct ScopedBuffer<'a, T: PoolElement> {
    pool: &'a MemoryPool,
    data: Option<Vec<T>>,
    len: usize,
    zero_on_drop: bool,
}

impl<'a, T: PoolElement> ScopedBuffer<'a, T> {
    pub(crate) fn new(pool: &'a MemoryPool, capacity: usize) -> Self {
        let data = pool.rent_array::<T>(capacity);
        Self {
            pool,
            data: Some(data),
            len: capacity,
            zero_on_drop: false,
        }
    }

    /// Zero the backing storage when it is returned to the pool.
    #[must_use]
    pub fn zero_on_drop(mut self) -> Self {
        self.zero_on_drop = true;
        self
    }

    /// Number of elements visible through the handle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer has zero capacity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the buffer contents.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match &self.data {
            Some(data) => &data[..self.len],
            None => &[],
        }
    }

    /// View the buffer contents mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &mut self.data {
            Some(data) => &mut data[..self.len],
            None => &mut [],
        }
    }
}

impl<T: PoolElement> std::ops::Deref for ScopedBuffer<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: PoolElement> std::ops::DerefMut for ScopedBuffer<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: PoolElement> Drop for ScopedBuffer<'_, T> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.return_array(data, self.zero_on_drop);
        }
    }
}
