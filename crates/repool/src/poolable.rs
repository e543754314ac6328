//! Reset capability for pooled object types.

use std::collections::{HashMap, VecDeque};
use std::hash::BuildHasher;

/// Types that can live in an object pool.
///
/// `reset` is invoked when an instance re-enters a pool, so the next renter
/// observes a clean object. The default implementation is an identity
/// pass-through; types with internal state override it.
pub trait Poolable: Default + Send + 'static {
    /// Restore the instance to its post-construction state.
    fn reset(&mut self) {}
}

impl<T: Send + 'static> Poolable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<T: Send + 'static> Poolable for VecDeque<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Poolable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<K, V, S> Poolable for HashMap<K, V, S>
where
    K: Send + 'static,
    V: Send + 'static,
    S: BuildHasher + Default + Send + 'static,
{
    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_reset_clears() {
        let mut v = vec![1, 2, 3];
        v.reset();
        assert!(v.is_empty());
        // Capacity is retained for reuse.
        assert!(v.capacity() >= 3);
    }

    #[test]
    fn string_reset_clears() {
        let mut s = String::from("hello");
        s.reset();
        assert!(s.is_empty());
    }

    #[test]
    fn map_reset_clears() {
        let mut m: HashMap<u32, &str> = HashMap::new();
        m.insert(1, "one");
        m.reset();
        assert!(m.is_empty());
    }

    #[test]
    fn default_reset_is_identity() {
        #[derive(Default)]
        struct Plain(u32);
        impl Poolable for Plain {}

        let mut p = Plain(7);
        p.reset();
        assert_eq!(p.0, 7);
    }
}
