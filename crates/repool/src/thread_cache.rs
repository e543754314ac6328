//! Per-thread object caches: the synchronization-free fast path.
//!
//! Each thread owns a private table of bounded per-type queues, keyed by the
//! façade that filled it. Entries are only ever touched by the owning thread;
//! a thread's cache is abandoned (and dropped by the thread-local destructor)
//! when the thread exits, never migrated.
//!
//! The maintenance job cannot reach into another thread's cache. Instead it
//! bumps a shared decay generation; the next fast-path touch on each thread
//! observes the stale stamp and runs its own decay and compaction.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

#[derive(Default)]
struct Slot {
    items: VecDeque<Box<dyn Any>>,
}

struct FacadeCache {
    seen_generation: u64,
    slots: HashMap<TypeId, Slot>,
}

impl FacadeCache {
    /// Halve the length of every per-type queue (burst decay).
    fn decay(&mut self) {
        for slot in self.slots.values_mut() {
            let keep = slot.items.len() / 2;
            slot.items.truncate(keep);
        }
    }

    /// Drop empty per-type queues to bound map growth.
    fn compact(&mut self) {
        self.slots.retain(|_, slot| !slot.items.is_empty());
    }
}

#[derive(Default)]
struct ThreadCaches {
    facades: HashMap<u64, FacadeCache>,
}

thread_local! {
    static CACHES: RefCell<ThreadCaches> = RefCell::new(ThreadCaches::default());
}

fn facade_mut(caches: &mut ThreadCaches, pool_id: u64, generation: u64) -> &mut FacadeCache {
    let facade = caches.facades.entry(pool_id).or_insert_with(|| FacadeCache {
        seen_generation: generation,
        slots: HashMap::new(),
    });
    if facade.seen_generation != generation {
        facade.seen_generation = generation;
        facade.decay();
        facade.compact();
    }
    facade
}

/// Try to take a cached instance of `T` from this thread's cache.
pub(crate) fn try_rent<T: 'static>(pool_id: u64, generation: u64) -> Option<T> {
    CACHES.with(|caches| {
        let mut caches = caches.borrow_mut();
        let facade = facade_mut(&mut caches, pool_id, generation);
        let slot = facade.slots.get_mut(&TypeId::of::<T>())?;
        let boxed = slot.items.pop_front()?;
        // The slot is keyed by TypeId, so the downcast cannot fail.
        boxed.downcast::<T>().ok().map(|b| *b)
    })
}

/// Try to park an instance of `T` in this thread's cache.
///
/// Returns the instance back when the per-type queue is at `max_per_type`,
/// so the caller can fall back to the shared pool.
pub(crate) fn try_return<T: 'static>(
    pool_id: u64,
    generation: u64,
    obj: T,
    max_per_type: usize,
) -> Result<(), T> {
    CACHES.with(|caches| {
        let mut caches = caches.borrow_mut();
        let facade = facade_mut(&mut caches, pool_id, generation);
        let slot = facade.slots.entry(TypeId::of::<T>()).or_default();
        if slot.items.len() < max_per_type {
            slot.items.push_back(Box::new(obj));
            Ok(())
        } else {
            Err(obj)
        }
    })
}

/// Number of cached instances of `T` on this thread, for one façade.
#[cfg(test)]
pub(crate) fn cached_len<T: 'static>(pool_id: u64) -> usize {
    CACHES.with(|caches| {
        caches
            .borrow()
            .facades
            .get(&pool_id)
            .and_then(|f| f.slots.get(&TypeId::of::<T>()))
            .map_or(0, |slot| slot.items.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_from_empty_cache_misses() {
        assert!(try_rent::<String>(9001, 0).is_none());
    }

    #[test]
    fn return_then_rent_roundtrip() {
        let id = 9002;
        assert!(try_return(id, 0, String::from("cached"), 4).is_ok());
        assert_eq!(cached_len::<String>(id), 1);

        let s: String = try_rent(id, 0).unwrap();
        assert_eq!(s, "cached");
        assert_eq!(cached_len::<String>(id), 0);
    }

    #[test]
    fn return_respects_bound() {
        let id = 9003;
        assert!(try_return(id, 0, 1u32, 2).is_ok());
        assert!(try_return(id, 0, 2u32, 2).is_ok());
        let rejected = try_return(id, 0, 3u32, 2);
        assert_eq!(rejected.unwrap_err(), 3);
        assert_eq!(cached_len::<u32>(id), 2);
    }

    #[test]
    fn types_are_isolated() {
        let id = 9004;
        assert!(try_return(id, 0, 7u64, 4).is_ok());
        assert!(try_rent::<u32>(id, 0).is_none());
        assert_eq!(try_rent::<u64>(id, 0), Some(7));
    }

    #[test]
    fn facades_are_isolated() {
        assert!(try_return(9005, 0, 1u8, 4).is_ok());
        assert!(try_rent::<u8>(9006, 0).is_none());
        assert_eq!(try_rent::<u8>(9005, 0), Some(1));
    }

    #[test]
    fn generation_bump_halves_queues() {
        let id = 9007;
        for i in 0..4u16 {
            assert!(try_return(id, 0, i, 8).is_ok());
        }
        assert_eq!(cached_len::<u16>(id), 4);

        // A stale generation stamp triggers decay on the next touch.
        assert!(try_rent::<u16>(id, 1).is_some());
        assert_eq!(cached_len::<u16>(id), 1); // 4 -> 2 (decay) -> 1 (rent)
    }

    #[test]
    fn decay_to_empty_compacts_slot() {
        let id = 9008;
        assert!(try_return(id, 0, 42i64, 8).is_ok());

        // One object halves to zero, and the empty slot is dropped.
        assert!(try_rent::<i64>(id, 1).is_none());
        CACHES.with(|caches| {
            let caches = caches.borrow();
            let facade = caches.facades.get(&id).unwrap();
            assert!(facade.slots.is_empty());
        });
    }

    #[test]
    fn caches_survive_across_generations_when_stable() {
        let id = 9009;
        assert!(try_return(id, 3, String::from("a"), 4).is_ok());
        assert!(try_return(id, 3, String::from("b"), 4).is_ok());
        // Same generation: no decay between operations.
        assert_eq!(try_rent::<String>(id, 3), Some(String::from("a")));
        assert_eq!(try_rent::<String>(id, 3), Some(String::from("b")));
    }
}
