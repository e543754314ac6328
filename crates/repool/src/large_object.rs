//! Threshold-gated tracking pool for large objects.
//!
//! Objects at or above the configured size threshold are tracked
//! individually rather than bucketed. Admission is bounded by a semaphore
//! with immediate fallback: at capacity, construction proceeds untracked
//! instead of queueing. Tracking state lives behind an `Arc` shared with the
//! returned handles, so a handle releases its entry on every exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::PoolResult;
use crate::monitor::MemoryMonitor;
use crate::poolable::Poolable;

/// How long an unreturned tracked object survives before the expiry sweep
/// reclaims its tracking slot.
pub const DEFAULT_LARGE_OBJECT_EXPIRY: Duration = Duration::from_secs(600);

/// Metadata for one tracked large object.
#[derive(Debug, Clone)]
pub struct LargeObjectInfo {
    /// Caller-estimated size in bytes.
    pub estimated_size: usize,
    /// When the object was constructed.
    pub created_at: Instant,
}

struct Tracking {
    entries: Mutex<HashMap<u64, LargeObjectInfo>>,
    permits: Semaphore,
    monitor: Arc<MemoryMonitor>,
}

impl Tracking {
    /// Remove a tracking entry, releasing its admission permit.
    ///
    /// Entry removal is the single linearization point for permit release,
    /// so an id is untracked at most once.
    fn untrack(&self, id: u64) {
        let removed = self.entries.lock().remove(&id);
        if let Some(info) = removed {
            self.permits.add_permits(1);
            self.monitor.record_large_release(info.estimated_size as u64);
        }
    }
}

/// Owning handle for a large object.
///
/// Dropping the handle releases the object's tracking entry, so tracking
/// state is consistent on every exit path, including early returns and
/// panics.
pub struct Large<T> {
    value: Option<T>,
    id: Option<u64>,
    estimated_size: usize,
    tracking: Arc<Tracking>,
}

impl<T> Large<T> {
    /// Whether this object occupies a tracking slot.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.id.is_some()
    }

    /// The caller-estimated size recorded at rent time.
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        self.estimated_size
    }

    /// Detach the value from tracking, keeping it alive.
    #[must_use]
    pub fn into_inner(mut self) -> T {
        if let Some(id) = self.id.take() {
            self.tracking.untrack(id);
        }
        self.value.take().expect("value already detached")
    }
}

impl<T> std::ops::Deref for Large<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("value already detached")
    }
}

impl<T> std::ops::DerefMut for Large<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("value already detached")
    }
}

impl<T> Drop for Large<T> {
    fn drop(&mut self) {
        let _ = self.value.take();
        if let Some(id) = self.id.take() {
            self.tracking.untrack(id);
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Large<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Large")
            .field("value", &self.value)
            .field("tracked", &self.id.is_some())
            .finish()
    }
}

/// Tracking pool for objects above the large-object threshold.
pub struct LargeObjectPool {
    threshold: usize,
    expiry: Duration,
    next_id: AtomicU64,
    tracking: Arc<Tracking>,
}

impl LargeObjectPool {
    /// Create a new pool.
    #[must_use]
    pub fn new(
        threshold: usize,
        max_tracked: usize,
        expiry: Duration,
        monitor: Arc<MemoryMonitor>,
    ) -> Self {
        Self {
            threshold: threshold.max(1),
            expiry,
            next_id: AtomicU64::new(1),
            tracking: Arc::new(Tracking {
                entries: Mutex::new(HashMap::new()),
                permits: Semaphore::new(max_tracked.max(1)),
                monitor,
            }),
        }
    }

    /// Construct an object, tracking it when it clears the size threshold.
    ///
    /// Never blocks: at tracking capacity the object is constructed untracked
    /// (immediate fallback rather than queueing). Below the threshold the
    /// object is always untracked.
    #[allow(clippy::unused_async)]
    pub async fn rent_async<T: Poolable>(
        &self,
        cancel: &CancellationToken,
        estimated_size: usize,
    ) -> PoolResult<Large<T>> {
        cancel.check_cancelled()?;

        let id = if estimated_size >= self.threshold {
            match self.tracking.permits.try_acquire() {
                Ok(permit) => {
                    permit.forget();
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    self.tracking.entries.lock().insert(
                        id,
                        LargeObjectInfo {
                            estimated_size,
                            created_at: Instant::now(),
                        },
                    );
                    self.tracking
                        .monitor
                        .record_large_allocation(estimated_size as u64);
                    Some(id)
                }
                Err(_) => None,
            }
        } else {
            None
        };

        Ok(Large {
            value: Some(T::default()),
            id,
            estimated_size,
            tracking: Arc::clone(&self.tracking),
        })
    }

    /// Release an object, dropping its value and its tracking entry.
    ///
    /// A cancelled return still releases the entry: the handle is consumed
    /// either way, so tracking state stays consistent.
    #[allow(clippy::unused_async)]
    pub async fn return_async<T>(
        &self,
        obj: Large<T>,
        cancel: &CancellationToken,
    ) -> PoolResult<()> {
        let cancelled = cancel.check_cancelled();
        drop(obj);
        cancelled
    }

    /// Number of currently tracked objects.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracking.entries.lock().len()
    }

    /// Estimated bytes across all tracked objects.
    #[must_use]
    pub fn tracked_bytes(&self) -> u64 {
        self.tracking
            .entries
            .lock()
            .values()
            .map(|info| info.estimated_size as u64)
            .sum()
    }

    /// Reclaim tracking slots for objects older than the expiry window.
    ///
    /// This is the leak-safety net for handles that were forgotten rather
    /// than dropped, not the primary return path. Returns how many entries
    /// were reclaimed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut reclaimed = Vec::new();
        {
            let mut entries = self.tracking.entries.lock();
            entries.retain(|_, info| {
                if now.duration_since(info.created_at) > self.expiry {
                    reclaimed.push(info.estimated_size);
                    false
                } else {
                    true
                }
            });
        }
        if !reclaimed.is_empty() {
            for bytes in &reclaimed {
                self.tracking.monitor.record_large_release(*bytes as u64);
            }
            self.tracking.permits.add_permits(reclaimed.len());
            debug!(count = reclaimed.len(), "large-object expiry sweep");
        }
        reclaimed.len()
    }
}
