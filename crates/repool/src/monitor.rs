//! Passive memory-usage aggregation for the array and large-object pools.
//!
//! The monitor records allocation and return events; it never makes
//! allocation decisions itself.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::System;
use tracing::debug;

/// Element types covered by the array pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementKind {
    /// Byte arrays.
    U8,
    /// Character arrays.
    Char,
    /// 32-bit integer arrays.
    I32,
    /// 64-bit float arrays.
    F64,
}

impl ElementKind {
    /// All covered element kinds, in bucket order.
    pub const ALL: [ElementKind; 4] = [
        ElementKind::U8,
        ElementKind::Char,
        ElementKind::I32,
        ElementKind::F64,
    ];

    /// Size of one element in bytes.
    #[must_use]
    pub const fn element_size(self) -> usize {
        match self {
            ElementKind::U8 => 1,
            ElementKind::Char | ElementKind::I32 => 4,
            ElementKind::F64 => 8,
        }
    }

    /// Display name of the element type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ElementKind::U8 => "u8",
            ElementKind::Char => "char",
            ElementKind::I32 => "i32",
            ElementKind::F64 => "f64",
        }
    }

    /// Whether rentals of this kind benefit from cache warming.
    pub(crate) const fn is_numeric(self) -> bool {
        matches!(self, ElementKind::I32 | ElementKind::F64)
    }

    const fn index(self) -> usize {
        match self {
            ElementKind::U8 => 0,
            ElementKind::Char => 1,
            ElementKind::I32 => 2,
            ElementKind::F64 => 3,
        }
    }
}

/// Aggregates allocation/return events into usage and fragmentation estimates.
///
/// Array returns keep the byte counters untouched: returned arrays stay
/// retained in their buckets, so their bytes model idle capacity rather than
/// freed memory. Large-object releases do subtract, since their storage is
/// actually dropped.
pub struct MemoryMonitor {
    total_bytes: AtomicU64,
    used_bytes: AtomicU64,
    live_arrays: [AtomicU64; 4],
    native: Option<Mutex<System>>,
}

impl MemoryMonitor {
    /// Create a new monitor. When `native_memory` is set, statistics
    /// snapshots include process resident memory.
    #[must_use]
    pub fn new(native_memory: bool) -> Self {
        Self {
            total_bytes: AtomicU64::new(0),
            used_bytes: AtomicU64::new(0),
            live_arrays: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            native: native_memory.then(|| Mutex::new(System::new())),
        }
    }

    /// Record a pooled array being handed out.
    pub fn record_array_allocation(&self, kind: ElementKind, len: usize) {
        let bytes = (kind.element_size() * len) as u64;
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.used_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.live_arrays[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pooled array coming back.
    pub fn record_array_return(&self, kind: ElementKind) {
        // Unmatched returns are ignored rather than underflowing.
        let _ = self.live_arrays[kind.index()]
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Record a tracked large object being constructed.
    pub fn record_large_allocation(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.used_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a tracked large object being released.
    pub fn record_large_release(&self, bytes: u64) {
        let _ = self
            .used_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(bytes));
    }

    /// Running total of bytes handed out since creation.
    #[must_use]
    pub fn current_usage(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Bytes still accounted as in active use.
    #[must_use]
    pub fn used_memory(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    /// Number of live (rented, unreturned) arrays for the element type.
    #[must_use]
    pub fn array_count(&self, kind: ElementKind) -> u64 {
        self.live_arrays[kind.index()].load(Ordering::Relaxed)
    }

    /// Estimated fraction of retained-but-idle capacity.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fragmentation_ratio(&self) -> f64 {
        let total = self.current_usage();
        if total == 0 {
            return 0.0;
        }
        1.0 - self.used_memory() as f64 / total as f64
    }

    /// Used system memory in bytes, when native reporting is enabled.
    #[must_use]
    pub fn native_memory(&self) -> Option<u64> {
        let system = self.native.as_ref()?;
        let mut system = system.lock();
        system.refresh_memory();
        Some(system.used_memory())
    }

    /// Periodic refresh hook for external logging and telemetry.
    pub fn update_metrics(&self) {
        debug!(
            total_bytes = self.current_usage(),
            used_bytes = self.used_memory(),
            fragmentation = format!("{:.3}", self.fragmentation_ratio()),
            "memory monitor refresh"
        );
        if let Some(used) = self.native_memory() {
            debug!(native_memory_bytes = used, "native memory refresh");
        }
    }
}
