//! Process-wide statistics for the default allocator.
//!
//! Plain atomics; updated on the [`DefaultAlloc`](crate::DefaultAlloc)
//! paths and stripped entirely by the `minimal` feature.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Snapshot of the default allocator's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocStats {
    /// Bytes currently allocated (as requested, not as reserved).
    pub allocated_bytes: usize,
    /// High-water mark of `allocated_bytes`.
    pub peak_allocated: usize,
    /// Total allocations since process start.
    pub allocation_count: u64,
    /// Total deallocations since process start.
    pub deallocation_count: u64,
}

static TOTAL_ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static ALLOCATION_COUNT: AtomicU64 = AtomicU64::new(0);
static DEALLOCATION_COUNT: AtomicU64 = AtomicU64::new(0);

pub(crate) fn record_alloc(size: usize) {
    ALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
    let new_total = TOTAL_ALLOCATED.fetch_add(size, Ordering::Relaxed) + size;

    // Update peak if needed
    let mut peak = PEAK_ALLOCATED.load(Ordering::Relaxed);
    while new_total > peak {
        match PEAK_ALLOCATED.compare_exchange_weak(
            peak,
            new_total,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(p) => peak = p,
        }
    }
}

pub(crate) fn record_dealloc(size: usize) {
    DEALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
    TOTAL_ALLOCATED.fetch_sub(size, Ordering::Relaxed);
}

/// Current default-allocator statistics.
pub fn stats() -> AllocStats {
    AllocStats {
        allocated_bytes: TOTAL_ALLOCATED.load(Ordering::Relaxed),
        peak_allocated: PEAK_ALLOCATED.load(Ordering::Relaxed),
        allocation_count: ALLOCATION_COUNT.load(Ordering::Relaxed),
        deallocation_count: DEALLOCATION_COUNT.load(Ordering::Relaxed),
    }
}
