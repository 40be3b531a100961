//! Allocation tracking
//!
//! [`TrackingAllocator`] wraps another global allocator and keeps a running
//! count of live heap bytes. Install it in the host binary to enable memory
//! profiling:
//!
//! ```no_run
//! use fluentai_profiler::TrackingAllocator;
//!
//! #[global_allocator]
//! static GLOBAL: TrackingAllocator = TrackingAllocator::system();
//! ```
//!
//! Besides the live-bytes counter the allocator maintains a small pool of
//! peak watermark slots. Each open span owns one slot, so spans that overlap
//! (including spans of different profilers) see their own peaks.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Number of spans that can track a peak at the same time
pub const PEAK_SLOTS: usize = 32;

static INSTALLED: AtomicBool = AtomicBool::new(false);
static LIVE_BYTES: AtomicUsize = AtomicUsize::new(0);
static ACTIVE_SLOTS: AtomicU32 = AtomicU32::new(0);

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicUsize = AtomicUsize::new(0);
static SLOT_PEAKS: [AtomicUsize; PEAK_SLOTS] = [EMPTY_SLOT; PEAK_SLOTS];

/// Global allocator wrapper that counts live bytes
#[derive(Debug, Default)]
pub struct TrackingAllocator<A = System> {
    inner: A,
}

impl TrackingAllocator<System> {
    /// Track the system allocator
    pub const fn system() -> Self {
        Self { inner: System }
    }
}

impl<A> TrackingAllocator<A> {
    /// Track an arbitrary allocator
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            let old_size = layout.size();
            if new_size > old_size {
                record_alloc(new_size - old_size);
            } else {
                record_dealloc(old_size - new_size);
            }
        }
        new_ptr
    }
}

#[inline]
fn record_alloc(size: usize) {
    if !INSTALLED.load(Ordering::Relaxed) {
        INSTALLED.store(true, Ordering::Relaxed);
    }
    let live = LIVE_BYTES.fetch_add(size, Ordering::Relaxed).wrapping_add(size);
    raise_peaks(live);
}

/// Raise the watermark of every claimed slot to `live`.
///
/// The claimed-slot mask is read once. If a slot is released and claimed
/// again while this runs, the new owner can see a live value from just
/// before it claimed the slot; the overshoot is bounded by the allocations
/// in flight across that handover.
#[inline]
fn raise_peaks(live: usize) {
    let mut active = ACTIVE_SLOTS.load(Ordering::Acquire);
    while active != 0 {
        let index = active.trailing_zeros() as usize;
        SLOT_PEAKS[index].fetch_max(live, Ordering::Relaxed);
        active &= active - 1;
    }
}

#[inline]
fn record_dealloc(size: usize) {
    LIVE_BYTES.fetch_sub(size, Ordering::Relaxed);
}

/// Whether a [`TrackingAllocator`] is serving allocations in this process
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Relaxed)
}

/// Live heap bytes allocated through the tracking allocator
pub fn live_bytes() -> usize {
    LIVE_BYTES.load(Ordering::Relaxed)
}

/// A claimed peak watermark slot; released on drop
#[derive(Debug)]
pub(crate) struct PeakSlot {
    index: usize,
}

impl PeakSlot {
    /// Claim a free slot seeded with `baseline`, or `None` if all are taken
    pub(crate) fn acquire(baseline: usize) -> Option<Self> {
        let mut active = ACTIVE_SLOTS.load(Ordering::Acquire);
        loop {
            let free = !active;
            if free == 0 {
                return None;
            }
            let index = free.trailing_zeros() as usize;
            match ACTIVE_SLOTS.compare_exchange_weak(
                active,
                active | (1 << index),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // The slot may still hold the previous owner's peak.
                    SLOT_PEAKS[index].store(baseline, Ordering::Relaxed);
                    return Some(Self { index });
                }
                Err(current) => active = current,
            }
        }
    }

    /// Highest live byte count observed since the slot was claimed
    pub(crate) fn peak(&self) -> usize {
        SLOT_PEAKS[self.index]
            .load(Ordering::Relaxed)
            .max(live_bytes())
    }
}

impl Drop for PeakSlot {
    fn drop(&mut self) {
        SLOT_PEAKS[self.index].store(0, Ordering::Relaxed);
        ACTIVE_SLOTS.fetch_and(!(1 << self.index), Ordering::AcqRel);
    }
}
