//! Stable allocator backends: `GlobalAlloc` for [`Heap`] and the
//! process-default [`DefaultAlloc`].
//!
//! These adapters hold no state of their own; each call is forwarded to the
//! underlying heap unchanged in intent, translated only in representation
//! (a `Layout` becomes a length plus a validated [`Alignment`]).
//!
//! `GlobalAlloc` declares zero-size layouts undefined behavior, so the
//! adapters never see a length of zero on a well-formed caller; debug
//! builds assert it anyway before the engine is reached.

use std::alloc::{GlobalAlloc, Layout};
use std::ptr::{self, NonNull};

use crate::align::Alignment;
use crate::ffi;
use crate::heap::Heap;
#[cfg(not(feature = "minimal"))]
use crate::stats;

unsafe impl GlobalAlloc for Heap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        debug_assert!(layout.size() > 0, "zero-size layout");
        self.malloc_aligned(layout.size(), Alignment::new(layout.align()))
            .map_or(ptr::null_mut(), |p| p.cast::<u8>().as_ptr())
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        debug_assert!(layout.size() > 0, "zero-size layout");
        self.malloc_zeroed(layout.size(), Alignment::new(layout.align()))
            .map_or(ptr::null_mut(), |p| p.cast::<u8>().as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.free_aligned(NonNull::new_unchecked(ptr), Alignment::new(layout.align()));
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        debug_assert!(new_size > 0, "zero-size reallocation");
        self.realloc_aligned(
            NonNull::new_unchecked(ptr),
            new_size,
            Alignment::new(layout.align()),
        )
        .map_or(ptr::null_mut(), |p| p.cast::<u8>().as_ptr())
    }
}

/// Allocator backed by the calling thread's current default heap.
///
/// Each thread starts out on its backing heap; [`Heap::set_as_default`]
/// redirects that thread, and only that thread, to another heap. The
/// dispatch happens inside the engine, so this type carries no state and
/// can serve as the global allocator:
///
/// ```rust,no_run
/// use miheap::DefaultAlloc;
///
/// #[global_allocator]
/// static ALLOC: DefaultAlloc = DefaultAlloc;
/// ```
///
/// There is no teardown; the default heaps live as long as their threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAlloc;

unsafe impl GlobalAlloc for DefaultAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        debug_assert!(layout.size() > 0, "zero-size layout");
        let p = ffi::mi_malloc_aligned(layout.size(), layout.align());
        #[cfg(not(feature = "minimal"))]
        if !p.is_null() {
            stats::record_alloc(layout.size());
        }
        p.cast()
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        debug_assert!(layout.size() > 0, "zero-size layout");
        let p = ffi::mi_zalloc_aligned(layout.size(), layout.align());
        #[cfg(not(feature = "minimal"))]
        if !p.is_null() {
            stats::record_alloc(layout.size());
        }
        p.cast()
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        ffi::mi_free_size_aligned(ptr.cast(), layout.size(), layout.align());
        #[cfg(not(feature = "minimal"))]
        stats::record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        debug_assert!(new_size > 0, "zero-size reallocation");
        let p = ffi::mi_realloc_aligned(ptr.cast(), new_size, layout.align());
        #[cfg(not(feature = "minimal"))]
        if !p.is_null() {
            stats::record_dealloc(layout.size());
            stats::record_alloc(new_size);
        }
        p.cast()
    }
}
