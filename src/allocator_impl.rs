//! Implementation of std::alloc::Allocator for miheap types.
//!
//! This module requires the `nightly` feature and a nightly Rust compiler.
//! It allows using isolated heaps with standard library collections.
//!
//! Enable with:
//! ```toml
//! [dependencies]
//! miheap = { version = "0.3", features = ["nightly"] }
//! ```
//!
//! Unlike `GlobalAlloc`, the `Allocator` contract requires zero-size
//! support. The engine forbids zero-length requests, so those are answered
//! here with dangling pointers and never forwarded.

use std::alloc::{AllocError, Allocator, Layout};
use std::ptr::NonNull;

use crate::align::Alignment;
use crate::alloc::DefaultAlloc;
use crate::ffi;
use crate::heap::Heap;

/// A well-aligned pointer for a zero-size allocation.
#[inline]
fn dangling(layout: Layout) -> NonNull<[u8]> {
    // An alignment is never zero, so this never fails.
    let ptr = unsafe { NonNull::new_unchecked(layout.align() as *mut u8) };
    NonNull::slice_from_raw_parts(ptr, 0)
}

/// Use an isolated heap with standard collections:
///
/// ```rust,ignore
/// use miheap::Heap;
///
/// let heap = Heap::new();
/// let mut vec: Vec<u32, _> = Vec::new_in(&heap);
/// vec.push(42);
/// drop(vec);
/// heap.teardown(miheap::Teardown::Delete);
/// ```
unsafe impl Allocator for Heap {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }
        self.malloc_aligned(layout.size(), Alignment::new(layout.align()))
            .ok_or(AllocError)
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }
        self.malloc_zeroed(layout.size(), Alignment::new(layout.align()))
            .ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            self.free_aligned(ptr, Alignment::new(layout.align()));
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if old_layout.size() == 0 {
            return self.allocate(new_layout);
        }
        // In-place first; a moving reallocation only when the engine
        // cannot extend the block where it is.
        if old_layout.align() == new_layout.align() {
            if let Some(r) = self.resize_in_place(ptr, new_layout.size()) {
                return Ok(r);
            }
        }
        self.realloc_aligned(ptr, new_layout.size(), Alignment::new(new_layout.align()))
            .ok_or(AllocError)
    }

    unsafe fn grow_zeroed(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if old_layout.size() == 0 {
            return self.allocate_zeroed(new_layout);
        }
        self.realloc_zeroed(ptr, new_layout.size(), Alignment::new(new_layout.align()))
            .ok_or(AllocError)
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() <= old_layout.size());

        if new_layout.size() == 0 {
            self.deallocate(ptr, old_layout);
            return Ok(dangling(new_layout));
        }
        // A shrink always fits the current block, so the in-place path
        // cannot fail unless the alignment changes.
        if old_layout.align() == new_layout.align() {
            if let Some(r) = self.resize_in_place(ptr, new_layout.size()) {
                return Ok(r);
            }
        }
        self.realloc_aligned(ptr, new_layout.size(), Alignment::new(new_layout.align()))
            .ok_or(AllocError)
    }
}

unsafe impl Allocator for DefaultAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }
        let p = unsafe { ffi::mi_malloc_aligned(layout.size(), layout.align()) };
        NonNull::new(p.cast::<u8>())
            .map(|p| NonNull::slice_from_raw_parts(p, layout.size()))
            .ok_or(AllocError)
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }
        let p = unsafe { ffi::mi_zalloc_aligned(layout.size(), layout.align()) };
        NonNull::new(p.cast::<u8>())
            .map(|p| NonNull::slice_from_raw_parts(p, layout.size()))
            .ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            ffi::mi_free_size_aligned(ptr.as_ptr().cast(), layout.size(), layout.align());
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if old_layout.size() == 0 {
            return self.allocate(new_layout);
        }
        if old_layout.align() == new_layout.align() {
            let q = ffi::mi_expand(ptr.as_ptr().cast(), new_layout.size());
            if !q.is_null() {
                debug_assert_eq!(q.cast::<u8>(), ptr.as_ptr());
                return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
            }
        }
        let q = ffi::mi_realloc_aligned(ptr.as_ptr().cast(), new_layout.size(), new_layout.align());
        NonNull::new(q.cast::<u8>())
            .map(|p| NonNull::slice_from_raw_parts(p, new_layout.size()))
            .ok_or(AllocError)
    }

    unsafe fn grow_zeroed(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if old_layout.size() == 0 {
            return self.allocate_zeroed(new_layout);
        }
        let q = ffi::mi_rezalloc_aligned(ptr.as_ptr().cast(), new_layout.size(), new_layout.align());
        NonNull::new(q.cast::<u8>())
            .map(|p| NonNull::slice_from_raw_parts(p, new_layout.size()))
            .ok_or(AllocError)
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() <= old_layout.size());

        if new_layout.size() == 0 {
            self.deallocate(ptr, old_layout);
            return Ok(dangling(new_layout));
        }
        let q = ffi::mi_realloc_aligned(ptr.as_ptr().cast(), new_layout.size(), new_layout.align());
        NonNull::new(q.cast::<u8>())
            .map(|p| NonNull::slice_from_raw_parts(p, new_layout.size()))
            .ok_or(AllocError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Teardown;

    #[test]
    fn test_vec_in_heap() {
        let heap = Heap::new();

        let mut v: Vec<u64, _> = Vec::new_in(&heap);
        for i in 0..1000 {
            v.push(i);
        }
        assert_eq!(v.len(), 1000);
        assert_eq!(v[999], 999);

        drop(v);
        heap.teardown(Teardown::Delete);
    }

    #[test]
    fn test_box_in_default() {
        let b = Box::new_in([0u8; 512], DefaultAlloc);
        assert_eq!(b[511], 0);
    }

    #[test]
    fn test_zero_size_allocations() {
        let heap = Heap::new();
        let layout = Layout::from_size_align(0, 8).unwrap();

        let block = heap.allocate(layout).unwrap();
        assert_eq!(block.len(), 0);
        unsafe { heap.deallocate(block.cast(), layout) };
    }
}
