//! Raw bindings to the mimalloc entry points used by this crate.
//!
//! `libmimalloc-sys` compiles and links the engine itself; the prototypes
//! below are declared locally so the crate does not depend on how much of
//! the C API the sys crate chooses to re-export.
//!
//! See `mimalloc.h` for the authoritative contracts. Two points matter for
//! callers here:
//!
//! - Heaps are thread-local: a heap may only be used by the thread that
//!   created it. Nothing below checks this.
//! - `alignment` arguments must be non-zero powers of two, and sizes must
//!   be non-zero for the allocation entry points.

#![allow(non_camel_case_types)]

use std::os::raw::c_void;

// Pulls in the compiled mimalloc library for linking.
use libmimalloc_sys as _;

/// Opaque mimalloc heap.
pub enum mi_heap_t {}

extern "C" {
    // Heap lifecycle.
    pub fn mi_heap_new() -> *mut mi_heap_t;
    pub fn mi_heap_delete(heap: *mut mi_heap_t);
    pub fn mi_heap_destroy(heap: *mut mi_heap_t);
    pub fn mi_heap_set_default(heap: *mut mi_heap_t) -> *mut mi_heap_t;
    pub fn mi_heap_get_default() -> *mut mi_heap_t;
    pub fn mi_heap_get_backing() -> *mut mi_heap_t;
    pub fn mi_heap_collect(heap: *mut mi_heap_t, force: bool);

    // Heap-scoped allocation.
    pub fn mi_heap_malloc(heap: *mut mi_heap_t, size: usize) -> *mut c_void;
    pub fn mi_heap_malloc_small(heap: *mut mi_heap_t, size: usize) -> *mut c_void;
    pub fn mi_heap_malloc_aligned(heap: *mut mi_heap_t, size: usize, alignment: usize)
        -> *mut c_void;
    pub fn mi_heap_zalloc_aligned(heap: *mut mi_heap_t, size: usize, alignment: usize)
        -> *mut c_void;
    pub fn mi_heap_realloc(heap: *mut mi_heap_t, p: *mut c_void, newsize: usize) -> *mut c_void;
    pub fn mi_heap_realloc_aligned(
        heap: *mut mi_heap_t,
        p: *mut c_void,
        newsize: usize,
        alignment: usize,
    ) -> *mut c_void;
    pub fn mi_heap_rezalloc_aligned(
        heap: *mut mi_heap_t,
        p: *mut c_void,
        newsize: usize,
        alignment: usize,
    ) -> *mut c_void;

    // Ownership queries.
    pub fn mi_heap_check_owned(heap: *mut mi_heap_t, p: *const c_void) -> bool;
    pub fn mi_check_owned(p: *const c_void) -> bool;

    // Default-heap allocation (thread-local dispatch inside the engine).
    pub fn mi_malloc_aligned(size: usize, alignment: usize) -> *mut c_void;
    pub fn mi_zalloc_aligned(size: usize, alignment: usize) -> *mut c_void;
    pub fn mi_realloc_aligned(p: *mut c_void, newsize: usize, alignment: usize) -> *mut c_void;
    pub fn mi_rezalloc_aligned(p: *mut c_void, newsize: usize, alignment: usize) -> *mut c_void;

    // Free, resize and introspection. These are not heap-scoped; the engine
    // recovers the owning heap from the pointer itself.
    pub fn mi_expand(p: *mut c_void, newsize: usize) -> *mut c_void;
    pub fn mi_free(p: *mut c_void);
    pub fn mi_free_aligned(p: *mut c_void, alignment: usize);
    pub fn mi_free_size_aligned(p: *mut c_void, size: usize, alignment: usize);
    pub fn mi_usable_size(p: *const c_void) -> usize;
    pub fn mi_good_size(size: usize) -> usize;
    pub fn mi_collect(force: bool);
}
