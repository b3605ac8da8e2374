//! Heap handles over the native mimalloc engine.
//!
//! A [`Heap`] is an isolated allocation arena. Allocations from one heap can
//! be torn down in bulk independently of every other heap, which makes heaps
//! useful for workloads with a clear end-of-life point (a request, a level,
//! a worker's batch) and for keeping threads off each other's free lists.
//!
//! Heaps are thread-affine: a heap must be created, used, and torn down by
//! the same thread. `Heap` is `!Send` and `!Sync`, so safe code cannot get
//! this wrong; the `unsafe` escape hatches ([`Heap::from_raw_borrowed`]) are
//! checked against a registry of owning threads in debug builds.

#[cfg(not(feature = "minimal"))]
use std::cell::Cell;
use std::ffi::c_void;
use std::ptr::NonNull;

use crate::align::Alignment;
use crate::ffi;

/// Largest length eligible for the engine's small-allocation fast path.
///
/// Mirrors mimalloc's `MI_SMALL_SIZE_MAX` (128 machine words).
pub const SMALL_SIZE_MAX: usize = 128 * std::mem::size_of::<usize>();

/// Policy for tearing down a heap.
///
/// The two modes differ in what happens to allocations still outstanding
/// when the heap goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Free every outstanding allocation along with the heap. Any pointer
    /// still held into the heap dangles afterwards; that risk is the
    /// caller's to manage.
    Destroy,
    /// Return the heap's pages to the engine's general pool. Outstanding
    /// allocations stay valid and must still be freed individually.
    Delete,
}

/// A handle to one native heap.
///
/// Heaps come in two flavors: owned (created by [`Heap::new`], torn down by
/// [`Heap::teardown`] or on drop) and borrowed views of the engine's
/// singleton heaps ([`Heap::backing`], [`Heap::current_default`]), which are
/// never torn down through the handle.
///
/// All allocation methods return `None` when the engine cannot satisfy the
/// request; contract violations (zero lengths, bad alignments, touching a
/// heap from the wrong thread) are programming errors and panic in debug
/// builds.
#[derive(Debug)]
pub struct Heap {
    raw: NonNull<ffi::mi_heap_t>,
    owned: bool,

    // Bytes and blocks handed out through this handle.
    #[cfg(not(feature = "minimal"))]
    allocated_bytes: Cell<usize>,
    #[cfg(not(feature = "minimal"))]
    allocation_count: Cell<usize>,
}

impl Heap {
    /// Create a new isolated heap owned by the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if the engine cannot allocate heap metadata. A process that
    /// cannot allocate a few hundred bytes of bookkeeping is past the point
    /// where a recoverable error would help.
    pub fn new() -> Self {
        let Some(raw) = NonNull::new(unsafe { ffi::mi_heap_new() }) else {
            panic!("mi_heap_new failed to allocate heap metadata");
        };

        #[cfg(debug_assertions)]
        crate::debug::affinity::register(raw.as_ptr());

        #[cfg(feature = "log")]
        log::trace!("created heap {:p}", raw.as_ptr());

        Self::from_parts(raw, true)
    }

    /// The calling thread's backing heap: its initial default heap.
    ///
    /// The backing heap lives as long as the thread and cannot be torn
    /// down. The returned handle is borrowed.
    pub fn backing() -> Self {
        let raw = unsafe { ffi::mi_heap_get_backing() };
        debug_assert!(!raw.is_null());
        Self::from_parts(unsafe { NonNull::new_unchecked(raw) }, false)
    }

    /// The calling thread's current default heap.
    ///
    /// Initially the backing heap, or whatever heap was last passed to
    /// [`Heap::set_as_default`] on this thread. The returned handle is
    /// borrowed.
    pub fn current_default() -> Self {
        let raw = unsafe { ffi::mi_heap_get_default() };
        debug_assert!(!raw.is_null());
        Self::from_parts(unsafe { NonNull::new_unchecked(raw) }, false)
    }

    fn from_parts(raw: NonNull<ffi::mi_heap_t>, owned: bool) -> Self {
        Self {
            raw,
            owned,
            #[cfg(not(feature = "minimal"))]
            allocated_bytes: Cell::new(0),
            #[cfg(not(feature = "minimal"))]
            allocation_count: Cell::new(0),
        }
    }

    /// Make this heap the calling thread's default heap.
    ///
    /// Subsequent allocations through [`DefaultAlloc`](crate::DefaultAlloc)
    /// on this thread come from this heap until the default changes again.
    /// Other threads are unaffected.
    pub fn set_as_default(&self) {
        self.check_affinity();

        #[cfg(feature = "log")]
        log::debug!("heap {:p} set as thread default", self.raw.as_ptr());

        unsafe { ffi::mi_heap_set_default(self.raw.as_ptr()) };
    }

    /// Whether this handle refers to the calling thread's backing heap.
    pub fn is_backing(&self) -> bool {
        self.raw.as_ptr() == unsafe { ffi::mi_heap_get_backing() }
    }

    /// Tear the heap down with the given policy.
    ///
    /// # Panics
    ///
    /// Panics on a borrowed handle or on the backing heap; neither may be
    /// torn down.
    pub fn teardown(self, mode: Teardown) {
        assert!(
            self.owned,
            "borrowed heap handles cannot be torn down"
        );
        assert!(
            !self.is_backing(),
            "the backing heap cannot be torn down"
        );
        self.check_affinity();

        #[cfg(debug_assertions)]
        crate::debug::affinity::unregister(self.raw.as_ptr());

        #[cfg(feature = "log")]
        log::trace!("tearing down heap {:p} ({:?})", self.raw.as_ptr(), mode);

        let raw = self.raw.as_ptr();
        std::mem::forget(self);
        match mode {
            Teardown::Destroy => unsafe { ffi::mi_heap_destroy(raw) },
            Teardown::Delete => unsafe { ffi::mi_heap_delete(raw) },
        }
    }

    /// Allocate `len` bytes at the engine's natural alignment.
    ///
    /// Returns `None` when the engine is out of memory. `len` must be
    /// non-zero.
    pub fn malloc(&self, len: usize) -> Option<NonNull<[u8]>> {
        self.check_affinity();
        debug_assert!(len > 0, "zero-length allocation");

        let ptr = unsafe { ffi::mi_heap_malloc(self.raw.as_ptr(), len) };
        self.record_alloc(ptr);
        slice_from(ptr, len)
    }

    /// Allocate `len` bytes through the engine's small-object fast path.
    ///
    /// Equivalent to [`Heap::malloc`] for lengths up to [`SMALL_SIZE_MAX`];
    /// this path merely skips the general size-class dispatch.
    pub fn malloc_small(&self, len: usize) -> Option<NonNull<[u8]>> {
        self.check_affinity();
        debug_assert!(len > 0, "zero-length allocation");
        debug_assert!(len <= SMALL_SIZE_MAX, "length beyond the small-object threshold");

        let ptr = unsafe { ffi::mi_heap_malloc_small(self.raw.as_ptr(), len) };
        self.record_alloc(ptr);
        slice_from(ptr, len)
    }

    /// Allocate `len` bytes at an explicit alignment.
    pub fn malloc_aligned(&self, len: usize, align: Alignment) -> Option<NonNull<[u8]>> {
        self.check_affinity();
        debug_assert!(len > 0, "zero-length allocation");

        let ptr = unsafe { ffi::mi_heap_malloc_aligned(self.raw.as_ptr(), len, align.bytes()) };
        self.record_alloc(ptr);
        slice_from(ptr, len)
    }

    /// Allocate `len` zeroed bytes at an explicit alignment.
    pub fn malloc_zeroed(&self, len: usize, align: Alignment) -> Option<NonNull<[u8]>> {
        self.check_affinity();
        debug_assert!(len > 0, "zero-length allocation");

        let ptr = unsafe { ffi::mi_heap_zalloc_aligned(self.raw.as_ptr(), len, align.bytes()) };
        self.record_alloc(ptr);
        slice_from(ptr, len)
    }

    /// Try to resize an allocation without moving it.
    ///
    /// On success the returned range starts at the same address as `ptr`
    /// and covers `new_len` bytes. On failure the original allocation is
    /// untouched; the caller falls back to [`Heap::realloc`] if it needs
    /// the new length.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live allocation from this heap.
    pub unsafe fn resize_in_place(&self, ptr: NonNull<u8>, new_len: usize) -> Option<NonNull<[u8]>> {
        self.check_affinity();
        debug_assert!(new_len > 0, "zero-length resize");

        let q = ffi::mi_expand(ptr.as_ptr().cast(), new_len);
        if q.is_null() {
            return None;
        }
        debug_assert_eq!(q.cast::<u8>(), ptr.as_ptr(), "in-place resize moved the block");
        Some(NonNull::slice_from_raw_parts(ptr, new_len))
    }

    /// Resize an allocation, moving it if necessary.
    ///
    /// On success the old range is invalid (unless the engine resized in
    /// place) and the first `min(old_len, new_len)` bytes carry over. On
    /// failure the old allocation is untouched and stays valid.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live allocation from this heap, allocated at
    /// the engine's natural alignment.
    pub unsafe fn realloc(&self, ptr: NonNull<u8>, new_len: usize) -> Option<NonNull<[u8]>> {
        self.check_affinity();
        debug_assert!(new_len > 0, "zero-length reallocation");

        #[cfg(not(feature = "minimal"))]
        let old_usable = ffi::mi_usable_size(ptr.as_ptr().cast());

        let q = ffi::mi_heap_realloc(self.raw.as_ptr(), ptr.as_ptr().cast(), new_len);
        if q.is_null() {
            return None;
        }
        #[cfg(not(feature = "minimal"))]
        self.record_realloc(old_usable, q);
        slice_from(q, new_len)
    }

    /// Resize an allocation at an explicit alignment, moving it if
    /// necessary.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live allocation from this heap, allocated with
    /// the same alignment.
    pub unsafe fn realloc_aligned(
        &self,
        ptr: NonNull<u8>,
        new_len: usize,
        align: Alignment,
    ) -> Option<NonNull<[u8]>> {
        self.check_affinity();
        debug_assert!(new_len > 0, "zero-length reallocation");

        #[cfg(not(feature = "minimal"))]
        let old_usable = ffi::mi_usable_size(ptr.as_ptr().cast());

        let q = ffi::mi_heap_realloc_aligned(
            self.raw.as_ptr(),
            ptr.as_ptr().cast(),
            new_len,
            align.bytes(),
        );
        if q.is_null() {
            return None;
        }
        #[cfg(not(feature = "minimal"))]
        self.record_realloc(old_usable, q);
        slice_from(q, new_len)
    }

    /// Resize an allocation at an explicit alignment, zero-initializing
    /// any newly extended region, moving the block if necessary.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live allocation from this heap, allocated with
    /// the same alignment.
    pub unsafe fn realloc_zeroed(
        &self,
        ptr: NonNull<u8>,
        new_len: usize,
        align: Alignment,
    ) -> Option<NonNull<[u8]>> {
        self.check_affinity();
        debug_assert!(new_len > 0, "zero-length reallocation");

        #[cfg(not(feature = "minimal"))]
        let old_usable = ffi::mi_usable_size(ptr.as_ptr().cast());

        let q = ffi::mi_heap_rezalloc_aligned(
            self.raw.as_ptr(),
            ptr.as_ptr().cast(),
            new_len,
            align.bytes(),
        );
        if q.is_null() {
            return None;
        }
        #[cfg(not(feature = "minimal"))]
        self.record_realloc(old_usable, q);
        slice_from(q, new_len)
    }

    /// Free an allocation made at the engine's natural alignment.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live allocation from this heap; it is invalid
    /// after this call.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        self.check_affinity();
        self.record_free(ptr.as_ptr().cast());
        ffi::mi_free(ptr.as_ptr().cast());
    }

    /// Free an allocation made at an explicit alignment.
    ///
    /// The engine cannot recover the allocation-time alignment on its own;
    /// passing a different alignment than was used to allocate is a
    /// contract violation it cannot detect.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live allocation from this heap, allocated with
    /// alignment `align`; it is invalid after this call.
    pub unsafe fn free_aligned(&self, ptr: NonNull<u8>, align: Alignment) {
        self.check_affinity();
        self.record_free(ptr.as_ptr().cast());
        ffi::mi_free_aligned(ptr.as_ptr().cast(), align.bytes());
    }

    /// Return unused backing memory to the engine's global pool.
    ///
    /// Advisory; allocation validity is unaffected. `force` requests a more
    /// aggressive (and more expensive) pass.
    pub fn collect(&self, force: bool) {
        self.check_affinity();

        #[cfg(feature = "log")]
        log::trace!("collect on heap {:p} (force: {})", self.raw.as_ptr(), force);

        unsafe { ffi::mi_heap_collect(self.raw.as_ptr(), force) };
    }

    /// Whether `ptr` was allocated from this heap.
    ///
    /// Best-effort diagnostic; the engine answers with a non-trivial scan,
    /// so this is not a dispatch mechanism.
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.check_affinity();
        unsafe { ffi::mi_heap_check_owned(self.raw.as_ptr(), ptr.cast()) }
    }

    /// Bytes currently allocated through this handle.
    #[cfg(not(feature = "minimal"))]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.get()
    }

    /// Blocks currently allocated through this handle.
    #[cfg(not(feature = "minimal"))]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.get()
    }

    /// The raw heap pointer, for FFI interop.
    pub fn as_raw(&self) -> *mut ffi::mi_heap_t {
        self.raw.as_ptr()
    }

    /// Wrap a raw heap pointer in a borrowed handle.
    ///
    /// The handle never tears the heap down.
    ///
    /// # Safety
    ///
    /// `raw` must point to a live heap owned by the calling thread. Debug
    /// builds verify the thread against the heap's creator; release builds
    /// trust the caller.
    pub unsafe fn from_raw_borrowed(raw: *mut ffi::mi_heap_t) -> Self {
        debug_assert!(!raw.is_null());
        Self::from_parts(NonNull::new_unchecked(raw), false)
    }

    #[inline]
    fn check_affinity(&self) {
        #[cfg(debug_assertions)]
        crate::debug::affinity::check(self.raw.as_ptr());
    }

    #[cfg(not(feature = "minimal"))]
    #[inline]
    fn record_alloc(&self, ptr: *mut c_void) {
        if !ptr.is_null() {
            let usable = unsafe { ffi::mi_usable_size(ptr) };
            self.allocation_count.set(self.allocation_count.get() + 1);
            self.allocated_bytes.set(self.allocated_bytes.get() + usable);
        }
    }

    #[cfg(feature = "minimal")]
    #[inline]
    fn record_alloc(&self, _ptr: *mut c_void) {}

    #[cfg(not(feature = "minimal"))]
    #[inline]
    fn record_free(&self, ptr: *mut c_void) {
        let usable = unsafe { ffi::mi_usable_size(ptr) };
        self.allocation_count.set(self.allocation_count.get().saturating_sub(1));
        self.allocated_bytes.set(self.allocated_bytes.get().saturating_sub(usable));
    }

    #[cfg(feature = "minimal")]
    #[inline]
    fn record_free(&self, _ptr: *mut c_void) {}

    #[cfg(not(feature = "minimal"))]
    #[inline]
    fn record_realloc(&self, old_usable: usize, new_ptr: *mut c_void) {
        let new_usable = unsafe { ffi::mi_usable_size(new_ptr) };
        self.allocated_bytes.set(
            self.allocated_bytes
                .get()
                .saturating_sub(old_usable)
                .saturating_add(new_usable),
        );
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        if self.owned {
            #[cfg(debug_assertions)]
            crate::debug::affinity::unregister(self.raw.as_ptr());

            // Outstanding allocations survive a delete; dropping a handle
            // must not invalidate memory the caller may still hold.
            unsafe { ffi::mi_heap_delete(self.raw.as_ptr()) };
        }
    }
}

#[inline]
fn slice_from(ptr: *mut c_void, len: usize) -> Option<NonNull<[u8]>> {
    NonNull::new(ptr.cast::<u8>()).map(|p| NonNull::slice_from_raw_parts(p, len))
}

/// Whether `ptr` was allocated from any heap in this process.
///
/// Best-effort diagnostic, like [`Heap::owns`].
pub fn check_owned(ptr: *const u8) -> bool {
    unsafe { ffi::mi_check_owned(ptr.cast()) }
}

/// Return unused backing memory from every heap to the operating system.
///
/// Advisory, like [`Heap::collect`].
pub fn collect(force: bool) {
    unsafe { ffi::mi_collect(force) };
}

/// The allocation size the engine would actually reserve for `len` bytes.
///
/// Useful for sizing buffers to a size class boundary up front.
pub fn good_size(len: usize) -> usize {
    unsafe { ffi::mi_good_size(len) }
}

/// The usable size of a live allocation.
///
/// The engine may reserve more than was asked for; the full usable range
/// may be read and written.
///
/// # Safety
///
/// `ptr` must point to a live heap allocation.
pub unsafe fn usable_size(ptr: *const u8) -> usize {
    ffi::mi_usable_size(ptr.cast())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_allocation() {
        let heap = Heap::new();

        let block = heap.malloc(64).unwrap();
        assert_eq!(block.len(), 64);

        // Write to verify memory is usable.
        unsafe {
            let p = block.cast::<u8>().as_ptr();
            *p = 0xAB;
            *p.add(63) = 0xCD;
            assert_eq!(*p, 0xAB);
            heap.free(block.cast());
        }
    }

    #[test]
    fn test_aligned_allocation() {
        let heap = Heap::new();

        let block = heap.malloc_aligned(64, Alignment::new(16)).unwrap();
        assert_eq!(block.len(), 64);
        assert_eq!(block.cast::<u8>().as_ptr() as usize % 16, 0);

        unsafe { heap.free_aligned(block.cast(), Alignment::new(16)) };
    }

    #[test]
    fn test_large_alignment() {
        let heap = Heap::new();

        let align = Alignment::new(4096);
        let block = heap.malloc_aligned(100, align).unwrap();
        assert!(align.is_aligned(block.cast::<u8>().as_ptr() as usize));

        unsafe { heap.free_aligned(block.cast(), align) };
    }

    #[test]
    fn test_zeroed_allocation() {
        let heap = Heap::new();

        let block = heap.malloc_zeroed(256, Alignment::new(8)).unwrap();
        unsafe {
            let p = block.cast::<u8>().as_ptr();
            for i in 0..256 {
                assert_eq!(*p.add(i), 0);
            }
            heap.free_aligned(block.cast(), Alignment::new(8));
        }
    }

    #[test]
    fn test_small_path_allocation() {
        let heap = Heap::new();

        let block = heap.malloc_small(SMALL_SIZE_MAX).unwrap();
        assert_eq!(block.len(), SMALL_SIZE_MAX);
        unsafe { heap.free(block.cast()) };
    }

    #[test]
    fn test_resize_in_place_shrink_keeps_address() {
        let heap = Heap::new();

        let block = heap.malloc(1024).unwrap();
        let addr = block.cast::<u8>().as_ptr();

        // Shrinking always fits the current block.
        let resized = unsafe { heap.resize_in_place(block.cast(), 512) }.unwrap();
        assert_eq!(resized.cast::<u8>().as_ptr(), addr);
        assert_eq!(resized.len(), 512);

        unsafe { heap.free(resized.cast()) };
    }

    #[test]
    fn test_resize_in_place_grow_or_fail() {
        let heap = Heap::new();

        let block = heap.malloc(1000).unwrap();
        let addr = block.cast::<u8>().as_ptr();
        unsafe { addr.write_bytes(0x5A, 1000) };

        match unsafe { heap.resize_in_place(block.cast(), 2000) } {
            Some(grown) => {
                assert_eq!(grown.cast::<u8>().as_ptr(), addr);
                assert_eq!(grown.len(), 2000);
                unsafe { heap.free(grown.cast()) };
            }
            None => {
                // Original block is untouched on failure.
                unsafe {
                    for i in 0..1000 {
                        assert_eq!(*addr.add(i), 0x5A);
                    }
                    heap.free(block.cast());
                }
            }
        }
    }

    #[test]
    fn test_realloc_preserves_contents() {
        let heap = Heap::new();

        let block = heap.malloc(1000).unwrap();
        let p = block.cast::<u8>().as_ptr();
        unsafe {
            for i in 0..1000 {
                *p.add(i) = (i % 251) as u8;
            }
        }

        let grown = unsafe { heap.realloc(block.cast(), 2000) }.unwrap();
        assert_eq!(grown.len(), 2000);
        unsafe {
            let q = grown.cast::<u8>().as_ptr();
            for i in 0..1000 {
                assert_eq!(*q.add(i), (i % 251) as u8);
            }
            heap.free(grown.cast());
        }
    }

    #[test]
    fn test_owns() {
        let heap = Heap::new();
        let other = Heap::new();

        let block = heap.malloc(32).unwrap();
        let p = block.cast::<u8>().as_ptr();

        assert!(heap.owns(p));
        assert!(!other.owns(p));
        assert!(check_owned(p));

        unsafe { heap.free(block.cast()) };
        other.teardown(Teardown::Delete);
    }

    #[test]
    fn test_teardown_destroy_leaves_backing_usable() {
        let heap = Heap::new();
        let _a = heap.malloc(128).unwrap();
        let _b = heap.malloc(4096).unwrap();

        // Destroy frees both blocks in bulk.
        heap.teardown(Teardown::Destroy);

        let backing = Heap::backing();
        let block = backing.malloc(1).unwrap();
        unsafe { backing.free(block.cast()) };
    }

    #[test]
    fn test_teardown_delete_keeps_allocations_valid() {
        let heap = Heap::new();
        let block = heap.malloc(64).unwrap();
        let p = block.cast::<u8>().as_ptr();
        unsafe { p.write_bytes(0x77, 64) };

        heap.teardown(Teardown::Delete);

        // The block migrated to the general pool and is still live.
        unsafe {
            for i in 0..64 {
                assert_eq!(*p.add(i), 0x77);
            }
            ffi::mi_free(p.cast());
        }
    }

    #[test]
    #[should_panic(expected = "cannot be torn down")]
    fn test_backing_teardown_panics() {
        Heap::backing().teardown(Teardown::Delete);
    }

    #[test]
    fn test_current_default_initially_backing() {
        assert!(Heap::current_default().is_backing());
    }

    #[test]
    fn test_set_as_default_routes_thread_allocations() {
        let heap = Heap::new();
        heap.set_as_default();

        let current = Heap::current_default();
        assert_eq!(current.as_raw(), heap.as_raw());

        // Restore before the heap goes away.
        Heap::backing().set_as_default();
        heap.teardown(Teardown::Delete);
        assert!(Heap::current_default().is_backing());
    }

    #[test]
    fn test_collect_is_safe_anytime() {
        let heap = Heap::new();
        let block = heap.malloc(512).unwrap();
        heap.collect(false);
        heap.collect(true);
        unsafe { heap.free(block.cast()) };
        heap.collect(true);
    }

    #[test]
    fn test_good_size_rounds_up() {
        assert!(good_size(100) >= 100);
        assert!(good_size(1) >= 1);
    }

    #[cfg(not(feature = "minimal"))]
    #[test]
    fn test_handle_stats() {
        let heap = Heap::new();
        assert_eq!(heap.allocation_count(), 0);

        let block = heap.malloc(100).unwrap();
        assert_eq!(heap.allocation_count(), 1);
        assert!(heap.allocated_bytes() >= 100);

        unsafe { heap.free(block.cast()) };
        assert_eq!(heap.allocation_count(), 0);
        assert_eq!(heap.allocated_bytes(), 0);
    }
}
