//! Tracks which thread owns each heap and catches cross-thread use.
//!
//! The engine documents heaps as thread-local; using one from another
//! thread is undefined behavior it does not detect. Safe code cannot get
//! there (`Heap` is `!Send`), so this registry exists to catch mistakes
//! made through the `unsafe` escape hatches, at the cost of a global lock
//! taken on every heap operation. Release builds compile all of this out.
//!
//! The map's storage comes from the process global allocator, never from
//! the heap being tracked, so registration cannot re-enter the heap under
//! test.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

use crate::ffi;
use crate::sync::mutex::Mutex;

struct Entry {
    thread: ThreadId,
    #[cfg(feature = "debug")]
    created_at: backtrace::Backtrace,
}

static REGISTRY: OnceLock<Mutex<HashMap<usize, Entry>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<usize, Entry>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Record the calling thread as the owner of a freshly created heap.
pub(crate) fn register(heap: *mut ffi::mi_heap_t) {
    let entry = Entry {
        thread: thread::current().id(),
        #[cfg(feature = "debug")]
        created_at: backtrace::Backtrace::new(),
    };
    let prev = registry().lock().insert(heap as usize, entry);
    assert!(prev.is_none(), "heap {heap:p} registered twice");
}

/// Drop the ownership record of a heap being torn down.
pub(crate) fn unregister(heap: *mut ffi::mi_heap_t) {
    let entry = registry().lock().remove(&(heap as usize));
    if let Some(entry) = entry {
        assert_eq!(
            entry.thread,
            thread::current().id(),
            "heap {heap:p} torn down on a thread other than its creator"
        );
    }
}

/// Verify the calling thread owns `heap` before an operation on it.
///
/// Untracked heaps (the borrowed singletons) pass unchecked.
pub(crate) fn check(heap: *mut ffi::mi_heap_t) {
    let map = registry().lock();
    let Some(entry) = map.get(&(heap as usize)) else {
        return;
    };

    let current = thread::current().id();
    if entry.thread != current {
        let owner = entry.thread;
        #[cfg(feature = "debug")]
        let created_at = format!("{:?}", entry.created_at);

        // Release the lock before unwinding.
        drop(map);

        #[cfg(feature = "debug")]
        panic!(
            "heap {heap:p} used on {current:?} but owned by {owner:?}\nheap created at:\n{created_at}"
        );
        #[cfg(not(feature = "debug"))]
        panic!("heap {heap:p} used on {current:?} but owned by {owner:?}");
    }
}
