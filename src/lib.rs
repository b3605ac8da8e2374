//! # miheap
//!
//! Isolated per-thread mimalloc heaps with bulk teardown for Rust.
//!
//! ## Features
//!
//! - [`Heap`]: isolated allocation arenas over the mimalloc engine
//! - Bulk teardown: destroy a heap and every allocation in it at once
//! - Thread affinity enforced at compile time for safe code, and by a
//!   registry of owning threads in debug builds for `unsafe` interop
//! - [`DefaultAlloc`]: a drop-in `#[global_allocator]` backed by each
//!   thread's current default heap
//! - `GlobalAlloc` backends on stable, `std::alloc::Allocator` backends
//!   behind the `nightly` feature
//! - Heap redirection: [`Heap::set_as_default`] routes a thread's generic
//!   allocations to an isolated heap
//! - Allocation statistics (disable with the `minimal` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use miheap::{Alignment, Heap, Teardown};
//!
//! let heap = Heap::new();
//!
//! let block = heap.malloc_aligned(64, Alignment::new(16)).unwrap();
//! // ... use block ...
//! unsafe { heap.free_aligned(block.cast(), Alignment::new(16)) };
//!
//! // Or skip the frees entirely:
//! heap.teardown(Teardown::Destroy);
//! ```
//!
//! ## Thread affinity
//!
//! A heap must be created, used, and torn down by one thread. `Heap` is
//! `!Send`, so the compiler enforces this for safe code; heaps smuggled
//! across threads through raw pointers are caught by a debug-build check
//! on every operation. Cross-thread `free` of individual allocations is
//! fine at the engine level and needs no heap handle.

#![cfg_attr(feature = "nightly", feature(allocator_api))]

pub mod ffi;

mod align;
mod alloc;
mod heap;
#[cfg(not(feature = "minimal"))]
mod stats;

#[cfg(feature = "nightly")]
mod allocator_impl;

#[cfg(debug_assertions)]
mod debug;
#[cfg(debug_assertions)]
mod sync;

pub use align::Alignment;
pub use alloc::DefaultAlloc;
pub use heap::{check_owned, collect, good_size, usable_size, Heap, Teardown, SMALL_SIZE_MAX};

#[cfg(not(feature = "minimal"))]
pub use stats::{stats, AllocStats};
