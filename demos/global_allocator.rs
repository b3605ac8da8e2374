//! Installing miheap as the global allocator.
//!
//! Every allocation in the process goes through the calling thread's
//! current default heap; `set_as_default` redirects one thread's
//! allocations into an isolated heap.
//!
//! Run with: cargo run --example global_allocator

use miheap::{DefaultAlloc, Heap, Teardown};

#[global_allocator]
static ALLOC: DefaultAlloc = DefaultAlloc;

fn main() {
    // Ordinary collections now allocate from mimalloc.
    let v: Vec<u64> = (0..1000).collect();
    println!("vec of {} items, sum {}", v.len(), v.iter().sum::<u64>());

    // Route this thread's allocations into an isolated heap for a phase.
    let heap = Heap::new();
    heap.set_as_default();

    let scratch: Vec<String> = (0..100).map(|i| format!("item {i}")).collect();
    println!("scratch item: {}", scratch[99]);
    drop(scratch); // heap-owned memory must be freed before the heap goes away

    Heap::backing().set_as_default();
    heap.teardown(Teardown::Delete);

    #[cfg(not(feature = "minimal"))]
    {
        let stats = miheap::stats();
        println!(
            "{} allocations, peak {} bytes",
            stats.allocation_count, stats.peak_allocated,
        );
    }
}
