//! Per-thread isolated heaps with bulk teardown.
//!
//! Each worker gets its own heap, fills it with scratch allocations, and
//! tears the whole thing down in one call instead of freeing block by
//! block.
//!
//! Run with: cargo run --example per_thread_heaps

use miheap::{Heap, Teardown};
use std::thread;

fn main() {
    let workers: Vec<_> = (0..4)
        .map(|id| {
            thread::spawn(move || {
                let heap = Heap::new();

                // Scratch space for this worker's batch. Nothing here is
                // freed individually.
                let mut total = 0usize;
                for i in 0..10_000 {
                    let len = 16 + (i % 240);
                    let block = heap.malloc(len).expect("out of memory");
                    unsafe { block.cast::<u8>().as_ptr().write_bytes(id as u8, len) };
                    total += len;
                }

                #[cfg(not(feature = "minimal"))]
                println!(
                    "worker {id}: {} blocks, {} bytes held",
                    heap.allocation_count(),
                    heap.allocated_bytes(),
                );

                heap.teardown(Teardown::Destroy);
                total
            })
        })
        .collect();

    let grand_total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    println!("allocated and bulk-freed {grand_total} bytes across 4 workers");
}
