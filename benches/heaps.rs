//! Benchmarks for miheap.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use miheap::{Alignment, Heap, Teardown};

fn bench_heap_alloc(c: &mut Criterion) {
    let heap = Heap::new();

    let mut group = c.benchmark_group("heap_allocation");

    group.bench_function("malloc_free_64b", |b| {
        b.iter(|| {
            let block = heap.malloc(black_box(64)).unwrap();
            black_box(block);
            unsafe { heap.free(block.cast()) };
        })
    });

    group.bench_function("malloc_small_free_64b", |b| {
        b.iter(|| {
            let block = heap.malloc_small(black_box(64)).unwrap();
            black_box(block);
            unsafe { heap.free(block.cast()) };
        })
    });

    group.bench_function("malloc_aligned_free_1kb_64", |b| {
        let align = Alignment::new(64);
        b.iter(|| {
            let block = heap.malloc_aligned(black_box(1024), align).unwrap();
            black_box(block);
            unsafe { heap.free_aligned(block.cast(), align) };
        })
    });

    group.finish();
}

fn bench_bulk_teardown(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_teardown");
    group.sample_size(20);

    // Destroying the heap versus freeing 1000 blocks one by one.
    group.bench_function("destroy_1000x256b", |b| {
        b.iter(|| {
            let heap = Heap::new();
            for _ in 0..1000 {
                black_box(heap.malloc(256).unwrap());
            }
            heap.teardown(Teardown::Destroy);
        })
    });

    group.bench_function("free_each_1000x256b", |b| {
        b.iter(|| {
            let heap = Heap::new();
            let blocks: Vec<_> = (0..1000).map(|_| heap.malloc(256).unwrap()).collect();
            for block in blocks {
                unsafe { heap.free(block.cast()) };
            }
            heap.teardown(Teardown::Delete);
        })
    });

    // Baseline: an arena allocator with the same bulk-free shape.
    group.bench_function("bumpalo_1000x256b", |b| {
        b.iter(|| {
            let bump = bumpalo::Bump::new();
            for _ in 0..1000 {
                black_box(bump.alloc_slice_fill_default::<u8>(256));
            }
            drop(bump);
        })
    });

    group.finish();
}

fn bench_resize(c: &mut Criterion) {
    let heap = Heap::new();

    let mut group = c.benchmark_group("resize");

    group.bench_function("realloc_grow_1kb_to_4kb", |b| {
        b.iter(|| {
            let block = heap.malloc(1024).unwrap();
            let grown = unsafe { heap.realloc(block.cast(), 4096) }.unwrap();
            black_box(grown);
            unsafe { heap.free(grown.cast()) };
        })
    });

    group.bench_function("shrink_in_place_4kb_to_1kb", |b| {
        b.iter(|| {
            let block = heap.malloc(4096).unwrap();
            let shrunk = unsafe { heap.resize_in_place(block.cast(), 1024) }.unwrap();
            black_box(shrunk);
            unsafe { heap.free(shrunk.cast()) };
        })
    });

    group.finish();
}

criterion_group!(benches, bench_heap_alloc, bench_bulk_teardown, bench_resize);
criterion_main!(benches);
