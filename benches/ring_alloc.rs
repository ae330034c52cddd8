use std::alloc::Layout;
use std::collections::VecDeque;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ringbump::RingAlloc;

const OPS_PER_ITER: u64 = 10_000;

fn bytes(size: usize) -> Layout {
    Layout::from_size_align(size, 1).unwrap()
}

/// Hot path of a streaming consumer: push at the young edge, release at
/// the old edge, constant number of live blocks.
fn bench_sliding_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_alloc");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    for (label, size, window) in [
        ("slide_32B_win8", 32usize, 8usize),
        ("slide_256B_win8", 256, 8),
        ("slide_32B_win64", 32, 64),
    ] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut ring = RingAlloc::new();
                let mut live = VecDeque::with_capacity(window);
                for _ in 0..OPS_PER_ITER {
                    if live.len() == window {
                        let old = live.pop_front().unwrap();
                        unsafe { ring.free_left(black_box(old)) };
                    }
                    live.push_back(ring.alloc(bytes(black_box(size))).unwrap());
                }
                black_box(ring.count())
            })
        });
    }
    group.finish();
}

/// Burst fill followed by a newest-first drain.
fn bench_fill_then_lifo_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_alloc");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("fill_drain_64B", |b| {
        let mut blocks = Vec::with_capacity(OPS_PER_ITER as usize);
        b.iter(|| {
            let mut ring = RingAlloc::new();
            for _ in 0..OPS_PER_ITER {
                blocks.push(ring.alloc(bytes(64)).unwrap());
            }
            for block in blocks.drain(..).rev() {
                unsafe { ring.free_right(black_box(block)) };
            }
            black_box(ring.count())
        })
    });
    group.finish();
}

/// Alignment-heavy mix, exercising the padding and trailer paths.
fn bench_mixed_alignments(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_alloc");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("mixed_align_win16", |b| {
        b.iter(|| {
            let mut ring = RingAlloc::new();
            let mut live = VecDeque::with_capacity(16);
            for i in 0..OPS_PER_ITER {
                if live.len() == 16 {
                    let old = live.pop_front().unwrap();
                    unsafe { ring.free_left(old) };
                }
                let size = 8 + (i as usize % 120);
                let align = 1usize << (i % 6);
                let layout = Layout::from_size_align(size, align).unwrap();
                live.push_back(ring.alloc(black_box(layout)).unwrap());
            }
            black_box(ring.count())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_sliding_window,
    bench_fill_then_lifo_drain,
    bench_mixed_alignments
);
criterion_main!(benches);
