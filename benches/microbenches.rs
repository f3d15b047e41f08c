//! Criterion microbenches for the evaluation hot paths.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - IoU computation between normalized boxes
//! - greedy box-set matching at evaluation corpus sizes

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use defectcheck::bbox::{iou, rotate_90_clockwise, BoundingBox};
use defectcheck::matching::match_box_sets;

/// Deterministic spread of boxes across the unit square.
fn grid_boxes(count: usize) -> Vec<BoundingBox> {
    (0..count)
        .map(|i| {
            let t = i as f64 / count as f64;
            BoundingBox::new(0, 0.1 + 0.8 * t, 0.9 - 0.8 * t, 0.05 + 0.1 * t, 0.15 - 0.1 * t)
        })
        .collect()
}

/// Benchmark single-pair IoU.
fn bench_iou(c: &mut Criterion) {
    let a = BoundingBox::new(0, 0.45, 0.5, 0.3, 0.3);
    let b = BoundingBox::new(0, 0.55, 0.5, 0.3, 0.3);

    c.bench_function("iou_pair", |bench| {
        bench.iter(|| black_box(iou(black_box(&a), black_box(&b))))
    });
}

/// Benchmark greedy set matching at typical per-image detection counts.
fn bench_match_box_sets(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_box_sets");

    for size in [4usize, 16, 64] {
        let set_a = grid_boxes(size);
        let set_b = grid_boxes(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("n{size}"), |bench| {
            bench.iter(|| black_box(match_box_sets(black_box(&set_a), black_box(&set_b), 0.3)))
        });
    }

    group.finish();
}

/// Benchmark the rotation transform over a detection set.
fn bench_rotation(c: &mut Criterion) {
    let boxes = grid_boxes(64);

    c.bench_function("rotate_90_clockwise_n64", |bench| {
        bench.iter(|| black_box(rotate_90_clockwise(black_box(&boxes))))
    });
}

criterion_group!(benches, bench_iou, bench_match_box_sets, bench_rotation);
criterion_main!(benches);
