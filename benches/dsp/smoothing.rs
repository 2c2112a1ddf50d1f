//! Benchmarks for constant-value smoothing.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_modchain::{dsp::smoothing::fill_constant, CONTROL_RATE_DOWNSAMPLING};

use crate::BLOCK_SIZES;

pub fn bench_smoothing(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/smoothing");

    for &size in BLOCK_SIZES {
        let mut window = vec![0.0f32; size / CONTROL_RATE_DOWNSAMPLING];

        group.bench_with_input(BenchmarkId::new("fill", size), &size, |b, _| {
            b.iter(|| fill_constant(black_box(&mut window), 0.5, black_box(0.505)))
        });

        group.bench_with_input(BenchmarkId::new("ramp", size), &size, |b, _| {
            b.iter(|| fill_constant(black_box(&mut window), 0.5, black_box(0.9)))
        });
    }

    group.finish();
}
