//! Benchmarks for control-rate to audio-rate expansion.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_modchain::{dsp::expansion::expand_in_place, CONTROL_RATE_DOWNSAMPLING};

use crate::BLOCK_SIZES;

pub fn bench_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/expansion");

    for &size in BLOCK_SIZES {
        let coarse = size / CONTROL_RATE_DOWNSAMPLING;
        let mut data = vec![0.0f32; size];
        let mut temp = vec![0.0f32; coarse];

        // Moving values: every mini-ramp is written.
        group.bench_with_input(BenchmarkId::new("ramp", size), &size, |b, _| {
            b.iter(|| {
                for (i, v) in data[..coarse].iter_mut().enumerate() {
                    *v = i as f32 / coarse as f32;
                }
                let mut ramp = 1.0;
                expand_in_place(black_box(&mut data), &mut temp, 0, size, &mut ramp)
            })
        });

        // Flat values: detected and skipped.
        group.bench_with_input(BenchmarkId::new("flat", size), &size, |b, _| {
            b.iter(|| {
                data[..coarse].fill(0.5);
                let mut ramp = 0.5;
                expand_in_place(black_box(&mut data), &mut temp, 0, size, &mut ramp)
            })
        });
    }

    group.finish();
}
