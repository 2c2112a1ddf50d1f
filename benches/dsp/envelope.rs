//! Benchmarks for the control-rate ADSR.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_modchain::{
    dsp::envelope::{EnvelopeShape, EnvelopeState},
    CONTROL_RATE_DOWNSAMPLING,
};

use crate::BLOCK_SIZES;

const CONTROL_RATE: f32 = 48_000.0 / CONTROL_RATE_DOWNSAMPLING as f32;

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/envelope");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size / CONTROL_RATE_DOWNSAMPLING];

        // Attack phase (ramping up)
        let shape = EnvelopeShape::adsr(1.0, 0.1, 0.7, 0.3);
        let mut env = EnvelopeState::default();
        env.note_on();
        group.bench_with_input(BenchmarkId::new("attack", size), &size, |b, _| {
            b.iter(|| env.render(black_box(&mut buffer), &shape, CONTROL_RATE))
        });

        // Sustain phase (holding steady)
        let shape = EnvelopeShape::adsr(0.001, 0.001, 0.7, 0.3);
        let mut env = EnvelopeState::default();
        env.note_on();
        for _ in 0..200 {
            env.tick(&shape, CONTROL_RATE);
        }
        group.bench_with_input(BenchmarkId::new("sustain", size), &size, |b, _| {
            b.iter(|| env.render(black_box(&mut buffer), &shape, CONTROL_RATE))
        });
    }

    group.finish();
}
