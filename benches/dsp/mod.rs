//! Benchmarks for low-level modulation primitives.

mod envelope;
mod expansion;
mod smoothing;

pub use envelope::bench_envelope;
pub use expansion::bench_expansion;
pub use smoothing::bench_smoothing;
