//! Real-world chain benchmarks.
//!
//! These model a synth's gain and pitch chains with a typical mix of
//! velocity, envelopes, and LFOs across many voices.

mod mono;
mod voices;

pub use mono::bench_mono;
pub use voices::bench_voices;
