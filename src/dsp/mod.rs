//! Low-level DSP primitives used by the modulation chain.
//!
//! These components are allocation-free once sized and realtime-safe. They
//! stay focused on the math (ramps, intensity, envelopes) so the chain can
//! layer orchestration on top.

/// SIMD-aligned storage for voice, mono, and scratch values.
pub mod buffer;
/// Attack/decay/sustain/release state machine at control rate.
pub mod envelope;
/// Control-rate to audio-rate ramp expansion.
pub mod expansion;
/// Gain and pitch intensity, and the pitch-factor transform.
pub mod intensity;
/// Ramping between per-block constant values.
pub mod smoothing;

pub use envelope::EnvelopeState;
pub use intensity::ModulationMode;
