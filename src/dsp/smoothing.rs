//! Smoothing of per-voice constant values between blocks.

/*
Constant-Value Smoothing
========================

Voice-start sources (velocity, key number, random) produce one value per
voice. Usually that value never changes while the voice plays, but it can:
a source gets bypassed, its intensity is moved, or a new source is added.
Jumping straight to the new value would click, so when the jump is larger
than SMOOTHING_THRESHOLD the block starts at the old value and ramps towards
the new one:

    prev ●
          ╲
           ╲            (one control-rate block)
            ╲
             ●──── next block starts at `current`

    out[i] = previous + i * (current - previous) / n

Small changes are filled directly; they are below what the ear resolves at
control rate and ramping them would waste the cheap "constant" path.
*/

/// Changes larger than this between blocks are ramped instead of stepped.
pub const SMOOTHING_THRESHOLD: f32 = 0.01;

#[inline]
pub fn needs_smoothing(previous: f32, current: f32) -> bool {
    (previous - current).abs() > SMOOTHING_THRESHOLD
}

/// Fill `out` with `current`, ramping from `previous` if the jump is audible.
///
/// Returns true if a ramp was written.
pub fn fill_constant(out: &mut [f32], previous: f32, current: f32) -> bool {
    if out.is_empty() {
        return false;
    }

    if !needs_smoothing(previous, current) {
        out.fill(current);
        return false;
    }

    let delta = (current - previous) / out.len() as f32;
    let mut value = previous;

    for sample in out.iter_mut() {
        *sample = value;
        value += delta;
    }

    true
}
