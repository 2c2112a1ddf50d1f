//! Control-rate to audio-rate expansion.

use crate::CONTROL_RATE_DOWNSAMPLING;

/*
Control-Rate Expansion
======================

Modulation sources are evaluated once every K audio samples (K is
`CONTROL_RATE_DOWNSAMPLING`). That keeps envelopes and LFOs cheap, but a
consumer multiplying audio by those values needs one value per sample.
Holding each coarse value for K samples would produce audible "zipper"
steps, so we expand by linear interpolation instead.

Vocabulary
----------

  coarse        One value per K audio samples (control rate).

  ramp start    The value the previous mini-ramp ended on. It is carried
                across blocks so consecutive blocks join without a jump.

  mini-ramp     K audio-rate samples moving linearly from the ramp start
                to the next coarse value.


The Shape
---------

    coarse:   r0        v0        v1        v2
               ●─────────●─────────●─────────●
    audio:    |. . . .  |. . . .  |. . . .  |
               K samples  K samples  K samples

Each coarse value becomes a mini-ramp of K samples with a constant delta:

    delta = (target - start) / K
    out[i] = start + delta * (i + 1)      for i in 0..K

so the last sample of every mini-ramp lands exactly on its coarse value and
the next mini-ramp starts from there.


No-Movement Fast Path
---------------------

Most of the time a modulation signal is flat (a sustained envelope, an idle
pitch wheel). If every coarse value in the window is within 0.001 of the
ramp start there is nothing to interpolate: we report "unchanged", leave the
destination untouched, and the caller keeps using a single scalar.


In-Place Layout
---------------

The chain stores control-rate values at the front of the same region the
audio-rate values will occupy (`start / K` vs `start`). Expanding in place
would overwrite coarse values before they are read, so the coarse window is
copied into a temp buffer first.
*/

/// Two values closer than this are treated as "no movement".
pub const EXPANSION_EPSILON: f32 = 0.001;

/// Returns true if every value in `data` stays within the no-movement window
/// around `ramp_start`.
#[inline]
pub fn is_flat(ramp_start: f32, data: &[f32]) -> bool {
    data.iter().all(|&v| (v - ramp_start).abs() < EXPANSION_EPSILON)
}

/// Write one mini-ramp per coarse value into `out`.
///
/// `out.len()` must be `control.len() * CONTROL_RATE_DOWNSAMPLING`.
#[inline]
fn write_ramps(control: &[f32], out: &mut [f32], ramp_start: &mut f32) {
    const RATIO: f32 = 1.0 / CONTROL_RATE_DOWNSAMPLING as f32;

    debug_assert_eq!(out.len(), control.len() * CONTROL_RATE_DOWNSAMPLING);

    for (&target, chunk) in control
        .iter()
        .zip(out.chunks_exact_mut(CONTROL_RATE_DOWNSAMPLING))
    {
        let start = *ramp_start;
        let delta = (target - start) * RATIO;

        for (i, sample) in chunk.iter_mut().enumerate() {
            *sample = start + delta * (i + 1) as f32;
        }

        // Pin the end exactly to the coarse value.
        chunk[CONTROL_RATE_DOWNSAMPLING - 1] = target;
        *ramp_start = target;
    }
}

/// Expand `control` (one value per K samples) into `out`.
///
/// Returns `true` if the values moved and `out` was written. Returns `false`
/// when the window is flat; `out` is untouched and `ramp_start` snaps to the
/// first coarse value.
pub fn expand(control: &[f32], out: &mut [f32], ramp_start: &mut f32) -> bool {
    if control.is_empty() {
        return false;
    }

    if is_flat(*ramp_start, control) {
        *ramp_start = control[0];
        return false;
    }

    write_ramps(control, out, ramp_start);
    true
}

/// Expand the control-rate values stored at `data[start / K..]` into the
/// audio-rate window `data[start..start + num_samples]`.
///
/// `temp` must hold at least `num_samples / K` values. `start_sample` and
/// `num_samples` must be multiples of `CONTROL_RATE_DOWNSAMPLING`.
pub fn expand_in_place(
    data: &mut [f32],
    temp: &mut [f32],
    start_sample: usize,
    num_samples: usize,
    ramp_start: &mut f32,
) -> bool {
    debug_assert_eq!(start_sample % CONTROL_RATE_DOWNSAMPLING, 0);
    debug_assert_eq!(num_samples % CONTROL_RATE_DOWNSAMPLING, 0);

    let start_cr = start_sample / CONTROL_RATE_DOWNSAMPLING;
    let num_cr = num_samples / CONTROL_RATE_DOWNSAMPLING;

    if num_cr == 0 {
        return false;
    }

    let control = &data[start_cr..start_cr + num_cr];

    if is_flat(*ramp_start, control) {
        *ramp_start = control[0];
        return false;
    }

    let temp = &mut temp[..num_cr];
    temp.copy_from_slice(control);

    write_ramps(temp, &mut data[start_sample..start_sample + num_samples], ramp_start);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: usize = CONTROL_RATE_DOWNSAMPLING;

    #[test]
    fn zero_length_window_is_a_noop() {
        let mut out = [7.0f32; 4];
        let mut ramp = 0.3;

        assert!(!expand(&[], &mut out, &mut ramp));
        assert_eq!(ramp, 0.3);
        assert!(out.iter().all(|&s| s == 7.0));
    }

    #[test]
    fn mini_ramps_end_on_coarse_values() {
        let control = [0.5, 1.0, 0.25];
        let mut out = vec![0.0; control.len() * K];
        let mut ramp = 0.0;

        assert!(expand(&control, &mut out, &mut ramp));

        for (i, &target) in control.iter().enumerate() {
            let last = out[(i + 1) * K - 1];
            assert!((last - target).abs() < 1e-6, "ramp {} ends at {}", i, last);
        }

        // First mini-ramp is linear from 0.0 with delta 0.5 / K.
        let delta = 0.5 / K as f32;
        for i in 0..K {
            assert!((out[i] - delta * (i + 1) as f32).abs() < 1e-6);
        }

        assert!((ramp - 0.25).abs() < 1e-6);
    }

    #[test]
    fn flat_window_is_unchanged_and_untouched() {
        let control = [0.5f32; 4];
        let mut out = vec![0.0; 4 * K];
        let mut ramp = 0.0;

        assert!(expand(&control, &mut out, &mut ramp));
        assert!((ramp - 0.5).abs() < 1e-6);

        // Second pass over the same coarse data: nothing moves.
        out.fill(-1.0);
        assert!(!expand(&control, &mut out, &mut ramp));
        assert!(out.iter().all(|&s| s == -1.0));
    }

    #[test]
    fn small_jitter_counts_as_flat() {
        let control = [0.5, 0.5004, 0.4998];
        let mut out = vec![0.0; 3 * K];
        let mut ramp = 0.5;

        assert!(!expand(&control, &mut out, &mut ramp));
        assert_eq!(ramp, 0.5);
    }

    #[test]
    fn in_place_expansion_reads_coarse_before_writing() {
        let mut data = vec![0.0f32; 64];
        let mut temp = vec![0.0f32; 8];

        // Window starts at sample 2K, so the coarse values live at [2..4].
        data[2] = 1.0;
        data[3] = 0.0;

        let mut ramp = 0.0;
        assert!(expand_in_place(&mut data, &mut temp, 2 * K, 2 * K, &mut ramp));

        assert!((data[3 * K - 1] - 1.0).abs() < 1e-6);
        assert!((data[4 * K - 1] - 0.0).abs() < 1e-6);
        assert!(ramp.abs() < 1e-6);
    }
}
