//! Intensity scaling and combination math for gain and pitch modulation.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Gain Mode vs Pitch Mode
=======================

Every modulation source produces a normalized value in [0.0, 1.0]. How that
value turns into "modulation" depends on what the chain drives.

Vocabulary
----------

  intensity     How strongly a source affects the result. In gain mode it
                is a 0..1 blend amount, in pitch mode it is a signed range
                where ±1.0 means ±12 semitones.

  bipolar       The source swings around its center: 0.5 means "no change".
                Converted with v' = 2v - 1 before scaling (pitch mode only).

  pitch factor  A frequency multiplier: 1.0 = unchanged, 2.0 = one octave up.


Gain Mode (multiplicative)
--------------------------

A source at intensity i blends between "no effect" (1.0) and its own value:

    gain(v, i) = (1 - i) + i * v

    i = 0.0  →  always 1.0 (source disabled)
    i = 1.0  →  exactly v
    i = 0.5  →  halfway between 1.0 and v

Sources are combined by multiplication, so a silent source (v = 0, i = 1)
silences the whole chain.


Pitch Mode (additive, then converted)
-------------------------------------

Pitch sources are summed in the normalized domain and then converted:

    x = Σ i_k * v_k              (v_k after the bipolar transform)
    factor = 2^x                 (x = 1.0 is +12 semitones)

Example: a bipolar source at 0.75 → 2 * 0.75 - 1 = 0.5 → with intensity 1.0
the sum is 0.5, which is +6 semitones → 2^(6/12) ≈ 1.4142.

Because 2^a * 2^b = 2^(a + b), a buffer of pitch factors can be built by
multiplying per-source factors together. That lets gain and pitch chains
share the same render loop: start from 1.0, multiply every source in.
*/

/// How a chain combines its sources.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModulationMode {
    /// Multiplicative combination of intensity-scaled values.
    #[default]
    Gain,
    /// Additive combination of normalized values, converted to a pitch factor.
    Pitch,
}

/// Convert unipolar signal (0.0 to 1.0) to bipolar (-1.0 to +1.0).
#[inline]
pub fn unipolar_to_bipolar(unipolar: f32) -> f32 {
    (unipolar * 2.0) - 1.0
}

/// Convert bipolar signal (-1.0 to +1.0) to unipolar (0.0 to 1.0).
#[inline]
pub fn bipolar_to_unipolar(bipolar: f32) -> f32 {
    (bipolar + 1.0) * 0.5
}

/// Gain intensity is a blend amount; values outside 0..1 are clamped so the
/// multiplier never exceeds 1.0.
#[inline]
pub fn gain_intensity(value: f32, intensity: f32) -> f32 {
    let intensity = intensity.clamp(0.0, 1.0);
    (1.0 - intensity) + intensity * value
}

#[inline]
pub fn pitch_intensity(value: f32, intensity: f32) -> f32 {
    intensity * value
}

/// Normalized pitch range (±1.0 = ±12 semitones) to frequency multiplier.
#[inline]
pub fn normalized_to_pitch_factor(normalized: f32) -> f32 {
    normalized.exp2()
}

/// Frequency multiplier back to the normalized pitch range.
#[inline]
pub fn pitch_factor_to_normalized(factor: f32) -> f32 {
    factor.log2()
}

#[inline]
pub fn semitones_to_pitch_factor(semitones: f32) -> f32 {
    normalized_to_pitch_factor(semitones / 12.0)
}

impl ModulationMode {
    /// The value that leaves the target unchanged.
    #[inline]
    pub fn neutral(self) -> f32 {
        1.0
    }

    /// Scale a single normalized source value into the chain's domain.
    ///
    /// Gain mode returns a multiplier. Pitch mode returns the normalized
    /// (not yet converted) pitch offset so callers can sum before converting.
    #[inline]
    pub fn scale(self, value: f32, intensity: f32, bipolar: bool) -> f32 {
        match self {
            ModulationMode::Gain => gain_intensity(value, intensity),
            ModulationMode::Pitch => {
                let value = if bipolar {
                    unipolar_to_bipolar(value)
                } else {
                    value
                };
                pitch_intensity(value, intensity)
            }
        }
    }

    /// Fold a sequence of scaled values into one modulation value.
    pub fn combine<I>(self, scaled: I) -> f32
    where
        I: IntoIterator<Item = f32>,
    {
        match self {
            ModulationMode::Gain => scaled.into_iter().product(),
            ModulationMode::Pitch => normalized_to_pitch_factor(scaled.into_iter().sum()),
        }
    }

    /// Multiply the rendered source values in `source` into `target`.
    ///
    /// `source` holds raw normalized values; intensity, the bipolar
    /// transform, and the pitch conversion are applied per sample.
    pub fn apply_block(self, source: &[f32], target: &mut [f32], intensity: f32, bipolar: bool) {
        debug_assert_eq!(source.len(), target.len());

        match self {
            ModulationMode::Gain => {
                for (t, &s) in target.iter_mut().zip(source) {
                    *t *= gain_intensity(s, intensity);
                }
            }
            ModulationMode::Pitch => {
                for (t, &s) in target.iter_mut().zip(source) {
                    let s = if bipolar { unipolar_to_bipolar(s) } else { s };
                    *t *= normalized_to_pitch_factor(pitch_intensity(s, intensity));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_intensity_blends_towards_one() {
        assert!((gain_intensity(0.0, 0.0) - 1.0).abs() < 1e-6);
        assert!((gain_intensity(0.0, 1.0) - 0.0).abs() < 1e-6);
        assert!((gain_intensity(0.2, 0.5) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn negative_gain_intensity_never_boosts() {
        let mode = ModulationMode::Gain;
        assert!((mode.scale(0.0, -0.5, false) - 1.0).abs() < 1e-6);
        assert!((mode.scale(0.25, 1.5, false) - 0.25).abs() < 1e-6);

        let source = [0.0f32, 0.5, 1.0];
        let mut target = [1.0f32; 3];
        mode.apply_block(&source, &mut target, -1.0, false);
        assert!(target.iter().all(|&t| (t - 1.0).abs() < 1e-6));
    }

    #[test]
    fn gain_mode_multiplies() {
        let mode = ModulationMode::Gain;
        let combined = mode.combine([mode.scale(0.5, 1.0, false), mode.scale(0.8, 1.0, false)]);
        assert!((combined - 0.4).abs() < 1e-6);
    }

    #[test]
    fn pitch_mode_sums_then_converts() {
        let mode = ModulationMode::Pitch;
        let scaled = mode.scale(0.75, 1.0, true);
        assert!((scaled - 0.5).abs() < 1e-6);

        let factor = mode.combine([scaled]);
        assert!((factor - 2.0_f32.sqrt()).abs() < 1e-4);
        assert!((factor - semitones_to_pitch_factor(6.0)).abs() < 1e-6);
    }

    #[test]
    fn pitch_factor_roundtrip() {
        for &x in &[-1.0, -0.25, 0.0, 0.5, 1.0] {
            let back = pitch_factor_to_normalized(normalized_to_pitch_factor(x));
            assert!((back - x).abs() < 1e-5);
        }
    }

    #[test]
    fn pitch_block_matches_summed_conversion() {
        let mode = ModulationMode::Pitch;
        let a = [1.0f32; 4];
        let b = [0.75f32; 4];
        let mut target = [1.0f32; 4];

        mode.apply_block(&a, &mut target, 0.25, false);
        mode.apply_block(&b, &mut target, 1.0, true);

        let expected = normalized_to_pitch_factor(0.25 + 0.5);
        for &t in &target {
            assert!((t - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn bipolar_conversions() {
        assert!((unipolar_to_bipolar(0.5)).abs() < 1e-6);
        assert!((bipolar_to_unipolar(-1.0)).abs() < 1e-6);
        assert!((bipolar_to_unipolar(1.0) - 1.0).abs() < 1e-6);
    }
}
