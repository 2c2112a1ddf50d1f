use crate::source::{ModulationSource, NoteInfo, SourceKind};

/*
Voice-Start Sources
===================

These sources are evaluated exactly once per voice, at note-on, and hold
their value for the rest of the voice's life:

  Constant    a fixed value (default 1.0); useful as a trim
  Velocity    velocity / 127
  KeyNumber   note number / 127
  Random      a uniform random value per voice

They never render per sample. The chain folds them into one per-voice
constant and only pays for them again if the constant changes.
*/

#[derive(Debug, Clone)]
pub enum VoiceStartGenerator {
    Constant(f32),
    Velocity,
    KeyNumber,
    Random(fastrand::Rng),
}

pub struct VoiceStartSource {
    type_name: &'static str,
    generator: VoiceStartGenerator,
    values: Box<[f32]>,
}

impl VoiceStartSource {
    fn with_generator(
        type_name: &'static str,
        num_voices: usize,
        generator: VoiceStartGenerator,
    ) -> Self {
        let initial = match generator {
            VoiceStartGenerator::Constant(value) => value,
            _ => 1.0,
        };

        Self {
            type_name,
            generator,
            values: vec![initial; num_voices].into_boxed_slice(),
        }
    }

    pub fn constant(num_voices: usize, value: f32) -> Self {
        Self::with_generator(
            "Constant",
            num_voices,
            VoiceStartGenerator::Constant(value.clamp(0.0, 1.0)),
        )
    }

    pub fn velocity(num_voices: usize) -> Self {
        Self::with_generator("Velocity", num_voices, VoiceStartGenerator::Velocity)
    }

    pub fn key_number(num_voices: usize) -> Self {
        Self::with_generator("KeyNumber", num_voices, VoiceStartGenerator::KeyNumber)
    }

    pub fn random(num_voices: usize) -> Self {
        Self::with_generator(
            "Random",
            num_voices,
            VoiceStartGenerator::Random(fastrand::Rng::new()),
        )
    }

    /// Deterministic random source.
    pub fn random_with_seed(num_voices: usize, seed: u64) -> Self {
        Self::with_generator(
            "Random",
            num_voices,
            VoiceStartGenerator::Random(fastrand::Rng::with_seed(seed)),
        )
    }

    /// Change the value of a constant source. Applies to all voices; the
    /// chain smooths the jump on the next block.
    pub fn set_constant(&mut self, value: f32) {
        if let VoiceStartGenerator::Constant(v) = &mut self.generator {
            *v = value.clamp(0.0, 1.0);
            self.values.fill(*v);
        }
    }

    pub fn generator(&self) -> &VoiceStartGenerator {
        &self.generator
    }
}

impl ModulationSource for VoiceStartSource {
    fn kind(&self) -> SourceKind {
        SourceKind::VoiceStart
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn num_voices(&self) -> Option<usize> {
        Some(self.values.len())
    }

    fn start_voice(&mut self, voice: usize, note: NoteInfo) -> f32 {
        let value = match &mut self.generator {
            VoiceStartGenerator::Constant(value) => *value,
            VoiceStartGenerator::Velocity => note.velocity.min(127) as f32 / 127.0,
            VoiceStartGenerator::KeyNumber => note.note.min(127) as f32 / 127.0,
            VoiceStartGenerator::Random(rng) => rng.f32(),
        };

        if let Some(slot) = self.values.get_mut(voice) {
            *slot = value;
        }

        value
    }

    fn voice_start_value(&self, voice: usize) -> f32 {
        self.values.get(voice).copied().unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_is_normalized_per_voice() {
        let mut src = VoiceStartSource::velocity(4);
        src.start_voice(0, NoteInfo::new(60, 127));
        src.start_voice(1, NoteInfo::new(60, 0));

        assert!((src.voice_start_value(0) - 1.0).abs() < 1e-6);
        assert!(src.voice_start_value(1).abs() < 1e-6);
    }

    #[test]
    fn key_number_tracks_note() {
        let mut src = VoiceStartSource::key_number(2);
        let v = src.start_voice(1, NoteInfo::new(127, 64));
        assert!((v - 1.0).abs() < 1e-6);
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let mut a = VoiceStartSource::random_with_seed(2, 7);
        let mut b = VoiceStartSource::random_with_seed(2, 7);

        let va = a.start_voice(0, NoteInfo::new(60, 100));
        let vb = b.start_voice(0, NoteInfo::new(60, 100));
        assert_eq!(va, vb);
        assert!((0.0..1.0).contains(&va));
    }

    #[test]
    fn constant_change_updates_all_voices() {
        let mut src = VoiceStartSource::constant(3, 0.5);
        src.set_constant(0.8);
        for voice in 0..3 {
            assert!((src.voice_start_value(voice) - 0.8).abs() < 1e-6);
        }
    }

    #[test]
    fn out_of_range_voice_is_neutral() {
        let src = VoiceStartSource::constant(2, 0.3);
        assert_eq!(src.voice_start_value(5), 1.0);
    }
}
