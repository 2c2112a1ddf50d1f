use crate::MIN_TIME;

/*
Control-Rate ADSR
=================

The envelope used by envelope sources. Same linear state machine as a
classic ADSR, but it is advanced once per control-rate tick rather than
once per audio sample, so `rate` is the control rate (sample_rate / K).

    Level
      1.0 ┐     ╱╲
          │    ╱  ╲___________
      S   │   ╱               ╲
          │  ╱                 ╲
      0.0 └─╱───────────────────╲──→ Time
          Attack Decay  Sustain  Release

    Idle ──gate on──→ Attack ──1.0──→ Decay ──S──→ Sustain
      ↑                  │              │             │
      │                  └──gate off────┴─────────────┘
      │                                 ↓
      └─────────── level = 0 ──── Release

Gate off releases from the CURRENT level, not from the sustain level, so a
key released during the attack does not jump.

A "simple" envelope is the same machine with decay skipped and sustain
pinned to 1.0: attack up, hold, release down.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Envelope shape, shared by every voice of a source.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeShape {
    pub attack: f32,  // seconds 0 → 1
    pub decay: f32,   // seconds 1 → sustain
    pub sustain: f32, // 0.0 - 1.0
    pub release: f32, // seconds current → 0
}

impl EnvelopeShape {
    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(MIN_TIME),
            decay: decay.max(MIN_TIME),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(MIN_TIME),
        }
    }

    pub fn attack_release(attack: f32, release: f32) -> Self {
        Self::adsr(attack, MIN_TIME, 1.0, release)
    }
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        Self::adsr(0.01, 0.1, 0.7, 0.3)
    }
}

/// Runtime state of one envelope instance (one voice, or the shared
/// monophonic slot).
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeState {
    stage: EnvelopeStage,
    level: f32,
    decay_start_level: f32,
    release_start_level: f32,
    release_total_ticks: u32,
    release_elapsed_ticks: u32,
}

impl Default for EnvelopeState {
    fn default() -> Self {
        Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            decay_start_level: 0.0,
            release_start_level: 0.0,
            release_total_ticks: 1,
            release_elapsed_ticks: 0,
        }
    }
}

impl EnvelopeState {
    /// Gate high: restart the attack from zero.
    pub fn note_on(&mut self) {
        self.level = 0.0;
        self.stage = EnvelopeStage::Attack;
        self.release_elapsed_ticks = 0;
    }

    /// Gate low: release from the current level.
    pub fn note_off(&mut self, shape: &EnvelopeShape, rate: f32) {
        if self.stage == EnvelopeStage::Idle {
            return;
        }

        self.release_start_level = self.level;
        self.release_total_ticks = (shape.release * rate).round().max(1.0) as u32;
        self.release_elapsed_ticks = 0;
        self.stage = EnvelopeStage::Release;
    }

    /// Advance by one control-rate tick and return the new level.
    pub fn tick(&mut self, shape: &EnvelopeShape, rate: f32) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }

            EnvelopeStage::Attack => {
                self.level += 1.0 / (shape.attack * rate);

                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.decay_start_level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }

            EnvelopeStage::Decay => {
                let target = shape.sustain;
                let total_drop = self.decay_start_level - target;
                self.level -= total_drop / (shape.decay * rate);

                if self.level <= target {
                    self.level = target;
                    self.stage = EnvelopeStage::Sustain;
                }
            }

            EnvelopeStage::Sustain => {
                self.level = shape.sustain;
            }

            EnvelopeStage::Release => {
                self.release_elapsed_ticks = self.release_elapsed_ticks.saturating_add(1);

                let progress =
                    self.release_elapsed_ticks as f32 / self.release_total_ticks as f32;
                self.level = (self.release_start_level * (1.0 - progress)).max(0.0);

                if self.release_elapsed_ticks >= self.release_total_ticks {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }

        debug_assert!((0.0..=1.0).contains(&self.level));
        self.level
    }

    /// Render one tick per output slot.
    pub fn render(&mut self, out: &mut [f32], shape: &EnvelopeShape, rate: f32) {
        for sample in out.iter_mut() {
            *sample = self.tick(shape, rate);
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }
}
