use crate::{
    dsp::envelope::{EnvelopeShape, EnvelopeState},
    source::{ModulationSource, NoteInfo, SourceKind},
    DEFAULT_CONTROL_RATE,
};

/*
Envelope Sources
================

An envelope renders one ramp per voice. Each voice slot owns an
`EnvelopeState`; the shape (attack/decay/sustain/release) is shared.

Monophonic mode swaps the per-voice states for one shared state:

  keys held   0 → 1    retrigger (attack from zero)
  keys held   n → n+1  keep going (legato)
  keys held   1 → 0    release

A voice counts as held between its start and its stop or reset. Starting a
voice that is already held, or stopping one that is not, leaves the count
alone.

While monophonic, `render` ignores the voice index, so the chain can render
it once per block into the shared buffer.
*/

pub struct EnvelopeSource {
    type_name: &'static str,
    shape: EnvelopeShape,
    voices: Box<[EnvelopeState]>,
    held: Box<[bool]>,
    mono_state: EnvelopeState,
    monophonic: bool,
    held_keys: u32,
    control_rate: f32,
}

impl EnvelopeSource {
    fn with_shape(type_name: &'static str, num_voices: usize, shape: EnvelopeShape) -> Self {
        Self {
            type_name,
            shape,
            voices: vec![EnvelopeState::default(); num_voices].into_boxed_slice(),
            held: vec![false; num_voices].into_boxed_slice(),
            mono_state: EnvelopeState::default(),
            monophonic: false,
            held_keys: 0,
            control_rate: DEFAULT_CONTROL_RATE,
        }
    }

    pub fn adsr(num_voices: usize, shape: EnvelopeShape) -> Self {
        Self::with_shape("Adsr", num_voices, shape)
    }

    /// Attack/release only; holds full level while the key is down.
    pub fn simple(num_voices: usize, attack: f32, release: f32) -> Self {
        Self::with_shape(
            "SimpleEnvelope",
            num_voices,
            EnvelopeShape::attack_release(attack, release),
        )
    }

    pub fn shape(&self) -> &EnvelopeShape {
        &self.shape
    }

    /// Applies to notes already sounding from the next tick on.
    pub fn set_shape(&mut self, shape: EnvelopeShape) {
        self.shape = shape;
    }

    pub fn held_keys(&self) -> u32 {
        self.held_keys
    }

    /// Mark `voice` as held or released. Returns true if that changed.
    fn set_held(&mut self, voice: usize, held: bool) -> bool {
        let Some(slot) = self.held.get_mut(voice) else {
            return false;
        };

        if *slot == held {
            return false;
        }

        *slot = held;
        if held {
            self.held_keys += 1;
        } else {
            self.held_keys = self.held_keys.saturating_sub(1);
        }
        true
    }

    fn state(&self, voice: usize) -> Option<&EnvelopeState> {
        if self.monophonic {
            Some(&self.mono_state)
        } else {
            self.voices.get(voice)
        }
    }

    fn state_mut(&mut self, voice: usize) -> Option<&mut EnvelopeState> {
        if self.monophonic {
            Some(&mut self.mono_state)
        } else {
            self.voices.get_mut(voice)
        }
    }
}

impl ModulationSource for EnvelopeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Envelope
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn num_voices(&self) -> Option<usize> {
        Some(self.voices.len())
    }

    fn prepare(&mut self, control_rate: f32) {
        self.control_rate = control_rate;
    }

    fn start_voice(&mut self, voice: usize, _note: NoteInfo) -> f32 {
        if self.monophonic {
            if self.set_held(voice, true) && self.held_keys == 1 {
                self.mono_state.note_on();
            }
            return self.mono_state.level();
        }

        match self.voices.get_mut(voice) {
            Some(state) => {
                state.note_on();
                state.level()
            }
            None => 0.0,
        }
    }

    fn stop_voice(&mut self, voice: usize) {
        let (shape, rate) = (self.shape, self.control_rate);

        if self.monophonic {
            if self.set_held(voice, false) && self.held_keys == 0 {
                self.mono_state.note_off(&shape, rate);
            }
            return;
        }

        if let Some(state) = self.voices.get_mut(voice) {
            state.note_off(&shape, rate);
        }
    }

    fn reset_voice(&mut self, voice: usize) {
        if self.monophonic {
            self.set_held(voice, false);
            // Other keys may still hold the shared state.
            if self.held_keys == 0 {
                self.mono_state.reset();
            }
            return;
        }

        if let Some(state) = self.voices.get_mut(voice) {
            state.reset();
        }
    }

    fn render(&mut self, voice: usize, out: &mut [f32]) {
        let (shape, rate) = (self.shape, self.control_rate);

        match self.state_mut(voice) {
            Some(state) => state.render(out, &shape, rate),
            None => out.fill(0.0),
        }
    }

    fn is_playing(&self, voice: usize) -> bool {
        self.state(voice).is_some_and(EnvelopeState::is_active)
    }

    fn is_monophonic(&self) -> bool {
        self.monophonic
    }

    fn set_monophonic(&mut self, monophonic: bool) -> bool {
        if self.monophonic != monophonic {
            self.monophonic = monophonic;
            self.held_keys = 0;
            self.held.fill(false);
            self.mono_state.reset();
            self.voices.iter_mut().for_each(EnvelopeState::reset);
        }
        true
    }
}
