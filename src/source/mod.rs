//! Modulation sources and the wrapper the chain stores them in.
//!
//! A source is one of three kinds. Voice-start sources produce a single value
//! per voice when it starts. Envelopes render one ramp per voice (or one
//! shared ramp in monophonic mode). Time-variant sources render one ramp per
//! block that every voice shares.
//!
//! Sources only produce normalized values in `[0, 1]`. Intensity, the bipolar
//! transform, and gain/pitch combination are applied by [`Modulator`] so that
//! every source type gets them for free.

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dsp::intensity::ModulationMode;

/// Envelope sources (ADSR, attack/release).
pub mod envelope;
/// Name-based construction of sources.
pub mod factory;
/// Sources shared by all voices (LFO, controller follower).
pub mod time_variant;
/// Sources that produce one value per voice start.
pub mod voice_start;

/// The closed set of source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    VoiceStart,
    Envelope,
    TimeVariant,
}

/// Note information handed to sources when a voice starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteInfo {
    pub note: u8,
    pub velocity: u8,
}

impl NoteInfo {
    pub fn new(note: u8, velocity: u8) -> Self {
        Self { note, velocity }
    }
}

/// Common interface for every modulation source.
///
/// `prepare`, voice events, and `render` run on the audio thread and must not
/// allocate. Size per-voice storage in the constructor.
pub trait ModulationSource: Send {
    fn kind(&self) -> SourceKind;

    /// Identifier the source was created under (see [`factory`]).
    fn type_name(&self) -> &'static str;

    /// Number of voice slots this source keeps state for, or `None` if it
    /// has no per-voice state.
    fn num_voices(&self) -> Option<usize>;

    /// Called with the control rate (sample rate / K) before rendering.
    fn prepare(&mut self, _control_rate: f32) {}

    /// A voice started. Returns the source's normalized value at the start.
    fn start_voice(&mut self, voice: usize, note: NoteInfo) -> f32;

    fn stop_voice(&mut self, _voice: usize) {}

    fn reset_voice(&mut self, _voice: usize) {}

    /// Cached per-voice value of a voice-start source.
    fn voice_start_value(&self, _voice: usize) -> f32 {
        1.0
    }

    /// Render `out.len()` control-rate values for `voice`.
    ///
    /// Time-variant sources ignore `voice`; so do envelopes in monophonic mode.
    fn render(&mut self, _voice: usize, out: &mut [f32]) {
        out.fill(1.0);
    }

    fn is_playing(&self, _voice: usize) -> bool {
        false
    }

    /// MIDI continuous controller input.
    fn handle_controller(&mut self, _number: u8, _value: u8) {}

    fn is_monophonic(&self) -> bool {
        false
    }

    /// Switch an envelope between per-voice and shared state.
    ///
    /// Returns false if the source has no monophonic mode.
    fn set_monophonic(&mut self, _monophonic: bool) -> bool {
        false
    }
}

/// Stable handle used to address a source inside a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u32);

static NEXT_SOURCE_ID: AtomicU32 = AtomicU32::new(1);

impl SourceId {
    fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-source settings applied when wrapping a source into a [`Modulator`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceSettings {
    /// Gain mode: 0..1 blend. Pitch mode: ±1.0 = ±12 semitones.
    pub intensity: f32,
    /// Treat 0.5 as center (pitch mode only).
    pub bipolar: bool,
    /// Start envelopes in monophonic mode.
    pub monophonic: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            bipolar: false,
            monophonic: false,
        }
    }
}

/// A source plus the per-source state the chain needs: identity, intensity,
/// polarity, bypass, and the last voice it was started for.
pub struct Modulator {
    id: SourceId,
    source: Box<dyn ModulationSource>,
    intensity: f32,
    bipolar: bool,
    bypassed: bool,
    last_started_voice: Option<usize>,
}

impl fmt::Debug for Modulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modulator")
            .field("id", &self.id)
            .field("type_name", &self.source.type_name())
            .field("kind", &self.source.kind())
            .field("intensity", &self.intensity)
            .field("bipolar", &self.bipolar)
            .field("bypassed", &self.bypassed)
            .field("monophonic", &self.source.is_monophonic())
            .finish()
    }
}

impl Modulator {
    pub fn new(source: Box<dyn ModulationSource>) -> Self {
        Self::with_settings(source, SourceSettings::default())
    }

    pub fn with_settings(mut source: Box<dyn ModulationSource>, settings: SourceSettings) -> Self {
        if settings.monophonic {
            source.set_monophonic(true);
        }

        Self {
            id: SourceId::next(),
            source,
            intensity: settings.intensity.clamp(-1.0, 1.0),
            bipolar: settings.bipolar,
            bypassed: false,
            last_started_voice: None,
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub fn type_name(&self) -> &'static str {
        self.source.type_name()
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Takes effect from the next block; voice-start values are re-smoothed.
    /// Stored as -1..1; gain chains use only the 0..1 part.
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity.clamp(-1.0, 1.0);
    }

    pub fn is_bipolar(&self) -> bool {
        self.bipolar
    }

    pub fn set_bipolar(&mut self, bipolar: bool) {
        self.bipolar = bipolar;
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn is_monophonic(&self) -> bool {
        self.source.is_monophonic()
    }

    pub fn last_started_voice(&self) -> Option<usize> {
        self.last_started_voice
    }

    pub fn source(&self) -> &dyn ModulationSource {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn ModulationSource {
        self.source.as_mut()
    }

    pub(crate) fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    pub(crate) fn set_monophonic(&mut self, monophonic: bool) -> bool {
        self.source.set_monophonic(monophonic)
    }

    /// Start a voice and return the raw normalized start value.
    pub(crate) fn start_voice(&mut self, voice: usize, note: NoteInfo) -> f32 {
        self.last_started_voice = Some(voice);
        self.source.start_voice(voice, note)
    }

    /// The voice-start value scaled into the chain's domain.
    #[inline]
    pub(crate) fn scaled_voice_value(&self, voice: usize, mode: ModulationMode) -> f32 {
        mode.scale(self.source.voice_start_value(voice), self.intensity, self.bipolar)
    }

    /// Scale an arbitrary normalized value into the chain's domain.
    #[inline]
    pub(crate) fn scale(&self, value: f32, mode: ModulationMode) -> f32 {
        mode.scale(value, self.intensity, self.bipolar)
    }

    /// Render into `scratch` and multiply the result into `target`.
    ///
    /// Both slices cover the same control-rate window.
    pub(crate) fn render_into(
        &mut self,
        voice: usize,
        mode: ModulationMode,
        target: &mut [f32],
        scratch: &mut [f32],
    ) {
        let scratch = &mut scratch[..target.len()];
        self.source.render(voice, scratch);
        mode.apply_block(scratch, target, self.intensity, self.bipolar);
    }
}
