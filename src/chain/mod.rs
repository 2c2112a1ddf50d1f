//! The modulation chain: sources in, one combined value per voice out.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    dsp::{
        buffer::{ModBuffer, Regions},
        expansion::expand_in_place,
        intensity::ModulationMode,
        smoothing::fill_constant,
    },
    error::ChainError,
    source::{Modulator, NoteInfo, SourceId, SourceKind},
    CONTROL_RATE_DOWNSAMPLING, MAX_BLOCK_SIZE, MAX_SOURCES_PER_CHAIN, NUM_POLYPHONIC_VOICES,
};

pub mod command;
pub mod event;
pub mod registry;
pub mod voice;

#[cfg(feature = "rtrb")]
use command::{AudioLink, ChainCommand, ChainHandle, CommandReceiver};
use event::{ChainEvent, EventReceiver};
use registry::{ActiveFlags, ClassTags, Registry};
use voice::{ExpansionChecker, MonoRamp, VoiceData, VoiceRamp};

/*
Block Flow
==========

    render_block(start, n)
      │
      ├─ apply queued commands (barrier)
      ├─ mono = 1.0 × time-variants × mono envelopes     (control rate)
      └─ expand mono to audio rate (if it is read separately)

    render_voice(v, start, n)          once per active voice
      │
      ├─ constant: voice-start values, ramped if they jumped
      ├─ × poly envelopes
      ├─ × mono (if included)
      └─ expand to audio rate (if enabled)

A voice with nothing dynamic exposes no buffer; its value is the scalar from
`constant_value`. Expansion that finds a flat window does the same, so the
consumer can skip the per-sample multiply.

Everything from `render_block` down runs on the audio thread. Structural
changes reach it through the command queue and are applied at the top of
`render_block`, never mid-block.
*/

const K: usize = CONTROL_RATE_DOWNSAMPLING;

/// Whether the chain renders dynamic values at all.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainKind {
    #[default]
    Normal,
    /// Only voice-start sources; no buffers, one value per voice.
    VoiceStartOnly,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainOptions {
    /// Expand to audio rate right after rendering.
    pub expand_to_audio_rate: bool,
    /// Fold the monophonic values into every voice.
    pub include_monophonic_values: bool,
    /// Consumers promise not to write the voice values, so a voice with only
    /// monophonic modulation can alias the mono buffer instead of copying.
    pub voice_values_read_only: bool,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            expand_to_audio_rate: true,
            include_monophonic_values: true,
            voice_values_read_only: false,
        }
    }
}

pub struct ModulationChain {
    name: String,
    mode: ModulationMode,
    kind: ChainKind,
    options: ChainOptions,
    registry: Registry,
    buffer: ModBuffer,
    voices: Box<[VoiceRamp]>,
    sample_rate: f64,
    max_block_size: usize,
    voice_data: VoiceData,
    current_voice: usize,
    voice_expanded: bool,
    mono: MonoRamp,
    poly_checker: ExpansionChecker,
    mono_checker: ExpansionChecker,
    #[cfg(feature = "rtrb")]
    link: Option<AudioLink>,
}

impl ModulationChain {
    pub fn new(name: impl Into<String>, mode: ModulationMode, kind: ChainKind, num_voices: usize) -> Self {
        debug_assert!(num_voices <= NUM_POLYPHONIC_VOICES);

        Self {
            name: name.into(),
            mode,
            kind,
            options: ChainOptions::default(),
            registry: Registry::with_capacity(MAX_SOURCES_PER_CHAIN),
            buffer: ModBuffer::new(),
            voices: vec![VoiceRamp::default(); num_voices].into_boxed_slice(),
            sample_rate: 0.0,
            max_block_size: 0,
            voice_data: VoiceData::None,
            current_voice: 0,
            voice_expanded: false,
            mono: MonoRamp::default(),
            poly_checker: ExpansionChecker::default(),
            mono_checker: ExpansionChecker::default(),
            #[cfg(feature = "rtrb")]
            link: None,
        }
    }

    /// A chain plus the handle the control thread uses to change it while
    /// the chain runs on the audio thread.
    #[cfg(feature = "rtrb")]
    pub fn with_handle(
        name: impl Into<String>,
        mode: ModulationMode,
        kind: ChainKind,
        num_voices: usize,
    ) -> (Self, ChainHandle) {
        let mut chain = Self::new(name, mode, kind, num_voices);
        let (link, handle) = command::channel(kind, num_voices);
        chain.link = Some(link);
        (chain, handle)
    }

    pub fn with_options(mut self, options: ChainOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ModulationMode {
        self.mode
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    pub fn options(&self) -> ChainOptions {
        self.options
    }

    pub fn set_expand_to_audio_rate(&mut self, expand: bool) {
        self.options.expand_to_audio_rate = expand;
    }

    pub fn set_include_monophonic_values(&mut self, include: bool) {
        self.options.include_monophonic_values = include;
    }

    pub fn set_voice_values_read_only(&mut self, read_only: bool) {
        self.options.voice_values_read_only = read_only;
    }

    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn is_prepared(&self) -> bool {
        self.sample_rate > 0.0
    }

    fn control_rate(&self) -> f32 {
        (self.sample_rate / K as f64) as f32
    }

    pub fn flags(&self) -> ActiveFlags {
        self.registry.flags()
    }

    pub fn any_active(&self) -> bool {
        self.registry.flags().any_active
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn source(&self, id: SourceId) -> Option<&Modulator> {
        self.registry.get(id)
    }

    /// Direct access to a source's parameters. Mono/poly switches and bypass
    /// must go through the chain so the classification stays in sync.
    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut Modulator> {
        self.registry.get_mut(id)
    }

    pub fn source_ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.registry.iter().map(Modulator::id)
    }

    pub fn tags(&self, id: SourceId) -> Option<ClassTags> {
        self.registry.tags(id)
    }

    /// Verify that every source is classified consistently and sized for
    /// this chain's voice count.
    pub fn check_structure(&self) -> Result<(), ChainError> {
        self.registry.check(self.voices.len())
    }

    /// Size buffers and tell every source the control rate. Not realtime-safe.
    pub fn prepare_to_play(&mut self, sample_rate: f64, max_block_size: usize) {
        debug_assert!(sample_rate > 0.0);
        debug_assert!(max_block_size <= MAX_BLOCK_SIZE);

        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;

        let control_rate = self.control_rate();
        for modulator in self.registry.iter_mut() {
            modulator.source_mut().prepare(control_rate);
        }

        if self.kind == ChainKind::Normal && self.buffer.set_max_size(max_block_size) {
            info!(
                chain = %self.name,
                max_block_size,
                floats = self.buffer.allocated(),
                "allocated modulation buffer"
            );
        }

        debug!(chain = %self.name, sample_rate, control_rate, "prepared");

        if let Err(error) = self.check_structure() {
            warn!(chain = %self.name, %error, "inconsistent chain structure");
        }
    }

    fn ensure_insertable(&self, modulator: &Modulator) -> Result<(), ChainError> {
        if self.kind == ChainKind::VoiceStartOnly && modulator.kind() != SourceKind::VoiceStart {
            return Err(ChainError::UnsupportedSource {
                type_name: modulator.type_name(),
            });
        }
        self.registry.ensure_room()
    }

    fn insert(&mut self, mut modulator: Box<Modulator>, before: Option<SourceId>) -> SourceId {
        if self.is_prepared() {
            modulator.source_mut().prepare(self.control_rate());
        }
        self.registry.insert(modulator, before)
    }

    fn apply_bypass(&mut self, id: SourceId, bypassed: bool) -> Result<(), ChainError> {
        if self.registry.set_bypassed(id, bypassed)? == SourceKind::Envelope {
            // Envelope state is meaningless across an activation change.
            self.all_notes_off();
        }
        Ok(())
    }

    fn apply_monophonic(&mut self, id: SourceId, monophonic: bool) -> Result<(), ChainError> {
        self.registry.set_monophonic(id, monophonic)?;
        self.all_notes_off();
        Ok(())
    }

    fn apply_intensity(&mut self, id: SourceId, intensity: f32) -> Result<(), ChainError> {
        self.registry
            .get_mut(id)
            .ok_or(ChainError::SourceNotFound { id })?
            .set_intensity(intensity);
        Ok(())
    }

    /// Insert a source before `before`, or at the end.
    ///
    /// For single-threaded use. A running chain takes changes through its
    /// [`ChainHandle`](command::ChainHandle).
    pub fn add_source(
        &mut self,
        modulator: Modulator,
        before: Option<SourceId>,
    ) -> Result<SourceId, ChainError> {
        self.ensure_insertable(&modulator)?;

        let type_name = modulator.type_name();
        let id = self.insert(Box::new(modulator), before);

        info!(chain = %self.name, %id, type_name, "added source");
        Ok(id)
    }

    /// Remove a source. With `destroy` it is dropped, otherwise returned.
    pub fn remove_source(
        &mut self,
        id: SourceId,
        destroy: bool,
    ) -> Result<Option<Modulator>, ChainError> {
        let modulator = self.registry.remove(id)?;
        info!(chain = %self.name, %id, destroy, "removed source");

        Ok(if destroy { None } else { Some(*modulator) })
    }

    pub fn set_bypassed(&mut self, id: SourceId, bypassed: bool) -> Result<(), ChainError> {
        self.apply_bypass(id, bypassed)?;
        debug!(chain = %self.name, %id, bypassed, "bypass changed");
        Ok(())
    }

    /// Switch an envelope between per-voice and shared operation.
    pub fn set_monophonic(&mut self, id: SourceId, monophonic: bool) -> Result<(), ChainError> {
        self.apply_monophonic(id, monophonic)?;
        debug!(chain = %self.name, %id, monophonic, "envelope mode changed");
        Ok(())
    }

    pub fn set_intensity(&mut self, id: SourceId, intensity: f32) -> Result<(), ChainError> {
        self.apply_intensity(id, intensity)
    }

    #[cfg(feature = "rtrb")]
    fn apply_command(&mut self, command: ChainCommand, link: &mut AudioLink) -> Result<(), ChainError> {
        match command {
            ChainCommand::Add { modulator, before } => {
                if let Err(error) = self.ensure_insertable(&modulator) {
                    link.retire(modulator, true);
                    return Err(error);
                }
                self.insert(modulator, before);
            }
            ChainCommand::Remove { id, destroy } => {
                let modulator = self.registry.remove(id)?;
                link.retire(modulator, destroy);
            }
            ChainCommand::SetBypassed { id, bypassed } => self.apply_bypass(id, bypassed)?,
            ChainCommand::SetMonophonic { id, monophonic } => {
                self.apply_monophonic(id, monophonic)?
            }
            ChainCommand::SetIntensity { id, intensity } => self.apply_intensity(id, intensity)?,
        }
        Ok(())
    }

    /// The barrier: apply everything the control thread queued.
    ///
    /// Stops early when the retired queue is full; the remaining commands
    /// stay queued until a later block.
    #[cfg(feature = "rtrb")]
    fn apply_pending_commands(&mut self) {
        let Some(mut link) = self.link.take() else {
            return;
        };

        let mut changed = false;

        while link.can_retire() {
            let Some(command) = CommandReceiver::pop(&mut link.commands) else {
                break;
            };

            changed = true;
            if let Err(error) = self.apply_command(command, &mut link) {
                link.report(error);
            }
        }

        if changed {
            if let Err(error) = self.check_structure() {
                link.report(error);
            }
        }

        link.flush_dropped_errors();
        self.link = Some(link);
    }

    pub fn handle_voice_event(&mut self, event: ChainEvent) {
        match event {
            ChainEvent::NoteOn {
                voice,
                note,
                velocity,
            } => {
                self.start_voice(voice, NoteInfo::new(note, velocity));
            }
            ChainEvent::NoteOff { voice } => self.stop_voice(voice),
            ChainEvent::Reset { voice } => self.reset_voice(voice),
            ChainEvent::Controller { number, value } => {
                if self.registry.flags().should_be_processed_at_all() {
                    for modulator in self.registry.iter_mut().filter(|m| !m.is_bypassed()) {
                        modulator.source_mut().handle_controller(number, value);
                    }
                }
            }
            ChainEvent::AllNotesOff => self.all_notes_off(),
        }
    }

    /// Drain and handle every pending event.
    pub fn handle_events<R: EventReceiver>(&mut self, rx: &mut R) {
        while let Some(event) = rx.pop() {
            self.handle_voice_event(event);
        }
    }

    /// Start a voice and return its first dynamic value.
    ///
    /// With no voice-bound sources the first value is 0.0.
    pub fn start_voice(&mut self, voice: usize, note: NoteInfo) -> f32 {
        debug_assert!(voice < self.voices.len(), "voice index out of range");

        let flags = self.registry.flags();
        let mut first_value = 1.0;

        if self.options.include_monophonic_values && flags.has_monophonic_time_modulation_mods() {
            // Any mono value will do; it only seeds the ramp.
            if let Some(&mono) = self.buffer.mono().first() {
                first_value *= mono;
            }
        }

        // Time-variant sources see the note for retriggering but do not
        // contribute a start value.
        for modulator in self.registry.tagged_mut(ClassTags::TIME_VARIANT) {
            modulator.start_voice(voice, note);
        }

        if flags.has_voice_modulators() {
            first_value *= self.start_voice_sources(voice, note);
        } else {
            first_value = 0.0;
        }

        let constant = self.registry.constant_voice_value(voice, self.mode);

        if let Some(state) = self.voices.get_mut(voice) {
            state.constant = constant;
            state.output = constant;
            state.ramp = first_value;
            state.active = true;
        }

        first_value
    }

    /// Start voice-start sources, then fold envelope start values on top of
    /// the combined constant.
    fn start_voice_sources(&mut self, voice: usize, note: NoteInfo) -> f32 {
        let mode = self.mode;

        for modulator in self.registry.tagged_mut(ClassTags::VOICE_START) {
            modulator.start_voice(voice, note);
        }

        let start_value = self.registry.constant_voice_value(voice, mode);

        let envelope_value = mode.combine(self.registry.tagged_mut(ClassTags::ENVELOPES).map(|m| {
            let value = m.start_voice(voice, note);
            m.scale(value, mode)
        }));

        start_value * envelope_value
    }

    /// Begin the release of every envelope for `voice`.
    pub fn stop_voice(&mut self, voice: usize) {
        if let Some(state) = self.voices.get_mut(voice) {
            state.active = false;
        }

        if !self.registry.flags().has_voice_modulators() {
            return;
        }

        for modulator in self.registry.tagged_mut(ClassTags::ENVELOPES) {
            modulator.source_mut().stop_voice(voice);
        }
    }

    /// Reset envelope state for `voice` and zero its ramp.
    pub fn reset_voice(&mut self, voice: usize) {
        if !self.registry.flags().has_active_envelopes_at_all() {
            return;
        }

        for modulator in self.registry.tagged_mut(ClassTags::ENVELOPES) {
            modulator.source_mut().reset_voice(voice);
        }

        if let Some(state) = self.voices.get_mut(voice) {
            state.ramp = 0.0;
        }
    }

    pub fn all_notes_off(&mut self) {
        for voice in 0..self.voices.len() {
            if self.voices[voice].active {
                self.stop_voice(voice);
            }
        }
    }

    /// True while every polyphonic envelope is still sounding for `voice`.
    /// Without envelopes, true between start and stop.
    pub fn is_playing(&self, voice: usize) -> bool {
        if !self.registry.flags().envelopes {
            return self.voices.get(voice).is_some_and(|v| v.active);
        }

        self.registry
            .tagged(ClassTags::POLY_ENVELOPE)
            .all(|m| m.source().is_playing(voice))
    }

    /// Start of a block: apply queued changes, then compute the shared
    /// monophonic values for `[start_sample, start_sample + num_samples)`.
    pub fn render_block(&mut self, start_sample: usize, num_samples: usize) {
        #[cfg(feature = "rtrb")]
        self.apply_pending_commands();

        self.calculate_monophonic_values(start_sample, num_samples);

        // Voices read the control-rate mono values, so only expand here
        // when nobody else needs them.
        if self.options.expand_to_audio_rate && !self.options.include_monophonic_values {
            self.expand_monophonic_values(start_sample, num_samples);
        }
    }

    pub fn calculate_monophonic_values(&mut self, start_sample: usize, num_samples: usize) {
        self.mono.expanded = false;

        if !self.registry.flags().has_monophonic_time_modulation_mods() {
            return;
        }

        debug_assert_eq!(self.kind, ChainKind::Normal);
        debug_assert!(self.is_prepared(), "prepare_to_play must run before rendering");
        debug_assert_eq!(start_sample % K, 0);
        debug_assert!(start_sample + num_samples <= self.buffer.max_block_size());

        let mode = self.mode;
        let range = start_sample / K..(start_sample + num_samples) / K;

        let Regions { mono, scratch, .. } = self.buffer.regions_mut();
        let window = &mut mono[range];
        window.fill(1.0);

        for modulator in self.registry.tagged_mut(ClassTags::TIME_VARIANT) {
            modulator.render_into(0, mode, window, scratch);
        }

        for modulator in self.registry.tagged_mut(ClassTags::MONO_ENVELOPE) {
            modulator.render_into(0, mode, window, scratch);
        }

        self.mono_checker.rendered();
    }

    /// Compute `voice`'s values for the window and expand them if the chain
    /// is set to.
    pub fn render_voice(&mut self, voice: usize, start_sample: usize, num_samples: usize) {
        self.calculate_voice_values(voice, start_sample, num_samples);

        if self.options.expand_to_audio_rate {
            self.expand_voice_values(voice, start_sample, num_samples);
        }
    }

    pub fn calculate_voice_values(&mut self, voice: usize, start_sample: usize, num_samples: usize) {
        debug_assert!(voice < self.voices.len(), "voice index out of range");
        debug_assert_eq!(start_sample % K, 0);
        debug_assert_eq!(num_samples % K, 0);

        self.current_voice = voice;
        self.voice_expanded = false;
        let mode = self.mode;
        let flags = self.registry.flags();

        if self.kind == ChainKind::VoiceStartOnly {
            let constant = self.registry.constant_voice_value(voice, mode);
            let state = &mut self.voices[voice];
            state.constant = constant;
            state.output = constant;
            self.voice_data = VoiceData::None;
            return;
        }

        let use_mono = self.options.include_monophonic_values
            && flags.has_monophonic_time_modulation_mods();

        if !flags.has_active_poly_mods() && !use_mono {
            let state = &mut self.voices[voice];
            state.constant = 1.0;
            state.output = 1.0;
            self.voice_data = VoiceData::None;
            return;
        }

        debug_assert!(start_sample + num_samples <= self.buffer.max_block_size());

        let range = start_sample / K..(start_sample + num_samples) / K;
        let Regions {
            voice: voice_values,
            mono,
            scratch,
        } = self.buffer.regions_mut();
        let window = &mut voice_values[range.clone()];
        let state = &mut self.voices[voice];

        if flags.has_active_poly_mods() {
            let constant = self.registry.constant_voice_value(voice, mode);
            let smoothed = fill_constant(window, state.constant, constant);
            state.constant = constant;
            state.output = constant;

            if flags.envelopes {
                for modulator in self.registry.tagged_mut(ClassTags::POLY_ENVELOPE) {
                    modulator.render_into(voice, mode, window, scratch);
                }
            }

            if use_mono {
                multiply(window, &mono[range]);
            }

            self.voice_data = if flags.envelopes || use_mono || smoothed {
                VoiceData::Voice
            } else {
                VoiceData::None
            };
        } else {
            state.constant = 1.0;
            state.output = 1.0;

            self.voice_data = if self.options.voice_values_read_only {
                VoiceData::Mono
            } else {
                window.copy_from_slice(&mono[range]);
                VoiceData::Voice
            };
        }

        if self.voice_data != VoiceData::None {
            self.poly_checker.rendered();
        }
    }

    /// Expand the last rendered voice to audio rate.
    ///
    /// A flat window leaves the buffer alone and the voice falls back to its
    /// ramp value as a scalar. Expanding the same render twice is a no-op.
    pub fn expand_voice_values(&mut self, voice: usize, start_sample: usize, num_samples: usize) {
        debug_assert_eq!(voice, self.current_voice, "expand the voice that was just rendered");

        if self.voice_expanded {
            return;
        }
        self.voice_expanded = true;

        match self.voice_data {
            VoiceData::None => {}
            VoiceData::Voice => {
                self.poly_checker.expanded();

                let Regions {
                    voice: data,
                    scratch,
                    ..
                } = self.buffer.regions_mut();
                let state = &mut self.voices[voice];

                if expand_in_place(data, scratch, start_sample, num_samples, &mut state.ramp) {
                    state.output = 1.0;
                } else {
                    state.output = state.ramp;
                    self.voice_data = VoiceData::None;
                }
            }
            VoiceData::Mono => {
                self.poly_checker.expanded();
                self.expand_monophonic_values(start_sample, num_samples);

                let state = &mut self.voices[voice];
                state.ramp = self.mono.ramp;

                if self.mono.moved {
                    state.output = 1.0;
                } else {
                    state.output = self.mono.ramp;
                    self.voice_data = VoiceData::None;
                }
            }
        }
    }

    /// Expand the monophonic values to audio rate. Runs at most once per
    /// block; later calls are no-ops.
    pub fn expand_monophonic_values(&mut self, start_sample: usize, num_samples: usize) {
        if !self.registry.flags().has_monophonic_time_modulation_mods() {
            return;
        }

        self.mono_checker.expanded();

        if self.mono.expanded {
            return;
        }

        let Regions { mono, scratch, .. } = self.buffer.regions_mut();
        let moved = expand_in_place(mono, scratch, start_sample, num_samples, &mut self.mono.ramp);

        if !moved {
            mono[start_sample..start_sample + num_samples].fill(self.mono.ramp);
        }

        self.mono.moved = moved;
        self.mono.expanded = true;
    }

    /// Audio-rate values of the last rendered voice from `start_sample`, or
    /// `None` if the voice is constant (use [`constant_value`](Self::constant_value)).
    pub fn voice_values(&self, start_sample: usize) -> Option<&[f32]> {
        debug_assert!(
            self.voice_data == VoiceData::None || self.poly_checker.is_expanded(),
            "voice values must be expanded before audio-rate access"
        );

        match self.voice_data {
            VoiceData::None => None,
            VoiceData::Voice => Some(&self.buffer.voice()[start_sample..]),
            VoiceData::Mono => Some(&self.buffer.mono()[start_sample..]),
        }
    }

    pub fn voice_values_mut(&mut self, start_sample: usize) -> Option<&mut [f32]> {
        debug_assert!(!self.options.voice_values_read_only);
        debug_assert!(
            self.voice_data == VoiceData::None || self.poly_checker.is_expanded(),
            "voice values must be expanded before audio-rate access"
        );

        match self.voice_data {
            VoiceData::None => None,
            VoiceData::Voice => Some(&mut self.buffer.voice_mut()[start_sample..]),
            VoiceData::Mono => Some(&mut self.buffer.mono_mut()[start_sample..]),
        }
    }

    /// Audio-rate monophonic values. Only meaningful when they are not
    /// folded into the voices.
    pub fn monophonic_values(&self, start_sample: usize) -> Option<&[f32]> {
        debug_assert!(!self.options.include_monophonic_values);

        if !self.registry.flags().has_monophonic_time_modulation_mods() {
            return None;
        }

        debug_assert!(self.mono_checker.is_expanded());
        Some(&self.buffer.mono()[start_sample..])
    }

    /// The scalar value of `voice` when it has no dynamic buffer.
    pub fn constant_value(&self, voice: usize) -> f32 {
        self.voices.get(voice).map_or(1.0, |v| v.output)
    }

    /// Last ramp value written for `voice`.
    pub fn ramp_value(&self, voice: usize) -> f32 {
        self.voices.get(voice).map_or(0.0, |v| v.ramp)
    }

    pub fn set_ramp_value(&mut self, voice: usize, value: f32) {
        if let Some(state) = self.voices.get_mut(voice) {
            state.ramp = value;
        }
    }

    /// One control-rate value of the last rendered voice, without expanding.
    pub fn one_value(&self, start_sample: usize) -> f32 {
        debug_assert!(!self.options.expand_to_audio_rate);

        let index = start_sample / K;
        match self.voice_data {
            VoiceData::None => self.constant_value(self.current_voice),
            VoiceData::Voice => self.buffer.voice()[index],
            VoiceData::Mono => self.buffer.mono()[index],
        }
    }

    /// Multiply every channel by the expanded monophonic values.
    pub fn apply_monophonic_values(
        &self,
        channels: &mut [&mut [f32]],
        start_sample: usize,
        num_samples: usize,
    ) {
        if !self.registry.flags().has_monophonic_time_modulation_mods() {
            return;
        }

        debug_assert!(
            self.mono_checker.is_expanded(),
            "expand the monophonic values before applying them"
        );

        let range = start_sample..start_sample + num_samples;
        let mono = &self.buffer.mono()[range.clone()];

        for channel in channels.iter_mut() {
            multiply(&mut channel[range.clone()], mono);
        }
    }

    pub fn scratch_buffer(&mut self) -> &mut [f32] {
        self.buffer.scratch_mut()
    }
}

#[inline]
fn multiply(target: &mut [f32], source: &[f32]) {
    for (t, &s) in target.iter_mut().zip(source) {
        *t *= s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dsp::envelope::EnvelopeShape,
        source::{
            envelope::EnvelopeSource, time_variant::LfoSource, voice_start::VoiceStartSource,
            SourceSettings,
        },
    };

    const VOICES: usize = 4;
    const BLOCK: usize = 64;

    fn chain(mode: ModulationMode) -> ModulationChain {
        let mut chain = ModulationChain::new("test", mode, ChainKind::Normal, VOICES);
        chain.prepare_to_play(48_000.0, BLOCK);
        chain
    }

    fn constant(value: f32) -> Modulator {
        Modulator::new(Box::new(VoiceStartSource::constant(VOICES, value)))
    }

    fn note() -> NoteInfo {
        NoteInfo::new(60, 100)
    }

    #[test]
    fn empty_chain_renders_neutral() {
        let mut chain = chain(ModulationMode::Gain);
        chain.render_block(0, BLOCK);
        chain.render_voice(0, 0, BLOCK);

        assert!(!chain.any_active());
        assert!(chain.voice_values(0).is_none());
        assert_eq!(chain.constant_value(0), 1.0);
    }

    #[test]
    fn start_without_voice_sources_is_zero() {
        let mut chain = chain(ModulationMode::Gain);
        chain.add_source(Modulator::new(Box::new(LfoSource::sine(1.0))), None).unwrap();

        assert_eq!(chain.start_voice(0, note()), 0.0);
        assert_eq!(chain.ramp_value(0), 0.0);
    }

    #[test]
    fn voice_start_only_voice_is_constant() {
        let mut chain = chain(ModulationMode::Gain);
        chain.add_source(constant(0.5), None).unwrap();
        chain.add_source(constant(0.8), None).unwrap();

        chain.start_voice(1, note());
        chain.render_block(0, BLOCK);
        chain.render_voice(1, 0, BLOCK);

        assert!(chain.voice_values(0).is_none());
        assert!((chain.constant_value(1) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn constant_jump_is_ramped_then_settles() {
        let mut chain = chain(ModulationMode::Gain);
        // Gain intensity of a 0.0 source is 1 - intensity.
        let id = chain
            .add_source(
                Modulator::with_settings(
                    Box::new(VoiceStartSource::constant(VOICES, 0.0)),
                    SourceSettings {
                        intensity: 0.0,
                        ..Default::default()
                    },
                ),
                None,
            )
            .unwrap();

        chain.start_voice(0, note());
        chain.render_block(0, BLOCK);
        chain.render_voice(0, 0, BLOCK);
        assert!(chain.voice_values(0).is_none());
        assert!((chain.constant_value(0) - 1.0).abs() < 1e-6);

        chain.set_intensity(id, 0.5).unwrap();
        chain.render_block(0, BLOCK);
        chain.render_voice(0, 0, BLOCK);

        let values = chain.voice_values(0).expect("smoothed block has a buffer");
        assert!(values[0] > 0.5 && values[0] <= 1.0);
        assert!(values[BLOCK - 1] < values[0]);

        chain.render_block(0, BLOCK);
        chain.render_voice(0, 0, BLOCK);
        assert!(chain.voice_values(0).is_none());
        assert!((chain.constant_value(0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn envelope_voice_is_expanded_to_audio_rate() {
        let mut chain = chain(ModulationMode::Gain);
        chain
            .add_source(
                Modulator::new(Box::new(EnvelopeSource::simple(VOICES, 0.001, 0.05))),
                None,
            )
            .unwrap();

        let first = chain.start_voice(2, note());
        assert_eq!(first, 0.0);

        chain.render_block(0, BLOCK);
        chain.render_voice(2, 0, BLOCK);

        let values = chain.voice_values(0).expect("envelope renders a buffer");
        assert_eq!(values.len(), BLOCK);
        assert!(values[0] > 0.0 && values[0] < 1.0, "first mini-ramp starts from 0");
        assert!((values[BLOCK - 1] - 1.0).abs() < 1e-6);
        assert_eq!(chain.constant_value(2), 1.0);
    }

    #[test]
    fn flat_envelope_falls_back_to_scalar() {
        let mut chain = chain(ModulationMode::Gain);
        chain
            .add_source(
                Modulator::new(Box::new(EnvelopeSource::simple(VOICES, 0.001, 0.05))),
                None,
            )
            .unwrap();

        chain.start_voice(0, note());
        for _ in 0..4 {
            chain.render_block(0, BLOCK);
            chain.render_voice(0, 0, BLOCK);
        }

        // Sustaining at 1.0: nothing moves.
        assert!(chain.voice_values(0).is_none());
        assert!((chain.constant_value(0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mono_values_are_folded_into_voices() {
        let mut chain = chain(ModulationMode::Gain);
        chain
            .add_source(Modulator::new(Box::new(LfoSource::sine(50.0))), None)
            .unwrap();
        chain.add_source(constant(0.5), None).unwrap();

        chain.start_voice(0, note());
        chain.render_block(0, BLOCK);
        chain.render_voice(0, 0, BLOCK);

        let values = chain.voice_values(0).expect("lfo moves");
        assert!(values.iter().all(|&v| (0.0..=0.5 + 1e-6).contains(&v)));
    }

    #[test]
    fn read_only_voices_alias_the_mono_buffer() {
        let mut chain = chain(ModulationMode::Gain);
        chain.set_voice_values_read_only(true);
        chain
            .add_source(Modulator::new(Box::new(LfoSource::sine(50.0))), None)
            .unwrap();

        chain.render_block(0, BLOCK);

        chain.render_voice(0, 0, BLOCK);
        let first: Vec<f32> = chain.voice_values(0).expect("lfo moves").to_vec();

        // A second voice in the same block sees the same expanded values.
        chain.render_voice(1, 0, BLOCK);
        let second = chain.voice_values(0).expect("lfo moves");
        assert_eq!(first.as_slice(), second);
    }

    #[test]
    fn separate_mono_values_are_expanded_in_render_block() {
        let mut chain = chain(ModulationMode::Gain);
        chain.set_include_monophonic_values(false);
        chain
            .add_source(Modulator::new(Box::new(LfoSource::triangle(100.0))), None)
            .unwrap();

        chain.render_block(0, BLOCK);
        let mono = chain.monophonic_values(0).expect("time-variant active");
        assert_eq!(mono.len(), BLOCK);

        let mut left = vec![1.0f32; BLOCK];
        let mut right = vec![2.0f32; BLOCK];
        let expected: Vec<f32> = mono.to_vec();
        chain.apply_monophonic_values(&mut [&mut left[..], &mut right[..]], 0, BLOCK);

        for i in 0..BLOCK {
            assert!((left[i] - expected[i]).abs() < 1e-6);
            assert!((right[i] - 2.0 * expected[i]).abs() < 1e-6);
        }

        chain.render_voice(0, 0, BLOCK);
        assert!(chain.voice_values(0).is_none());
    }

    #[test]
    fn pitch_mode_start_value_includes_envelopes() {
        let mut chain = chain(ModulationMode::Pitch);
        chain
            .add_source(
                Modulator::with_settings(
                    Box::new(VoiceStartSource::constant(VOICES, 0.75)),
                    SourceSettings {
                        bipolar: true,
                        ..Default::default()
                    },
                ),
                None,
            )
            .unwrap();
        chain
            .add_source(
                Modulator::new(Box::new(EnvelopeSource::adsr(VOICES, EnvelopeShape::default()))),
                None,
            )
            .unwrap();

        // Envelope starts at 0.0, which is a pitch factor of 1.0.
        let first = chain.start_voice(0, note());
        assert!((first - 2f32.sqrt()).abs() < 1e-4);
        assert!((chain.constant_value(0) - 2f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn voice_start_only_chain_needs_no_buffer() {
        let mut chain =
            ModulationChain::new("vs", ModulationMode::Gain, ChainKind::VoiceStartOnly, VOICES);
        chain.prepare_to_play(48_000.0, BLOCK);

        let err = chain
            .add_source(Modulator::new(Box::new(LfoSource::sine(1.0))), None)
            .unwrap_err();
        assert_eq!(err, ChainError::UnsupportedSource { type_name: "Lfo" });

        chain.add_source(constant(0.25), None).unwrap();
        chain.start_voice(0, note());
        chain.render_voice(0, 0, BLOCK);
        assert!((chain.constant_value(0) - 0.25).abs() < 1e-6);
        assert!(chain.voice_values(0).is_none());
    }

    #[test]
    fn is_playing_follows_envelopes() {
        let mut chain = chain(ModulationMode::Gain);
        chain
            .add_source(
                Modulator::new(Box::new(EnvelopeSource::simple(VOICES, 0.001, 0.001))),
                None,
            )
            .unwrap();

        chain.start_voice(0, note());
        chain.render_voice(0, 0, BLOCK);
        assert!(chain.is_playing(0));

        chain.stop_voice(0);
        chain.render_voice(0, 0, BLOCK);
        assert!(!chain.is_playing(0));
    }

    #[test]
    fn all_notes_off_stops_active_voices() {
        let mut chain = chain(ModulationMode::Gain);
        chain.add_source(constant(1.0), None).unwrap();

        chain.start_voice(0, note());
        chain.start_voice(3, note());
        assert!(chain.is_playing(0) && chain.is_playing(3));

        chain.handle_voice_event(ChainEvent::AllNotesOff);
        assert!(!chain.is_playing(0));
        assert!(!chain.is_playing(3));
    }

    #[test]
    fn time_variant_only_voice_stops_playing() {
        let mut chain = chain(ModulationMode::Gain);
        chain.add_source(Modulator::new(Box::new(LfoSource::sine(2.0))), None).unwrap();

        chain.start_voice(1, note());
        assert!(chain.is_playing(1));

        chain.stop_voice(1);
        assert!(!chain.is_playing(1));

        chain.start_voice(2, note());
        chain.all_notes_off();
        assert!(!chain.is_playing(2));
    }

    #[test]
    fn one_value_reads_control_rate_data() {
        let mut chain = chain(ModulationMode::Gain);
        chain.set_expand_to_audio_rate(false);
        chain
            .add_source(
                Modulator::new(Box::new(EnvelopeSource::simple(VOICES, 0.01, 0.05))),
                None,
            )
            .unwrap();

        chain.start_voice(0, note());
        chain.render_block(0, BLOCK);
        chain.render_voice(0, 0, BLOCK);

        let early = chain.one_value(0);
        let late = chain.one_value(BLOCK - K);
        assert!(late > early);
    }
}
