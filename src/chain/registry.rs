use std::ops::BitOr;

use crate::{
    dsp::intensity::ModulationMode,
    error::ChainError,
    source::{Modulator, SourceId, SourceKind},
};

/// Which active set a source belongs to.
///
/// An entry carries at most one tag; a bypassed entry carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassTags(u8);

impl ClassTags {
    pub const NONE: Self = Self(0);
    pub const VOICE_START: Self = Self(1);
    pub const POLY_ENVELOPE: Self = Self(1 << 1);
    pub const MONO_ENVELOPE: Self = Self(1 << 2);
    pub const TIME_VARIANT: Self = Self(1 << 3);

    pub const ENVELOPES: Self = Self(Self::POLY_ENVELOPE.0 | Self::MONO_ENVELOPE.0);

    pub fn classify(kind: SourceKind, monophonic: bool, bypassed: bool) -> Self {
        if bypassed {
            return Self::NONE;
        }

        match kind {
            SourceKind::VoiceStart => Self::VOICE_START,
            SourceKind::Envelope if monophonic => Self::MONO_ENVELOPE,
            SourceKind::Envelope => Self::POLY_ENVELOPE,
            SourceKind::TimeVariant => Self::TIME_VARIANT,
        }
    }

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn is_active(self) -> bool {
        self.0 != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// The source kind these tags imply, if exactly one is set.
    fn kind(self) -> Option<SourceKind> {
        match self {
            Self::VOICE_START => Some(SourceKind::VoiceStart),
            Self::POLY_ENVELOPE | Self::MONO_ENVELOPE => Some(SourceKind::Envelope),
            Self::TIME_VARIANT => Some(SourceKind::TimeVariant),
            _ => None,
        }
    }
}

impl BitOr for ClassTags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Cached emptiness of each active set, recomputed after every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveFlags {
    pub envelopes: bool,
    pub mono_envelopes: bool,
    pub time_variants: bool,
    pub voice_starts: bool,
    pub any_active: bool,
}

impl ActiveFlags {
    pub fn has_active_poly_mods(&self) -> bool {
        self.envelopes || self.voice_starts
    }

    pub fn has_active_envelopes_at_all(&self) -> bool {
        self.envelopes || self.mono_envelopes
    }

    pub fn has_only_voice_start_mods(&self) -> bool {
        self.voice_starts && !(self.envelopes || self.time_variants || self.mono_envelopes)
    }

    pub fn has_time_modulation_mods(&self) -> bool {
        self.time_variants || self.envelopes || self.mono_envelopes
    }

    /// Anything that renders into the shared monophonic buffer.
    pub fn has_monophonic_time_modulation_mods(&self) -> bool {
        self.time_variants || self.mono_envelopes
    }

    pub fn has_voice_modulators(&self) -> bool {
        self.voice_starts || self.envelopes || self.mono_envelopes
    }

    pub fn should_be_processed_at_all(&self) -> bool {
        self.any_active
    }
}

struct Entry {
    modulator: Box<Modulator>,
    tags: ClassTags,
}

impl Entry {
    fn classify(&self) -> ClassTags {
        ClassTags::classify(
            self.modulator.kind(),
            self.modulator.is_monophonic(),
            self.modulator.is_bypassed(),
        )
    }
}

/// Ordered arena of sources with one classification tag per entry.
///
/// Storage is reserved up front; inserting below capacity never
/// allocates, so the audio thread can apply structural changes.
pub struct Registry {
    entries: Vec<Entry>,
    capacity: usize,
    flags: ActiveFlags,
}

impl Registry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            flags: ActiveFlags::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn flags(&self) -> ActiveFlags {
        self.flags
    }

    fn position(&self, id: SourceId) -> Option<usize> {
        self.entries.iter().position(|e| e.modulator.id() == id)
    }

    fn entry_mut(&mut self, id: SourceId) -> Result<&mut Entry, ChainError> {
        self.entries
            .iter_mut()
            .find(|e| e.modulator.id() == id)
            .ok_or(ChainError::SourceNotFound { id })
    }

    pub fn ensure_room(&self) -> Result<(), ChainError> {
        if self.entries.len() >= self.capacity {
            return Err(ChainError::TooManySources {
                sources: self.entries.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Insert before `before`, or at the end if `before` is `None` or not
    /// found. The caller checks [`ensure_room`](Self::ensure_room) first.
    pub fn insert(&mut self, modulator: Box<Modulator>, before: Option<SourceId>) -> SourceId {
        debug_assert!(self.entries.len() < self.capacity);

        let id = modulator.id();
        let index = before
            .and_then(|before| self.position(before))
            .unwrap_or(self.entries.len());

        let mut entry = Entry {
            modulator,
            tags: ClassTags::NONE,
        };
        entry.tags = entry.classify();

        self.entries.insert(index, entry);
        self.refresh();
        id
    }

    pub fn remove(&mut self, id: SourceId) -> Result<Box<Modulator>, ChainError> {
        let index = self.position(id).ok_or(ChainError::SourceNotFound { id })?;
        let entry = self.entries.remove(index);
        self.refresh();
        Ok(entry.modulator)
    }

    /// Returns the kind of the source whose bypass state changed.
    pub fn set_bypassed(&mut self, id: SourceId, bypassed: bool) -> Result<SourceKind, ChainError> {
        let entry = self.entry_mut(id)?;
        entry.modulator.set_bypassed(bypassed);
        entry.tags = entry.classify();
        let kind = entry.modulator.kind();

        self.refresh();
        Ok(kind)
    }

    /// Move an envelope between the polyphonic and monophonic sets.
    pub fn set_monophonic(&mut self, id: SourceId, monophonic: bool) -> Result<(), ChainError> {
        let entry = self.entry_mut(id)?;

        if entry.modulator.kind() != SourceKind::Envelope || !entry.modulator.set_monophonic(monophonic)
        {
            return Err(ChainError::NotAnEnvelope { id });
        }

        // Single rewrite: the entry leaves one set and joins the other.
        entry.tags = entry.classify();

        self.refresh();
        Ok(())
    }

    pub fn get(&self, id: SourceId) -> Option<&Modulator> {
        self.entries
            .iter()
            .find(|e| e.modulator.id() == id)
            .map(|e| e.modulator.as_ref())
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut Modulator> {
        self.entries
            .iter_mut()
            .find(|e| e.modulator.id() == id)
            .map(|e| e.modulator.as_mut())
    }

    pub fn tags(&self, id: SourceId) -> Option<ClassTags> {
        self.entries
            .iter()
            .find(|e| e.modulator.id() == id)
            .map(|e| e.tags)
    }

    /// All sources in order, bypassed included.
    pub fn iter(&self) -> impl Iterator<Item = &Modulator> {
        self.entries.iter().map(|e| e.modulator.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Modulator> {
        self.entries.iter_mut().map(|e| e.modulator.as_mut())
    }

    /// Active sources carrying any of `tags`, in chain order.
    pub fn tagged(&self, tags: ClassTags) -> impl Iterator<Item = &Modulator> {
        self.entries
            .iter()
            .filter(move |e| e.tags.intersects(tags))
            .map(|e| e.modulator.as_ref())
    }

    pub fn tagged_mut(&mut self, tags: ClassTags) -> impl Iterator<Item = &mut Modulator> {
        self.entries
            .iter_mut()
            .filter(move |e| e.tags.intersects(tags))
            .map(|e| e.modulator.as_mut())
    }

    /// Combined voice-start value for `voice`: product in gain mode, pitch
    /// factor of the sum in pitch mode. 1.0 if no voice-start source is active.
    pub fn constant_voice_value(&self, voice: usize, mode: ModulationMode) -> f32 {
        if !self.flags.voice_starts {
            return mode.neutral();
        }

        mode.combine(
            self.tagged(ClassTags::VOICE_START)
                .map(|m| m.scaled_voice_value(voice, mode)),
        )
    }

    fn refresh(&mut self) {
        let mut flags = ActiveFlags::default();

        for entry in &self.entries {
            flags.voice_starts |= entry.tags.intersects(ClassTags::VOICE_START);
            flags.envelopes |= entry.tags.intersects(ClassTags::POLY_ENVELOPE);
            flags.mono_envelopes |= entry.tags.intersects(ClassTags::MONO_ENVELOPE);
            flags.time_variants |= entry.tags.intersects(ClassTags::TIME_VARIANT);
            flags.any_active |= entry.tags.is_active();
        }

        self.flags = flags;
    }

    /// Verify the tags against the sources they describe.
    pub fn check(&self, num_voices: usize) -> Result<(), ChainError> {
        let active = self
            .entries
            .iter()
            .filter(|e| !e.modulator.is_bypassed())
            .count();

        let classified = self
            .entries
            .iter()
            .filter(|e| e.tags.is_active() && e.tags == e.classify())
            .count();

        for entry in &self.entries {
            let id = entry.modulator.id();

            if entry.tags.intersects(ClassTags::POLY_ENVELOPE)
                && entry.tags.intersects(ClassTags::MONO_ENVELOPE)
            {
                return Err(ChainError::EnvelopeListOverlap { id });
            }

            let actual = entry.modulator.kind();
            if let Some(tagged) = entry.tags.kind() {
                if tagged != actual {
                    return Err(ChainError::KindMismatch { id, tagged, actual });
                }
            }

            if let Some(found) = entry.modulator.source().num_voices() {
                if found != num_voices {
                    return Err(ChainError::VoiceCountMismatch {
                        expected: num_voices,
                        found,
                    });
                }
            }
        }

        if active != classified {
            return Err(ChainError::ClassificationMismatch { active, classified });
        }

        Ok(())
    }
}
