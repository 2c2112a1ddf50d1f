use crate::source::{Modulator, SourceId};

#[cfg(feature = "rtrb")]
use {
    crate::{
        chain::ChainKind,
        error::ChainError,
        source::{factory::ChainFactory, SourceKind, SourceSettings},
    },
    rtrb::{Consumer, Producer, RingBuffer},
    tracing::{debug, info, warn},
};

/// Structural change queued by the control thread and applied by the audio
/// thread between blocks.
#[derive(Debug)]
pub enum ChainCommand {
    Add {
        modulator: Box<Modulator>,
        before: Option<SourceId>,
    },
    Remove {
        id: SourceId,
        destroy: bool,
    },
    SetBypassed {
        id: SourceId,
        bypassed: bool,
    },
    SetMonophonic {
        id: SourceId,
        monophonic: bool,
    },
    SetIntensity {
        id: SourceId,
        intensity: f32,
    },
}

/// A source the audio thread no longer owns, on its way back to the
/// control thread so it is never freed on the audio thread.
#[derive(Debug)]
pub struct Retired {
    pub modulator: Box<Modulator>,
    pub destroy: bool,
}

pub trait CommandReceiver {
    fn pop(&mut self) -> Option<ChainCommand>;
}

#[cfg(feature = "rtrb")]
impl CommandReceiver for Consumer<ChainCommand> {
    fn pop(&mut self) -> Option<ChainCommand> {
        Consumer::pop(self).ok()
    }
}

pub const COMMAND_QUEUE_SIZE: usize = 256;
pub const ERROR_QUEUE_SIZE: usize = 32;

/// Audio-thread ends of the three queues.
#[cfg(feature = "rtrb")]
pub(crate) struct AudioLink {
    pub commands: Consumer<ChainCommand>,
    pub retired: Producer<Retired>,
    pub errors: Producer<ChainError>,
    dropped_errors: usize,
}

#[cfg(feature = "rtrb")]
impl AudioLink {
    /// Every command retires at most one source, so a command may only be
    /// taken while this holds.
    pub fn can_retire(&self) -> bool {
        self.retired.slots() > 0
    }

    /// Hand a source back to the control thread. Callers check
    /// [`can_retire`](Self::can_retire) first.
    pub fn retire(&mut self, modulator: Box<Modulator>, destroy: bool) {
        let pushed = self.retired.push(Retired { modulator, destroy }).is_ok();
        debug_assert!(pushed, "retired queue full; source freed on the audio thread");
    }

    /// Queue an error for the control thread. If the queue is full the error
    /// is counted and reported later as `ErrorsDropped`.
    pub fn report(&mut self, error: ChainError) {
        self.flush_dropped_errors();

        if self.errors.push(error).is_err() {
            self.dropped_errors += 1;
        }
    }

    pub fn flush_dropped_errors(&mut self) {
        if self.dropped_errors == 0 || self.errors.slots() == 0 {
            return;
        }

        let count = self.dropped_errors;
        if self.errors.push(ChainError::ErrorsDropped { count }).is_ok() {
            self.dropped_errors = 0;
        }
    }
}

/// Control-thread side of a chain.
///
/// Every mutation is queued and takes effect at the start of the next
/// `render_block`.
#[cfg(feature = "rtrb")]
pub struct ChainHandle {
    commands: Producer<ChainCommand>,
    retired: Consumer<Retired>,
    errors: Consumer<ChainError>,
    kind: ChainKind,
    num_voices: usize,
    factory: ChainFactory,
}

#[cfg(feature = "rtrb")]
pub(crate) fn channel(kind: ChainKind, num_voices: usize) -> (AudioLink, ChainHandle) {
    let (command_tx, command_rx) = RingBuffer::new(COMMAND_QUEUE_SIZE);
    let (retired_tx, retired_rx) = RingBuffer::new(COMMAND_QUEUE_SIZE);
    let (error_tx, error_rx) = RingBuffer::new(ERROR_QUEUE_SIZE);

    let link = AudioLink {
        commands: command_rx,
        retired: retired_tx,
        errors: error_tx,
        dropped_errors: 0,
    };

    let handle = ChainHandle {
        commands: command_tx,
        retired: retired_rx,
        errors: error_rx,
        kind,
        num_voices,
        factory: ChainFactory::for_kind(kind),
    };

    (link, handle)
}

#[cfg(feature = "rtrb")]
impl ChainHandle {
    fn send(&mut self, command: ChainCommand) -> Result<(), ChainError> {
        self.commands
            .push(command)
            .map_err(|_| ChainError::QueueFull)
    }

    pub fn num_voices(&self) -> usize {
        self.num_voices
    }

    pub fn factory(&self) -> &ChainFactory {
        &self.factory
    }

    /// Queue `modulator` for insertion before `before` (or at the end).
    pub fn add_source(
        &mut self,
        modulator: Modulator,
        before: Option<SourceId>,
    ) -> Result<SourceId, ChainError> {
        if self.kind == ChainKind::VoiceStartOnly && modulator.kind() != SourceKind::VoiceStart {
            return Err(ChainError::UnsupportedSource {
                type_name: modulator.type_name(),
            });
        }

        let id = modulator.id();
        let type_name = modulator.type_name();

        self.send(ChainCommand::Add {
            modulator: Box::new(modulator),
            before,
        })?;

        info!(%id, type_name, "queued source");
        Ok(id)
    }

    /// Build a source by type name and queue it.
    pub fn create_source(
        &mut self,
        type_name: &str,
        settings: SourceSettings,
        before: Option<SourceId>,
    ) -> Result<SourceId, ChainError> {
        let modulator = self.factory.create(type_name, self.num_voices, settings)?;
        self.add_source(modulator, before)
    }

    /// The source comes back through [`collect_retired`](Self::collect_retired).
    pub fn remove_source(&mut self, id: SourceId, destroy: bool) -> Result<(), ChainError> {
        self.send(ChainCommand::Remove { id, destroy })?;
        info!(%id, destroy, "queued source removal");
        Ok(())
    }

    pub fn set_bypassed(&mut self, id: SourceId, bypassed: bool) -> Result<(), ChainError> {
        self.send(ChainCommand::SetBypassed { id, bypassed })?;
        debug!(%id, bypassed, "queued bypass change");
        Ok(())
    }

    pub fn set_monophonic(&mut self, id: SourceId, monophonic: bool) -> Result<(), ChainError> {
        self.send(ChainCommand::SetMonophonic { id, monophonic })?;
        debug!(%id, monophonic, "queued envelope mode change");
        Ok(())
    }

    pub fn set_intensity(&mut self, id: SourceId, intensity: f32) -> Result<(), ChainError> {
        self.send(ChainCommand::SetIntensity { id, intensity })
    }

    /// Take back sources the audio thread released. Destroyed sources are
    /// dropped here; the rest are returned.
    pub fn collect_retired(&mut self) -> Vec<Modulator> {
        let mut kept = Vec::new();

        while let Ok(Retired { modulator, destroy }) = self.retired.pop() {
            if destroy {
                debug!(id = %modulator.id(), "dropping retired source");
            } else {
                kept.push(*modulator);
            }
        }

        kept
    }

    /// Errors raised while the audio thread applied queued commands.
    pub fn drain_errors(&mut self) -> Vec<ChainError> {
        let mut errors = Vec::new();

        while let Ok(error) = self.errors.pop() {
            warn!(%error, "chain command failed");
            errors.push(error);
        }

        errors
    }
}
