use tracing::{debug, warn};

use crate::{
    chain::ChainKind,
    dsp::envelope::EnvelopeShape,
    error::ChainError,
    source::{
        envelope::EnvelopeSource,
        time_variant::{ControlSource, LfoSource},
        voice_start::VoiceStartSource,
        ModulationSource, Modulator, SourceSettings,
    },
};

/// Builds sources of one kind by type name.
///
/// A factory is the "patch design" layer: it knows the default settings for
/// every type it offers so callers only need the name.
pub trait SourceFactory: Send + Sync {
    fn type_names(&self) -> &'static [&'static str];

    fn provides(&self, type_name: &str) -> bool {
        self.type_names().contains(&type_name)
    }

    /// Returns `None` if `type_name` is not one of [`type_names`](Self::type_names).
    fn create(&self, type_name: &str, num_voices: usize) -> Option<Box<dyn ModulationSource>>;
}

pub struct VoiceStartFactory;

impl SourceFactory for VoiceStartFactory {
    fn type_names(&self) -> &'static [&'static str] {
        &["Constant", "Velocity", "KeyNumber", "Random"]
    }

    fn create(&self, type_name: &str, num_voices: usize) -> Option<Box<dyn ModulationSource>> {
        let source = match type_name {
            "Constant" => VoiceStartSource::constant(num_voices, 1.0),
            "Velocity" => VoiceStartSource::velocity(num_voices),
            "KeyNumber" => VoiceStartSource::key_number(num_voices),
            "Random" => VoiceStartSource::random(num_voices),
            _ => return None,
        };
        Some(Box::new(source))
    }
}

pub struct TimeVariantFactory;

impl SourceFactory for TimeVariantFactory {
    fn type_names(&self) -> &'static [&'static str] {
        &["Lfo", "Control"]
    }

    fn create(&self, type_name: &str, _num_voices: usize) -> Option<Box<dyn ModulationSource>> {
        match type_name {
            "Lfo" => Some(Box::new(LfoSource::sine(5.0))),
            // Mod wheel.
            "Control" => Some(Box::new(ControlSource::new(1))),
            _ => None,
        }
    }
}

pub struct EnvelopeFactory;

impl SourceFactory for EnvelopeFactory {
    fn type_names(&self) -> &'static [&'static str] {
        &["Adsr", "SimpleEnvelope"]
    }

    fn create(&self, type_name: &str, num_voices: usize) -> Option<Box<dyn ModulationSource>> {
        match type_name {
            "Adsr" => Some(Box::new(EnvelopeSource::adsr(
                num_voices,
                EnvelopeShape::default(),
            ))),
            "SimpleEnvelope" => Some(Box::new(EnvelopeSource::simple(num_voices, 0.005, 0.3))),
            _ => None,
        }
    }
}

/// The factory a chain uses: probes voice-start, then time-variant, then
/// envelope, and builds from the first one that knows the name.
pub struct ChainFactory {
    factories: Vec<Box<dyn SourceFactory>>,
}

impl ChainFactory {
    pub fn for_kind(kind: ChainKind) -> Self {
        let factories: Vec<Box<dyn SourceFactory>> = match kind {
            ChainKind::Normal => vec![
                Box::new(VoiceStartFactory),
                Box::new(TimeVariantFactory),
                Box::new(EnvelopeFactory),
            ],
            ChainKind::VoiceStartOnly => vec![Box::new(VoiceStartFactory)],
        };

        Self { factories }
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories
            .iter()
            .flat_map(|factory| factory.type_names().iter().copied())
    }

    pub fn provides(&self, type_name: &str) -> bool {
        self.factories.iter().any(|f| f.provides(type_name))
    }

    /// Build a source and wrap it with `settings`.
    ///
    /// Fails without side effects if no factory knows `type_name`.
    pub fn create(
        &self,
        type_name: &str,
        num_voices: usize,
        settings: SourceSettings,
    ) -> Result<Modulator, ChainError> {
        let source = self
            .factories
            .iter()
            .find(|factory| factory.provides(type_name))
            .and_then(|factory| factory.create(type_name, num_voices));

        match source {
            Some(source) => {
                let modulator = Modulator::with_settings(source, settings);
                debug!(
                    type_name,
                    id = %modulator.id(),
                    kind = ?modulator.kind(),
                    "created modulation source"
                );
                Ok(modulator)
            }
            None => {
                warn!(type_name, "no source factory provides this type");
                Err(ChainError::UnknownSourceType {
                    name: type_name.to_string(),
                })
            }
        }
    }
}

impl Default for ChainFactory {
    fn default() -> Self {
        Self::for_kind(ChainKind::Normal)
    }
}
