use snafu::Snafu;

use crate::source::SourceId;

/// Errors raised by chain construction and structural mutation.
///
/// Everything here is reported on the control thread. Precondition
/// violations on the audio thread are debug assertions instead.
#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum ChainError {
    #[snafu(display("No source factory provides a type named {:?}", name))]
    UnknownSourceType { name: String },

    #[snafu(display("Source type {:?} cannot be used in a voice-start-only chain", type_name))]
    UnsupportedSource { type_name: &'static str },

    #[snafu(display("Source {} is not part of this chain", id))]
    SourceNotFound { id: SourceId },

    #[snafu(display("Source {} is not an envelope and has no monophonic mode", id))]
    NotAnEnvelope { id: SourceId },

    #[snafu(display("Source has {} voices, chain expects {}", found, expected))]
    VoiceCountMismatch { expected: usize, found: usize },

    #[snafu(display(
        "{} active sources but {} classification entries",
        active,
        classified
    ))]
    ClassificationMismatch { active: usize, classified: usize },

    #[snafu(display("Envelope {} is tagged both polyphonic and monophonic", id))]
    EnvelopeListOverlap { id: SourceId },

    #[snafu(display("Source {} is tagged as a {:?} but is a {:?}", id, tagged, actual))]
    KindMismatch {
        id: SourceId,
        tagged: crate::source::SourceKind,
        actual: crate::source::SourceKind,
    },

    #[snafu(display("Chain holds {} sources, capacity is {}", sources, capacity))]
    TooManySources { sources: usize, capacity: usize },

    #[snafu(display("The command queue to the audio thread is full"))]
    QueueFull,

    #[snafu(display("{} errors were dropped because the error queue was full", count))]
    ErrorsDropped { count: usize },
}
