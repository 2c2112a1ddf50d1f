pub mod chain; // Orchestrator, classification, handoff queues
pub mod dsp;
pub mod error;
pub mod source; // Modulation sources and factories

pub use chain::{ChainKind, ChainOptions, ModulationChain};
#[cfg(feature = "rtrb")]
pub use chain::command::ChainHandle;
pub use error::ChainError;
pub use source::{Modulator, NoteInfo, SourceId, SourceSettings};

pub const MAX_BLOCK_SIZE: usize = 2048;
/// Audio samples per control-rate sample.
pub const CONTROL_RATE_DOWNSAMPLING: usize = 8;
pub const NUM_POLYPHONIC_VOICES: usize = 256;
/// Floats per SIMD lane group; buffer regions align to this.
pub const SIMD_WIDTH: usize = 4;
pub const MAX_SOURCES_PER_CHAIN: usize = 64;

pub(crate) const MIN_TIME: f32 = 1.0 / 48_000.0;
pub(crate) const DEFAULT_CONTROL_RATE: f32 = 48_000.0 / CONTROL_RATE_DOWNSAMPLING as f32;
