//! modchain - offline modulation chain renderer
//!
//! Run with: cargo run --bin modchain -- --source Velocity --source Adsr

mod report;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{bail, Result};
use tracing_subscriber::EnvFilter;

use report::{Report, VoiceSummary};
use saavy_modchain::{
    chain::event::ChainEvent,
    dsp::ModulationMode,
    source::factory::ChainFactory,
    ChainKind, ModulationChain, SourceSettings, CONTROL_RATE_DOWNSAMPLING, MAX_BLOCK_SIZE,
    NUM_POLYPHONIC_VOICES,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Gain,
    Pitch,
}

impl From<Mode> for ModulationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Gain => ModulationMode::Gain,
            Mode::Pitch => ModulationMode::Pitch,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "modchain", about = "Render a modulation chain and print its values per block")]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::Gain)]
    mode: Mode,

    /// Number of voices to start.
    #[arg(long, default_value_t = 4)]
    voices: usize,

    /// Source type to add, in order. Repeat for more sources.
    #[arg(long = "source", value_name = "TYPE")]
    sources: Vec<String>,

    /// Intensity applied to every source.
    #[arg(long, default_value_t = 1.0)]
    intensity: f32,

    /// Treat sources as bipolar (pitch mode).
    #[arg(long)]
    bipolar: bool,

    /// Run envelopes in monophonic mode.
    #[arg(long)]
    mono: bool,

    #[arg(long, default_value_t = 16)]
    blocks: usize,

    #[arg(long, default_value_t = 256)]
    block_size: usize,

    #[arg(long, default_value_t = 48_000.0)]
    sample_rate: f64,

    /// Block at which every note is released.
    #[arg(long)]
    release_at: Option<usize>,

    /// Print the available source types and exit.
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    let factory = ChainFactory::for_kind(ChainKind::Normal);

    if args.list {
        for name in factory.type_names() {
            println!("{name}");
        }
        return Ok(());
    }

    if args.block_size == 0
        || args.block_size % CONTROL_RATE_DOWNSAMPLING != 0
        || args.block_size > MAX_BLOCK_SIZE
    {
        bail!(
            "block size must be a non-zero multiple of {} up to {}",
            CONTROL_RATE_DOWNSAMPLING,
            MAX_BLOCK_SIZE
        );
    }

    if args.voices == 0 || args.voices > NUM_POLYPHONIC_VOICES {
        bail!("voice count must be between 1 and {}", NUM_POLYPHONIC_VOICES);
    }

    let mut chain = ModulationChain::new("modchain", args.mode.into(), ChainKind::Normal, args.voices);

    let settings = SourceSettings {
        intensity: args.intensity,
        bipolar: args.bipolar,
        monophonic: args.mono,
    };

    // The monophonic flag only affects envelopes.
    for name in &args.sources {
        let modulator = factory.create(name, args.voices, settings)?;
        chain.add_source(modulator, None)?;
    }

    chain.check_structure()?;
    chain.prepare_to_play(args.sample_rate, args.block_size);

    let mut report = Report::new(args.voices);

    for voice in 0..args.voices {
        let note = (48 + 7 * voice).min(127) as u8;
        let velocity = 127usize.saturating_sub(16 * voice).max(1) as u8;
        chain.handle_voice_event(ChainEvent::NoteOn {
            voice,
            note,
            velocity,
        });
        report.start(voice, chain.constant_value(voice), chain.ramp_value(voice));
    }

    for block in 0..args.blocks {
        if args.release_at == Some(block) {
            chain.handle_voice_event(ChainEvent::AllNotesOff);
        }

        chain.render_block(0, args.block_size);

        for voice in 0..args.voices {
            chain.render_voice(voice, 0, args.block_size);

            let summary = match chain.voice_values(0) {
                Some(values) => VoiceSummary::dynamic(&values[..args.block_size]),
                None => VoiceSummary::constant(chain.constant_value(voice)),
            };
            report.block(block, voice, summary, chain.is_playing(voice));
        }
    }

    report.print();
    Ok(())
}
