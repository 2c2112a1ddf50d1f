//! Benchmarks for polyphonic chains.
//!
//! Each iteration renders one block for every voice, the way a sampler or
//! synth calls the chain from its voice loop.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_modchain::{
    dsp::ModulationMode, source::factory::ChainFactory, ChainKind, ModulationChain, NoteInfo,
    SourceSettings,
};

use crate::BLOCK_SIZES;

const VOICES: usize = 16;

fn build(mode: ModulationMode, kind: ChainKind, sources: &[(&str, SourceSettings)]) -> ModulationChain {
    let factory = ChainFactory::for_kind(kind);
    let mut chain = ModulationChain::new("bench", mode, kind, VOICES);

    for &(name, settings) in sources {
        if let Ok(modulator) = factory.create(name, VOICES, settings) {
            let _ = chain.add_source(modulator, None);
        }
    }

    chain
}

fn start_all(chain: &mut ModulationChain) {
    for voice in 0..VOICES {
        chain.start_voice(voice, NoteInfo::new(48 + voice as u8, 100));
    }
}

fn render_all(chain: &mut ModulationChain, size: usize) -> f32 {
    chain.render_block(0, size);

    let mut sum = 0.0;
    for voice in 0..VOICES {
        chain.render_voice(voice, 0, size);
        sum += match chain.voice_values(0) {
            Some(values) => values[size - 1],
            None => chain.constant_value(voice),
        };
    }
    sum
}

pub fn bench_voices(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/voices");
    let settings = SourceSettings::default();
    let half = SourceSettings {
        intensity: 0.5,
        ..settings
    };

    for &size in BLOCK_SIZES {
        // === VOICE START ONLY ===
        // velocity and key tracking, no per-block work beyond the constant
        let mut sampler = build(
            ModulationMode::Gain,
            ChainKind::VoiceStartOnly,
            &[("Velocity", settings), ("KeyNumber", half)],
        );
        sampler.prepare_to_play(48_000.0, size);
        start_all(&mut sampler);

        group.bench_with_input(BenchmarkId::new("voice_start_only", size), &size, |b, &size| {
            b.iter(|| black_box(render_all(&mut sampler, size)))
        });

        // === GAIN CHAIN ===
        // velocity scaled by a per-voice ADSR: the common amp envelope
        let mut gain = build(
            ModulationMode::Gain,
            ChainKind::Normal,
            &[("Velocity", settings), ("Adsr", settings)],
        );
        gain.prepare_to_play(48_000.0, size);
        start_all(&mut gain);

        group.bench_with_input(BenchmarkId::new("gain_adsr", size), &size, |b, &size| {
            b.iter(|| black_box(render_all(&mut gain, size)))
        });

        // === FULL GAIN CHAIN ===
        // envelope plus a shared LFO folded into every voice
        let mut tremolo = build(
            ModulationMode::Gain,
            ChainKind::Normal,
            &[("Velocity", settings), ("Adsr", settings), ("Lfo", half)],
        );
        tremolo.prepare_to_play(48_000.0, size);
        start_all(&mut tremolo);

        group.bench_with_input(BenchmarkId::new("gain_adsr_lfo", size), &size, |b, &size| {
            b.iter(|| black_box(render_all(&mut tremolo, size)))
        });

        // === PITCH CHAIN ===
        // bipolar LFO vibrato with a pitch envelope
        let bipolar = SourceSettings {
            intensity: 0.1,
            bipolar: true,
            monophonic: false,
        };
        let mut pitch = build(
            ModulationMode::Pitch,
            ChainKind::Normal,
            &[("Random", bipolar), ("SimpleEnvelope", bipolar), ("Lfo", bipolar)],
        );
        pitch.prepare_to_play(48_000.0, size);
        start_all(&mut pitch);

        group.bench_with_input(BenchmarkId::new("pitch_vibrato", size), &size, |b, &size| {
            b.iter(|| black_box(render_all(&mut pitch, size)))
        });
    }

    group.finish();
}
