//! Benchmarks for monophonic modulation applied outside the voice loop.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_modchain::{
    dsp::ModulationMode, source::factory::ChainFactory, ChainKind, ChainOptions, ModulationChain,
    NoteInfo, SourceSettings,
};

use crate::BLOCK_SIZES;

pub fn bench_mono(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/mono");
    let factory = ChainFactory::default();
    let mono = SourceSettings {
        monophonic: true,
        ..SourceSettings::default()
    };

    for &size in BLOCK_SIZES {
        let mut left = vec![1.0f32; size];
        let mut right = vec![1.0f32; size];

        // Mono envelope and LFO multiplied into the summed output.
        let options = ChainOptions {
            include_monophonic_values: false,
            ..ChainOptions::default()
        };
        let mut chain =
            ModulationChain::new("bench", ModulationMode::Gain, ChainKind::Normal, 1).with_options(options);

        for name in ["Adsr", "Lfo"] {
            if let Ok(modulator) = factory.create(name, 1, mono) {
                let _ = chain.add_source(modulator, None);
            }
        }

        chain.prepare_to_play(48_000.0, size);
        chain.start_voice(0, NoteInfo::new(60, 100));

        group.bench_with_input(BenchmarkId::new("apply_stereo", size), &size, |b, &size| {
            b.iter(|| {
                chain.render_block(0, size);
                let mut channels = [left.as_mut_slice(), right.as_mut_slice()];
                chain.apply_monophonic_values(black_box(&mut channels), 0, size);
            })
        });
    }

    group.finish();
}
