use std::f32::consts::TAU;

use crate::{
    dsp::intensity::bipolar_to_unipolar,
    source::{ModulationSource, NoteInfo, SourceKind},
    DEFAULT_CONTROL_RATE,
};

/*
Time-Variant Sources
====================

A time-variant source renders a single ramp per block that every voice
shares: an LFO that keeps running regardless of which notes are held, or a
MIDI controller everyone follows. The chain renders these once into its
monophonic buffer, then either multiplies that buffer into each voice or
hands it to the consumer separately.

They run at control rate, so a 5 Hz LFO at 48 kHz with K = 8 advances by
5 / 6000 of a cycle per tick.

Output is unipolar (0.0..1.0). Mark the source bipolar in its settings to
have the chain center it around 0.5 for pitch modulation.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoWaveform {
    Sine,
    Triangle,
    Saw,
    Square,
}

impl LfoWaveform {
    /// Bipolar value (-1.0..1.0) at `phase` (0.0..1.0).
    #[inline]
    fn value_at(self, phase: f32) -> f32 {
        match self {
            LfoWaveform::Sine => (phase * TAU).sin(),
            LfoWaveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            LfoWaveform::Saw => 2.0 * phase - 1.0,
            LfoWaveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

pub struct LfoSource {
    waveform: LfoWaveform,
    frequency: f32,
    phase: f32,
    control_rate: f32,
    retrigger: bool,
    current: f32,
}

impl LfoSource {
    pub fn new(waveform: LfoWaveform, frequency: f32) -> Self {
        Self {
            waveform,
            frequency: frequency.max(0.0),
            phase: 0.0,
            control_rate: DEFAULT_CONTROL_RATE,
            retrigger: false,
            current: bipolar_to_unipolar(waveform.value_at(0.0)),
        }
    }

    pub fn sine(frequency: f32) -> Self {
        Self::new(LfoWaveform::Sine, frequency)
    }

    pub fn triangle(frequency: f32) -> Self {
        Self::new(LfoWaveform::Triangle, frequency)
    }

    /// Restart the cycle on every voice start instead of free-running.
    pub fn with_retrigger(mut self, retrigger: bool) -> Self {
        self.retrigger = retrigger;
        self
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency.max(0.0);
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }
}

impl ModulationSource for LfoSource {
    fn kind(&self) -> SourceKind {
        SourceKind::TimeVariant
    }

    fn type_name(&self) -> &'static str {
        "Lfo"
    }

    fn num_voices(&self) -> Option<usize> {
        None
    }

    fn prepare(&mut self, control_rate: f32) {
        self.control_rate = control_rate;
    }

    fn start_voice(&mut self, _voice: usize, _note: NoteInfo) -> f32 {
        if self.retrigger {
            self.phase = 0.0;
            self.current = bipolar_to_unipolar(self.waveform.value_at(0.0));
        }
        self.current
    }

    fn render(&mut self, _voice: usize, out: &mut [f32]) {
        let increment = self.frequency / self.control_rate;

        for sample in out.iter_mut() {
            self.current = bipolar_to_unipolar(self.waveform.value_at(self.phase));
            *sample = self.current;

            self.phase += increment;
            if self.phase >= 1.0 {
                self.phase -= self.phase.floor();
            }
        }
    }
}

/// Follows a MIDI continuous controller, smoothing jumps linearly.
pub struct ControlSource {
    controller: u8,
    target: f32,
    current: f32,
    smoothing_time: f32,
    step: f32,
    control_rate: f32,
}

impl ControlSource {
    pub fn new(controller: u8) -> Self {
        Self {
            controller,
            target: 0.0,
            current: 0.0,
            smoothing_time: 0.05,
            step: 0.0,
            control_rate: DEFAULT_CONTROL_RATE,
        }
    }

    pub fn with_smoothing(mut self, seconds: f32) -> Self {
        self.smoothing_time = seconds.max(0.0);
        self
    }

    pub fn controller(&self) -> u8 {
        self.controller
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    fn set_target(&mut self, target: f32) {
        self.target = target;
        let ticks = (self.smoothing_time * self.control_rate).max(1.0);
        self.step = (self.target - self.current) / ticks;
    }
}

impl ModulationSource for ControlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::TimeVariant
    }

    fn type_name(&self) -> &'static str {
        "Control"
    }

    fn num_voices(&self) -> Option<usize> {
        None
    }

    fn prepare(&mut self, control_rate: f32) {
        self.control_rate = control_rate;
    }

    fn start_voice(&mut self, _voice: usize, _note: NoteInfo) -> f32 {
        self.current
    }

    fn render(&mut self, _voice: usize, out: &mut [f32]) {
        for sample in out.iter_mut() {
            if self.current != self.target {
                self.current += self.step;

                let overshoot = (self.step > 0.0 && self.current > self.target)
                    || (self.step < 0.0 && self.current < self.target)
                    || self.step == 0.0;
                if overshoot {
                    self.current = self.target;
                }
            }
            *sample = self.current;
        }
    }

    fn handle_controller(&mut self, number: u8, value: u8) {
        if number == self.controller {
            self.set_target(value.min(127) as f32 / 127.0);
        }
    }
}
