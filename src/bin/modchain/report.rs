/// What one voice produced during one block.
#[derive(Debug, Clone, Copy)]
pub enum VoiceSummary {
    Constant(f32),
    Dynamic { first: f32, last: f32, min: f32, max: f32 },
}

impl VoiceSummary {
    pub fn constant(value: f32) -> Self {
        VoiceSummary::Constant(value)
    }

    pub fn dynamic(values: &[f32]) -> Self {
        let first = values.first().copied().unwrap_or(0.0);
        let last = values.last().copied().unwrap_or(0.0);
        let (min, max) = values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        VoiceSummary::Dynamic {
            first,
            last,
            min,
            max,
        }
    }
}

struct Row {
    block: usize,
    voice: usize,
    summary: VoiceSummary,
    playing: bool,
}

/// Collects per-block results and prints them as a table.
pub struct Report {
    starts: Vec<(f32, f32)>,
    rows: Vec<Row>,
}

impl Report {
    pub fn new(voices: usize) -> Self {
        Self {
            starts: vec![(1.0, 0.0); voices],
            rows: Vec::new(),
        }
    }

    pub fn start(&mut self, voice: usize, constant: f32, first_value: f32) {
        if let Some(slot) = self.starts.get_mut(voice) {
            *slot = (constant, first_value);
        }
    }

    pub fn block(&mut self, block: usize, voice: usize, summary: VoiceSummary, playing: bool) {
        self.rows.push(Row {
            block,
            voice,
            summary,
            playing,
        });
    }

    pub fn print(&self) {
        println!("voice  constant  first");
        for (voice, (constant, first)) in self.starts.iter().enumerate() {
            println!("{voice:>5}  {constant:>8.4}  {first:>6.4}");
        }

        println!();
        println!("block  voice  playing  values");
        for row in &self.rows {
            let values = match row.summary {
                VoiceSummary::Constant(value) => format!("const {value:.4}"),
                VoiceSummary::Dynamic {
                    first,
                    last,
                    min,
                    max,
                } => format!("{first:.4} -> {last:.4}  [{min:.4}, {max:.4}]"),
            };
            println!(
                "{:>5}  {:>5}  {:>7}  {}",
                row.block,
                row.voice,
                if row.playing { "yes" } else { "no" },
                values
            );
        }
    }
}
