//! SIMD-aligned scratch storage for modulation rendering.

use crate::SIMD_WIDTH;

/*
Buffer Layout
=============

A chain needs three float regions, each large enough for one audio block:

  voice     Per-voice working values. Rendered at control rate into the
            front of the region, then expanded in place to audio rate.

  mono      Monophonic values shared by every voice in the block.

  scratch   Where a single source renders before it is folded into voice
            or mono. Also the temp buffer for in-place expansion.

All three live in one allocation so a chain owns exactly one heap block:

    data: [pad][ voice ........ ][ mono ......... ][ scratch ...... ][slack]
           ^    ^ aligned         ^ aligned         ^ aligned

The allocation is `(SIMD_WIDTH + max_block_size) * 3` floats, which leaves
room for the leading pad plus rounding every region up to a SIMD multiple.
It only ever grows: shrinking the block size keeps the larger allocation.
*/

const ALIGN_BYTES: usize = SIMD_WIDTH * std::mem::size_of::<f32>();

#[inline]
fn round_up(n: usize) -> usize {
    n.div_ceil(SIMD_WIDTH) * SIMD_WIDTH
}

/// Mutable views into all three regions at once.
pub struct Regions<'a> {
    pub voice: &'a mut [f32],
    pub mono: &'a mut [f32],
    pub scratch: &'a mut [f32],
}

#[derive(Debug, Default)]
pub struct ModBuffer {
    data: Vec<f32>,
    max_block_size: usize,
    voice_offset: usize,
    mono_offset: usize,
    scratch_offset: usize,
}

impl ModBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make room for blocks of up to `max_block_size` samples.
    ///
    /// Returns true if the storage was reallocated. Not realtime-safe.
    pub fn set_max_size(&mut self, max_block_size: usize) -> bool {
        let required = (SIMD_WIDTH + max_block_size) * 3;
        let grew = required > self.data.len();

        if grew {
            self.max_block_size = max_block_size;
            self.data = vec![0.0; required];
        }

        self.update_offsets();
        grew
    }

    /// Release the storage.
    pub fn clear(&mut self) {
        self.data = Vec::new();
        self.max_block_size = 0;
        self.voice_offset = 0;
        self.mono_offset = 0;
        self.scratch_offset = 0;
    }

    fn update_offsets(&mut self) {
        let pad = self.data.as_ptr().align_offset(ALIGN_BYTES);
        debug_assert!(pad < SIMD_WIDTH, "f32 storage must reach 16-byte alignment");
        let pad = pad.min(SIMD_WIDTH - 1);

        let stride = round_up(self.max_block_size);

        self.voice_offset = pad;
        self.mono_offset = self.voice_offset + stride;
        self.scratch_offset = self.mono_offset + stride;
    }

    pub fn is_allocated(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Number of floats currently allocated.
    pub fn allocated(&self) -> usize {
        self.data.len()
    }

    pub fn voice(&self) -> &[f32] {
        &self.data[self.voice_offset..self.voice_offset + self.max_block_size]
    }

    pub fn voice_mut(&mut self) -> &mut [f32] {
        &mut self.data[self.voice_offset..self.voice_offset + self.max_block_size]
    }

    pub fn mono(&self) -> &[f32] {
        &self.data[self.mono_offset..self.mono_offset + self.max_block_size]
    }

    pub fn mono_mut(&mut self) -> &mut [f32] {
        &mut self.data[self.mono_offset..self.mono_offset + self.max_block_size]
    }

    pub fn scratch_mut(&mut self) -> &mut [f32] {
        &mut self.data[self.scratch_offset..self.scratch_offset + self.max_block_size]
    }

    /// Split the storage into its three regions.
    pub fn regions_mut(&mut self) -> Regions<'_> {
        let len = self.max_block_size;
        let (_, rest) = self.data.split_at_mut(self.voice_offset);
        let (voice, rest) = rest.split_at_mut(self.mono_offset - self.voice_offset);
        let (mono, rest) = rest.split_at_mut(self.scratch_offset - self.mono_offset);

        Regions {
            voice: &mut voice[..len],
            mono: &mut mono[..len],
            scratch: &mut rest[..len],
        }
    }
}
