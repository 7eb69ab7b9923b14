//! Block layouts used on the real-time path
//!
//! The driver hands the engine interleaved stereo frames (samples × 2). Custom
//! effects consume that layout directly. Opaque effects expect planar audio
//! (channels × samples), held in a [`PlanarBuffer`] that is allocated once when
//! the chain is built and refilled in place for every block.

// ============================================================================
// Constants
// ============================================================================

/// Number of channels carried through the pedalboard (stereo only)
pub const CHANNELS: usize = 2;

/// Highest sample rate the delay lines are sized for
pub const MAX_SAMPLE_RATE: u32 = 48000;

/// Lowest sample rate the engine accepts
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Largest block the engine and its scratch buffers accept
pub const MAX_BLOCK_SIZE: usize = 4096;

/// One stereo sample: `[left, right]`
pub type Frame = [f32; CHANNELS];

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Check that every sample in a block is finite (not NaN or Infinity)
pub fn frames_are_finite(frames: &[Frame]) -> bool {
    frames.iter().flatten().all(|s| s.is_finite())
}

/// Calculate the RMS level of one channel of a block in dB
pub fn channel_rms_db(frames: &[Frame], channel: usize) -> f32 {
    if frames.is_empty() || channel >= CHANNELS {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = frames
        .iter()
        .map(|frame| {
            let s = frame[channel] as f64;
            s * s
        })
        .sum();

    linear_to_db((sum_squares / frames.len() as f64).sqrt() as f32)
}

// ============================================================================
// Planar Buffer
// ============================================================================

/// Channel-major audio: outer Vec is channels, inner Vec is samples
///
/// This is the layout of the "transposed" dialect. The chain keeps one per
/// opaque effect, pre-allocated to the engine's block size, so refilling it
/// on the audio thread never allocates.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarBuffer {
    /// Sample data: `samples[channel][index]`
    pub samples: Vec<Vec<f32>>,
}

impl PlanarBuffer {
    /// Create an empty stereo buffer able to hold `capacity` samples per channel
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: (0..CHANNELS).map(|_| Vec::with_capacity(capacity)).collect(),
        }
    }

    /// Create a planar buffer holding a copy of `frames`
    pub fn from_frames(frames: &[Frame]) -> Self {
        let mut buffer = Self::with_capacity(frames.len());
        buffer.load_frames(frames);
        buffer
    }

    /// Transpose `frames` into this buffer, replacing its contents
    pub fn load_frames(&mut self, frames: &[Frame]) {
        self.samples.resize_with(CHANNELS, Vec::new);
        for (ch, channel) in self.samples.iter_mut().enumerate() {
            channel.clear();
            channel.extend(frames.iter().map(|frame| frame[ch]));
        }
    }

    /// Transpose this buffer back into `frames`
    ///
    /// The caller checks [`PlanarBuffer::has_shape`] first; any samples beyond
    /// the shorter of the two lengths are left untouched.
    pub fn store_frames(&self, frames: &mut [Frame]) {
        for (ch, channel) in self.samples.iter().take(CHANNELS).enumerate() {
            for (frame, &sample) in frames.iter_mut().zip(channel.iter()) {
                frame[ch] = sample;
            }
        }
    }

    /// Get the number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// True if the buffer is stereo with `num_samples` in every channel
    pub fn has_shape(&self, num_samples: usize) -> bool {
        self.samples.len() == CHANNELS && self.samples.iter().all(|ch| ch.len() == num_samples)
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }
}

// ============================================================================
// Tests
// ============================================================================
