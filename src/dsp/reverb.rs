//! Reverb Effect
//!
//! Freeverb-style room reverb:
//! - 8 parallel low-pass feedback comb filters per channel
//! - 4 series allpass filters per channel for diffusion
//! - Stereo width control on the wet signal
//!
//! Registered under the `internal` kind, so it is driven through the planar
//! (transposed) calling convention. Filter storage is sized once for the
//! highest supported sample rate; a change of sample rate only retunes the
//! delays.

use crate::dsp::effect::{apply_params, check_known_params, number_in_range, PlanarEffect};
use crate::engine::buffer::{PlanarBuffer, MAX_SAMPLE_RATE};
use crate::error::{PedalError, Result};
use serde_json::{json, Value};

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Sample rate the delay tunings below are given for
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at 44100 Hz
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Extra delay on the right channel, in samples at 44100 Hz
const STEREO_SPREAD: usize = 23;

/// Input attenuation before the comb bank
const INPUT_GAIN: f32 = 0.015;

/// Fixed allpass feedback
const ALLPASS_GAIN: f32 = 0.5;

/// Room size to comb feedback: `room_size * ROOM_SCALE + ROOM_OFFSET`
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;

/// Damping to low-pass coefficient
const DAMP_SCALE: f32 = 0.4;

const PARAM_NAMES: [&str; 5] = ["room_size", "damping", "wet_level", "dry_level", "width"];

// ============================================================================
// Filter Components
// ============================================================================

/// Buffer length able to hold `delay` (given at 44100 Hz) at any supported rate
fn buffer_len(delay: usize) -> usize {
    (scale_delay(delay, MAX_SAMPLE_RATE) + 1).next_power_of_two()
}

/// Convert a 44100 Hz delay to `sample_rate`, at least one sample
fn scale_delay(delay: usize, sample_rate: u32) -> usize {
    ((delay as f64 * sample_rate as f64 / REFERENCE_SAMPLE_RATE) as usize).max(1)
}

/// Low-pass feedback comb filter
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
    delay: usize,
    /// One-pole low-pass state in the feedback path
    filter_state: f32,
}

impl CombFilter {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len],
            write_pos: 0,
            mask: len - 1,
            delay: 1,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp1: f32, damp2: f32) -> f32 {
        let read_pos = (self.write_pos + self.buffer.len() - self.delay) & self.mask;
        let output = self.buffer[read_pos];

        self.filter_state = output * damp1 + self.filter_state * damp2;
        self.buffer[self.write_pos] = input + self.filter_state * feedback;
        self.write_pos = (self.write_pos + 1) & self.mask;

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.write_pos = 0;
    }
}

/// Schroeder allpass used for diffusion
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
    delay: usize,
}

impl AllpassFilter {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len],
            write_pos: 0,
            mask: len - 1,
            delay: 1,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let read_pos = (self.write_pos + self.buffer.len() - self.delay) & self.mask;
        let delayed = self.buffer[read_pos];

        let output = delayed - ALLPASS_GAIN * input;
        self.buffer[self.write_pos] = input + ALLPASS_GAIN * output;
        self.write_pos = (self.write_pos + 1) & self.mask;

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Comb bank and allpass chain for one output channel
#[derive(Debug, Clone)]
struct Tank {
    combs: [CombFilter; 8],
    allpasses: [AllpassFilter; 4],
    /// Added to every tuning delay (stereo spread)
    offset: usize,
}

impl Tank {
    fn new(offset: usize) -> Self {
        Self {
            combs: std::array::from_fn(|i| CombFilter::new(buffer_len(COMB_DELAYS[i] + offset))),
            allpasses: std::array::from_fn(|i| {
                AllpassFilter::new(buffer_len(ALLPASS_DELAYS[i] + offset))
            }),
            offset,
        }
    }

    /// Set every delay for `sample_rate` and clear the tails
    fn tune(&mut self, sample_rate: u32) {
        for (comb, &delay) in self.combs.iter_mut().zip(COMB_DELAYS.iter()) {
            comb.delay = scale_delay(delay + self.offset, sample_rate);
            comb.clear();
        }
        for (allpass, &delay) in self.allpasses.iter_mut().zip(ALLPASS_DELAYS.iter()) {
            allpass.delay = scale_delay(delay + self.offset, sample_rate);
            allpass.clear();
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp1: f32, damp2: f32) -> f32 {
        let mut sum = 0.0;
        for comb in &mut self.combs {
            sum += comb.process(input, feedback, damp1, damp2);
        }
        self.allpasses
            .iter_mut()
            .fold(sum, |signal, allpass| allpass.process(signal))
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
        self.allpasses.iter_mut().for_each(AllpassFilter::clear);
    }
}

// ============================================================================
// Reverb Effect
// ============================================================================

/// Room reverb
///
/// # Parameters
/// - `room_size`: Tail length, 0 (small) to 1 (large hall)
/// - `damping`: High-frequency absorption, 0 (bright) to 1 (dark)
/// - `wet_level`: Level of the reverberated signal (0-1)
/// - `dry_level`: Level of the direct signal (0-1)
/// - `width`: Stereo width of the tail, 0 (mono) to 1 (full)
#[derive(Debug, Clone)]
pub struct Reverb {
    room_size: f32,
    damping: f32,
    wet_level: f32,
    dry_level: f32,
    width: f32,
    left: Tank,
    right: Tank,
    /// Sample rate the tanks are tuned for; 0 before the first block
    tuned_rate: u32,
}

impl Reverb {
    /// Create a reverb with the given room size and default levels
    ///
    /// # Arguments
    /// * `room_size` - Tail length from 0 (small) to 1 (large hall)
    ///
    /// # Returns
    /// * `Ok(Reverb)` - The configured reverb
    /// * `Err(PedalError)` - `InvalidParameter` if `room_size` is out of range
    pub fn new(room_size: f32) -> Result<Self> {
        let mut reverb = Self::default();
        reverb.set_param("room_size", &json!(room_size))?;
        Ok(reverb)
    }

    /// Build a reverb from a JSON parameter object
    ///
    /// Missing parameters keep their defaults.
    pub fn from_params(params: &Value) -> Result<Self> {
        check_known_params("reverb", params, &PARAM_NAMES)?;
        let mut reverb = Self::default();
        apply_params(params, |name, value| reverb.set_param(name, value))?;
        Ok(reverb)
    }

    pub fn room_size(&self) -> f32 {
        self.room_size
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn wet_level(&self) -> f32 {
        self.wet_level
    }

    pub fn dry_level(&self) -> f32 {
        self.dry_level
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    fn feedback(&self) -> f32 {
        self.room_size * ROOM_SCALE + ROOM_OFFSET
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet_level: 0.33,
            dry_level: 0.4,
            width: 1.0,
            left: Tank::new(0),
            right: Tank::new(STEREO_SPREAD),
            tuned_rate: 0,
        }
    }
}

impl PlanarEffect for Reverb {
    fn process(&mut self, buffer: &mut PlanarBuffer, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 || sample_rate > MAX_SAMPLE_RATE {
            return Err(PedalError::ProcessingFault {
                effect: "reverb".to_string(),
                reason: format!(
                    "{} Hz is outside the 1..={} Hz the filters are sized for",
                    sample_rate, MAX_SAMPLE_RATE
                ),
            });
        }
        if sample_rate != self.tuned_rate {
            self.left.tune(sample_rate);
            self.right.tune(sample_rate);
            self.tuned_rate = sample_rate;
        }

        let feedback = self.feedback();
        let damp2 = self.damping * DAMP_SCALE;
        let damp1 = 1.0 - damp2;
        let wet1 = self.wet_level * (1.0 + self.width) / 2.0;
        let wet2 = self.wet_level * (1.0 - self.width) / 2.0;
        let dry = self.dry_level;

        for i in 0..buffer.num_samples() {
            let in_left = buffer.channel(0)[i];
            let in_right = buffer.channel(1)[i];
            let input = (in_left + in_right) * INPUT_GAIN;

            let out_left = self.left.process(input, feedback, damp1, damp2);
            let out_right = self.right.process(input, feedback, damp1, damp2);

            buffer.channel_mut(0)[i] = in_left * dry + out_left * wet1 + out_right * wet2;
            buffer.channel_mut(1)[i] = in_right * dry + out_right * wet1 + out_left * wet2;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    fn effect_type(&self) -> &'static str {
        "reverb"
    }

    fn get_params(&self) -> Value {
        json!({
            "room_size": self.room_size,
            "damping": self.damping,
            "wet_level": self.wet_level,
            "dry_level": self.dry_level,
            "width": self.width
        })
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let slot = match name {
            "room_size" => &mut self.room_size,
            "damping" => &mut self.damping,
            "wet_level" => &mut self.wet_level,
            "dry_level" => &mut self.dry_level,
            "width" => &mut self.width,
            _ => return Err(PedalError::invalid_param("reverb", name, "unknown parameter")),
        };
        *slot = number_in_range("reverb", name, value, 0.0..=1.0)?;
        Ok(())
    }
}
