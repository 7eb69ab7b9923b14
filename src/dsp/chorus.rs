//! Modulated Delay Chorus
//!
//! Chorus/vibrato built on a single stereo delay line whose read offset is
//! swept by a sine LFO around a fixed 5 ms base delay.
//!
//! The LFO is evaluated from a running sample counter, one sample at a time.
//! The counter survives block boundaries, so the modulation is continuous
//! across blocks and the output does not depend on how the driver slices
//! the stream.

use crate::dsp::effect::{apply_params, check_known_params, number_in_range, Effect};
use crate::dsp::ring::{Interpolation, RingDelayLine};
use crate::engine::buffer::{Frame, MAX_SAMPLE_RATE};
use crate::error::{PedalError, Result};
use serde_json::{json, Value};
use std::f64::consts::TAU;

// ============================================================================
// Constants
// ============================================================================

/// Centre of the delay sweep in milliseconds
pub const BASE_DELAY_MS: f64 = 5.0;

/// Sweep depth limit; deeper sweeps would ask for negative delays
const MAX_DEPTH_MS: f32 = 5.0;

/// LFO speed limit in Hz
const MAX_SPEED_HZ: f32 = 20.0;

/// Delay line length: 50 ms at the highest supported sample rate
const RING_CAPACITY: usize = (MAX_SAMPLE_RATE as usize) / 20;

const PARAM_NAMES: [&str; 4] = ["depth_ms", "speed_hz", "mix", "interpolation"];

// ============================================================================
// Chorus Effect
// ============================================================================

/// Chorus/vibrato effect
///
/// # Parameters
/// - `depth_ms`: Sweep depth either side of the 5 ms base delay (0-5 ms)
/// - `speed_hz`: LFO rate (0-20 Hz)
/// - `mix`: Wet proportion (0 = dry only, 1 = pure vibrato)
/// - `interpolation`: `"floor"` (default) or `"linear"`, fixed at construction
#[derive(Debug, Clone)]
pub struct ModulatedDelayChorus {
    depth_ms: f32,
    speed_hz: f32,
    mix: f32,
    ring: RingDelayLine,
    /// Samples processed since construction or reset
    counter: u64,
}

impl ModulatedDelayChorus {
    /// Create a chorus with explicit settings
    pub fn new(depth_ms: f32, speed_hz: f32, mix: f32) -> Result<Self> {
        Self::with_interpolation(depth_ms, speed_hz, mix, Interpolation::Floor)
    }

    /// Create a chorus whose delay line uses the given read policy
    pub fn with_interpolation(
        depth_ms: f32,
        speed_hz: f32,
        mix: f32,
        interpolation: Interpolation,
    ) -> Result<Self> {
        let mut chorus = Self {
            depth_ms: 0.0,
            speed_hz: 0.0,
            mix: 0.0,
            ring: RingDelayLine::new(RING_CAPACITY, interpolation),
            counter: 0,
        };
        chorus.set_param("depth_ms", &json!(depth_ms))?;
        chorus.set_param("speed_hz", &json!(speed_hz))?;
        chorus.set_param("mix", &json!(mix))?;
        Ok(chorus)
    }

    /// Build a chorus from a JSON parameter object, defaults filling the gaps
    pub fn from_params(params: &Value) -> Result<Self> {
        check_known_params("chorus", params, &PARAM_NAMES)?;

        let interpolation = match params.get("interpolation") {
            Some(v) => parse_interpolation(v)?,
            None => Interpolation::Floor,
        };

        let mut chorus = Self::with_interpolation(2.0, 2.0, 0.5, interpolation)?;
        apply_params(params, |name, value| match name {
            "interpolation" => Ok(()),
            _ => chorus.set_param(name, value),
        })?;
        Ok(chorus)
    }

    /// Sweep depth in milliseconds
    pub fn depth_ms(&self) -> f32 {
        self.depth_ms
    }

    /// LFO rate in Hz
    pub fn speed_hz(&self) -> f32 {
        self.speed_hz
    }

    /// Wet proportion
    pub fn mix(&self) -> f32 {
        self.mix
    }

    /// Samples processed so far; drives the LFO phase
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl Default for ModulatedDelayChorus {
    fn default() -> Self {
        Self {
            depth_ms: 2.0,
            speed_hz: 2.0,
            mix: 0.5,
            ring: RingDelayLine::new(RING_CAPACITY, Interpolation::Floor),
            counter: 0,
        }
    }
}

impl Effect for ModulatedDelayChorus {
    fn process(&mut self, frames: &mut [Frame], sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(PedalError::ProcessingFault {
                effect: "chorus".to_string(),
                reason: "sample rate is zero".to_string(),
            });
        }

        let sr = sample_rate as f64;
        let depth = self.depth_ms as f64;
        let speed = self.speed_hz as f64;
        let mix = self.mix;

        let max_delay = (BASE_DELAY_MS + depth) * sr / 1000.0;
        if max_delay >= self.ring.capacity() as f64 {
            return Err(PedalError::ProcessingFault {
                effect: "chorus".to_string(),
                reason: format!(
                    "{} Hz needs a {:.0}-frame delay, the delay line holds {}",
                    sample_rate,
                    max_delay,
                    self.ring.capacity()
                ),
            });
        }

        for frame in frames.iter_mut() {
            let input = *frame;
            self.ring.write(input);

            let lfo = (TAU * speed * (self.counter as f64 / sr)).sin();
            let delay_ms = BASE_DELAY_MS + lfo * depth;
            let delay_samples = delay_ms * sr / 1000.0;
            let wet = self.ring.read_at(delay_samples);

            for ch in 0..frame.len() {
                frame[ch] = input[ch] * (1.0 - mix) + wet[ch] * mix;
            }

            self.counter += 1;
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.ring.reset();
        self.counter = 0;
    }

    fn effect_type(&self) -> &'static str {
        "chorus"
    }

    fn get_params(&self) -> Value {
        json!({
            "depth_ms": self.depth_ms,
            "speed_hz": self.speed_hz,
            "mix": self.mix,
            "interpolation": self.ring.interpolation().as_str()
        })
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "depth_ms" => {
                self.depth_ms = number_in_range("chorus", name, value, 0.0..=MAX_DEPTH_MS)?;
                Ok(())
            }
            "speed_hz" => {
                self.speed_hz = number_in_range("chorus", name, value, 0.0..=MAX_SPEED_HZ)?;
                Ok(())
            }
            "mix" => {
                self.mix = number_in_range("chorus", name, value, 0.0..=1.0)?;
                Ok(())
            }
            "interpolation" => Err(PedalError::invalid_param(
                "chorus",
                name,
                "fixed when the effect is built",
            )),
            _ => Err(PedalError::invalid_param("chorus", name, "unknown parameter")),
        }
    }
}

/// Parse the `interpolation` parameter shared by the delay-line effects
pub(crate) fn parse_interpolation(value: &Value) -> Result<Interpolation> {
    value
        .as_str()
        .and_then(Interpolation::from_name)
        .ok_or_else(|| {
            PedalError::invalid_param(
                "delay line",
                "interpolation",
                format!("expected \"floor\" or \"linear\", got {}", value),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(n: usize) -> Vec<Frame> {
        // Deterministic pseudo-random input, different per channel
        let mut state: u32 = 0x1234_5678;
        (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let l = (state as f32 / u32::MAX as f32) * 2.0 - 1.0;
                let r = ((state >> 7) as f32 / (u32::MAX >> 7) as f32) * 2.0 - 1.0;
                [l, r]
            })
            .collect()
    }

    #[test]
    fn test_chorus_new() {
        let chorus = ModulatedDelayChorus::new(3.0, 2.5, 0.5).unwrap();
        assert_eq!(chorus.depth_ms(), 3.0);
        assert_eq!(chorus.speed_hz(), 2.5);
        assert_eq!(chorus.mix(), 0.5);
        assert_eq!(chorus.counter(), 0);
    }

    #[test]
    fn test_zero_mix_is_identity() {
        let input = noise(2000);
        for (depth, speed) in [(0.0, 0.0), (3.0, 2.5), (5.0, 20.0)] {
            let mut chorus = ModulatedDelayChorus::new(depth, speed, 0.0).unwrap();
            let mut output = input.clone();
            for block in output.chunks_mut(64) {
                chorus.process(block, 32000).unwrap();
            }
            assert_eq!(output, input, "depth {} speed {}", depth, speed);
        }
    }

    #[test]
    fn test_zero_depth_is_fixed_five_ms_delay() {
        for (sample_rate, offset) in [(48000_u32, 240_usize), (32000, 160)] {
            for speed in [0.0, 1.0, 7.5] {
                let input = noise(1000);
                let mut chorus = ModulatedDelayChorus::new(0.0, speed, 1.0).unwrap();
                let mut output = input.clone();
                chorus.process(&mut output, sample_rate).unwrap();

                for i in 0..offset {
                    assert_eq!(output[i], [0.0, 0.0]);
                }
                for i in offset..input.len() {
                    assert_eq!(output[i], input[i - offset], "sample {}", i);
                }
            }
        }
    }

    #[test]
    fn test_output_independent_of_block_size() {
        let input = noise(3000);

        let mut whole = input.clone();
        ModulatedDelayChorus::new(3.0, 2.5, 0.5)
            .unwrap()
            .process(&mut whole, 32000)
            .unwrap();

        for block_size in [1, 7, 64, 500] {
            let mut chorus = ModulatedDelayChorus::new(3.0, 2.5, 0.5).unwrap();
            let mut sliced = input.clone();
            for block in sliced.chunks_mut(block_size) {
                chorus.process(block, 32000).unwrap();
            }
            assert_eq!(sliced, whole, "block size {}", block_size);
            assert_eq!(chorus.counter(), 3000);
        }
    }

    #[test]
    fn test_modulation_moves_the_delay() {
        // An impulse train read through a deep sweep should not come back
        // at a single fixed offset
        let mut chorus = ModulatedDelayChorus::new(5.0, 10.0, 1.0).unwrap();
        let mut frames = vec![[1.0, 1.0]; 4800];
        for (i, frame) in frames.iter_mut().enumerate() {
            *frame = [i as f32, i as f32];
        }
        chorus.process(&mut frames, 48000).unwrap();

        let lags: Vec<f32> = frames
            .iter()
            .enumerate()
            .skip(600)
            .map(|(i, f)| i as f32 - f[0])
            .collect();
        let min = lags.iter().cloned().fold(f32::MAX, f32::min);
        let max = lags.iter().cloned().fold(f32::MIN, f32::max);

        // 5 ms ± 5 ms at 48 kHz sweeps roughly 0..480 samples
        assert!(min < 60.0, "min lag {}", min);
        assert!(max > 420.0, "max lag {}", max);
    }

    #[test]
    fn test_reset_rewinds_counter() {
        let mut chorus = ModulatedDelayChorus::default();
        let mut frames = noise(128);
        chorus.process(&mut frames, 48000).unwrap();
        assert_eq!(chorus.counter(), 128);

        chorus.reset();
        assert_eq!(chorus.counter(), 0);
    }

    #[test]
    fn test_zero_sample_rate_is_a_fault() {
        let mut chorus = ModulatedDelayChorus::default();
        let mut frames = noise(16);
        let err = chorus.process(&mut frames, 0).unwrap_err();
        assert_eq!(err.error_code(), "PROCESSING_FAULT");
    }

    #[test]
    fn test_sample_rate_beyond_delay_line_is_a_fault() {
        let mut chorus = ModulatedDelayChorus::new(5.0, 1.0, 0.5).unwrap();
        let mut frames = vec![[0.25, -0.25]; 16];

        let err = chorus.process(&mut frames, 400_000).unwrap_err();
        assert_eq!(err.error_code(), "PROCESSING_FAULT");
        // Nothing was written or advanced
        assert_eq!(chorus.counter(), 0);
        assert!(frames.iter().all(|f| *f == [0.25, -0.25]));

        // The highest supported rate still fits
        assert!(chorus.process(&mut frames, MAX_SAMPLE_RATE).is_ok());
    }

    #[test]
    fn test_from_params_defaults_and_overrides() {
        let chorus = ModulatedDelayChorus::from_params(&json!({"depth_ms": 3.0})).unwrap();
        assert_eq!(chorus.depth_ms(), 3.0);
        assert_eq!(chorus.speed_hz(), 2.0);
        assert_eq!(chorus.mix(), 0.5);

        let linear =
            ModulatedDelayChorus::from_params(&json!({"interpolation": "linear"})).unwrap();
        assert_eq!(linear.get_params()["interpolation"], "linear");
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(ModulatedDelayChorus::new(6.0, 1.0, 0.5).is_err());
        assert!(ModulatedDelayChorus::new(1.0, -1.0, 0.5).is_err());
        assert!(ModulatedDelayChorus::new(1.0, 1.0, 1.5).is_err());
        assert!(ModulatedDelayChorus::from_params(&json!({"feedback": 0.3})).is_err());
        assert!(ModulatedDelayChorus::from_params(&json!({"interpolation": "cubic"})).is_err());

        let mut chorus = ModulatedDelayChorus::default();
        assert!(chorus.set_param("interpolation", &json!("linear")).is_err());
        assert!(chorus.set_param("mix", &json!("half")).is_err());
    }
}
