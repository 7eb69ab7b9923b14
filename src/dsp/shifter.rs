//! Granular Pitch Shifter
//!
//! Time-domain pitch shifting with two taps reading a shared delay line.
//! Each tap's delay sweeps linearly across a window and wraps; reading a
//! delay that grows by `1 - ratio` samples per sample plays the input back
//! at `ratio` times its speed, which shifts the pitch by that ratio.
//!
//! The taps sit half a cycle apart and are weighted by triangle windows, so
//! whenever one tap jumps at its wrap point (gain 0) the other is at full
//! gain. That crossfade hides the discontinuity a single tap would click on.
//!
//! A window shorter than one sample is clamped to one sample. The sweep then
//! has nowhere to go and the effect becomes a plain short delay with no
//! audible pitch change; that is expected behaviour, not a fault.

use crate::dsp::chorus::parse_interpolation;
use crate::dsp::effect::{apply_params, check_known_params, number_in_range, Effect};
use crate::dsp::ring::{Interpolation, RingDelayLine};
use crate::engine::buffer::{Frame, MAX_BLOCK_SIZE, MAX_SAMPLE_RATE};
use crate::error::{PedalError, Result};
use serde_json::{json, Value};

// ============================================================================
// Constants
// ============================================================================

/// Minimum ring length, generous for the default 30 ms window
const MIN_RING_CAPACITY: usize = 16000;

/// Longest supported window in milliseconds
const MAX_WINDOW_MS: f32 = 200.0;

/// Shift limit in either direction (two octaves)
const MAX_SEMITONES: f32 = 24.0;

const PARAM_NAMES: [&str; 4] = ["semitones", "mix", "window_ms", "interpolation"];

// ============================================================================
// Helper Functions
// ============================================================================

/// Wrap a phase into [0, 1)
///
/// `rem_euclid` can round up to exactly 1.0 for tiny negative inputs; that
/// case folds back to 0.0.
#[inline]
fn wrap_unit(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(1.0);
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Triangle window: 0 at the sweep edges, 1 in the middle
#[inline]
fn triangle(phase: f64) -> f32 {
    (1.0 - 2.0 * (phase - 0.5).abs()) as f32
}

/// Window length in samples for a sample rate
#[inline]
fn window_len(sample_rate: u32, window_ms: f32) -> usize {
    let len = (sample_rate as f64 * window_ms as f64 / 1000.0).round();
    (len as usize).max(1)
}

// ============================================================================
// Pitch Shifter Effect
// ============================================================================

/// Dual-tap granular pitch shifter
///
/// # Parameters
/// - `semitones`: Shift amount (-24 to +24), may change while running
/// - `mix`: Wet proportion (0 = dry only, 1 = fully shifted)
/// - `window_ms`: Sweep window (0-200 ms)
/// - `interpolation`: `"floor"` (default) or `"linear"`, fixed at construction
///
/// # Example
/// ```
/// use pedalboard::dsp::{Effect, GranularPitchShifter};
///
/// let mut shifter = GranularPitchShifter::new(-12.0, 1.0, 30.0).unwrap();
/// assert!((shifter.pitch_ratio() - 0.5).abs() < 1e-12);
///
/// let mut block = vec![[0.0_f32; 2]; 64];
/// shifter.process(&mut block, 32000).unwrap();
/// assert_eq!(block.len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct GranularPitchShifter {
    semitones: f32,
    mix: f32,
    window_ms: f32,
    /// `2^(semitones / 12)`, kept in step with `semitones`
    pitch_ratio: f64,
    /// Delay growth per processed sample, `1 - pitch_ratio`
    delay_rate: f64,
    ring: RingDelayLine,
    /// Sweep position in [0, 1), carried across blocks
    phase: f64,
}

impl GranularPitchShifter {
    /// Create a shifter with explicit settings
    pub fn new(semitones: f32, mix: f32, window_ms: f32) -> Result<Self> {
        Self::with_interpolation(semitones, mix, window_ms, Interpolation::Floor)
    }

    /// Create a shifter whose delay line uses the given read policy
    ///
    /// The ring is sized for the window at the highest supported sample rate
    /// plus one full block, since a whole block is written before any tap is
    /// read.
    pub fn with_interpolation(
        semitones: f32,
        mix: f32,
        window_ms: f32,
        interpolation: Interpolation,
    ) -> Result<Self> {
        let window_ms =
            number_in_range("pitch_shift", "window_ms", &json!(window_ms), 0.0..=MAX_WINDOW_MS)?;
        let capacity =
            (window_len(MAX_SAMPLE_RATE, window_ms) + MAX_BLOCK_SIZE + 2).max(MIN_RING_CAPACITY);

        let mut shifter = Self {
            semitones: 0.0,
            mix: 1.0,
            window_ms,
            pitch_ratio: 1.0,
            delay_rate: 0.0,
            ring: RingDelayLine::new(capacity, interpolation),
            phase: 0.0,
        };
        shifter.set_semitones(semitones)?;
        shifter.set_param("mix", &json!(mix))?;
        Ok(shifter)
    }

    /// Build a shifter from a JSON parameter object, defaults filling the gaps
    pub fn from_params(params: &Value) -> Result<Self> {
        check_known_params("pitch_shift", params, &PARAM_NAMES)?;

        let interpolation = match params.get("interpolation") {
            Some(v) => parse_interpolation(v)?,
            None => Interpolation::Floor,
        };
        let window_ms = match params.get("window_ms") {
            Some(v) => number_in_range("pitch_shift", "window_ms", v, 0.0..=MAX_WINDOW_MS)?,
            None => 30.0,
        };

        let mut shifter = Self::with_interpolation(-12.0, 1.0, window_ms, interpolation)?;
        apply_params(params, |name, value| match name {
            "interpolation" | "window_ms" => Ok(()),
            _ => shifter.set_param(name, value),
        })?;
        Ok(shifter)
    }

    /// Change the shift amount
    ///
    /// The pitch ratio and delay rate are recomputed here, so the next block
    /// always runs with coefficients that match `semitones`.
    pub fn set_semitones(&mut self, semitones: f32) -> Result<()> {
        let semitones = number_in_range(
            "pitch_shift",
            "semitones",
            &json!(semitones),
            -MAX_SEMITONES..=MAX_SEMITONES,
        )?;
        self.semitones = semitones;
        self.pitch_ratio = 2.0_f64.powf(semitones as f64 / 12.0);
        self.delay_rate = 1.0 - self.pitch_ratio;
        Ok(())
    }

    /// Shift amount in semitones
    pub fn semitones(&self) -> f32 {
        self.semitones
    }

    /// Playback speed ratio applied to the input
    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    /// Delay growth per processed sample
    pub fn delay_rate(&self) -> f64 {
        self.delay_rate
    }

    /// Wet proportion
    pub fn mix(&self) -> f32 {
        self.mix
    }

    /// Sweep window in milliseconds
    pub fn window_ms(&self) -> f32 {
        self.window_ms
    }

    /// Current sweep position in [0, 1)
    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl Default for GranularPitchShifter {
    fn default() -> Self {
        Self {
            semitones: -12.0,
            mix: 1.0,
            window_ms: 30.0,
            pitch_ratio: 0.5,
            delay_rate: 0.5,
            ring: RingDelayLine::new(MIN_RING_CAPACITY, Interpolation::Floor),
            phase: 0.0,
        }
    }
}

impl Effect for GranularPitchShifter {
    fn process(&mut self, frames: &mut [Frame], sample_rate: u32) -> Result<()> {
        let n = frames.len();
        if n == 0 {
            return Ok(());
        }

        let window = window_len(sample_rate, self.window_ms);
        if n + window >= self.ring.capacity() {
            return Err(PedalError::ProcessingFault {
                effect: "pitch_shift".to_string(),
                reason: format!(
                    "block of {} frames with a {}-sample window exceeds the {}-frame delay line",
                    n,
                    window,
                    self.ring.capacity()
                ),
            });
        }

        let window_f = window as f64;
        let phase_step = self.delay_rate / window_f;
        let mix = self.mix;

        // The whole block goes in first; sample i was written (n - 1 - i)
        // writes before the newest frame.
        for frame in frames.iter() {
            self.ring.write(*frame);
        }

        for (i, frame) in frames.iter_mut().enumerate() {
            let local = wrap_unit(self.phase + i as f64 * phase_step);
            let opposite = wrap_unit(local + 0.5);

            let age = (n - 1 - i) as f64;
            let tap_a = self.ring.read_at(age + local * window_f);
            let tap_b = self.ring.read_at(age + opposite * window_f);
            let gain_a = triangle(local);
            let gain_b = triangle(opposite);

            let input = *frame;
            for ch in 0..frame.len() {
                let wet = tap_a[ch] * gain_a + tap_b[ch] * gain_b;
                frame[ch] = input[ch] * (1.0 - mix) + wet * mix;
            }
        }

        self.phase = wrap_unit(self.phase + n as f64 * phase_step);
        Ok(())
    }

    fn reset(&mut self) {
        self.ring.reset();
        self.phase = 0.0;
    }

    fn effect_type(&self) -> &'static str {
        "pitch_shift"
    }

    fn get_params(&self) -> Value {
        json!({
            "semitones": self.semitones,
            "mix": self.mix,
            "window_ms": self.window_ms,
            "pitch_ratio": self.pitch_ratio,
            "interpolation": self.ring.interpolation().as_str()
        })
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "semitones" => {
                let semitones = value.as_f64().ok_or_else(|| {
                    PedalError::invalid_param(
                        "pitch_shift",
                        name,
                        format!("expected number, got {}", value),
                    )
                })?;
                self.set_semitones(semitones as f32)
            }
            "mix" => {
                self.mix = number_in_range("pitch_shift", name, value, 0.0..=1.0)?;
                Ok(())
            }
            "window_ms" | "interpolation" => Err(PedalError::invalid_param(
                "pitch_shift",
                name,
                "fixed when the effect is built",
            )),
            _ => Err(PedalError::invalid_param("pitch_shift", name, "unknown parameter")),
        }
    }
}
