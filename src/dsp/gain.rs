//! Gain Effect
//!
//! Level adjustment in dB. Registered under the `internal` kind, so it is
//! driven through the planar (transposed) calling convention.

use crate::dsp::effect::{apply_params, check_known_params, number_in_range, PlanarEffect};
use crate::engine::buffer::{db_to_linear, PlanarBuffer};
use crate::error::{PedalError, Result};
use serde_json::{json, Value};

// ============================================================================
// Constants
// ============================================================================

/// Minimum gain in dB (-96 dB = effectively silent)
const MIN_GAIN_DB: f32 = -96.0;

/// Maximum gain in dB (+24 dB)
const MAX_GAIN_DB: f32 = 24.0;

// ============================================================================
// Gain Effect
// ============================================================================

/// Simple gain adjustment effect
///
/// # Parameters
/// - `gain_db`: Gain in decibels (-96 to +24 dB)
#[derive(Debug, Clone)]
pub struct Gain {
    gain_db: f32,
    gain_linear: f32,
}

impl Gain {
    /// Create a new gain effect
    ///
    /// # Arguments
    /// * `gain_db` - Gain in decibels (-96 to +24 dB)
    ///
    /// # Returns
    /// * `Ok(Gain)` - The gain stage
    /// * `Err(PedalError)` - `InvalidParameter` if `gain_db` is out of range
    pub fn new(gain_db: f32) -> Result<Self> {
        let mut gain = Self::default();
        gain.set_param("gain_db", &json!(gain_db))?;
        Ok(gain)
    }

    /// Build a gain from a JSON parameter object
    ///
    /// # Arguments
    /// * `params` - `null` for unity gain, or an object with `gain_db`
    ///
    /// # Returns
    /// * `Ok(Gain)` - The gain stage
    /// * `Err(PedalError)` - `InvalidParameter` for unknown keys or bad values
    pub fn from_params(params: &Value) -> Result<Self> {
        check_known_params("gain", params, &["gain_db"])?;
        let mut gain = Self::default();
        apply_params(params, |name, value| gain.set_param(name, value))?;
        Ok(gain)
    }

    /// Get the current gain in decibels
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Get the current linear gain multiplier
    pub fn gain_linear(&self) -> f32 {
        self.gain_linear
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self {
            gain_db: 0.0,
            gain_linear: 1.0,
        }
    }
}

impl PlanarEffect for Gain {
    fn process(&mut self, buffer: &mut PlanarBuffer, _sample_rate: u32) -> Result<()> {
        // Unity gain optimization
        if (self.gain_linear - 1.0).abs() < f32::EPSILON {
            return Ok(());
        }

        for channel in 0..buffer.num_channels() {
            for sample in buffer.channel_mut(channel).iter_mut() {
                *sample *= self.gain_linear;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        // Gain has no internal state to reset
    }

    fn effect_type(&self) -> &'static str {
        "gain"
    }

    fn get_params(&self) -> Value {
        json!({
            "gain_db": self.gain_db,
            "gain_linear": self.gain_linear
        })
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "gain_db" => {
                self.gain_db = number_in_range("gain", name, value, MIN_GAIN_DB..=MAX_GAIN_DB)?;
                self.gain_linear = db_to_linear(self.gain_db);
                Ok(())
            }
            _ => Err(PedalError::invalid_param("gain", name, "unknown parameter")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
