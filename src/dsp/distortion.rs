//! Distortion Effect
//!
//! Drive-into-tanh waveshaper. Registered under the `internal` kind, so it
//! is driven through the planar (transposed) calling convention.

use crate::dsp::effect::{apply_params, check_known_params, number_in_range, PlanarEffect};
use crate::engine::buffer::{db_to_linear, PlanarBuffer};
use crate::error::{PedalError, Result};
use serde_json::{json, Value};

/// Maximum input drive in dB
const MAX_DRIVE_DB: f32 = 60.0;

/// Soft clipper: `tanh(x * drive)`
///
/// # Parameters
/// - `drive_db`: Gain applied before the waveshaper (0-60 dB)
#[derive(Debug, Clone)]
pub struct Distortion {
    drive_db: f32,
    drive_linear: f32,
}

impl Distortion {
    /// Create a distortion with the given drive
    ///
    /// # Arguments
    /// * `drive_db` - Gain applied before the waveshaper (0-60 dB)
    ///
    /// # Returns
    /// * `Ok(Distortion)` - The waveshaper
    /// * `Err(PedalError)` - `InvalidParameter` if `drive_db` is out of range
    pub fn new(drive_db: f32) -> Result<Self> {
        let mut distortion = Self::default();
        distortion.set_param("drive_db", &json!(drive_db))?;
        Ok(distortion)
    }

    /// Build a distortion from a JSON parameter object
    ///
    /// # Arguments
    /// * `params` - `null` for the default 25 dB drive, or an object with
    ///   `drive_db`
    pub fn from_params(params: &Value) -> Result<Self> {
        check_known_params("distortion", params, &["drive_db"])?;
        let mut distortion = Self::default();
        apply_params(params, |name, value| distortion.set_param(name, value))?;
        Ok(distortion)
    }

    /// Drive in dB
    pub fn drive_db(&self) -> f32 {
        self.drive_db
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self {
            drive_db: 25.0,
            drive_linear: db_to_linear(25.0),
        }
    }
}

impl PlanarEffect for Distortion {
    fn process(&mut self, buffer: &mut PlanarBuffer, _sample_rate: u32) -> Result<()> {
        let drive = self.drive_linear;
        for channel in 0..buffer.num_channels() {
            for sample in buffer.channel_mut(channel).iter_mut() {
                *sample = (*sample * drive).tanh();
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn effect_type(&self) -> &'static str {
        "distortion"
    }

    fn get_params(&self) -> Value {
        json!({ "drive_db": self.drive_db })
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "drive_db" => {
                self.drive_db = number_in_range("distortion", name, value, 0.0..=MAX_DRIVE_DB)?;
                self.drive_linear = db_to_linear(self.drive_db);
                Ok(())
            }
            _ => Err(PedalError::invalid_param("distortion", name, "unknown parameter")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_bounded() {
        let mut distortion = Distortion::new(40.0).unwrap();
        let mut buffer = PlanarBuffer::from_frames(&[[0.9, -0.9], [0.01, -0.01], [0.0, 0.0]]);

        distortion.process(&mut buffer, 32000).unwrap();

        for ch in 0..2 {
            assert!(buffer.channel(ch).iter().all(|s| s.abs() <= 1.0));
        }
        // Heavy drive pushes even quiet input close to the rails
        assert!(buffer.channel(0)[1] > 0.6);
        assert_eq!(buffer.channel(0)[2], 0.0);
    }

    #[test]
    fn test_zero_drive_is_gentle() {
        let mut distortion = Distortion::new(0.0).unwrap();
        let mut buffer = PlanarBuffer::from_frames(&[[0.01, -0.01]]);
        distortion.process(&mut buffer, 32000).unwrap();
        assert!((buffer.channel(0)[0] - 0.01).abs() < 1e-5);
    }

    #[test]
    fn test_params() {
        let distortion = Distortion::from_params(&json!({"drive_db": 25})).unwrap();
        assert_eq!(distortion.drive_db(), 25.0);
        assert!(Distortion::from_params(&json!({"drive_db": -1})).is_err());
        assert!(Distortion::from_params(&json!({"tone": 1})).is_err());
    }
}
