//! Effect trait definitions
//!
//! Two calling conventions ("dialects") take part in a chain. Custom effects
//! work on interleaved frames directly; opaque effects expect planar audio
//! and are reached through a transposing adapter in the chain.

use crate::engine::buffer::{Frame, PlanarBuffer};
use crate::error::{PedalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;

/// Argument layout an effect expects, fixed per chain entry at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Frames × channels, processed in place
    Direct,
    /// Channels × samples, transposed in and out by the chain
    Transposed,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Dialect::Direct => "direct",
            Dialect::Transposed => "transposed",
        })
    }
}

/// Effect operating on interleaved stereo frames
///
/// `process` must leave the block length unchanged and may only fail for the
/// current block; state such as delay lines and phase accumulators carries
/// over to the next call either way.
pub trait Effect: Send {
    /// Process a block of frames in place
    fn process(&mut self, frames: &mut [Frame], sample_rate: u32) -> Result<()>;

    /// Clear delay lines and rewind phase accumulators
    fn reset(&mut self);

    /// Get the effect type identifier
    fn effect_type(&self) -> &'static str;

    /// Get all parameters as JSON
    fn get_params(&self) -> Value;

    /// Set a single parameter by name
    fn set_param(&mut self, name: &str, value: &Value) -> Result<()>;
}

/// Effect operating on planar (channels × samples) audio
///
/// The contract opaque effects satisfy. The chain checks the buffer shape
/// after every call and treats any change as a processing fault.
pub trait PlanarEffect: Send {
    /// Process a planar buffer in place
    fn process(&mut self, buffer: &mut PlanarBuffer, sample_rate: u32) -> Result<()>;

    /// Clear any internal state
    fn reset(&mut self);

    /// Get the effect type identifier
    fn effect_type(&self) -> &'static str;

    /// Get all parameters as JSON
    fn get_params(&self) -> Value;

    /// Set a single parameter by name
    fn set_param(&mut self, name: &str, value: &Value) -> Result<()>;
}

// ============================================================================
// Parameter Helpers
// ============================================================================

/// Read a numeric parameter from a JSON value, checking its range
pub fn number_in_range(
    effect: &str,
    name: &str,
    value: &Value,
    range: RangeInclusive<f32>,
) -> Result<f32> {
    let v = value.as_f64().ok_or_else(|| {
        PedalError::invalid_param(effect, name, format!("expected number, got {}", value))
    })? as f32;

    if !v.is_finite() || !range.contains(&v) {
        return Err(PedalError::invalid_param(
            effect,
            name,
            format!(
                "{} is outside {}..={}",
                v,
                range.start(),
                range.end()
            ),
        ));
    }
    Ok(v)
}

/// Check a parameter object for keys an effect does not know
///
/// `params` may be `null` (all defaults) or an object.
pub fn check_known_params(effect: &str, params: &Value, known: &[&str]) -> Result<()> {
    match params {
        Value::Null => Ok(()),
        Value::Object(map) => {
            for key in map.keys() {
                if !known.contains(&key.as_str()) {
                    return Err(PedalError::invalid_param(effect, key, "unknown parameter"));
                }
            }
            Ok(())
        }
        other => Err(PedalError::invalid_param(
            effect,
            "params",
            format!("expected an object, got {}", other),
        )),
    }
}

/// Apply every entry of a parameter object through `set_param`
pub fn apply_params<F>(params: &Value, mut set_param: F) -> Result<()>
where
    F: FnMut(&str, &Value) -> Result<()>,
{
    if let Value::Object(map) = params {
        for (name, value) in map {
            set_param(name, value)?;
        }
    }
    Ok(())
}
