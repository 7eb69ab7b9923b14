//! Effect Chain
//!
//! Effects are processed in chain order (index 0 nearest the input). Each
//! entry carries its dialect from the moment it is added; opaque entries also
//! own a planar scratch buffer sized for the engine's block, so the adapter
//! transposes in and out without allocating on the audio thread.

use crate::dsp::effect::{Dialect, Effect, PlanarEffect};
use crate::engine::buffer::{frames_are_finite, Frame, PlanarBuffer};
use crate::error::{PedalError, Result};
use serde_json::Value;

/// An effect instance tagged with the calling convention it speaks
pub enum ChainEffect {
    /// Processes interleaved frames directly
    Direct(Box<dyn Effect>),
    /// Needs planar audio; the chain transposes around it
    Transposed(Box<dyn PlanarEffect>),
}

impl ChainEffect {
    /// Calling convention of this effect
    pub fn dialect(&self) -> Dialect {
        match self {
            ChainEffect::Direct(_) => Dialect::Direct,
            ChainEffect::Transposed(_) => Dialect::Transposed,
        }
    }

    /// Effect type identifier
    pub fn effect_type(&self) -> &'static str {
        match self {
            ChainEffect::Direct(effect) => effect.effect_type(),
            ChainEffect::Transposed(effect) => effect.effect_type(),
        }
    }

    /// Current parameters as JSON
    pub fn get_params(&self) -> Value {
        match self {
            ChainEffect::Direct(effect) => effect.get_params(),
            ChainEffect::Transposed(effect) => effect.get_params(),
        }
    }
}

enum Slot {
    Direct(Box<dyn Effect>),
    Transposed {
        effect: Box<dyn PlanarEffect>,
        scratch: PlanarBuffer,
    },
}

/// One chain position
pub struct ChainEntry {
    name: String,
    slot: Slot,
}

impl ChainEntry {
    /// Name the entry was configured with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calling convention fixed when the entry was added
    pub fn dialect(&self) -> Dialect {
        match self.slot {
            Slot::Direct(_) => Dialect::Direct,
            Slot::Transposed { .. } => Dialect::Transposed,
        }
    }

    /// Effect type identifier
    pub fn effect_type(&self) -> &'static str {
        match &self.slot {
            Slot::Direct(effect) => effect.effect_type(),
            Slot::Transposed { effect, .. } => effect.effect_type(),
        }
    }

    /// Get all parameters as JSON
    pub fn get_params(&self) -> Value {
        match &self.slot {
            Slot::Direct(effect) => effect.get_params(),
            Slot::Transposed { effect, .. } => effect.get_params(),
        }
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        match &mut self.slot {
            Slot::Direct(effect) => effect.set_param(name, value),
            Slot::Transposed { effect, .. } => effect.set_param(name, value),
        }
    }

    fn reset(&mut self) {
        match &mut self.slot {
            Slot::Direct(effect) => effect.reset(),
            Slot::Transposed { effect, .. } => effect.reset(),
        }
    }

    /// Run this entry on a block, checking what comes back
    fn process(&mut self, frames: &mut [Frame], sample_rate: u32) -> Result<()> {
        let name = &self.name;
        match &mut self.slot {
            Slot::Direct(effect) => {
                effect
                    .process(frames, sample_rate)
                    .map_err(|e| fault(name, e))?;
                if !frames_are_finite(frames) {
                    return Err(invalid_output(name, "non-finite samples"));
                }
            }
            Slot::Transposed { effect, scratch } => {
                scratch.load_frames(frames);
                effect
                    .process(scratch, sample_rate)
                    .map_err(|e| fault(name, e))?;
                if !scratch.has_shape(frames.len()) {
                    return Err(invalid_output(
                        name,
                        &format!(
                            "returned {} channels x {} samples for a {}-frame block",
                            scratch.num_channels(),
                            scratch.num_samples(),
                            frames.len()
                        ),
                    ));
                }
                if !scratch.is_finite() {
                    return Err(invalid_output(name, "non-finite samples"));
                }
                scratch.store_frames(frames);
            }
        }
        Ok(())
    }
}

fn fault(name: &str, err: PedalError) -> PedalError {
    match err {
        PedalError::ProcessingFault { reason, .. } => PedalError::ProcessingFault {
            effect: name.to_string(),
            reason,
        },
        other => PedalError::ProcessingFault {
            effect: name.to_string(),
            reason: other.to_string(),
        },
    }
}

fn invalid_output(name: &str, reason: &str) -> PedalError {
    PedalError::InvalidOutput {
        effect: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Ordered chain of effects
pub struct EffectChain {
    entries: Vec<ChainEntry>,
    max_block_size: usize,
}

impl EffectChain {
    /// Create an empty chain whose adapters are sized for `max_block_size`
    pub fn new(max_block_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_block_size,
        }
    }

    /// Append an effect at the output end of the chain
    pub fn push(&mut self, name: impl Into<String>, effect: ChainEffect) {
        let slot = match effect {
            ChainEffect::Direct(effect) => Slot::Direct(effect),
            ChainEffect::Transposed(effect) => Slot::Transposed {
                effect,
                scratch: PlanarBuffer::with_capacity(self.max_block_size),
            },
        };
        self.entries.push(ChainEntry {
            name: name.into(),
            slot,
        });
    }

    /// Process a block through every effect in order
    ///
    /// Stops at the first failing effect and returns its fault. The block is
    /// then partially processed; the engine restores the dry input. Every
    /// effect stays in the chain regardless.
    pub fn process(&mut self, frames: &mut [Frame], sample_rate: u32) -> Result<()> {
        for entry in &mut self.entries {
            entry.process(frames, sample_rate)?;
        }
        Ok(())
    }

    /// Set a parameter on the effect at `index`
    ///
    /// Must be called from the thread that owns the chain, i.e. before the
    /// stream starts or after it stops.
    pub fn set_param(&mut self, index: usize, name: &str, value: &Value) -> Result<()> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| PedalError::InvalidConfig {
                reason: format!("no chain entry at index {} (chain has {})", index, len),
            })?;
        entry.set_param(name, value)
    }

    /// Reset all effects
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.reset();
        }
    }

    /// Get the number of effects in the chain
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in processing order
    pub fn iter(&self) -> impl Iterator<Item = &ChainEntry> {
        self.entries.iter()
    }

    /// Entry names in processing order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// Largest block the adapters were sized for
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Serialize chain state to JSON
    pub fn to_json(&self) -> Value {
        let effects: Vec<Value> = self
            .entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name(),
                    "type": e.effect_type(),
                    "dialect": e.dialect(),
                    "params": e.get_params(),
                })
            })
            .collect();

        serde_json::json!({ "effects": effects })
    }
}
