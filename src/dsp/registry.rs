//! Effect registry
//!
//! Maps `(kind, name)` to a constructor. Everything is registered explicitly
//! at startup; the dialect of each entry follows from its kind.

use super::chain::{ChainEffect, EffectChain};
use super::chorus::ModulatedDelayChorus;
use super::distortion::Distortion;
use super::effect::{Dialect, Effect, PlanarEffect};
use super::gain::Gain;
use super::reverb::Reverb;
use super::shifter::GranularPitchShifter;
use crate::engine::config::{EffectKind, EffectSpec};
use crate::error::{PedalError, Result};
use log::{debug, info};
use serde_json::Value;

/// Builds a frame-based effect from its parameters
pub type DirectConstructor = fn(&Value) -> Result<Box<dyn Effect>>;

/// Builds a planar effect from its parameters
pub type PlanarConstructor = fn(&Value) -> Result<Box<dyn PlanarEffect>>;

#[derive(Clone, Copy)]
enum Constructor {
    Direct(DirectConstructor),
    Planar(PlanarConstructor),
}

/// Metadata for one registered effect
#[derive(Debug, Clone)]
pub struct EffectInfo {
    pub kind: EffectKind,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub dialect: Dialect,
}

impl EffectInfo {
    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

struct Registration {
    info: EffectInfo,
    constructor: Constructor,
}

/// Registry of constructible effects
pub struct EffectRegistry {
    registrations: Vec<Registration>,
}

impl EffectRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Create a registry holding every built-in effect
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_custom(
            "chorus",
            &["MyChorus"],
            "Modulated-delay chorus (depth_ms, speed_hz, mix)",
            |params| Ok(Box::new(ModulatedDelayChorus::from_params(params)?)),
        );
        registry.register_custom(
            "pitch_shift",
            &["MyShifter", "shifter"],
            "Two-tap granular pitch shifter (semitones, mix, window_ms)",
            |params| Ok(Box::new(GranularPitchShifter::from_params(params)?)),
        );
        registry.register_internal(
            "reverb",
            &[],
            "Freeverb room reverb (room_size, damping, wet_level, dry_level, width)",
            |params| Ok(Box::new(Reverb::from_params(params)?)),
        );
        registry.register_internal(
            "gain",
            &[],
            "Level trim (gain_db)",
            |params| Ok(Box::new(Gain::from_params(params)?)),
        );
        registry.register_internal(
            "distortion",
            &[],
            "tanh soft clipper (drive_db)",
            |params| Ok(Box::new(Distortion::from_params(params)?)),
        );

        registry
    }

    /// Register a frame-based effect under the `custom` kind
    pub fn register_custom(
        &mut self,
        name: &'static str,
        aliases: &'static [&'static str],
        description: &'static str,
        constructor: DirectConstructor,
    ) {
        self.registrations.push(Registration {
            info: EffectInfo {
                kind: EffectKind::Custom,
                name,
                aliases,
                description,
                dialect: Dialect::Direct,
            },
            constructor: Constructor::Direct(constructor),
        });
    }

    /// Register a planar effect under the `internal` kind
    pub fn register_internal(
        &mut self,
        name: &'static str,
        aliases: &'static [&'static str],
        description: &'static str,
        constructor: PlanarConstructor,
    ) {
        self.registrations.push(Registration {
            info: EffectInfo {
                kind: EffectKind::Internal,
                name,
                aliases,
                description,
                dialect: Dialect::Transposed,
            },
            constructor: Constructor::Planar(constructor),
        });
    }

    fn find(&self, kind: EffectKind, name: &str) -> Result<&Registration> {
        if kind == EffectKind::Plugin {
            return Err(PedalError::UnsupportedKind {
                kind: kind.to_string(),
            });
        }
        self.registrations
            .iter()
            .find(|r| r.info.kind == kind && r.info.matches(name))
            .ok_or_else(|| PedalError::UnknownEffect {
                kind: kind.to_string(),
                name: name.to_string(),
            })
    }

    /// Get metadata for an effect
    pub fn get_info(&self, kind: EffectKind, name: &str) -> Option<&EffectInfo> {
        self.find(kind, name).ok().map(|r| &r.info)
    }

    /// List every registered effect in registration order
    pub fn list(&self) -> Vec<&EffectInfo> {
        self.registrations.iter().map(|r| &r.info).collect()
    }

    /// Construct one effect, tagged with its dialect
    pub fn build(&self, spec: &EffectSpec) -> Result<ChainEffect> {
        let registration = self.find(spec.kind, &spec.name)?;
        let effect = match registration.constructor {
            Constructor::Direct(make) => ChainEffect::Direct(make(&spec.params)?),
            Constructor::Planar(make) => ChainEffect::Transposed(make(&spec.params)?),
        };
        debug!(
            "Built {} effect '{}' ({})",
            spec.kind,
            registration.info.name,
            registration.info.dialect
        );
        Ok(effect)
    }

    /// Build a whole chain
    ///
    /// Any failing entry aborts the build, so a malformed configuration never
    /// yields a partially constructed chain.
    pub fn build_chain(&self, specs: &[EffectSpec], max_block_size: usize) -> Result<EffectChain> {
        let mut chain = EffectChain::new(max_block_size);
        for spec in specs {
            let effect = self.build(spec)?;
            chain.push(spec.name.clone(), effect);
        }
        info!(
            "Effect chain ready: [{}]",
            chain.names().join(" -> ")
        );
        Ok(chain)
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
