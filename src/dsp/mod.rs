//! DSP Effects Library
//!
//! The delay line and the effects built on it, the built-in room reverb,
//! level and drive stages, the two effect contracts, and the chain that runs
//! them in order.

mod chain;
mod chorus;
mod distortion;
mod effect;
mod gain;
mod registry;
mod reverb;
mod ring;
mod shifter;

pub use chain::{ChainEffect, ChainEntry, EffectChain};
pub use chorus::{ModulatedDelayChorus, BASE_DELAY_MS};
pub use distortion::Distortion;
pub use effect::{Dialect, Effect, PlanarEffect};
pub use gain::Gain;
pub use registry::{DirectConstructor, EffectInfo, EffectRegistry, PlanarConstructor};
pub use reverb::Reverb;
pub use ring::{Interpolation, RingDelayLine};
pub use shifter::GranularPitchShifter;
