//! Pedalboard - real-time stereo effects
//!
//! Audio arrives in fixed-size blocks of stereo frames and runs through an
//! ordered chain of effects, once per block, on a single real-time thread.
//!
//! # Architecture
//!
//! - `dsp`: the ring delay line, the chorus and pitch shifter built on it,
//!   the opaque built-ins, and the chain that runs them in either calling
//!   convention
//! - `engine`: configuration, the block callback with its dry/wet sinks,
//!   stream drivers and the session lifecycle
//! - `cli`: the `pedalboard-cli` commands

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;

pub use error::{PedalError, Result};
