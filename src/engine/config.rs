//! Pedalboard configuration
//!
//! Everything the engine needs is passed in explicitly through these values.
//! The JSON file layout mirrors the structs; any section left out falls back
//! to its default.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::buffer::{MAX_BLOCK_SIZE, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::error::{PedalError, Result};

// ============================================================================
// Engine Settings
// ============================================================================

/// Default stream sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 32000;

/// Default frames per block
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Default (input, output) latency in seconds
pub const DEFAULT_LATENCY_SECS: (f64, f64) = (0.01, 0.01);

/// Longest accepted device latency in seconds
pub const MAX_LATENCY_SECS: f64 = 1.0;

/// Stream settings shared by the engine and its driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Frames per callback block
    pub block_size: usize,
    /// (input, output) latency in seconds, used to size the device buffers
    pub latency_secs: (f64, f64),
    /// Input device name; `None` picks the host default
    pub input_device: Option<String>,
    /// Output device name; `None` picks the host default
    pub output_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            latency_secs: DEFAULT_LATENCY_SECS,
            input_device: None,
            output_device: None,
        }
    }
}

impl EngineConfig {
    /// Check the settings before anything is built from them
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(PedalError::InvalidConfig {
                reason: format!(
                    "sample rate {} Hz outside {}..={} Hz",
                    self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
                ),
            });
        }
        if !(1..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(PedalError::InvalidConfig {
                reason: format!(
                    "block size {} outside 1..={}",
                    self.block_size, MAX_BLOCK_SIZE
                ),
            });
        }
        let (input, output) = self.latency_secs;
        let in_range = |secs: f64| (0.0..=MAX_LATENCY_SECS).contains(&secs);
        if !(in_range(input) && in_range(output)) {
            return Err(PedalError::InvalidConfig {
                reason: format!(
                    "latency ({}, {}) outside 0..={}s",
                    input, output, MAX_LATENCY_SECS
                ),
            });
        }
        Ok(())
    }

    /// Device buffer sizes for the configured latency
    ///
    /// Each latency is rounded to whole blocks, never less than one block, so
    /// a device callback always carries complete engine blocks.
    ///
    /// # Returns
    /// (input, output) buffer sizes in frames
    pub fn latency_frames(&self) -> (usize, usize) {
        let frames = |secs: f64| {
            let raw = (secs * self.sample_rate as f64).round() as usize;
            raw.div_ceil(self.block_size).max(1) * self.block_size
        };
        (frames(self.latency_secs.0), frames(self.latency_secs.1))
    }

    /// Duration of one block in seconds
    pub fn block_duration_secs(&self) -> f64 {
        self.block_size as f64 / self.sample_rate as f64
    }
}

// ============================================================================
// Chain Entries
// ============================================================================

/// Where an effect implementation comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    /// Effects written against the frame-based contract
    Custom,
    /// Built-in opaque effects using the planar contract
    Internal,
    /// Externally hosted plugins
    Plugin,
}

impl EffectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Internal => "internal",
            Self::Plugin => "plugin",
        }
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One configured chain position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    pub kind: EffectKind,
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

impl EffectSpec {
    pub fn new(kind: EffectKind, name: impl Into<String>, params: Value) -> Self {
        Self {
            kind,
            name: name.into(),
            params,
        }
    }
}

// ============================================================================
// Recording
// ============================================================================

/// Longest allowed recording per sink, in seconds
pub const MAX_RECORDING_SECS: u32 = 3600;

/// Where and how much to record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory recordings are written to, created on save
    pub output_dir: PathBuf,
    /// Longest recording kept per sink, in seconds
    pub max_seconds: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            max_seconds: 600,
        }
    }
}

impl RecordingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_RECORDING_SECS).contains(&self.max_seconds) {
            return Err(PedalError::InvalidConfig {
                reason: format!(
                    "recording max_seconds {} outside 1..={}",
                    self.max_seconds, MAX_RECORDING_SECS
                ),
            });
        }
        Ok(())
    }

    /// Frames to pre-allocate per recorder
    ///
    /// # Arguments
    /// * `sample_rate` - Stream sample rate in Hz
    ///
    /// # Returns
    /// * `Ok(usize)` - Frame capacity for `max_seconds` of audio
    /// * `Err(PedalError)` - `InvalidConfig` if the settings are out of range
    pub fn capacity_frames(&self, sample_rate: u32) -> Result<usize> {
        self.validate()?;
        (self.max_seconds as usize)
            .checked_mul(sample_rate as usize)
            .ok_or_else(|| PedalError::InvalidConfig {
                reason: format!(
                    "{}s at {} Hz is too long to record",
                    self.max_seconds, sample_rate
                ),
            })
    }
}

// ============================================================================
// Top Level
// ============================================================================

/// Complete pedalboard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PedalboardConfig {
    pub audio: EngineConfig,
    pub chain: Vec<EffectSpec>,
    pub recording: RecordingConfig,
}

impl Default for PedalboardConfig {
    fn default() -> Self {
        Self {
            audio: EngineConfig::default(),
            chain: default_chain(),
            recording: RecordingConfig::default(),
        }
    }
}

/// Chorus, then a medium room, then a -3 dB trim
pub fn default_chain() -> Vec<EffectSpec> {
    vec![
        EffectSpec::new(
            EffectKind::Custom,
            "chorus",
            json!({ "depth_ms": 3.0, "speed_hz": 2.5, "mix": 0.5 }),
        ),
        EffectSpec::new(EffectKind::Internal, "reverb", json!({ "room_size": 0.5 })),
        EffectSpec::new(EffectKind::Internal, "gain", json!({ "gain_db": -3.0 })),
    ]
}

impl PedalboardConfig {
    /// Load a configuration file, or the defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(
                "No configuration at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        info!(
            "Loaded configuration from {} ({} effects)",
            path.display(),
            config.chain.len()
        );
        Ok(config)
    }

    /// Parse and validate a configuration from a JSON string
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check engine and recording settings
    ///
    /// Chain entries are checked when the registry builds them.
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.recording.validate()
    }
}
