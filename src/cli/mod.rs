//! CLI Module
//!
//! Command-line interface for the pedalboard.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "pedalboard.json";

/// Pedalboard - real-time stereo effects with dry/wet recording
#[derive(Parser, Debug)]
#[command(name = "pedalboard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the effect chain on the audio devices until Enter is pressed
    #[command(name = "run")]
    Run {
        /// Configuration file (defaults are used if it does not exist)
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Record the dry input and the processed output
        #[arg(short, long)]
        record: bool,

        /// Directory for recordings (overrides the configuration)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Validate a configuration and show the chain it builds
    #[command(name = "check")]
    Check {
        /// Configuration file (defaults are used if it does not exist)
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// List the effects that can be used in a chain
    #[command(name = "list-effects")]
    ListEffects,

    /// List audio input and output devices
    #[command(name = "devices")]
    Devices,
}
