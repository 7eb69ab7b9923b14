//! Pedalboard CLI
//!
//! Command-line interface for the pedalboard.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use pedalboard::cli::commands::{self, RunOptions};
use pedalboard::cli::{Cli, Commands};
use pedalboard::PedalError;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Pedalboard v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Pedalboard v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Run {
            config,
            record,
            output_dir,
        } => {
            let options = RunOptions {
                record,
                output_dir: output_dir.as_deref(),
            };
            commands::run(&config, options)
                .map_err(print_hints)
                .with_context(|| format!("run failed ({})", config.display()))
        }
        Commands::Check { config } => commands::check(&config)
            .map_err(print_hints)
            .with_context(|| format!("invalid configuration {}", config.display())),
        Commands::ListEffects => commands::list_effects().context("listing effects"),
        Commands::Devices => commands::list_devices().context("listing audio devices"),
    }
}

fn print_hints(err: PedalError) -> PedalError {
    for hint in err.recovery_suggestions() {
        eprintln!("hint: {}", hint);
    }
    err
}
