//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use log::info;

use crate::dsp::{EffectChain, EffectRegistry};
use crate::engine::{Engine, PedalboardConfig, Recorder, SessionReport, StopSignal};
use crate::error::Result;

/// Options for the `run` command
#[derive(Debug, Clone, Default)]
pub struct RunOptions<'a> {
    pub record: bool,
    pub output_dir: Option<&'a Path>,
}

/// Build the chain and engine described by a configuration
fn build_engine(config: &PedalboardConfig, record: bool) -> Result<Engine> {
    let registry = EffectRegistry::with_builtins();
    let chain = registry.build_chain(&config.chain, config.audio.block_size)?;

    let sample_rate = config.audio.sample_rate;
    let capacity = config.recording.capacity_frames(sample_rate)?;
    let (dry, wet) = if record {
        info!(
            "Recording enabled, up to {}s per take",
            config.recording.max_seconds
        );
        (
            Some(Recorder::dry(sample_rate, capacity)),
            Some(Recorder::wet(sample_rate, capacity)),
        )
    } else {
        (None, None)
    };

    Ok(Engine::new(&config.audio, chain)?.with_sinks(dry, wet))
}

/// Run the pedalboard on the configured devices until Enter is pressed.
pub fn run(config_path: &Path, options: RunOptions<'_>) -> Result<()> {
    let mut config = PedalboardConfig::load(config_path)?;
    if let Some(dir) = options.output_dir {
        config.recording.output_dir = dir.to_path_buf();
    }

    let engine = build_engine(&config, options.record)?;
    let stop = StopSignal::new();

    let report = run_live(&config, engine, &stop)?;

    print_report(&report);
    Ok(())
}

#[cfg(feature = "device")]
fn run_live(config: &PedalboardConfig, engine: Engine, stop: &StopSignal) -> Result<SessionReport> {
    use crate::engine::{run_session, DeviceDriver};

    let mut driver = DeviceDriver::new(config.audio.clone())?;

    let on_enter = stop.clone();
    std::thread::spawn(move || {
        let mut line = String::new();
        // EOF or a read error also stops the stream
        let _ = std::io::stdin().read_line(&mut line);
        on_enter.request_stop();
    });

    println!("Running. Press Enter to stop.");
    run_session(&mut driver, engine, stop, &config.recording.output_dir)
}

#[cfg(not(feature = "device"))]
fn run_live(_config: &PedalboardConfig, _engine: Engine, _stop: &StopSignal) -> Result<SessionReport> {
    Err(crate::error::PedalError::DeviceUnavailable {
        reason: "built without the 'device' feature".to_string(),
    })
}

fn print_report(report: &SessionReport) {
    println!("Session length: {:.2}s", report.duration_secs);
    println!("Blocks processed: {}", report.stats.blocks_processed);
    if report.stats.faults > 0 {
        println!("Blocks passed through dry: {}", report.stats.faults);
    }
    if report.stats.status_events > 0 {
        println!("Stream status events: {}", report.stats.status_events);
    }
    for path in &report.recordings {
        println!("Recording: {}", path.display());
    }
}

fn print_chain(chain: &EffectChain) {
    if chain.is_empty() {
        println!("  (empty chain, audio passes through unchanged)");
    }
    for (index, entry) in chain.iter().enumerate() {
        println!(
            "  {}. {} [{}, {}] {}",
            index + 1,
            entry.name(),
            entry.effect_type(),
            entry.dialect(),
            entry.get_params()
        );
    }
}

/// Validate a configuration and print the chain it builds.
pub fn check(config_path: &Path) -> Result<()> {
    info!("Checking configuration: {}", config_path.display());

    let config = PedalboardConfig::load(config_path)?;
    let chain = EffectRegistry::with_builtins().build_chain(&config.chain, config.audio.block_size)?;

    let audio = &config.audio;
    println!("Sample rate: {} Hz", audio.sample_rate);
    println!(
        "Block size: {} frames ({:.2} ms)",
        audio.block_size,
        audio.block_duration_secs() * 1000.0
    );
    let (input_frames, output_frames) = audio.latency_frames();
    println!(
        "Latency: {:.3}s in, {:.3}s out (device buffers {} / {} frames)",
        audio.latency_secs.0, audio.latency_secs.1, input_frames, output_frames
    );
    println!(
        "Devices: {} -> {}",
        audio.input_device.as_deref().unwrap_or("default"),
        audio.output_device.as_deref().unwrap_or("default")
    );
    println!(
        "Recordings: {} (max {}s)",
        config.recording.output_dir.display(),
        config.recording.max_seconds
    );
    println!("Chain:");
    print_chain(&chain);

    Ok(())
}

/// List every registered effect.
pub fn list_effects() -> Result<()> {
    let registry = EffectRegistry::with_builtins();
    for info in registry.list() {
        let aliases = if info.aliases.is_empty() {
            String::new()
        } else {
            format!(" (aka {})", info.aliases.join(", "))
        };
        println!(
            "{:<8} {:<12} {:<10} {}{}",
            info.kind, info.name, info.dialect, info.description, aliases
        );
    }
    Ok(())
}

/// List audio devices.
#[cfg(feature = "device")]
pub fn list_devices() -> Result<()> {
    let (inputs, outputs) = crate::engine::list_devices()?;
    println!("Inputs:");
    for name in inputs {
        println!("  {}", name);
    }
    println!("Outputs:");
    for name in outputs {
        println!("  {}", name);
    }
    Ok(())
}

/// List audio devices.
#[cfg(not(feature = "device"))]
pub fn list_devices() -> Result<()> {
    Err(crate::error::PedalError::DeviceUnavailable {
        reason: "built without the 'device' feature".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_with_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check(&dir.path().join("none.json")).is_ok());
    }

    #[test]
    fn test_check_rejects_bad_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        std::fs::write(
            &path,
            r#"{ "chain": [ { "kind": "plugin", "name": "Reverb" } ] }"#,
        )
        .unwrap();
        let err = check(&path).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_KIND");
    }

    #[test]
    fn test_build_engine_with_recording() {
        let config = PedalboardConfig::from_json(r#"{ "recording": { "max_seconds": 1 } }"#).unwrap();
        let engine = build_engine(&config, true).unwrap();
        assert_eq!(engine.chain().len(), config.chain.len());

        let dry = engine.dry_sink().unwrap();
        assert!(dry.capacity() >= 32000);
        assert!(dry.is_empty());
        assert!(engine.wet_sink().is_some());
    }

    #[test]
    fn test_build_engine_without_recording() {
        let engine = build_engine(&PedalboardConfig::default(), false).unwrap();
        assert!(engine.dry_sink().is_none());
        assert!(engine.wet_sink().is_none());
    }

    #[cfg(not(feature = "device"))]
    #[test]
    fn test_run_needs_device_support() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&dir.path().join("none.json"), RunOptions::default()).unwrap_err();
        assert_eq!(err.error_code(), "DEVICE_UNAVAILABLE");
    }

    #[test]
    fn test_list_effects() {
        assert!(list_effects().is_ok());
    }
}
