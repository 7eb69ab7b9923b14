//! Stream drivers and the session run loop
//!
//! A driver owns the engine while the stream runs and hands it back once the
//! stream has stopped. [`run_session`] wraps that with the lifecycle: start,
//! run, stop, and always finalize recordings before reporting how the stream
//! ended.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::engine::buffer::Frame;
use crate::engine::callback::{Engine, EngineStats, StreamStatus};
use crate::engine::sink::BlockSink;
use crate::error::{PedalError, Result};

/// Cooperative stop request shared between the control thread and a driver
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the driver to stop after the block in flight
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Source of blocks for an engine
pub trait StreamDriver {
    /// Run the stream until it ends, `stop` is requested, or it fails
    ///
    /// The engine is returned in every case so recordings can be saved.
    fn run<S: BlockSink + 'static>(
        &mut self,
        engine: Engine<S>,
        stop: &StopSignal,
    ) -> (Engine<S>, Result<()>);
}

// ============================================================================
// Status Reporting
// ============================================================================

/// Turns running status counts into occasional log lines
///
/// Stream callbacks only bump counters. The control thread hands the running
/// totals to [`StatusReporter::poll`], which logs at most once per interval.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    interval: Duration,
    last_report: Option<Instant>,
    /// (overflows, underflows) already logged
    reported: (u64, u64),
}

impl StatusReporter {
    /// Create a reporter logging at most once per `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: None,
            reported: (0, 0),
        }
    }

    /// Log the counts gathered since the last report, if one is due
    ///
    /// # Arguments
    /// * `totals` - Running (input overflow, output underflow) counts
    /// * `now` - Current time
    ///
    /// # Returns
    /// The (overflow, underflow) counts that were logged, or `None` if
    /// nothing was pending or the last report is too recent
    pub fn poll(&mut self, totals: (u64, u64), now: Instant) -> Option<(u64, u64)> {
        let pending = (
            totals.0.saturating_sub(self.reported.0),
            totals.1.saturating_sub(self.reported.1),
        );
        if pending == (0, 0) {
            return None;
        }
        if let Some(last) = self.last_report {
            if now.duration_since(last) < self.interval {
                return None;
            }
        }

        warn!(
            "Stream reported {} input overflows and {} output underflows",
            pending.0, pending.1
        );
        self.last_report = Some(now);
        self.reported = totals;
        Some(pending)
    }
}

// ============================================================================
// Memory Driver
// ============================================================================

/// Replays an in-memory signal through the engine block by block
///
/// Status conditions and a stream fault can be scripted per block index to
/// rehearse what a device would report.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    input: Vec<Frame>,
    block_size: usize,
    output: Vec<Frame>,
    statuses: HashMap<usize, StreamStatus>,
    fault_at: Option<usize>,
}

impl MemoryDriver {
    /// Create a driver delivering `input` in blocks of `block_size` frames
    ///
    /// A trailing partial block is delivered as is.
    pub fn new(input: Vec<Frame>, block_size: usize) -> Self {
        let capacity = input.len();
        Self {
            input,
            block_size: block_size.max(1),
            output: Vec::with_capacity(capacity),
            statuses: HashMap::new(),
            fault_at: None,
        }
    }

    /// Report `status` together with block `index`
    pub fn with_status(mut self, index: usize, status: StreamStatus) -> Self {
        self.statuses.insert(index, status);
        self
    }

    /// Fail the stream instead of delivering block `index`
    pub fn with_fault_at(mut self, index: usize) -> Self {
        self.fault_at = Some(index);
        self
    }

    /// Output collected so far
    pub fn output(&self) -> &[Frame] {
        &self.output
    }

    /// Take the collected output
    pub fn into_output(self) -> Vec<Frame> {
        self.output
    }

    /// Number of blocks the input splits into
    pub fn num_blocks(&self) -> usize {
        self.input.len().div_ceil(self.block_size)
    }
}

impl StreamDriver for MemoryDriver {
    fn run<S: BlockSink + 'static>(
        &mut self,
        mut engine: Engine<S>,
        stop: &StopSignal,
    ) -> (Engine<S>, Result<()>) {
        self.output.clear();
        let mut block = Vec::with_capacity(self.block_size);

        for (index, input) in self.input.chunks(self.block_size).enumerate() {
            if stop.is_stop_requested() {
                info!("Stop requested before block {}", index);
                break;
            }
            if self.fault_at == Some(index) {
                let fault = PedalError::StreamFault {
                    reason: format!("scripted fault at block {}", index),
                };
                return (engine, Err(fault));
            }
            if let Some(&status) = self.statuses.get(&index) {
                warn!("Stream reported {} with block {}", status, index);
                engine.note_status(status);
            }

            block.clear();
            block.resize(input.len(), [0.0; 2]);
            engine.process(input, &mut block);
            self.output.extend_from_slice(&block);
        }

        (engine, Ok(()))
    }
}

// ============================================================================
// Session Run Loop
// ============================================================================

/// What a finished session produced
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub stats: EngineStats,
    /// Stream position when the session stopped, in seconds
    pub duration_secs: f64,
    /// Recordings written during finalization
    pub recordings: Vec<PathBuf>,
}

/// Run one session from start to finalization
///
/// Recordings are finalized whether the stream ended normally or with a
/// fault. A stream fault takes precedence over a finalization error in the
/// returned result.
pub fn run_session<D, S>(
    driver: &mut D,
    mut engine: Engine<S>,
    stop: &StopSignal,
    output_dir: &Path,
) -> Result<SessionReport>
where
    D: StreamDriver,
    S: BlockSink + 'static,
{
    engine.start()?;
    let (mut engine, outcome) = driver.run(engine, stop);
    engine.stop();

    if let Err(e) = &outcome {
        error!("Stream ended with a fault: {}", e);
    }

    let finalized = engine.finalize(output_dir);
    let report = SessionReport {
        stats: engine.stats(),
        duration_secs: engine.transport().position_secs(),
        recordings: finalized.as_ref().cloned().unwrap_or_default(),
    };
    for path in &report.recordings {
        info!("Recording saved: {}", path.display());
    }

    outcome?;
    finalized?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{ChainEffect, EffectChain, Gain};
    use crate::engine::config::EngineConfig;
    use crate::engine::sink::Recorder;

    fn engine(block_size: usize) -> Engine<Vec<Frame>> {
        let config = EngineConfig {
            block_size,
            ..EngineConfig::default()
        };
        let mut chain = EffectChain::new(block_size);
        chain.push("gain", ChainEffect::Transposed(Box::new(Gain::new(-6.0206).unwrap())));
        Engine::new(&config, chain).unwrap()
    }

    #[test]
    fn test_stop_signal() {
        let stop = StopSignal::new();
        let shared = stop.clone();
        assert!(!stop.is_stop_requested());
        shared.request_stop();
        assert!(stop.is_stop_requested());
    }

    #[test]
    fn test_status_reporter_limits_log_rate() {
        let mut reporter = StatusReporter::new(Duration::from_secs(1));
        let start = Instant::now();

        assert_eq!(reporter.poll((0, 0), start), None);
        assert_eq!(reporter.poll((3, 0), start), Some((3, 0)));

        // Events keep coming, but the last report is too recent
        let soon = start + Duration::from_millis(20);
        assert_eq!(reporter.poll((5, 1), soon), None);
        assert_eq!(reporter.poll((9, 4), soon + Duration::from_millis(20)), None);

        // Everything held back is reported together once the interval passes
        let later = start + Duration::from_secs(1);
        assert_eq!(reporter.poll((9, 4), later), Some((6, 4)));
        assert_eq!(reporter.poll((9, 4), later + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_memory_driver_replays_everything() {
        let mut driver = MemoryDriver::new(vec![[1.0, -1.0]; 100], 32);
        assert_eq!(driver.num_blocks(), 4);

        let (engine, outcome) = driver.run(engine(32), &StopSignal::new());
        outcome.unwrap();

        assert_eq!(driver.output().len(), 100);
        assert!(driver.output().iter().all(|f| (f[0] - 0.5).abs() < 1e-4));
        assert_eq!(engine.stats().blocks_processed, 4);
    }

    #[test]
    fn test_memory_driver_honours_stop() {
        let stop = StopSignal::new();
        stop.request_stop();
        let mut driver = MemoryDriver::new(vec![[1.0, 1.0]; 64], 16);
        let (engine, outcome) = driver.run(engine(16), &stop);
        outcome.unwrap();
        assert!(driver.output().is_empty());
        assert_eq!(engine.stats().blocks_processed, 0);
    }

    #[test]
    fn test_scripted_status_counted() {
        let mut driver = MemoryDriver::new(vec![[0.0, 0.0]; 64], 16)
            .with_status(1, StreamStatus::InputOverflow)
            .with_status(3, StreamStatus::OutputUnderflow);
        let (engine, outcome) = driver.run(engine(16), &StopSignal::new());
        outcome.unwrap();
        assert_eq!(engine.stats().status_events, 2);
        assert_eq!(driver.output().len(), 64);
    }

    #[test]
    fn test_session_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = MemoryDriver::new(vec![[0.1, 0.1]; 3200], 64);
        let report = run_session(&mut driver, engine(64), &StopSignal::new(), dir.path()).unwrap();

        assert_eq!(report.stats.blocks_processed, 50);
        assert!((report.duration_secs - 0.1).abs() < 1e-9);
        assert!(report.recordings.is_empty());
    }

    #[test]
    fn test_stream_fault_still_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default();
        let engine: Engine = Engine::new(&config, EffectChain::new(config.block_size))
            .unwrap()
            .with_sinks(
                Some(Recorder::dry(config.sample_rate, 32000)),
                Some(Recorder::wet(config.sample_rate, 32000)),
            );
        let mut driver = MemoryDriver::new(vec![[0.2, 0.2]; 640], config.block_size).with_fault_at(5);

        let err = run_session(&mut driver, engine, &StopSignal::new(), dir.path()).unwrap_err();
        assert_eq!(err.error_code(), "STREAM_FAULT");

        let written: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(written.len(), 2);
        assert_eq!(driver.output().len(), 5 * config.block_size);
    }
}
