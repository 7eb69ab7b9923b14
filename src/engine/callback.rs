//! Real-time engine
//!
//! `Engine::process` is what the audio callback calls once per block. Per
//! block it:
//!
//! 1. hands the raw input to the dry sink,
//! 2. runs the chain on a pre-allocated working copy,
//! 3. writes the result to the output, or the raw input if the chain faulted,
//! 4. hands the output to the wet sink.
//!
//! Nothing on this path allocates or blocks. Faults are logged and counted;
//! the chain stays intact and the next block is processed normally.

use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info, warn};

use crate::dsp::EffectChain;
use crate::engine::buffer::Frame;
use crate::engine::config::EngineConfig;
use crate::engine::sink::{session_timestamp, BlockSink, Recorder};
use crate::engine::transport::{Transport, TransportState};
use crate::error::{PedalError, Result};

/// Condition flagged by the stream driver alongside a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Input arrived faster than it was consumed
    InputOverflow,
    /// Output was needed before a block was ready
    OutputUnderflow,
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStatus::InputOverflow => write!(f, "input overflow"),
            StreamStatus::OutputUnderflow => write!(f, "output underflow"),
        }
    }
}

/// Counters kept by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Blocks handed to the chain
    pub blocks_processed: u64,
    /// Blocks replaced by their dry input
    pub faults: u64,
    /// Status conditions reported by the driver
    pub status_events: u64,
}

/// Owns the chain and sinks for the duration of a session
pub struct Engine<S: BlockSink = Recorder> {
    chain: EffectChain,
    sample_rate: u32,
    working: Vec<Frame>,
    dry_sink: Option<S>,
    wet_sink: Option<S>,
    transport: Transport,
    stats: EngineStats,
}

impl<S: BlockSink> Engine<S> {
    /// Create an engine for an already built chain
    ///
    /// The working buffer is sized for `config.block_size`; larger blocks
    /// are processed in pieces of that size.
    pub fn new(config: &EngineConfig, chain: EffectChain) -> Result<Self> {
        config.validate()?;
        if chain.max_block_size() < config.block_size {
            return Err(PedalError::InvalidConfig {
                reason: format!(
                    "chain was built for {}-frame blocks, engine needs {}",
                    chain.max_block_size(),
                    config.block_size
                ),
            });
        }

        Ok(Self {
            chain,
            sample_rate: config.sample_rate,
            working: vec![[0.0; 2]; config.block_size],
            dry_sink: None,
            wet_sink: None,
            transport: Transport::new(config.sample_rate),
            stats: EngineStats::default(),
        })
    }

    /// Attach sinks for the raw input and the processed output
    pub fn with_sinks(mut self, dry: Option<S>, wet: Option<S>) -> Self {
        self.dry_sink = dry;
        self.wet_sink = wet;
        self
    }

    /// Begin the session
    pub fn start(&mut self) -> Result<()> {
        self.transport.start()?;
        info!(
            "Engine started: {} Hz, {}-frame blocks, {} effects",
            self.sample_rate,
            self.working.len(),
            self.chain.len()
        );
        Ok(())
    }

    /// End the session; blocks delivered afterwards are still processed but
    /// no longer counted in the stream position
    pub fn stop(&mut self) {
        self.transport.stop();
        info!(
            "Engine stopped after {:.2}s: {} blocks, {} faults, {} status events",
            self.transport.position_secs(),
            self.stats.blocks_processed,
            self.stats.faults,
            self.stats.status_events
        );
    }

    /// Process one block from `input` into `output`
    ///
    /// Both slices should have the same length. Any output frames beyond the
    /// input length are filled with silence.
    pub fn process(&mut self, input: &[Frame], output: &mut [Frame]) {
        debug_assert_eq!(input.len(), output.len());
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        for frame in &mut output[n..] {
            *frame = [0.0, 0.0];
        }
        self.process_in_place(&mut output[..n]);
    }

    /// Process a block in place: `block` holds the input and receives the
    /// output
    pub fn process_in_place(&mut self, block: &mut [Frame]) {
        let step = self.working.len();
        for chunk in block.chunks_mut(step) {
            self.process_chunk(chunk);
        }
    }

    fn process_chunk(&mut self, block: &mut [Frame]) {
        let n = block.len();

        if let Some(sink) = self.dry_sink.as_mut() {
            sink.on_block(block);
        }

        let working = &mut self.working[..n];
        working.copy_from_slice(block);
        match self.chain.process(working, self.sample_rate) {
            Ok(()) => block.copy_from_slice(working),
            Err(e) => {
                // block still holds the dry input
                self.stats.faults += 1;
                error!(
                    "Block {} passed through dry: {}",
                    self.stats.blocks_processed, e
                );
            }
        }

        if let Some(sink) = self.wet_sink.as_mut() {
            sink.on_block(block);
        }

        self.stats.blocks_processed += 1;
        self.transport.advance(n);
    }

    /// Count a status condition from the driver
    ///
    /// Called from the stream callback, so nothing is logged here. Drivers
    /// report conditions from their control side; the total is logged when
    /// the engine stops.
    pub fn note_status(&mut self, _status: StreamStatus) {
        self.stats.status_events += 1;
    }

    /// Hand collected audio to the sinks for saving
    ///
    /// Only legal once the engine has stopped. Both sinks share one
    /// timestamp. An empty sink is skipped with a warning; the first other
    /// error is returned after every sink has had its turn.
    pub fn finalize(&mut self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        if self.transport.state() != TransportState::Stopped {
            return Err(PedalError::InvalidState {
                action: "finalize".to_string(),
                state: self.transport.state().to_string(),
            });
        }

        let timestamp = session_timestamp(&Local::now());
        let mut saved = Vec::new();
        let mut first_error = None;

        for sink in [self.dry_sink.as_mut(), self.wet_sink.as_mut()]
            .into_iter()
            .flatten()
        {
            match sink.finalize(output_dir, &timestamp) {
                Ok(Some(path)) => saved.push(path),
                Ok(None) => {}
                Err(PedalError::RecordingEmpty { label }) => {
                    warn!("Nothing recorded for '{}', no file written", label);
                }
                Err(e) => {
                    error!("Failed to save recording: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.transport.finalize()?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    /// Mutable chain access, for use while the stream is not running
    pub fn chain_mut(&mut self) -> &mut EffectChain {
        &mut self.chain
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per working block
    pub fn block_size(&self) -> usize {
        self.working.len()
    }

    pub fn dry_sink(&self) -> Option<&S> {
        self.dry_sink.as_ref()
    }

    pub fn wet_sink(&self) -> Option<&S> {
        self.wet_sink.as_ref()
    }

    /// Take the sinks back out of the engine
    pub fn into_sinks(self) -> (Option<S>, Option<S>) {
        (self.dry_sink, self.wet_sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{ChainEffect, Effect, Gain};
    use crate::engine::config::EngineConfig;
    use serde_json::{json, Value};

    /// Fails on one chosen call, passes audio through otherwise
    struct FailsOnCall {
        call: usize,
        fail_at: usize,
    }

    impl Effect for FailsOnCall {
        fn process(&mut self, _frames: &mut [Frame], _sample_rate: u32) -> Result<()> {
            let call = self.call;
            self.call += 1;
            if call == self.fail_at {
                return Err(PedalError::ProcessingFault {
                    effect: "fails_on_call".to_string(),
                    reason: format!("scripted failure on call {}", call),
                });
            }
            Ok(())
        }
        fn reset(&mut self) {
            self.call = 0;
        }
        fn effect_type(&self) -> &'static str {
            "fails_on_call"
        }
        fn get_params(&self) -> Value {
            json!({})
        }
        fn set_param(&mut self, name: &str, _value: &Value) -> Result<()> {
            Err(PedalError::invalid_param("fails_on_call", name, "unknown parameter"))
        }
    }

    fn config(block_size: usize) -> EngineConfig {
        EngineConfig {
            block_size,
            ..EngineConfig::default()
        }
    }

    fn half_gain_chain(block_size: usize, fail_at: usize) -> EffectChain {
        let mut chain = EffectChain::new(block_size);
        chain.push(
            "gain",
            ChainEffect::Transposed(Box::new(Gain::new(-6.0206).unwrap())),
        );
        chain.push(
            "flaky",
            ChainEffect::Direct(Box::new(FailsOnCall { call: 0, fail_at })),
        );
        chain
    }

    fn ramp(n: usize, offset: f32) -> Vec<Frame> {
        (0..n).map(|i| [offset + i as f32 * 0.001, -(offset + i as f32 * 0.001)]).collect()
    }

    #[test]
    fn test_fault_block_is_dry_next_block_processed() {
        let mut engine: Engine<Vec<Frame>> =
            Engine::new(&config(32), half_gain_chain(32, 1)).unwrap();
        engine.start().unwrap();

        let mut outputs = Vec::new();
        for k in 0..3 {
            let input = ramp(32, k as f32 * 0.1);
            let mut output = vec![[0.0; 2]; 32];
            engine.process(&input, &mut output);
            outputs.push((input, output));
        }

        let (input0, output0) = &outputs[0];
        assert!((output0[5][0] - input0[5][0] * 0.5).abs() < 1e-4);
        let (input1, output1) = &outputs[1];
        assert_eq!(output1, input1);
        let (input2, output2) = &outputs[2];
        assert!((output2[5][0] - input2[5][0] * 0.5).abs() < 1e-4);

        let stats = engine.stats();
        assert_eq!(stats.blocks_processed, 3);
        assert_eq!(stats.faults, 1);
        assert_eq!(engine.chain().len(), 2);
    }

    #[test]
    fn test_sinks_see_dry_and_wet() {
        let mut engine: Engine<Vec<Frame>> = Engine::new(&config(16), half_gain_chain(16, 99))
            .unwrap()
            .with_sinks(Some(Vec::new()), Some(Vec::new()));
        engine.start().unwrap();

        let input = vec![[0.8, -0.8]; 16];
        let mut output = vec![[0.0; 2]; 16];
        engine.process(&input, &mut output);

        assert_eq!(engine.dry_sink().unwrap(), &input);
        assert_eq!(engine.wet_sink().unwrap(), &output);
        assert!((output[0][0] - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_oversized_block_processed_in_pieces() {
        let mut engine: Engine<Vec<Frame>> =
            Engine::new(&config(16), half_gain_chain(16, usize::MAX)).unwrap();
        engine.start().unwrap();

        let mut block = vec![[1.0, 1.0]; 40];
        engine.process_in_place(&mut block);

        assert_eq!(block.len(), 40);
        assert!(block.iter().all(|f| (f[0] - 0.5).abs() < 1e-4));
        assert_eq!(engine.stats().blocks_processed, 3);
        assert_eq!(engine.transport().position_frames(), 40);
    }

    #[test]
    fn test_rejects_undersized_chain() {
        let chain = EffectChain::new(32);
        assert!(Engine::<Vec<Frame>>::new(&config(64), chain).is_err());
    }

    #[test]
    fn test_finalize_requires_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine: Engine<Vec<Frame>> =
            Engine::new(&config(16), EffectChain::new(16)).unwrap();
        engine.start().unwrap();

        let err = engine.finalize(dir.path()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");

        engine.stop();
        assert_eq!(engine.finalize(dir.path()).unwrap(), Vec::<PathBuf>::new());
    }

    #[test]
    fn test_finalize_writes_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(16);
        let mut engine: Engine = Engine::new(&config, half_gain_chain(16, usize::MAX))
            .unwrap()
            .with_sinks(
                Some(Recorder::dry(config.sample_rate, 1024)),
                Some(Recorder::wet(config.sample_rate, 1024)),
            );
        engine.start().unwrap();
        let mut block = vec![[0.5, 0.5]; 16];
        engine.process_in_place(&mut block);
        engine.stop();

        let saved = engine.finalize(dir.path()).unwrap();
        assert_eq!(saved.len(), 2);
        let names: Vec<String> = saved
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names[0].starts_with("rec-") && names[0].ends_with("-clean.wav"));
        assert!(names[1].ends_with("-fx.wav"));
        // Same session timestamp on both files
        assert_eq!(
            names[0].trim_end_matches("-clean.wav"),
            names[1].trim_end_matches("-fx.wav")
        );
    }

    #[test]
    fn test_note_status_counts() {
        let mut engine: Engine<Vec<Frame>> =
            Engine::new(&config(16), EffectChain::new(16)).unwrap();
        engine.note_status(StreamStatus::InputOverflow);
        engine.note_status(StreamStatus::OutputUnderflow);
        assert_eq!(engine.stats().status_events, 2);
    }
}
