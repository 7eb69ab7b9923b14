//! Live audio through the host's sound devices
//!
//! The input stream pushes frames into a lock-free FIFO. The output stream
//! pulls them out, runs the engine, and writes the result. The engine sits
//! behind a mutex that only the output callback locks while the stream runs;
//! the control thread takes it back after both streams are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::queue::ArrayQueue;
use log::{error, info};

use crate::engine::buffer::Frame;
use crate::engine::callback::{Engine, StreamStatus};
use crate::engine::config::EngineConfig;
use crate::engine::driver::{StatusReporter, StopSignal, StreamDriver};
use crate::engine::sink::BlockSink;
use crate::error::{PedalError, Result};

/// How often the control thread checks for stop and stream errors
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Minimum blocks of headroom in the input FIFO
const FIFO_BLOCKS: usize = 8;

/// Shortest gap between two status log lines
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Duplex driver bound to input and output devices
pub struct DeviceDriver {
    config: EngineConfig,
}

impl DeviceDriver {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Stereo stream settings with a device buffer of `buffer_frames`
    fn stream_config(&self, buffer_frames: usize) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(buffer_frames as u32),
        }
    }
}

/// Find a device by name, or the host default
fn find_device(
    host: &cpal::Host,
    name: Option<&str>,
    input: bool,
) -> Result<cpal::Device> {
    let unavailable = |reason: String| PedalError::DeviceUnavailable { reason };

    match name {
        None => {
            let device = if input {
                host.default_input_device()
            } else {
                host.default_output_device()
            };
            device.ok_or_else(|| {
                unavailable(format!(
                    "no default {} device",
                    if input { "input" } else { "output" }
                ))
            })
        }
        Some(wanted) => {
            let devices = if input {
                host.input_devices()
            } else {
                host.output_devices()
            }
            .map_err(|e| unavailable(e.to_string()))?;

            devices
                .into_iter()
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| unavailable(format!("no device named '{}'", wanted)))
        }
    }
}

/// Names of the host's input and output devices
pub fn list_devices() -> Result<(Vec<String>, Vec<String>)> {
    let host = cpal::default_host();
    let unavailable = |e: cpal::DevicesError| PedalError::DeviceUnavailable {
        reason: e.to_string(),
    };

    let inputs = host
        .input_devices()
        .map_err(unavailable)?
        .filter_map(|d| d.name().ok())
        .collect();
    let outputs = host
        .output_devices()
        .map_err(unavailable)?
        .filter_map(|d| d.name().ok())
        .collect();
    Ok((inputs, outputs))
}

impl StreamDriver for DeviceDriver {
    fn run<S: BlockSink + 'static>(
        &mut self,
        engine: Engine<S>,
        stop: &StopSignal,
    ) -> (Engine<S>, Result<()>) {
        let engine = Arc::new(Mutex::new(engine));
        let outcome = self.run_streams(Arc::clone(&engine), stop);

        // Both streams are dropped by now, so this is the only reference left
        let engine = match Arc::try_unwrap(engine) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(|p| p.into_inner()),
            Err(_) => unreachable!("stream callbacks outlived their streams"),
        };
        (engine, outcome)
    }
}

impl DeviceDriver {
    fn run_streams<S: BlockSink + 'static>(
        &self,
        engine: Arc<Mutex<Engine<S>>>,
        stop: &StopSignal,
    ) -> Result<()> {
        let host = cpal::default_host();
        let input_device = find_device(&host, self.config.input_device.as_deref(), true)?;
        let output_device = find_device(&host, self.config.output_device.as_deref(), false)?;
        info!(
            "Using input '{}' and output '{}'",
            input_device.name().unwrap_or_default(),
            output_device.name().unwrap_or_default()
        );

        let block_size = self.config.block_size;
        let (input_frames, output_frames) = self.config.latency_frames();
        info!(
            "Device buffers: {} frames in, {} frames out",
            input_frames, output_frames
        );

        // Room for one device buffer from each side, twice over
        let fifo_frames = (2 * (input_frames + output_frames)).max(block_size * FIFO_BLOCKS);
        let fifo = Arc::new(ArrayQueue::<Frame>::new(fifo_frames));
        // Frames dropped by the input callback since the output callback last looked
        let overflows = Arc::new(AtomicU64::new(0));
        // Callbacks that noted each condition, read by the control loop
        let overflow_events = Arc::new(AtomicU64::new(0));
        let underflow_events = Arc::new(AtomicU64::new(0));
        let stream_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let input_stream = {
            let fifo = Arc::clone(&fifo);
            let overflows = Arc::clone(&overflows);
            let stream_error = Arc::clone(&stream_error);
            input_device
                .build_input_stream(
                    &self.stream_config(input_frames),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        for frame in data.chunks_exact(2) {
                            if fifo.push([frame[0], frame[1]]).is_err() {
                                overflows.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    },
                    move |err| record_stream_error(&stream_error, err.to_string()),
                    None,
                )
                .map_err(|e| PedalError::DeviceUnavailable {
                    reason: format!("input stream: {}", e),
                })?
        };

        let output_stream = {
            let fifo = Arc::clone(&fifo);
            let overflows = Arc::clone(&overflows);
            let overflow_events = Arc::clone(&overflow_events);
            let underflow_events = Arc::clone(&underflow_events);
            let stream_error = Arc::clone(&stream_error);
            let engine = Arc::clone(&engine);
            let mut block: Vec<Frame> = vec![[0.0; 2]; block_size];
            output_device
                .build_output_stream(
                    &self.stream_config(output_frames),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let Ok(mut engine) = engine.try_lock() else {
                            data.fill(0.0);
                            return;
                        };

                        if overflows.swap(0, Ordering::Relaxed) > 0 {
                            engine.note_status(StreamStatus::InputOverflow);
                            overflow_events.fetch_add(1, Ordering::Relaxed);
                        }

                        for out in data.chunks_mut(block_size * 2) {
                            let frames = out.len() / 2;
                            let mut short = false;
                            for slot in block[..frames].iter_mut() {
                                *slot = fifo.pop().unwrap_or_else(|| {
                                    short = true;
                                    [0.0, 0.0]
                                });
                            }
                            if short {
                                engine.note_status(StreamStatus::OutputUnderflow);
                                underflow_events.fetch_add(1, Ordering::Relaxed);
                            }

                            engine.process_in_place(&mut block[..frames]);
                            for (pair, frame) in out.chunks_exact_mut(2).zip(&block[..frames]) {
                                pair[0] = frame[0];
                                pair[1] = frame[1];
                            }
                        }
                    },
                    move |err| record_stream_error(&stream_error, err.to_string()),
                    None,
                )
                .map_err(|e| PedalError::DeviceUnavailable {
                    reason: format!("output stream: {}", e),
                })?
        };

        input_stream.play().map_err(|e| PedalError::StreamFault {
            reason: e.to_string(),
        })?;
        output_stream.play().map_err(|e| PedalError::StreamFault {
            reason: e.to_string(),
        })?;
        info!("Streams running, press Enter to stop");

        let mut reporter = StatusReporter::new(STATUS_LOG_INTERVAL);
        let outcome = loop {
            reporter.poll(
                (
                    overflow_events.load(Ordering::Relaxed),
                    underflow_events.load(Ordering::Relaxed),
                ),
                Instant::now(),
            );
            if stop.is_stop_requested() {
                break Ok(());
            }
            let failed = stream_error
                .lock()
                .map(|mut guard| guard.take())
                .unwrap_or(None);
            if let Some(reason) = failed {
                break Err(PedalError::StreamFault { reason });
            }
            thread::sleep(POLL_INTERVAL);
        };

        drop(input_stream);
        drop(output_stream);
        outcome
    }
}

fn record_stream_error(slot: &Mutex<Option<String>>, reason: String) {
    error!("Audio stream error: {}", reason);
    if let Ok(mut guard) = slot.lock() {
        guard.get_or_insert(reason);
    }
}
