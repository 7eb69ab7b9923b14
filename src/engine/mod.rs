//! Audio Engine Module
//!
//! Everything around the effect chain:
//! - Frame and planar buffers
//! - Configuration
//! - The real-time callback and its sinks
//! - Session transport, stream drivers and the run loop
//! - WAV file I/O

pub mod buffer;
pub mod callback;
pub mod config;
#[cfg(feature = "device")]
pub mod device;
pub mod driver;
pub mod io;
pub mod sink;
pub mod transport;

pub use buffer::{Frame, PlanarBuffer, CHANNELS, MAX_BLOCK_SIZE};
pub use callback::{Engine, EngineStats, StreamStatus};
pub use config::{EffectKind, EffectSpec, EngineConfig, PedalboardConfig, RecordingConfig};
#[cfg(feature = "device")]
pub use device::{list_devices, DeviceDriver};
pub use driver::{
    run_session, MemoryDriver, SessionReport, StatusReporter, StopSignal, StreamDriver,
};
pub use io::{generate_stereo_test_tone, generate_test_tone, write_wav};
pub use sink::{BlockSink, Recorder, DRY_SUFFIX, WET_SUFFIX};
pub use transport::{Transport, TransportState};
