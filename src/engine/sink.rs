//! Block sinks and the recorder
//!
//! A sink sees every block the engine handles, on the audio thread. It copies
//! what it wants to keep into storage it allocated up front; anything slow
//! happens in [`BlockSink::finalize`], after the stream has stopped.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::engine::buffer::Frame;
use crate::engine::io::write_wav;
use crate::error::{PedalError, Result};

/// Suffix for recordings of the raw input
pub const DRY_SUFFIX: &str = "-clean";

/// Suffix for recordings of the processed output
pub const WET_SUFFIX: &str = "-fx";

/// Receives a copy of each block
pub trait BlockSink: Send {
    /// Called once per block on the audio thread; must not block
    fn on_block(&mut self, frames: &[Frame]);

    /// Persist whatever was collected
    ///
    /// Called on the control thread after the stream stops. `timestamp` is
    /// shared by every sink of one session.
    fn finalize(&mut self, _output_dir: &Path, _timestamp: &str) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Growable in-memory sink
///
/// Allocates as it grows, so only suitable for offline runs and tests.
impl BlockSink for Vec<Frame> {
    fn on_block(&mut self, frames: &[Frame]) {
        self.extend_from_slice(frames);
    }
}

/// Session timestamp: local time to the millisecond, `YYYYmmddHHMMSS.mmm`
pub fn session_timestamp(time: &DateTime<Local>) -> String {
    time.format("%Y%m%d%H%M%S%.3f").to_string()
}

/// File name of a recording, e.g. `rec-20240101120000.123-fx.wav`
pub fn recording_file_name(timestamp: &str, suffix: &str) -> String {
    format!("rec-{}{}.wav", timestamp, suffix)
}

// ============================================================================
// Recorder
// ============================================================================

/// Fixed-capacity recording sink
///
/// Storage for `capacity` frames is reserved at construction. Once it is
/// full, further frames are counted as dropped instead of stored.
#[derive(Debug)]
pub struct Recorder {
    suffix: String,
    sample_rate: u32,
    frames: Vec<Frame>,
    dropped_frames: u64,
}

impl Recorder {
    /// Create a recorder holding up to `capacity` frames
    ///
    /// # Arguments
    /// * `suffix` - Appended to the file name, e.g. `-clean`
    /// * `sample_rate` - Sample rate written to the WAV header
    /// * `capacity` - Frames reserved up front
    pub fn new(suffix: impl Into<String>, sample_rate: u32, capacity: usize) -> Self {
        Self {
            suffix: suffix.into(),
            sample_rate,
            frames: Vec::with_capacity(capacity),
            dropped_frames: 0,
        }
    }

    /// Recorder for the dry input
    pub fn dry(sample_rate: u32, capacity: usize) -> Self {
        Self::new(DRY_SUFFIX, sample_rate, capacity)
    }

    /// Recorder for the processed output
    pub fn wet(sample_rate: u32, capacity: usize) -> Self {
        Self::new(WET_SUFFIX, sample_rate, capacity)
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Frames recorded so far
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Frames the recorder can hold before it starts dropping
    pub fn capacity(&self) -> usize {
        self.frames.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames that arrived after storage filled up
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Recorded length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate as f64
    }

    /// Write the recording as `rec-<timestamp><suffix>.wav` in `output_dir`
    ///
    /// The directory is created if needed. An empty recorder writes nothing.
    pub fn save(&self, output_dir: &Path, timestamp: &str) -> Result<PathBuf> {
        if self.frames.is_empty() {
            return Err(PedalError::RecordingEmpty {
                label: self.suffix.clone(),
            });
        }

        fs::create_dir_all(output_dir)?;
        let path = output_dir.join(recording_file_name(timestamp, &self.suffix));
        write_wav(&path, &self.frames, self.sample_rate)?;

        info!(
            "Saved {:.2}s to {}",
            self.duration_secs(),
            path.display()
        );
        if self.dropped_frames > 0 {
            warn!(
                "Recorder '{}' was full; {} frames were not kept",
                self.suffix, self.dropped_frames
            );
        }
        Ok(path)
    }
}

impl BlockSink for Recorder {
    fn on_block(&mut self, frames: &[Frame]) {
        let room = self.frames.capacity() - self.frames.len();
        let kept = frames.len().min(room);
        self.frames.extend_from_slice(&frames[..kept]);
        self.dropped_frames += (frames.len() - kept) as u64;
    }

    fn finalize(&mut self, output_dir: &Path, timestamp: &str) -> Result<Option<PathBuf>> {
        self.save(output_dir, timestamp).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_timestamp_millis() {
        let time = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 2)
            .unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(session_timestamp(&time), "20240309070502.042");
    }

    #[test]
    fn test_recording_file_name() {
        assert_eq!(
            recording_file_name("20240309070502.042", WET_SUFFIX),
            "rec-20240309070502.042-fx.wav"
        );
        assert_eq!(
            recording_file_name("20240309070502.042", DRY_SUFFIX),
            "rec-20240309070502.042-clean.wav"
        );
    }

    #[test]
    fn test_recorder_keeps_within_capacity() {
        let mut recorder = Recorder::wet(32000, 10);
        recorder.on_block(&[[0.1, 0.2]; 4]);
        recorder.on_block(&[[0.3, 0.4]; 4]);
        assert_eq!(recorder.len(), 8);
        assert_eq!(recorder.dropped_frames(), 0);

        recorder.on_block(&[[0.5, 0.6]; 4]);
        assert_eq!(recorder.len(), 10);
        assert_eq!(recorder.dropped_frames(), 2);
        assert_eq!(recorder.frames()[9], [0.5, 0.6]);

        recorder.on_block(&[[0.7, 0.8]; 3]);
        assert_eq!(recorder.len(), 10);
        assert_eq!(recorder.dropped_frames(), 5);
    }

    #[test]
    fn test_recorder_does_not_reallocate() {
        let mut recorder = Recorder::dry(32000, 256);
        let before = recorder.frames.as_ptr();
        for _ in 0..10 {
            recorder.on_block(&[[0.0, 0.0]; 64]);
        }
        assert_eq!(recorder.frames.as_ptr(), before);
        assert_eq!(recorder.len(), 256);
    }

    #[test]
    fn test_empty_recorder_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("takes");
        let recorder = Recorder::wet(32000, 16);

        let err = recorder.save(&out, "20240101000000.000").unwrap_err();
        assert_eq!(err.error_code(), "RECORDING_EMPTY");
        assert!(!out.exists());
    }

    #[test]
    fn test_save_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("takes");
        let mut recorder = Recorder::wet(32000, 64);
        recorder.on_block(&[[0.25, -0.25]; 32]);

        let path = recorder.save(&out, "20240101000000.000").unwrap();
        assert_eq!(path, out.join("rec-20240101000000.000-fx.wav"));
        assert!(path.exists());

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 32000);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.len(), 64);
    }

    #[test]
    fn test_vec_sink_grows() {
        let mut sink: Vec<Frame> = Vec::new();
        sink.on_block(&[[1.0, 1.0]; 3]);
        sink.on_block(&[[2.0, 2.0]; 2]);
        assert_eq!(sink.len(), 5);
        assert_eq!(
            sink.finalize(Path::new("unused"), "x").unwrap(),
            None
        );
    }
}
