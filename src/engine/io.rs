//! Audio file I/O for the pedalboard
//!
//! Recordings are written as 32-bit float stereo WAV at the stream's sample
//! rate. Test tones for exercising chains live here as well.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::engine::buffer::{Frame, CHANNELS};
use crate::error::Result;

/// Write stereo frames as a 32-bit float WAV file
///
/// # Arguments
/// * `path` - Destination file, overwritten if it exists
/// * `frames` - Interleaved stereo frames
/// * `sample_rate` - Sample rate stored in the header
///
/// # Errors
/// * `Wav` - If the file cannot be created or written
pub fn write_wav(path: &Path, frames: &[Frame], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: CHANNELS as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for frame in frames {
        for &sample in frame {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Generate a sine test tone, identical on both channels
///
/// # Arguments
/// * `frequency` - Frequency of the sine wave in Hz
/// * `duration_secs` - Duration of the tone in seconds
/// * `sample_rate` - Sample rate in Hz
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<Frame> {
    generate_stereo_test_tone(frequency, frequency, duration_secs, sample_rate)
}

/// Generate a stereo test tone with different frequencies per channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> Vec<Frame> {
    let num_frames = (duration_secs * sample_rate as f32) as usize;
    let step_l = std::f64::consts::TAU * freq_left as f64 / sample_rate as f64;
    let step_r = std::f64::consts::TAU * freq_right as f64 / sample_rate as f64;

    (0..num_frames)
        .map(|i| {
            let t = i as f64;
            [(step_l * t).sin() as f32, (step_r * t).sin() as f32]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_generate_test_tone() {
        let tone = generate_test_tone(440.0, 0.5, 32000);
        assert_eq!(tone.len(), 16000);
        assert_eq!(tone[0], [0.0, 0.0]);
        assert!(tone.iter().all(|f| f[0] == f[1]));

        let peak = tone.iter().map(|f| f[0].abs()).fold(0.0f32, f32::max);
        assert_relative_eq!(peak, 1.0, epsilon = 0.01);
    }

    #[test]
    fn test_generate_stereo_test_tone() {
        let tone = generate_stereo_test_tone(440.0, 880.0, 0.1, 48000);
        assert_eq!(tone.len(), 4800);
        // Quarter period of 440 Hz at 48 kHz is ~27 samples
        assert!(tone[27][0] > 0.99);
        assert!(tone[27][1].abs() < 0.1);
    }

    /// Read back a float stereo file written by `write_wav`
    fn read_float_wav(path: &Path) -> (WavSpec, Vec<Frame>) {
        let mut reader = hound::WavReader::open(path).unwrap();
        let spec = reader.spec();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        let frames = samples.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
        (spec, frames)
    }

    #[test]
    fn test_write_wav_stores_float_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = generate_stereo_test_tone(220.0, 330.0, 0.05, 32000);

        write_wav(&path, &tone, 32000).unwrap();
        let (spec, frames) = read_float_wav(&path);

        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 32000);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(frames, tone);
    }

    #[test]
    fn test_write_wav_into_missing_directory() {
        let err = write_wav(Path::new("/nonexistent/take.wav"), &[[0.0, 0.0]], 32000).unwrap_err();
        assert_eq!(err.error_code(), "WAV_ERROR");
    }
}
