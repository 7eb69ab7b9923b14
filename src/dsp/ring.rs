//! Ring Delay Line
//!
//! Fixed-capacity circular store of stereo frames shared by the chorus and
//! the pitch shifter. Delays are measured from the most recently written
//! frame: a delay of 0 reads back the frame just written, a delay of `d`
//! reads the frame written `d` writes earlier.

use crate::engine::buffer::Frame;
use serde::{Deserialize, Serialize};

/// How fractional delays are resolved
///
/// Chosen once when the ring is built and never changed afterwards, so every
/// read of a given ring follows the same policy and recorded output stays
/// reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Round the read position down to the nearest lower index
    #[default]
    Floor,
    /// Blend linearly between the two neighbouring indices
    Linear,
}

impl Interpolation {
    /// Parse an interpolation policy name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "floor" | "truncate" => Some(Interpolation::Floor),
            "linear" => Some(Interpolation::Linear),
            _ => None,
        }
    }

    /// Get string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::Floor => "floor",
            Interpolation::Linear => "linear",
        }
    }
}

/// Circular stereo delay line
#[derive(Debug, Clone)]
pub struct RingDelayLine {
    buffer: Vec<Frame>,
    /// Slot the next write goes to
    write_pos: usize,
    interpolation: Interpolation,
}

impl RingDelayLine {
    /// Create a silent ring holding `capacity` frames
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, interpolation: Interpolation) -> Self {
        assert!(capacity > 0, "ring delay line needs a non-zero capacity");
        Self {
            buffer: vec![[0.0; 2]; capacity],
            write_pos: 0,
            interpolation,
        }
    }

    /// Number of frames the ring can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Slot the next write will land in
    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Policy used for fractional reads
    #[inline]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Store a frame at the write pointer and advance it
    #[inline]
    pub fn write(&mut self, frame: Frame) {
        self.buffer[self.write_pos] = frame;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Move the write pointer forward by `frames` without writing
    pub fn advance(&mut self, frames: usize) {
        self.write_pos = (self.write_pos + frames % self.buffer.len()) % self.buffer.len();
    }

    /// Read the frame `delay` samples older than the newest written frame
    ///
    /// `delay` must stay below the capacity; larger values wrap into stale
    /// data. That is a sizing bug in the caller, caught in debug builds.
    #[inline]
    pub fn read_at(&self, delay: f64) -> Frame {
        debug_assert!(
            delay < self.buffer.len() as f64,
            "delay {} exceeds ring capacity {}",
            delay,
            self.buffer.len()
        );

        let newest = self.newest_index() as f64;
        let position = newest - delay;

        match self.interpolation {
            Interpolation::Floor => self.frame_at(position.floor() as i64),
            Interpolation::Linear => {
                let base = position.floor();
                let frac = (position - base) as f32;
                let a = self.frame_at(base as i64);
                let b = self.frame_at(base as i64 + 1);
                [
                    a[0] + (b[0] - a[0]) * frac,
                    a[1] + (b[1] - a[1]) * frac,
                ]
            }
        }
    }

    /// Clear all stored audio and rewind the write pointer
    pub fn reset(&mut self) {
        self.buffer.fill([0.0; 2]);
        self.write_pos = 0;
    }

    /// Index of the most recently written frame
    #[inline]
    fn newest_index(&self) -> usize {
        (self.write_pos + self.buffer.len() - 1) % self.buffer.len()
    }

    /// Frame at an absolute (possibly negative) index, wrapped into the ring
    #[inline]
    fn frame_at(&self, index: i64) -> Frame {
        let len = self.buffer.len() as i64;
        self.buffer[index.rem_euclid(len) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_back_after_known_delay() {
        let mut ring = RingDelayLine::new(16, Interpolation::Floor);

        for d in 0..10 {
            let mut ring = ring.clone();
            ring.write([42.0, -42.0]);
            for i in 0..d {
                ring.write([i as f32, i as f32]);
            }
            assert_eq!(ring.read_at(d as f64), [42.0, -42.0], "delay {}", d);
        }

        // Also across many wraps of the write pointer
        for i in 0..1000 {
            ring.write([i as f32, 0.0]);
        }
        assert_eq!(ring.read_at(0.0)[0], 999.0);
        assert_eq!(ring.read_at(15.0)[0], 984.0);
    }

    #[test]
    fn test_floor_policy_rounds_down_the_position() {
        let mut ring = RingDelayLine::new(8, Interpolation::Floor);
        for i in 0..5 {
            ring.write([i as f32, 0.0]);
        }

        // newest = 4; position 4 - 1.25 = 2.75 floors to index 2
        assert_eq!(ring.read_at(1.25)[0], 2.0);
        // position 4 - 1.0 = 3.0 exactly
        assert_eq!(ring.read_at(1.0)[0], 3.0);
    }

    #[test]
    fn test_linear_policy_interpolates() {
        let mut ring = RingDelayLine::new(8, Interpolation::Linear);
        for i in 0..5 {
            ring.write([i as f32, 2.0 * i as f32]);
        }

        let frame = ring.read_at(1.5);
        assert!((frame[0] - 2.5).abs() < 1e-6);
        assert!((frame[1] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_positions_wrap() {
        let mut ring = RingDelayLine::new(4, Interpolation::Floor);
        ring.write([1.0, 1.0]);

        // newest = 0, delay 1 wraps to the last slot (still silent)
        assert_eq!(ring.read_at(1.0), [0.0, 0.0]);
        assert_eq!(ring.read_at(0.5), [0.0, 0.0]);
        assert_eq!(ring.read_at(0.0), [1.0, 1.0]);
    }

    #[test]
    fn test_advance_wraps_modulo_capacity() {
        let mut ring = RingDelayLine::new(10, Interpolation::Floor);
        ring.advance(7);
        assert_eq!(ring.write_pos(), 7);
        ring.advance(25);
        assert_eq!(ring.write_pos(), 2);
    }

    #[test]
    fn test_reset() {
        let mut ring = RingDelayLine::new(4, Interpolation::Floor);
        ring.write([0.5, 0.5]);
        ring.write([0.7, 0.7]);

        ring.reset();

        assert_eq!(ring.write_pos(), 0);
        for d in 0..4 {
            assert_eq!(ring.read_at(d as f64), [0.0, 0.0]);
        }
    }

    #[test]
    fn test_interpolation_names() {
        assert_eq!(Interpolation::from_name("Linear"), Some(Interpolation::Linear));
        assert_eq!(Interpolation::from_name("floor"), Some(Interpolation::Floor));
        assert_eq!(Interpolation::from_name("cubic"), None);
        assert_eq!(Interpolation::Floor.as_str(), "floor");
    }
}
