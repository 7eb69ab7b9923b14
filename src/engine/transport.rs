//! Session transport
//!
//! Tracks where a session is in its lifecycle and how far the stream has
//! run. The lifecycle only moves forward:
//!
//! ```text
//! Idle -> Running -> Stopped -> Finalized
//! ```

use std::fmt;

use log::debug;

use crate::error::{PedalError, Result};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Built, stream not started yet
    #[default]
    Idle,
    /// Stream is delivering blocks
    Running,
    /// Stream has stopped; recordings not yet written
    Stopped,
    /// Recordings written, session over
    Finalized,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "idle"),
            TransportState::Running => write!(f, "running"),
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Finalized => write!(f, "finalized"),
        }
    }
}

/// Session state plus stream position
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    sample_rate: u32,
    frames_elapsed: u64,
    blocks_elapsed: u64,
}

impl Transport {
    /// Create an idle transport
    ///
    /// # Arguments
    /// * `sample_rate` - Stream sample rate in Hz, used for positions in seconds
    ///
    /// # Example
    /// ```
    /// use pedalboard::engine::Transport;
    /// let mut transport = Transport::new(32000);
    /// transport.start().unwrap();
    /// transport.advance(32000);
    /// transport.stop();
    /// assert_eq!(transport.position_secs(), 1.0);
    /// assert!(transport.finalize().is_ok());
    /// ```
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: TransportState::Idle,
            sample_rate,
            frames_elapsed: 0,
            blocks_elapsed: 0,
        }
    }

    /// Idle -> Running
    ///
    /// # Returns
    /// * `Ok(())` - The transport is running
    /// * `Err(PedalError)` - `InvalidState` if it was already started
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            TransportState::Idle => {
                self.state = TransportState::Running;
                debug!("[TRANSPORT] Running at {} Hz", self.sample_rate);
                Ok(())
            }
            state => Err(invalid("start", state)),
        }
    }

    /// Count one delivered block; ignored unless running
    ///
    /// # Arguments
    /// * `frames` - Frames in the block
    pub fn advance(&mut self, frames: usize) {
        if self.state == TransportState::Running {
            self.frames_elapsed += frames as u64;
            self.blocks_elapsed += 1;
        }
    }

    /// Running -> Stopped
    ///
    /// Stopping an idle session also lands in Stopped so it can still be
    /// finalized; stopping twice is a no-op.
    pub fn stop(&mut self) {
        match self.state {
            TransportState::Idle | TransportState::Running => {
                self.state = TransportState::Stopped;
                debug!(
                    "[TRANSPORT] Stopped after {} blocks ({:.3}s)",
                    self.blocks_elapsed,
                    self.position_secs()
                );
            }
            TransportState::Stopped | TransportState::Finalized => {
                debug!("[TRANSPORT] Already {}", self.state);
            }
        }
    }

    /// Stopped -> Finalized
    ///
    /// # Returns
    /// * `Ok(())` - The session is over
    /// * `Err(PedalError)` - `InvalidState` unless the transport is stopped
    pub fn finalize(&mut self) -> Result<()> {
        match self.state {
            TransportState::Stopped => {
                self.state = TransportState::Finalized;
                debug!("[TRANSPORT] Finalized");
                Ok(())
            }
            state => Err(invalid("finalize", state)),
        }
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.state == TransportState::Stopped
    }

    /// Stream position in seconds
    pub fn position_secs(&self) -> f64 {
        self.frames_elapsed as f64 / self.sample_rate as f64
    }

    /// Stream position in frames
    pub fn position_frames(&self) -> u64 {
        self.frames_elapsed
    }

    /// Blocks delivered while running
    pub fn blocks_elapsed(&self) -> u64 {
        self.blocks_elapsed
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn invalid(action: &str, state: TransportState) -> PedalError {
    PedalError::InvalidState {
        action: action.to_string(),
        state: state.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let transport = Transport::new(32000);
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(transport.position_secs(), 0.0);
        assert_eq!(transport.blocks_elapsed(), 0);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut transport = Transport::new(32000);
        transport.start().unwrap();
        assert!(transport.is_running());

        for _ in 0..500 {
            transport.advance(64);
        }
        assert_eq!(transport.blocks_elapsed(), 500);
        assert_eq!(transport.position_frames(), 32000);
        assert_eq!(transport.position_secs(), 1.0);

        transport.stop();
        assert!(transport.is_stopped());
        transport.finalize().unwrap();
        assert_eq!(transport.state(), TransportState::Finalized);
    }

    #[test]
    fn test_advance_ignored_when_not_running() {
        let mut transport = Transport::new(32000);
        transport.advance(64);
        assert_eq!(transport.position_frames(), 0);

        transport.start().unwrap();
        transport.advance(64);
        transport.stop();
        transport.advance(64);
        assert_eq!(transport.position_frames(), 64);
    }

    #[test]
    fn test_finalize_requires_stop() {
        let mut transport = Transport::new(32000);
        let err = transport.finalize().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");

        transport.start().unwrap();
        assert!(transport.finalize().is_err());
        assert_eq!(transport.state(), TransportState::Running);
    }

    #[test]
    fn test_no_restart() {
        let mut transport = Transport::new(32000);
        transport.start().unwrap();
        assert!(transport.start().is_err());
        transport.stop();
        assert!(transport.start().is_err());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut transport = Transport::new(32000);
        transport.stop();
        transport.stop();
        assert!(transport.is_stopped());
        transport.finalize().unwrap();
        transport.stop();
        assert_eq!(transport.state(), TransportState::Finalized);
        assert!(transport.finalize().is_err());
    }
}
