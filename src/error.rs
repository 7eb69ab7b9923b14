//! Error handling for the pedalboard
//!
//! Errors fall into four categories. Configuration errors surface while the
//! chain is being built and stop it from starting at all. Processing faults
//! are contained at the chain boundary and cost one dry block. Stream faults
//! end the run loop. Storage errors come from saving recordings after stop.

use thiserror::Error;

/// Result type alias for pedalboard operations
pub type Result<T> = std::result::Result<T, PedalError>;

/// Broad class of an error, used to decide how far it may propagate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised while building the chain, before the stream starts
    Configuration,
    /// Raised by an effect for a single block
    Processing,
    /// Raised by the stream driver or device
    Stream,
    /// Raised while writing recordings
    Storage,
}

/// Main error type for pedalboard operations
#[derive(Error, Debug)]
pub enum PedalError {
    // Configuration Errors
    #[error("Unknown {kind} effect: {name}")]
    UnknownEffect { kind: String, name: String },

    #[error("Unsupported effect kind: {kind}")]
    UnsupportedKind { kind: String },

    #[error("Invalid parameter '{param}' for {effect}: {reason}")]
    InvalidParameter {
        effect: String,
        param: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Processing Errors
    #[error("Effect '{effect}' failed: {reason}")]
    ProcessingFault { effect: String, reason: String },

    #[error("Effect '{effect}' produced invalid audio: {reason}")]
    InvalidOutput { effect: String, reason: String },

    // Stream Errors
    #[error("Stream fault: {reason}")]
    StreamFault { reason: String },

    #[error("Audio device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    #[error("Cannot {action} while {state}")]
    InvalidState { action: String, state: String },

    // Storage Errors
    #[error("Nothing recorded for '{label}'")]
    RecordingEmpty { label: String },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PedalError {
    /// Shorthand for an invalid parameter error
    pub fn invalid_param(effect: &str, param: &str, reason: impl Into<String>) -> Self {
        PedalError::InvalidParameter {
            effect: effect.to_string(),
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            PedalError::UnknownEffect { .. } => "UNKNOWN_EFFECT",
            PedalError::UnsupportedKind { .. } => "UNSUPPORTED_KIND",
            PedalError::InvalidParameter { .. } => "INVALID_PARAMETER",
            PedalError::InvalidConfig { .. } => "INVALID_CONFIG",
            PedalError::ProcessingFault { .. } => "PROCESSING_FAULT",
            PedalError::InvalidOutput { .. } => "INVALID_OUTPUT",
            PedalError::StreamFault { .. } => "STREAM_FAULT",
            PedalError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            PedalError::InvalidState { .. } => "INVALID_STATE",
            PedalError::RecordingEmpty { .. } => "RECORDING_EMPTY",
            PedalError::Wav(_) => "WAV_ERROR",
            PedalError::Io(_) => "IO_ERROR",
            PedalError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Which part of the system raised this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            PedalError::UnknownEffect { .. }
            | PedalError::UnsupportedKind { .. }
            | PedalError::InvalidParameter { .. }
            | PedalError::InvalidConfig { .. }
            | PedalError::Serialization(_) => ErrorCategory::Configuration,
            PedalError::ProcessingFault { .. } | PedalError::InvalidOutput { .. } => {
                ErrorCategory::Processing
            }
            PedalError::StreamFault { .. }
            | PedalError::DeviceUnavailable { .. }
            | PedalError::InvalidState { .. } => ErrorCategory::Stream,
            PedalError::RecordingEmpty { .. } | PedalError::Wav(_) | PedalError::Io(_) => {
                ErrorCategory::Storage
            }
        }
    }

    /// Check if the stream can keep running after this error
    ///
    /// Only per-block processing faults are absorbed; everything else either
    /// prevents the stream from starting or has already stopped it.
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Processing
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PedalError::UnknownEffect { .. } => vec![
                "Check the effect name for typos",
                "Run 'pedalboard-cli list-effects' to see registered effects",
            ],
            PedalError::UnsupportedKind { .. } => vec![
                "Use kind 'custom' or 'internal'",
                "External plugin hosting is not supported",
            ],
            PedalError::InvalidParameter { .. } => vec![
                "Check the parameter range in 'list-effects'",
                "Remove the parameter to use its default",
            ],
            PedalError::InvalidConfig { .. } => vec![
                "Supported sample rates are 8000 to 48000 Hz",
                "Block size must be between 1 and 4096 frames",
            ],
            PedalError::ProcessingFault { .. } | PedalError::InvalidOutput { .. } => vec![
                "The block was passed through dry",
                "Try less extreme effect settings",
            ],
            PedalError::DeviceUnavailable { .. } => vec![
                "Check the device names in the audio configuration",
                "Rebuild with '--features device' to enable live audio",
            ],
            PedalError::StreamFault { .. } => vec![
                "Increase the block size or the device latency",
                "Recordings captured before the fault were still saved",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = PedalError::UnknownEffect {
            kind: "custom".to_string(),
            name: "flanger".to_string(),
        };
        assert_eq!(err.error_code(), "UNKNOWN_EFFECT");
        assert_eq!(err.to_string(), "Unknown custom effect: flanger");
    }

    #[test]
    fn test_categories() {
        let fault = PedalError::ProcessingFault {
            effect: "gain".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(fault.category(), ErrorCategory::Processing);
        assert!(fault.is_recoverable());

        let config = PedalError::invalid_param("chorus", "mix", "out of range");
        assert_eq!(config.category(), ErrorCategory::Configuration);
        assert!(!config.is_recoverable());

        let stream = PedalError::StreamFault {
            reason: "device lost".to_string(),
        };
        assert_eq!(stream.category(), ErrorCategory::Stream);
        assert!(!stream.is_recoverable());
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = PedalError::InvalidOutput {
            effect: "distortion".to_string(),
            reason: "NaN".to_string(),
        };
        assert!(!err.recovery_suggestions().is_empty());
    }
}
