//! Encoder error types
//!
//! Errors reported by the opaque encoder behind [`crate::codecs::VideoEncoder`].
//! The session absorbs every one of them locally: the frame is dropped and the
//! next admitted frame retries.

use thiserror::Error;

/// Error reported by an encoder implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncoderError {
    /// Encoder could not be initialised with the requested settings
    #[error("Encoder initialization failed: {codec} - {reason}")]
    InitFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Encoding a frame failed
    #[error("Encoding failed: {codec} - {reason}")]
    EncodeFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Rate update rejected by the encoder
    #[error("Rate update rejected: {reason}")]
    RatesRejected {
        /// Failure reason
        reason: String,
    },

    /// Encoder is temporarily out of resources (e.g. hardware queue full)
    #[error("Encoder busy")]
    Busy,

    /// Encode called before a successful initialisation
    #[error("Encoder not initialized")]
    Uninitialized,

    /// Output channel to the session is gone
    #[error("Encoder output channel closed")]
    OutputClosed,
}

/// Result type alias for encoder operations
pub type EncoderResult<T> = Result<T, EncoderError>;

impl EncoderError {
    /// Check if the next frame is expected to succeed without intervention
    pub fn is_recoverable(&self) -> bool {
        match self {
            EncoderError::Busy => true,
            EncoderError::EncodeFailed { .. } => true,
            EncoderError::RatesRejected { .. } => true,
            EncoderError::Uninitialized => true,
            EncoderError::InitFailed { .. } => false,
            EncoderError::OutputClosed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_recoverability() {
        assert!(EncoderError::Busy.is_recoverable());
        let init = EncoderError::InitFailed {
            codec: "VP8".to_string(),
            reason: "unsupported resolution".to_string(),
        };
        assert!(!init.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = EncoderError::EncodeFailed {
            codec: "H.264".to_string(),
            reason: "bitstream overflow".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Encoding failed: H.264 - bitstream overflow"
        );
    }
}
