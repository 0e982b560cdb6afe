//! Error types for the video send path

use crate::stream::StreamId;
use thiserror::Error;

/// Main error type for send-path control operations
///
/// Configuration calls return these synchronously and leave the session
/// untouched when they fail. Encode-time failures never surface here; the
/// session absorbs them and drops the frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendPathError {
    /// Codec parameters failed validation
    #[error("Invalid codec configuration: {reason}")]
    InvalidCodecConfig {
        /// Reason the configuration was rejected
        reason: String,
    },

    /// No encoder is registered for the payload type
    #[error("Unsupported payload type: {payload_type}")]
    UnsupportedPayloadType {
        /// Payload type that was requested
        payload_type: u8,
    },

    /// An encoder is already registered for the payload type
    #[error("Payload type {payload_type} already has a registered encoder")]
    PayloadTypeAlreadyRegistered {
        /// Payload type that is taken
        payload_type: u8,
    },

    /// The payload type is used by the active codec configuration
    #[error("Payload type {payload_type} is in use by the active codec")]
    PayloadTypeInUse {
        /// Payload type that is in use
        payload_type: u8,
    },

    /// Codec configuration does not describe one layer per stream
    #[error("Stream count mismatch: session has {expected} streams, codec describes {actual}")]
    StreamCountMismatch {
        /// Number of stream identifiers fixed at construction
        expected: usize,
        /// Number of layers in the codec configuration
        actual: usize,
    },

    /// Stream identifier is not part of the session
    #[error("Unknown stream: {stream_id}")]
    UnknownStream {
        /// Stream identifier that was not found
        stream_id: StreamId,
    },

    /// Operation requires a codec configuration
    #[error("No codec configured")]
    NoCodecConfigured,

    /// Session construction failed
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Transport rejected an encoded image
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },
}

/// Result type alias for send-path operations
pub type SendPathResult<T> = Result<T, SendPathError>;

impl SendPathError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            SendPathError::InvalidCodecConfig { .. } => "INVALID_CODEC_CONFIG",
            SendPathError::UnsupportedPayloadType { .. } => "UNSUPPORTED_PAYLOAD_TYPE",
            SendPathError::PayloadTypeAlreadyRegistered { .. } => "PAYLOAD_TYPE_REGISTERED",
            SendPathError::PayloadTypeInUse { .. } => "PAYLOAD_TYPE_IN_USE",
            SendPathError::StreamCountMismatch { .. } => "STREAM_COUNT_MISMATCH",
            SendPathError::UnknownStream { .. } => "UNKNOWN_STREAM",
            SendPathError::NoCodecConfigured => "NO_CODEC_CONFIGURED",
            SendPathError::Initialization { .. } => "INITIALIZATION_FAILED",
            SendPathError::Transport { .. } => "TRANSPORT_ERROR",
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            SendPathError::InvalidCodecConfig { .. }
            | SendPathError::UnsupportedPayloadType { .. }
            | SendPathError::PayloadTypeAlreadyRegistered { .. }
            | SendPathError::PayloadTypeInUse { .. }
            | SendPathError::StreamCountMismatch { .. }
            | SendPathError::NoCodecConfigured => ErrorCategory::Configuration,
            SendPathError::UnknownStream { .. } => ErrorCategory::Invariant,
            SendPathError::Initialization { .. } => ErrorCategory::System,
            SendPathError::Transport { .. } => ErrorCategory::Transport,
        }
    }

    /// Check if the caller may retry the same operation unchanged
    pub fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transport)
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected configuration; session state unchanged
    Configuration,
    /// Programmer error against the fixed stream set
    Invariant,
    /// Downstream transport failure
    Transport,
    /// Construction and environment failures
    System,
}
