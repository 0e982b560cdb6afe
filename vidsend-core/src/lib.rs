//! # vidsend core
//!
//! Shared primitives for the vidsend video send path: the error taxonomy,
//! stream identifiers and the fixed-capacity per-stream table, the clock
//! abstraction, and the encoded-payload types handed to the transport.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod payload;
pub mod stream;

// Re-export main types
pub use clock::{Clock, SimulatedClock, SystemClock};
pub use error::{ErrorCategory, SendPathError, SendPathResult};
pub use payload::{
    EncodedImage, FragmentationHeader, FrameType, PayloadRouter, RtpVideoHeader,
    VideoCodecType, DEFAULT_MAX_PAYLOAD_LENGTH,
};
pub use stream::{StreamId, StreamTable};
