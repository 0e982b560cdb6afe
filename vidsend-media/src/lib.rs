//! # vidsend media
//!
//! Adaptive encode control for one capture source. This crate decides which
//! frames reach the encoder, at what per-stream bitrate, and when key frames
//! are forced, reacting to congestion estimates and receiver feedback that
//! arrive on other threads.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod codecs;
pub mod dispatcher;
pub mod error;
pub mod feedback;
pub mod frame;
pub mod gate;
pub mod registry;
pub mod session;
pub mod statistics;

// Re-export main types
pub use allocator::{BitrateAllocation, BitrateAllocator, LayerLimits, SuspendTransition};
pub use codecs::{
    EncodeRequest, EncoderRegistry, EncoderSettings, ProtectionMethod, ReferenceHints,
    SimulcastStream, VideoCodec, VideoEncoder, FEC_PAYLOAD_OVERHEAD,
};
pub use dispatcher::{
    EncodeHandle, EncodeOutcome, EncodedOutput, EncodedOutputSink, EncoderOutput, OutputPump,
    PostEncodeObserver,
};
pub use error::{EncoderError, EncoderResult};
pub use feedback::{FeedbackEffect, FeedbackRouter, FeedbackSignal};
pub use frame::VideoFrame;
pub use gate::{Admission, FrameGate, SendState};
pub use registry::{StreamFeedbackState, StreamRegistry};
pub use session::{EncoderSession, SessionCollaborators, SessionConfig};
pub use statistics::{
    padding_needed_bps, DropReason, NullStatsSink, RateStatistics, SendStatistics,
    StatisticsTracker, StatsSink,
};
