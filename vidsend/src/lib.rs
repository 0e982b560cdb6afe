//! # vidsend - Adaptive Real-Time Video Send Path
//!
//! vidsend sits between a frame source and an external video encoder on the
//! sending side of a real-time session. It decides which frames get encoded,
//! splits the congestion controller's bitrate estimate across simulcast
//! layers, reacts to receiver feedback and reports statistics.
//!
//! ## Key Features
//!
//! - **Frame gating**: pause, network-down and congestion suspension drop
//!   frames before they reach the encoder
//! - **Simulcast allocation**: minimums first, then layers filled in order
//! - **Receiver feedback**: throttled key-frame requests plus slice-loss and
//!   reference-picture hints
//! - **Encoder outside the lock**: encodes run concurrently with rate and
//!   feedback updates
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vidsend::{PayloadRouter, SendPathConfig, VideoEncoder, VideoFrame, VideoSendStream};
//!
//! # async fn run(router: Arc<dyn PayloadRouter>, encoder: Box<dyn VideoEncoder>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let config = SendPathConfig::from_file("send_path.json")?;
//! let (stream, mut events) = VideoSendStream::start(&config, router, encoder)?;
//!
//! stream.on_set_rates(800_000, 30);
//! stream.encode(&VideoFrame::black(640, 480));
//!
//! while let Some(event) = events.next().await {
//!     println!("Send event: {:?}", event);
//! }
//! stream.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use vidsend_core::{
    Clock, EncodedImage, ErrorCategory, FragmentationHeader, FrameType, PayloadRouter,
    RtpVideoHeader, SendPathError, SendPathResult, SimulatedClock, StreamId, StreamTable,
    SystemClock, VideoCodecType,
};

pub use vidsend_media::{
    BitrateAllocation, DropReason, EncodeOutcome, EncodeRequest, EncodedOutputSink, EncoderError,
    EncoderResult, EncoderSession, EncoderSettings, FeedbackSignal, PostEncodeObserver,
    ProtectionMethod, SendState, SendStatistics, SessionCollaborators, SessionConfig,
    SimulcastStream, StatsSink, VideoCodec, VideoEncoder, VideoFrame,
};

pub use vidsend_diagnostics::{
    init_logging, DebugLogger, LogFormat, LoggingError, SendStatisticsProxy, SendStatsSnapshot,
};

// Public API modules
pub mod config;
pub mod event;
pub mod send_stream;

// Re-export main API types
pub use config::{ConfigError, SendPathConfig};
pub use event::{EventSink, EventStream, SendEvent};
pub use send_stream::{RateUpdate, SendStreamError, VideoSendStream};
