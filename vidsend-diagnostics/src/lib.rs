//! # vidsend diagnostics
//!
//! Logging setup and statistics aggregation for the vidsend send path.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod stats_proxy;

// Re-export main types
pub use debug_logger::{init_logging, DebugLogger, LogFormat, LoggingError};
pub use stats_proxy::{DropCounters, SendStatisticsProxy, SendStatsSnapshot, StreamCounters};
