//! Send statistics aggregation
//!
//! [`SendStatisticsProxy`] is a [`StatsSink`] that folds every notification
//! from an encoder session into one serialisable snapshot.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use vidsend_core::{EncodedImage, StreamId};
use vidsend_media::{DropReason, SendStatistics, StatsSink};

/// Counters for one stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCounters {
    /// Encoded images routed
    pub frames: u64,
    /// Key frames among them
    pub key_frames: u64,
    /// Payload bytes routed
    pub bytes: u64,
    /// Width of the last image
    pub width: u32,
    /// Height of the last image
    pub height: u32,
}

/// Dropped frames by reason
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounters {
    /// Network not transmitting
    pub network_down: u64,
    /// Operator pause
    pub paused: u64,
    /// Congestion suspension
    pub suspended: u64,
    /// No codec or encoder
    pub no_encoder: u64,
    /// Encoder errors
    pub encoder_failures: u64,
}

impl DropCounters {
    fn count(&mut self, reason: DropReason) {
        use vidsend_media::SendState;
        let counter = match reason {
            DropReason::Gate(SendState::NetworkDown) => &mut self.network_down,
            DropReason::Gate(SendState::OperatorPaused) => &mut self.paused,
            DropReason::Gate(SendState::CongestionSuspended) => &mut self.suspended,
            DropReason::Gate(SendState::Active) | DropReason::EncoderFailure => {
                &mut self.encoder_failures
            }
            DropReason::NoEncoder => &mut self.no_encoder,
        };
        *counter += 1;
    }

    /// Sum over all reasons
    pub fn total(&self) -> u64 {
        self.network_down + self.paused + self.suspended + self.no_encoder + self.encoder_failures
    }
}

/// Aggregated send statistics of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendStatsSnapshot {
    /// Session the statistics belong to
    pub session_id: Uuid,
    /// Current encoder implementation
    pub encoder_implementation_name: Option<String>,
    /// Last reported encoded bitrate
    pub encode_bitrate_bps: u32,
    /// Last reported encoded frame rate
    pub encode_framerate: u32,
    /// Last target bitrate from the congestion controller
    pub target_bitrate_bps: u32,
    /// Last target frame rate
    pub target_framerate: u32,
    /// Whether the video is suspended
    pub suspended: bool,
    /// Number of suspensions so far
    pub suspend_count: u64,
    /// Per-stream counters
    pub streams: BTreeMap<StreamId, StreamCounters>,
    /// Dropped frames
    pub dropped: DropCounters,
    /// Time of the last update
    pub updated_at: DateTime<Utc>,
}

impl SendStatsSnapshot {
    fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            encoder_implementation_name: None,
            encode_bitrate_bps: 0,
            encode_framerate: 0,
            target_bitrate_bps: 0,
            target_framerate: 0,
            suspended: false,
            suspend_count: 0,
            streams: BTreeMap::new(),
            dropped: DropCounters::default(),
            updated_at: Utc::now(),
        }
    }

    /// Total images routed across streams
    pub fn total_frames(&self) -> u64 {
        self.streams.values().map(|s| s.frames).sum()
    }
}

/// Statistics sink keeping a running snapshot
#[derive(Debug)]
pub struct SendStatisticsProxy {
    snapshot: Mutex<SendStatsSnapshot>,
}

impl SendStatisticsProxy {
    /// Create a proxy for a session
    pub fn new(session_id: Uuid) -> Self {
        Self {
            snapshot: Mutex::new(SendStatsSnapshot::new(session_id)),
        }
    }

    /// Copy of the current statistics
    pub fn snapshot(&self) -> SendStatsSnapshot {
        self.snapshot.lock().clone()
    }

    /// Current statistics as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.snapshot.lock())
    }

    fn update<F: FnOnce(&mut SendStatsSnapshot)>(&self, f: F) {
        let mut snapshot = self.snapshot.lock();
        f(&mut snapshot);
        snapshot.updated_at = Utc::now();
    }
}

impl StatsSink for SendStatisticsProxy {
    fn on_send_statistics(&self, stats: SendStatistics) {
        self.update(|s| {
            s.encode_bitrate_bps = stats.bitrate_bps;
            s.encode_framerate = stats.framerate;
        });
    }

    fn on_set_rates(&self, bitrate_bps: u32, framerate: u32) {
        self.update(|s| {
            s.target_bitrate_bps = bitrate_bps;
            s.target_framerate = framerate;
        });
    }

    fn on_encoder_implementation_name(&self, name: &str) {
        self.update(|s| s.encoder_implementation_name = Some(name.to_string()));
    }

    fn on_suspend_change(&self, suspended: bool) {
        self.update(|s| {
            if suspended && !s.suspended {
                s.suspend_count += 1;
            }
            s.suspended = suspended;
            debug!(
                session = %s.session_id,
                suspended,
                suspend_count = s.suspend_count,
                "Suspend state recorded"
            );
        });
    }

    fn on_encoded_image(&self, image: &EncodedImage) {
        self.update(|s| {
            let counters = s.streams.entry(image.stream_id).or_default();
            counters.frames += 1;
            counters.bytes += image.len() as u64;
            if image.frame_type.is_key() {
                counters.key_frames += 1;
            }
            counters.width = image.width;
            counters.height = image.height;
        });
    }

    fn on_frame_dropped(&self, reason: DropReason) {
        self.update(|s| s.dropped.count(reason));
    }
}
