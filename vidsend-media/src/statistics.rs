//! Send statistics and padding estimation

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use vidsend_core::EncodedImage;

use crate::gate::SendState;

/// Sliding-window byte and sample counter
#[derive(Debug, Clone)]
pub struct RateStatistics {
    window_ms: i64,
    samples: VecDeque<(i64, usize)>,
    total_bytes: usize,
}

impl RateStatistics {
    /// Create a counter over `window_ms`
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms: window_ms.max(1),
            samples: VecDeque::new(),
            total_bytes: 0,
        }
    }

    /// Add a sample of `bytes` at `now_ms`
    pub fn update(&mut self, bytes: usize, now_ms: i64) {
        self.evict(now_ms);
        self.samples.push_back((now_ms, bytes));
        self.total_bytes += bytes;
    }

    /// Bits per second over the window ending at `now_ms`
    pub fn rate_bps(&mut self, now_ms: i64) -> u32 {
        self.evict(now_ms);
        let bits = self.total_bytes as u64 * 8 * 1000;
        (bits / self.window_ms as u64).min(u32::MAX as u64) as u32
    }

    /// Samples per second over the window ending at `now_ms`
    pub fn sample_rate(&mut self, now_ms: i64) -> u32 {
        self.evict(now_ms);
        (self.samples.len() as u64 * 1000 / self.window_ms as u64) as u32
    }

    fn evict(&mut self, now_ms: i64) {
        while let Some(&(time, bytes)) = self.samples.front() {
            if now_ms - time < self.window_ms {
                break;
            }
            self.samples.pop_front();
            self.total_bytes -= bytes;
        }
    }
}

/// Periodic send statistics report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendStatistics {
    /// Encoded bitrate over the statistics window
    pub bitrate_bps: u32,
    /// Encoded frame rate over the statistics window
    pub framerate: u32,
    /// Frames encoded since the session started
    pub encoded_frames: u64,
    /// Frames dropped since the session started
    pub dropped_frames: u64,
}

/// Why a frame was not encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Rejected by the frame gate
    Gate(SendState),
    /// No codec configured or no encoder registered for it
    NoEncoder,
    /// The encoder reported an error
    EncoderFailure,
}

/// Rolling statistics over encoded output
#[derive(Debug, Clone)]
pub struct StatisticsTracker {
    bitrate: RateStatistics,
    frames: RateStatistics,
    report_interval_ms: i64,
    last_report_ms: Option<i64>,
    last_rtp_timestamp: Option<u32>,
    encoded_frames: u64,
    dropped_frames: u64,
}

impl StatisticsTracker {
    /// Create a tracker
    pub fn new(window_ms: i64, report_interval_ms: i64) -> Self {
        Self {
            bitrate: RateStatistics::new(window_ms),
            frames: RateStatistics::new(window_ms),
            report_interval_ms,
            last_report_ms: None,
            last_rtp_timestamp: None,
            encoded_frames: 0,
            dropped_frames: 0,
        }
    }

    /// Account one encoded image; returns a report when one is due
    ///
    /// Simulcast layers of the same source frame share an RTP timestamp and
    /// count as one frame.
    pub fn on_encoded(&mut self, image: &EncodedImage, now_ms: i64) -> Option<SendStatistics> {
        self.bitrate.update(image.len(), now_ms);
        if self.last_rtp_timestamp != Some(image.rtp_timestamp) {
            self.last_rtp_timestamp = Some(image.rtp_timestamp);
            self.frames.update(0, now_ms);
            self.encoded_frames += 1;
        }

        let due = match self.last_report_ms {
            None => true,
            Some(last) => now_ms - last >= self.report_interval_ms,
        };
        if !due {
            return None;
        }
        self.last_report_ms = Some(now_ms);
        Some(self.snapshot(now_ms))
    }

    /// Count a dropped frame
    pub fn on_dropped(&mut self) {
        self.dropped_frames += 1;
    }

    /// Current statistics
    pub fn snapshot(&mut self, now_ms: i64) -> SendStatistics {
        SendStatistics {
            bitrate_bps: self.bitrate.rate_bps(now_ms),
            framerate: self.frames.sample_rate(now_ms),
            encoded_frames: self.encoded_frames,
            dropped_frames: self.dropped_frames,
        }
    }
}

/// Padding needed to keep the channel at `min_transmit_bitrate_bps`
///
/// Zero once the source has been idle for `idle_threshold_ms` or never
/// produced anything.
pub fn padding_needed_bps(
    min_transmit_bitrate_bps: u32,
    last_observed_bitrate_bps: u32,
    last_activity_ms: Option<i64>,
    now_ms: i64,
    idle_threshold_ms: i64,
) -> u32 {
    match last_activity_ms {
        Some(activity) if now_ms - activity < idle_threshold_ms => {
            min_transmit_bitrate_bps.saturating_sub(last_observed_bitrate_bps)
        }
        _ => 0,
    }
}

/// Receiver of send-side statistics
///
/// Called outside the session lock. Every method defaults to a no-op.
pub trait StatsSink: Send + Sync + std::fmt::Debug {
    /// Periodic bitrate/framerate report
    fn on_send_statistics(&self, stats: SendStatistics) {
        let _ = stats;
    }

    /// New target bitrate and framerate from the congestion controller
    fn on_set_rates(&self, bitrate_bps: u32, framerate: u32) {
        let _ = (bitrate_bps, framerate);
    }

    /// Encoder implementation changed
    fn on_encoder_implementation_name(&self, name: &str) {
        let _ = name;
    }

    /// Video suspended or resumed
    fn on_suspend_change(&self, suspended: bool) {
        let _ = suspended;
    }

    /// Image handed to the transport
    fn on_encoded_image(&self, image: &EncodedImage) {
        let _ = image;
    }

    /// Frame not encoded
    fn on_frame_dropped(&self, reason: DropReason) {
        let _ = reason;
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatsSink;

impl StatsSink for NullStatsSink {}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use vidsend_core::{FrameType, StreamId};

    fn image(bytes: usize, rtp_timestamp: u32) -> EncodedImage {
        EncodedImage {
            stream_id: StreamId(1),
            payload: Bytes::from(vec![0u8; bytes]),
            frame_type: FrameType::Delta,
            width: 320,
            height: 240,
            rtp_timestamp,
            capture_time_ms: 0,
        }
    }

    #[test]
    fn test_rate_window_evicts_old_samples() {
        let mut rate = RateStatistics::new(1_000);
        rate.update(1_000, 0);
        rate.update(1_000, 500);
        assert_eq!(rate.rate_bps(900), 16_000);
        assert_eq!(rate.rate_bps(1_000), 8_000);
        assert_eq!(rate.rate_bps(1_500), 0);
    }

    #[test]
    fn test_reports_are_rate_limited() {
        let mut tracker = StatisticsTracker::new(1_000, 1_000);
        assert!(tracker.on_encoded(&image(500, 0), 0).is_some());
        for i in 1..30 {
            assert!(tracker.on_encoded(&image(500, i * 3000), i as i64 * 33).is_none());
        }
        let report = tracker.on_encoded(&image(500, 90_000), 1_000).unwrap();
        assert_eq!(report.encoded_frames, 31);
        assert!(report.framerate >= 29);
    }

    #[test]
    fn test_simulcast_layers_count_as_one_frame() {
        let mut tracker = StatisticsTracker::new(1_000, 1_000);
        tracker.on_encoded(&image(100, 3000), 0);
        tracker.on_encoded(&image(400, 3000), 0);
        let stats = tracker.snapshot(10);
        assert_eq!(stats.encoded_frames, 1);
        assert_eq!(stats.bitrate_bps, 4_000);
    }

    #[test]
    fn test_padding_needed() {
        assert_eq!(padding_needed_bps(300_000, 100_000, Some(0), 500, 2_000), 200_000);
        assert_eq!(padding_needed_bps(300_000, 400_000, Some(0), 500, 2_000), 0);
        assert_eq!(padding_needed_bps(300_000, 100_000, Some(0), 2_000, 2_000), 0);
        assert_eq!(padding_needed_bps(300_000, 100_000, None, 0, 2_000), 0);
    }
}
