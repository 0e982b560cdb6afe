//! Configuration types and defaults
//!
//! A [`SendPathConfig`] is a JSON document describing the streams, codec and
//! operating constants of one send path. It converts into the codec and
//! session types the media crate works with.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use vidsend_core::StreamId;
use vidsend_diagnostics::LogFormat;
use vidsend_media::{SessionConfig, SimulcastStream, VideoCodec};

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid JSON for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Document parsed but describes an unusable send path
    #[error("Invalid config: {reason}")]
    Invalid {
        /// What is wrong
        reason: String,
    },
}

/// Codec section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSection {
    /// RTP payload type
    pub payload_type: u8,
    /// Codec name, e.g. "VP8"
    pub name: String,
    /// Full resolution width
    pub width: u32,
    /// Full resolution height
    pub height: u32,
    /// Frame rate cap
    pub max_framerate: u32,
    /// Bitrate before the first estimate
    pub start_bitrate_bps: u32,
}

impl Default for CodecSection {
    fn default() -> Self {
        Self {
            payload_type: 96,
            name: "VP8".to_string(),
            width: 640,
            height: 480,
            max_framerate: 30,
            start_bitrate_bps: 300_000,
        }
    }
}

/// One output stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSection {
    /// Stream identifier (SSRC)
    pub id: u32,
    /// Layer width; defaults to the codec width
    #[serde(default)]
    pub width: Option<u32>,
    /// Layer height; defaults to the codec height
    #[serde(default)]
    pub height: Option<u32>,
    /// Minimum bitrate
    pub min_bitrate_bps: u32,
    /// Target bitrate; defaults to the maximum
    #[serde(default)]
    pub target_bitrate_bps: Option<u32>,
    /// Maximum bitrate
    pub max_bitrate_bps: u32,
}

/// Negotiated error protection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionSection {
    /// Retransmissions enabled
    pub nack: bool,
    /// Forward error correction enabled
    pub fec: bool,
}

/// Session timing overrides in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Intra-frame request throttle
    pub intra_request_throttle_ms: u64,
    /// Idle time after which padding stops
    pub padding_idle_threshold_ms: u64,
    /// Statistics window
    pub stats_window_ms: u64,
    /// Statistics report interval
    pub stats_report_interval_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            intra_request_throttle_ms: defaults.intra_request_throttle.as_millis() as u64,
            padding_idle_threshold_ms: defaults.padding_idle_threshold.as_millis() as u64,
            stats_window_ms: defaults.stats_window.as_millis() as u64,
            stats_report_interval_ms: defaults.stats_report_interval.as_millis() as u64,
        }
    }
}

/// Complete send-path configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendPathConfig {
    /// CPU cores the encoder may use
    pub number_of_cores: usize,
    /// Codec parameters
    pub codec: CodecSection,
    /// Output streams in layer order
    pub streams: Vec<StreamSection>,
    /// Floor kept up with padding
    pub min_transmit_bitrate_bps: u32,
    /// Error protection
    pub protection: ProtectionSection,
    /// Timing overrides
    pub session: SessionSection,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for SendPathConfig {
    fn default() -> Self {
        Self {
            number_of_cores: 1,
            codec: CodecSection::default(),
            streams: vec![StreamSection {
                id: 1,
                width: None,
                height: None,
                min_bitrate_bps: 30_000,
                target_bitrate_bps: None,
                max_bitrate_bps: 2_000_000,
            }],
            min_transmit_bitrate_bps: 0,
            protection: ProtectionSection::default(),
            session: SessionSection::default(),
            log_format: LogFormat::Plain,
        }
    }
}

impl SendPathConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Serialise to pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the document before conversion
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number_of_cores == 0 {
            return Err(ConfigError::Invalid {
                reason: "number_of_cores must be positive".to_string(),
            });
        }
        if self.streams.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "at least one stream is required".to_string(),
            });
        }
        let ids = self.stream_ids();
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate stream id {}", id),
                });
            }
        }
        self.to_codec()
            .validate()
            .map_err(|e| ConfigError::Invalid {
                reason: e.to_string(),
            })
    }

    /// Stream identifiers in layer order
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.streams.iter().map(|s| StreamId(s.id)).collect()
    }

    /// Codec configuration for `reconfigure`
    ///
    /// One stream maps to a single-layer codec using that stream's bitrate
    /// range; several streams become simulcast layers.
    pub fn to_codec(&self) -> VideoCodec {
        let codec = &self.codec;
        let min_bitrate_bps = self.streams.iter().map(|s| s.min_bitrate_bps).sum();
        let max_bitrate_bps = self.streams.iter().map(|s| s.max_bitrate_bps).sum();

        let mut video_codec = VideoCodec::new(&codec.name, codec.payload_type)
            .resolution(codec.width, codec.height)
            .max_framerate(codec.max_framerate)
            .bitrate_range(min_bitrate_bps, max_bitrate_bps)
            .start_bitrate(codec.start_bitrate_bps);

        if self.streams.len() > 1 {
            for stream in &self.streams {
                let layer = SimulcastStream::new(
                    stream.width.unwrap_or(codec.width),
                    stream.height.unwrap_or(codec.height),
                    stream.min_bitrate_bps,
                    stream.max_bitrate_bps,
                )
                .max_framerate(codec.max_framerate)
                .target_bitrate(stream.target_bitrate_bps.unwrap_or(stream.max_bitrate_bps));
                video_codec = video_codec.simulcast_stream(layer);
            }
        }
        video_codec
    }

    /// Session operating constants
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            intra_request_throttle: Duration::from_millis(self.session.intra_request_throttle_ms),
            padding_idle_threshold: Duration::from_millis(self.session.padding_idle_threshold_ms),
            stats_window: Duration::from_millis(self.session.stats_window_ms),
            stats_report_interval: Duration::from_millis(self.session.stats_report_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMULCAST: &str = r#"{
        "number_of_cores": 4,
        "codec": { "payload_type": 100, "name": "VP8", "width": 1280, "height": 720,
                   "max_framerate": 30, "start_bitrate_bps": 600000 },
        "streams": [
            { "id": 1001, "min_bitrate_bps": 300000, "max_bitrate_bps": 1500000 },
            { "id": 1002, "width": 640, "height": 360,
              "min_bitrate_bps": 100000, "max_bitrate_bps": 500000 }
        ],
        "min_transmit_bitrate_bps": 150000,
        "protection": { "nack": true, "fec": true },
        "session": { "intra_request_throttle_ms": 500 },
        "log_format": "json"
    }"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = SendPathConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream_ids(), vec![StreamId(1)]);
        assert_eq!(config.session_config(), SessionConfig::default());
    }

    #[test]
    fn test_parse_simulcast_document() {
        let config = SendPathConfig::from_json_str(SIMULCAST).unwrap();
        assert_eq!(config.number_of_cores, 4);
        assert_eq!(config.stream_ids(), vec![StreamId(1001), StreamId(1002)]);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.protection.fec);

        let codec = config.to_codec();
        assert_eq!(codec.payload_type, 100);
        assert_eq!(codec.simulcast_streams.len(), 2);
        assert_eq!(codec.simulcast_streams[0].width, 1280);
        assert_eq!(codec.simulcast_streams[1].width, 640);
        assert_eq!(codec.max_bitrate_bps, 2_000_000);

        let session = config.session_config();
        assert_eq!(session.intra_request_throttle, Duration::from_millis(500));
        assert_eq!(session.stats_window, Duration::from_millis(1000));
    }

    #[test]
    fn test_round_trip_preserves_document() {
        let config = SendPathConfig::from_json_str(SIMULCAST).unwrap();
        let again = SendPathConfig::from_json_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            SendPathConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            SendPathConfig::from_json_str(r#"{ "streams": [] }"#),
            Err(ConfigError::Invalid { .. })
        ));
        let duplicate = r#"{ "streams": [
            { "id": 5, "min_bitrate_bps": 1, "max_bitrate_bps": 10 },
            { "id": 5, "min_bitrate_bps": 1, "max_bitrate_bps": 10 }
        ] }"#;
        assert!(matches!(
            SendPathConfig::from_json_str(duplicate),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SendPathConfig::from_file("/nonexistent/vidsend.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
