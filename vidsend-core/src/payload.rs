//! Encoded payloads and the transport-facing router interface
//!
//! The send path never inspects the bitstream. It hands each encoded image,
//! together with the fragmentation and header metadata the encoder produced,
//! to a [`PayloadRouter`] exactly once.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::SendPathResult;
use crate::stream::StreamId;

/// Default maximum RTP payload size when the transport does not say otherwise
pub const DEFAULT_MAX_PAYLOAD_LENGTH: usize = 1200;

/// Frame type requested from or produced by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    /// Self-contained frame (instantaneous decoder refresh)
    Key,
    /// Frame predicted from earlier frames
    Delta,
}

impl FrameType {
    /// Whether this is a key frame
    pub fn is_key(&self) -> bool {
        matches!(self, FrameType::Key)
    }
}

/// Codec family of the encoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodecType {
    /// VP8
    Vp8,
    /// VP9
    Vp9,
    /// H.264
    H264,
    /// Anything else; payload is forwarded untouched
    Generic,
}

impl VideoCodecType {
    /// Parse a codec name such as "VP8" or "h264"
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "vp8" => VideoCodecType::Vp8,
            "vp9" => VideoCodecType::Vp9,
            "h264" | "h.264" => VideoCodecType::H264,
            _ => VideoCodecType::Generic,
        }
    }
}

/// One encoded frame for one stream
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    /// Stream (simulcast layer) this image belongs to
    pub stream_id: StreamId,
    /// Encoded bitstream
    pub payload: Bytes,
    /// Key or delta frame
    pub frame_type: FrameType,
    /// Encoded width in pixels
    pub width: u32,
    /// Encoded height in pixels
    pub height: u32,
    /// RTP timestamp (90 kHz) of the source frame
    pub rtp_timestamp: u32,
    /// Capture time of the source frame in milliseconds
    pub capture_time_ms: i64,
}

impl EncodedImage {
    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Byte ranges of independently packetizable fragments (e.g. NAL units)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentationHeader {
    /// Fragments in bitstream order
    pub fragments: Vec<Range<usize>>,
}

impl FragmentationHeader {
    /// Header with a single fragment spanning `len` bytes
    pub fn single(len: usize) -> Self {
        Self {
            fragments: vec![0..len],
        }
    }

    /// Number of fragments
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether there are no fragments
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Codec-specific RTP header information produced alongside an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpVideoHeader {
    /// Codec family
    pub codec: VideoCodecType,
    /// Simulcast layer index
    pub simulcast_idx: u8,
    /// Picture id, for codecs that carry one
    pub picture_id: Option<u16>,
    /// Temporal layer index, for codecs that carry one
    pub temporal_idx: Option<u8>,
}

/// Transport interface receiving encoded images
///
/// Implementations packetize and queue the image; they must not call back
/// into the session that delivered it.
pub trait PayloadRouter: Send + Sync + std::fmt::Debug {
    /// Route one encoded image for transmission
    fn route_encoded_image(
        &self,
        payload_type: u8,
        image: &EncodedImage,
        fragmentation: Option<&FragmentationHeader>,
        header: &RtpVideoHeader,
    ) -> SendPathResult<()>;

    /// Largest payload the transport accepts per packet
    fn max_payload_length(&self) -> usize {
        DEFAULT_MAX_PAYLOAD_LENGTH
    }
}
