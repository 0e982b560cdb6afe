//! Codec configuration and the opaque encoder contract
//!
//! The send path never compresses anything itself. It configures an
//! externally registered [`VideoEncoder`], feeds it admitted frames together
//! with the per-stream frame types to produce, and receives the output over an
//! [`EncodedOutputSink`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use vidsend_core::{FrameType, SendPathError, SendPathResult, StreamId, StreamTable, VideoCodecType};

use crate::allocator::{BitrateAllocation, LayerLimits};
use crate::dispatcher::{EncodedOutputSink, EncoderSlot};
use crate::error::EncoderResult;
use crate::frame::VideoFrame;

/// Per-packet overhead of RED + ULPFEC headers when FEC is enabled
pub const FEC_PAYLOAD_OVERHEAD: usize = 17;

/// One simulcast layer of a codec configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulcastStream {
    /// Layer width in pixels
    pub width: u32,
    /// Layer height in pixels
    pub height: u32,
    /// Maximum frame rate for this layer
    pub max_framerate: u32,
    /// Minimum bitrate the layer needs to be sent
    pub min_bitrate_bps: u32,
    /// Preferred bitrate
    pub target_bitrate_bps: u32,
    /// Bitrate above which the layer gains nothing
    pub max_bitrate_bps: u32,
}

impl SimulcastStream {
    /// Create a layer with the given resolution and bitrate range
    pub fn new(width: u32, height: u32, min_bitrate_bps: u32, max_bitrate_bps: u32) -> Self {
        Self {
            width,
            height,
            max_framerate: 30,
            min_bitrate_bps,
            target_bitrate_bps: max_bitrate_bps,
            max_bitrate_bps,
        }
    }

    /// Set the target bitrate
    pub fn target_bitrate(mut self, target_bitrate_bps: u32) -> Self {
        self.target_bitrate_bps = target_bitrate_bps;
        self
    }

    /// Set the maximum frame rate
    pub fn max_framerate(mut self, max_framerate: u32) -> Self {
        self.max_framerate = max_framerate;
        self
    }
}

/// Full codec configuration applied by `reconfigure`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCodec {
    /// RTP payload type; selects the registered encoder
    pub payload_type: u8,
    /// Codec name, e.g. "VP8"
    pub name: String,
    /// Codec family
    pub codec_type: VideoCodecType,
    /// Full resolution width
    pub width: u32,
    /// Full resolution height
    pub height: u32,
    /// Upper bound for the frame rate handed to the encoder
    pub max_framerate: u32,
    /// Bitrate used before the first congestion-controller estimate
    pub start_bitrate_bps: u32,
    /// Aggregate minimum bitrate (single-layer limits)
    pub min_bitrate_bps: u32,
    /// Aggregate maximum bitrate (single-layer limits)
    pub max_bitrate_bps: u32,
    /// Simulcast layers in stream declaration order; empty for a single layer
    pub simulcast_streams: Vec<SimulcastStream>,
}

impl VideoCodec {
    /// Create a single-layer 640x480@30 configuration
    pub fn new(name: &str, payload_type: u8) -> Self {
        Self {
            payload_type,
            name: name.to_string(),
            codec_type: VideoCodecType::from_name(name),
            width: 640,
            height: 480,
            max_framerate: 30,
            start_bitrate_bps: 300_000,
            min_bitrate_bps: 30_000,
            max_bitrate_bps: 2_000_000,
            simulcast_streams: Vec::new(),
        }
    }

    /// Set resolution
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set maximum frame rate
    pub fn max_framerate(mut self, max_framerate: u32) -> Self {
        self.max_framerate = max_framerate;
        self
    }

    /// Set start bitrate
    pub fn start_bitrate(mut self, start_bitrate_bps: u32) -> Self {
        self.start_bitrate_bps = start_bitrate_bps;
        self
    }

    /// Set aggregate bitrate range
    pub fn bitrate_range(mut self, min_bitrate_bps: u32, max_bitrate_bps: u32) -> Self {
        self.min_bitrate_bps = min_bitrate_bps;
        self.max_bitrate_bps = max_bitrate_bps;
        self
    }

    /// Append a simulcast layer
    pub fn simulcast_stream(mut self, stream: SimulcastStream) -> Self {
        self.simulcast_streams.push(stream);
        self
    }

    /// Number of encoded layers this configuration produces
    pub fn number_of_streams(&self) -> usize {
        self.simulcast_streams.len().max(1)
    }

    /// Check the configuration for internal consistency
    pub fn validate(&self) -> SendPathResult<()> {
        let invalid = |reason: String| Err(SendPathError::InvalidCodecConfig { reason });

        if self.name.is_empty() {
            return invalid("codec name is empty".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return invalid(format!("invalid resolution {}x{}", self.width, self.height));
        }
        if self.max_framerate == 0 {
            return invalid("max framerate must be positive".to_string());
        }
        if self.max_bitrate_bps == 0 || self.min_bitrate_bps > self.max_bitrate_bps {
            return invalid(format!(
                "invalid bitrate range {}..{} bps",
                self.min_bitrate_bps, self.max_bitrate_bps
            ));
        }
        if self.start_bitrate_bps < self.min_bitrate_bps
            || self.start_bitrate_bps > self.max_bitrate_bps
        {
            return invalid(format!(
                "start bitrate {} bps outside {}..{} bps",
                self.start_bitrate_bps, self.min_bitrate_bps, self.max_bitrate_bps
            ));
        }

        for (idx, layer) in self.simulcast_streams.iter().enumerate() {
            if layer.width == 0 || layer.height == 0 {
                return invalid(format!("simulcast layer {} has no resolution", idx));
            }
            if layer.max_bitrate_bps == 0
                || layer.min_bitrate_bps > layer.target_bitrate_bps
                || layer.target_bitrate_bps > layer.max_bitrate_bps
            {
                return invalid(format!(
                    "simulcast layer {} bitrates must satisfy min <= target <= max",
                    idx
                ));
            }
        }

        Ok(())
    }

    /// Bitrate limits per stream, in stream declaration order
    pub fn layer_limits(&self) -> Vec<LayerLimits> {
        if self.simulcast_streams.is_empty() {
            return vec![LayerLimits::new(self.min_bitrate_bps, self.max_bitrate_bps)];
        }
        self.simulcast_streams
            .iter()
            .map(|layer| LayerLimits::new(layer.min_bitrate_bps, layer.max_bitrate_bps))
            .collect()
    }
}

/// Error-protection scheme negotiated for the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProtectionMethod {
    /// No protection
    #[default]
    None,
    /// Retransmission only
    Nack,
    /// Forward error correction only
    Fec,
    /// Both retransmission and FEC
    NackFec,
}

impl ProtectionMethod {
    /// Build from the two negotiation flags
    pub fn from_flags(nack: bool, fec: bool) -> Self {
        match (nack, fec) {
            (false, false) => ProtectionMethod::None,
            (true, false) => ProtectionMethod::Nack,
            (false, true) => ProtectionMethod::Fec,
            (true, true) => ProtectionMethod::NackFec,
        }
    }

    /// Bytes per packet the protection scheme takes from the payload budget
    pub fn payload_overhead(&self) -> usize {
        match self {
            ProtectionMethod::Fec | ProtectionMethod::NackFec => FEC_PAYLOAD_OVERHEAD,
            ProtectionMethod::None | ProtectionMethod::Nack => 0,
        }
    }
}

/// Everything an encoder needs to (re)initialise
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    /// Codec configuration
    pub codec: VideoCodec,
    /// CPU cores the encoder may use
    pub number_of_cores: usize,
    /// Largest payload per packet the encoder should target
    pub max_payload_size: usize,
    /// Active protection scheme
    pub protection: ProtectionMethod,
    /// Encoder captures frames itself instead of receiving them
    pub internal_source: bool,
}

/// Reference-selection hints gathered from SLI and RPSI feedback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceHints {
    /// Picture id reported lost by the last slice-loss indication
    pub sli_picture_id: Option<u8>,
    /// Picture id confirmed by the last reference picture selection indication
    pub rpsi_picture_id: Option<u64>,
}

impl ReferenceHints {
    /// Whether any hint is present
    pub fn is_empty(&self) -> bool {
        self.sli_picture_id.is_none() && self.rpsi_picture_id.is_none()
    }
}

/// Per-frame instructions handed to the encoder
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    /// Frame type to produce for each stream
    pub frame_types: StreamTable<FrameType>,
    /// Reference-selection hints
    pub hints: ReferenceHints,
}

impl EncodeRequest {
    /// Whether any stream must produce a key frame
    pub fn has_key_frame(&self) -> bool {
        self.frame_types.iter().any(|(_, frame_type)| frame_type.is_key())
    }

    /// Frame type requested for one stream
    pub fn frame_type(&self, stream_id: StreamId) -> SendPathResult<FrameType> {
        self.frame_types.get(stream_id).copied()
    }
}

/// Opaque encoder driven by the send path
///
/// Calls are serialised by the session; an encoder is never entered
/// concurrently. Output may be delivered synchronously from `encode` or later
/// from another thread through a clone of the sink.
pub trait VideoEncoder: Send + std::fmt::Debug {
    /// Name reported to statistics, e.g. "libvpx" or a hardware encoder name
    fn implementation_name(&self) -> &str;

    /// (Re)initialise with new settings
    fn init_encode(&mut self, settings: &EncoderSettings) -> EncoderResult<()>;

    /// Apply a new per-stream rate allocation
    fn set_rates(&mut self, allocation: &BitrateAllocation) -> EncoderResult<()>;

    /// Apply channel conditions reported by the congestion controller
    fn set_channel_parameters(&mut self, fraction_lost: u8, rtt_ms: i64) -> EncoderResult<()> {
        let _ = (fraction_lost, rtt_ms);
        Ok(())
    }

    /// Encode one frame
    fn encode(
        &mut self,
        frame: &VideoFrame,
        request: &EncodeRequest,
        output: &EncodedOutputSink,
    ) -> EncoderResult<()>;
}

/// Encoder registered for one payload type
#[derive(Debug, Clone)]
pub struct RegisteredEncoder {
    /// Encoder behind its own lock
    pub slot: Arc<Mutex<EncoderSlot>>,
    /// Encoder captures frames itself
    pub internal_source: bool,
}

/// External encoders keyed by RTP payload type
#[derive(Debug, Default)]
pub struct EncoderRegistry {
    encoders: HashMap<u8, RegisteredEncoder>,
}

impl EncoderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an encoder for a payload type
    pub fn register(
        &mut self,
        payload_type: u8,
        encoder: Box<dyn VideoEncoder>,
        internal_source: bool,
    ) -> SendPathResult<()> {
        if self.encoders.contains_key(&payload_type) {
            return Err(SendPathError::PayloadTypeAlreadyRegistered { payload_type });
        }
        self.encoders.insert(
            payload_type,
            RegisteredEncoder {
                slot: Arc::new(Mutex::new(EncoderSlot::new(encoder))),
                internal_source,
            },
        );
        Ok(())
    }

    /// Remove the encoder for a payload type
    pub fn deregister(&mut self, payload_type: u8) -> SendPathResult<RegisteredEncoder> {
        self.encoders
            .remove(&payload_type)
            .ok_or(SendPathError::UnsupportedPayloadType { payload_type })
    }

    /// Encoder for a payload type
    pub fn get(&self, payload_type: u8) -> Option<&RegisteredEncoder> {
        self.encoders.get(&payload_type)
    }

    /// Registered payload types, ascending
    pub fn payload_types(&self) -> Vec<u8> {
        let mut types: Vec<u8> = self.encoders.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Number of registered encoders
    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    /// Whether no encoder is registered
    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoopEncoder;

    impl VideoEncoder for NoopEncoder {
        fn implementation_name(&self) -> &str {
            "noop"
        }

        fn init_encode(&mut self, _settings: &EncoderSettings) -> EncoderResult<()> {
            Ok(())
        }

        fn set_rates(&mut self, _allocation: &BitrateAllocation) -> EncoderResult<()> {
            Ok(())
        }

        fn encode(
            &mut self,
            _frame: &VideoFrame,
            _request: &EncodeRequest,
            _output: &EncodedOutputSink,
        ) -> EncoderResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_codec_builder_and_validation() {
        let codec = VideoCodec::new("VP8", 96)
            .resolution(1280, 720)
            .bitrate_range(100_000, 1_500_000)
            .start_bitrate(500_000);

        assert_eq!(codec.codec_type, VideoCodecType::Vp8);
        assert_eq!(codec.number_of_streams(), 1);
        assert!(codec.validate().is_ok());
        assert_eq!(
            codec.layer_limits(),
            vec![LayerLimits::new(100_000, 1_500_000)]
        );
    }

    #[test]
    fn test_codec_validation_failures() {
        let no_resolution = VideoCodec::new("VP8", 96).resolution(0, 480);
        assert!(matches!(
            no_resolution.validate(),
            Err(SendPathError::InvalidCodecConfig { .. })
        ));

        let inverted = VideoCodec::new("VP8", 96).bitrate_range(500_000, 100_000);
        assert!(inverted.validate().is_err());

        let bad_start = VideoCodec::new("VP8", 96).start_bitrate(10_000_000);
        assert!(bad_start.validate().is_err());

        let bad_layer = VideoCodec::new("VP8", 96)
            .simulcast_stream(SimulcastStream::new(320, 180, 300_000, 100_000));
        assert!(bad_layer.validate().is_err());
    }

    #[test]
    fn test_simulcast_layer_limits_follow_declaration_order() {
        let codec = VideoCodec::new("VP8", 96)
            .simulcast_stream(SimulcastStream::new(640, 360, 100_000, 500_000))
            .simulcast_stream(SimulcastStream::new(320, 180, 50_000, 300_000));

        assert_eq!(codec.number_of_streams(), 2);
        assert_eq!(
            codec.layer_limits(),
            vec![
                LayerLimits::new(100_000, 500_000),
                LayerLimits::new(50_000, 300_000)
            ]
        );
    }

    #[test]
    fn test_protection_overhead() {
        assert_eq!(ProtectionMethod::from_flags(false, false), ProtectionMethod::None);
        assert_eq!(ProtectionMethod::from_flags(true, true), ProtectionMethod::NackFec);
        assert_eq!(ProtectionMethod::Nack.payload_overhead(), 0);
        assert_eq!(ProtectionMethod::Fec.payload_overhead(), FEC_PAYLOAD_OVERHEAD);
    }

    #[test]
    fn test_encoder_registry() {
        let mut registry = EncoderRegistry::new();
        registry.register(100, Box::new(NoopEncoder), false).unwrap();
        registry.register(96, Box::new(NoopEncoder), true).unwrap();

        assert_eq!(registry.payload_types(), vec![96, 100]);
        assert!(registry.get(96).unwrap().internal_source);

        assert_eq!(
            registry.register(96, Box::new(NoopEncoder), false).unwrap_err(),
            SendPathError::PayloadTypeAlreadyRegistered { payload_type: 96 }
        );

        registry.deregister(96).unwrap();
        assert_eq!(
            registry.deregister(96).unwrap_err(),
            SendPathError::UnsupportedPayloadType { payload_type: 96 }
        );
        assert_eq!(registry.len(), 1);
    }
}
