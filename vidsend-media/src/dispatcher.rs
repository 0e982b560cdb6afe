//! Encode dispatch and the encoded-output channel
//!
//! A dispatch runs in three steps: the session snapshots everything the
//! encoder needs under its lock, releases it, and then the dispatcher locks
//! the encoder alone to apply queued configuration and submit the frame.
//! Output travels back over an unbounded channel drained by [`OutputPump`],
//! so an encoder never re-enters the session.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use vidsend_core::{EncodedImage, FragmentationHeader, RtpVideoHeader, StreamId};

use crate::allocator::BitrateAllocation;
use crate::codecs::{EncodeRequest, EncoderSettings, VideoEncoder};
use crate::error::{EncoderError, EncoderResult};
use crate::frame::VideoFrame;
use crate::gate::SendState;
use crate::session::EncoderSession;

/// Identifies one submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodeHandle {
    /// Monotonic per-session frame id
    pub frame_id: u64,
}

/// Result of offering a frame to the session
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    /// Frame handed to the encoder
    Submitted(EncodeHandle),
    /// Frame dropped by the gate
    Dropped(SendState),
    /// No codec configured or no encoder registered for it
    NoEncoder,
    /// Encoder rejected the frame; the next frame retries
    EncoderFailed(EncoderError),
}

impl EncodeOutcome {
    /// Whether the frame reached the encoder successfully
    pub fn is_submitted(&self) -> bool {
        matches!(self, EncodeOutcome::Submitted(_))
    }
}

/// One encoded image with its routing metadata
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedOutput {
    /// RTP payload type of the producing encoder
    pub payload_type: u8,
    /// Encoded image
    pub image: EncodedImage,
    /// Fragmentation produced by the encoder
    pub fragmentation: Option<FragmentationHeader>,
    /// Codec-specific header
    pub header: RtpVideoHeader,
}

/// Message on the encoder output channel
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderOutput {
    /// Encoded image ready for the transport
    Encoded {
        /// Frame the image belongs to
        frame_id: u64,
        /// Image and metadata
        output: EncodedOutput,
    },
    /// Encoder failed after `encode` returned
    Failed {
        /// Frame that failed
        frame_id: u64,
        /// Stream that failed, if known
        stream_id: Option<StreamId>,
        /// Error reported
        error: EncoderError,
    },
}

/// Handle an encoder uses to deliver output for one frame
///
/// Clones may be kept and used from other threads.
#[derive(Debug, Clone)]
pub struct EncodedOutputSink {
    tx: mpsc::UnboundedSender<EncoderOutput>,
    frame_id: u64,
    payload_type: u8,
}

impl EncodedOutputSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EncoderOutput>, frame_id: u64, payload_type: u8) -> Self {
        Self {
            tx,
            frame_id,
            payload_type,
        }
    }

    /// Frame this sink belongs to
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Deliver one encoded image
    pub fn deliver(
        &self,
        image: EncodedImage,
        fragmentation: Option<FragmentationHeader>,
        header: RtpVideoHeader,
    ) -> EncoderResult<()> {
        self.tx
            .send(EncoderOutput::Encoded {
                frame_id: self.frame_id,
                output: EncodedOutput {
                    payload_type: self.payload_type,
                    image,
                    fragmentation,
                    header,
                },
            })
            .map_err(|_| EncoderError::OutputClosed)
    }

    /// Report an asynchronous failure for this frame
    pub fn fail(&self, stream_id: Option<StreamId>, error: EncoderError) -> EncoderResult<()> {
        self.tx
            .send(EncoderOutput::Failed {
                frame_id: self.frame_id,
                stream_id,
                error,
            })
            .map_err(|_| EncoderError::OutputClosed)
    }
}

/// Observer of every encoded image, called after it was routed
pub trait PostEncodeObserver: Send + Sync + std::fmt::Debug {
    /// Image was handed to the transport
    fn on_encoded_image(&self, image: &EncodedImage);
}

/// Channel conditions last reported by the congestion controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelParameters {
    /// Fraction of packets lost, in 1/256 units
    pub fraction_lost: u8,
    /// Round-trip time in milliseconds
    pub rtt_ms: i64,
}

/// A registered encoder plus the configuration generations applied to it
#[derive(Debug)]
pub struct EncoderSlot {
    encoder: Box<dyn VideoEncoder>,
    applied_codec_seq: u64,
    applied_rates_seq: u64,
    applied_channel_seq: u64,
    reported_name: Option<String>,
}

impl EncoderSlot {
    /// Wrap an encoder that has not been initialised yet
    pub fn new(encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            encoder,
            applied_codec_seq: 0,
            applied_rates_seq: 0,
            applied_channel_seq: 0,
            reported_name: None,
        }
    }

    /// Codec generation the encoder was last initialised with
    pub fn applied_codec_seq(&self) -> u64 {
        self.applied_codec_seq
    }

    fn apply(&mut self, snapshot: &DispatchSnapshot) -> EncoderResult<()> {
        if snapshot.codec_seq > self.applied_codec_seq {
            self.encoder.init_encode(&snapshot.settings)?;
            self.applied_codec_seq = snapshot.codec_seq;
            // fresh encoder state; rates and channel must be pushed again
            self.applied_rates_seq = 0;
            self.applied_channel_seq = 0;
        }

        if let Some((seq, allocation)) = &snapshot.rates {
            if *seq > self.applied_rates_seq {
                match self.encoder.set_rates(allocation) {
                    Ok(()) => self.applied_rates_seq = *seq,
                    Err(e) => warn!(error = %e, "Encoder rejected rate update"),
                }
            }
        }

        let (seq, channel) = snapshot.channel;
        if seq > self.applied_channel_seq {
            match self
                .encoder
                .set_channel_parameters(channel.fraction_lost, channel.rtt_ms)
            {
                Ok(()) => self.applied_channel_seq = seq,
                Err(e) => warn!(error = %e, "Encoder rejected channel parameters"),
            }
        }
        Ok(())
    }

    fn take_name_change(&mut self) -> Option<String> {
        let name = self.encoder.implementation_name();
        if self.reported_name.as_deref() == Some(name) {
            return None;
        }
        let name = name.to_string();
        self.reported_name = Some(name.clone());
        Some(name)
    }
}

/// Everything captured under the session lock for one encode
#[derive(Debug, Clone)]
pub struct DispatchSnapshot {
    /// Frame id assigned by the session
    pub frame_id: u64,
    /// Payload type of the active codec
    pub payload_type: u8,
    /// Encoder to use
    pub slot: Arc<Mutex<EncoderSlot>>,
    /// Active settings
    pub settings: Arc<EncoderSettings>,
    /// Generation of `settings`
    pub codec_seq: u64,
    /// Latest allocation and its generation
    pub rates: Option<(u64, BitrateAllocation)>,
    /// Latest channel parameters and their generation
    pub channel: (u64, ChannelParameters),
    /// Frame types and hints for this frame
    pub request: EncodeRequest,
}

/// Outcome of a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// New implementation name to report, if it changed
    pub implementation_name: Option<String>,
}

/// Apply queued configuration and submit the frame
///
/// Must be called without holding the session lock.
pub fn dispatch(
    snapshot: &DispatchSnapshot,
    frame: &VideoFrame,
    tx: &mpsc::UnboundedSender<EncoderOutput>,
) -> EncoderResult<Dispatched> {
    let mut slot = snapshot.slot.lock();
    slot.apply(snapshot)?;

    let sink = EncodedOutputSink::new(tx.clone(), snapshot.frame_id, snapshot.payload_type);
    slot.encoder.encode(frame, &snapshot.request, &sink)?;
    debug!(
        frame_id = snapshot.frame_id,
        key_frame = snapshot.request.has_key_frame(),
        "Frame submitted to encoder"
    );

    Ok(Dispatched {
        implementation_name: slot.take_name_change(),
    })
}

/// Drains the encoder output channel into the session
#[derive(Debug)]
pub struct OutputPump {
    rx: mpsc::UnboundedReceiver<EncoderOutput>,
}

impl OutputPump {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<EncoderOutput>) -> Self {
        Self { rx }
    }

    /// Process every output already queued; returns how many were handled
    pub fn pump_pending(&mut self, session: &EncoderSession) -> usize {
        let mut handled = 0;
        while let Ok(output) = self.rx.try_recv() {
            session.handle_output(output);
            handled += 1;
        }
        handled
    }

    /// Process output until the session and every sink clone are gone
    pub async fn run(mut self, session: Weak<EncoderSession>) {
        while let Some(output) = self.rx.recv().await {
            match session.upgrade() {
                Some(session) => session.handle_output(output),
                None => break,
            }
        }
        debug!("Encoder output pump stopped");
    }
}
