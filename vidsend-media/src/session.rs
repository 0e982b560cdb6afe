//! Encoder session
//!
//! [`EncoderSession`] owns all send-path state for one capture source behind a
//! single lock. Capture, congestion-control and RTCP threads call into it
//! concurrently. No collaborator (encoder, router, stats sink, observer) is
//! ever called while the lock is held: each operation snapshots what it needs,
//! releases the lock, acts, and re-locks if it has to record a result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vidsend_core::{
    Clock, FrameType, PayloadRouter, SendPathError, SendPathResult, StreamId, StreamTable,
    SystemClock,
};

use crate::allocator::{BitrateAllocation, BitrateAllocator, SuspendTransition};
use crate::codecs::{
    EncodeRequest, EncoderRegistry, EncoderSettings, ProtectionMethod, ReferenceHints, VideoCodec,
    VideoEncoder,
};
use crate::dispatcher::{
    dispatch, ChannelParameters, DispatchSnapshot, EncodeHandle, EncodeOutcome, EncoderOutput,
    OutputPump, PostEncodeObserver,
};
use crate::feedback::{FeedbackEffect, FeedbackRouter, FeedbackSignal};
use crate::frame::VideoFrame;
use crate::gate::{Admission, FrameGate, SendState};
use crate::registry::StreamRegistry;
use crate::statistics::{
    padding_needed_bps, DropReason, NullStatsSink, SendStatistics, StatisticsTracker, StatsSink,
};

/// Frame rate assumed before a codec is configured
const DEFAULT_FRAMERATE: u32 = 30;

/// Submitted frames remembered for asynchronous failure recovery
const MAX_IN_FLIGHT_FRAMES: usize = 64;

/// Operating constants of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Minimum spacing between accepted intra-frame requests per stream
    pub intra_request_throttle: Duration,
    /// Frame inactivity after which no padding is requested
    pub padding_idle_threshold: Duration,
    /// Window of the encoded bitrate/framerate statistics
    pub stats_window: Duration,
    /// Minimum spacing of statistics reports
    pub stats_report_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            intra_request_throttle: Duration::from_millis(300),
            padding_idle_threshold: Duration::from_millis(2000),
            stats_window: Duration::from_millis(1000),
            stats_report_interval: Duration::from_millis(1000),
        }
    }
}

impl SessionConfig {
    /// Faster reaction for interactive, low-latency calls
    pub fn low_latency() -> Self {
        Self {
            intra_request_throttle: Duration::from_millis(100),
            padding_idle_threshold: Duration::from_millis(1000),
            stats_window: Duration::from_millis(500),
            stats_report_interval: Duration::from_millis(500),
        }
    }
}

/// External collaborators a session talks to
#[derive(Debug, Clone)]
pub struct SessionCollaborators {
    /// Transport receiving encoded images
    pub payload_router: Arc<dyn PayloadRouter>,
    /// Statistics receiver
    pub stats_sink: Arc<dyn StatsSink>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl SessionCollaborators {
    /// Router with a no-op stats sink and the system clock
    pub fn new(payload_router: Arc<dyn PayloadRouter>) -> Self {
        Self {
            payload_router,
            stats_sink: Arc::new(NullStatsSink),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Use a statistics sink
    pub fn with_stats_sink(mut self, stats_sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = stats_sink;
        self
    }

    /// Use a clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug)]
struct SessionState {
    gate: FrameGate,
    streams: StreamRegistry,
    encoders: EncoderRegistry,
    stats: StatisticsTracker,
    observer: Option<Arc<dyn PostEncodeObserver>>,

    settings: Option<Arc<EncoderSettings>>,
    codec_seq: u64,
    allocator: Option<BitrateAllocator>,
    allocation: Option<BitrateAllocation>,
    rates_seq: u64,
    channel: ChannelParameters,
    channel_seq: u64,
    protection: ProtectionMethod,

    min_transmit_bitrate_bps: u32,
    last_observed_bitrate_bps: u32,
    last_framerate: u32,
    rates_received: bool,
    next_frame_id: u64,
    in_flight: BTreeMap<u64, InFlightFrame>,
}

/// What a submitted frame consumed, restored if the encoder later fails it
#[derive(Debug)]
struct InFlightFrame {
    frame_types: StreamTable<FrameType>,
    hints: ReferenceHints,
    stamped_ms: i64,
    previous_activity_ms: Option<i64>,
    delivered: bool,
}

impl SessionState {
    fn track_in_flight(&mut self, frame_id: u64, frame: InFlightFrame) {
        self.in_flight.insert(frame_id, frame);
        while self.in_flight.len() > MAX_IN_FLIGHT_FRAMES {
            self.in_flight.pop_first();
        }
    }

    /// Output for `frame_id` arrived: older frames are finished
    fn settle_in_flight(&mut self, frame_id: u64) {
        self.in_flight = self.in_flight.split_off(&frame_id);
    }

    fn update_suspension(&mut self, now_zero: bool) -> SuspendTransition {
        let transition = SuspendTransition::between(self.gate.is_suspended(), now_zero);
        match transition {
            SuspendTransition::Suspended => {
                self.gate.set_suspended(true);
            }
            SuspendTransition::Resumed => {
                self.gate.set_suspended(false);
                self.streams.request_key_frames();
            }
            SuspendTransition::Unchanged => {}
        }
        transition
    }
}

struct RateUpdate {
    target_bitrate_bps: u32,
    framerate: u32,
    transition: SuspendTransition,
}

/// Send-path controller for one capture source
#[derive(Debug)]
pub struct EncoderSession {
    id: Uuid,
    number_of_cores: usize,
    stream_ids: Vec<StreamId>,
    config: SessionConfig,
    router: Arc<dyn PayloadRouter>,
    stats_sink: Arc<dyn StatsSink>,
    clock: Arc<dyn Clock>,
    output_tx: mpsc::UnboundedSender<EncoderOutput>,
    state: Mutex<SessionState>,
}

impl EncoderSession {
    /// Create a session for `stream_ids`
    ///
    /// Returns the session and the pump that must drain encoder output into
    /// it, either by spawning [`OutputPump::run`] or calling
    /// [`OutputPump::pump_pending`].
    pub fn new(
        number_of_cores: usize,
        stream_ids: &[StreamId],
        config: SessionConfig,
        collaborators: SessionCollaborators,
    ) -> SendPathResult<(Self, OutputPump)> {
        Self::with_id(Uuid::new_v4(), number_of_cores, stream_ids, config, collaborators)
    }

    /// Create a session with a caller-chosen id
    pub fn with_id(
        id: Uuid,
        number_of_cores: usize,
        stream_ids: &[StreamId],
        config: SessionConfig,
        collaborators: SessionCollaborators,
    ) -> SendPathResult<(Self, OutputPump)> {
        if number_of_cores == 0 {
            return Err(SendPathError::Initialization {
                reason: "number of cores must be positive".to_string(),
            });
        }

        let streams = StreamRegistry::new(
            stream_ids,
            config.intra_request_throttle.as_millis() as i64,
        )?;
        let stats = StatisticsTracker::new(
            config.stats_window.as_millis() as i64,
            config.stats_report_interval.as_millis() as i64,
        );
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let session = Self {
            id,
            number_of_cores,
            stream_ids: stream_ids.to_vec(),
            config,
            router: collaborators.payload_router,
            stats_sink: collaborators.stats_sink,
            clock: collaborators.clock,
            output_tx,
            state: Mutex::new(SessionState {
                gate: FrameGate::new(),
                streams,
                encoders: EncoderRegistry::new(),
                stats,
                observer: None,
                settings: None,
                codec_seq: 0,
                allocator: None,
                allocation: None,
                rates_seq: 0,
                channel: ChannelParameters::default(),
                channel_seq: 0,
                protection: ProtectionMethod::None,
                min_transmit_bitrate_bps: 0,
                last_observed_bitrate_bps: 0,
                last_framerate: DEFAULT_FRAMERATE,
                rates_received: false,
                next_frame_id: 0,
                in_flight: BTreeMap::new(),
            }),
        };

        info!(
            session = %session.id,
            streams = session.stream_ids.len(),
            cores = number_of_cores,
            "Encoder session created"
        );
        Ok((session, OutputPump::new(output_rx)))
    }

    /// Session id used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stream ids in declaration order
    pub fn stream_ids(&self) -> &[StreamId] {
        &self.stream_ids
    }

    /// Operating constants
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Encoder registration and configuration
    // ------------------------------------------------------------------

    /// Register an external encoder for `payload_type`
    pub fn register_external_encoder(
        &self,
        encoder: Box<dyn VideoEncoder>,
        payload_type: u8,
        internal_source: bool,
    ) -> SendPathResult<()> {
        let name = encoder.implementation_name().to_string();
        self.state
            .lock()
            .encoders
            .register(payload_type, encoder, internal_source)?;
        info!(session = %self.id, payload_type, encoder = %name, "External encoder registered");
        Ok(())
    }

    /// Remove the encoder for `payload_type`
    ///
    /// Fails if the active codec uses it.
    pub fn deregister_external_encoder(&self, payload_type: u8) -> SendPathResult<()> {
        let mut state = self.state.lock();
        let in_use = state
            .settings
            .as_ref()
            .map_or(false, |settings| settings.codec.payload_type == payload_type);
        if in_use {
            return Err(SendPathError::PayloadTypeInUse { payload_type });
        }
        let removed = state.encoders.deregister(payload_type)?;
        drop(state);
        drop(removed);

        info!(session = %self.id, payload_type, "External encoder deregistered");
        Ok(())
    }

    /// Observe every encoded image after it was routed
    pub fn register_post_encode_image_callback(&self, observer: Arc<dyn PostEncodeObserver>) {
        self.state.lock().observer = Some(observer);
    }

    /// Set the protection method used by the next `reconfigure`
    pub fn set_protection_method(&self, nack: bool, fec: bool) {
        let protection = ProtectionMethod::from_flags(nack, fec);
        self.state.lock().protection = protection;
        debug!(session = %self.id, ?protection, "Protection method set");
    }

    /// Replace the codec configuration
    ///
    /// The encoder is (re)initialised before the next frame it encodes. An
    /// all-zero starting allocation suspends the video. On error nothing
    /// changes.
    pub fn reconfigure(&self, codec: VideoCodec, min_transmit_bitrate_bps: u32) -> SendPathResult<()> {
        codec.validate()?;
        if codec.number_of_streams() != self.stream_ids.len() {
            return Err(SendPathError::StreamCountMismatch {
                expected: self.stream_ids.len(),
                actual: codec.number_of_streams(),
            });
        }
        let allocator = BitrateAllocator::new(&codec, &self.stream_ids)?;
        let router_payload_length = self.router.max_payload_length();

        let mut state = self.state.lock();
        let internal_source = state
            .encoders
            .get(codec.payload_type)
            .map(|registered| registered.internal_source)
            .ok_or(SendPathError::UnsupportedPayloadType {
                payload_type: codec.payload_type,
            })?;

        let protection = state.protection;
        let max_payload_size = router_payload_length.saturating_sub(protection.payload_overhead());
        let (bitrate_bps, framerate) = if state.rates_received {
            (state.last_observed_bitrate_bps, state.last_framerate)
        } else {
            (codec.start_bitrate_bps, codec.max_framerate)
        };

        info!(
            session = %self.id,
            codec = %codec.name,
            payload_type = codec.payload_type,
            width = codec.width,
            height = codec.height,
            max_payload_size,
            "Codec reconfigured"
        );

        let allocation = allocator.allocate(bitrate_bps, framerate);
        let transition = state.update_suspension(allocation.is_zero());
        state.allocation = Some(allocation);
        state.rates_seq += 1;
        state.allocator = Some(allocator);
        state.settings = Some(Arc::new(EncoderSettings {
            codec,
            number_of_cores: self.number_of_cores,
            max_payload_size,
            protection,
            internal_source,
        }));
        state.codec_seq += 1;
        state.min_transmit_bitrate_bps = min_transmit_bitrate_bps;
        drop(state);

        self.report_suspend_transition(transition);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Frame path
    // ------------------------------------------------------------------

    /// Run the gate for a frame without encoding it
    pub fn admit(&self) -> Admission {
        let now = self.clock.now_ms();
        self.state.lock().gate.admit(now)
    }

    /// Offer one captured frame
    pub fn encode(&self, frame: &VideoFrame) -> EncodeOutcome {
        let now = self.clock.now_ms();

        // Snapshot under the lock
        let snapshot = {
            let mut state = self.state.lock();
            let previous_activity_ms = match state.gate.admit(now) {
                Admission::Encode {
                    previous_activity_ms,
                } => previous_activity_ms,
                Admission::Drop(reason) => {
                    state.stats.on_dropped();
                    drop(state);
                    self.stats_sink.on_frame_dropped(DropReason::Gate(reason));
                    return EncodeOutcome::Dropped(reason);
                }
            };

            let Some(snapshot) = Self::snapshot(&mut state) else {
                state.gate.rollback_activity(now, previous_activity_ms);
                state.stats.on_dropped();
                drop(state);
                debug!(session = %self.id, "No encoder for frame");
                self.stats_sink.on_frame_dropped(DropReason::NoEncoder);
                return EncodeOutcome::NoEncoder;
            };
            state.track_in_flight(
                snapshot.frame_id,
                InFlightFrame {
                    frame_types: snapshot.request.frame_types.clone(),
                    hints: snapshot.request.hints,
                    stamped_ms: now,
                    previous_activity_ms,
                    delivered: false,
                },
            );
            (snapshot, previous_activity_ms)
        };
        let (snapshot, previous_activity_ms) = snapshot;

        // Encode without the session lock
        match dispatch(&snapshot, frame, &self.output_tx) {
            Ok(dispatched) => {
                if let Some(name) = dispatched.implementation_name {
                    info!(session = %self.id, encoder = %name, "Encoder implementation changed");
                    self.stats_sink.on_encoder_implementation_name(&name);
                }
                EncodeOutcome::Submitted(EncodeHandle {
                    frame_id: snapshot.frame_id,
                })
            }
            Err(error) => {
                // Re-lock to undo what the snapshot consumed
                {
                    let mut state = self.state.lock();
                    state.in_flight.remove(&snapshot.frame_id);
                    state.streams.restore_key_frames(&snapshot.request.frame_types);
                    state.streams.restore_reference_hints(snapshot.request.hints);
                    state.gate.rollback_activity(now, previous_activity_ms);
                    state.stats.on_dropped();
                }
                warn!(
                    session = %self.id,
                    frame_id = snapshot.frame_id,
                    error = %error,
                    "Encode failed, frame dropped"
                );
                self.stats_sink.on_frame_dropped(DropReason::EncoderFailure);
                EncodeOutcome::EncoderFailed(error)
            }
        }
    }

    fn snapshot(state: &mut SessionState) -> Option<DispatchSnapshot> {
        let settings = state.settings.clone()?;
        let payload_type = settings.codec.payload_type;
        let slot = state.encoders.get(payload_type)?.slot.clone();

        let frame_id = state.next_frame_id;
        state.next_frame_id += 1;

        Some(DispatchSnapshot {
            frame_id,
            payload_type,
            slot,
            settings,
            codec_seq: state.codec_seq,
            rates: state
                .allocation
                .clone()
                .map(|allocation| (state.rates_seq, allocation)),
            channel: (state.channel_seq, state.channel),
            request: EncodeRequest {
                frame_types: state.streams.take_frame_types(),
                hints: state.streams.take_reference_hints(),
            },
        })
    }

    /// Handle one message from the encoder output channel
    pub(crate) fn handle_output(&self, output: EncoderOutput) {
        let now = self.clock.now_ms();
        match output {
            // Images of an encode already running when the video was
            // suspended are still routed; suspension only stops admission
            EncoderOutput::Encoded { frame_id, output } => {
                let (report, observer) = {
                    let mut state = self.state.lock();
                    state.settle_in_flight(frame_id);
                    if let Some(frame) = state.in_flight.get_mut(&frame_id) {
                        frame.delivered = true;
                        if let Ok(frame_type) = frame.frame_types.get_mut(output.image.stream_id) {
                            *frame_type = FrameType::Delta;
                        }
                    }
                    state.gate.record_activity(now);
                    let report = state.stats.on_encoded(&output.image, now);
                    (report, state.observer.clone())
                };

                if let Err(e) = self.router.route_encoded_image(
                    output.payload_type,
                    &output.image,
                    output.fragmentation.as_ref(),
                    &output.header,
                ) {
                    warn!(session = %self.id, frame_id, error = %e, "Transport rejected encoded image");
                }
                self.stats_sink.on_encoded_image(&output.image);
                if let Some(observer) = observer {
                    observer.on_encoded_image(&output.image);
                }
                if let Some(report) = report {
                    self.stats_sink.on_send_statistics(report);
                }
            }
            EncoderOutput::Failed {
                frame_id,
                stream_id,
                error,
            } => {
                {
                    let mut state = self.state.lock();
                    state.settle_in_flight(frame_id);
                    if let Some(mut frame) = state.in_flight.remove(&frame_id) {
                        if let Some(failed) = stream_id {
                            for (id, frame_type) in frame.frame_types.iter_mut() {
                                if id != failed {
                                    *frame_type = FrameType::Delta;
                                }
                            }
                        }
                        state.streams.restore_key_frames(&frame.frame_types);
                        state.streams.restore_reference_hints(frame.hints);
                        if !frame.delivered {
                            state
                                .gate
                                .rollback_activity(frame.stamped_ms, frame.previous_activity_ms);
                        }
                    }
                    state.stats.on_dropped();
                }
                warn!(
                    session = %self.id,
                    frame_id,
                    stream = ?stream_id,
                    error = %error,
                    "Encoder reported asynchronous failure"
                );
                self.stats_sink.on_frame_dropped(DropReason::EncoderFailure);
            }
        }
    }

    // ------------------------------------------------------------------
    // Operator controls
    // ------------------------------------------------------------------

    /// Stop admitting frames
    pub fn pause(&self) {
        if self.state.lock().gate.pause() {
            info!(session = %self.id, "Encoder paused");
        }
    }

    /// Resume admitting frames after `pause`
    pub fn restart(&self) {
        if self.state.lock().gate.restart() {
            info!(session = %self.id, "Encoder restarted");
        }
    }

    /// Set whether the network is transmitting
    pub fn set_network_transmission_state(&self, transmitting: bool) {
        if self.state.lock().gate.set_network_transmitting(transmitting) {
            info!(session = %self.id, transmitting, "Network transmission state changed");
        }
    }

    /// Force a key frame on every stream with the next encode
    pub fn send_key_frame(&self) {
        self.state.lock().streams.request_key_frames();
        debug!(session = %self.id, "Key frame requested on all streams");
    }

    // ------------------------------------------------------------------
    // Congestion control
    // ------------------------------------------------------------------

    /// New aggregate bitrate and frame rate
    pub fn on_set_rates(&self, bitrate_bps: u32, framerate: u32) {
        let update = {
            let mut state = self.state.lock();
            self.apply_rates(&mut state, bitrate_bps, framerate)
        };
        self.report_rate_update(update);
    }

    /// Estimate from the congestion controller, with loss and RTT
    pub fn on_bitrate_updated(&self, bitrate_bps: u32, fraction_lost: u8, rtt_ms: i64) {
        let update = {
            let mut state = self.state.lock();
            state.channel = ChannelParameters {
                fraction_lost,
                rtt_ms,
            };
            state.channel_seq += 1;
            let framerate = state
                .allocator
                .as_ref()
                .map_or(state.last_framerate, BitrateAllocator::max_framerate);
            self.apply_rates(&mut state, bitrate_bps, framerate)
        };
        self.report_rate_update(update);
    }

    fn apply_rates(&self, state: &mut SessionState, bitrate_bps: u32, framerate: u32) -> RateUpdate {
        state.last_observed_bitrate_bps = bitrate_bps;
        state.last_framerate = framerate;
        state.rates_received = true;

        let (now_zero, target_bitrate_bps, framerate) = match &state.allocator {
            Some(allocator) => {
                let allocation = allocator.allocate(bitrate_bps, framerate);
                let result = (
                    allocation.is_zero(),
                    allocation.total_bitrate_bps(),
                    allocation.framerate,
                );
                state.allocation = Some(allocation);
                state.rates_seq += 1;
                result
            }
            None => (bitrate_bps == 0, bitrate_bps, framerate),
        };

        let transition = state.update_suspension(now_zero);
        RateUpdate {
            target_bitrate_bps,
            framerate,
            transition,
        }
    }

    fn report_rate_update(&self, update: RateUpdate) {
        debug!(
            session = %self.id,
            target_bps = update.target_bitrate_bps,
            framerate = update.framerate,
            "Rates updated"
        );
        self.stats_sink
            .on_set_rates(update.target_bitrate_bps, update.framerate);
        self.report_suspend_transition(update.transition);
    }

    fn report_suspend_transition(&self, transition: SuspendTransition) {
        match transition {
            SuspendTransition::Suspended => {
                info!(session = %self.id, "Video suspended");
                self.stats_sink.on_suspend_change(true);
            }
            SuspendTransition::Resumed => {
                info!(session = %self.id, "Video resumed");
                self.stats_sink.on_suspend_change(false);
            }
            SuspendTransition::Unchanged => {}
        }
    }

    // ------------------------------------------------------------------
    // Receiver feedback
    // ------------------------------------------------------------------

    /// Route one feedback signal
    ///
    /// A signal for an unknown stream is logged here and returned as an
    /// error; callers may drop it.
    pub fn on_feedback(&self, signal: FeedbackSignal) -> SendPathResult<FeedbackEffect> {
        let now = self.clock.now_ms();
        let result = FeedbackRouter::route(&mut self.state.lock().streams, signal, now);
        if let Err(e) = &result {
            warn!(session = %self.id, error = %e, "Feedback for unknown stream ignored");
        }
        result
    }

    /// Intra-frame request for one stream, throttled per stream
    pub fn on_received_intra_frame_request(&self, stream_id: StreamId) -> SendPathResult<FeedbackEffect> {
        self.on_feedback(FeedbackSignal::IntraFrameRequest { stream_id })
    }

    /// Slice loss indication
    pub fn on_received_sli(&self, stream_id: StreamId, picture_id: u8) -> SendPathResult<FeedbackEffect> {
        self.on_feedback(FeedbackSignal::SliceLoss {
            stream_id,
            picture_id,
        })
    }

    /// Reference picture selection indication
    pub fn on_received_rpsi(&self, stream_id: StreamId, picture_id: u64) -> SendPathResult<FeedbackEffect> {
        self.on_feedback(FeedbackSignal::ReferencePictureSelection {
            stream_id,
            picture_id,
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Most recent bitrate estimate applied
    pub fn last_observed_bitrate_bps(&self) -> u32 {
        self.state.lock().last_observed_bitrate_bps
    }

    /// Sum of the current per-stream targets
    pub fn codec_target_bitrate_bps(&self) -> SendPathResult<u32> {
        self.state
            .lock()
            .allocation
            .as_ref()
            .map(BitrateAllocation::total_bitrate_bps)
            .ok_or(SendPathError::NoCodecConfigured)
    }

    /// Current per-stream allocation
    pub fn allocation(&self) -> Option<BitrateAllocation> {
        self.state.lock().allocation.clone()
    }

    /// Padding needed to reach the minimum transmit bitrate
    pub fn padding_needed_bps(&self) -> u32 {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        padding_needed_bps(
            state.min_transmit_bitrate_bps,
            state.last_observed_bitrate_bps,
            state.gate.last_activity_ms(),
            now,
            self.config.padding_idle_threshold.as_millis() as i64,
        )
    }

    /// Whether the allocator suspended the video
    pub fn video_suspended(&self) -> bool {
        self.state.lock().gate.is_suspended()
    }

    /// Whether the operator paused the encoder
    pub fn is_paused(&self) -> bool {
        self.state.lock().gate.is_paused()
    }

    /// Whether a frame was dropped during the current pause
    pub fn paused_and_dropped_frame(&self) -> bool {
        self.state.lock().gate.paused_and_dropped()
    }

    /// Derived send state
    pub fn send_state(&self) -> SendState {
        self.state.lock().gate.state()
    }

    /// Last time a frame was admitted or output arrived
    pub fn time_of_last_frame_activity_ms(&self) -> Option<i64> {
        self.state.lock().gate.last_activity_ms()
    }

    /// Streams waiting for a forced key frame
    pub fn pending_key_frames(&self) -> usize {
        self.state.lock().streams.pending_key_frames()
    }

    /// Active encoder settings
    pub fn encoder_settings(&self) -> Option<Arc<EncoderSettings>> {
        self.state.lock().settings.clone()
    }

    /// Current protection method
    pub fn protection_method(&self) -> ProtectionMethod {
        self.state.lock().protection
    }

    /// Current send statistics
    pub fn send_statistics(&self) -> SendStatistics {
        let now = self.clock.now_ms();
        self.state.lock().stats.snapshot(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidsend_core::{EncodedImage, FragmentationHeader, RtpVideoHeader, SimulatedClock};

    #[derive(Debug, Default)]
    struct DiscardRouter;

    impl PayloadRouter for DiscardRouter {
        fn route_encoded_image(
            &self,
            _payload_type: u8,
            _image: &EncodedImage,
            _fragmentation: Option<&FragmentationHeader>,
            _header: &RtpVideoHeader,
        ) -> SendPathResult<()> {
            Ok(())
        }
    }

    fn session(ids: &[StreamId]) -> (EncoderSession, OutputPump, SimulatedClock) {
        let clock = SimulatedClock::new(10_000);
        let collaborators =
            SessionCollaborators::new(Arc::new(DiscardRouter)).with_clock(Arc::new(clock.clone()));
        let (session, pump) =
            EncoderSession::new(2, ids, SessionConfig::default(), collaborators).unwrap();
        (session, pump, clock)
    }

    #[test]
    fn test_session_config_presets() {
        let config = SessionConfig::default();
        assert_eq!(config.intra_request_throttle, Duration::from_millis(300));
        assert_eq!(config.padding_idle_threshold, Duration::from_millis(2000));

        let low = SessionConfig::low_latency();
        assert!(low.stats_report_interval < config.stats_report_interval);
    }

    #[test]
    fn test_new_session_rejects_bad_input() {
        let collaborators = SessionCollaborators::new(Arc::new(DiscardRouter));
        assert!(EncoderSession::new(0, &[StreamId(1)], SessionConfig::default(), collaborators.clone()).is_err());
        assert!(EncoderSession::new(1, &[], SessionConfig::default(), collaborators).is_err());
    }

    #[test]
    fn test_initial_state() {
        let (session, _pump, _clock) = session(&[StreamId(1)]);
        assert_eq!(session.send_state(), SendState::Active);
        assert!(!session.video_suspended());
        assert_eq!(session.last_observed_bitrate_bps(), 0);
        assert_eq!(session.time_of_last_frame_activity_ms(), None);
        assert_eq!(
            session.codec_target_bitrate_bps().unwrap_err(),
            SendPathError::NoCodecConfigured
        );
    }

    #[test]
    fn test_encode_without_codec_restores_activity() {
        let (session, _pump, _clock) = session(&[StreamId(1)]);
        let outcome = session.encode(&VideoFrame::black(16, 16));
        assert_eq!(outcome, EncodeOutcome::NoEncoder);
        assert_eq!(session.time_of_last_frame_activity_ms(), None);
    }

    #[test]
    fn test_rates_before_codec_still_drive_suspension() {
        let (session, _pump, _clock) = session(&[StreamId(1)]);
        session.on_set_rates(0, 30);
        assert!(session.video_suspended());
        assert_eq!(session.send_state(), SendState::CongestionSuspended);
        session.on_set_rates(100_000, 30);
        assert!(!session.video_suspended());
        assert_eq!(session.pending_key_frames(), 1);
    }

    #[test]
    fn test_admit_updates_activity_from_clock() {
        let (session, _pump, clock) = session(&[StreamId(1)]);
        clock.advance_ms(5);
        assert!(session.admit().is_encode());
        assert_eq!(session.time_of_last_frame_activity_ms(), Some(10_005));
    }
}
