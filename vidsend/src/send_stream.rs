//! Runtime wiring of one video send path
//!
//! [`VideoSendStream`] builds an [`EncoderSession`] from a [`SendPathConfig`]
//! and runs three tokio tasks around it: the encoder output pump, a rate
//! update task and a receiver feedback task. Rate updates and feedback are
//! queued on channels so callers on the network threads never wait on the
//! session.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vidsend_core::{Clock, PayloadRouter, SendPathError, SystemClock};
use vidsend_diagnostics::{SendStatisticsProxy, SendStatsSnapshot};
use vidsend_media::{
    EncodeOutcome, EncoderSession, FeedbackSignal, SessionCollaborators, VideoEncoder, VideoFrame,
};

use crate::config::{ConfigError, SendPathConfig};
use crate::event::{EventSink, EventStream};

/// Errors starting a send stream
#[derive(Error, Debug)]
pub enum SendStreamError {
    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Session rejected the configuration
    #[error(transparent)]
    SendPath(#[from] SendPathError),

    /// Called outside a tokio runtime
    #[error("VideoSendStream must be started inside a tokio runtime")]
    NoRuntime,
}

/// Congestion-controller input queued for the rate task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUpdate {
    /// Aggregate bitrate and frame rate
    SetRates {
        /// Bitrate estimate
        bitrate_bps: u32,
        /// Frame rate
        framerate: u32,
    },
    /// Estimate with loss and round-trip time
    BitrateUpdated {
        /// Bitrate estimate
        bitrate_bps: u32,
        /// Fraction lost in 1/256 units
        fraction_lost: u8,
        /// Round-trip time
        rtt_ms: i64,
    },
}

/// A running video send path
#[derive(Debug)]
pub struct VideoSendStream {
    session: Arc<EncoderSession>,
    stats: Arc<SendStatisticsProxy>,
    rate_tx: mpsc::UnboundedSender<RateUpdate>,
    feedback_tx: mpsc::UnboundedSender<FeedbackSignal>,
    tasks: Vec<JoinHandle<()>>,
}

impl VideoSendStream {
    /// Start a send stream with the system clock
    pub fn start(
        config: &SendPathConfig,
        router: Arc<dyn PayloadRouter>,
        encoder: Box<dyn VideoEncoder>,
    ) -> Result<(Self, EventStream), SendStreamError> {
        Self::start_with_clock(config, router, encoder, Arc::new(SystemClock::new()))
    }

    /// Start a send stream with an explicit clock
    pub fn start_with_clock(
        config: &SendPathConfig,
        router: Arc<dyn PayloadRouter>,
        encoder: Box<dyn VideoEncoder>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, EventStream), SendStreamError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SendStreamError::NoRuntime)?;
        config.validate()?;

        let stream_ids = config.stream_ids();
        let codec = config.to_codec();
        let payload_type = codec.payload_type;

        let session_id = Uuid::new_v4();
        let stats = Arc::new(SendStatisticsProxy::new(session_id));
        let (event_sink, events) = EventSink::new(stats.clone());

        let (session, pump) = EncoderSession::with_id(
            session_id,
            config.number_of_cores,
            &stream_ids,
            config.session_config(),
            SessionCollaborators::new(router)
                .with_stats_sink(Arc::new(event_sink))
                .with_clock(clock),
        )?;
        session.register_external_encoder(encoder, payload_type, false)?;
        session.set_protection_method(config.protection.nack, config.protection.fec);
        session.reconfigure(codec, config.min_transmit_bitrate_bps)?;

        let session = Arc::new(session);
        let (rate_tx, rate_rx) = mpsc::unbounded_channel();
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            runtime.spawn(pump.run(Arc::downgrade(&session))),
            runtime.spawn(run_rate_updates(session.clone(), rate_rx)),
            runtime.spawn(run_feedback(session.clone(), feedback_rx)),
        ];

        info!(
            session = %session.id(),
            streams = stream_ids.len(),
            payload_type,
            "Video send stream started"
        );

        Ok((
            Self {
                session,
                stats,
                rate_tx,
                feedback_tx,
                tasks,
            },
            events,
        ))
    }

    /// Underlying session
    pub fn session(&self) -> &Arc<EncoderSession> {
        &self.session
    }

    /// Offer one captured frame
    pub fn encode(&self, frame: &VideoFrame) -> EncodeOutcome {
        self.session.encode(frame)
    }

    /// Queue a rate update; applied in delivery order
    pub fn on_set_rates(&self, bitrate_bps: u32, framerate: u32) {
        self.queue_rates(RateUpdate::SetRates {
            bitrate_bps,
            framerate,
        });
    }

    /// Queue an estimate with loss and RTT
    pub fn on_bitrate_updated(&self, bitrate_bps: u32, fraction_lost: u8, rtt_ms: i64) {
        self.queue_rates(RateUpdate::BitrateUpdated {
            bitrate_bps,
            fraction_lost,
            rtt_ms,
        });
    }

    /// Queue receiver feedback
    pub fn on_feedback(&self, signal: FeedbackSignal) {
        if self.feedback_tx.send(signal).is_err() {
            warn!("Feedback task stopped, signal dropped");
        }
    }

    /// Sender for rate updates, for use on another thread
    pub fn rate_sender(&self) -> mpsc::UnboundedSender<RateUpdate> {
        self.rate_tx.clone()
    }

    /// Sender for feedback, for use on another thread
    pub fn feedback_sender(&self) -> mpsc::UnboundedSender<FeedbackSignal> {
        self.feedback_tx.clone()
    }

    /// Pause frame admission
    pub fn pause(&self) {
        self.session.pause();
    }

    /// Resume frame admission
    pub fn restart(&self) {
        self.session.restart();
    }

    /// Aggregated statistics
    pub fn statistics(&self) -> SendStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the tasks after draining queued updates
    ///
    /// Waits until every sender handed out by [`Self::rate_sender`] and
    /// [`Self::feedback_sender`] has been dropped.
    pub async fn shutdown(self) {
        let Self {
            session,
            rate_tx,
            feedback_tx,
            tasks,
            ..
        } = self;
        let id = session.id();

        drop(rate_tx);
        drop(feedback_tx);
        drop(session);

        for task in tasks {
            if let Err(e) = task.await {
                warn!(session = %id, error = %e, "Send stream task failed");
            }
        }
        info!(session = %id, "Video send stream stopped");
    }

    fn queue_rates(&self, update: RateUpdate) {
        if self.rate_tx.send(update).is_err() {
            warn!("Rate task stopped, update dropped");
        }
    }
}

async fn run_rate_updates(session: Arc<EncoderSession>, mut rx: mpsc::UnboundedReceiver<RateUpdate>) {
    while let Some(update) = rx.recv().await {
        match update {
            RateUpdate::SetRates {
                bitrate_bps,
                framerate,
            } => session.on_set_rates(bitrate_bps, framerate),
            RateUpdate::BitrateUpdated {
                bitrate_bps,
                fraction_lost,
                rtt_ms,
            } => session.on_bitrate_updated(bitrate_bps, fraction_lost, rtt_ms),
        }
    }
    debug!(session = %session.id(), "Rate update task stopped");
}

async fn run_feedback(session: Arc<EncoderSession>, mut rx: mpsc::UnboundedReceiver<FeedbackSignal>) {
    while let Some(signal) = rx.recv().await {
        // Unknown streams are already logged by the session
        if let Ok(effect) = session.on_feedback(signal) {
            debug!(session = %session.id(), ?effect, "Feedback applied");
        }
    }
    debug!(session = %session.id(), "Feedback task stopped");
}
