//! Event system for send-path state changes

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use vidsend_core::EncodedImage;
use vidsend_media::{DropReason, SendStatistics, StatsSink};

/// Events emitted by a running send stream
#[derive(Debug, Clone, PartialEq)]
pub enum SendEvent {
    /// Allocated bitrate dropped to zero
    Suspended,
    /// Nonzero allocation after a suspension
    Resumed,
    /// New target rates applied
    RatesUpdated {
        /// Sum of the per-stream targets
        bitrate_bps: u32,
        /// Frame rate handed to the encoder
        framerate: u32,
    },
    /// Encoder implementation changed
    EncoderImplementationChanged {
        /// New implementation name
        name: String,
    },
    /// A frame was not encoded
    FrameDropped {
        /// Why
        reason: DropReason,
    },
    /// Periodic statistics report
    Statistics(SendStatistics),
}

impl SendEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SendEvent::Suspended => "suspended",
            SendEvent::Resumed => "resumed",
            SendEvent::RatesUpdated { .. } => "rates_updated",
            SendEvent::EncoderImplementationChanged { .. } => "encoder_implementation_changed",
            SendEvent::FrameDropped { .. } => "frame_dropped",
            SendEvent::Statistics(_) => "statistics",
        }
    }

    /// Check if this is a suspension-related event
    pub fn is_suspend_event(&self) -> bool {
        matches!(self, SendEvent::Suspended | SendEvent::Resumed)
    }
}

/// Stream of send events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<SendEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<SendEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<SendEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<SendEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Statistics sink that emits [`SendEvent`]s and forwards to an inner sink
#[derive(Debug)]
pub struct EventSink {
    event_tx: mpsc::UnboundedSender<SendEvent>,
    inner: Arc<dyn StatsSink>,
}

impl EventSink {
    /// Create a sink and the stream receiving its events
    pub fn new(inner: Arc<dyn StatsSink>) -> (Self, EventStream) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { event_tx, inner }, EventStream::new(event_rx))
    }

    fn emit(&self, event: SendEvent) {
        debug!(event = event.event_type(), "Send event");
        // Nobody listening is fine
        let _ = self.event_tx.send(event);
    }
}

impl StatsSink for EventSink {
    fn on_send_statistics(&self, stats: SendStatistics) {
        self.inner.on_send_statistics(stats);
        self.emit(SendEvent::Statistics(stats));
    }

    fn on_set_rates(&self, bitrate_bps: u32, framerate: u32) {
        self.inner.on_set_rates(bitrate_bps, framerate);
        self.emit(SendEvent::RatesUpdated {
            bitrate_bps,
            framerate,
        });
    }

    fn on_encoder_implementation_name(&self, name: &str) {
        self.inner.on_encoder_implementation_name(name);
        self.emit(SendEvent::EncoderImplementationChanged {
            name: name.to_string(),
        });
    }

    fn on_suspend_change(&self, suspended: bool) {
        self.inner.on_suspend_change(suspended);
        self.emit(if suspended {
            SendEvent::Suspended
        } else {
            SendEvent::Resumed
        });
    }

    fn on_encoded_image(&self, image: &EncodedImage) {
        self.inner.on_encoded_image(image);
    }

    fn on_frame_dropped(&self, reason: DropReason) {
        self.inner.on_frame_dropped(reason);
        self.emit(SendEvent::FrameDropped { reason });
    }
}
