//! Receiver feedback routing
//!
//! RTCP feedback (intra-frame requests, SLI, RPSI) arrives on its own thread.
//! Routing it only flips fields in the [`StreamRegistry`]; the effect shows
//! up in the next encode request.

use serde::{Deserialize, Serialize};
use tracing::debug;

use vidsend_core::{SendPathResult, StreamId};

use crate::registry::StreamRegistry;

/// One feedback message from the remote receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackSignal {
    /// Picture loss / full intra request
    IntraFrameRequest {
        /// Stream the request targets
        stream_id: StreamId,
    },
    /// Slice loss indication
    SliceLoss {
        /// Stream the report is about
        stream_id: StreamId,
        /// Picture id of the lost slice
        picture_id: u8,
    },
    /// Reference picture selection indication
    ReferencePictureSelection {
        /// Stream the report is about
        stream_id: StreamId,
        /// Picture id the receiver holds
        picture_id: u64,
    },
}

impl FeedbackSignal {
    /// Stream the signal refers to
    pub fn stream_id(&self) -> StreamId {
        match self {
            FeedbackSignal::IntraFrameRequest { stream_id }
            | FeedbackSignal::SliceLoss { stream_id, .. }
            | FeedbackSignal::ReferencePictureSelection { stream_id, .. } => *stream_id,
        }
    }
}

/// What routing a signal did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackEffect {
    /// Next encode produces a key frame for the stream
    KeyFrameForced(StreamId),
    /// Request arrived inside the throttle interval and was ignored
    Throttled(StreamId),
    /// Reference hint recorded for the next encode
    HintRecorded(StreamId),
}

/// Apply feedback to the registry
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackRouter;

impl FeedbackRouter {
    /// Route one signal received at `now_ms`
    pub fn route(
        registry: &mut StreamRegistry,
        signal: FeedbackSignal,
        now_ms: i64,
    ) -> SendPathResult<FeedbackEffect> {
        let effect = match signal {
            FeedbackSignal::IntraFrameRequest { stream_id } => {
                if registry.on_intra_request(stream_id, now_ms)? {
                    FeedbackEffect::KeyFrameForced(stream_id)
                } else {
                    FeedbackEffect::Throttled(stream_id)
                }
            }
            FeedbackSignal::SliceLoss {
                stream_id,
                picture_id,
            } => {
                registry.record_sli(stream_id, picture_id)?;
                FeedbackEffect::HintRecorded(stream_id)
            }
            FeedbackSignal::ReferencePictureSelection {
                stream_id,
                picture_id,
            } => {
                registry.record_rpsi(stream_id, picture_id)?;
                FeedbackEffect::HintRecorded(stream_id)
            }
        };

        debug!(?signal, ?effect, "Feedback routed");
        Ok(effect)
    }
}
