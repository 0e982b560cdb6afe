//! Stream registry and per-stream feedback state

use vidsend_core::{FrameType, SendPathResult, StreamId, StreamTable};

use crate::codecs::ReferenceHints;

/// Feedback state of one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFeedbackState {
    /// Last accepted intra-frame request
    pub last_intra_request_ms: Option<i64>,
    /// Next encode must produce a key frame for this stream
    pub key_frame_pending: bool,
}

/// Stream identifiers fixed at construction, plus their feedback state
#[derive(Debug, Clone)]
pub struct StreamRegistry {
    streams: StreamTable<StreamFeedbackState>,
    hints: ReferenceHints,
    intra_request_throttle_ms: i64,
}

impl StreamRegistry {
    /// Create a registry for `stream_ids`
    pub fn new(stream_ids: &[StreamId], intra_request_throttle_ms: i64) -> SendPathResult<Self> {
        Ok(Self {
            streams: StreamTable::new(stream_ids, |_| StreamFeedbackState::default())?,
            hints: ReferenceHints::default(),
            intra_request_throttle_ms,
        })
    }

    /// Stream ids in declaration order
    pub fn ids(&self) -> Vec<StreamId> {
        self.streams.ids().collect()
    }

    /// Number of streams
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Always false
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Feedback state of one stream
    pub fn state(&self, stream_id: StreamId) -> SendPathResult<&StreamFeedbackState> {
        self.streams.get(stream_id)
    }

    /// Mark every stream for a key frame
    pub fn request_key_frames(&mut self) {
        for (_, state) in self.streams.iter_mut() {
            state.key_frame_pending = true;
        }
    }

    /// Throttled intra-frame request; returns whether a key frame was forced
    pub fn on_intra_request(&mut self, stream_id: StreamId, now_ms: i64) -> SendPathResult<bool> {
        let throttle_ms = self.intra_request_throttle_ms;
        let state = self.streams.get_mut(stream_id)?;

        if let Some(last) = state.last_intra_request_ms {
            if now_ms - last < throttle_ms {
                return Ok(false);
            }
        }
        state.last_intra_request_ms = Some(now_ms);
        state.key_frame_pending = true;
        Ok(true)
    }

    /// Record a slice-loss indication, replacing any earlier one
    pub fn record_sli(&mut self, stream_id: StreamId, picture_id: u8) -> SendPathResult<()> {
        self.streams.get(stream_id)?;
        self.hints.sli_picture_id = Some(picture_id);
        Ok(())
    }

    /// Record a reference picture selection indication, replacing any earlier one
    pub fn record_rpsi(&mut self, stream_id: StreamId, picture_id: u64) -> SendPathResult<()> {
        self.streams.get(stream_id)?;
        self.hints.rpsi_picture_id = Some(picture_id);
        Ok(())
    }

    /// Number of streams waiting for a key frame
    pub fn pending_key_frames(&self) -> usize {
        self.streams
            .iter()
            .filter(|(_, state)| state.key_frame_pending)
            .count()
    }

    /// Consume pending key-frame flags into per-stream frame types
    pub fn take_frame_types(&mut self) -> StreamTable<FrameType> {
        let frame_types = self.streams.map(|_, state| {
            if state.key_frame_pending {
                FrameType::Key
            } else {
                FrameType::Delta
            }
        });
        for (_, state) in self.streams.iter_mut() {
            state.key_frame_pending = false;
        }
        frame_types
    }

    /// Re-arm key-frame requests consumed by a failed encode
    pub fn restore_key_frames(&mut self, frame_types: &StreamTable<FrameType>) {
        for (id, frame_type) in frame_types.iter() {
            if frame_type.is_key() {
                if let Ok(state) = self.streams.get_mut(id) {
                    state.key_frame_pending = true;
                }
            }
        }
    }

    /// Consume the recorded reference hints
    pub fn take_reference_hints(&mut self) -> ReferenceHints {
        std::mem::take(&mut self.hints)
    }

    /// Put back hints consumed by a failed encode unless newer ones arrived
    pub fn restore_reference_hints(&mut self, hints: ReferenceHints) {
        if self.hints.sli_picture_id.is_none() {
            self.hints.sli_picture_id = hints.sli_picture_id;
        }
        if self.hints.rpsi_picture_id.is_none() {
            self.hints.rpsi_picture_id = hints.rpsi_picture_id;
        }
    }

    /// Currently recorded hints
    pub fn reference_hints(&self) -> ReferenceHints {
        self.hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidsend_core::SendPathError;

    fn registry() -> StreamRegistry {
        StreamRegistry::new(&[StreamId(1), StreamId(2)], 300).unwrap()
    }

    #[test]
    fn test_intra_requests_are_throttled_per_stream() {
        let mut registry = registry();
        assert!(registry.on_intra_request(StreamId(1), 1_000).unwrap());
        assert!(!registry.on_intra_request(StreamId(1), 1_100).unwrap());
        assert!(registry.on_intra_request(StreamId(2), 1_100).unwrap());
        assert!(registry.on_intra_request(StreamId(1), 1_300).unwrap());
        assert_eq!(
            registry.state(StreamId(1)).unwrap().last_intra_request_ms,
            Some(1_300)
        );
    }

    #[test]
    fn test_unknown_stream_leaves_state_untouched() {
        let mut registry = registry();
        assert_eq!(
            registry.on_intra_request(StreamId(9), 0).unwrap_err(),
            SendPathError::UnknownStream {
                stream_id: StreamId(9)
            }
        );
        assert!(registry.record_sli(StreamId(9), 3).is_err());
        assert_eq!(registry.pending_key_frames(), 0);
        assert!(registry.reference_hints().is_empty());
    }

    #[test]
    fn test_frame_types_are_consumed_once() {
        let mut registry = registry();
        registry.request_key_frames();
        registry.request_key_frames();

        let frame_types = registry.take_frame_types();
        assert!(frame_types.iter().all(|(_, t)| t.is_key()));
        assert_eq!(registry.pending_key_frames(), 0);

        let next = registry.take_frame_types();
        assert!(next.iter().all(|(_, t)| !t.is_key()));

        registry.restore_key_frames(&frame_types);
        assert_eq!(registry.pending_key_frames(), 2);
    }

    #[test]
    fn test_reference_hints_overwrite_and_restore() {
        let mut registry = registry();
        registry.record_sli(StreamId(1), 4).unwrap();
        registry.record_sli(StreamId(2), 9).unwrap();
        registry.record_rpsi(StreamId(1), 77).unwrap();

        let hints = registry.take_reference_hints();
        assert_eq!(hints.sli_picture_id, Some(9));
        assert_eq!(hints.rpsi_picture_id, Some(77));
        assert!(registry.reference_hints().is_empty());

        registry.record_rpsi(StreamId(2), 80).unwrap();
        registry.restore_reference_hints(hints);
        assert_eq!(registry.reference_hints().sli_picture_id, Some(9));
        assert_eq!(registry.reference_hints().rpsi_picture_id, Some(80));
    }
}
