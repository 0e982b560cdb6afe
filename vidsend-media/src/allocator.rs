//! Bitrate allocation across streams
//!
//! Splits one aggregate bitrate estimate into per-stream targets. Minimums
//! are filled first in declaration order, then the remainder tops streams up
//! towards their maximums in the same order. Whatever exceeds the sum of the
//! maximums stays unallocated.

use serde::{Deserialize, Serialize};

use vidsend_core::{SendPathError, SendPathResult, StreamId, StreamTable};

use crate::codecs::VideoCodec;

/// Bitrate bounds of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerLimits {
    /// Minimum useful bitrate
    pub min_bitrate_bps: u32,
    /// Maximum useful bitrate
    pub max_bitrate_bps: u32,
}

impl LayerLimits {
    /// Create limits
    pub fn new(min_bitrate_bps: u32, max_bitrate_bps: u32) -> Self {
        Self {
            min_bitrate_bps,
            max_bitrate_bps,
        }
    }
}

/// Result of one allocation
#[derive(Debug, Clone, PartialEq)]
pub struct BitrateAllocation {
    /// Estimate the allocation was computed from
    pub available_bitrate_bps: u32,
    /// Frame rate handed to every stream
    pub framerate: u32,
    layers: StreamTable<u32>,
}

impl BitrateAllocation {
    /// Target for one stream
    pub fn bitrate_bps(&self, stream_id: StreamId) -> SendPathResult<u32> {
        self.layers.get(stream_id).copied()
    }

    /// Sum of all stream targets
    pub fn total_bitrate_bps(&self) -> u32 {
        self.layers.iter().map(|(_, bps)| *bps).sum()
    }

    /// Whether every stream got zero
    pub fn is_zero(&self) -> bool {
        self.layers.iter().all(|(_, bps)| *bps == 0)
    }

    /// Per-stream targets in declaration order
    pub fn layers(&self) -> impl Iterator<Item = (StreamId, u32)> + '_ {
        self.layers.iter().map(|(id, bps)| (id, *bps))
    }
}

/// Change of the suspension state caused by an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendTransition {
    /// State unchanged
    Unchanged,
    /// Allocation dropped to zero
    Suspended,
    /// Nonzero allocation after a suspension
    Resumed,
}

impl SuspendTransition {
    /// Transition from `was_suspended` given the new allocation state
    pub fn between(was_suspended: bool, now_zero: bool) -> Self {
        match (was_suspended, now_zero) {
            (false, true) => SuspendTransition::Suspended,
            (true, false) => SuspendTransition::Resumed,
            _ => SuspendTransition::Unchanged,
        }
    }
}

/// Per-session allocator built from the active codec configuration
#[derive(Debug, Clone)]
pub struct BitrateAllocator {
    limits: StreamTable<LayerLimits>,
    max_framerate: u32,
}

impl BitrateAllocator {
    /// Build an allocator for `stream_ids` from the codec's layer limits
    pub fn new(codec: &VideoCodec, stream_ids: &[StreamId]) -> SendPathResult<Self> {
        let limits = codec.layer_limits();
        if limits.len() != stream_ids.len() {
            return Err(SendPathError::StreamCountMismatch {
                expected: stream_ids.len(),
                actual: limits.len(),
            });
        }
        let mut layers = limits.into_iter();
        let limits = StreamTable::new(stream_ids, |_| {
            layers.next().unwrap_or(LayerLimits::new(0, 0))
        })?;

        Ok(Self {
            limits,
            max_framerate: codec.max_framerate,
        })
    }

    /// Frame rate cap of the codec
    pub fn max_framerate(&self) -> u32 {
        self.max_framerate
    }

    /// Distribute `bitrate_bps` across the streams
    pub fn allocate(&self, bitrate_bps: u32, framerate: u32) -> BitrateAllocation {
        let mut remaining = bitrate_bps;

        let mut layers = self.limits.map(|_, limits| {
            let share = remaining.min(limits.min_bitrate_bps);
            remaining -= share;
            share
        });

        for ((_, allocated), (_, limits)) in layers.iter_mut().zip(self.limits.iter()) {
            let headroom = limits.max_bitrate_bps.saturating_sub(*allocated);
            let extra = remaining.min(headroom);
            *allocated += extra;
            remaining -= extra;
        }

        BitrateAllocation {
            available_bitrate_bps: bitrate_bps,
            framerate: framerate.min(self.max_framerate),
            layers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::SimulcastStream;
    use rand::Rng;

    fn two_layer_allocator() -> BitrateAllocator {
        let codec = VideoCodec::new("VP8", 96)
            .simulcast_stream(SimulcastStream::new(640, 360, 100_000, 500_000))
            .simulcast_stream(SimulcastStream::new(320, 180, 50_000, 300_000));
        BitrateAllocator::new(&codec, &[StreamId(1), StreamId(2)]).unwrap()
    }

    #[test]
    fn test_minimums_first_then_top_up_in_order() {
        let allocation = two_layer_allocator().allocate(300_000, 30);
        assert_eq!(allocation.bitrate_bps(StreamId(1)).unwrap(), 250_000);
        assert_eq!(allocation.bitrate_bps(StreamId(2)).unwrap(), 50_000);
        assert_eq!(allocation.framerate, 30);
    }

    #[test]
    fn test_partial_minimum_starves_later_streams() {
        let allocation = two_layer_allocator().allocate(80_000, 30);
        assert_eq!(allocation.bitrate_bps(StreamId(1)).unwrap(), 80_000);
        assert_eq!(allocation.bitrate_bps(StreamId(2)).unwrap(), 0);
    }

    #[test]
    fn test_excess_above_maximums_is_unallocated() {
        let allocation = two_layer_allocator().allocate(2_000_000, 60);
        assert_eq!(allocation.bitrate_bps(StreamId(1)).unwrap(), 500_000);
        assert_eq!(allocation.bitrate_bps(StreamId(2)).unwrap(), 300_000);
        assert_eq!(allocation.total_bitrate_bps(), 800_000);
        assert_eq!(allocation.framerate, 30);
    }

    #[test]
    fn test_zero_bitrate_is_zero_allocation() {
        let allocation = two_layer_allocator().allocate(0, 30);
        assert!(allocation.is_zero());
    }

    #[test]
    fn test_single_layer_uses_codec_limits() {
        let codec = VideoCodec::new("H264", 100).bitrate_range(50_000, 1_000_000);
        let allocator = BitrateAllocator::new(&codec, &[StreamId(7)]).unwrap();
        assert_eq!(
            allocator.allocate(1_500_000, 30).bitrate_bps(StreamId(7)).unwrap(),
            1_000_000
        );
        assert_eq!(
            allocator.allocate(20_000, 30).bitrate_bps(StreamId(7)).unwrap(),
            20_000
        );
    }

    #[test]
    fn test_stream_count_mismatch() {
        let codec = VideoCodec::new("VP8", 96);
        assert_eq!(
            BitrateAllocator::new(&codec, &[StreamId(1), StreamId(2)]).unwrap_err(),
            SendPathError::StreamCountMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_random_estimates_never_overallocate() {
        let allocator = two_layer_allocator();
        let mut rng = rand::thread_rng();
        for _ in 0..1_000 {
            let bitrate = rng.gen_range(0..3_000_000);
            let allocation = allocator.allocate(bitrate, 30);
            assert!(allocation.total_bitrate_bps() <= bitrate);
            assert_eq!(allocation.is_zero(), bitrate == 0);
        }
    }

    #[test]
    fn test_suspend_transitions() {
        assert_eq!(
            SuspendTransition::between(false, true),
            SuspendTransition::Suspended
        );
        assert_eq!(
            SuspendTransition::between(true, false),
            SuspendTransition::Resumed
        );
        assert_eq!(
            SuspendTransition::between(true, true),
            SuspendTransition::Unchanged
        );
    }
}
