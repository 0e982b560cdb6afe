//! Frame admission
//!
//! The gate decides per incoming frame whether it reaches the encoder. Its
//! three inputs (network state, operator pause, congestion suspension) are
//! collapsed into a single [`SendState`] with a fixed precedence.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Effective send state derived from the gate inputs
///
/// Precedence: `NetworkDown` > `OperatorPaused` > `CongestionSuspended` > `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendState {
    /// Frames are admitted
    Active,
    /// Paused by the operator
    OperatorPaused,
    /// Allocated bitrate is zero
    CongestionSuspended,
    /// Network is not transmitting
    NetworkDown,
}

impl SendState {
    /// Whether frames are admitted in this state
    pub fn is_active(&self) -> bool {
        matches!(self, SendState::Active)
    }
}

/// Gate decision for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Encode the frame; carries the activity time it replaced
    Encode {
        /// Activity timestamp before this admission
        previous_activity_ms: Option<i64>,
    },
    /// Drop the frame
    Drop(SendState),
}

impl Admission {
    /// Whether the frame goes to the encoder
    pub fn is_encode(&self) -> bool {
        matches!(self, Admission::Encode { .. })
    }
}

/// Pause, suspension and network state plus frame activity
#[derive(Debug, Clone)]
pub struct FrameGate {
    network_transmitting: bool,
    paused: bool,
    paused_and_dropped: bool,
    suspended: bool,
    dropped_in_episode: u64,
    last_activity_ms: Option<i64>,
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGate {
    /// Network up, not paused, not suspended, no activity yet
    pub fn new() -> Self {
        Self {
            network_transmitting: true,
            paused: false,
            paused_and_dropped: false,
            suspended: false,
            dropped_in_episode: 0,
            last_activity_ms: None,
        }
    }

    /// Current derived send state
    pub fn state(&self) -> SendState {
        if !self.network_transmitting {
            SendState::NetworkDown
        } else if self.paused {
            SendState::OperatorPaused
        } else if self.suspended {
            SendState::CongestionSuspended
        } else {
            SendState::Active
        }
    }

    /// Decide whether a frame arriving at `now_ms` is encoded
    pub fn admit(&mut self, now_ms: i64) -> Admission {
        let state = self.state();
        if !state.is_active() {
            if self.paused {
                self.dropped_in_episode += 1;
                if !self.paused_and_dropped {
                    self.paused_and_dropped = true;
                    info!("Encoder paused, dropping frames");
                }
            }
            debug!(?state, "Frame dropped at gate");
            return Admission::Drop(state);
        }

        let previous_activity_ms = self.last_activity_ms.replace(now_ms);
        Admission::Encode {
            previous_activity_ms,
        }
    }

    /// Pause the encoder; returns whether the state changed
    pub fn pause(&mut self) -> bool {
        let changed = !self.paused;
        self.paused = true;
        changed
    }

    /// Lift an operator pause; returns whether the state changed
    pub fn restart(&mut self) -> bool {
        let changed = self.paused;
        self.paused = false;
        if self.paused_and_dropped {
            info!(
                dropped_frames = self.dropped_in_episode,
                "Encoder restarted, frame drop episode ended"
            );
        }
        self.paused_and_dropped = false;
        self.dropped_in_episode = 0;
        changed
    }

    /// Set whether the network is transmitting
    pub fn set_network_transmitting(&mut self, transmitting: bool) -> bool {
        let changed = self.network_transmitting != transmitting;
        self.network_transmitting = transmitting;
        changed
    }

    /// Set congestion suspension; returns whether the state changed
    pub fn set_suspended(&mut self, suspended: bool) -> bool {
        let changed = self.suspended != suspended;
        self.suspended = suspended;
        changed
    }

    /// Whether the operator paused the encoder
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether a frame was dropped during the current pause
    pub fn paused_and_dropped(&self) -> bool {
        self.paused_and_dropped
    }

    /// Whether the allocator suspended the video
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the network is transmitting
    pub fn is_network_transmitting(&self) -> bool {
        self.network_transmitting
    }

    /// Last time a frame was admitted or encoded output arrived
    pub fn last_activity_ms(&self) -> Option<i64> {
        self.last_activity_ms
    }

    /// Record encoded output
    pub fn record_activity(&mut self, now_ms: i64) {
        self.last_activity_ms = Some(now_ms);
    }

    /// Undo an admission whose encode failed
    ///
    /// Only applies if nothing else touched the timestamp since `stamped_ms`.
    pub fn rollback_activity(&mut self, stamped_ms: i64, previous_activity_ms: Option<i64>) {
        if self.last_activity_ms == Some(stamped_ms) {
            self.last_activity_ms = previous_activity_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gate_admits_and_stamps_activity() {
        let mut gate = FrameGate::new();
        assert_eq!(gate.state(), SendState::Active);
        assert_eq!(
            gate.admit(100),
            Admission::Encode {
                previous_activity_ms: None
            }
        );
        assert_eq!(gate.last_activity_ms(), Some(100));
        assert_eq!(
            gate.admit(133),
            Admission::Encode {
                previous_activity_ms: Some(100)
            }
        );
    }

    #[test]
    fn test_state_precedence() {
        let mut gate = FrameGate::new();
        gate.set_suspended(true);
        assert_eq!(gate.state(), SendState::CongestionSuspended);
        gate.pause();
        assert_eq!(gate.state(), SendState::OperatorPaused);
        gate.set_network_transmitting(false);
        assert_eq!(gate.state(), SendState::NetworkDown);
        gate.set_network_transmitting(true);
        gate.restart();
        gate.set_suspended(false);
        assert_eq!(gate.state(), SendState::Active);
    }

    #[test]
    fn test_network_down_drops_without_touching_activity() {
        let mut gate = FrameGate::new();
        gate.admit(10);
        gate.set_network_transmitting(false);
        assert_eq!(gate.admit(20), Admission::Drop(SendState::NetworkDown));
        assert_eq!(gate.last_activity_ms(), Some(10));
        assert!(!gate.paused_and_dropped());
    }

    #[test]
    fn test_pause_is_idempotent_and_tracks_drop_episode() {
        let mut gate = FrameGate::new();
        assert!(gate.pause());
        assert!(!gate.pause());
        assert!(!gate.paused_and_dropped());

        for t in 0..5 {
            assert!(!gate.admit(t).is_encode());
        }
        assert!(gate.paused_and_dropped());

        assert!(gate.restart());
        assert!(!gate.paused_and_dropped());
        assert!(!gate.restart());
        assert!(gate.admit(10).is_encode());
    }

    #[test]
    fn test_rollback_only_if_untouched() {
        let mut gate = FrameGate::new();
        gate.admit(5);
        gate.admit(10);
        gate.rollback_activity(10, Some(5));
        assert_eq!(gate.last_activity_ms(), Some(5));

        gate.admit(20);
        gate.record_activity(25);
        gate.rollback_activity(20, Some(5));
        assert_eq!(gate.last_activity_ms(), Some(25));
    }
    #[test]
    fn test_send_state_serializes_by_name() {
        let json = serde_json::to_string(&SendState::CongestionSuspended).unwrap();
        assert_eq!(json, "\"CongestionSuspended\"");
        let parsed: SendState = serde_json::from_str("\"NetworkDown\"").unwrap();
        assert_eq!(parsed, SendState::NetworkDown);
        assert!(!parsed.is_active());
    }
}
