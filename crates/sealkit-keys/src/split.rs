//! Peer split-key accumulation.
//!
//! Before protection operations that require peer cooperation may proceed,
//! the peer must contribute a threshold number of key shares. The threshold
//! is captured when the chat's key record is created and never changes
//! afterwards. Completion is an explicit state machine, not a counter
//! compared in ad-hoc places.

use serde::{Deserialize, Serialize};
use std::fmt;

use sealkit_core::ContactId;

/// A key share contributed by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerShare {
    /// Who contributed the share.
    pub contributor: ContactId,
    /// The share material. Opaque to this crate.
    pub material: [u8; 32],
}

impl PeerShare {
    pub fn new(contributor: ContactId, material: [u8; 32]) -> Self {
        Self {
            contributor,
            material,
        }
    }
}

/// Threshold completion state for peer split keys.
///
/// `Collecting(have/need) -> Ready`. Once `Ready`, recording further shares
/// keeps the state `Ready` (monotonic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitKeyState {
    /// Still waiting for shares.
    Collecting { have: usize, need: usize },
    /// Threshold met; peer-dependent operations may proceed.
    Ready,
}

impl SplitKeyState {
    /// Start collecting against a threshold. A threshold of zero means no
    /// peer shares are required at all.
    pub fn new(need: usize) -> Self {
        if need == 0 {
            SplitKeyState::Ready
        } else {
            SplitKeyState::Collecting { have: 0, need }
        }
    }

    /// Record one received share.
    pub fn record(self) -> Self {
        match self {
            SplitKeyState::Ready => SplitKeyState::Ready,
            SplitKeyState::Collecting { have, need } => {
                let have = have + 1;
                if have >= need {
                    SplitKeyState::Ready
                } else {
                    SplitKeyState::Collecting { have, need }
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SplitKeyState::Ready)
    }

    /// (have, need) progress while collecting; `Ready` reports (0, 0)
    /// since nothing further is owed.
    pub fn progress(&self) -> (usize, usize) {
        match self {
            SplitKeyState::Collecting { have, need } => (*have, *need),
            SplitKeyState::Ready => (0, 0),
        }
    }
}

impl fmt::Display for SplitKeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitKeyState::Collecting { have, need } => write!(f, "collecting {}/{}", have, need),
            SplitKeyState::Ready => write!(f, "ready"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_threshold_is_ready() {
        assert!(SplitKeyState::new(0).is_ready());
    }

    #[test]
    fn test_collects_to_threshold() {
        let mut s = SplitKeyState::new(3);
        assert!(!s.is_ready());
        s = s.record();
        assert_eq!(s, SplitKeyState::Collecting { have: 1, need: 3 });
        s = s.record();
        assert!(!s.is_ready());
        s = s.record();
        assert!(s.is_ready());
    }

    #[test]
    fn test_ready_is_sticky() {
        let s = SplitKeyState::new(1).record();
        assert!(s.is_ready());
        assert!(s.record().is_ready());
    }

    proptest! {
        #[test]
        fn prop_ready_monotonic(need in 0usize..16, extra in 0usize..8) {
            let mut s = SplitKeyState::new(need);
            for _ in 0..need {
                s = s.record();
            }
            prop_assert!(s.is_ready());
            for _ in 0..extra {
                s = s.record();
                prop_assert!(s.is_ready());
            }
        }
    }
}
