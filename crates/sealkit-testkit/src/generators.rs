//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sealkit_core::{AccessWindow, ChatId, ContactId, Direction, MsgId, RecipientId};
use sealkit_keys::PeerShare;
use sealkit_policy::FileAttributeUpdate;

/// Generate a random ChatId.
pub fn chat_id() -> impl Strategy<Value = ChatId> {
    (1i64..=1_000_000).prop_map(ChatId)
}

/// Generate a random MsgId.
pub fn msg_id() -> impl Strategy<Value = MsgId> {
    (1i64..=1_000_000).prop_map(MsgId)
}

/// Generate a direction.
pub fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Outgoing), Just(Direction::Incoming)]
}

/// Generate a recipient id that looks like an address.
pub fn recipient() -> impl Strategy<Value = RecipientId> {
    "[a-z]{3,12}@[a-z]{3,8}\\.org".prop_map(RecipientId::new)
}

/// Generate a plausible file name.
pub fn file_name() -> impl Strategy<Value = String> {
    "[a-z0-9_-]{1,24}\\.(jpg|pdf|bin|txt)".prop_map(|s| s)
}

/// Generate a reasonable timestamp in milliseconds.
pub fn timestamp_ms() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 4
}

/// Generate a session timeout in seconds.
pub fn timeout_secs() -> impl Strategy<Value = i64> {
    1i64..=86_400
}

/// Generate an access window anchored at an arbitrary time.
pub fn access_window() -> impl Strategy<Value = AccessWindow> {
    (timestamp_ms(), timeout_secs())
        .prop_map(|(now, secs)| AccessWindow::from_timeout(now, secs))
}

/// Generate an attribute update.
pub fn attribute_update() -> impl Strategy<Value = FileAttributeUpdate> {
    (any::<bool>(), any::<bool>(), timeout_secs()).prop_map(|(download, forward, secs)| {
        FileAttributeUpdate {
            download,
            forward,
            access_time_secs: secs,
        }
    })
}

/// Generate a peer share with random material.
pub fn peer_share() -> impl Strategy<Value = PeerShare> {
    (1i64..=1_000, any::<[u8; 32]>())
        .prop_map(|(contributor, material)| PeerShare::new(ContactId(contributor), material))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn window_always_contains_its_start(w in access_window()) {
            prop_assert!(w.contains(w.start_ms));
            prop_assert!(!w.elapsed(w.start_ms));
        }

        #[test]
        fn window_end_follows_start(w in access_window()) {
            prop_assert!(w.end_ms >= w.start_ms);
        }
    }
}
