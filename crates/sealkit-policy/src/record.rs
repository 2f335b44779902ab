//! Protected-file records and message bindings.
//!
//! The record is the unit of policy: everything access evaluation needs is
//! on it, and evaluation is a pure function of the record and `now`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use sealkit_core::{
    AccessState, AccessWindow, ChatId, ContactId, Direction, MsgId, ProtectionState, RecipientId,
};

/// A per-recipient forward grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardGrant {
    /// Whether the recipient may receive the forwarded file at all.
    pub allowed: bool,
    /// Whether the recipient may download the forwarded plaintext.
    pub can_download: bool,
    /// The recipient's own access window.
    pub window: AccessWindow,
}

/// State of one protected file in one direction of one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedFileRecord {
    pub chat: ChatId,
    /// Logical file name (what the message shows).
    pub file_name: String,
    /// Filesystem path of the sealed artifact.
    pub file_path: String,
    pub direction: Direction,
    pub state: ProtectionState,
    /// Chat-level download flag.
    pub can_download: bool,
    /// Chat-level forward flag.
    pub can_forward: bool,
    /// Window during which the flags above are honored.
    pub window: AccessWindow,
    /// Chat-level gate that must be open before any per-recipient forward
    /// grant is honored.
    pub forward_gate: bool,
    /// Per-recipient forward grants.
    pub forward_grants: HashMap<RecipientId, ForwardGrant>,
    /// Ordered log of recipients this file was forwarded to.
    pub forwarded_to: Vec<RecipientId>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl ProtectedFileRecord {
    pub fn new(
        chat: ChatId,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
        direction: Direction,
        can_download: bool,
        can_forward: bool,
        window: AccessWindow,
        now_ms: i64,
    ) -> Self {
        Self {
            chat,
            file_name: file_name.into(),
            file_path: file_path.into(),
            direction,
            state: ProtectionState::Unprotected,
            can_download,
            can_forward,
            window,
            forward_gate: false,
            forward_grants: HashMap::new(),
            forwarded_to: Vec::new(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Mark the ciphertext as already present. Incoming files arrive
    /// sealed, so their records skip the encrypt path and start ready for
    /// decryption.
    pub fn sealed(mut self) -> Self {
        self.state = ProtectionState::Encrypted;
        self
    }

    /// Whether `key` addresses this record. The host addresses files
    /// sometimes by logical name and sometimes by path, so both match.
    pub fn matches(&self, key: &str) -> bool {
        self.file_name == key || self.file_path == key
    }

    /// Evaluate download access at `now`.
    ///
    /// Precedence: revoked > expired > no-grant.
    pub fn access_state(&self, now_ms: i64) -> AccessState {
        if self.state.is_revoked() {
            return AccessState::DeniedRevoked;
        }
        if self.window.elapsed(now_ms) || !self.window.contains(now_ms) {
            return AccessState::DeniedExpired;
        }
        if !self.can_download {
            return AccessState::DeniedNoGrant;
        }
        AccessState::Allowed
    }

    /// Evaluate forward access at `now`, optionally for a named recipient.
    ///
    /// Same precedence as [`access_state`](Self::access_state), evaluated
    /// against `can_forward`. When a recipient is named, the two-factor rule
    /// applies: the chat-level `forward_gate` must be open AND the
    /// recipient's grant must allow it within the recipient's own window.
    pub fn forward_access_state(&self, recipient: Option<&RecipientId>, now_ms: i64) -> AccessState {
        if self.state.is_revoked() {
            return AccessState::DeniedRevoked;
        }
        if self.window.elapsed(now_ms) || !self.window.contains(now_ms) {
            return AccessState::DeniedExpired;
        }
        if !self.can_forward {
            return AccessState::DeniedNoGrant;
        }
        if let Some(recipient) = recipient {
            if !self.forward_gate {
                return AccessState::DeniedNoGrant;
            }
            match self.forward_grants.get(recipient) {
                Some(grant) if grant.allowed => {
                    if grant.window.elapsed(now_ms) || !grant.window.contains(now_ms) {
                        AccessState::DeniedExpired
                    } else {
                        AccessState::Allowed
                    }
                }
                _ => AccessState::DeniedNoGrant,
            }
        } else {
            AccessState::Allowed
        }
    }
}

/// Binding of a host message to the protection layer.
///
/// Immutable after creation; revocation is tracked on the file record, not
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBinding {
    pub msg: MsgId,
    pub chat: ChatId,
    pub from: ContactId,
    pub msg_text: String,
    pub msg_type: String,
    /// Media path and logical file name, when the message carries a file.
    pub media: Option<(String, String)>,
    /// Whether the message was sent under protection.
    pub sent_protected: bool,
    /// Whether the sender's protocol header was compatible with this engine.
    pub chat_capable: bool,
    pub created_at_ms: i64,
}

/// Registration command for a new message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub msg: MsgId,
    pub chat: ChatId,
    pub from: ContactId,
    pub msg_text: String,
    pub msg_type: String,
    /// Empty string from the host means "no media".
    pub media_path: String,
    pub file_name: String,
    /// Access window length for the file record, in seconds.
    pub file_session_timeout: i64,
    pub can_download: bool,
    pub can_forward: bool,
    /// Split-key threshold requested for the chat.
    pub num_peer_split_keys: u32,
    pub forwarded_to: Vec<RecipientId>,
    pub sent_protected: bool,
    pub chat_capable: bool,
}

impl NewMessage {
    /// A plain text message with no media.
    pub fn text(msg: MsgId, chat: ChatId, from: ContactId, text: impl Into<String>) -> Self {
        Self {
            msg,
            chat,
            from,
            msg_text: text.into(),
            msg_type: "text".into(),
            media_path: String::new(),
            file_name: String::new(),
            file_session_timeout: 0,
            can_download: false,
            can_forward: false,
            num_peer_split_keys: 0,
            forwarded_to: Vec::new(),
            sent_protected: false,
            chat_capable: true,
        }
    }

    /// Attach media to the message.
    pub fn with_media(
        mut self,
        media_path: impl Into<String>,
        file_name: impl Into<String>,
        session_timeout_secs: i64,
        can_download: bool,
        can_forward: bool,
    ) -> Self {
        self.media_path = media_path.into();
        self.file_name = file_name.into();
        self.file_session_timeout = session_timeout_secs;
        self.can_download = can_download;
        self.can_forward = can_forward;
        self.msg_type = "file".into();
        self
    }

    pub fn protected(mut self, split_keys: u32) -> Self {
        self.sent_protected = true;
        self.num_peer_split_keys = split_keys;
        self
    }

    pub fn has_media(&self) -> bool {
        !self.media_path.is_empty()
    }

    /// Direction of the file record this message implies: messages from the
    /// local account (from id 1 in most hosts) are not distinguished here;
    /// the caller passes direction explicitly at registration.
    pub fn binding(&self, now_ms: i64) -> MessageBinding {
        MessageBinding {
            msg: self.msg,
            chat: self.chat,
            from: self.from,
            msg_text: self.msg_text.clone(),
            msg_type: self.msg_type.clone(),
            media: self
                .has_media()
                .then(|| (self.media_path.clone(), self.file_name.clone())),
            sent_protected: self.sent_protected,
            chat_capable: self.chat_capable,
            created_at_ms: now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(now: i64, timeout: i64) -> ProtectedFileRecord {
        ProtectedFileRecord::new(
            ChatId(1),
            "doc.pdf",
            "/media/doc.pdf.sealed",
            Direction::Outgoing,
            true,
            true,
            AccessWindow::from_timeout(now, timeout),
            now,
        )
    }

    #[test]
    fn test_allowed_within_window() {
        let r = record(0, 60);
        assert_eq!(r.access_state(30_000), AccessState::Allowed);
    }

    #[test]
    fn test_expired_after_window() {
        let r = record(0, 60);
        assert_eq!(r.access_state(60_001), AccessState::DeniedExpired);
    }

    #[test]
    fn test_no_grant_when_download_off() {
        let mut r = record(0, 60);
        r.can_download = false;
        assert_eq!(r.access_state(1_000), AccessState::DeniedNoGrant);
    }

    #[test]
    fn test_revoked_beats_expired() {
        let mut r = record(0, 60);
        r.state = ProtectionState::Revoked;
        // Also expired and without grants: revoked wins.
        r.can_download = false;
        assert_eq!(r.access_state(120_000), AccessState::DeniedRevoked);
        assert_eq!(
            r.forward_access_state(None, 120_000),
            AccessState::DeniedRevoked
        );
    }

    #[test]
    fn test_expired_beats_no_grant() {
        let mut r = record(0, 60);
        r.can_download = false;
        assert_eq!(r.access_state(120_000), AccessState::DeniedExpired);
    }

    #[test]
    fn test_forward_two_factor_gate() {
        let mut r = record(0, 600);
        let alice = RecipientId::from("alice@example.org");
        r.forward_grants.insert(
            alice.clone(),
            ForwardGrant {
                allowed: true,
                can_download: true,
                window: AccessWindow::from_timeout(0, 600),
            },
        );

        // Recipient grant exists but the chat-level gate is closed.
        assert_eq!(
            r.forward_access_state(Some(&alice), 1_000),
            AccessState::DeniedNoGrant
        );

        r.forward_gate = true;
        assert_eq!(
            r.forward_access_state(Some(&alice), 1_000),
            AccessState::Allowed
        );
    }

    #[test]
    fn test_forward_unknown_recipient_denied() {
        let mut r = record(0, 600);
        r.forward_gate = true;
        let bob = RecipientId::from("bob@example.org");
        assert_eq!(
            r.forward_access_state(Some(&bob), 1_000),
            AccessState::DeniedNoGrant
        );
    }

    #[test]
    fn test_forward_recipient_window_expires_independently() {
        let mut r = record(0, 3_600);
        r.forward_gate = true;
        let alice = RecipientId::from("alice@example.org");
        r.forward_grants.insert(
            alice.clone(),
            ForwardGrant {
                allowed: true,
                can_download: true,
                window: AccessWindow::from_timeout(0, 60),
            },
        );

        assert_eq!(
            r.forward_access_state(Some(&alice), 30_000),
            AccessState::Allowed
        );
        // Chat window still valid, recipient window elapsed.
        assert_eq!(
            r.forward_access_state(Some(&alice), 120_000),
            AccessState::DeniedExpired
        );
    }

    #[test]
    fn test_download_and_forward_flags_independent() {
        let mut r = record(0, 60);
        r.can_download = false;
        r.can_forward = true;
        assert_eq!(r.access_state(1_000), AccessState::DeniedNoGrant);
        assert_eq!(r.forward_access_state(None, 1_000), AccessState::Allowed);
    }

    #[test]
    fn test_matches_name_or_path() {
        let r = record(0, 60);
        assert!(r.matches("doc.pdf"));
        assert!(r.matches("/media/doc.pdf.sealed"));
        assert!(!r.matches("other.pdf"));
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// Revoked wins over every other denial, at any time, under
            /// any flag combination.
            #[test]
            fn prop_revoked_dominates(
                now in -1_000_000i64..1_000_000,
                download: bool,
                forward: bool,
            ) {
                let mut r = record(0, 60);
                r.state = ProtectionState::Revoked;
                r.can_download = download;
                r.can_forward = forward;
                prop_assert_eq!(r.access_state(now), AccessState::DeniedRevoked);
                prop_assert_eq!(
                    r.forward_access_state(None, now),
                    AccessState::DeniedRevoked
                );
            }

            /// Outside the window a non-revoked record is expired,
            /// regardless of the grant flags.
            #[test]
            fn prop_expired_dominates_grants(
                past in 60_001i64..1_000_000,
                download: bool,
                forward: bool,
            ) {
                let mut r = record(0, 60);
                r.can_download = download;
                r.can_forward = forward;
                prop_assert_eq!(r.access_state(past), AccessState::DeniedExpired);
                prop_assert_eq!(
                    r.forward_access_state(None, past),
                    AccessState::DeniedExpired
                );
            }
        }
    }

    #[test]
    fn test_binding_media_presence() {
        let now = 5_000;
        let plain = NewMessage::text(MsgId(1), ChatId(1), ContactId(2), "hi");
        assert!(plain.binding(now).media.is_none());

        let media = plain
            .clone()
            .with_media("/m/a.jpg", "a.jpg", 60, true, false);
        let binding = media.binding(now);
        assert_eq!(binding.media, Some(("/m/a.jpg".into(), "a.jpg".into())));
        assert_eq!(binding.created_at_ms, now);
    }
}
