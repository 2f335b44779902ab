//! Engine events.
//!
//! Events are emitted after the corresponding state transition has
//! committed, over an unbounded channel. Emission is fire-and-forget: a
//! dropped receiver never fails or blocks an operation.

use tokio::sync::mpsc;

use sealkit_core::ChatId;

/// Something the engine did, or failed to do as a side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A file was sealed.
    FileEncrypted {
        chat: ChatId,
        file_name: String,
    },
    /// A file was unsealed.
    FileDecrypted {
        chat: ChatId,
        file_name: String,
    },
    /// A record was revoked.
    FileRevoked {
        chat: ChatId,
        file: String,
    },
    /// All records, bindings and key material for a chat were removed.
    ChatDeleted {
        chat: ChatId,
    },
    /// A peer split-key share was recorded.
    PeerShareRecorded {
        chat: ChatId,
        have: usize,
        need: usize,
    },
    /// The chat's split-key threshold was met.
    PeerKeysReady {
        chat: ChatId,
    },
    /// Deleting the plaintext input after sealing failed. The sealed
    /// artifact is valid; the plaintext is still on disk.
    PlaintextCleanupFailed {
        chat: ChatId,
        path: String,
    },
    /// A revocation or deletion committed, but a cascade step failed.
    /// The record is revoked regardless (fail closed).
    CascadeIncomplete {
        chat: ChatId,
        detail: String,
    },
    /// The engine was shut down; no further events follow.
    Shutdown,
}

/// Fire-and-forget sender side of the event channel.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSender {
    /// Create a channel pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. A closed channel is ignored.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}
