//! PolicyStore trait: the abstract interface for protection-policy
//! persistence.
//!
//! This trait lets the engine be storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;

use sealkit_core::{AccessState, ChatId, Direction, MsgId, ProtectionState, RecipientId};

use crate::error::Result;
use crate::record::{MessageBinding, NewMessage, ProtectedFileRecord};

/// Result of registering a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Binding (and file record, when media is present) created.
    Created,
    /// Message id already registered (idempotent - not an error).
    Duplicate,
}

/// Which grant level an attribute update targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeScope {
    /// The owning chat's own flags and window.
    Chat,
    /// One recipient's forward grant. Never touches chat-level flags.
    Recipient(RecipientId),
}

/// Atomic update of the download/forward flags plus access window.
///
/// The window is reset to `[now, now + access_time_secs]` in the same
/// update; partial application is never observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributeUpdate {
    pub download: bool,
    pub forward: bool,
    pub access_time_secs: i64,
}

/// The PolicyStore trait: async interface for protection policy.
///
/// # Design Notes
///
/// - **Idempotent registration**: same msg id twice returns `Duplicate`.
/// - **Atomic updates**: `set_file_attributes` applies flags and window in
///   one transaction; readers never observe a torn record.
/// - **File addressing**: `file` parameters match a record's logical name
///   or its path (the host uses both).
/// - **Revocation**: terminal; `revoke_file` is idempotent and returns
///   false only when nothing matches.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    /// Register a message; creates the binding and, when media is present,
    /// the protected-file record with window `[now, now + timeout]`.
    async fn register_message(
        &self,
        msg: NewMessage,
        direction: Direction,
        now_ms: i64,
    ) -> Result<RegisterOutcome>;

    /// Create a file record directly (file encrypted before any message was
    /// registered). Idempotent: an existing record is left untouched.
    async fn ensure_file_record(&self, record: ProtectedFileRecord) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Evaluate download access. `NotFound` for unknown records.
    async fn file_access_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        now_ms: i64,
    ) -> Result<AccessState>;

    /// Evaluate forward access, optionally for a named recipient
    /// (two-factor gate applies when a recipient is given).
    async fn forward_access_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: Option<&RecipientId>,
        now_ms: i64,
    ) -> Result<AccessState>;

    /// Fetch a record snapshot.
    async fn get_record(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
    ) -> Result<Option<ProtectedFileRecord>>;

    /// Fetch a message binding.
    async fn get_binding(&self, chat: ChatId, msg: MsgId) -> Result<Option<MessageBinding>>;

    /// Whether the message was sent under protection.
    async fn is_msg_protected(&self, chat: ChatId, msg: MsgId) -> Result<bool>;

    /// Whether any protected-file record exists for the chat and is not
    /// revoked.
    async fn is_chat_protected(&self, chat: ChatId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────

    /// Apply an attribute update atomically. Returns false when no record
    /// matches.
    async fn set_file_attributes(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        scope: AttributeScope,
        update: FileAttributeUpdate,
        now_ms: i64,
    ) -> Result<bool>;

    /// Open or close the chat-level forward gate for a file. Returns false
    /// when no record matches.
    async fn set_forward_gate(&self, chat: ChatId, file: &str, grant: bool) -> Result<bool>;

    /// Append a recipient to the ordered forwarding log.
    async fn record_forwarded(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: RecipientId,
    ) -> Result<bool>;

    /// Advance the protection state machine for a record. Fails with a
    /// transition error for illegal moves (including anything out of
    /// Revoked).
    async fn mark_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        next: ProtectionState,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────
    // Revocation / deletion
    // ─────────────────────────────────────────────────────────────────────

    /// Transition every matching record to Revoked. Idempotent; returns
    /// false only when nothing matches.
    async fn revoke_file(&self, chat: ChatId, file: &str) -> Result<bool>;

    /// Remove all records and bindings for the chat. Returns false when the
    /// chat was unknown.
    async fn delete_chat(&self, chat: ChatId) -> Result<bool>;
}
