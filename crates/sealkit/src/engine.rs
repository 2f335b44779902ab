//! The protection engine: unified API over key material and policy.
//!
//! The engine brings the key store and the policy store together and owns
//! the on-disk sealed format. Every content operation is check-then-act:
//! access is evaluated before plaintext touches disk, and re-evaluated
//! under the record lock so a concurrent revocation can never race a
//! decrypt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

use sealkit_core::{
    is_compatible_header, protocol_header, AccessState, AccessWindow, ChatId, Clock, Direction,
    MsgId, ProtectionState, RecipientId, SystemClock,
};
use sealkit_keys::{KeyStore, PeerShare, SealNonce, SplitKeyState};
use sealkit_policy::{
    AttributeScope, FileAttributeUpdate, MemoryPolicyStore, MessageBinding, NewMessage,
    PolicyStore, ProtectedFileRecord, RegisterOutcome, SqlitePolicyStore,
};

use crate::config::EngineConfig;
use crate::error::{DenialReason, EngineError, Result};
use crate::events::{EngineEvent, EventSender};

/// Suffix appended to a plaintext path to name its sealed artifact.
pub const SEALED_SUFFIX: &str = ".sealed";

/// File name of the policy database under the engine root.
pub const DB_FILE: &str = "sealkit.db";

/// The on-disk sealed envelope, CBOR-encoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct SealedFile {
    /// Protocol header, e.g. `sealkit/1`. Checked on unseal.
    pub format: String,
    /// ChaCha20-Poly1305 nonce.
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

type RecordKey = (ChatId, String, Direction);

/// The main engine struct.
///
/// Constructed once via [`open`](ProtectionEngine::open) (or
/// [`open_memory`](ProtectionEngine::open_memory) in tests) and passed by
/// reference; there is no process-global instance.
pub struct ProtectionEngine<S: PolicyStore> {
    /// Per-chat key material.
    pub(crate) keys: KeyStore,
    /// Policy persistence.
    pub(crate) policy: Arc<S>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    pub(crate) events: EventSender,
    /// Per-record async mutexes. Operations on one (chat, file, direction)
    /// serialize; independent records proceed in parallel.
    locks: StdMutex<HashMap<RecordKey, Arc<AsyncMutex<()>>>>,
}

impl ProtectionEngine<SqlitePolicyStore> {
    /// Open an engine rooted at a directory, with SQLite persistence at
    /// `<root>/sealkit.db`.
    pub fn open(
        root: &Path,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
        let store = SqlitePolicyStore::open(root.join(DB_FILE))?;
        Ok(Self::with_clock(store, config, Arc::new(SystemClock)))
    }
}

impl ProtectionEngine<MemoryPolicyStore> {
    /// Open an engine with in-memory policy storage. Useful for testing.
    pub fn open_memory(
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        Self::with_clock(MemoryPolicyStore::new(), config, Arc::new(SystemClock))
    }
}

impl<S: PolicyStore> ProtectionEngine<S> {
    /// Create an engine over an existing policy store.
    pub fn new(store: S, config: EngineConfig) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit clock. Tests drive expiry through
    /// a manual clock.
    pub fn with_clock(
        store: S,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = EventSender::channel();
        let engine = Self {
            keys: KeyStore::new(),
            policy: Arc::new(store),
            config,
            clock,
            events,
            locks: StdMutex::new(HashMap::new()),
        };
        (engine, rx)
    }

    /// Consume the engine. Emits `Shutdown` and closes the event channel.
    /// All state transitions commit synchronously inside their calls, so
    /// there is nothing to drain.
    pub fn shutdown(self) {
        self.events.emit(EngineEvent::Shutdown);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The policy store reference.
    pub fn policy(&self) -> &S {
        &self.policy
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn record_lock(&self, chat: ChatId, file_name: &str, direction: Direction) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks
            .entry((chat, file_name.to_string(), direction))
            .or_default()
            .clone()
    }

    /// Drop the lock entries for a deleted chat. A later operation on the
    /// same key re-creates its entry on demand.
    pub(crate) fn prune_chat_locks(&self, chat: ChatId) {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks.retain(|(c, _, _), _| *c != chat);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration and key exchange
    // ─────────────────────────────────────────────────────────────────────

    /// Register a message. Creates the chat's key material (with the
    /// message's split-key threshold) and, when media is present, the
    /// protected-file record.
    pub async fn register_message(
        &self,
        msg: NewMessage,
        direction: Direction,
    ) -> Result<RegisterOutcome> {
        self.keys
            .ensure_chat_keys(msg.chat, msg.num_peer_split_keys as usize);
        let outcome = self
            .policy
            .register_message(msg, direction, self.now())
            .await?;
        Ok(outcome)
    }

    /// Whether at least one peer share has been recorded for the chat.
    pub fn is_peer_added(&self, chat: ChatId) -> bool {
        self.keys.is_peer_added(chat)
    }

    /// Record a peer split-key share. Emits `PeerShareRecorded`, and
    /// `PeerKeysReady` on the share that meets the threshold.
    pub fn record_peer_share(&self, chat: ChatId, share: PeerShare) -> Result<SplitKeyState> {
        let before = self
            .keys
            .ensure_chat_keys(chat, self.config.peer_share_threshold as usize);
        let after = self.keys.record_peer_share(chat, share)?;

        let (have, need) = after.progress();
        self.events
            .emit(EngineEvent::PeerShareRecorded { chat, have, need });
        if after.is_ready() && !before.is_ready() {
            self.events.emit(EngineEvent::PeerKeysReady { chat });
        }
        Ok(after)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Content operations
    // ─────────────────────────────────────────────────────────────────────

    /// Seal a plaintext file. Returns the sealed artifact path
    /// (`<path>.sealed`).
    ///
    /// Fails with `KeyNotReady` when `require_peer_keys` is set and the
    /// chat's split-key threshold is unmet, and with
    /// `AccessDenied(Revoked)` on a revoked record. Input deletion is
    /// best-effort: a failure emits `PlaintextCleanupFailed` and the call
    /// still succeeds.
    pub async fn encrypt_file(
        &self,
        chat: ChatId,
        path: &Path,
        file_name: &str,
        direction: Direction,
        delete_input: bool,
    ) -> Result<PathBuf> {
        let split = self
            .keys
            .ensure_chat_keys(chat, self.config.peer_share_threshold as usize);
        if self.config.require_peer_keys && !split.is_ready() {
            let (have, need) = split.progress();
            return Err(EngineError::KeyNotReady { have, need });
        }

        let now = self.now();
        let sealed_path = sealed_path_for(path);
        self.policy
            .ensure_file_record(ProtectedFileRecord::new(
                chat,
                file_name,
                sealed_path.display().to_string(),
                direction,
                true,
                true,
                AccessWindow::from_timeout(now, self.config.default_access_timeout as i64),
                now,
            ))
            .await?;

        let lock = self.record_lock(chat, file_name, direction);
        let _guard = lock.lock().await;

        let record = self
            .policy
            .get_record(chat, file_name, direction)
            .await?
            .ok_or(EngineError::NotFound)?;
        if record.state.is_revoked() {
            return Err(EngineError::AccessDenied(DenialReason::Revoked));
        }
        let prior = record.state;

        self.policy
            .mark_state(chat, file_name, direction, ProtectionState::Encrypting)
            .await?;

        match self.seal_to_disk(chat, path, file_name, &sealed_path).await {
            Ok(()) => {
                self.policy
                    .mark_state(chat, file_name, direction, ProtectionState::Encrypted)
                    .await?;
            }
            Err(e) => {
                // Abort back to wherever the record was. On a failed
                // re-encrypt the previous sealed artifact is still the
                // authoritative one.
                let _ = self
                    .policy
                    .mark_state(chat, file_name, direction, prior)
                    .await;
                return Err(e);
            }
        }

        // Session parameters are keyed by the record's stored path so a
        // later renewal rotates this same entry.
        self.keys.fresh_otsp(chat, &record.file_path)?;

        if delete_input {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(%chat, path = %path.display(), error = %e, "plaintext cleanup failed");
                self.events.emit(EngineEvent::PlaintextCleanupFailed {
                    chat,
                    path: path.display().to_string(),
                });
            }
        }

        debug!(%chat, file_name, "sealed file");
        self.events.emit(EngineEvent::FileEncrypted {
            chat,
            file_name: file_name.to_string(),
        });
        Ok(sealed_path)
    }

    /// Unseal a file for the owning chat. Returns the plaintext path.
    ///
    /// Check-then-act: access is evaluated before any plaintext is
    /// produced and re-checked under the record lock.
    pub async fn decrypt_file(
        &self,
        chat: ChatId,
        path: &Path,
        file_name: &str,
        direction: Direction,
    ) -> Result<PathBuf> {
        self.decrypt_checked(chat, path, file_name, direction, None)
            .await
    }

    /// Unseal a forwarded file for a named recipient. The two-factor rule
    /// applies: the chat-level forward gate and the recipient's own grant
    /// must both allow it.
    pub async fn decrypt_forwarded_file(
        &self,
        chat: ChatId,
        path: &Path,
        file_name: &str,
        direction: Direction,
        recipient: &RecipientId,
    ) -> Result<PathBuf> {
        self.decrypt_checked(chat, path, file_name, direction, Some(recipient))
            .await
    }

    async fn decrypt_checked(
        &self,
        chat: ChatId,
        path: &Path,
        file_name: &str,
        direction: Direction,
        recipient: Option<&RecipientId>,
    ) -> Result<PathBuf> {
        self.check_access(chat, file_name, direction, recipient)
            .await?;

        let lock = self.record_lock(chat, file_name, direction);
        let _guard = lock.lock().await;

        // Re-check under the lock: a waiting revocation wins over a
        // decrypt that had already passed its first check.
        self.check_access(chat, file_name, direction, recipient)
            .await?;

        let record = self
            .policy
            .get_record(chat, file_name, direction)
            .await?
            .ok_or(EngineError::NotFound)?;
        if !record.state.is_encrypted() {
            return Err(EngineError::InvalidFile(format!(
                "no sealed artifact for {}",
                file_name
            )));
        }

        self.policy
            .mark_state(chat, file_name, direction, ProtectionState::Decrypting)
            .await?;

        match self.unseal_to_disk(chat, path, file_name).await {
            Ok(out_path) => {
                self.policy
                    .mark_state(chat, file_name, direction, ProtectionState::Decrypted)
                    .await?;
                debug!(%chat, file_name, "unsealed file");
                self.events.emit(EngineEvent::FileDecrypted {
                    chat,
                    file_name: file_name.to_string(),
                });
                Ok(out_path)
            }
            Err(e) => {
                // No plaintext was produced; return to the sealed state.
                let _ = self
                    .policy
                    .mark_state(chat, file_name, direction, ProtectionState::Encrypted)
                    .await;
                Err(e)
            }
        }
    }

    async fn check_access(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: Option<&RecipientId>,
    ) -> Result<()> {
        let now = self.now();
        let state = match recipient {
            None => {
                self.policy
                    .file_access_state(chat, file, direction, now)
                    .await?
            }
            Some(_) => {
                self.policy
                    .forward_access_state(chat, file, direction, recipient, now)
                    .await?
            }
        };
        ensure_allowed(state)
    }

    async fn seal_to_disk(
        &self,
        chat: ChatId,
        path: &Path,
        file_name: &str,
        sealed_path: &Path,
    ) -> Result<()> {
        let plaintext = tokio::fs::read(path).await?;
        let key = self.keys.file_key(chat, file_name)?;
        let nonce = SealNonce::generate();
        let ciphertext = key.seal(&plaintext, &nonce)?;

        let envelope = SealedFile {
            format: protocol_header(),
            nonce: nonce.0,
            ciphertext,
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&envelope, &mut buf)
            .map_err(|e| EngineError::InvalidFile(format!("envelope encode: {}", e)))?;
        tokio::fs::write(sealed_path, buf).await?;
        Ok(())
    }

    async fn unseal_to_disk(&self, chat: ChatId, path: &Path, file_name: &str) -> Result<PathBuf> {
        let bytes = tokio::fs::read(path).await?;
        let envelope: SealedFile = ciborium::from_reader(&bytes[..])
            .map_err(|e| EngineError::InvalidFile(format!("envelope decode: {}", e)))?;
        if !is_compatible_header(&envelope.format) {
            return Err(EngineError::InvalidFile(format!(
                "unsupported format: {}",
                envelope.format
            )));
        }

        let key = self.keys.file_key(chat, file_name)?;
        let plaintext = key.open(&envelope.ciphertext, &SealNonce(envelope.nonce))?;

        let out_path = plain_path_for(path);
        tokio::fs::write(&out_path, plaintext).await?;
        Ok(out_path)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session parameters
    // ─────────────────────────────────────────────────────────────────────

    /// Rotate session parameters for a file. Fails with `NotFound` when no
    /// record matches and with `AccessDenied(Revoked)` when any matching
    /// record is revoked; the file ciphertext is untouched.
    ///
    /// Parameters are keyed by each record's stored path, the same key the
    /// encrypt path uses, so rotation always hits the live entry.
    pub async fn fresh_otsp(&self, chat: ChatId, file: &str) -> Result<u64> {
        let mut records = Vec::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            if let Some(record) = self.policy.get_record(chat, file, direction).await? {
                if record.state.is_revoked() {
                    return Err(EngineError::AccessDenied(DenialReason::Revoked));
                }
                records.push(record);
            }
        }
        if records.is_empty() {
            return Err(EngineError::NotFound);
        }

        self.keys
            .ensure_chat_keys(chat, self.config.peer_share_threshold as usize);
        let mut generation = 0;
        for record in &records {
            generation = self.keys.fresh_otsp(chat, &record.file_path)?;
        }
        Ok(generation)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Attributes and grants
    // ─────────────────────────────────────────────────────────────────────

    /// Apply an attribute update. A renewed window also rotates the file's
    /// session parameters. Returns false when no record matches.
    pub async fn set_file_attributes(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        scope: AttributeScope,
        update: FileAttributeUpdate,
    ) -> Result<bool> {
        let updated = self
            .policy
            .set_file_attributes(chat, file, direction, scope, update, self.now())
            .await?;
        if updated {
            if let Some(record) = self.policy.get_record(chat, file, direction).await? {
                self.keys
                    .ensure_chat_keys(chat, self.config.peer_share_threshold as usize);
                self.keys.fresh_otsp(chat, &record.file_path)?;
            }
        }
        Ok(updated)
    }

    /// Open or close the chat-level forward gate for a file.
    pub async fn set_forward_gate(&self, chat: ChatId, file: &str, grant: bool) -> Result<bool> {
        Ok(self.policy.set_forward_gate(chat, file, grant).await?)
    }

    /// Append a recipient to the file's forwarding log.
    pub async fn record_forwarded(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: RecipientId,
    ) -> Result<bool> {
        Ok(self
            .policy
            .record_forwarded(chat, file, direction, recipient)
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Download-access state for a file. `NotFound` for unknown records.
    pub async fn file_access_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
    ) -> Result<AccessState> {
        Ok(self
            .policy
            .file_access_state(chat, file, direction, self.now())
            .await?)
    }

    /// Forward-access state, optionally for a named recipient.
    pub async fn forward_access_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: Option<&RecipientId>,
    ) -> Result<AccessState> {
        Ok(self
            .policy
            .forward_access_state(chat, file, direction, recipient, self.now())
            .await?)
    }

    /// Whether the file may currently be downloaded.
    pub async fn can_download_file(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
    ) -> Result<bool> {
        Ok(self
            .file_access_state(chat, file, direction)
            .await?
            .is_allowed())
    }

    /// Whether the file may currently be forwarded.
    pub async fn can_forward_file(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: Option<&RecipientId>,
    ) -> Result<bool> {
        Ok(self
            .forward_access_state(chat, file, direction, recipient)
            .await?
            .is_allowed())
    }

    /// Whether the message was sent under protection.
    pub async fn is_msg_protected(&self, chat: ChatId, msg: MsgId) -> Result<bool> {
        Ok(self.policy.is_msg_protected(chat, msg).await?)
    }

    /// Whether any live protected record exists for the chat.
    pub async fn is_chat_protected(&self, chat: ChatId) -> Result<bool> {
        Ok(self.policy.is_chat_protected(chat).await?)
    }

    /// Fetch a message binding.
    pub async fn get_binding(&self, chat: ChatId, msg: MsgId) -> Result<Option<MessageBinding>> {
        Ok(self.policy.get_binding(chat, msg).await?)
    }

    /// Fetch a record snapshot.
    pub async fn get_record(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
    ) -> Result<Option<ProtectedFileRecord>> {
        Ok(self.policy.get_record(chat, file, direction).await?)
    }
}

fn ensure_allowed(state: AccessState) -> Result<()> {
    match state {
        AccessState::Allowed => Ok(()),
        AccessState::NotFound => Err(EngineError::NotFound),
        denied => match DenialReason::from_state(denied) {
            Some(reason) => Err(EngineError::AccessDenied(reason)),
            None => Err(EngineError::NotFound),
        },
    }
}

/// `<path>.sealed`.
fn sealed_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(SEALED_SUFFIX);
    PathBuf::from(name)
}

/// `<path without .sealed>`, or `<path>.plain` when the suffix is absent.
fn plain_path_for(path: &Path) -> PathBuf {
    let s = path.as_os_str().to_string_lossy();
    match s.strip_suffix(SEALED_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => PathBuf::from(stripped),
        _ => PathBuf::from(format!("{}.plain", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sealed_path_suffix() {
        assert_eq!(
            sealed_path_for(Path::new("/m/photo.jpg")),
            PathBuf::from("/m/photo.jpg.sealed")
        );
    }

    #[test]
    fn test_plain_path_strips_suffix() {
        assert_eq!(
            plain_path_for(Path::new("/m/photo.jpg.sealed")),
            PathBuf::from("/m/photo.jpg")
        );
        assert_eq!(
            plain_path_for(Path::new("/m/already-plain.bin")),
            PathBuf::from("/m/already-plain.bin.plain")
        );
    }

    #[test]
    fn test_chat_deletion_prunes_lock_map() {
        let (engine, _rx) = ProtectionEngine::open_memory(EngineConfig::default());
        engine.record_lock(ChatId(1), "a.jpg", Direction::Outgoing);
        engine.record_lock(ChatId(1), "b.jpg", Direction::Incoming);
        engine.record_lock(ChatId(2), "c.jpg", Direction::Outgoing);

        engine.prune_chat_locks(ChatId(1));

        let locks = engine.locks.lock().unwrap();
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key(&(ChatId(2), "c.jpg".to_string(), Direction::Outgoing)));
    }

    #[test]
    fn test_ensure_allowed_mapping() {
        assert!(ensure_allowed(AccessState::Allowed).is_ok());
        assert!(matches!(
            ensure_allowed(AccessState::NotFound),
            Err(EngineError::NotFound)
        ));
        assert!(matches!(
            ensure_allowed(AccessState::DeniedRevoked),
            Err(EngineError::AccessDenied(DenialReason::Revoked))
        ));
    }
}
