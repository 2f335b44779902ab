//! The KeyStore: per-chat key records.
//!
//! Thread-safe via an inner RwLock; clones share the same records. Chat key
//! records are created idempotently on first use and destroyed only by
//! explicit chat deletion.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use sealkit_core::ChatId;

use crate::crypto::{FileKey, X25519PublicKey, X25519StaticSecret};
use crate::error::{KeysError, Result};
use crate::otsp::Otsp;
use crate::split::{PeerShare, SplitKeyState};

/// Key material owned by a single chat.
pub struct ChatKeyRecord {
    /// Root key; per-file content keys derive from it.
    root: FileKey,
    /// Static secret for peer key agreement.
    secret: X25519StaticSecret,
    /// Peer shares received so far.
    shares: Vec<PeerShare>,
    /// Threshold completion state.
    split: SplitKeyState,
    /// Session parameters per file path.
    otsps: HashMap<String, Otsp>,
}

impl ChatKeyRecord {
    fn new(threshold: usize) -> Self {
        Self {
            root: FileKey::generate(),
            secret: X25519StaticSecret::generate(),
            shares: Vec::new(),
            split: SplitKeyState::new(threshold),
            otsps: HashMap::new(),
        }
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    pub fn split_state(&self) -> SplitKeyState {
        self.split
    }

    pub fn share_count(&self) -> usize {
        self.shares.len()
    }
}

/// Per-chat key store.
///
/// Cheap to clone; all clones see the same records.
#[derive(Clone)]
pub struct KeyStore {
    inner: Arc<RwLock<HashMap<ChatId, ChatKeyRecord>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create key material for a chat if absent. Idempotent; an existing
    /// record keeps its threshold.
    pub fn ensure_chat_keys(&self, chat: ChatId, threshold: usize) -> SplitKeyState {
        let mut inner = self.inner.write().expect("keystore lock poisoned");
        let record = inner.entry(chat).or_insert_with(|| {
            debug!(%chat, threshold, "creating chat key record");
            ChatKeyRecord::new(threshold)
        });
        record.split
    }

    /// True iff at least one peer share has been recorded for the chat.
    pub fn is_peer_added(&self, chat: ChatId) -> bool {
        let inner = self.inner.read().expect("keystore lock poisoned");
        inner.get(&chat).is_some_and(|r| !r.shares.is_empty())
    }

    /// Append a peer share and recompute threshold completion.
    pub fn record_peer_share(&self, chat: ChatId, share: PeerShare) -> Result<SplitKeyState> {
        let mut inner = self.inner.write().expect("keystore lock poisoned");
        let record = inner.get_mut(&chat).ok_or(KeysError::ChatNotFound(chat))?;
        record.shares.push(share);
        record.split = record.split.record();
        debug!(%chat, state = %record.split, "recorded peer share");
        Ok(record.split)
    }

    /// Whether the chat's split-key threshold has been met.
    pub fn peer_keys_complete(&self, chat: ChatId) -> bool {
        let inner = self.inner.read().expect("keystore lock poisoned");
        inner.get(&chat).is_some_and(|r| r.split.is_ready())
    }

    pub fn split_state(&self, chat: ChatId) -> Result<SplitKeyState> {
        let inner = self.inner.read().expect("keystore lock poisoned");
        inner
            .get(&chat)
            .map(|r| r.split)
            .ok_or(KeysError::ChatNotFound(chat))
    }

    /// Irreversibly destroy a chat's key material.
    ///
    /// Returns false if the chat is unknown.
    pub fn delete_chat_keys(&self, chat: ChatId) -> bool {
        let mut inner = self.inner.write().expect("keystore lock poisoned");
        let removed = inner.remove(&chat).is_some();
        if removed {
            debug!(%chat, "deleted chat key material");
        }
        removed
    }

    /// Derive the content key for a file. Fails with `ChatNotFound` if the
    /// chat has no key record.
    pub fn file_key(&self, chat: ChatId, file_name: &str) -> Result<FileKey> {
        let inner = self.inner.read().expect("keystore lock poisoned");
        let record = inner.get(&chat).ok_or(KeysError::ChatNotFound(chat))?;
        Ok(FileKey::derive_for_file(&record.root, file_name))
    }

    /// Regenerate session parameters for a file. The ciphertext on disk is
    /// untouched; only the key wrapping rotates.
    pub fn fresh_otsp(&self, chat: ChatId, file_path: &str) -> Result<u64> {
        let mut inner = self.inner.write().expect("keystore lock poisoned");
        let record = inner.get_mut(&chat).ok_or(KeysError::ChatNotFound(chat))?;
        let otsp = record
            .otsps
            .entry(file_path.to_string())
            .or_insert_with(Otsp::generate);
        otsp.refresh();
        debug!(%chat, file_path, generation = otsp.generation(), "refreshed otsp");
        Ok(otsp.generation())
    }

    /// Drop the session parameters for a file, if any. Used by revocation.
    pub fn drop_otsp(&self, chat: ChatId, file_path: &str) -> Result<bool> {
        let mut inner = self.inner.write().expect("keystore lock poisoned");
        let record = inner.get_mut(&chat).ok_or(KeysError::ChatNotFound(chat))?;
        Ok(record.otsps.remove(file_path).is_some())
    }

    /// Current OTSP generation for a file, if parameters exist.
    pub fn otsp_generation(&self, chat: ChatId, file_path: &str) -> Result<Option<u64>> {
        let inner = self.inner.read().expect("keystore lock poisoned");
        let record = inner.get(&chat).ok_or(KeysError::ChatNotFound(chat))?;
        Ok(record.otsps.get(file_path).map(|o| o.generation()))
    }

    /// Install initial session parameters for a file if absent.
    pub fn ensure_otsp(&self, chat: ChatId, file_path: &str) -> Result<()> {
        let mut inner = self.inner.write().expect("keystore lock poisoned");
        let record = inner.get_mut(&chat).ok_or(KeysError::ChatNotFound(chat))?;
        record
            .otsps
            .entry(file_path.to_string())
            .or_insert_with(Otsp::generate);
        Ok(())
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}
