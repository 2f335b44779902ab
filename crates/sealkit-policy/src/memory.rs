//! In-memory implementation of the PolicyStore trait.
//!
//! Primarily for testing. Same semantics as SQLite but nothing persists.
//! Thread-safe via RwLock; every mutation swaps whole values under the
//! write lock, so readers never observe a torn record.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use sealkit_core::{
    AccessState, AccessWindow, ChatId, Direction, MsgId, ProtectionState, RecipientId,
};

use crate::error::Result;
use crate::record::{ForwardGrant, MessageBinding, NewMessage, ProtectedFileRecord};
use crate::traits::{AttributeScope, FileAttributeUpdate, PolicyStore, RegisterOutcome};

/// In-memory policy store.
pub struct MemoryPolicyStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Records keyed by (chat, file name, direction).
    records: HashMap<(ChatId, String, Direction), ProtectedFileRecord>,
    /// Message bindings keyed by (chat, msg).
    bindings: HashMap<(ChatId, MsgId), MessageBinding>,
}

impl Inner {
    fn find_mut(
        &mut self,
        chat: ChatId,
        file: &str,
        direction: Direction,
    ) -> Option<&mut ProtectedFileRecord> {
        self.records
            .values_mut()
            .find(|r| r.chat == chat && r.direction == direction && r.matches(file))
    }

    fn find(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
    ) -> Option<&ProtectedFileRecord> {
        self.records
            .values()
            .find(|r| r.chat == chat && r.direction == direction && r.matches(file))
    }
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn register_message(
        &self,
        msg: NewMessage,
        direction: Direction,
        now_ms: i64,
    ) -> Result<RegisterOutcome> {
        let mut inner = self.inner.write().expect("policy lock poisoned");

        if inner.bindings.contains_key(&(msg.chat, msg.msg)) {
            return Ok(RegisterOutcome::Duplicate);
        }

        let binding = msg.binding(now_ms);
        inner.bindings.insert((msg.chat, msg.msg), binding);

        if msg.has_media() {
            let key = (msg.chat, msg.file_name.clone(), direction);
            inner.records.entry(key).or_insert_with(|| {
                let mut record = ProtectedFileRecord::new(
                    msg.chat,
                    msg.file_name.clone(),
                    msg.media_path.clone(),
                    direction,
                    msg.can_download,
                    msg.can_forward,
                    AccessWindow::from_timeout(now_ms, msg.file_session_timeout),
                    now_ms,
                );
                record.forwarded_to = msg.forwarded_to.clone();
                if direction == Direction::Incoming {
                    record = record.sealed();
                }
                record
            });
        }

        Ok(RegisterOutcome::Created)
    }

    async fn ensure_file_record(&self, record: ProtectedFileRecord) -> Result<()> {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        let key = (record.chat, record.file_name.clone(), record.direction);
        inner.records.entry(key).or_insert(record);
        Ok(())
    }

    async fn file_access_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        now_ms: i64,
    ) -> Result<AccessState> {
        let inner = self.inner.read().expect("policy lock poisoned");
        Ok(inner
            .find(chat, file, direction)
            .map(|r| r.access_state(now_ms))
            .unwrap_or(AccessState::NotFound))
    }

    async fn forward_access_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: Option<&RecipientId>,
        now_ms: i64,
    ) -> Result<AccessState> {
        let inner = self.inner.read().expect("policy lock poisoned");
        Ok(inner
            .find(chat, file, direction)
            .map(|r| r.forward_access_state(recipient, now_ms))
            .unwrap_or(AccessState::NotFound))
    }

    async fn get_record(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
    ) -> Result<Option<ProtectedFileRecord>> {
        let inner = self.inner.read().expect("policy lock poisoned");
        Ok(inner.find(chat, file, direction).cloned())
    }

    async fn get_binding(&self, chat: ChatId, msg: MsgId) -> Result<Option<MessageBinding>> {
        let inner = self.inner.read().expect("policy lock poisoned");
        Ok(inner.bindings.get(&(chat, msg)).cloned())
    }

    async fn is_msg_protected(&self, chat: ChatId, msg: MsgId) -> Result<bool> {
        let inner = self.inner.read().expect("policy lock poisoned");
        Ok(inner
            .bindings
            .get(&(chat, msg))
            .is_some_and(|b| b.sent_protected))
    }

    async fn is_chat_protected(&self, chat: ChatId) -> Result<bool> {
        let inner = self.inner.read().expect("policy lock poisoned");
        Ok(inner
            .records
            .values()
            .any(|r| r.chat == chat && !r.state.is_revoked()))
    }

    async fn set_file_attributes(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        scope: AttributeScope,
        update: FileAttributeUpdate,
        now_ms: i64,
    ) -> Result<bool> {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        let Some(record) = inner.find_mut(chat, file, direction) else {
            return Ok(false);
        };

        match scope {
            AttributeScope::Chat => {
                record.can_download = update.download;
                record.can_forward = update.forward;
                record
                    .window
                    .renew(now_ms, update.access_time_secs);
            }
            AttributeScope::Recipient(recipient) => {
                record.forward_grants.insert(
                    recipient,
                    ForwardGrant {
                        allowed: update.forward,
                        can_download: update.download,
                        window: AccessWindow::from_timeout(now_ms, update.access_time_secs),
                    },
                );
            }
        }
        record.updated_at_ms = now_ms;
        Ok(true)
    }

    async fn set_forward_gate(&self, chat: ChatId, file: &str, grant: bool) -> Result<bool> {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        let mut matched = false;
        for record in inner.records.values_mut() {
            if record.chat == chat && record.matches(file) {
                record.forward_gate = grant;
                matched = true;
            }
        }
        Ok(matched)
    }

    async fn record_forwarded(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: RecipientId,
    ) -> Result<bool> {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        let Some(record) = inner.find_mut(chat, file, direction) else {
            return Ok(false);
        };
        record.forwarded_to.push(recipient);
        Ok(true)
    }

    async fn mark_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        next: ProtectionState,
    ) -> Result<()> {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        let record = inner.find_mut(chat, file, direction).ok_or_else(|| {
            crate::error::PolicyError::NotFound(format!("{chat} {direction} {file}"))
        })?;
        record.state.transition(next)?;
        Ok(())
    }

    async fn revoke_file(&self, chat: ChatId, file: &str) -> Result<bool> {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        let mut matched = false;
        for record in inner.records.values_mut() {
            if record.chat == chat && record.matches(file) {
                matched = true;
                // Idempotent: already-revoked records stay revoked.
                if !record.state.is_revoked() {
                    let _ = record.state.transition(ProtectionState::Revoked);
                }
            }
        }
        Ok(matched)
    }

    async fn delete_chat(&self, chat: ChatId) -> Result<bool> {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        let had_records = inner.records.values().any(|r| r.chat == chat);
        let had_bindings = inner.bindings.keys().any(|(c, _)| *c == chat);
        inner.records.retain(|_, r| r.chat != chat);
        inner.bindings.retain(|(c, _), _| *c != chat);
        Ok(had_records || had_bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealkit_core::ContactId;

    fn media_msg(msg: i64, chat: i64) -> NewMessage {
        NewMessage::text(MsgId(msg), ChatId(chat), ContactId(10), "here you go")
            .with_media(format!("/m/f{msg}.jpg"), format!("f{msg}.jpg"), 600, true, true)
            .protected(2)
    }

    #[tokio::test]
    async fn test_register_idempotent() {
        let store = MemoryPolicyStore::new();
        let msg = media_msg(1, 1);

        let r1 = store
            .register_message(msg.clone(), Direction::Outgoing, 0)
            .await
            .unwrap();
        assert_eq!(r1, RegisterOutcome::Created);

        let r2 = store
            .register_message(msg, Direction::Outgoing, 1_000)
            .await
            .unwrap();
        assert_eq!(r2, RegisterOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_incoming_media_record_starts_encrypted() {
        let store = MemoryPolicyStore::new();
        store
            .register_message(media_msg(1, 1), Direction::Incoming, 0)
            .await
            .unwrap();
        let incoming = store
            .get_record(ChatId(1), "f1.jpg", Direction::Incoming)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(incoming.state, ProtectionState::Encrypted);

        // Outgoing media has no ciphertext yet; the encrypt path creates it.
        store
            .register_message(media_msg(2, 1), Direction::Outgoing, 0)
            .await
            .unwrap();
        let outgoing = store
            .get_record(ChatId(1), "f2.jpg", Direction::Outgoing)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outgoing.state, ProtectionState::Unprotected);
    }

    #[tokio::test]
    async fn test_text_message_creates_no_record() {
        let store = MemoryPolicyStore::new();
        let msg = NewMessage::text(MsgId(1), ChatId(1), ContactId(10), "hi");
        store
            .register_message(msg, Direction::Incoming, 0)
            .await
            .unwrap();

        assert!(!store.is_chat_protected(ChatId(1)).await.unwrap());
        assert_eq!(
            store
                .file_access_state(ChatId(1), "anything", Direction::Incoming, 0)
                .await
                .unwrap(),
            AccessState::NotFound
        );
    }

    #[tokio::test]
    async fn test_lookup_by_name_and_path() {
        let store = MemoryPolicyStore::new();
        store
            .register_message(media_msg(1, 1), Direction::Outgoing, 0)
            .await
            .unwrap();

        for key in ["f1.jpg", "/m/f1.jpg"] {
            assert_eq!(
                store
                    .file_access_state(ChatId(1), key, Direction::Outgoing, 1_000)
                    .await
                    .unwrap(),
                AccessState::Allowed,
                "lookup by {key}"
            );
        }
    }

    #[tokio::test]
    async fn test_attribute_update_is_atomic_snapshot() {
        let store = MemoryPolicyStore::new();
        store
            .register_message(media_msg(1, 1), Direction::Outgoing, 0)
            .await
            .unwrap();

        let updated = store
            .set_file_attributes(
                ChatId(1),
                "f1.jpg",
                Direction::Outgoing,
                AttributeScope::Chat,
                FileAttributeUpdate {
                    download: false,
                    forward: true,
                    access_time_secs: 120,
                },
                50_000,
            )
            .await
            .unwrap();
        assert!(updated);

        let record = store
            .get_record(ChatId(1), "f1.jpg", Direction::Outgoing)
            .await
            .unwrap()
            .unwrap();
        // Flags and window moved together.
        assert!(!record.can_download);
        assert!(record.can_forward);
        assert_eq!(record.window.start_ms, 50_000);
        assert_eq!(record.window.end_ms, 170_000);
    }

    #[tokio::test]
    async fn test_recipient_scope_leaves_chat_flags() {
        let store = MemoryPolicyStore::new();
        store
            .register_message(media_msg(1, 1), Direction::Outgoing, 0)
            .await
            .unwrap();

        store
            .set_file_attributes(
                ChatId(1),
                "f1.jpg",
                Direction::Outgoing,
                AttributeScope::Recipient(RecipientId::from("alice")),
                FileAttributeUpdate {
                    download: false,
                    forward: false,
                    access_time_secs: 60,
                },
                0,
            )
            .await
            .unwrap();

        let record = store
            .get_record(ChatId(1), "f1.jpg", Direction::Outgoing)
            .await
            .unwrap()
            .unwrap();
        assert!(record.can_download, "chat flags untouched");
        assert!(record.forward_grants.contains_key(&RecipientId::from("alice")));
    }

    #[tokio::test]
    async fn test_revoke_idempotent_and_terminal() {
        let store = MemoryPolicyStore::new();
        store
            .register_message(media_msg(1, 1), Direction::Outgoing, 0)
            .await
            .unwrap();

        assert!(store.revoke_file(ChatId(1), "/m/f1.jpg").await.unwrap());
        assert!(store.revoke_file(ChatId(1), "/m/f1.jpg").await.unwrap());
        assert!(!store.revoke_file(ChatId(1), "/m/none.jpg").await.unwrap());

        assert_eq!(
            store
                .file_access_state(ChatId(1), "f1.jpg", Direction::Outgoing, 1_000)
                .await
                .unwrap(),
            AccessState::DeniedRevoked
        );
        // No transition leaves Revoked.
        assert!(store
            .mark_state(ChatId(1), "f1.jpg", Direction::Outgoing, ProtectionState::Encrypting)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_chat_protected_tracks_revocation() {
        let store = MemoryPolicyStore::new();
        store
            .register_message(media_msg(1, 1), Direction::Outgoing, 0)
            .await
            .unwrap();
        assert!(store.is_chat_protected(ChatId(1)).await.unwrap());

        store.revoke_file(ChatId(1), "f1.jpg").await.unwrap();
        assert!(!store.is_chat_protected(ChatId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_chat_removes_everything() {
        let store = MemoryPolicyStore::new();
        store
            .register_message(media_msg(1, 7), Direction::Outgoing, 0)
            .await
            .unwrap();
        store
            .register_message(media_msg(2, 8), Direction::Outgoing, 0)
            .await
            .unwrap();

        assert!(store.delete_chat(ChatId(7)).await.unwrap());
        assert!(!store.delete_chat(ChatId(7)).await.unwrap());

        assert_eq!(
            store
                .file_access_state(ChatId(7), "f1.jpg", Direction::Outgoing, 0)
                .await
                .unwrap(),
            AccessState::NotFound
        );
        assert!(!store.is_msg_protected(ChatId(7), MsgId(1)).await.unwrap());
        // Other chats untouched.
        assert!(store.is_chat_protected(ChatId(8)).await.unwrap());
    }
}
