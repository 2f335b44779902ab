//! Revocation: terminal, fail-closed cascades.
//!
//! The policy transition commits first; cascade steps (session-parameter
//! drops, key deletion) run after. A failed cascade step never un-revokes
//! anything - the record stays revoked and a `CascadeIncomplete` warning
//! event is emitted.

use tracing::{debug, warn};

use sealkit_core::{ChatId, Direction};
use sealkit_keys::KeysError;
use sealkit_policy::PolicyStore;

use crate::engine::ProtectionEngine;
use crate::error::Result;
use crate::events::EngineEvent;

/// Handle for revocation and deletion, borrowed from the engine.
pub struct RevocationManager<'e, S: PolicyStore> {
    engine: &'e ProtectionEngine<S>,
}

impl<S: PolicyStore> ProtectionEngine<S> {
    /// The revocation surface of this engine.
    pub fn revocation(&self) -> RevocationManager<'_, S> {
        RevocationManager { engine: self }
    }
}

impl<S: PolicyStore> RevocationManager<'_, S> {
    /// Revoke every record matching the file in the chat. Idempotent:
    /// revoking an already-revoked file succeeds. Returns false only when
    /// nothing matches.
    pub async fn revoke_messages(&self, chat: ChatId, file: &str) -> Result<bool> {
        let revoked = self.engine.policy.revoke_file(chat, file).await?;
        if !revoked {
            return Ok(false);
        }

        // Cascade: drop session parameters under each matching record's
        // stored path, the key every rotation uses. The revocation above is
        // already committed; a failure here only degrades to a warning.
        let mut paths = Vec::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            if let Some(record) = self.engine.policy.get_record(chat, file, direction).await? {
                paths.push(record.file_path);
            }
        }
        for path in paths {
            match self.engine.keys.drop_otsp(chat, &path) {
                Ok(_) => {}
                // No key material for the chat means nothing to drop.
                Err(KeysError::ChatNotFound(_)) => {}
                Err(e) => {
                    warn!(%chat, path, error = %e, "otsp drop failed after revocation");
                    self.engine.events.emit(EngineEvent::CascadeIncomplete {
                        chat,
                        detail: format!("otsp drop for {}: {}", path, e),
                    });
                }
            }
        }

        debug!(%chat, file, "revoked");
        self.engine.events.emit(EngineEvent::FileRevoked {
            chat,
            file: file.to_string(),
        });
        Ok(true)
    }

    /// Remove every record, binding and all key material for a chat.
    /// Returns false when the chat was entirely unknown.
    pub async fn delete_chat(&self, chat: ChatId) -> Result<bool> {
        let had_policy = self.engine.policy.delete_chat(chat).await?;
        let had_keys = self.engine.keys.delete_chat_keys(chat);
        self.engine.prune_chat_locks(chat);

        let existed = had_policy || had_keys;
        if existed {
            debug!(%chat, "deleted chat");
            self.engine.events.emit(EngineEvent::ChatDeleted { chat });
        }
        Ok(existed)
    }
}
