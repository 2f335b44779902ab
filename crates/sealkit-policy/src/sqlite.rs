//! SQLite implementation of the PolicyStore trait.
//!
//! This is the primary storage backend for the engine. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking. Mutations
//! load the record, apply the change in Rust, and write it back inside one
//! transaction, so evaluation semantics are identical to the in-memory
//! store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use sealkit_core::{
    AccessState, AccessWindow, ChatId, ContactId, Direction, MsgId, ProtectionState, RecipientId,
};

use crate::error::{PolicyError, Result};
use crate::migration;
use crate::record::{ForwardGrant, MessageBinding, NewMessage, ProtectedFileRecord};
use crate::traits::{AttributeScope, FileAttributeUpdate, PolicyStore, RegisterOutcome};

/// SQLite-based policy store.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqlitePolicyStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePolicyStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path.as_ref())?;
        migration::migrate(&mut conn)?;
        debug!(path = %path.as_ref().display(), "opened policy database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                PolicyError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            PolicyError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Row conversion
// ─────────────────────────────────────────────────────────────────────────

fn direction_code(direction: Direction) -> i64 {
    if direction.is_outgoing() {
        0
    } else {
        1
    }
}

fn encode_recipients(recipients: &[RecipientId]) -> Result<Vec<u8>> {
    let names: Vec<&str> = recipients.iter().map(|r| r.as_str()).collect();
    let mut buf = Vec::new();
    ciborium::into_writer(&names, &mut buf)
        .map_err(|e| PolicyError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_recipients(blob: &[u8]) -> Result<Vec<RecipientId>> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    let names: Vec<String> = ciborium::from_reader(blob)
        .map_err(|e| PolicyError::InvalidData(format!("forwarded_to blob: {}", e)))?;
    Ok(names.into_iter().map(RecipientId::new).collect())
}

/// Load one record (with its forward grants) by logical name or path.
fn load_record(
    conn: &Connection,
    chat: ChatId,
    file: &str,
    direction: Direction,
) -> Result<Option<ProtectedFileRecord>> {
    let row = conn
        .query_row(
            "SELECT file_name, file_path, state, can_download, can_forward,
                    window_start, window_end, forward_gate, forwarded_to,
                    created_at, updated_at
             FROM protected_files
             WHERE chat_id = ?1 AND direction = ?2
               AND (file_name = ?3 OR file_path = ?3)",
            params![chat.0, direction_code(direction), file],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, Vec<u8>>(8)?,
                    row.get::<_, i64>(9)?,
                    row.get::<_, i64>(10)?,
                ))
            },
        )
        .optional()?;

    let Some((
        file_name,
        file_path,
        state_code,
        can_download,
        can_forward,
        window_start,
        window_end,
        forward_gate,
        forwarded_blob,
        created_at,
        updated_at,
    )) = row
    else {
        return Ok(None);
    };

    let state = ProtectionState::from_code(state_code as u8)
        .ok_or_else(|| PolicyError::InvalidData(format!("protection state {}", state_code)))?;

    let mut grants_stmt = conn.prepare(
        "SELECT recipient, allowed, can_download, window_start, window_end
         FROM forward_grants
         WHERE chat_id = ?1 AND file_name = ?2 AND direction = ?3",
    )?;
    let forward_grants: HashMap<RecipientId, ForwardGrant> = grants_stmt
        .query_map(
            params![chat.0, &file_name, direction_code(direction)],
            |row| {
                let recipient: String = row.get(0)?;
                Ok((
                    RecipientId::new(recipient),
                    ForwardGrant {
                        allowed: row.get(1)?,
                        can_download: row.get(2)?,
                        window: AccessWindow {
                            start_ms: row.get(3)?,
                            end_ms: row.get(4)?,
                        },
                    },
                ))
            },
        )?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;

    Ok(Some(ProtectedFileRecord {
        chat,
        file_name,
        file_path,
        direction,
        state,
        can_download,
        can_forward,
        window: AccessWindow {
            start_ms: window_start,
            end_ms: window_end,
        },
        forward_gate,
        forward_grants,
        forwarded_to: decode_recipients(&forwarded_blob)?,
        created_at_ms: created_at,
        updated_at_ms: updated_at,
    }))
}

/// Write a record and its forward grants back. Caller supplies the
/// transaction; grants are replaced wholesale.
fn save_record(conn: &Connection, record: &ProtectedFileRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO protected_files (
            chat_id, file_name, direction, file_path, state,
            can_download, can_forward, window_start, window_end,
            forward_gate, forwarded_to, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(chat_id, file_name, direction) DO UPDATE SET
            file_path = excluded.file_path,
            state = excluded.state,
            can_download = excluded.can_download,
            can_forward = excluded.can_forward,
            window_start = excluded.window_start,
            window_end = excluded.window_end,
            forward_gate = excluded.forward_gate,
            forwarded_to = excluded.forwarded_to,
            updated_at = excluded.updated_at",
        params![
            record.chat.0,
            &record.file_name,
            direction_code(record.direction),
            &record.file_path,
            record.state.code() as i64,
            record.can_download,
            record.can_forward,
            record.window.start_ms,
            record.window.end_ms,
            record.forward_gate,
            encode_recipients(&record.forwarded_to)?,
            record.created_at_ms,
            record.updated_at_ms,
        ],
    )?;

    conn.execute(
        "DELETE FROM forward_grants WHERE chat_id = ?1 AND file_name = ?2 AND direction = ?3",
        params![record.chat.0, &record.file_name, direction_code(record.direction)],
    )?;
    for (recipient, grant) in &record.forward_grants {
        conn.execute(
            "INSERT INTO forward_grants (
                chat_id, file_name, direction, recipient,
                allowed, can_download, window_start, window_end
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.chat.0,
                &record.file_name,
                direction_code(record.direction),
                recipient.as_str(),
                grant.allowed,
                grant.can_download,
                grant.window.start_ms,
                grant.window.end_ms,
            ],
        )?;
    }

    Ok(())
}

fn row_to_binding(chat: ChatId, row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageBinding> {
    let media_path: Option<String> = row.get("media_path")?;
    let file_name: Option<String> = row.get("file_name")?;
    Ok(MessageBinding {
        msg: MsgId(row.get("msg_id")?),
        chat,
        from: ContactId(row.get("from_id")?),
        msg_text: row.get("msg_text")?,
        msg_type: row.get("msg_type")?,
        media: media_path.zip(file_name),
        sent_protected: row.get("sent_protected")?,
        chat_capable: row.get("chat_capable")?,
        created_at_ms: row.get("created_at")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────
// Trait implementation
// ─────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn register_message(
        &self,
        msg: NewMessage,
        direction: Direction,
        now_ms: i64,
    ) -> Result<RegisterOutcome> {
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM message_bindings WHERE chat_id = ?1 AND msg_id = ?2)",
                params![msg.chat.0, msg.msg.0],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(RegisterOutcome::Duplicate);
            }

            let binding = msg.binding(now_ms);
            tx.execute(
                "INSERT INTO message_bindings (
                    chat_id, msg_id, from_id, msg_text, msg_type,
                    media_path, file_name, sent_protected, chat_capable, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    binding.chat.0,
                    binding.msg.0,
                    binding.from.0,
                    &binding.msg_text,
                    &binding.msg_type,
                    binding.media.as_ref().map(|(p, _)| p.as_str()),
                    binding.media.as_ref().map(|(_, n)| n.as_str()),
                    binding.sent_protected,
                    binding.chat_capable,
                    binding.created_at_ms,
                ],
            )?;

            if msg.has_media() {
                let existing = load_record(&tx, msg.chat, &msg.file_name, direction)?;
                if existing.is_none() {
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
                    save_record(&tx, &record)?;
                }
            }

            tx.commit()?;
            Ok(RegisterOutcome::Created)
        })
        .await
    }

    async fn ensure_file_record(&self, record: ProtectedFileRecord) -> Result<()> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            if load_record(&tx, record.chat, &record.file_name, record.direction)?.is_none() {
                save_record(&tx, &record)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn file_access_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        now_ms: i64,
    ) -> Result<AccessState> {
        let file = file.to_owned();
        self.blocking(move |conn| {
            Ok(load_record(conn, chat, &file, direction)?
                .map(|r| r.access_state(now_ms))
                .unwrap_or(AccessState::NotFound))
        })
        .await
    }

    async fn forward_access_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: Option<&RecipientId>,
        now_ms: i64,
    ) -> Result<AccessState> {
        let file = file.to_owned();
        let recipient = recipient.cloned();
        self.blocking(move |conn| {
            Ok(load_record(conn, chat, &file, direction)?
                .map(|r| r.forward_access_state(recipient.as_ref(), now_ms))
                .unwrap_or(AccessState::NotFound))
        })
        .await
    }

    async fn get_record(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
    ) -> Result<Option<ProtectedFileRecord>> {
        let file = file.to_owned();
        self.blocking(move |conn| load_record(conn, chat, &file, direction))
            .await
    }

    async fn get_binding(&self, chat: ChatId, msg: MsgId) -> Result<Option<MessageBinding>> {
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT msg_id, from_id, msg_text, msg_type, media_path, file_name,
                        sent_protected, chat_capable, created_at
                 FROM message_bindings WHERE chat_id = ?1 AND msg_id = ?2",
                params![chat.0, msg.0],
                |row| row_to_binding(chat, row),
            )
            .optional()
            .map_err(PolicyError::from)
        })
        .await
    }

    async fn is_msg_protected(&self, chat: ChatId, msg: MsgId) -> Result<bool> {
        self.blocking(move |conn| {
            let protected: Option<bool> = conn
                .query_row(
                    "SELECT sent_protected FROM message_bindings
                     WHERE chat_id = ?1 AND msg_id = ?2",
                    params![chat.0, msg.0],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(protected.unwrap_or(false))
        })
        .await
    }

    async fn is_chat_protected(&self, chat: ChatId) -> Result<bool> {
        self.blocking(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM protected_files
                               WHERE chat_id = ?1 AND state != ?2)",
                params![chat.0, ProtectionState::Revoked.code() as i64],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
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
        let file = file.to_owned();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(mut record) = load_record(&tx, chat, &file, direction)? else {
                return Ok(false);
            };

            match scope {
                AttributeScope::Chat => {
                    record.can_download = update.download;
                    record.can_forward = update.forward;
                    record.window.renew(now_ms, update.access_time_secs);
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

            save_record(&tx, &record)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn set_forward_gate(&self, chat: ChatId, file: &str, grant: bool) -> Result<bool> {
        let file = file.to_owned();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE protected_files SET forward_gate = ?3
                 WHERE chat_id = ?1 AND (file_name = ?2 OR file_path = ?2)",
                params![chat.0, &file, grant],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn record_forwarded(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        recipient: RecipientId,
    ) -> Result<bool> {
        let file = file.to_owned();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(mut record) = load_record(&tx, chat, &file, direction)? else {
                return Ok(false);
            };
            record.forwarded_to.push(recipient);
            save_record(&tx, &record)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn mark_state(
        &self,
        chat: ChatId,
        file: &str,
        direction: Direction,
        next: ProtectionState,
    ) -> Result<()> {
        let file = file.to_owned();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut record = load_record(&tx, chat, &file, direction)?
                .ok_or_else(|| PolicyError::NotFound(format!("{chat} {direction} {file}")))?;
            record.state.transition(next)?;
            save_record(&tx, &record)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn revoke_file(&self, chat: ChatId, file: &str) -> Result<bool> {
        let file = file.to_owned();
        self.blocking(move |conn| {
            // Idempotent: revoked rows stay revoked, the state check only
            // guards against counting them as fresh transitions.
            let changed = conn.execute(
                "UPDATE protected_files SET state = ?3
                 WHERE chat_id = ?1 AND (file_name = ?2 OR file_path = ?2)",
                params![chat.0, &file, ProtectionState::Revoked.code() as i64],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_chat(&self, chat: ChatId) -> Result<bool> {
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let files = tx.execute(
                "DELETE FROM protected_files WHERE chat_id = ?1",
                params![chat.0],
            )?;
            tx.execute(
                "DELETE FROM forward_grants WHERE chat_id = ?1",
                params![chat.0],
            )?;
            let bindings = tx.execute(
                "DELETE FROM message_bindings WHERE chat_id = ?1",
                params![chat.0],
            )?;
            tx.commit()?;
            Ok(files > 0 || bindings > 0)
        })
        .await
    }
}
