//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{PolicyError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(PolicyError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Per-file protection records. One row per (chat, file, direction).
        CREATE TABLE protected_files (
            chat_id INTEGER NOT NULL,
            file_name TEXT NOT NULL,
            direction INTEGER NOT NULL,       -- 0=outgoing, 1=incoming
            file_path TEXT NOT NULL,
            state INTEGER NOT NULL,           -- ProtectionState as u8
            can_download INTEGER NOT NULL,
            can_forward INTEGER NOT NULL,
            window_start INTEGER NOT NULL,    -- Unix ms
            window_end INTEGER NOT NULL,      -- Unix ms
            forward_gate INTEGER NOT NULL DEFAULT 0,
            forwarded_to BLOB NOT NULL,       -- CBOR array of recipient ids
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,

            PRIMARY KEY (chat_id, file_name, direction)
        );

        -- Per-recipient forward grants, child rows of protected_files.
        CREATE TABLE forward_grants (
            chat_id INTEGER NOT NULL,
            file_name TEXT NOT NULL,
            direction INTEGER NOT NULL,
            recipient TEXT NOT NULL,
            allowed INTEGER NOT NULL,
            can_download INTEGER NOT NULL,
            window_start INTEGER NOT NULL,
            window_end INTEGER NOT NULL,

            PRIMARY KEY (chat_id, file_name, direction, recipient)
        );

        -- Message bindings: which messages carry protected content.
        CREATE TABLE message_bindings (
            chat_id INTEGER NOT NULL,
            msg_id INTEGER NOT NULL,
            from_id INTEGER NOT NULL,
            msg_text TEXT NOT NULL,
            msg_type TEXT NOT NULL,
            media_path TEXT,                  -- nullable for text-only messages
            file_name TEXT,
            sent_protected INTEGER NOT NULL DEFAULT 0,
            chat_capable INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,

            PRIMARY KEY (chat_id, msg_id)
        );

        -- Indexes for common queries
        CREATE INDEX idx_files_chat ON protected_files(chat_id);
        CREATE INDEX idx_files_path ON protected_files(chat_id, file_path);
        CREATE INDEX idx_bindings_chat ON message_bindings(chat_id);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        // Verify tables exist
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"protected_files".to_string()));
        assert!(tables.contains(&"forward_grants".to_string()));
        assert!(tables.contains(&"message_bindings".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap(); // Should not error
        migrate(&mut conn).unwrap(); // Still should not error

        // Verify version is 1
        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, 1);
    }
}
