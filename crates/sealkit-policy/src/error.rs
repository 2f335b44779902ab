//! Error types for the policy store.

use thiserror::Error;

/// Errors that can occur during policy store operations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record/binding serialization error (CBOR blob columns).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No record for the queried (chat, file, direction).
    #[error("record not found: {0}")]
    NotFound(String),

    /// Stored data failed to decode.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Illegal protection-state transition.
    #[error(transparent)]
    Transition(#[from] sealkit_core::CoreError),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for policy store operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
