//! Error types for the key store.

use sealkit_core::ChatId;
use thiserror::Error;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeysError {
    /// No key record exists for the chat.
    #[error("no key material for {0}")]
    ChatNotFound(ChatId),

    /// Peer split-key exchange has not reached its threshold.
    #[error("peer keys incomplete: {have}/{need} shares")]
    KeyNotReady { have: usize, need: usize },

    /// No session parameters exist for the file.
    #[error("no session parameters for file: {0}")]
    OtspNotFound(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    Decryption(String),
}

/// Result type for key operations.
pub type Result<T> = std::result::Result<T, KeysError>;
