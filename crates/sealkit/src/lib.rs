//! # sealkit
//!
//! Per-chat, per-file content protection: encryption, access windows,
//! forward grants, and terminal revocation.
//!
//! ## Overview
//!
//! The engine sits between a messaging host and its media files:
//!
//! - **Sealing**: file content is encrypted with a per-file key derived
//!   from the chat's root key; the sealed artifact lives at `<path>.sealed`.
//! - **Policy**: each protected file has one record per direction holding
//!   its state machine, download/forward flags, access window, and
//!   per-recipient forward grants.
//! - **Check-then-act**: access is evaluated before plaintext is produced
//!   and re-checked under the record lock.
//! - **Revocation is terminal**: a revoked record denies everything,
//!   forever, and rejects all further state transitions.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealkit::{EngineConfig, ProtectionEngine};
//! use sealkit::core::{ChatId, Direction};
//! use std::path::Path;
//!
//! async fn example() {
//!     let (engine, mut events) =
//!         ProtectionEngine::open(Path::new("/data/sealkit"), EngineConfig::default()).unwrap();
//!
//!     let sealed = engine
//!         .encrypt_file(
//!             ChatId(1),
//!             Path::new("/media/photo.jpg"),
//!             "photo.jpg",
//!             Direction::Outgoing,
//!             true,
//!         )
//!         .await
//!         .unwrap();
//!
//!     let plain = engine
//!         .decrypt_file(ChatId(1), &sealed, "photo.jpg", Direction::Outgoing)
//!         .await
//!         .unwrap();
//!
//!     let _ = (plain, events.recv().await);
//!     engine.shutdown();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `sealkit::core` - Core types (ids, access states, windows, clock)
//! - `sealkit::keys` - Key material (root keys, split keys, OTSP)
//! - `sealkit::policy` - Policy storage (records, bindings, stores)

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod revoke;

// Re-export component crates
pub use sealkit_core as core;
pub use sealkit_keys as keys;
pub use sealkit_policy as policy;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use engine::{ProtectionEngine, SealedFile, DB_FILE, SEALED_SUFFIX};
pub use error::{DenialReason, EngineError, Result};
pub use events::{EngineEvent, EventSender};
pub use revoke::RevocationManager;

// Re-export commonly used component types
pub use sealkit_core::{
    AccessState, AccessWindow, ChatId, Clock, ContactId, Direction, ManualClock, MsgId,
    ProtectionState, RecipientId, SystemClock,
};
pub use sealkit_policy::{
    AttributeScope, FileAttributeUpdate, NewMessage, PolicyStore, RegisterOutcome,
};

/// Engine version (the crate version).
pub fn version() -> &'static str {
    sealkit_core::ENGINE_VERSION
}

/// Whether a peer's protocol header is compatible with this engine.
pub fn is_chat_version(header: &str) -> bool {
    sealkit_core::is_compatible_header(header)
}
