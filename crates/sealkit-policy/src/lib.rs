//! # sealkit-policy
//!
//! The policy store: per-file protection records, message bindings, and
//! access evaluation for the sealkit engine.
//!
//! ## Overview
//!
//! Each protected file is one [`ProtectedFileRecord`], keyed by
//! (chat, file, direction). The record holds the protection state machine,
//! the download/forward flags, the access window, the chat-level forward
//! gate, and per-recipient forward grants. Messages that reference media are
//! bound to their record via [`MessageBinding`].
//!
//! Storage is abstracted behind the [`PolicyStore`] trait, with
//! [`SqlitePolicyStore`] as the persistent backend and [`MemoryPolicyStore`]
//! for tests.
//!
//! ## Evaluation
//!
//! Access evaluation is a pure function of the record and `now`:
//! revoked beats expired beats no-grant. Forward access additionally
//! requires the two-factor gate: the chat-level forward gate AND the
//! per-recipient grant.
//!
//! ## Design Notes
//!
//! - **Idempotent registration**: registering the same message id twice
//!   returns `Duplicate` and creates nothing.
//! - **Atomic attribute updates**: flags and window change together or not
//!   at all; a torn update is never observable.
//! - **Revocation is terminal**: a revoked record rejects every subsequent
//!   state transition.

pub mod error;
pub mod memory;
pub mod migration;
pub mod record;
pub mod sqlite;
pub mod traits;

pub use error::{PolicyError, Result};
pub use memory::MemoryPolicyStore;
pub use record::{ForwardGrant, MessageBinding, NewMessage, ProtectedFileRecord};
pub use sqlite::SqlitePolicyStore;
pub use traits::{AttributeScope, FileAttributeUpdate, PolicyStore, RegisterOutcome};
