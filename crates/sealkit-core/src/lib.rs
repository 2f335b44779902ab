//! # sealkit-core
//!
//! Pure primitives for the sealkit protection engine: identifiers, access
//! state, access windows, and the per-file protection state machine.
//!
//! This crate contains no I/O, no storage, no crypto. It is pure computation
//! over policy data. Time is always passed in explicitly as Unix
//! milliseconds; the [`Clock`] trait exists so callers can inject a time
//! source.
//!
//! ## Key Types
//!
//! - [`ChatId`], [`MsgId`], [`ContactId`], [`RecipientId`] - host identifiers
//! - [`Direction`] - whether a file was sent or received in a chat
//! - [`AccessState`] - the result of evaluating access policy for a file
//! - [`AccessWindow`] - the time interval during which grants are honored
//! - [`ProtectionState`] - the per-file encryption lifecycle state machine

pub mod clock;
pub mod error;
pub mod state;
pub mod types;
pub mod version;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use state::ProtectionState;
pub use types::{AccessState, ChatId, ContactId, Direction, MsgId, RecipientId};
pub use version::{is_compatible_header, protocol_header, ENGINE_VERSION, PROTOCOL_TAG};
pub use window::AccessWindow;
