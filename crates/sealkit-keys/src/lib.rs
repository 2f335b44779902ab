//! # sealkit-keys
//!
//! Key material management for the sealkit protection engine.
//!
//! ## Overview
//!
//! Each chat owns one [`ChatKeyRecord`]: a local root secret, an X25519
//! static secret for peer key agreement, and the accumulated peer split
//! keys. Per-file content keys are derived from the chat root key; they are
//! never stored.
//!
//! ## Key Model
//!
//! 1. **Chat root key**: 256-bit secret created on the first protected
//!    operation for a chat.
//! 2. **File key**: derived per (chat, file name) via Blake3 keyed
//!    derivation; encrypts the file content with ChaCha20-Poly1305.
//! 3. **OTSP** (one-time session parameters): ephemeral wrap material for a
//!    file key. Regenerating the OTSP rotates the wrapping without touching
//!    the file ciphertext - used when access windows are renewed.
//! 4. **Peer split keys**: shares contributed by the peer; protection
//!    operations that require peer keys wait until the threshold captured at
//!    chat creation is met ([`SplitKeyState`]).

pub mod crypto;
pub mod error;
pub mod otsp;
pub mod split;
pub mod store;

pub use crypto::{FileKey, SealNonce, SharedKey, X25519PublicKey, X25519StaticSecret};
pub use error::{KeysError, Result};
pub use otsp::{Otsp, WrappedFileKey};
pub use split::{PeerShare, SplitKeyState};
pub use store::{ChatKeyRecord, KeyStore};
