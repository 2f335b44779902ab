//! The per-file protection state machine.
//!
//! Each protected file record carries one of these states. Encrypted and
//! Decrypted are stable and re-enterable (a file may be decrypted many times
//! while its access window is valid). Revoked is terminal: no transition
//! leaves it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Lifecycle state of a protected file.
///
/// ```text
/// Unprotected -> Encrypting -> Encrypted -> Decrypting -> Decrypted
///                                  ^            |             |
///                                  +------------+-------------+
///                   (any non-terminal) -> Revoked   [terminal]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtectionState {
    /// No ciphertext exists yet.
    Unprotected = 0,
    /// Encryption in progress.
    Encrypting = 1,
    /// Ciphertext exists; plaintext released only through policy.
    Encrypted = 2,
    /// Decryption in progress.
    Decrypting = 3,
    /// Plaintext was released under a valid grant.
    Decrypted = 4,
    /// Access permanently removed. No transition leaves this state.
    Revoked = 5,
}

impl ProtectionState {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition(&self, next: ProtectionState) -> bool {
        use ProtectionState::*;
        match (*self, next) {
            // Terminal: nothing leaves Revoked, not even Revoked -> Revoked.
            (Revoked, _) => false,
            // Revocation reaches every live state.
            (_, Revoked) => true,
            (Unprotected, Encrypting) => true,
            (Encrypting, Encrypted) => true,
            // Re-encryption after a key refresh.
            (Encrypted, Encrypting) | (Decrypted, Encrypting) => true,
            (Encrypted, Decrypting) | (Decrypted, Decrypting) => true,
            (Decrypting, Decrypted) => true,
            // Abort paths back to the stable state the operation left.
            (Encrypting, Unprotected) | (Encrypting, Decrypted) => true,
            (Decrypting, Encrypted) => true,
            _ => false,
        }
    }

    /// Apply a transition, or fail with [`CoreError::InvalidTransition`].
    pub fn transition(&mut self, next: ProtectionState) -> Result<(), CoreError> {
        if self.can_transition(next) {
            *self = next;
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self, ProtectionState::Revoked)
    }

    /// Whether ciphertext exists for this file.
    pub fn is_encrypted(&self) -> bool {
        matches!(
            self,
            ProtectionState::Encrypted | ProtectionState::Decrypting | ProtectionState::Decrypted
        )
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use ProtectionState::*;
        match code {
            0 => Some(Unprotected),
            1 => Some(Encrypting),
            2 => Some(Encrypted),
            3 => Some(Decrypting),
            4 => Some(Decrypted),
            5 => Some(Revoked),
            _ => None,
        }
    }

    pub const fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ProtectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtectionState::Unprotected => "unprotected",
            ProtectionState::Encrypting => "encrypting",
            ProtectionState::Encrypted => "encrypted",
            ProtectionState::Decrypting => "decrypting",
            ProtectionState::Decrypted => "decrypted",
            ProtectionState::Revoked => "revoked",
        };
        write!(f, "{}", s)
    }
}
