//! Error types for the protection engine.

use sealkit_core::{AccessState, CoreError};
use sealkit_keys::KeysError;
use sealkit_policy::PolicyError;
use thiserror::Error;

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The access window has elapsed.
    Expired,
    /// No grant covers the requested operation.
    NoGrant,
    /// The record was revoked; terminal.
    Revoked,
}

impl DenialReason {
    /// Map a non-allowed access state to its denial reason.
    ///
    /// `Allowed` and `NotFound` have no denial reason; callers handle those
    /// before converting.
    pub fn from_state(state: AccessState) -> Option<Self> {
        match state {
            AccessState::DeniedExpired => Some(Self::Expired),
            AccessState::DeniedNoGrant => Some(Self::NoGrant),
            AccessState::DeniedRevoked => Some(Self::Revoked),
            AccessState::Allowed | AccessState::NotFound => None,
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "access window expired"),
            Self::NoGrant => write!(f, "no grant"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No record for the addressed file.
    #[error("protected file not found")]
    NotFound,

    /// Peer split-key threshold not yet met.
    #[error("peer keys not ready: {have}/{need} shares")]
    KeyNotReady { have: usize, need: usize },

    /// Access denied by policy.
    #[error("access denied: {0}")]
    AccessDenied(DenialReason),

    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownConfigKey(String),

    /// Configuration value failed to parse or is out of range.
    #[error("invalid config value for {key}: {value}")]
    InvalidConfigValue { key: String, value: String },

    /// Sealed envelope is unreadable or corrupt.
    #[error("invalid sealed file: {0}")]
    InvalidFile(String),

    /// Policy storage error.
    #[error("storage error: {0}")]
    Storage(#[from] PolicyError),

    /// Key material error.
    #[error("key error: {0}")]
    Keys(#[from] KeysError),

    /// Core state-machine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_reason_from_state() {
        assert_eq!(
            DenialReason::from_state(AccessState::DeniedExpired),
            Some(DenialReason::Expired)
        );
        assert_eq!(
            DenialReason::from_state(AccessState::DeniedNoGrant),
            Some(DenialReason::NoGrant)
        );
        assert_eq!(
            DenialReason::from_state(AccessState::DeniedRevoked),
            Some(DenialReason::Revoked)
        );
        assert_eq!(DenialReason::from_state(AccessState::Allowed), None);
        assert_eq!(DenialReason::from_state(AccessState::NotFound), None);
    }
}
