//! Strong type definitions for sealkit.
//!
//! All host-facing identifiers are newtypes to prevent misuse at compile
//! time. The host application hands us plain integers and strings; we wrap
//! them at the boundary and never look inside.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a chat in the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat:{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Identifier of a message in the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsgId(pub i64);

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg:{}", self.0)
    }
}

impl From<i64> for MsgId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Identifier of a contact (message sender) in the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub i64);

impl From<i64> for ContactId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Identifier of a forward recipient.
///
/// The host addresses forward recipients by an opaque string (typically an
/// address or contact handle), not by `ContactId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipientId(pub String);

impl RecipientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecipientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Direction of a protected file relative to the local account.
///
/// The same logical file name can exist in both directions within one chat
/// (a file we sent and a copy we received back), so direction is part of the
/// record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// A file the local account sent.
    Outgoing,
    /// A file the local account received.
    Incoming,
}

impl Direction {
    pub fn is_outgoing(&self) -> bool {
        matches!(self, Direction::Outgoing)
    }

    /// The host bridge encodes direction as a bool.
    pub fn from_outgoing(outgoing: bool) -> Self {
        if outgoing {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outgoing => write!(f, "outgoing"),
            Direction::Incoming => write!(f, "incoming"),
        }
    }
}

/// The result of evaluating access policy for a protected file.
///
/// Encoded as a small integer for the host. Denial reasons are ordered by
/// precedence: a revoked record reports `DeniedRevoked` even if its window
/// has also expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccessState {
    /// Access is currently permitted.
    Allowed = 0,
    /// The access window has elapsed.
    DeniedExpired = 1,
    /// The relevant grant flag is off (or no recipient grant exists).
    DeniedNoGrant = 2,
    /// The file has been revoked. Terminal.
    DeniedRevoked = 3,
    /// No record exists for the queried (chat, file, direction).
    NotFound = 4,
}

impl AccessState {
    /// The integer encoding handed to the host.
    pub const fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AccessState::Allowed),
            1 => Some(AccessState::DeniedExpired),
            2 => Some(AccessState::DeniedNoGrant),
            3 => Some(AccessState::DeniedRevoked),
            4 => Some(AccessState::NotFound),
            _ => None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessState::Allowed)
    }
}

impl fmt::Display for AccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessState::Allowed => "allowed",
            AccessState::DeniedExpired => "denied (access window expired)",
            AccessState::DeniedNoGrant => "denied (no grant)",
            AccessState::DeniedRevoked => "denied (revoked)",
            AccessState::NotFound => "not found",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_state_codes_roundtrip() {
        for code in 0u8..=4 {
            let state = AccessState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(AccessState::from_code(5), None);
    }

    #[test]
    fn test_direction_from_bool() {
        assert_eq!(Direction::from_outgoing(true), Direction::Outgoing);
        assert_eq!(Direction::from_outgoing(false), Direction::Incoming);
        assert!(Direction::Outgoing.is_outgoing());
    }

    #[test]
    fn test_only_allowed_is_allowed() {
        assert!(AccessState::Allowed.is_allowed());
        assert!(!AccessState::DeniedExpired.is_allowed());
        assert!(!AccessState::DeniedNoGrant.is_allowed());
        assert!(!AccessState::DeniedRevoked.is_allowed());
        assert!(!AccessState::NotFound.is_allowed());
    }
}
