//! Error types for sealkit-core.

use thiserror::Error;

use crate::state::ProtectionState;

/// Errors from pure core computations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Illegal protection-state transition.
    #[error("invalid protection state transition: {from} -> {to}")]
    InvalidTransition {
        from: ProtectionState,
        to: ProtectionState,
    },

    /// A value failed validation at the API boundary.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}
