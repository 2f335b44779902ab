//! Engine configuration.
//!
//! Besides the typed struct, a string `set(key, value)` surface exists for
//! hosts that pass configuration through an untyped bridge. Unknown keys and
//! unparsable values are hard errors, never silently ignored.

use crate::error::{EngineError, Result};

/// Configuration for the protection engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default access-window length in seconds for records created without
    /// an explicit timeout. Must be at least 1.
    pub default_access_timeout: u32,
    /// Split-key threshold applied when a chat's key record is created
    /// outside message registration.
    pub peer_share_threshold: u32,
    /// When true, encrypt operations fail with `KeyNotReady` until the
    /// chat's split-key threshold is met.
    pub require_peer_keys: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_access_timeout: 600,
            peer_share_threshold: 2,
            require_peer_keys: false,
        }
    }
}

impl EngineConfig {
    /// Apply one string key/value pair.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || EngineError::InvalidConfigValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "default_access_timeout" => {
                let secs: u32 = value.parse().map_err(|_| invalid())?;
                if secs < 1 {
                    return Err(invalid());
                }
                self.default_access_timeout = secs;
            }
            "peer_share_threshold" => {
                self.peer_share_threshold = value.parse().map_err(|_| invalid())?;
            }
            "require_peer_keys" => {
                self.require_peer_keys = value.parse().map_err(|_| invalid())?;
            }
            _ => return Err(EngineError::UnknownConfigKey(key.to_string())),
        }
        Ok(())
    }
}
