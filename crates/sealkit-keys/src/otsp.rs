//! One-time session parameters (OTSP).
//!
//! An OTSP wraps a file's content key under fresh ephemeral material. The
//! file ciphertext stays put; only the wrapping changes. Regenerating the
//! OTSP when an access window is renewed invalidates any previously shared
//! wrapping without re-encrypting the file.

use serde::{Deserialize, Serialize};

use crate::crypto::{FileKey, SealNonce};
use crate::error::{KeysError, Result};

/// A file key wrapped under an OTSP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedFileKey {
    pub nonce: SealNonce,
    pub ciphertext: Vec<u8>,
}

/// One-time session parameters for a single protected file.
pub struct Otsp {
    wrap_key: FileKey,
    /// Generation counter; bumped on every refresh.
    generation: u64,
}

impl Otsp {
    /// Generate fresh parameters (generation 0).
    pub fn generate() -> Self {
        Self {
            wrap_key: FileKey::generate(),
            generation: 0,
        }
    }

    /// Replace the wrap material, invalidating prior wrappings.
    pub fn refresh(&mut self) {
        self.wrap_key = FileKey::generate();
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wrap a file key under the current parameters.
    pub fn wrap(&self, file_key: &FileKey) -> Result<WrappedFileKey> {
        let nonce = SealNonce::generate();
        let ciphertext = self.wrap_key.seal(file_key.as_bytes(), &nonce)?;
        Ok(WrappedFileKey { nonce, ciphertext })
    }

    /// Unwrap a file key. Fails for wrappings made under older generations.
    pub fn unwrap_key(&self, wrapped: &WrappedFileKey) -> Result<FileKey> {
        let bytes = self.wrap_key.open(&wrapped.ciphertext, &wrapped.nonce)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeysError::Decryption("wrapped key has wrong length".into()))?;
        Ok(FileKey::from_bytes(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let otsp = Otsp::generate();
        let file_key = FileKey::generate();

        let wrapped = otsp.wrap(&file_key).unwrap();
        let unwrapped = otsp.unwrap_key(&wrapped).unwrap();

        assert_eq!(file_key.as_bytes(), unwrapped.as_bytes());
    }

    #[test]
    fn test_refresh_invalidates_old_wrapping() {
        let mut otsp = Otsp::generate();
        let file_key = FileKey::generate();

        let wrapped = otsp.wrap(&file_key).unwrap();
        otsp.refresh();

        assert_eq!(otsp.generation(), 1);
        assert!(otsp.unwrap_key(&wrapped).is_err());
    }

    #[test]
    fn test_refresh_keeps_wrapping_current_key() {
        let mut otsp = Otsp::generate();
        let file_key = FileKey::generate();

        otsp.refresh();
        let wrapped = otsp.wrap(&file_key).unwrap();
        let unwrapped = otsp.unwrap_key(&wrapped).unwrap();

        assert_eq!(file_key.as_bytes(), unwrapped.as_bytes());
    }
}
