//! Cryptographic building blocks for the key store.
//!
//! X25519 key agreement for peer share material, Blake3 keyed derivation for
//! file keys, and ChaCha20-Poly1305 for content encryption.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{KeysError, Result};

/// An X25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// An X25519 static secret, held per chat for peer key agreement.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> SharedKey {
        let shared = self.0.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

/// A shared secret from X25519 key agreement.
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a file key from this shared secret, domain-separated by
    /// context.
    pub fn derive_file_key(&self, context: &[u8]) -> FileKey {
        let mut hasher = blake3::Hasher::new_derive_key("sealkit-v1-peer-wrap");
        hasher.update(&self.0);
        hasher.update(context);
        FileKey(*hasher.finalize().as_bytes())
    }
}

/// A 256-bit ChaCha20-Poly1305 key protecting file content.
#[derive(Clone)]
pub struct FileKey([u8; 32]);

impl FileKey {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the per-file content key from a chat root key.
    ///
    /// Deterministic for a given (root, file name), so the key never needs
    /// to be stored alongside the ciphertext.
    pub fn derive_for_file(root: &FileKey, file_name: &str) -> FileKey {
        let mut hasher = blake3::Hasher::new_derive_key("sealkit-v1-file-key");
        hasher.update(&root.0);
        hasher.update(file_name.as_bytes());
        FileKey(*hasher.finalize().as_bytes())
    }

    /// Encrypt plaintext under this key.
    pub fn seal(&self, plaintext: &[u8], nonce: &SealNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| KeysError::Encryption(e.to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| KeysError::Encryption(e.to_string()))
    }

    /// Decrypt ciphertext under this key.
    pub fn open(&self, ciphertext: &[u8], nonce: &SealNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| KeysError::Decryption(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce.0), ciphertext)
            .map_err(|e| KeysError::Decryption(e.to_string()))
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealNonce(pub [u8; 12]);

impl SealNonce {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 12];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x25519_agreement_symmetric() {
        let a = X25519StaticSecret::generate();
        let b = X25519StaticSecret::generate();

        let ab = a.diffie_hellman(&b.public_key());
        let ba = b.diffie_hellman(&a.public_key());

        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = FileKey::generate();
        let nonce = SealNonce::generate();
        let plaintext = b"attachment bytes";

        let ciphertext = key.seal(plaintext, &nonce).unwrap();
        assert_ne!(&ciphertext, plaintext);

        let opened = key.open(&ciphertext, &nonce).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_open_wrong_key_fails() {
        let key = FileKey::generate();
        let wrong = FileKey::generate();
        let nonce = SealNonce::generate();

        let ciphertext = key.seal(b"secret", &nonce).unwrap();
        assert!(wrong.open(&ciphertext, &nonce).is_err());
    }

    #[test]
    fn test_file_key_derivation_deterministic() {
        let root = FileKey::from_bytes([0x42; 32]);

        let k1 = FileKey::derive_for_file(&root, "photo.jpg");
        let k2 = FileKey::derive_for_file(&root, "photo.jpg");
        let other = FileKey::derive_for_file(&root, "video.mp4");

        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(k1.as_bytes(), other.as_bytes());
    }

    #[test]
    fn test_peer_wrap_derivation_contexts_differ() {
        let shared = SharedKey([0x11; 32]);
        let a = shared.derive_file_key(b"ctx-a");
        let b = shared.derive_file_key(b"ctx-b");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
