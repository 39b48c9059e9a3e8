//! Encryption primitives.
//!
//! Provides X25519 key agreement and XChaCha20-Poly1305 authenticated encryption.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};

use hyperspace_core::encoding::{array_from_hex, hex_array, to_hex_prefixed};

use crate::error::{KeysError, Result};

/// An X25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(#[serde(with = "hex_array")] pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_hex_prefixed(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        array_from_hex(s)
            .map(Self)
            .map_err(|e| KeysError::InvalidKey(e.to_string()))
    }

    /// Convert to x25519-dalek PublicKey.
    pub fn to_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519PublicKey({})", &self.to_hex()[..18])
    }
}

/// An X25519 static secret key.
///
/// Only for key agreement. Signing uses the secp256k1 identity key.
#[derive(Clone)]
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Get the raw secret bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Perform key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> SharedKey {
        let shared = self.0.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

impl fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519StaticSecret({:?})", self.public_key())
    }
}

/// A shared secret derived from X25519 key agreement.
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive an encryption key from this shared secret under `context`.
    pub fn derive_encryption_key(&self, context: &str) -> EncryptionKey {
        EncryptionKey(blake3::derive_key(context, &self.0))
    }
}

/// A 256-bit symmetric key for XChaCha20-Poly1305.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeysError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt data with this key.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &BoxNonce) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| KeysError::EncryptionError(e.to_string()))?;

        let nonce = XNonce::from_slice(&nonce.0);
        cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| KeysError::EncryptionError(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &BoxNonce) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| KeysError::DecryptionError(e.to_string()))?;

        let nonce = XNonce::from_slice(&nonce.0);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| KeysError::DecryptionError("authentication failed".into()))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// A 192-bit nonce for XChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxNonce(#[serde(with = "hex_array")] pub [u8; 24]);

impl BoxNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 24];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 24]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 24] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x25519_key_agreement() {
        // Alice generates a static key
        let alice_secret = X25519StaticSecret::generate();
        let alice_public = alice_secret.public_key();

        // Bob generates a static key
        let bob_secret = X25519StaticSecret::generate();
        let bob_public = bob_secret.public_key();

        // Both derive the same shared secret
        let alice_shared = alice_secret.diffie_hellman(&bob_public);
        let bob_shared = bob_secret.diffie_hellman(&alice_public);

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = EncryptionKey::generate();
        let nonce = BoxNonce::generate();
        let plaintext = b"hello, world!";

        let ciphertext = key.encrypt(plaintext, &nonce).unwrap();
        assert_ne!(ciphertext, plaintext);

        let decrypted = key.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        let nonce = BoxNonce::generate();

        let ciphertext = key1.encrypt(b"secret", &nonce).unwrap();

        // Wrong key should fail
        assert!(matches!(
            key2.decrypt(&ciphertext, &nonce),
            Err(KeysError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_decrypt_wrong_nonce_fails() {
        let key = EncryptionKey::generate();
        let ciphertext = key.encrypt(b"secret", &BoxNonce::generate()).unwrap();
        assert!(key.decrypt(&ciphertext, &BoxNonce::generate()).is_err());
    }

    #[test]
    fn test_key_derivation_different_contexts() {
        let shared = SharedKey([0x42; 32]);

        let key1 = shared.derive_encryption_key("context-a");
        let key2 = shared.derive_encryption_key("context-b");

        assert_ne!(key1.as_bytes(), key2.as_bytes());
        assert_eq!(
            key1.as_bytes(),
            shared.derive_encryption_key("context-a").as_bytes()
        );
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let pk = X25519StaticSecret::generate().public_key();
        assert_eq!(X25519PublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
        let json = serde_json::to_string(&pk).unwrap();
        assert!(json.starts_with("\"0x"));
    }
}
