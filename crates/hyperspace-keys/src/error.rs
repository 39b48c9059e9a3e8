//! Error types for key handling.

use thiserror::Error;

use hyperspace_core::KeyId;

/// Errors that can occur while creating, wrapping or unwrapping keys.
#[derive(Debug, Error)]
pub enum KeysError {
    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption failed: tampered ciphertext, wrong key or wrong nonce.
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Key material of the wrong shape.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// No generation with this id in the keyring.
    #[error("unknown key generation: {0}")]
    UnknownKeyGeneration(KeyId),

    /// The keyring has no generations.
    #[error("keyring is empty")]
    EmptyKeyring,

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] hyperspace_core::CoreError),
}

/// Result type for key operations.
pub type Result<T> = std::result::Result<T, KeysError>;
