//! Key boxes: a symmetric key encrypted for one recipient.
//!
//! The box key is agreed by X25519 between the sender's secret and the
//! recipient's public key, so the recipient opens it with its own secret
//! and the sender's public key. The relay stores boxes but cannot open them.

use serde::{Deserialize, Serialize};

use hyperspace_core::encoding::hex_vec;
use hyperspace_core::{AccountId, KeyId};

use crate::crypto::{BoxNonce, X25519PublicKey, X25519StaticSecret};
use crate::error::{KeysError, Result};

/// Derivation context for key box encryption keys.
const KEY_BOX_CONTEXT: &str = "hyperspace 2024-01 key box v1";

/// Ciphertext and nonce produced by [`encrypt_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    #[serde(with = "hex_vec")]
    pub ciphertext: Vec<u8>,
    pub nonce: BoxNonce,
}

/// Encrypt `key` from `sender_secret` to `recipient_public`.
///
/// A fresh nonce is drawn for every call.
pub fn encrypt_key(
    sender_secret: &X25519StaticSecret,
    recipient_public: &X25519PublicKey,
    key: &[u8],
) -> Result<EncryptedKey> {
    let wrap_key = sender_secret
        .diffie_hellman(recipient_public)
        .derive_encryption_key(KEY_BOX_CONTEXT);
    let nonce = BoxNonce::generate();
    let ciphertext = wrap_key.encrypt(key, &nonce)?;
    Ok(EncryptedKey { ciphertext, nonce })
}

/// Open a box sent by `sender_public` to the holder of `recipient_secret`.
pub fn decrypt_key_box(
    ciphertext: &[u8],
    nonce: &BoxNonce,
    sender_public: &X25519PublicKey,
    recipient_secret: &X25519StaticSecret,
) -> Result<Vec<u8>> {
    let wrap_key = recipient_secret
        .diffie_hellman(sender_public)
        .derive_encryption_key(KEY_BOX_CONTEXT);
    wrap_key.decrypt(ciphertext, nonce)
}

/// A key encrypted for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBox {
    /// Recipient.
    pub account_id: AccountId,
    #[serde(with = "hex_vec")]
    pub ciphertext: Vec<u8>,
    pub nonce: BoxNonce,
    /// Sender's encryption public key, needed to open the box.
    pub author_public_key: X25519PublicKey,
}

impl KeyBox {
    /// Box `key` for `account_id`.
    pub fn seal(
        account_id: AccountId,
        recipient_public: &X25519PublicKey,
        sender_secret: &X25519StaticSecret,
        key: &[u8],
    ) -> Result<Self> {
        let EncryptedKey { ciphertext, nonce } = encrypt_key(sender_secret, recipient_public, key)?;
        Ok(Self {
            account_id,
            ciphertext,
            nonce,
            author_public_key: sender_secret.public_key(),
        })
    }

    /// Open with the recipient's secret.
    pub fn open(&self, recipient_secret: &X25519StaticSecret) -> Result<Vec<u8>> {
        decrypt_key_box(
            &self.ciphertext,
            &self.nonce,
            &self.author_public_key,
            recipient_secret,
        )
    }

    /// Attach the key generation this box carries.
    pub fn with_key_id(self, id: KeyId) -> KeyBoxWithKeyId {
        KeyBoxWithKeyId {
            id,
            account_id: self.account_id,
            ciphertext: self.ciphertext,
            nonce: self.nonce,
            author_public_key: self.author_public_key,
        }
    }
}

/// A key box tagged with the key generation it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBoxWithKeyId {
    /// Key generation id.
    pub id: KeyId,
    pub account_id: AccountId,
    #[serde(with = "hex_vec")]
    pub ciphertext: Vec<u8>,
    pub nonce: BoxNonce,
    pub author_public_key: X25519PublicKey,
}

impl KeyBoxWithKeyId {
    pub fn key_box(&self) -> KeyBox {
        KeyBox {
            account_id: self.account_id.clone(),
            ciphertext: self.ciphertext.clone(),
            nonce: self.nonce,
            author_public_key: self.author_public_key,
        }
    }

    /// Open with the recipient's secret.
    pub fn open(&self, recipient_secret: &X25519StaticSecret) -> Result<Vec<u8>> {
        decrypt_key_box(
            &self.ciphertext,
            &self.nonce,
            &self.author_public_key,
            recipient_secret,
        )
    }
}

/// Ensure a decrypted key has the expected length.
pub(crate) fn expect_key_len(bytes: Vec<u8>) -> Result<[u8; 32]> {
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        KeysError::DecryptionError(format!("invalid key length: expected 32, got {len}"))
    })
}
