//! Encrypted identity backup.
//!
//! The private keys are sealed under a key derived from a wallet signature
//! over a fixed message. Wallet signatures are deterministic (RFC 6979), so
//! the owner can re-derive the key on any device; the server only stores
//! the box.

use serde::{Deserialize, Serialize};

use hyperspace_core::encoding::hex_vec;
use hyperspace_core::{AccountId, RecoverableSignature, SignatureKeypair, WalletSigner};

use crate::crypto::{BoxNonce, EncryptionKey, X25519StaticSecret};
use crate::error::{KeysError, Result};
use crate::identity::IdentityKeys;

const IDENTITY_BOX_CONTEXT: &str = "hyperspace 2024-01 identity box v1";

/// Message the wallet signs to unlock the backup.
pub fn identity_box_message(account_id: &AccountId) -> String {
    format!("Sign this message to unlock the Hyperspace identity of {account_id}")
}

/// Private keys sealed for backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityKeyBox {
    #[serde(with = "hex_vec")]
    pub ciphertext: Vec<u8>,
    pub nonce: BoxNonce,
}

fn backup_key(wallet_signature: &RecoverableSignature) -> EncryptionKey {
    EncryptionKey::from_bytes(blake3::derive_key(
        IDENTITY_BOX_CONTEXT,
        &wallet_signature.to_eth_bytes(),
    ))
}

impl IdentityKeyBox {
    /// Seal `keys` under a wallet signature of [`identity_box_message`].
    pub fn seal(keys: &IdentityKeys, wallet_signature: &RecoverableSignature) -> Result<Self> {
        let mut plaintext = Vec::with_capacity(64);
        plaintext.extend_from_slice(&keys.signature.secret_bytes());
        plaintext.extend_from_slice(&keys.encryption.to_bytes());

        let nonce = BoxNonce::generate();
        let ciphertext = backup_key(wallet_signature).encrypt(&plaintext, &nonce)?;
        Ok(Self { ciphertext, nonce })
    }

    /// Sign the unlock message with `wallet` and seal.
    pub fn seal_with_wallet(
        keys: &IdentityKeys,
        wallet: &impl WalletSigner,
        account_id: &AccountId,
    ) -> Result<Self> {
        let signature = wallet.sign_message(&identity_box_message(account_id))?;
        Self::seal(keys, &signature)
    }

    /// Recover the keys.
    pub fn open(&self, wallet_signature: &RecoverableSignature) -> Result<IdentityKeys> {
        let plaintext = backup_key(wallet_signature).decrypt(&self.ciphertext, &self.nonce)?;
        if plaintext.len() != 64 {
            return Err(KeysError::DecryptionError(format!(
                "invalid identity box length: {}",
                plaintext.len()
            )));
        }
        let mut signature = [0u8; 32];
        let mut encryption = [0u8; 32];
        signature.copy_from_slice(&plaintext[..32]);
        encryption.copy_from_slice(&plaintext[32..]);
        Ok(IdentityKeys {
            signature: SignatureKeypair::from_bytes(&signature)?,
            encryption: X25519StaticSecret::from_bytes(encryption),
        })
    }
}
