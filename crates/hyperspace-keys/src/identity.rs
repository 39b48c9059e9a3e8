//! Identity keys: one signature keypair and one encryption keypair per account.

use serde::{Deserialize, Serialize};

use hyperspace_core::encoding::hex_array;
use hyperspace_core::{AccountId, SignatureKeypair, SignaturePublicKey};

use crate::crypto::{X25519PublicKey, X25519StaticSecret};
use crate::error::Result;

/// The private key material of an identity. Never leaves the device unencrypted.
#[derive(Clone, Debug)]
pub struct IdentityKeys {
    pub signature: SignatureKeypair,
    pub encryption: X25519StaticSecret,
}

impl IdentityKeys {
    pub fn signature_public_key(&self) -> SignaturePublicKey {
        self.signature.public_key()
    }

    pub fn encryption_public_key(&self) -> X25519PublicKey {
        self.encryption.public_key()
    }

    /// Serializable form, for the client-side identity store.
    pub fn export(&self) -> ExportedKeys {
        ExportedKeys {
            signature_public_key: self.signature_public_key(),
            signature_private_key: self.signature.secret_bytes(),
            encryption_public_key: self.encryption_public_key(),
            encryption_private_key: self.encryption.to_bytes(),
        }
    }

    /// Rebuild from an export.
    pub fn import(exported: &ExportedKeys) -> Result<Self> {
        Ok(Self {
            signature: SignatureKeypair::from_bytes(&exported.signature_private_key)?,
            encryption: X25519StaticSecret::from_bytes(exported.encryption_private_key),
        })
    }
}

/// Generate a fresh identity: a secp256k1 signature keypair and an X25519
/// encryption keypair.
pub fn create_identity() -> IdentityKeys {
    IdentityKeys {
        signature: SignatureKeypair::generate(),
        encryption: X25519StaticSecret::generate(),
    }
}

/// An identity bound to the account that owns it.
#[derive(Clone, Debug)]
pub struct Identity {
    pub account_id: AccountId,
    pub keys: IdentityKeys,
}

impl Identity {
    pub fn public(&self) -> PublicIdentity {
        PublicIdentity {
            account_id: self.account_id.clone(),
            signature_public_key: self.keys.signature_public_key(),
            encryption_public_key: self.keys.encryption_public_key(),
        }
    }
}

/// What anyone may learn about an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    pub account_id: AccountId,
    pub signature_public_key: SignaturePublicKey,
    pub encryption_public_key: X25519PublicKey,
}

/// Private keys in wire form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedKeys {
    pub signature_public_key: SignaturePublicKey,
    #[serde(with = "hex_array")]
    pub signature_private_key: [u8; 32],
    pub encryption_public_key: X25519PublicKey,
    #[serde(with = "hex_array")]
    pub encryption_private_key: [u8; 32],
}

impl std::fmt::Debug for ExportedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedKeys")
            .field("signature_public_key", &self.signature_public_key)
            .field("encryption_public_key", &self.encryption_public_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_identity_is_random() {
        let a = create_identity();
        let b = create_identity();
        assert_ne!(a.signature_public_key(), b.signature_public_key());
        assert_ne!(a.encryption_public_key(), b.encryption_public_key());
    }

    #[test]
    fn test_export_import() {
        let keys = create_identity();
        let json = serde_json::to_string(&keys.export()).unwrap();
        let exported: ExportedKeys = serde_json::from_str(&json).unwrap();
        let back = IdentityKeys::import(&exported).unwrap();
        assert_eq!(back.signature_public_key(), keys.signature_public_key());
        assert_eq!(back.encryption_public_key(), keys.encryption_public_key());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let exported = create_identity().export();
        let secret_hex = hex::encode(exported.signature_private_key);
        assert!(!format!("{exported:?}").contains(&secret_hex));
    }
}
