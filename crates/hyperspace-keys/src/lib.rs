//! # Hyperspace Keys
//!
//! Identity keys and encrypted key distribution.
//!
//! ## Encryption Model
//!
//! Space content uses a two-layer key model:
//!
//! 1. **Key generation**: a symmetric key (XChaCha20-Poly1305) that seals
//!    updates and inbox secrets for the whole space
//! 2. **Key boxes**: each generation is wrapped per member via X25519 ECDH
//!    between the sender's and the recipient's encryption keys
//!
//! Adding a member means shipping boxes for the current generations. The
//! relay stores boxes and never holds a usable key.
//!
//! ## Identities
//!
//! An identity is a secp256k1 signature key plus an X25519 encryption key,
//! bound to a wallet account by a dual [`ownership`] proof and backed up as
//! an [`IdentityKeyBox`] unlocked by a wallet signature.

pub mod crypto;
pub mod error;
pub mod identity;
pub mod identity_box;
pub mod keybox;
pub mod keyring;
pub mod ownership;

pub use crypto::{BoxNonce, EncryptionKey, SharedKey, X25519PublicKey, X25519StaticSecret};
pub use error::{KeysError, Result};
pub use identity::{create_identity, ExportedKeys, Identity, IdentityKeys, PublicIdentity};
pub use identity_box::{identity_box_message, IdentityKeyBox};
pub use keybox::{decrypt_key_box, encrypt_key, EncryptedKey, KeyBox, KeyBoxWithKeyId};
pub use keyring::{KeyGeneration, SealedPayload, SpaceKeyring};
pub use ownership::{
    account_proof_message, key_proof_message, prove_identity_ownership,
    verify_identity_ownership, OwnershipProof,
};
