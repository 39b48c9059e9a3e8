//! Signed CRDT updates.
//!
//! The relay never reads update contents. It only checks that the update
//! was signed by the member who claims it.

use crate::canonical::{bytes, canonical_map, domains, text};
use crate::crypto::{RecoverableSignature, SignatureKeypair, SignaturePublicKey};
use crate::error::CoreError;
use crate::types::{AccountId, SpaceId};

/// Bytes a member signs when submitting an update.
pub fn update_signing_bytes(
    space_id: &SpaceId,
    update_id: &str,
    account_id: &AccountId,
    update: &[u8],
) -> Vec<u8> {
    canonical_map(vec![
        (0, text(domains::UPDATE)),
        (1, text(space_id.as_str())),
        (2, text(update_id)),
        (3, text(account_id.as_str())),
        (4, bytes(update)),
    ])
}

/// Sign an update.
pub fn sign_update(
    space_id: &SpaceId,
    update_id: &str,
    account_id: &AccountId,
    update: &[u8],
    keypair: &SignatureKeypair,
) -> Result<RecoverableSignature, CoreError> {
    keypair.sign(&update_signing_bytes(space_id, update_id, account_id, update))
}

/// Recover the key that signed an update.
pub fn recover_update_signer(
    space_id: &SpaceId,
    update_id: &str,
    account_id: &AccountId,
    update: &[u8],
    signature: &RecoverableSignature,
) -> Result<SignaturePublicKey, CoreError> {
    signature.recover(&update_signing_bytes(space_id, update_id, account_id, update))
}
