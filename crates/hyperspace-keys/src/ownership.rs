//! Identity ownership proofs.
//!
//! Registering an identity takes two signatures: the wallet signs over the
//! new signature key (account proof) and the new key signs over the account
//! (key proof). A stolen key or a compromised wallet alone cannot produce both.

use serde::{Deserialize, Serialize};

use hyperspace_core::{
    recover_personal_address, recover_personal_signer, AccountId, RecoverableSignature,
    SignaturePublicKey, WalletSigner,
};

use crate::error::Result;
use crate::identity::IdentityKeys;

/// Message the wallet signs.
pub fn account_proof_message(account_id: &AccountId, key: &SignaturePublicKey) -> String {
    format!(
        "This message proves I am the owner of the account {} and the public key {}",
        account_id,
        key.to_hex()
    )
}

/// Message the new signature key signs.
pub fn key_proof_message(account_id: &AccountId, key: &SignaturePublicKey) -> String {
    format!(
        "The public key {} is owned by the account {}",
        key.to_hex(),
        account_id
    )
}

/// Both halves of an ownership proof, as 65-byte Ethereum signatures in hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipProof {
    pub account_proof: String,
    pub key_proof: String,
}

/// Produce the dual proof binding `keys` to `account_id`.
pub fn prove_identity_ownership(
    signer: &impl WalletSigner,
    account_id: &AccountId,
    keys: &IdentityKeys,
) -> Result<OwnershipProof> {
    let key = keys.signature_public_key();
    let account_proof = signer.sign_message(&account_proof_message(account_id, &key))?;
    let key_proof = keys
        .signature
        .sign_personal(key_proof_message(account_id, &key).as_bytes())?;
    Ok(OwnershipProof {
        account_proof: account_proof.to_eth_hex(),
        key_proof: key_proof.to_eth_hex(),
    })
}

/// Check both halves. Any malformed or mismatched input is `false`.
pub fn verify_identity_ownership(
    account_id: &AccountId,
    signature_public_key: &SignaturePublicKey,
    account_proof: &str,
    key_proof: &str,
) -> bool {
    let Ok(account_sig) = RecoverableSignature::from_eth_hex(account_proof) else {
        return false;
    };
    let Ok(key_sig) = RecoverableSignature::from_eth_hex(key_proof) else {
        return false;
    };

    let wallet = recover_personal_address(
        &account_proof_message(account_id, signature_public_key),
        &account_sig,
    );
    let signer = recover_personal_signer(
        &key_proof_message(account_id, signature_public_key),
        &key_sig,
    );

    matches!((wallet, signer), (Ok(w), Ok(k)) if &w == account_id && &k == signature_public_key)
}
