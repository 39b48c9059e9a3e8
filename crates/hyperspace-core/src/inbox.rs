//! Inbox sender policies and signer recovery.
//!
//! An inbox decides per message whether a signature and author are
//! forbidden, required, or optional. When present, the signer is recovered
//! from the signature so the caller can compare it with the identity
//! registered for the claimed author.

use serde::{Deserialize, Serialize};

use crate::canonical::{bytes, canonical_map, domains, text};
use crate::crypto::{RecoverableSignature, SignatureKeypair, SignaturePublicKey};
use crate::error::{CoreError, InboxError};
use crate::types::{AccountId, InboxId, SpaceId};

/// Who may post to an inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxAuthPolicy {
    /// Signature and author must be absent.
    Anonymous,
    /// Signature and author are both present or both absent.
    OptionalAuth,
    /// Signature and author must be present.
    RequiresAuth,
}

impl InboxAuthPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxAuthPolicy::Anonymous => "anonymous",
            InboxAuthPolicy::OptionalAuth => "optional_auth",
            InboxAuthPolicy::RequiresAuth => "requires_auth",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "anonymous" => Some(InboxAuthPolicy::Anonymous),
            "optional_auth" => Some(InboxAuthPolicy::OptionalAuth),
            "requires_auth" => Some(InboxAuthPolicy::RequiresAuth),
            _ => None,
        }
    }
}

/// A signed message claim: the author and signature to be verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedClaim {
    pub author_account_id: AccountId,
    pub signature: RecoverableSignature,
}

/// Check a message's signature/author pair against `policy`.
///
/// Returns the claim to verify, or `None` for an anonymous post.
pub fn check_auth_policy(
    policy: InboxAuthPolicy,
    signature: Option<&RecoverableSignature>,
    author_account_id: Option<&AccountId>,
) -> Result<Option<SignedClaim>, InboxError> {
    match (policy, signature, author_account_id) {
        (InboxAuthPolicy::Anonymous, None, None) => Ok(None),
        (InboxAuthPolicy::Anonymous, _, _) => Err(InboxError::PolicyViolation(
            "signature and authorAccountId must be absent for anonymous inboxes".into(),
        )),
        (InboxAuthPolicy::RequiresAuth, None, None) => Err(InboxError::PolicyViolation(
            "signature and authorAccountId are required for requires_auth inboxes".into(),
        )),
        (InboxAuthPolicy::OptionalAuth, None, None) => Ok(None),
        (_, Some(signature), Some(author)) => Ok(Some(SignedClaim {
            author_account_id: author.clone(),
            signature: *signature,
        })),
        (_, Some(_), None) => Err(InboxError::PolicyViolation(
            "authorAccountId is required when a signature is provided".into(),
        )),
        (_, None, Some(_)) => Err(InboxError::PolicyViolation(
            "signature is required when authorAccountId is provided".into(),
        )),
    }
}

/// Where an inbox lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InboxScope {
    Space(SpaceId),
    Account(AccountId),
}

/// Bytes an author signs when posting to an inbox.
pub fn inbox_message_signing_bytes(
    scope: &InboxScope,
    inbox_id: &InboxId,
    ciphertext: &[u8],
    author_account_id: &AccountId,
) -> Vec<u8> {
    let (domain, owner) = match scope {
        InboxScope::Space(space_id) => (domains::SPACE_INBOX_MESSAGE, space_id.as_str()),
        InboxScope::Account(account_id) => (domains::ACCOUNT_INBOX_MESSAGE, account_id.as_str()),
    };
    canonical_map(vec![
        (0, text(domain)),
        (1, text(owner)),
        (2, text(inbox_id.as_str())),
        (3, bytes(ciphertext)),
        (4, text(author_account_id.as_str())),
    ])
}

/// Sign an inbox message as `author_account_id`.
pub fn sign_inbox_message(
    scope: &InboxScope,
    inbox_id: &InboxId,
    ciphertext: &[u8],
    author_account_id: &AccountId,
    keypair: &SignatureKeypair,
) -> Result<RecoverableSignature, CoreError> {
    keypair.sign(&inbox_message_signing_bytes(
        scope,
        inbox_id,
        ciphertext,
        author_account_id,
    ))
}

/// Recover the signer of a message posted to a space inbox.
pub fn recover_space_inbox_message_signer(
    space_id: &SpaceId,
    inbox_id: &InboxId,
    ciphertext: &[u8],
    claim: &SignedClaim,
) -> Result<SignaturePublicKey, InboxError> {
    let message = inbox_message_signing_bytes(
        &InboxScope::Space(space_id.clone()),
        inbox_id,
        ciphertext,
        &claim.author_account_id,
    );
    Ok(claim.signature.recover(&message)?)
}

/// Recover the signer of a message posted to an account inbox.
pub fn recover_account_inbox_message_signer(
    account_id: &AccountId,
    inbox_id: &InboxId,
    ciphertext: &[u8],
    claim: &SignedClaim,
) -> Result<SignaturePublicKey, InboxError> {
    let message = inbox_message_signing_bytes(
        &InboxScope::Account(account_id.clone()),
        inbox_id,
        ciphertext,
        &claim.author_account_id,
    );
    Ok(claim.signature.recover(&message)?)
}

/// Bytes an account signs when opening one of its own inboxes.
pub fn account_inbox_signing_bytes(
    account_id: &AccountId,
    inbox_id: &InboxId,
    is_public: bool,
    auth_policy: InboxAuthPolicy,
    encryption_public_key: &[u8; 32],
) -> Vec<u8> {
    canonical_map(vec![
        (0, text(domains::ACCOUNT_INBOX)),
        (1, text(account_id.as_str())),
        (2, text(inbox_id.as_str())),
        (3, ciborium::value::Value::Bool(is_public)),
        (4, text(auth_policy.as_str())),
        (5, bytes(encryption_public_key)),
    ])
}
