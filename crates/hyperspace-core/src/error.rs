//! Error types for Hyperspace Core.

use thiserror::Error;

use crate::types::{AccountId, EventHash, InboxId, KeyId};

/// Core errors that can occur during signing, recovery and encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("encoding error: {0}")]
    EncodingError(String),
}

/// Validation errors raised by the space event reducer.
///
/// A failed validation never changes state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The event does not extend the current chain tip.
    #[error("chain conflict: expected previous event {expected:?}, got {got:?}")]
    ChainConflict {
        expected: Option<EventHash>,
        got: Option<EventHash>,
    },

    #[error("signature verification failed")]
    SignatureFailed,

    #[error("account {0} is not a member of this space")]
    NotAMember(AccountId),

    #[error("signature key does not match the key registered for member {0}")]
    AuthorKeyMismatch(AccountId),

    #[error("no outstanding invitation for account {0}")]
    NoInvitation(AccountId),

    #[error("account {0} is already a member")]
    AlreadyMember(AccountId),

    #[error("account {0} already has an outstanding invitation")]
    DuplicateInvitation(AccountId),

    #[error("key boxes must cover the active key generations {expected:?}, got {got:?}")]
    KeyGenerationMismatch { expected: Vec<KeyId>, got: Vec<KeyId> },

    #[error("inbox {0} already exists in this space")]
    DuplicateInbox(InboxId),

    #[error("key generation {0} already exists in this space")]
    DuplicateKeyGeneration(KeyId),

    #[error("event id {0} is already used in this space")]
    DuplicateEventId(String),

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl ValidationError {
    /// Whether the author can resolve this by rebasing onto the new tip.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ValidationError::ChainConflict {
                got: Some(_),
                expected: Some(_)
            }
        )
    }
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature
            | CoreError::InvalidPublicKey
            | CoreError::InvalidSecretKey
            | CoreError::RecoveryFailed => ValidationError::SignatureFailed,
            CoreError::MalformedEvent(msg) | CoreError::EncodingError(msg) => {
                ValidationError::StructuralError(msg)
            }
        }
    }
}

/// Errors from inbox authorization checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InboxError {
    /// The message's signature/author fields violate the inbox policy.
    #[error("{0}")]
    PolicyViolation(String),

    /// The signature could not be recovered.
    #[error("invalid inbox message signature")]
    InvalidSignature,
}

impl From<CoreError> for InboxError {
    fn from(_: CoreError) -> Self {
        InboxError::InvalidSignature
    }
}
