//! Space events: the signed, hash-linked entries of a space's chain.
//!
//! An event is immutable once signed. Changes to a space are new events
//! appended to its chain.

use serde::{Deserialize, Serialize};

use crate::canonical::{event_canonical_bytes, event_signing_bytes};
use crate::crypto::{RecoverableSignature, SignatureKeypair, SignaturePublicKey};
use crate::encoding::{hex_array, hex_vec};
use crate::error::{CoreError, ValidationError};
use crate::inbox::InboxAuthPolicy;
use crate::types::{AccountId, EventHash, InboxId, KeyId, SpaceId};

/// Root event. Its id is the id of the space it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpace {
    pub id: SpaceId,
    /// The initial key generation.
    pub key_id: KeyId,
}

/// Invite an account, shipping it one key box per active key generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitation {
    pub id: String,
    pub previous_event_hash: EventHash,
    pub invitee_account_id: AccountId,
    /// Key generations the accompanying key boxes cover.
    pub key_ids: Vec<KeyId>,
}

/// Accept the outstanding invitation addressed to the author's account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInvitation {
    pub id: String,
    pub previous_event_hash: EventHash,
}

/// Open an inbox owned by the space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpaceInbox {
    pub id: String,
    pub previous_event_hash: EventHash,
    pub inbox_id: InboxId,
    /// X25519 key senders encrypt to.
    #[serde(with = "hex_array")]
    pub encryption_public_key: [u8; 32],
    /// The inbox secret key, sealed under a space key generation.
    #[serde(with = "hex_vec")]
    pub secret_key: Vec<u8>,
    pub is_public: bool,
    pub auth_policy: InboxAuthPolicy,
}

/// Add a key generation. New content is sealed under it from here on.
///
/// The accompanying key boxes deliver the new key to every member and every
/// pending invitee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateKey {
    pub id: String,
    pub previous_event_hash: EventHash,
    pub key_id: KeyId,
}

/// The typed payload of an event, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Transaction {
    CreateSpace(CreateSpace),
    CreateInvitation(CreateInvitation),
    AcceptInvitation(AcceptInvitation),
    CreateSpaceInbox(CreateSpaceInbox),
    RotateKey(RotateKey),
}

impl Transaction {
    /// Root event for a new space.
    pub fn create_space(space_id: SpaceId, key_id: KeyId) -> Self {
        Transaction::CreateSpace(CreateSpace {
            id: space_id,
            key_id,
        })
    }

    /// Invitation extending `previous_event_hash`.
    pub fn create_invitation(
        previous_event_hash: EventHash,
        invitee_account_id: AccountId,
        key_ids: Vec<KeyId>,
    ) -> Self {
        Transaction::CreateInvitation(CreateInvitation {
            id: random_event_id(),
            previous_event_hash,
            invitee_account_id,
            key_ids,
        })
    }

    /// Acceptance extending `previous_event_hash`.
    pub fn accept_invitation(previous_event_hash: EventHash) -> Self {
        Transaction::AcceptInvitation(AcceptInvitation {
            id: random_event_id(),
            previous_event_hash,
        })
    }

    /// Key rotation extending `previous_event_hash`.
    pub fn rotate_key(previous_event_hash: EventHash, key_id: KeyId) -> Self {
        Transaction::RotateKey(RotateKey {
            id: random_event_id(),
            previous_event_hash,
            key_id,
        })
    }

    /// The wire tag of this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::CreateSpace(_) => "create-space",
            Transaction::CreateInvitation(_) => "create-invitation",
            Transaction::AcceptInvitation(_) => "accept-invitation",
            Transaction::CreateSpaceInbox(_) => "create-space-inbox",
            Transaction::RotateKey(_) => "rotate-key",
        }
    }

    /// The event id.
    pub fn id(&self) -> &str {
        match self {
            Transaction::CreateSpace(t) => t.id.as_str(),
            Transaction::CreateInvitation(t) => &t.id,
            Transaction::AcceptInvitation(t) => &t.id,
            Transaction::CreateSpaceInbox(t) => &t.id,
            Transaction::RotateKey(t) => &t.id,
        }
    }

    /// Hash of the predecessor. `None` only for the root event.
    pub fn previous_event_hash(&self) -> Option<EventHash> {
        match self {
            Transaction::CreateSpace(_) => None,
            Transaction::CreateInvitation(t) => Some(t.previous_event_hash),
            Transaction::AcceptInvitation(t) => Some(t.previous_event_hash),
            Transaction::CreateSpaceInbox(t) => Some(t.previous_event_hash),
            Transaction::RotateKey(t) => Some(t.previous_event_hash),
        }
    }
}

/// Who signed an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAuthor {
    pub account_id: AccountId,
    pub signature_public_key: SignaturePublicKey,
}

/// A signed space event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceEvent {
    pub transaction: Transaction,
    pub author: EventAuthor,
    pub signature: RecoverableSignature,
}

impl SpaceEvent {
    /// Sign a transaction as `account_id` with its signature key.
    pub fn sign(
        transaction: Transaction,
        account_id: AccountId,
        keypair: &SignatureKeypair,
    ) -> Result<Self, CoreError> {
        let mut event = SpaceEvent {
            transaction,
            author: EventAuthor {
                account_id,
                signature_public_key: keypair.public_key(),
            },
            signature: RecoverableSignature {
                hex: [0u8; 64],
                recovery: 0,
            },
        };
        event.signature = keypair.sign(&event_signing_bytes(&event))?;
        Ok(event)
    }

    /// Content hash over the canonical bytes, signature included.
    pub fn hash(&self) -> EventHash {
        EventHash::digest(&event_canonical_bytes(self))
    }

    /// Recover the key that signed this event.
    pub fn recover_signer(&self) -> Result<SignaturePublicKey, CoreError> {
        self.signature.recover(&event_signing_bytes(self))
    }

    /// Check the signature against the declared author key.
    pub fn verify_signature(&self) -> Result<(), ValidationError> {
        let recovered = self
            .recover_signer()
            .map_err(|_| ValidationError::SignatureFailed)?;
        if recovered != self.author.signature_public_key {
            return Err(ValidationError::SignatureFailed);
        }
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        self.transaction.kind()
    }

    pub fn previous_event_hash(&self) -> Option<EventHash> {
        self.transaction.previous_event_hash()
    }
}

fn random_event_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
