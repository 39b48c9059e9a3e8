//! Records persisted by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hyperspace_core::encoding::{hex_array, hex_vec};
use hyperspace_core::{
    AccountId, EventHash, InboxAuthPolicy, InboxId, RecoverableSignature, SignaturePublicKey,
    SpaceEvent, SpaceId, SpaceInbox,
};
use hyperspace_keys::{IdentityKeyBox, KeyBoxWithKeyId, X25519PublicKey};

/// The first event of a new space with the creator's key boxes.
#[derive(Debug, Clone)]
pub struct NewSpace {
    pub space_id: SpaceId,
    pub event: SpaceEvent,
    pub hash: EventHash,
    pub key_boxes: Vec<KeyBoxWithKeyId>,
}

/// A validated event extending a space's chain.
///
/// The store re-checks `expected_tip` inside its write transaction and
/// derives membership, invitation and inbox rows from the event.
#[derive(Debug, Clone)]
pub struct ChainAppend {
    pub space_id: SpaceId,
    pub event: SpaceEvent,
    pub hash: EventHash,
    pub expected_tip: EventHash,
    pub key_boxes: Vec<KeyBoxWithKeyId>,
}

/// Outcome of [`crate::Store::append_space_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendResult {
    /// Stored at this position (0-based).
    Appended { seq: u64 },
    /// The tip moved. Nothing was written.
    Conflict { current_tip: Option<EventHash> },
}

/// An outstanding invitation, as listed for the invitee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationRecord {
    /// Id of the `create-invitation` event.
    pub id: String,
    pub space_id: SpaceId,
    pub invitee_account_id: AccountId,
    pub inviter_account_id: AccountId,
}

/// An update as submitted, before a clock is assigned.
#[derive(Debug, Clone)]
pub struct NewUpdate {
    pub update_id: String,
    pub account_id: AccountId,
    pub update: Vec<u8>,
    pub signature: RecoverableSignature,
}

/// A persisted update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUpdate {
    pub clock: u64,
    pub update_id: String,
    pub account_id: AccountId,
    #[serde(with = "hex_vec")]
    pub update: Vec<u8>,
    pub signature: RecoverableSignature,
}

/// A registered identity: public keys, ownership proofs and encrypted backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub account_id: AccountId,
    pub signature_public_key: SignaturePublicKey,
    pub encryption_public_key: X25519PublicKey,
    pub account_proof: String,
    pub key_proof: String,
    pub key_box: IdentityKeyBox,
}

/// An inbox owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInboxRecord {
    pub account_id: AccountId,
    pub inbox_id: InboxId,
    pub is_public: bool,
    pub auth_policy: InboxAuthPolicy,
    #[serde(with = "hex_array")]
    pub encryption_public_key: [u8; 32],
    /// Owner's signature over the inbox parameters.
    pub signature: RecoverableSignature,
}

/// An inbox owned by a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceInboxRecord {
    pub space_id: SpaceId,
    #[serde(flatten)]
    pub inbox: SpaceInbox,
}

/// A message posted to an inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxMessageRecord {
    pub id: String,
    pub inbox_id: InboxId,
    /// Opaque, encoded by the sender.
    pub ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<RecoverableSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_account_id: Option<AccountId>,
    pub created_at: DateTime<Utc>,
}
