//! Sync protocol message types.
//!
//! Messages are JSON objects discriminated by a kebab-case `type` field.
//! Binary fields travel as `0x`-prefixed hex.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hyperspace_core::encoding::{hex_array, hex_vec};
use hyperspace_core::{
    AccountId, InboxAuthPolicy, InboxId, KeyId, RecoverableSignature, SpaceEvent, SpaceId,
    SpaceInbox,
};
use hyperspace_keys::{KeyBox, KeyBoxWithKeyId};
use hyperspace_store::{AccountInboxRecord, InboxMessageRecord, InvitationRecord, StoredUpdate};

use crate::error::{Result, SyncError};

/// Message size limits.
pub mod limits {
    /// Max bytes of one inbound text frame.
    pub const MAX_MESSAGE_BYTES: usize = 2 * 1024 * 1024;
    /// Max key boxes shipped with one invitation.
    pub const MAX_KEY_BOXES_PER_INVITATION: usize = 64;
    /// Max bytes of one CRDT update.
    pub const MAX_UPDATE_BYTES: usize = 1024 * 1024;
    /// Max bytes of one inbox message ciphertext.
    pub const MAX_INBOX_MESSAGE_BYTES: usize = 256 * 1024;
}

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Request {
    /// Fetch a space and start receiving its broadcasts.
    SubscribeSpace {
        id: SpaceId,
        /// Only updates with a larger clock are replayed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_known_update_clock: Option<u64>,
    },

    ListSpaces,

    ListInvitations,

    /// Root event plus the creator's key box for the initial generation.
    CreateSpaceEvent {
        space_id: SpaceId,
        event: SpaceEvent,
        key_id: KeyId,
        key_box: KeyBox,
    },

    CreateInvitationEvent {
        space_id: SpaceId,
        event: SpaceEvent,
        key_boxes: Vec<KeyBoxWithKeyId>,
    },

    AcceptInvitationEvent {
        space_id: SpaceId,
        event: SpaceEvent,
    },

    CreateSpaceInboxEvent {
        space_id: SpaceId,
        event: SpaceEvent,
    },

    /// A new key generation, boxed for every member and pending invitee.
    RotateKeyEvent {
        space_id: SpaceId,
        event: SpaceEvent,
        key_boxes: Vec<KeyBoxWithKeyId>,
    },

    CreateUpdate {
        account_id: AccountId,
        #[serde(with = "hex_vec")]
        update: Vec<u8>,
        space_id: SpaceId,
        /// Client-chosen token echoed back as `ephemeralId`.
        update_id: String,
        signature: RecoverableSignature,
    },

    CreateAccountInbox {
        account_id: AccountId,
        inbox_id: InboxId,
        is_public: bool,
        auth_policy: InboxAuthPolicy,
        #[serde(with = "hex_array")]
        encryption_public_key: [u8; 32],
        signature: RecoverableSignature,
    },

    GetAccountInboxes,

    GetLatestSpaceInboxMessages {
        space_id: SpaceId,
        inbox_id: InboxId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<DateTime<Utc>>,
    },

    GetLatestAccountInboxMessages {
        account_id: AccountId,
        inbox_id: InboxId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<DateTime<Utc>>,
    },
}

impl Request {
    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::SubscribeSpace { .. } => "subscribe-space",
            Request::ListSpaces => "list-spaces",
            Request::ListInvitations => "list-invitations",
            Request::CreateSpaceEvent { .. } => "create-space-event",
            Request::CreateInvitationEvent { .. } => "create-invitation-event",
            Request::AcceptInvitationEvent { .. } => "accept-invitation-event",
            Request::CreateSpaceInboxEvent { .. } => "create-space-inbox-event",
            Request::RotateKeyEvent { .. } => "rotate-key-event",
            Request::CreateUpdate { .. } => "create-update",
            Request::CreateAccountInbox { .. } => "create-account-inbox",
            Request::GetAccountInboxes => "get-account-inboxes",
            Request::GetLatestSpaceInboxMessages { .. } => "get-latest-space-inbox-messages",
            Request::GetLatestAccountInboxMessages { .. } => "get-latest-account-inbox-messages",
        }
    }

    /// Parse one inbound frame, enforcing the frame size limit.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() > limits::MAX_MESSAGE_BYTES {
            return Err(SyncError::MessageTooLarge {
                size: text.len(),
                max: limits::MAX_MESSAGE_BYTES,
            });
        }
        let request: Request =
            serde_json::from_str(text).map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
        request.validate_limits()?;
        Ok(request)
    }

    /// Check if this message respects size limits.
    pub fn validate_limits(&self) -> Result<()> {
        match self {
            Request::CreateInvitationEvent { key_boxes, .. } => {
                if key_boxes.len() > limits::MAX_KEY_BOXES_PER_INVITATION {
                    return Err(SyncError::InvalidMessage("too many key boxes".into()));
                }
            }
            Request::CreateUpdate { update, .. } => {
                if update.len() > limits::MAX_UPDATE_BYTES {
                    return Err(SyncError::MessageTooLarge {
                        size: update.len(),
                        max: limits::MAX_UPDATE_BYTES,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A contiguous run of updates, as broadcast and replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Updates {
    pub updates: Vec<StoredUpdate>,
    pub first_update_clock: u64,
    pub last_update_clock: u64,
}

impl Updates {
    /// Wrap clock-ordered updates. `None` when there are none.
    pub fn from_stored(updates: Vec<StoredUpdate>) -> Option<Self> {
        let first_update_clock = updates.first()?.clock;
        let last_update_clock = updates.last()?.clock;
        Some(Self {
            updates,
            first_update_clock,
            last_update_clock,
        })
    }
}

/// Machine-readable failure class carried by `error` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Database,
    ChainConflict,
}

impl ErrorCode {
    /// Whether resubmitting after a refetch can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::ChainConflict)
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Response {
    /// A full space as visible to one account.
    Space {
        id: SpaceId,
        events: Vec<SpaceEvent>,
        /// Only the boxes addressed to the receiving account.
        key_boxes: Vec<KeyBoxWithKeyId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updates: Option<Updates>,
        inboxes: Vec<SpaceInbox>,
    },

    SpaceEvent {
        space_id: SpaceId,
        event: SpaceEvent,
    },

    ListSpaces {
        spaces: Vec<SpaceId>,
    },

    ListInvitations {
        invitations: Vec<InvitationRecord>,
    },

    UpdateConfirmed {
        ephemeral_id: String,
        clock: u64,
        space_id: SpaceId,
    },

    UpdatesNotification {
        updates: Updates,
        space_id: SpaceId,
    },

    AccountInbox {
        inbox: AccountInboxRecord,
    },

    AccountInboxes {
        inboxes: Vec<AccountInboxRecord>,
    },

    SpaceInboxMessages {
        space_id: SpaceId,
        inbox_id: InboxId,
        messages: Vec<InboxMessageRecord>,
    },

    AccountInboxMessages {
        account_id: AccountId,
        inbox_id: InboxId,
        messages: Vec<InboxMessageRecord>,
    },

    SpaceInboxMessage {
        space_id: SpaceId,
        inbox_id: InboxId,
        message: InboxMessageRecord,
    },

    AccountInboxMessage {
        account_id: AccountId,
        inbox_id: InboxId,
        message: InboxMessageRecord,
    },

    Error {
        code: ErrorCode,
        message: String,
        retryable: bool,
    },
}

impl Response {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    /// Serialize for a text frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_subscribe_space() {
        let request = Request::parse(r#"{"type":"subscribe-space","id":"abc"}"#).unwrap();
        assert_eq!(
            request,
            Request::SubscribeSpace {
                id: SpaceId::from("abc"),
                last_known_update_clock: None,
            }
        );

        let request = Request::parse(
            r#"{"type":"subscribe-space","id":"abc","lastKnownUpdateClock":7}"#,
        )
        .unwrap();
        assert!(matches!(
            request,
            Request::SubscribeSpace { last_known_update_clock: Some(7), .. }
        ));
    }

    #[test]
    fn test_parse_unit_variants() {
        assert_eq!(Request::parse(r#"{"type":"list-spaces"}"#).unwrap(), Request::ListSpaces);
        assert_eq!(
            Request::parse(r#"{"type":"get-account-inboxes"}"#).unwrap(),
            Request::GetAccountInboxes
        );
    }

    #[test]
    fn test_parse_create_update_hex() {
        let signature = RecoverableSignature {
            hex: [7u8; 64],
            recovery: 1,
        };
        let text = json!({
            "type": "create-update",
            "accountId": "0xAbC",
            "update": "0x0102",
            "spaceId": "s",
            "updateId": "u1",
            "signature": signature,
        })
        .to_string();
        match Request::parse(&text).unwrap() {
            Request::CreateUpdate { account_id, update, update_id, .. } => {
                assert_eq!(account_id.as_str(), "0xabc");
                assert_eq!(update, vec![1, 2]);
                assert_eq!(update_id, "u1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Request::parse(r#"{"type":"drop-database"}"#).unwrap_err();
        assert!(matches!(err, SyncError::InvalidMessage(_)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let text = "x".repeat(limits::MAX_MESSAGE_BYTES + 1);
        assert!(matches!(
            Request::parse(&text),
            Err(SyncError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_oversized_update_rejected() {
        let request = Request::CreateUpdate {
            account_id: AccountId::new("0xabc"),
            update: vec![0u8; limits::MAX_UPDATE_BYTES + 1],
            space_id: SpaceId::from("s"),
            update_id: "u".into(),
            signature: RecoverableSignature {
                hex: [0u8; 64],
                recovery: 0,
            },
        };
        assert!(request.validate_limits().is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let value: serde_json::Value = serde_json::from_str(
            &Response::error(ErrorCode::ChainConflict, "stale tip").to_json().unwrap(),
        )
        .unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "chain-conflict");
        assert_eq!(value["retryable"], true);

        let value = serde_json::to_value(Response::error(ErrorCode::NotFound, "gone")).unwrap();
        assert_eq!(value["code"], "not-found");
        assert_eq!(value["retryable"], false);
    }

    #[test]
    fn test_update_confirmed_field_names() {
        let value = serde_json::to_value(Response::UpdateConfirmed {
            ephemeral_id: "u1".into(),
            clock: 3,
            space_id: SpaceId::from("s"),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "update-confirmed", "ephemeralId": "u1", "clock": 3, "spaceId": "s"})
        );
    }

    #[test]
    fn test_updates_range() {
        assert!(Updates::from_stored(vec![]).is_none());
        let update = |clock| StoredUpdate {
            clock,
            update_id: format!("u{clock}"),
            account_id: AccountId::new("0xabc"),
            update: vec![],
            signature: RecoverableSignature {
                hex: [0u8; 64],
                recovery: 0,
            },
        };
        let updates = Updates::from_stored(vec![update(4), update(5), update(6)]).unwrap();
        assert_eq!(updates.first_update_clock, 4);
        assert_eq!(updates.last_update_clock, 6);
    }
}
