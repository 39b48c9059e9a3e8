//! The relay's space operations: validate, persist, fan out.
//!
//! Every chain mutation and every update insert for a space runs under that
//! space's lock, and its broadcasts are queued before the lock is released,
//! so subscribers see events and clocks in the order they were stored.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hyperspace_core::encoding::hex_array;
use hyperspace_core::inbox::{
    account_inbox_signing_bytes, recover_account_inbox_message_signer,
    recover_space_inbox_message_signer,
};
use hyperspace_core::{
    apply_event, check_auth_policy, fold_events, recover_update_signer, AccountId,
    InboxAuthPolicy, InboxId, InboxScope, KeyId, RecoverableSignature, SignaturePublicKey, SignedClaim,
    SpaceEvent, SpaceId, SpaceState, Transaction, ValidationError,
};
use hyperspace_keys::{KeyBox, KeyBoxWithKeyId};
use hyperspace_store::{
    AccountInboxRecord, AppendResult, ChainAppend, InboxMessageRecord, NewSpace, NewUpdate,
    SpaceInboxRecord, Store, StoredUpdate,
};
use hyperspace_sync::{
    limits, ConnectionId, ConnectionRegistry, Response, SpaceGuard, SpaceLocks, Updates,
};

use crate::error::{Result, ServerError};

/// Body of an inbox post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostInboxMessage {
    pub ciphertext: String,
    #[serde(default)]
    pub signature: Option<RecoverableSignature>,
    #[serde(default)]
    pub author_account_id: Option<AccountId>,
}

/// What anyone may learn about an inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxInfo {
    pub inbox_id: InboxId,
    pub is_public: bool,
    pub auth_policy: InboxAuthPolicy,
    #[serde(with = "hex_array")]
    pub encryption_public_key: [u8; 32],
}

impl From<&SpaceInboxRecord> for InboxInfo {
    fn from(record: &SpaceInboxRecord) -> Self {
        Self {
            inbox_id: record.inbox.inbox_id.clone(),
            is_public: record.inbox.is_public,
            auth_policy: record.inbox.auth_policy,
            encryption_public_key: record.inbox.encryption_public_key,
        }
    }
}

impl From<&AccountInboxRecord> for InboxInfo {
    fn from(record: &AccountInboxRecord) -> Self {
        Self {
            inbox_id: record.inbox_id.clone(),
            is_public: record.is_public,
            auth_policy: record.auth_policy,
            encryption_public_key: record.encryption_public_key,
        }
    }
}

/// Fields of a `create-account-inbox` request.
#[derive(Debug, Clone)]
pub struct NewAccountInbox {
    pub account_id: AccountId,
    pub inbox_id: InboxId,
    pub is_public: bool,
    pub auth_policy: InboxAuthPolicy,
    pub encryption_public_key: [u8; 32],
    pub signature: RecoverableSignature,
}

/// A space's chain after a successful append, with the lock still held.
struct Appended {
    events: Vec<SpaceEvent>,
    state: SpaceState,
    _guard: SpaceGuard,
}

/// Validated application of space operations.
pub struct SpaceService<S> {
    store: Arc<S>,
    locks: SpaceLocks,
    registry: Arc<ConnectionRegistry>,
}

impl<S: Store> SpaceService<S> {
    pub fn new(store: Arc<S>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            locks: SpaceLocks::new(),
            registry,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn locks(&self) -> &SpaceLocks {
        &self.locks
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Events and folded state of an existing space.
    async fn load(&self, space_id: &SpaceId) -> Result<(Vec<SpaceEvent>, SpaceState)> {
        let events = self.store.get_space_events(space_id).await?;
        let state = fold_events(&events)?
            .ok_or_else(|| ServerError::NotFound(format!("space {space_id}")))?;
        Ok((events, state))
    }

    /// The signature key registered for `account_id`.
    async fn registered_key(&self, account_id: &AccountId) -> Result<SignaturePublicKey> {
        self.store
            .get_identity(account_id)
            .await?
            .map(|identity| identity.signature_public_key)
            .ok_or_else(|| ServerError::Unauthorized(format!("no identity for {account_id}")))
    }

    /// The event must be authored by the connection's account with its
    /// registered signature key.
    async fn check_author(&self, account_id: &AccountId, event: &SpaceEvent) -> Result<()> {
        if &event.author.account_id != account_id {
            return Err(ServerError::Forbidden(
                "event author is not the connected account".into(),
            ));
        }
        if self.registered_key(account_id).await? != event.author.signature_public_key {
            return Err(ServerError::Unauthorized(
                "event signed with an unregistered key".into(),
            ));
        }
        Ok(())
    }

    /// Validate and append under the space lock.
    async fn append(
        &self,
        account_id: &AccountId,
        space_id: &SpaceId,
        event: SpaceEvent,
        key_boxes: Vec<KeyBoxWithKeyId>,
    ) -> Result<Appended> {
        self.check_author(account_id, &event).await?;
        if self.store.get_space_tip(space_id).await?.is_none() {
            return Err(ServerError::NotFound(format!("space {space_id}")));
        }

        let guard = self.locks.lock(space_id).await;
        let (mut events, state) = self.load(space_id).await?;
        let next = apply_event(&event, Some(&state))?;
        if let Transaction::RotateKey(rotation) = &event.transaction {
            check_rotation_boxes(&state, &rotation.key_id, &key_boxes)?;
        }

        let append = ChainAppend {
            space_id: space_id.clone(),
            hash: event.hash(),
            expected_tip: state.last_event_hash,
            event: event.clone(),
            key_boxes,
        };
        match self.store.append_space_event(append).await? {
            AppendResult::Appended { seq } => {
                debug!(space_id = %space_id, seq, kind = event.kind(), "appended event");
            }
            AppendResult::Conflict { current_tip } => {
                return Err(ValidationError::ChainConflict {
                    expected: current_tip,
                    got: event.previous_event_hash(),
                }
                .into());
            }
        }

        events.push(event);
        Ok(Appended {
            events,
            state: next,
            _guard: guard,
        })
    }

    /// The `space` message for `account_id`.
    async fn snapshot(
        &self,
        account_id: &AccountId,
        events: Vec<SpaceEvent>,
        state: &SpaceState,
        last_known_update_clock: Option<u64>,
    ) -> Result<Response> {
        let key_boxes = self.store.get_key_boxes(&state.id, account_id).await?;
        let updates = if state.is_member(account_id) {
            let since = last_known_update_clock.unwrap_or(0);
            Updates::from_stored(self.store.get_updates_since(&state.id, since).await?)
        } else {
            None
        };
        Ok(Response::Space {
            id: state.id.clone(),
            events,
            key_boxes,
            updates,
            inboxes: state.inboxes.values().cloned().collect(),
        })
    }

    /// Queue `message` for every subscriber but `origin`, then echo it to `origin`.
    fn fan_out(&self, origin: ConnectionId, space_id: &SpaceId, message: Response) {
        let sent = self
            .registry
            .broadcast(space_id, |id, _| id != origin, &message);
        debug!(space_id = %space_id, recipients = sent, "broadcast");
        let _ = self.registry.send(origin, message);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Space Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Send the space to a member or invitee and subscribe the connection.
    pub async fn subscribe_space(
        &self,
        conn: ConnectionId,
        account_id: &AccountId,
        space_id: &SpaceId,
        last_known_update_clock: Option<u64>,
    ) -> Result<()> {
        let (events, state) = self.load(space_id).await?;
        if !state.is_member(account_id) && state.invitation_for(account_id).is_none() {
            return Err(ServerError::Forbidden(format!(
                "{account_id} is not a member of {space_id}"
            )));
        }

        let space = self
            .snapshot(account_id, events, &state, last_known_update_clock)
            .await?;
        self.registry.subscribe(conn, space_id.clone())?;
        self.registry.send(conn, space)?;
        Ok(())
    }

    /// Create a space from its root event and the creator's key box.
    pub async fn create_space(
        &self,
        conn: ConnectionId,
        account_id: &AccountId,
        space_id: &SpaceId,
        event: SpaceEvent,
        key_id: KeyId,
        key_box: KeyBox,
    ) -> Result<()> {
        self.check_author(account_id, &event).await?;

        match &event.transaction {
            Transaction::CreateSpace(t) if &t.id == space_id && t.key_id == key_id => {}
            Transaction::CreateSpace(_) => {
                return Err(ServerError::Validation(
                    "create-space event does not match spaceId/keyId".into(),
                ))
            }
            _ => return Err(ServerError::Validation("expected a create-space event".into())),
        }
        if &key_box.account_id != account_id {
            return Err(ServerError::Validation(
                "creator key box must be addressed to the creator".into(),
            ));
        }

        let state = apply_event(&event, None)?;

        let _guard = self.locks.lock(space_id).await;
        self.store
            .create_space(NewSpace {
                space_id: space_id.clone(),
                hash: event.hash(),
                event: event.clone(),
                key_boxes: vec![key_box.with_key_id(key_id)],
            })
            .await?;
        info!(space_id = %space_id, account_id = %account_id, "created space");

        let space = self.snapshot(account_id, vec![event], &state, None).await?;
        self.registry.subscribe(conn, space_id.clone())?;
        self.registry.send(conn, space)?;
        Ok(())
    }

    /// Append an invitation with one key box per active generation.
    pub async fn create_invitation(
        &self,
        conn: ConnectionId,
        account_id: &AccountId,
        space_id: &SpaceId,
        event: SpaceEvent,
        key_boxes: Vec<KeyBoxWithKeyId>,
    ) -> Result<()> {
        let Transaction::CreateInvitation(invitation) = &event.transaction else {
            return Err(ServerError::Validation("expected a create-invitation event".into()));
        };
        let invitee = invitation.invitee_account_id.clone();

        if key_boxes.iter().any(|b| b.account_id != invitee) {
            return Err(ServerError::Validation(
                "key boxes must be addressed to the invitee".into(),
            ));
        }
        if !key_boxes.iter().map(|b| &b.id).eq(invitation.key_ids.iter()) {
            return Err(ValidationError::KeyGenerationMismatch {
                expected: invitation.key_ids.clone(),
                got: key_boxes.iter().map(|b| b.id.clone()).collect(),
            }
            .into());
        }

        let appended = self
            .append(account_id, space_id, event.clone(), key_boxes)
            .await?;
        info!(space_id = %space_id, inviter = %account_id, invitee = %invitee, "invitation created");

        self.fan_out(
            conn,
            space_id,
            Response::SpaceEvent {
                space_id: space_id.clone(),
                event,
            },
        );
        let invitations = self.store.list_invitations_for_account(&invitee).await?;
        self.registry
            .send_to_account(&invitee, &Response::ListInvitations { invitations });
        drop(appended);
        Ok(())
    }

    /// Append an acceptance and send the new member its space.
    pub async fn accept_invitation(
        &self,
        conn: ConnectionId,
        account_id: &AccountId,
        space_id: &SpaceId,
        event: SpaceEvent,
    ) -> Result<()> {
        if !matches!(event.transaction, Transaction::AcceptInvitation(_)) {
            return Err(ServerError::Validation("expected an accept-invitation event".into()));
        }

        let appended = self
            .append(account_id, space_id, event.clone(), Vec::new())
            .await?;
        info!(space_id = %space_id, account_id = %account_id, "invitation accepted");

        let message = Response::SpaceEvent {
            space_id: space_id.clone(),
            event,
        };
        self.registry
            .broadcast(space_id, |id, _| id != conn, &message);

        let space = self
            .snapshot(account_id, appended.events.clone(), &appended.state, None)
            .await?;
        self.registry.subscribe(conn, space_id.clone())?;
        self.registry.send(conn, space)?;
        Ok(())
    }

    /// Append a `create-space-inbox` event.
    pub async fn create_space_inbox(
        &self,
        conn: ConnectionId,
        account_id: &AccountId,
        space_id: &SpaceId,
        event: SpaceEvent,
    ) -> Result<()> {
        if !matches!(event.transaction, Transaction::CreateSpaceInbox(_)) {
            return Err(ServerError::Validation("expected a create-space-inbox event".into()));
        }

        let appended = self
            .append(account_id, space_id, event.clone(), Vec::new())
            .await?;
        self.fan_out(
            conn,
            space_id,
            Response::SpaceEvent {
                space_id: space_id.clone(),
                event,
            },
        );
        drop(appended);
        Ok(())
    }

    /// Append a `rotate-key` event. Recipients pick up their new key box by
    /// resubscribing.
    pub async fn rotate_key(
        &self,
        conn: ConnectionId,
        account_id: &AccountId,
        space_id: &SpaceId,
        event: SpaceEvent,
        key_boxes: Vec<KeyBoxWithKeyId>,
    ) -> Result<()> {
        if !matches!(event.transaction, Transaction::RotateKey(_)) {
            return Err(ServerError::Validation("expected a rotate-key event".into()));
        }

        let appended = self
            .append(account_id, space_id, event.clone(), key_boxes)
            .await?;
        info!(
            space_id = %space_id,
            account_id = %account_id,
            generations = appended.state.key_ids.len(),
            "key rotated"
        );
        self.fan_out(
            conn,
            space_id,
            Response::SpaceEvent {
                space_id: space_id.clone(),
                event,
            },
        );
        drop(appended);
        Ok(())
    }

    pub async fn list_spaces(&self, account_id: &AccountId) -> Result<Response> {
        let spaces = self.store.list_spaces_for_account(account_id).await?;
        Ok(Response::ListSpaces { spaces })
    }

    pub async fn list_invitations(&self, account_id: &AccountId) -> Result<Response> {
        let invitations = self.store.list_invitations_for_account(account_id).await?;
        Ok(Response::ListInvitations { invitations })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Update Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a member's update, confirm it to the sender and notify the
    /// other subscribers. Returns the assigned clock.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_update(
        &self,
        conn: ConnectionId,
        account_id: &AccountId,
        claimed_account_id: &AccountId,
        space_id: &SpaceId,
        update_id: String,
        update: Vec<u8>,
        signature: RecoverableSignature,
    ) -> Result<u64> {
        if claimed_account_id != account_id {
            return Err(ServerError::Forbidden(
                "update accountId is not the connected account".into(),
            ));
        }
        if !self.store.is_space_member(space_id, account_id).await? {
            return Err(ServerError::Forbidden(format!(
                "{account_id} is not a member of {space_id}"
            )));
        }
        let signer = recover_update_signer(space_id, &update_id, account_id, &update, &signature)
            .map_err(|_| ServerError::Unauthorized("invalid update signature".into()))?;
        if signer != self.registered_key(account_id).await? {
            return Err(ServerError::Unauthorized(
                "update not signed by the account's key".into(),
            ));
        }

        let _guard = self.locks.lock(space_id).await;
        let clock = self
            .store
            .insert_update(
                space_id,
                NewUpdate {
                    update_id: update_id.clone(),
                    account_id: account_id.clone(),
                    update: update.clone(),
                    signature,
                },
            )
            .await?;

        let _ = self.registry.send(
            conn,
            Response::UpdateConfirmed {
                ephemeral_id: update_id.clone(),
                clock,
                space_id: space_id.clone(),
            },
        );
        let notification = Response::UpdatesNotification {
            updates: Updates {
                updates: vec![StoredUpdate {
                    clock,
                    update_id,
                    account_id: account_id.clone(),
                    update,
                    signature,
                }],
                first_update_clock: clock,
                last_update_clock: clock,
            },
            space_id: space_id.clone(),
        };
        // Invitees may be subscribed; updates are for members only.
        let members = self.store.list_space_members(space_id).await?;
        self.registry.broadcast(
            space_id,
            |id, account| id != conn && members.contains(account),
            &notification,
        );
        Ok(clock)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbox Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Open an inbox owned by the connected account.
    pub async fn create_account_inbox(
        &self,
        account_id: &AccountId,
        inbox: NewAccountInbox,
    ) -> Result<()> {
        if &inbox.account_id != account_id {
            return Err(ServerError::Forbidden(
                "inbox accountId is not the connected account".into(),
            ));
        }
        let signed = account_inbox_signing_bytes(
            &inbox.account_id,
            &inbox.inbox_id,
            inbox.is_public,
            inbox.auth_policy,
            &inbox.encryption_public_key,
        );
        let signer = inbox
            .signature
            .recover(&signed)
            .map_err(|_| ServerError::Unauthorized("invalid inbox signature".into()))?;
        if signer != self.registered_key(account_id).await? {
            return Err(ServerError::Unauthorized(
                "inbox not signed by the account's key".into(),
            ));
        }

        let record = AccountInboxRecord {
            account_id: inbox.account_id,
            inbox_id: inbox.inbox_id,
            is_public: inbox.is_public,
            auth_policy: inbox.auth_policy,
            encryption_public_key: inbox.encryption_public_key,
            signature: inbox.signature,
        };
        self.store.create_account_inbox(record.clone()).await?;
        info!(account_id = %account_id, inbox_id = %record.inbox_id, "account inbox created");
        self.registry
            .send_to_account(account_id, &Response::AccountInbox { inbox: record });
        Ok(())
    }

    /// All inboxes of the connected account, private ones included.
    pub async fn account_inboxes(&self, account_id: &AccountId) -> Result<Response> {
        let inboxes = self.store.list_account_inboxes(account_id).await?;
        Ok(Response::AccountInboxes { inboxes })
    }

    pub async fn latest_space_inbox_messages(
        &self,
        account_id: &AccountId,
        space_id: &SpaceId,
        inbox_id: &InboxId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Response> {
        if !self.store.is_space_member(space_id, account_id).await? {
            return Err(ServerError::Forbidden(format!(
                "{account_id} is not a member of {space_id}"
            )));
        }
        self.space_inbox(space_id, inbox_id).await?;
        let scope = InboxScope::Space(space_id.clone());
        let messages = self.store.list_inbox_messages(&scope, inbox_id, since).await?;
        Ok(Response::SpaceInboxMessages {
            space_id: space_id.clone(),
            inbox_id: inbox_id.clone(),
            messages,
        })
    }

    pub async fn latest_account_inbox_messages(
        &self,
        account_id: &AccountId,
        owner: &AccountId,
        inbox_id: &InboxId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Response> {
        if account_id != owner {
            return Err(ServerError::Forbidden(
                "only the owner can read an account inbox".into(),
            ));
        }
        self.account_inbox(owner, inbox_id).await?;
        let scope = InboxScope::Account(owner.clone());
        let messages = self.store.list_inbox_messages(&scope, inbox_id, since).await?;
        Ok(Response::AccountInboxMessages {
            account_id: owner.clone(),
            inbox_id: inbox_id.clone(),
            messages,
        })
    }

    async fn space_inbox(&self, space_id: &SpaceId, inbox_id: &InboxId) -> Result<SpaceInboxRecord> {
        self.store
            .get_space_inbox(space_id, inbox_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("inbox {inbox_id} in space {space_id}")))
    }

    async fn account_inbox(
        &self,
        owner: &AccountId,
        inbox_id: &InboxId,
    ) -> Result<AccountInboxRecord> {
        self.store
            .get_account_inbox(owner, inbox_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("inbox {inbox_id} of {owner}")))
    }

    /// Public inboxes of a space.
    pub async fn public_space_inboxes(&self, space_id: &SpaceId) -> Result<Vec<InboxInfo>> {
        let inboxes = self.store.list_space_inboxes(space_id).await?;
        Ok(inboxes
            .iter()
            .filter(|i| i.inbox.is_public)
            .map(InboxInfo::from)
            .collect())
    }

    pub async fn public_space_inbox(&self, space_id: &SpaceId, inbox_id: &InboxId) -> Result<InboxInfo> {
        let inbox = self.space_inbox(space_id, inbox_id).await?;
        if !inbox.inbox.is_public {
            return Err(ServerError::NotFound(format!("inbox {inbox_id} in space {space_id}")));
        }
        Ok(InboxInfo::from(&inbox))
    }

    /// Public inboxes of an account.
    pub async fn public_account_inboxes(&self, owner: &AccountId) -> Result<Vec<InboxInfo>> {
        let inboxes = self.store.list_account_inboxes(owner).await?;
        Ok(inboxes
            .iter()
            .filter(|i| i.is_public)
            .map(InboxInfo::from)
            .collect())
    }

    pub async fn public_account_inbox(&self, owner: &AccountId, inbox_id: &InboxId) -> Result<InboxInfo> {
        let inbox = self.account_inbox(owner, inbox_id).await?;
        if !inbox.is_public {
            return Err(ServerError::NotFound(format!("inbox {inbox_id} of {owner}")));
        }
        Ok(InboxInfo::from(&inbox))
    }

    /// Check a post against the inbox policy and the claimed author's identity.
    async fn check_post(
        &self,
        policy: InboxAuthPolicy,
        post: &PostInboxMessage,
        recover: impl FnOnce(&SignedClaim) -> std::result::Result<SignaturePublicKey, hyperspace_core::InboxError>,
    ) -> Result<()> {
        if post.ciphertext.len() > limits::MAX_INBOX_MESSAGE_BYTES {
            return Err(ServerError::Validation("ciphertext too large".into()));
        }
        let claim = check_auth_policy(
            policy,
            post.signature.as_ref(),
            post.author_account_id.as_ref(),
        )?;
        if let Some(claim) = claim {
            let signer = recover(&claim)?;
            let registered = self.registered_key(&claim.author_account_id).await?;
            if signer != registered {
                return Err(ServerError::Unauthorized(format!(
                    "message not signed by {}",
                    claim.author_account_id
                )));
            }
        }
        Ok(())
    }

    fn new_message(inbox_id: &InboxId, post: PostInboxMessage) -> InboxMessageRecord {
        InboxMessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            inbox_id: inbox_id.clone(),
            ciphertext: post.ciphertext,
            signature: post.signature,
            author_account_id: post.author_account_id,
            created_at: Utc::now(),
        }
    }

    /// Post to a space inbox and notify the space's subscribers.
    pub async fn post_space_inbox_message(
        &self,
        space_id: &SpaceId,
        inbox_id: &InboxId,
        post: PostInboxMessage,
    ) -> Result<InboxMessageRecord> {
        let inbox = self.space_inbox(space_id, inbox_id).await?;
        self.check_post(inbox.inbox.auth_policy, &post, |claim| {
            recover_space_inbox_message_signer(space_id, inbox_id, post.ciphertext.as_bytes(), claim)
        })
        .await?;

        let message = Self::new_message(inbox_id, post);
        self.store
            .insert_inbox_message(&InboxScope::Space(space_id.clone()), message.clone())
            .await?;
        let members = self.store.list_space_members(space_id).await?;
        self.registry.broadcast(
            space_id,
            |_, account| members.contains(account),
            &Response::SpaceInboxMessage {
                space_id: space_id.clone(),
                inbox_id: inbox_id.clone(),
                message: message.clone(),
            },
        );
        Ok(message)
    }

    /// Post to an account inbox and notify the owner's connections.
    pub async fn post_account_inbox_message(
        &self,
        owner: &AccountId,
        inbox_id: &InboxId,
        post: PostInboxMessage,
    ) -> Result<InboxMessageRecord> {
        let inbox = self.account_inbox(owner, inbox_id).await?;
        self.check_post(inbox.auth_policy, &post, |claim| {
            recover_account_inbox_message_signer(owner, inbox_id, post.ciphertext.as_bytes(), claim)
        })
        .await?;

        let message = Self::new_message(inbox_id, post);
        self.store
            .insert_inbox_message(&InboxScope::Account(owner.clone()), message.clone())
            .await?;
        self.registry.send_to_account(
            owner,
            &Response::AccountInboxMessage {
                account_id: owner.clone(),
                inbox_id: inbox_id.clone(),
                message: message.clone(),
            },
        );
        Ok(message)
    }
}

/// A rotation carries exactly one box of the new key for each member and
/// each pending invitee.
fn check_rotation_boxes(
    state: &SpaceState,
    key_id: &KeyId,
    key_boxes: &[KeyBoxWithKeyId],
) -> Result<()> {
    if key_boxes.iter().any(|b| &b.id != key_id) {
        return Err(ValidationError::KeyGenerationMismatch {
            expected: vec![key_id.clone()],
            got: key_boxes.iter().map(|b| b.id.clone()).collect(),
        }
        .into());
    }
    let recipients: BTreeSet<&AccountId> = state
        .members
        .keys()
        .chain(state.invitations.values().map(|i| &i.invitee_account_id))
        .collect();
    let addressed: BTreeSet<&AccountId> = key_boxes.iter().map(|b| &b.account_id).collect();
    if addressed != recipients || key_boxes.len() != recipients.len() {
        return Err(ServerError::Validation(
            "rotation needs one key box per member and pending invitee".into(),
        ));
    }
    Ok(())
}
