//! In-memory implementation of the store traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hyperspace_core::{
    AccountId, EventHash, InboxId, InboxScope, SpaceEvent, SpaceId, SpaceInbox, Transaction,
};
use hyperspace_keys::KeyBoxWithKeyId;

use crate::error::{poisoned, Result, StoreError};
use crate::records::{
    AccountInboxRecord, AppendResult, ChainAppend, IdentityRecord, InboxMessageRecord,
    InvitationRecord, NewSpace, NewUpdate, SpaceInboxRecord, StoredUpdate,
};
use crate::traits::{expires_at, is_expired, KeyValueStore, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Spaces in creation order.
    spaces: BTreeMap<SpaceId, StoredSpace>,

    /// Space ids per member, in joining order.
    memberships: HashMap<AccountId, Vec<SpaceId>>,

    /// Identities.
    identities: HashMap<AccountId, IdentityRecord>,

    /// Account inboxes in creation order. Ids are unique per account.
    account_inboxes: Vec<AccountInboxRecord>,

    /// Inbox messages per owner and inbox, in posting order.
    messages: HashMap<(InboxScope, InboxId), Vec<InboxMessageRecord>>,

    /// Key-value entries with optional deadline (Unix ms).
    kv: HashMap<String, (Vec<u8>, Option<i64>)>,
}

#[derive(Default)]
struct StoredSpace {
    events: Vec<(EventHash, SpaceEvent)>,
    key_boxes: Vec<KeyBoxWithKeyId>,
    members: BTreeSet<AccountId>,
    invitations: Vec<(InvitationRecord, bool)>,
    updates: Vec<StoredUpdate>,
    inboxes: Vec<SpaceInbox>,
}

impl StoredSpace {
    fn tip(&self) -> Option<EventHash> {
        self.events.last().map(|(hash, _)| *hash)
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    /// Mirror of the SQLite indexes maintained per event.
    fn index_event(&mut self, space_id: &SpaceId, event: &SpaceEvent) -> Result<()> {
        let author = event.author.account_id.clone();
        let space = self
            .spaces
            .get_mut(space_id)
            .ok_or_else(|| StoreError::NotFound(format!("space {space_id}")))?;

        match &event.transaction {
            Transaction::CreateSpace(_) => {
                space.members.insert(author.clone());
                self.memberships.entry(author).or_default().push(space_id.clone());
            }
            Transaction::CreateInvitation(t) => {
                space.invitations.push((
                    InvitationRecord {
                        id: t.id.clone(),
                        space_id: space_id.clone(),
                        invitee_account_id: t.invitee_account_id.clone(),
                        inviter_account_id: author,
                    },
                    false,
                ));
            }
            Transaction::AcceptInvitation(_) => {
                for (invitation, accepted) in space.invitations.iter_mut() {
                    if invitation.invitee_account_id == author {
                        *accepted = true;
                    }
                }
                if space.members.insert(author.clone()) {
                    self.memberships.entry(author).or_default().push(space_id.clone());
                }
            }
            Transaction::CreateSpaceInbox(t) => {
                if space.inboxes.iter().any(|i| i.inbox_id == t.inbox_id) {
                    return Err(StoreError::AlreadyExists(format!("inbox {}", t.inbox_id)));
                }
                space.inboxes.push(SpaceInbox {
                    inbox_id: t.inbox_id.clone(),
                    encryption_public_key: t.encryption_public_key,
                    secret_key: t.secret_key.clone(),
                    is_public: t.is_public,
                    auth_policy: t.auth_policy,
                });
            }
            Transaction::RotateKey(_) => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_space(&self, space: NewSpace) -> Result<()> {
        let mut inner = self.write()?;

        if inner.spaces.contains_key(&space.space_id) {
            return Err(StoreError::AlreadyExists(format!("space {}", space.space_id)));
        }

        inner.spaces.insert(
            space.space_id.clone(),
            StoredSpace {
                events: vec![(space.hash, space.event.clone())],
                key_boxes: space.key_boxes,
                ..Default::default()
            },
        );
        inner.index_event(&space.space_id, &space.event)
    }

    async fn append_space_event(&self, append: ChainAppend) -> Result<AppendResult> {
        let mut inner = self.write()?;

        let Some(space) = inner.spaces.get_mut(&append.space_id) else {
            return Ok(AppendResult::Conflict { current_tip: None });
        };
        let current_tip = space.tip();
        if current_tip != Some(append.expected_tip) {
            return Ok(AppendResult::Conflict { current_tip });
        }

        // Index first so a rejected event leaves nothing behind
        inner.index_event(&append.space_id, &append.event)?;

        let space = inner
            .spaces
            .get_mut(&append.space_id)
            .ok_or_else(|| StoreError::NotFound(format!("space {}", append.space_id)))?;
        let seq = space.events.len() as u64;
        space.events.push((append.hash, append.event));
        space.key_boxes.extend(append.key_boxes);
        Ok(AppendResult::Appended { seq })
    }

    async fn get_space_events(&self, space_id: &SpaceId) -> Result<Vec<SpaceEvent>> {
        let inner = self.read()?;
        Ok(inner
            .spaces
            .get(space_id)
            .map(|s| s.events.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_space_tip(&self, space_id: &SpaceId) -> Result<Option<EventHash>> {
        let inner = self.read()?;
        Ok(inner.spaces.get(space_id).and_then(StoredSpace::tip))
    }

    async fn get_key_boxes(
        &self,
        space_id: &SpaceId,
        account_id: &AccountId,
    ) -> Result<Vec<KeyBoxWithKeyId>> {
        let inner = self.read()?;
        Ok(inner
            .spaces
            .get(space_id)
            .map(|s| {
                s.key_boxes
                    .iter()
                    .filter(|b| &b.account_id == account_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_spaces_for_account(&self, account_id: &AccountId) -> Result<Vec<SpaceId>> {
        let inner = self.read()?;
        Ok(inner.memberships.get(account_id).cloned().unwrap_or_default())
    }

    async fn list_invitations_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<InvitationRecord>> {
        let inner = self.read()?;
        Ok(inner
            .spaces
            .values()
            .flat_map(|s| s.invitations.iter())
            .filter(|(inv, accepted)| !accepted && &inv.invitee_account_id == account_id)
            .map(|(inv, _)| inv.clone())
            .collect())
    }

    async fn is_space_member(&self, space_id: &SpaceId, account_id: &AccountId) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner
            .spaces
            .get(space_id)
            .is_some_and(|s| s.members.contains(account_id)))
    }

    async fn list_space_members(&self, space_id: &SpaceId) -> Result<Vec<AccountId>> {
        let inner = self.read()?;
        Ok(inner
            .spaces
            .get(space_id)
            .map(|s| s.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_update(&self, space_id: &SpaceId, update: NewUpdate) -> Result<u64> {
        let mut inner = self.write()?;
        let space = inner
            .spaces
            .get_mut(space_id)
            .ok_or_else(|| StoreError::NotFound(format!("space {space_id}")))?;

        let clock = space.updates.last().map(|u| u.clock).unwrap_or(0) + 1;
        space.updates.push(StoredUpdate {
            clock,
            update_id: update.update_id,
            account_id: update.account_id,
            update: update.update,
            signature: update.signature,
        });
        Ok(clock)
    }

    async fn get_updates_since(
        &self,
        space_id: &SpaceId,
        after_clock: u64,
    ) -> Result<Vec<StoredUpdate>> {
        let inner = self.read()?;
        Ok(inner
            .spaces
            .get(space_id)
            .map(|s| {
                s.updates
                    .iter()
                    .filter(|u| u.clock > after_clock)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_identity(&self, identity: IdentityRecord) -> Result<()> {
        let mut inner = self.write()?;
        if inner.identities.contains_key(&identity.account_id) {
            return Err(StoreError::AlreadyExists(format!(
                "identity {}",
                identity.account_id
            )));
        }
        inner.identities.insert(identity.account_id.clone(), identity);
        Ok(())
    }

    async fn get_identity(&self, account_id: &AccountId) -> Result<Option<IdentityRecord>> {
        let inner = self.read()?;
        Ok(inner.identities.get(account_id).cloned())
    }

    async fn create_account_inbox(&self, inbox: AccountInboxRecord) -> Result<()> {
        let mut inner = self.write()?;
        if inner
            .account_inboxes
            .iter()
            .any(|i| i.account_id == inbox.account_id && i.inbox_id == inbox.inbox_id)
        {
            return Err(StoreError::AlreadyExists(format!("inbox {}", inbox.inbox_id)));
        }
        inner.account_inboxes.push(inbox);
        Ok(())
    }

    async fn list_account_inboxes(&self, account_id: &AccountId) -> Result<Vec<AccountInboxRecord>> {
        let inner = self.read()?;
        Ok(inner
            .account_inboxes
            .iter()
            .filter(|i| &i.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn get_account_inbox(
        &self,
        account_id: &AccountId,
        inbox_id: &InboxId,
    ) -> Result<Option<AccountInboxRecord>> {
        let inner = self.read()?;
        Ok(inner
            .account_inboxes
            .iter()
            .find(|i| &i.account_id == account_id && &i.inbox_id == inbox_id)
            .cloned())
    }

    async fn get_space_inbox(
        &self,
        space_id: &SpaceId,
        inbox_id: &InboxId,
    ) -> Result<Option<SpaceInboxRecord>> {
        let inner = self.read()?;
        Ok(inner.spaces.get(space_id).and_then(|s| {
            s.inboxes
                .iter()
                .find(|i| &i.inbox_id == inbox_id)
                .map(|inbox| SpaceInboxRecord {
                    space_id: space_id.clone(),
                    inbox: inbox.clone(),
                })
        }))
    }

    async fn list_space_inboxes(&self, space_id: &SpaceId) -> Result<Vec<SpaceInboxRecord>> {
        let inner = self.read()?;
        Ok(inner
            .spaces
            .get(space_id)
            .map(|s| {
                s.inboxes
                    .iter()
                    .map(|inbox| SpaceInboxRecord {
                        space_id: space_id.clone(),
                        inbox: inbox.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_inbox_message(
        &self,
        scope: &InboxScope,
        message: InboxMessageRecord,
    ) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .messages
            .entry((scope.clone(), message.inbox_id.clone()))
            .or_default()
            .push(message);
        Ok(())
    }

    async fn list_inbox_messages(
        &self,
        scope: &InboxScope,
        inbox_id: &InboxId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InboxMessageRecord>> {
        let inner = self.read()?;
        let since_ms = since.map(|t| t.timestamp_millis());
        Ok(inner
            .messages
            .get(&(scope.clone(), inbox_id.clone()))
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| since_ms.map_or(true, |s| m.created_at.timestamp_millis() > s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.read()?;
        Ok(inner
            .kv
            .get(key)
            .filter(|(_, at)| !is_expired(*at))
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut inner = self.write()?;
        inner.kv.insert(key.to_string(), (value, expires_at(ttl)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.take(key).await?.is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.write()?;
        Ok(inner
            .kv
            .remove(key)
            .filter(|(_, at)| !is_expired(*at))
            .map(|(value, _)| value))
    }
}
