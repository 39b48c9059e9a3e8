//! Store traits: the abstract interface for relay persistence.
//!
//! These traits keep the server storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hyperspace_core::{AccountId, EventHash, InboxId, InboxScope, SpaceEvent, SpaceId};
use hyperspace_keys::KeyBoxWithKeyId;

use crate::error::Result;
use crate::records::{
    AccountInboxRecord, AppendResult, ChainAppend, IdentityRecord, InboxMessageRecord,
    InvitationRecord, NewSpace, NewUpdate, SpaceInboxRecord, StoredUpdate,
};

/// The Store trait: async interface for relay persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Atomic spaces**: a space, its first event, the creator's key boxes and
///   membership are written in one transaction or not at all.
/// - **Tip check**: appends compare the expected tip inside the write
///   transaction and report `Conflict` instead of writing.
/// - **Update clocks**: assigned as `max + 1` inside the insert transaction,
///   so clocks per space are gap-free and unique.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Space Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a space from its root event.
    ///
    /// Fails with `AlreadyExists` if the id is taken.
    async fn create_space(&self, space: NewSpace) -> Result<()>;

    /// Append a validated event if the tip is still `expected_tip`.
    async fn append_space_event(&self, append: ChainAppend) -> Result<AppendResult>;

    /// All events of a space, in chain order. Empty if the space is unknown.
    async fn get_space_events(&self, space_id: &SpaceId) -> Result<Vec<SpaceEvent>>;

    /// Hash of the last event, if the space exists.
    async fn get_space_tip(&self, space_id: &SpaceId) -> Result<Option<EventHash>>;

    /// Key boxes of a space addressed to `account_id`.
    async fn get_key_boxes(
        &self,
        space_id: &SpaceId,
        account_id: &AccountId,
    ) -> Result<Vec<KeyBoxWithKeyId>>;

    /// Spaces `account_id` is a member of.
    async fn list_spaces_for_account(&self, account_id: &AccountId) -> Result<Vec<SpaceId>>;

    /// Outstanding invitations addressed to `account_id`.
    async fn list_invitations_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<InvitationRecord>>;

    async fn is_space_member(&self, space_id: &SpaceId, account_id: &AccountId) -> Result<bool>;

    /// Current members of a space. Empty if the space is unknown.
    async fn list_space_members(&self, space_id: &SpaceId) -> Result<Vec<AccountId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Update Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist an update and return its clock.
    async fn insert_update(&self, space_id: &SpaceId, update: NewUpdate) -> Result<u64>;

    /// Updates with `clock > after_clock`, ordered by clock.
    async fn get_updates_since(
        &self,
        space_id: &SpaceId,
        after_clock: u64,
    ) -> Result<Vec<StoredUpdate>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Identity Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Register an identity. Fails with `AlreadyExists` for a known account.
    async fn insert_identity(&self, identity: IdentityRecord) -> Result<()>;

    async fn get_identity(&self, account_id: &AccountId) -> Result<Option<IdentityRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Inbox Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Fails with `AlreadyExists` if the account already has an inbox with this id.
    async fn create_account_inbox(&self, inbox: AccountInboxRecord) -> Result<()>;

    async fn list_account_inboxes(&self, account_id: &AccountId) -> Result<Vec<AccountInboxRecord>>;

    async fn get_account_inbox(
        &self,
        account_id: &AccountId,
        inbox_id: &InboxId,
    ) -> Result<Option<AccountInboxRecord>>;

    async fn get_space_inbox(
        &self,
        space_id: &SpaceId,
        inbox_id: &InboxId,
    ) -> Result<Option<SpaceInboxRecord>>;

    async fn list_space_inboxes(&self, space_id: &SpaceId) -> Result<Vec<SpaceInboxRecord>>;

    /// Store a message under the inbox `message.inbox_id` owned by `scope`.
    async fn insert_inbox_message(
        &self,
        scope: &InboxScope,
        message: InboxMessageRecord,
    ) -> Result<()>;

    /// Messages of an inbox in posting order, optionally only those created after `since`.
    ///
    /// Inbox ids are only unique per owner, so `scope` is part of the key.
    async fn list_inbox_messages(
        &self,
        scope: &InboxScope,
        inbox_id: &InboxId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InboxMessageRecord>>;
}

/// Key-value storage with optional expiry.
///
/// Expiry is checked when a key is read; expired entries are never returned.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Read and remove a key in one step. Used for single-use values.
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

macro_rules! forward_key_value_store {
    ($($ty:ty),*) => {$(
        #[async_trait]
        impl<T: KeyValueStore + ?Sized> KeyValueStore for $ty {
            async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
                (**self).get(key).await
            }

            async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
                (**self).set(key, value, ttl).await
            }

            async fn delete(&self, key: &str) -> Result<bool> {
                (**self).delete(key).await
            }

            async fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
                (**self).take(key).await
            }
        }
    )*};
}

forward_key_value_store!(&T, std::sync::Arc<T>);

/// Millisecond deadline for a TTL starting now.
pub(crate) fn expires_at(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_millis().saturating_add(ttl.as_millis() as i64))
}

/// Whether a deadline has passed.
pub(crate) fn is_expired(expires_at: Option<i64>) -> bool {
    expires_at.is_some_and(|at| at <= now_millis())
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
