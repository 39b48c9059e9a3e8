//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for the relay. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction as SqlTransaction};

use hyperspace_core::{
    AccountId, EventHash, InboxId, InboxScope, RecoverableSignature, SpaceEvent, SpaceId,
    SpaceInbox, Transaction,
};
use hyperspace_keys::KeyBoxWithKeyId;

use crate::error::{decode_cbor, encode_cbor, poisoned, Result, StoreError};
use crate::migration;
use crate::records::{
    AccountInboxRecord, AppendResult, ChainAppend, IdentityRecord, InboxMessageRecord,
    InvitationRecord, NewSpace, NewUpdate, SpaceInboxRecord, StoredUpdate,
};
use crate::traits::{expires_at, is_expired, now_millis, KeyValueStore, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        tracing::debug!(path = %path.as_ref().display(), "opened sqlite store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

fn hash_from_blob(bytes: Vec<u8>) -> Result<EventHash> {
    EventHash::try_from(bytes.as_slice())
        .map_err(|_| StoreError::InvalidData(format!("event hash of {} bytes", bytes.len())))
}

fn tip(tx: &Connection, space_id: &SpaceId) -> Result<Option<EventHash>> {
    let hash: Option<Vec<u8>> = tx
        .query_row(
            "SELECT hash FROM space_events WHERE space_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![space_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    hash.map(hash_from_blob).transpose()
}

fn insert_event(
    tx: &SqlTransaction<'_>,
    space_id: &SpaceId,
    seq: u64,
    event: &SpaceEvent,
    hash: &EventHash,
) -> Result<()> {
    tx.execute(
        "INSERT INTO space_events (space_id, seq, event_id, hash, event, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            space_id.as_str(),
            seq as i64,
            event.transaction.id(),
            hash.as_bytes().as_slice(),
            encode_cbor(event)?,
            now_millis(),
        ],
    )?;
    Ok(())
}

fn insert_key_boxes(
    tx: &SqlTransaction<'_>,
    space_id: &SpaceId,
    key_boxes: &[KeyBoxWithKeyId],
) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO key_boxes (space_id, key_id, account_id, key_box) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for key_box in key_boxes {
        stmt.execute(params![
            space_id.as_str(),
            key_box.id.as_str(),
            key_box.account_id.as_str(),
            encode_cbor(key_box)?,
        ])?;
    }
    Ok(())
}

/// Maintain the membership, invitation and inbox indexes for an event.
fn index_event(tx: &SqlTransaction<'_>, space_id: &SpaceId, event: &SpaceEvent) -> Result<()> {
    let author = &event.author.account_id;
    match &event.transaction {
        Transaction::CreateSpace(_) => {
            tx.execute(
                "INSERT INTO space_members (space_id, account_id) VALUES (?1, ?2)",
                params![space_id.as_str(), author.as_str()],
            )?;
        }
        Transaction::CreateInvitation(t) => {
            tx.execute(
                "INSERT INTO invitations
                    (space_id, invitation_id, invitee_account_id, inviter_account_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    space_id.as_str(),
                    t.id,
                    t.invitee_account_id.as_str(),
                    author.as_str()
                ],
            )?;
        }
        Transaction::AcceptInvitation(_) => {
            tx.execute(
                "INSERT OR IGNORE INTO space_members (space_id, account_id) VALUES (?1, ?2)",
                params![space_id.as_str(), author.as_str()],
            )?;
            tx.execute(
                "UPDATE invitations SET accepted = 1
                 WHERE space_id = ?1 AND invitee_account_id = ?2",
                params![space_id.as_str(), author.as_str()],
            )?;
        }
        Transaction::CreateSpaceInbox(t) => {
            let inbox = SpaceInbox {
                inbox_id: t.inbox_id.clone(),
                encryption_public_key: t.encryption_public_key,
                secret_key: t.secret_key.clone(),
                is_public: t.is_public,
                auth_policy: t.auth_policy,
            };
            tx.execute(
                "INSERT INTO space_inboxes (inbox_id, space_id, record) VALUES (?1, ?2, ?3)",
                params![t.inbox_id.as_str(), space_id.as_str(), encode_cbor(&inbox)?],
            )?;
        }
        // Key boxes for the new generation are stored with the event
        Transaction::RotateKey(_) => {}
    }
    Ok(())
}

/// Column values of `inbox_messages.scope` and `inbox_messages.owner_id`.
fn scope_columns(scope: &InboxScope) -> (&'static str, String) {
    match scope {
        InboxScope::Space(space_id) => ("space", space_id.as_str().to_string()),
        InboxScope::Account(account_id) => ("account", account_id.as_str().to_string()),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_space(&self, space: NewSpace) -> Result<()> {
        self.run(move |conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO spaces (space_id, created_at) VALUES (?1, ?2)",
                params![space.space_id.as_str(), now_millis()],
            )?;
            if inserted == 0 {
                return Err(StoreError::AlreadyExists(format!("space {}", space.space_id)));
            }

            insert_event(&tx, &space.space_id, 0, &space.event, &space.hash)?;
            insert_key_boxes(&tx, &space.space_id, &space.key_boxes)?;
            index_event(&tx, &space.space_id, &space.event)?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn append_space_event(&self, append: ChainAppend) -> Result<AppendResult> {
        self.run(move |conn| {
            let tx = conn.transaction()?;

            let current_tip = tip(&tx, &append.space_id)?;
            if current_tip != Some(append.expected_tip) {
                tracing::debug!(space_id = %append.space_id, "append lost the tip race");
                return Ok(AppendResult::Conflict { current_tip });
            }

            let seq: u64 = tx.query_row(
                "SELECT COUNT(*) FROM space_events WHERE space_id = ?1",
                params![append.space_id.as_str()],
                |row| row.get::<_, i64>(0),
            )? as u64;

            insert_event(&tx, &append.space_id, seq, &append.event, &append.hash)?;
            insert_key_boxes(&tx, &append.space_id, &append.key_boxes)?;
            index_event(&tx, &append.space_id, &append.event)?;

            tx.commit()?;
            Ok(AppendResult::Appended { seq })
        })
        .await
    }

    async fn get_space_events(&self, space_id: &SpaceId) -> Result<Vec<SpaceEvent>> {
        let space_id = space_id.clone();
        self.run(move |conn| {
            let mut stmt =
                conn.prepare("SELECT event FROM space_events WHERE space_id = ?1 ORDER BY seq")?;
            let blobs = stmt
                .query_map(params![space_id.as_str()], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            blobs.iter().map(|b| decode_cbor(b)).collect()
        })
        .await
    }

    async fn get_space_tip(&self, space_id: &SpaceId) -> Result<Option<EventHash>> {
        let space_id = space_id.clone();
        self.run(move |conn| tip(conn, &space_id)).await
    }

    async fn get_key_boxes(
        &self,
        space_id: &SpaceId,
        account_id: &AccountId,
    ) -> Result<Vec<KeyBoxWithKeyId>> {
        let space_id = space_id.clone();
        let account_id = account_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key_box FROM key_boxes
                 WHERE space_id = ?1 AND account_id = ?2 ORDER BY rowid",
            )?;
            let blobs = stmt
                .query_map(params![space_id.as_str(), account_id.as_str()], |row| {
                    row.get::<_, Vec<u8>>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            blobs.iter().map(|b| decode_cbor(b)).collect()
        })
        .await
    }

    async fn list_spaces_for_account(&self, account_id: &AccountId) -> Result<Vec<SpaceId>> {
        let account_id = account_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT space_id FROM space_members WHERE account_id = ?1 ORDER BY rowid",
            )?;
            let ids = stmt
                .query_map(params![account_id.as_str()], |row| {
                    row.get::<_, String>(0).map(SpaceId::from)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn list_invitations_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<InvitationRecord>> {
        let account_id = account_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT invitation_id, space_id, invitee_account_id, inviter_account_id
                 FROM invitations
                 WHERE invitee_account_id = ?1 AND accepted = 0
                 ORDER BY rowid",
            )?;
            let records = stmt
                .query_map(params![account_id.as_str()], |row| {
                    Ok(InvitationRecord {
                        id: row.get(0)?,
                        space_id: SpaceId::from(row.get::<_, String>(1)?),
                        invitee_account_id: AccountId::new(row.get::<_, String>(2)?),
                        inviter_account_id: AccountId::new(row.get::<_, String>(3)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn is_space_member(&self, space_id: &SpaceId, account_id: &AccountId) -> Result<bool> {
        let space_id = space_id.clone();
        let account_id = account_id.clone();
        self.run(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM space_members WHERE space_id = ?1 AND account_id = ?2",
                    params![space_id.as_str(), account_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn list_space_members(&self, space_id: &SpaceId) -> Result<Vec<AccountId>> {
        let space_id = space_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT account_id FROM space_members WHERE space_id = ?1 ORDER BY rowid",
            )?;
            let members = stmt
                .query_map(params![space_id.as_str()], |row| {
                    row.get::<_, String>(0).map(AccountId::new)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(members)
        })
        .await
    }

    async fn insert_update(&self, space_id: &SpaceId, update: NewUpdate) -> Result<u64> {
        let space_id = space_id.clone();
        self.run(move |conn| {
            // IMMEDIATE takes the write lock before reading the clock
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            let clock: i64 = tx.query_row(
                "SELECT COALESCE(MAX(clock), 0) + 1 FROM updates WHERE space_id = ?1",
                params![space_id.as_str()],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO updates (space_id, clock, update_id, account_id, payload, signature)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    space_id.as_str(),
                    clock,
                    update.update_id,
                    update.account_id.as_str(),
                    update.update,
                    encode_cbor(&update.signature)?,
                ],
            )?;

            tx.commit()?;
            Ok(clock as u64)
        })
        .await
    }

    async fn get_updates_since(
        &self,
        space_id: &SpaceId,
        after_clock: u64,
    ) -> Result<Vec<StoredUpdate>> {
        let space_id = space_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT clock, update_id, account_id, payload, signature FROM updates
                 WHERE space_id = ?1 AND clock > ?2 ORDER BY clock",
            )?;
            let rows = stmt
                .query_map(params![space_id.as_str(), after_clock as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(clock, update_id, account_id, update, signature)| {
                    Ok(StoredUpdate {
                        clock: clock as u64,
                        update_id,
                        account_id: AccountId::new(account_id),
                        update,
                        signature: decode_cbor::<RecoverableSignature>(&signature)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn insert_identity(&self, identity: IdentityRecord) -> Result<()> {
        self.run(move |conn| {
            let result = conn.execute(
                "INSERT INTO identities (account_id, record) VALUES (?1, ?2)",
                params![identity.account_id.as_str(), encode_cbor(&identity)?],
            );
            match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists(format!(
                    "identity {}",
                    identity.account_id
                ))),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_identity(&self, account_id: &AccountId) -> Result<Option<IdentityRecord>> {
        let account_id = account_id.clone();
        self.run(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT record FROM identities WHERE account_id = ?1",
                    params![account_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            blob.map(|b| decode_cbor(&b)).transpose()
        })
        .await
    }

    async fn create_account_inbox(&self, inbox: AccountInboxRecord) -> Result<()> {
        self.run(move |conn| {
            let result = conn.execute(
                "INSERT INTO account_inboxes (inbox_id, account_id, record) VALUES (?1, ?2, ?3)",
                params![
                    inbox.inbox_id.as_str(),
                    inbox.account_id.as_str(),
                    encode_cbor(&inbox)?
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    Err(StoreError::AlreadyExists(format!("inbox {}", inbox.inbox_id)))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn list_account_inboxes(&self, account_id: &AccountId) -> Result<Vec<AccountInboxRecord>> {
        let account_id = account_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT record FROM account_inboxes WHERE account_id = ?1 ORDER BY rowid",
            )?;
            let blobs = stmt
                .query_map(params![account_id.as_str()], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            blobs.iter().map(|b| decode_cbor(b)).collect()
        })
        .await
    }

    async fn get_account_inbox(
        &self,
        account_id: &AccountId,
        inbox_id: &InboxId,
    ) -> Result<Option<AccountInboxRecord>> {
        let account_id = account_id.clone();
        let inbox_id = inbox_id.clone();
        self.run(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT record FROM account_inboxes WHERE inbox_id = ?1 AND account_id = ?2",
                    params![inbox_id.as_str(), account_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            blob.map(|b| decode_cbor(&b)).transpose()
        })
        .await
    }

    async fn get_space_inbox(
        &self,
        space_id: &SpaceId,
        inbox_id: &InboxId,
    ) -> Result<Option<SpaceInboxRecord>> {
        let space_id = space_id.clone();
        let inbox_id = inbox_id.clone();
        self.run(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT record FROM space_inboxes WHERE inbox_id = ?1 AND space_id = ?2",
                    params![inbox_id.as_str(), space_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            blob.map(|b| {
                Ok(SpaceInboxRecord {
                    space_id: space_id.clone(),
                    inbox: decode_cbor(&b)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn list_space_inboxes(&self, space_id: &SpaceId) -> Result<Vec<SpaceInboxRecord>> {
        let space_id = space_id.clone();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare("SELECT record FROM space_inboxes WHERE space_id = ?1 ORDER BY rowid")?;
            let blobs = stmt
                .query_map(params![space_id.as_str()], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            blobs
                .iter()
                .map(|b| {
                    Ok(SpaceInboxRecord {
                        space_id: space_id.clone(),
                        inbox: decode_cbor(b)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn insert_inbox_message(
        &self,
        scope: &InboxScope,
        message: InboxMessageRecord,
    ) -> Result<()> {
        let (scope, owner_id) = scope_columns(scope);
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO inbox_messages (id, scope, owner_id, inbox_id, created_at, record)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    scope,
                    owner_id,
                    message.inbox_id.as_str(),
                    message.created_at.timestamp_millis(),
                    encode_cbor(&message)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_inbox_messages(
        &self,
        scope: &InboxScope,
        inbox_id: &InboxId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InboxMessageRecord>> {
        let (scope, owner_id) = scope_columns(scope);
        let inbox_id = inbox_id.clone();
        let since = since.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT record FROM inbox_messages
                 WHERE scope = ?1 AND owner_id = ?2 AND inbox_id = ?3 AND created_at > ?4
                 ORDER BY seq",
            )?;
            let blobs = stmt
                .query_map(params![scope, owner_id, inbox_id.as_str(), since], |row| {
                    row.get::<_, Vec<u8>>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            blobs.iter().map(|b| decode_cbor(b)).collect()
        })
        .await
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.run(move |conn| {
            let row: Option<(Vec<u8>, Option<i64>)> = conn
                .query_row(
                    "SELECT value, expires_at FROM kv WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row.and_then(|(value, at)| (!is_expired(at)).then_some(value)))
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let key = key.to_string();
        let expires = expires_at(ttl);
        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.take(key).await?.is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let row: Option<(Vec<u8>, Option<i64>)> = tx
                .query_row(
                    "SELECT value, expires_at FROM kv WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            tx.commit()?;
            Ok(row.and_then(|(value, at)| (!is_expired(at)).then_some(value)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn test_create_space_and_read_back() {
        let store = SqliteStore::open_memory().unwrap();
        check_create_space_and_read_back(&store).await;
    }

    #[tokio::test]
    async fn test_append_checks_tip() {
        let store = SqliteStore::open_memory().unwrap();
        check_append_checks_tip(&store).await;
    }

    #[tokio::test]
    async fn test_invitation_lifecycle() {
        let store = SqliteStore::open_memory().unwrap();
        check_invitation_lifecycle(&store).await;
    }

    #[tokio::test]
    async fn test_update_clocks() {
        let store = SqliteStore::open_memory().unwrap();
        check_update_clocks(&store).await;
    }

    #[tokio::test]
    async fn test_identities() {
        let store = SqliteStore::open_memory().unwrap();
        check_identities(&store).await;
    }

    #[tokio::test]
    async fn test_inboxes() {
        let store = SqliteStore::open_memory().unwrap();
        check_inboxes(&store).await;
    }

    #[tokio::test]
    async fn test_inbox_messages_are_scoped() {
        let store = SqliteStore::open_memory().unwrap();
        check_inbox_messages_are_scoped(&store).await;
    }

    #[tokio::test]
    async fn test_key_value_ttl() {
        let store = SqliteStore::open_memory().unwrap();
        check_key_value_ttl(&store).await;
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");
        let space_id = {
            let store = SqliteStore::open(&path).unwrap();
            check_create_space_and_read_back(&store).await
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_space_events(&space_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_update_clocks_are_gap_free() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        check_concurrent_update_clocks(store).await;
    }
}
