//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::traits::now_millis;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 3;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        3 => apply_v3(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: spaces, events, key boxes, updates, identities.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE spaces (
            space_id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        );

        -- The chain: one row per event, seq starts at 0
        CREATE TABLE space_events (
            space_id TEXT NOT NULL REFERENCES spaces(space_id),
            seq INTEGER NOT NULL,
            event_id TEXT NOT NULL,
            hash BLOB NOT NULL,               -- 32 bytes, Blake3 of canonical bytes
            event BLOB NOT NULL,              -- CBOR-encoded SpaceEvent
            created_at INTEGER NOT NULL,
            PRIMARY KEY (space_id, seq)
        );

        CREATE TABLE key_boxes (
            space_id TEXT NOT NULL REFERENCES spaces(space_id),
            key_id TEXT NOT NULL,
            account_id TEXT NOT NULL,
            key_box BLOB NOT NULL,            -- CBOR-encoded KeyBoxWithKeyId
            PRIMARY KEY (space_id, key_id, account_id)
        );

        CREATE TABLE space_members (
            space_id TEXT NOT NULL REFERENCES spaces(space_id),
            account_id TEXT NOT NULL,
            PRIMARY KEY (space_id, account_id)
        );

        CREATE TABLE invitations (
            space_id TEXT NOT NULL REFERENCES spaces(space_id),
            invitation_id TEXT NOT NULL,
            invitee_account_id TEXT NOT NULL,
            inviter_account_id TEXT NOT NULL,
            accepted INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (space_id, invitation_id)
        );

        CREATE TABLE updates (
            space_id TEXT NOT NULL REFERENCES spaces(space_id),
            clock INTEGER NOT NULL,
            update_id TEXT NOT NULL,
            account_id TEXT NOT NULL,
            payload BLOB NOT NULL,
            signature BLOB NOT NULL,          -- CBOR-encoded RecoverableSignature
            PRIMARY KEY (space_id, clock)
        );

        CREATE TABLE identities (
            account_id TEXT PRIMARY KEY,
            record BLOB NOT NULL              -- CBOR-encoded IdentityRecord
        );

        CREATE INDEX idx_members_account ON space_members(account_id);
        CREATE INDEX idx_invitations_invitee ON invitations(invitee_account_id, accepted);
        "#,
    )?;

    Ok(())
}

/// Migration v2: inboxes and the key-value table.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE account_inboxes (
            inbox_id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            record BLOB NOT NULL              -- CBOR-encoded AccountInboxRecord
        );

        CREATE TABLE space_inboxes (
            inbox_id TEXT PRIMARY KEY,
            space_id TEXT NOT NULL REFERENCES spaces(space_id),
            record BLOB NOT NULL              -- CBOR-encoded SpaceInbox
        );

        CREATE TABLE inbox_messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            inbox_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,      -- Unix ms
            record BLOB NOT NULL              -- CBOR-encoded InboxMessageRecord
        );

        CREATE TABLE kv (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            expires_at INTEGER                -- Unix ms, NULL = never
        );

        CREATE INDEX idx_account_inboxes_account ON account_inboxes(account_id);
        CREATE INDEX idx_space_inboxes_space ON space_inboxes(space_id);
        CREATE INDEX idx_inbox_messages_inbox ON inbox_messages(inbox_id, created_at);
        "#,
    )?;

    Ok(())
}

/// Migration v3: inbox ids are unique per owner, messages carry their owner.
///
/// Messages written under v2 are kept only when their inbox id names exactly
/// one inbox; the others cannot be attributed.
fn apply_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE inbox_messages_v3 (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            scope TEXT NOT NULL,              -- 'space' or 'account'
            owner_id TEXT NOT NULL,           -- space id or account id
            inbox_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,      -- Unix ms
            record BLOB NOT NULL              -- CBOR-encoded InboxMessageRecord
        );

        INSERT INTO inbox_messages_v3 (seq, id, scope, owner_id, inbox_id, created_at, record)
        SELECT m.seq, m.id, o.scope, o.owner_id, m.inbox_id, m.created_at, m.record
        FROM inbox_messages m
        JOIN (
            SELECT 'space' AS scope, space_id AS owner_id, inbox_id FROM space_inboxes
            UNION ALL
            SELECT 'account', account_id, inbox_id FROM account_inboxes
        ) o ON o.inbox_id = m.inbox_id
        WHERE (SELECT COUNT(*) FROM space_inboxes s WHERE s.inbox_id = m.inbox_id)
            + (SELECT COUNT(*) FROM account_inboxes a WHERE a.inbox_id = m.inbox_id) = 1;

        DROP TABLE inbox_messages;
        ALTER TABLE inbox_messages_v3 RENAME TO inbox_messages;
        CREATE INDEX idx_inbox_messages_owner
            ON inbox_messages(scope, owner_id, inbox_id, created_at);

        CREATE TABLE space_inboxes_v3 (
            space_id TEXT NOT NULL REFERENCES spaces(space_id),
            inbox_id TEXT NOT NULL,
            record BLOB NOT NULL,             -- CBOR-encoded SpaceInbox
            PRIMARY KEY (space_id, inbox_id)
        );
        INSERT INTO space_inboxes_v3 (space_id, inbox_id, record)
            SELECT space_id, inbox_id, record FROM space_inboxes ORDER BY rowid;
        DROP TABLE space_inboxes;
        ALTER TABLE space_inboxes_v3 RENAME TO space_inboxes;

        CREATE TABLE account_inboxes_v3 (
            account_id TEXT NOT NULL,
            inbox_id TEXT NOT NULL,
            record BLOB NOT NULL,             -- CBOR-encoded AccountInboxRecord
            PRIMARY KEY (account_id, inbox_id)
        );
        INSERT INTO account_inboxes_v3 (account_id, inbox_id, record)
            SELECT account_id, inbox_id, record FROM account_inboxes ORDER BY rowid;
        DROP TABLE account_inboxes;
        ALTER TABLE account_inboxes_v3 RENAME TO account_inboxes;
        "#,
    )?;

    Ok(())
}
