//! # Hyperspace Store
//!
//! Storage abstraction for the Hyperspace relay. Provides a trait-based
//! interface for spaces, updates, identities and inboxes with SQLite and
//! in-memory implementations.
//!
//! ## Overview
//!
//! The relay talks to persistence only through the [`Store`] and
//! [`KeyValueStore`] traits. The primary implementation is [`SqliteStore`],
//! with [`MemoryStore`] for tests. [`IdentityStore`] is the client-side
//! device store built on any [`KeyValueStore`].
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for relay storage
//! - [`KeyValueStore`] - Get/set/delete with optional expiry
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`AppendResult`] - Outcome of a tip-checked append
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hyperspace_store::{SqliteStore, Store};
//! use hyperspace_core::SpaceId;
//!
//! async fn example() -> hyperspace_store::Result<()> {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("hyperspace.db")?;
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory()?;
//!
//!     let tip = store.get_space_tip(&SpaceId::from("unknown")).await?;
//!     assert!(tip.is_none());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic spaces**: root event, key boxes and membership land together
//! - **Tip check**: appends report `Conflict` instead of forking the chain
//! - **Gap-free clocks**: update clocks are `max + 1` per space

pub mod error;
pub mod identity_store;
pub mod memory;
pub mod migration;
pub mod records;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use error::{Result, StoreError};
pub use identity_store::{IdentityStore, SavedIdentity};
pub use memory::MemoryStore;
pub use records::{
    AccountInboxRecord, AppendResult, ChainAppend, IdentityRecord, InboxMessageRecord,
    InvitationRecord, NewSpace, NewUpdate, SpaceInboxRecord, StoredUpdate,
};
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, Store};
