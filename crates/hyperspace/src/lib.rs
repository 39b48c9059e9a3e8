//! # Hyperspace
//!
//! The relay server for Hyperspace: end-to-end encrypted spaces shared
//! between wallet-backed identities.
//!
//! ## Overview
//!
//! The relay never sees plaintext. It stores and forwards:
//!
//! - **Space events**: signed, hash-chained membership changes, validated
//!   by the reducer in [`hyperspace_core`] before they are appended
//! - **Key boxes**: space keys sealed to each member's X25519 key
//! - **Updates**: opaque CRDT deltas, numbered by a per-space clock
//! - **Inbox messages**: posts to space or account inboxes, checked against
//!   the inbox's auth policy
//!
//! ## Surfaces
//!
//! - WebSocket (`GET /?token=`): the sync protocol in [`hyperspace_sync`],
//!   dispatched by [`ws::dispatch`] onto [`SpaceService`]
//! - HTTP: Sign-In with Ethereum, identity registration and lookup, and the
//!   public inbox routes, see [`app::router`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hyperspace::{app, AppState, ServerConfig};
//! use hyperspace::store::SqliteStore;
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let config = ServerConfig::default();
//!     let store = Arc::new(SqliteStore::open("hyperspace.db").unwrap());
//!     let state = AppState::new(store, config.clone());
//!
//!     let listener = tokio::net::TcpListener::bind(config.listen).await.unwrap();
//!     app::serve(listener, app::router(state), async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `hyperspace::core` - events, signatures and the reducer
//! - `hyperspace::keys` - identities, key boxes and keyrings
//! - `hyperspace::store` - storage traits, SQLite and in-memory backends
//! - `hyperspace::sync` - wire messages, connection registry, space locks

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod seed;
pub mod service;
pub mod siwe;
pub mod ws;

// Re-export component crates
pub use hyperspace_core as core;
pub use hyperspace_keys as keys;
pub use hyperspace_store as store;
pub use hyperspace_sync as sync;

pub use app::AppState;
pub use auth::{Auth, LoginRequest, RegisterIdentityRequest};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use service::{InboxInfo, PostInboxMessage, SpaceService};
pub use siwe::SiweMessage;
