//! # Hyperspace Sync
//!
//! Transport-independent pieces of the relay protocol.
//!
//! ## Overview
//!
//! Clients hold one WebSocket per device. Each frame is a JSON [`Request`]
//! or [`Response`] discriminated by `type`. The relay keeps a
//! [`ConnectionRegistry`] of who is connected and subscribed to which
//! spaces, and a [`SpaceLocks`] table so writes to one space apply one at a
//! time.
//!
//! ## Message Flow
//!
//! ```text
//! Alice                          Relay                          Bob
//!   |-- create-invitation-event -->|                              |
//!   |                              |-- validate against tip       |
//!   |                              |-- persist                    |
//!   |<------- space-event ---------|-------- space-event -------->|
//!   |                              |------ list-invitations ----->| (invitee)
//!   |-- create-update ------------>|                              |
//!   |<--- update-confirmed --------|--- updates-notification ---->|
//! ```
//!
//! ## Key Properties
//!
//! - **Serialized per space**: chain appends and clock assignment never race
//! - **At-most-once fan-out**: a full outbound queue drops, never blocks
//! - **Typed errors**: every failed request gets an `error` with a code

pub mod error;
pub mod locks;
pub mod messages;
pub mod registry;

pub use error::{Result, SyncError};
pub use locks::{SpaceGuard, SpaceLocks};
pub use messages::{limits, ErrorCode, Request, Response, Updates};
pub use registry::{ConnectionId, ConnectionRegistry, Delivery};
