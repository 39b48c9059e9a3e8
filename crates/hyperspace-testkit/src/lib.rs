//! # Hyperspace Testkit
//!
//! Testing utilities for Hyperspace.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: accounts with registered identities, and spaces whose
//!   events they sign
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! Quickly set up a shared space:
//!
//! ```rust
//! use hyperspace_testkit::{multi_party_accounts, TestSpace};
//!
//! let accounts = multi_party_accounts(2);
//! let (mut space, created) = TestSpace::create(&accounts[0]);
//! let (invitation, key_boxes) = space.invite(&accounts[0], &accounts[1]);
//! let acceptance = space.accept(&accounts[1]);
//! assert_eq!(space.events.len(), 3);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use hyperspace_testkit::generators::{root_event_from_params, RootEventParams};
//!
//! proptest! {
//!     #[test]
//!     fn root_hash_is_deterministic(params: RootEventParams) {
//!         let e1 = root_event_from_params(&params);
//!         let e2 = root_event_from_params(&params);
//!         prop_assert_eq!(e1.hash(), e2.hash());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_party_accounts, CreatedSpace, TestAccount, TestSpace};
