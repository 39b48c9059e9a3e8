//! # Hyperspace Core
//!
//! Pure primitives for Hyperspace: identities, signed space events, the
//! event reducer and canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`SpaceEvent`] - A signed, hash-linked entry in a space's chain
//! - [`SpaceState`] - The fold of a space's events
//! - [`EventHash`] - Content-addressed identifier (Blake3 hash)
//! - [`AccountId`] - Ethereum address of the account owning an identity
//! - [`SignatureKeypair`] - secp256k1 key that signs events, updates and messages
//!
//! ## Canonicalization
//!
//! Every signed structure is encoded using deterministic CBOR before signing
//! or hashing. See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod event;
pub mod inbox;
pub mod state;
pub mod types;
pub mod update;
pub mod validation;

pub use canonical::{event_canonical_bytes, event_signing_bytes};
pub use crypto::{
    eth_message_hash, keccak256, recover_personal_address, recover_personal_signer, LocalWallet,
    RecoverableSignature, SignatureKeypair, SignaturePublicKey, WalletSigner,
};
pub use error::{CoreError, InboxError, ValidationError};
pub use event::{
    AcceptInvitation, CreateInvitation, CreateSpace, CreateSpaceInbox, EventAuthor, RotateKey,
    SpaceEvent, Transaction,
};
pub use inbox::{check_auth_policy, InboxAuthPolicy, InboxScope, SignedClaim};
pub use state::{apply_event, fold_events, Member, MemberRole, PendingInvitation, SpaceInbox, SpaceState};
pub use types::{AccountId, EventHash, InboxId, KeyId, SpaceId};
pub use update::{recover_update_signer, sign_update, update_signing_bytes};
pub use validation::validate_event;
