//! Space state: a fold over the space's event chain.
//!
//! State is never stored on its own. Every party derives it by replaying
//! the same ordered events through [`apply_event`], so the server and every
//! client reach identical membership and key generation views.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::crypto::SignaturePublicKey;
use crate::encoding::{hex_array, hex_vec};
use crate::error::ValidationError;
use crate::event::{SpaceEvent, Transaction};
use crate::inbox::InboxAuthPolicy;
use crate::types::{AccountId, EventHash, InboxId, KeyId, SpaceId};
use crate::validation::validate_event;

/// Role of a member within a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Member,
}

/// A member as recorded by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub account_id: AccountId,
    pub signature_public_key: SignaturePublicKey,
    pub role: MemberRole,
}

/// An invitation that has not been accepted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInvitation {
    /// Id of the `create-invitation` event.
    pub id: String,
    pub invitee_account_id: AccountId,
    pub inviter_account_id: AccountId,
}

/// An inbox owned by the space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceInbox {
    pub inbox_id: InboxId,
    #[serde(with = "hex_array")]
    pub encryption_public_key: [u8; 32],
    #[serde(with = "hex_vec")]
    pub secret_key: Vec<u8>,
    pub is_public: bool,
    pub auth_policy: InboxAuthPolicy,
}

/// Derived state of an initialized space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceState {
    pub id: SpaceId,
    pub members: BTreeMap<AccountId, Member>,
    pub invitations: BTreeMap<String, PendingInvitation>,
    /// Active key generations, oldest first.
    pub key_ids: Vec<KeyId>,
    pub inboxes: BTreeMap<InboxId, SpaceInbox>,
    /// Ids of every applied event. An id is never reused within a space.
    pub event_ids: BTreeSet<String>,
    /// Hash of the last applied event: the chain tip.
    pub last_event_hash: EventHash,
    pub event_count: u64,
}

impl SpaceState {
    /// Check whether an account is a member.
    pub fn is_member(&self, account_id: &AccountId) -> bool {
        self.members.contains_key(account_id)
    }

    /// The outstanding invitation addressed to `account_id`, if any.
    pub fn invitation_for(&self, account_id: &AccountId) -> Option<&PendingInvitation> {
        self.invitations
            .values()
            .find(|inv| &inv.invitee_account_id == account_id)
    }
}

/// Apply one event to a space.
///
/// `state` is `None` for an uninitialized space. On success the new state is
/// returned; on failure the input is untouched.
pub fn apply_event(
    event: &SpaceEvent,
    state: Option<&SpaceState>,
) -> Result<SpaceState, ValidationError> {
    validate_event(event, state)?;

    let hash = event.hash();
    let author = &event.author;

    let mut next = match (&event.transaction, state) {
        (Transaction::CreateSpace(t), None) => {
            let mut members = BTreeMap::new();
            members.insert(
                author.account_id.clone(),
                Member {
                    account_id: author.account_id.clone(),
                    signature_public_key: author.signature_public_key,
                    role: MemberRole::Admin,
                },
            );
            SpaceState {
                id: t.id.clone(),
                members,
                invitations: BTreeMap::new(),
                key_ids: vec![t.key_id.clone()],
                inboxes: BTreeMap::new(),
                event_ids: BTreeSet::new(),
                last_event_hash: hash,
                event_count: 0,
            }
        }
        (Transaction::CreateInvitation(t), Some(prev)) => {
            let mut next = prev.clone();
            next.invitations.insert(
                t.id.clone(),
                PendingInvitation {
                    id: t.id.clone(),
                    invitee_account_id: t.invitee_account_id.clone(),
                    inviter_account_id: author.account_id.clone(),
                },
            );
            next
        }
        (Transaction::AcceptInvitation(_), Some(prev)) => {
            let mut next = prev.clone();
            next.invitations
                .retain(|_, inv| inv.invitee_account_id != author.account_id);
            next.members.insert(
                author.account_id.clone(),
                Member {
                    account_id: author.account_id.clone(),
                    signature_public_key: author.signature_public_key,
                    role: MemberRole::Member,
                },
            );
            next
        }
        (Transaction::CreateSpaceInbox(t), Some(prev)) => {
            let mut next = prev.clone();
            next.inboxes.insert(
                t.inbox_id.clone(),
                SpaceInbox {
                    inbox_id: t.inbox_id.clone(),
                    encryption_public_key: t.encryption_public_key,
                    secret_key: t.secret_key.clone(),
                    is_public: t.is_public,
                    auth_policy: t.auth_policy,
                },
            );
            next
        }
        (Transaction::RotateKey(t), Some(prev)) => {
            let mut next = prev.clone();
            next.key_ids.push(t.key_id.clone());
            next
        }
        // validate_event rejects every other pairing
        (_, _) => {
            return Err(ValidationError::StructuralError(
                "event does not fit the space state".into(),
            ))
        }
    };

    next.event_ids.insert(event.transaction.id().to_string());
    next.last_event_hash = hash;
    next.event_count += 1;
    Ok(next)
}

/// Fold an ordered event list into state.
pub fn fold_events(events: &[SpaceEvent]) -> Result<Option<SpaceState>, ValidationError> {
    let mut state: Option<SpaceState> = None;
    for event in events {
        state = Some(apply_event(event, state.as_ref())?);
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SignatureKeypair;

    struct Party {
        kp: SignatureKeypair,
    }

    impl Party {
        fn new(seed: u8) -> Self {
            Self {
                kp: SignatureKeypair::from_bytes(&[seed; 32]).unwrap(),
            }
        }

        fn account(&self) -> AccountId {
            self.kp.address()
        }

        fn sign(&self, tx: Transaction) -> SpaceEvent {
            SpaceEvent::sign(tx, self.account(), &self.kp).unwrap()
        }
    }

    fn create(alice: &Party) -> (SpaceEvent, SpaceState) {
        let event = alice.sign(Transaction::create_space(
            SpaceId::from("space-1"),
            KeyId::from("key-1"),
        ));
        let state = apply_event(&event, None).unwrap();
        (event, state)
    }

    #[test]
    fn test_create_space() {
        let alice = Party::new(1);
        let (event, state) = create(&alice);

        assert_eq!(state.id, SpaceId::from("space-1"));
        assert_eq!(state.event_count, 1);
        assert_eq!(state.last_event_hash, event.hash());
        assert_eq!(state.key_ids, vec![KeyId::from("key-1")]);
        assert_eq!(state.members[&alice.account()].role, MemberRole::Admin);
    }

    #[test]
    fn test_invite_accept_invite() {
        let alice = Party::new(1);
        let bob = Party::new(2);
        let carol = Party::new(3);
        let (_, s1) = create(&alice);

        let invite_bob = alice.sign(Transaction::create_invitation(
            s1.last_event_hash,
            bob.account(),
            s1.key_ids.clone(),
        ));
        let s2 = apply_event(&invite_bob, Some(&s1)).unwrap();
        assert_eq!(s2.event_count, 2);
        assert!(s2.invitation_for(&bob.account()).is_some());
        assert!(!s2.is_member(&bob.account()));

        let accept = bob.sign(Transaction::accept_invitation(s2.last_event_hash));
        let s3 = apply_event(&accept, Some(&s2)).unwrap();
        assert_eq!(s3.event_count, 3);
        assert!(s3.is_member(&bob.account()));
        assert!(s3.invitation_for(&bob.account()).is_none());

        // Bob's own invitation is authorized by the state before it
        let invite_carol = bob.sign(Transaction::create_invitation(
            s3.last_event_hash,
            carol.account(),
            s3.key_ids.clone(),
        ));
        let s4 = apply_event(&invite_carol, Some(&s3)).unwrap();
        assert_eq!(s4.invitations.len(), 1);
    }

    #[test]
    fn test_reused_invitation_id_keeps_first_invitation() {
        let alice = Party::new(1);
        let bob = Party::new(2);
        let carol = Party::new(3);
        let (_, s1) = create(&alice);

        let invite = |state: &SpaceState, invitee: &Party| {
            let mut tx = Transaction::create_invitation(
                state.last_event_hash,
                invitee.account(),
                state.key_ids.clone(),
            );
            if let Transaction::CreateInvitation(t) = &mut tx {
                t.id = "same".into();
            }
            alice.sign(tx)
        };

        let s2 = apply_event(&invite(&s1, &bob), Some(&s1)).unwrap();
        assert!(s2.event_ids.contains("same"));

        let err = apply_event(&invite(&s2, &carol), Some(&s2)).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateEventId("same".into()));
        assert!(s2.invitation_for(&bob.account()).is_some());
        assert_eq!(s2.invitations.len(), 1);
    }

    #[test]
    fn test_rotation_extends_key_generations() {
        let alice = Party::new(1);
        let bob = Party::new(2);
        let mallory = Party::new(9);
        let (_, s1) = create(&alice);

        let rotate = alice.sign(Transaction::rotate_key(s1.last_event_hash, KeyId::from("key-2")));
        let s2 = apply_event(&rotate, Some(&s1)).unwrap();
        assert_eq!(s2.key_ids, vec![KeyId::from("key-1"), KeyId::from("key-2")]);

        // Invitations must now cover both generations
        let stale = alice.sign(Transaction::create_invitation(
            s2.last_event_hash,
            bob.account(),
            s1.key_ids.clone(),
        ));
        assert!(matches!(
            apply_event(&stale, Some(&s2)),
            Err(ValidationError::KeyGenerationMismatch { .. })
        ));
        let invite = alice.sign(Transaction::create_invitation(
            s2.last_event_hash,
            bob.account(),
            s2.key_ids.clone(),
        ));
        assert!(apply_event(&invite, Some(&s2)).is_ok());

        let rogue = mallory.sign(Transaction::rotate_key(s2.last_event_hash, KeyId::from("key-3")));
        assert!(matches!(
            apply_event(&rogue, Some(&s2)),
            Err(ValidationError::NotAMember(_))
        ));
    }

    #[test]
    fn test_failed_apply_leaves_state_untouched() {
        let alice = Party::new(1);
        let mallory = Party::new(9);
        let (_, s1) = create(&alice);
        let before = s1.clone();

        let rogue = mallory.sign(Transaction::create_invitation(
            s1.last_event_hash,
            mallory.account(),
            s1.key_ids.clone(),
        ));
        assert!(apply_event(&rogue, Some(&s1)).is_err());
        assert_eq!(s1, before);
    }

    #[test]
    fn test_fold_matches_incremental() {
        let alice = Party::new(1);
        let bob = Party::new(2);
        let (e1, s1) = create(&alice);
        let e2 = alice.sign(Transaction::create_invitation(
            s1.last_event_hash,
            bob.account(),
            s1.key_ids.clone(),
        ));
        let s2 = apply_event(&e2, Some(&s1)).unwrap();
        let e3 = bob.sign(Transaction::accept_invitation(s2.last_event_hash));
        let s3 = apply_event(&e3, Some(&s2)).unwrap();

        let folded = fold_events(&[e1, e2, e3]).unwrap().unwrap();
        assert_eq!(folded, s3);
    }

    #[test]
    fn test_fold_empty_is_uninitialized() {
        assert_eq!(fold_events(&[]).unwrap(), None);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn chain(invitees: &[u8]) -> Vec<SpaceEvent> {
            let alice = Party::new(1);
            let (root, mut state) = create(&alice);
            let mut events = vec![root];
            for seed in invitees {
                let invitee = Party::new(*seed);
                let event = alice.sign(Transaction::create_invitation(
                    state.last_event_hash,
                    invitee.account(),
                    state.key_ids.clone(),
                ));
                state = apply_event(&event, Some(&state)).unwrap();
                events.push(event);
            }
            events
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn prop_fold_is_deterministic(
                invitees in proptest::collection::btree_set(2u8..=200, 0..6)
            ) {
                let invitees: Vec<u8> = invitees.into_iter().collect();
                let events = chain(&invitees);
                let a = fold_events(&events).unwrap().unwrap();
                let b = fold_events(&events).unwrap().unwrap();
                prop_assert_eq!(&a, &b);
                prop_assert_eq!(a.event_count, events.len() as u64);
                prop_assert_eq!(a.invitations.len(), invitees.len());
            }

            #[test]
            fn prop_reordered_chain_is_rejected(
                invitees in proptest::collection::btree_set(2u8..=200, 2..6)
            ) {
                let invitees: Vec<u8> = invitees.into_iter().collect();
                let mut events = chain(&invitees);
                events.swap(1, 2);
                let is_conflict = matches!(
                    fold_events(&events),
                    Err(ValidationError::ChainConflict { .. })
                );
                prop_assert!(is_conflict);
            }
        }
    }
}
