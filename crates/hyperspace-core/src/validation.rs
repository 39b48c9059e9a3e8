//! Event validation: chain linkage, signature, authorization, structure.
//!
//! Every party runs these checks in the same order, against the state as it
//! was before the event.

use crate::error::ValidationError;
use crate::event::{SpaceEvent, Transaction};
use crate::state::SpaceState;

/// Validate an event against the state that precedes it.
///
/// This performs, in order:
/// 1. Chain linkage (root has no predecessor, others extend the tip)
/// 2. Signature recovery against the declared author key
/// 3. Authorization of the author given the prior state
/// 4. Variant-specific structural rules
pub fn validate_event(
    event: &SpaceEvent,
    state: Option<&SpaceState>,
) -> Result<(), ValidationError> {
    // 1. Chain linkage
    let expected = state.map(|s| s.last_event_hash);
    let got = event.previous_event_hash();
    if expected != got {
        return Err(ValidationError::ChainConflict { expected, got });
    }

    // 2. Signature
    event.verify_signature()?;

    // 3. Authorization
    let author = &event.author;
    match (&event.transaction, state) {
        (Transaction::CreateSpace(t), None) => {
            if t.id.as_str().is_empty() {
                return Err(ValidationError::StructuralError("space id is empty".into()));
            }
            if t.key_id.as_str().is_empty() {
                return Err(ValidationError::StructuralError("key id is empty".into()));
            }
            return Ok(());
        }
        (Transaction::AcceptInvitation(_), Some(state)) => {
            if state.is_member(&author.account_id) {
                return Err(ValidationError::AlreadyMember(author.account_id.clone()));
            }
            if state.invitation_for(&author.account_id).is_none() {
                return Err(ValidationError::NoInvitation(author.account_id.clone()));
            }
            return Ok(());
        }
        (_, Some(state)) => {
            let member = state
                .members
                .get(&author.account_id)
                .ok_or_else(|| ValidationError::NotAMember(author.account_id.clone()))?;
            if member.signature_public_key != author.signature_public_key {
                return Err(ValidationError::AuthorKeyMismatch(author.account_id.clone()));
            }
        }
        (_, None) => {
            // Unreachable after the linkage check: only the root lacks a predecessor.
            return Err(ValidationError::StructuralError(
                "space is not initialized".into(),
            ));
        }
    }

    // 4. Structure
    let Some(state) = state else {
        return Ok(());
    };
    match &event.transaction {
        Transaction::CreateInvitation(t) => {
            if state.is_member(&t.invitee_account_id) {
                return Err(ValidationError::AlreadyMember(t.invitee_account_id.clone()));
            }
            if state.invitation_for(&t.invitee_account_id).is_some() {
                return Err(ValidationError::DuplicateInvitation(
                    t.invitee_account_id.clone(),
                ));
            }
            if t.key_ids != state.key_ids {
                return Err(ValidationError::KeyGenerationMismatch {
                    expected: state.key_ids.clone(),
                    got: t.key_ids.clone(),
                });
            }
        }
        Transaction::CreateSpaceInbox(t) => {
            if t.inbox_id.as_str().is_empty() {
                return Err(ValidationError::StructuralError("inbox id is empty".into()));
            }
            if state.inboxes.contains_key(&t.inbox_id) {
                return Err(ValidationError::DuplicateInbox(t.inbox_id.clone()));
            }
        }
        Transaction::RotateKey(t) => {
            if t.key_id.as_str().is_empty() {
                return Err(ValidationError::StructuralError("key id is empty".into()));
            }
            if state.key_ids.contains(&t.key_id) {
                return Err(ValidationError::DuplicateKeyGeneration(t.key_id.clone()));
            }
        }
        Transaction::CreateSpace(_) | Transaction::AcceptInvitation(_) => {}
    }

    let id = event.transaction.id();
    if id.is_empty() {
        return Err(ValidationError::StructuralError("event id is empty".into()));
    }
    if state.event_ids.contains(id) {
        return Err(ValidationError::DuplicateEventId(id.to_string()));
    }

    Ok(())
}
