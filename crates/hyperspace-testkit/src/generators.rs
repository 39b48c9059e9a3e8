//! Proptest generators for property-based testing.

use proptest::prelude::*;

use hyperspace_core::{
    AccountId, EventHash, InboxAuthPolicy, KeyId, SignatureKeypair, SpaceEvent, SpaceId,
    Transaction,
};

/// Generate a signing keypair.
pub fn keypair() -> impl Strategy<Value = SignatureKeypair> {
    any::<[u8; 32]>()
        .prop_filter_map("valid secp256k1 scalar", |seed| {
            SignatureKeypair::from_bytes(&seed).ok()
        })
}

/// Generate an account id (a lowercase Ethereum address).
pub fn account_id() -> impl Strategy<Value = AccountId> {
    any::<[u8; 20]>().prop_map(|bytes| AccountId::new(format!("0x{}", hex::encode(bytes))))
}

pub fn space_id() -> impl Strategy<Value = SpaceId> {
    "[a-z0-9]{8,24}".prop_map(|s| SpaceId::from(s.as_str()))
}

pub fn key_id() -> impl Strategy<Value = KeyId> {
    "[a-f0-9]{16}".prop_map(|s| KeyId::from(s.as_str()))
}

pub fn event_hash() -> impl Strategy<Value = EventHash> {
    any::<[u8; 32]>().prop_map(EventHash::from)
}

pub fn auth_policy() -> impl Strategy<Value = InboxAuthPolicy> {
    prop_oneof![
        Just(InboxAuthPolicy::Anonymous),
        Just(InboxAuthPolicy::OptionalAuth),
        Just(InboxAuthPolicy::RequiresAuth),
    ]
}

/// Update payload bytes of at most `max_len`.
pub fn update_payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for a signed root event.
#[derive(Debug, Clone)]
pub struct RootEventParams {
    pub keypair: SignatureKeypair,
    pub space_id: SpaceId,
    pub key_id: KeyId,
}

impl Arbitrary for RootEventParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (keypair(), space_id(), key_id())
            .prop_map(|(keypair, space_id, key_id)| RootEventParams {
                keypair,
                space_id,
                key_id,
            })
            .boxed()
    }
}

/// Sign the root event described by `params`.
pub fn root_event_from_params(params: &RootEventParams) -> SpaceEvent {
    SpaceEvent::sign(
        Transaction::create_space(params.space_id.clone(), params.key_id.clone()),
        params.keypair.address(),
        &params.keypair,
    )
    .expect("event signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::{apply_event, fold_events};

    proptest! {
        #[test]
        fn test_root_event_hash_deterministic(params: RootEventParams) {
            let e1 = root_event_from_params(&params);
            let e2 = root_event_from_params(&params);
            // Signatures are RFC 6979 deterministic
            prop_assert_eq!(e1.hash(), e2.hash());
        }

        #[test]
        fn test_root_event_always_applies(params: RootEventParams) {
            let event = root_event_from_params(&params);
            let state = apply_event(&event, None).unwrap();
            prop_assert!(state.is_member(&params.keypair.address()));
            prop_assert_eq!(state.last_event_hash, event.hash());
        }

        #[test]
        fn test_tampered_root_event_is_rejected(params: RootEventParams, other in key_id()) {
            prop_assume!(other != params.key_id);
            let mut event = root_event_from_params(&params);
            event.transaction = Transaction::create_space(params.space_id.clone(), other);
            prop_assert!(fold_events(&[event]).is_err());
        }

        #[test]
        fn test_invitation_on_wrong_tip_conflicts(
            params: RootEventParams,
            invitee in account_id(),
            bogus in event_hash(),
        ) {
            let root = root_event_from_params(&params);
            prop_assume!(bogus != root.hash());
            let state = apply_event(&root, None).unwrap();
            let invitation = SpaceEvent::sign(
                Transaction::create_invitation(bogus, invitee, vec![params.key_id.clone()]),
                params.keypair.address(),
                &params.keypair,
            ).unwrap();
            prop_assert!(apply_event(&invitation, Some(&state)).is_err());
        }
    }
}
