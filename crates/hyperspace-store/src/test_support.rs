//! Backend-agnostic checks run against every store implementation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use hyperspace_core::{
    apply_event, AccountId, InboxAuthPolicy, InboxId, InboxScope, KeyId, SignatureKeypair, SpaceEvent,
    SpaceId, SpaceState, Transaction,
};
use hyperspace_keys::{
    create_identity, IdentityKeyBox, KeyBox, KeyBoxWithKeyId, X25519StaticSecret,
};

use crate::records::*;
use crate::traits::{KeyValueStore, Store};

pub(crate) struct Member {
    pub kp: SignatureKeypair,
    pub enc: X25519StaticSecret,
}

impl Member {
    pub fn new(seed: u8) -> Self {
        Self {
            kp: SignatureKeypair::from_bytes(&[seed; 32]).unwrap(),
            enc: X25519StaticSecret::from_bytes([seed; 32]),
        }
    }

    pub fn account(&self) -> AccountId {
        self.kp.address()
    }

    pub fn sign(&self, tx: Transaction) -> SpaceEvent {
        SpaceEvent::sign(tx, self.account(), &self.kp).unwrap()
    }

    pub fn key_box(&self, to: &Member, key_id: &str) -> KeyBoxWithKeyId {
        KeyBox::seal(to.account(), &to.enc.public_key(), &self.enc, &[9u8; 32])
            .unwrap()
            .with_key_id(KeyId::from(key_id))
    }
}

pub(crate) async fn seed_space<S: Store>(store: &S, alice: &Member) -> (SpaceId, SpaceState) {
    let space_id = SpaceId::random();
    let event = alice.sign(Transaction::create_space(space_id.clone(), KeyId::from("k1")));
    let state = apply_event(&event, None).unwrap();
    store
        .create_space(NewSpace {
            space_id: space_id.clone(),
            hash: event.hash(),
            event,
            key_boxes: vec![alice.key_box(alice, "k1")],
        })
        .await
        .unwrap();
    (space_id, state)
}

pub(crate) async fn append<S: Store>(
    store: &S,
    space_id: &SpaceId,
    state: &SpaceState,
    event: SpaceEvent,
    key_boxes: Vec<KeyBoxWithKeyId>,
) -> (AppendResult, SpaceState) {
    let next = apply_event(&event, Some(state)).unwrap();
    let result = store
        .append_space_event(ChainAppend {
            space_id: space_id.clone(),
            hash: event.hash(),
            expected_tip: state.last_event_hash,
            event,
            key_boxes,
        })
        .await
        .unwrap();
    (result, next)
}

pub(crate) async fn check_create_space_and_read_back<S: Store>(store: &S) -> SpaceId {
    let alice = Member::new(1);
    let (space_id, state) = seed_space(store, &alice).await;

    let events = store.get_space_events(&space_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].hash(), state.last_event_hash);
    assert_eq!(
        store.get_space_tip(&space_id).await.unwrap(),
        Some(state.last_event_hash)
    );
    assert!(store.is_space_member(&space_id, &alice.account()).await.unwrap());
    assert_eq!(
        store.list_spaces_for_account(&alice.account()).await.unwrap(),
        vec![space_id.clone()]
    );
    let boxes = store.get_key_boxes(&space_id, &alice.account()).await.unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].open(&alice.enc).unwrap(), vec![9u8; 32]);

    // Same id again is refused and leaves the chain alone
    let again = alice.sign(Transaction::create_space(space_id.clone(), KeyId::from("k1")));
    let err = store
        .create_space(NewSpace {
            space_id: space_id.clone(),
            hash: again.hash(),
            event: again,
            key_boxes: vec![],
        })
        .await;
    assert!(matches!(err, Err(crate::StoreError::AlreadyExists(_))));
    assert_eq!(store.get_space_events(&space_id).await.unwrap().len(), 1);

    space_id
}

pub(crate) async fn check_append_checks_tip<S: Store>(store: &S) {
    let alice = Member::new(1);
    let bob = Member::new(2);
    let carol = Member::new(3);
    let (space_id, s1) = seed_space(store, &alice).await;

    let invite_bob = alice.sign(Transaction::create_invitation(
        s1.last_event_hash,
        bob.account(),
        s1.key_ids.clone(),
    ));
    let (result, _) = append(store, &space_id, &s1, invite_bob, vec![]).await;
    assert_eq!(result, AppendResult::Appended { seq: 1 });

    // A second writer still holding the old tip loses
    let invite_carol = alice.sign(Transaction::create_invitation(
        s1.last_event_hash,
        carol.account(),
        s1.key_ids.clone(),
    ));
    let (result, _) = append(store, &space_id, &s1, invite_carol, vec![]).await;
    assert!(matches!(result, AppendResult::Conflict { current_tip: Some(_) }));
    assert_eq!(store.get_space_events(&space_id).await.unwrap().len(), 2);
    assert!(store
        .list_invitations_for_account(&carol.account())
        .await
        .unwrap()
        .is_empty());
}

pub(crate) async fn check_invitation_lifecycle<S: Store>(store: &S) {
    let alice = Member::new(1);
    let bob = Member::new(2);
    let (space_id, s1) = seed_space(store, &alice).await;

    let invite = alice.sign(Transaction::create_invitation(
        s1.last_event_hash,
        bob.account(),
        s1.key_ids.clone(),
    ));
    let (_, s2) = append(store, &space_id, &s1, invite, vec![alice.key_box(&bob, "k1")]).await;

    let invitations = store.list_invitations_for_account(&bob.account()).await.unwrap();
    assert_eq!(invitations.len(), 1);
    assert_eq!(invitations[0].space_id, space_id);
    assert_eq!(invitations[0].inviter_account_id, alice.account());
    assert_eq!(store.get_key_boxes(&space_id, &bob.account()).await.unwrap().len(), 1);
    assert!(!store.is_space_member(&space_id, &bob.account()).await.unwrap());
    assert_eq!(
        store.list_space_members(&space_id).await.unwrap(),
        vec![alice.account()]
    );

    let accept = bob.sign(Transaction::accept_invitation(s2.last_event_hash));
    let (result, s3) = append(store, &space_id, &s2, accept, vec![]).await;
    assert_eq!(result, AppendResult::Appended { seq: 2 });
    assert!(store.is_space_member(&space_id, &bob.account()).await.unwrap());
    let members = store.list_space_members(&space_id).await.unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.contains(&bob.account()));
    assert!(store
        .list_invitations_for_account(&bob.account())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store.get_space_tip(&space_id).await.unwrap(),
        Some(s3.last_event_hash)
    );
}

fn new_update(author: &Member, space_id: &SpaceId, n: u32) -> NewUpdate {
    let update_id = format!("u{n}");
    let payload = n.to_be_bytes().to_vec();
    let signature = hyperspace_core::sign_update(
        space_id,
        &update_id,
        &author.account(),
        &payload,
        &author.kp,
    )
    .unwrap();
    NewUpdate {
        update_id,
        account_id: author.account(),
        update: payload,
        signature,
    }
}

pub(crate) async fn check_update_clocks<S: Store>(store: &S) {
    let alice = Member::new(1);
    let (space_id, _) = seed_space(store, &alice).await;
    let (other_space, _) = seed_space(store, &alice).await;

    for n in 1..=3 {
        let clock = store
            .insert_update(&space_id, new_update(&alice, &space_id, n))
            .await
            .unwrap();
        assert_eq!(clock, n as u64);
    }
    // Clocks are per space
    let clock = store
        .insert_update(&other_space, new_update(&alice, &other_space, 1))
        .await
        .unwrap();
    assert_eq!(clock, 1);

    let since = store.get_updates_since(&space_id, 1).await.unwrap();
    assert_eq!(since.iter().map(|u| u.clock).collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(since[0].update_id, "u2");
    assert_eq!(since[0].account_id, alice.account());
}

pub(crate) async fn check_concurrent_update_clocks<S: Store + 'static>(store: Arc<S>) {
    let alice = Member::new(1);
    let (space_id, _) = seed_space(store.as_ref(), &alice).await;

    let mut tasks = Vec::new();
    for n in 0..32u32 {
        let store = store.clone();
        let space_id = space_id.clone();
        let update = new_update(&alice, &space_id, n);
        tasks.push(tokio::spawn(async move {
            store.insert_update(&space_id, update).await.unwrap()
        }));
    }

    let mut clocks = Vec::new();
    for task in tasks {
        clocks.push(task.await.unwrap());
    }
    clocks.sort_unstable();
    assert_eq!(clocks, (1..=32).collect::<Vec<u64>>());
}

pub(crate) async fn check_identities<S: Store>(store: &S) {
    let wallet = hyperspace_core::LocalWallet::generate();
    let account = hyperspace_core::WalletSigner::address(&wallet);
    let keys = create_identity();
    let record = IdentityRecord {
        account_id: account.clone(),
        signature_public_key: keys.signature_public_key(),
        encryption_public_key: keys.encryption_public_key(),
        account_proof: "0x01".into(),
        key_proof: "0x02".into(),
        key_box: IdentityKeyBox::seal_with_wallet(&keys, &wallet, &account).unwrap(),
    };

    assert!(store.get_identity(&account).await.unwrap().is_none());
    store.insert_identity(record.clone()).await.unwrap();
    assert_eq!(store.get_identity(&account).await.unwrap(), Some(record.clone()));
    assert!(matches!(
        store.insert_identity(record).await,
        Err(crate::StoreError::AlreadyExists(_))
    ));
}

pub(crate) async fn check_inboxes<S: Store>(store: &S) {
    let alice = Member::new(1);
    let (space_id, s1) = seed_space(store, &alice).await;

    // Space inbox, created through the chain
    let inbox_id = InboxId::from("space-inbox");
    let event = alice.sign(Transaction::CreateSpaceInbox(hyperspace_core::CreateSpaceInbox {
        id: "e-inbox".into(),
        previous_event_hash: s1.last_event_hash,
        inbox_id: inbox_id.clone(),
        encryption_public_key: [4u8; 32],
        secret_key: vec![5, 6],
        is_public: true,
        auth_policy: InboxAuthPolicy::RequiresAuth,
    }));
    append(store, &space_id, &s1, event, vec![]).await;
    let inbox = store.get_space_inbox(&space_id, &inbox_id).await.unwrap().unwrap();
    assert_eq!(inbox.inbox.auth_policy, InboxAuthPolicy::RequiresAuth);
    assert_eq!(store.list_space_inboxes(&space_id).await.unwrap().len(), 1);
    assert!(store
        .get_space_inbox(&SpaceId::from("other"), &inbox_id)
        .await
        .unwrap()
        .is_none());

    // Account inbox
    let account_inbox = AccountInboxRecord {
        account_id: alice.account(),
        inbox_id: InboxId::from("account-inbox"),
        is_public: false,
        auth_policy: InboxAuthPolicy::Anonymous,
        encryption_public_key: [1u8; 32],
        signature: alice.kp.sign(b"params").unwrap(),
    };
    store.create_account_inbox(account_inbox.clone()).await.unwrap();
    assert!(matches!(
        store.create_account_inbox(account_inbox.clone()).await,
        Err(crate::StoreError::AlreadyExists(_))
    ));
    assert_eq!(
        store.list_account_inboxes(&alice.account()).await.unwrap(),
        vec![account_inbox.clone()]
    );
    assert_eq!(
        store
            .get_account_inbox(&alice.account(), &account_inbox.inbox_id)
            .await
            .unwrap(),
        Some(account_inbox)
    );

    // Messages, ordered by posting
    let scope = InboxScope::Space(space_id.clone());
    let first = Utc::now() - chrono::Duration::seconds(10);
    for (i, created_at) in [first, Utc::now()].into_iter().enumerate() {
        store
            .insert_inbox_message(&scope, InboxMessageRecord {
                id: format!("m{i}"),
                inbox_id: inbox_id.clone(),
                ciphertext: format!("ct-{i}"),
                signature: None,
                author_account_id: None,
                created_at,
            })
            .await
            .unwrap();
    }
    let all = store.list_inbox_messages(&scope, &inbox_id, None).await.unwrap();
    assert_eq!(all.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["m0", "m1"]);
    let recent = store
        .list_inbox_messages(&scope, &inbox_id, Some(first))
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, "m1");
}

fn message(id: &str, inbox_id: &InboxId) -> InboxMessageRecord {
    InboxMessageRecord {
        id: id.to_string(),
        inbox_id: inbox_id.clone(),
        ciphertext: format!("ct-{id}"),
        signature: None,
        author_account_id: None,
        created_at: Utc::now(),
    }
}

/// The same inbox id in two spaces and one account names three inboxes.
pub(crate) async fn check_inbox_messages_are_scoped<S: Store>(store: &S) {
    let alice = Member::new(1);
    let bob = Member::new(2);
    let inbox_id = InboxId::from("shared");

    let mut spaces = Vec::new();
    for n in 0..2 {
        let (space_id, s1) = seed_space(store, &alice).await;
        let event = alice.sign(Transaction::CreateSpaceInbox(hyperspace_core::CreateSpaceInbox {
            id: format!("e-inbox-{n}"),
            previous_event_hash: s1.last_event_hash,
            inbox_id: inbox_id.clone(),
            encryption_public_key: [4u8; 32],
            secret_key: vec![5, 6],
            is_public: false,
            auth_policy: InboxAuthPolicy::RequiresAuth,
        }));
        let (result, _) = append(store, &space_id, &s1, event, vec![]).await;
        assert!(matches!(result, AppendResult::Appended { .. }));
        spaces.push(space_id);
    }
    store
        .create_account_inbox(AccountInboxRecord {
            account_id: bob.account(),
            inbox_id: inbox_id.clone(),
            is_public: true,
            auth_policy: InboxAuthPolicy::Anonymous,
            encryption_public_key: [1u8; 32],
            signature: bob.kp.sign(b"params").unwrap(),
        })
        .await
        .unwrap();

    let private = InboxScope::Space(spaces[0].clone());
    let other_space = InboxScope::Space(spaces[1].clone());
    let account = InboxScope::Account(bob.account());

    store
        .insert_inbox_message(&private, message("secret", &inbox_id))
        .await
        .unwrap();
    store
        .insert_inbox_message(&account, message("hello-bob", &inbox_id))
        .await
        .unwrap();

    let ids = |messages: Vec<InboxMessageRecord>| {
        messages.into_iter().map(|m| m.id).collect::<Vec<_>>()
    };
    assert_eq!(
        ids(store.list_inbox_messages(&private, &inbox_id, None).await.unwrap()),
        vec!["secret"]
    );
    assert_eq!(
        ids(store.list_inbox_messages(&account, &inbox_id, None).await.unwrap()),
        vec!["hello-bob"]
    );
    assert!(store
        .list_inbox_messages(&other_space, &inbox_id, None)
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .list_inbox_messages(&InboxScope::Account(alice.account()), &inbox_id, None)
        .await
        .unwrap()
        .is_empty());
}

pub(crate) async fn check_key_value_ttl<K: KeyValueStore>(kv: &K) {
    kv.set("plain", b"v".to_vec(), None).await.unwrap();
    assert_eq!(kv.get("plain").await.unwrap(), Some(b"v".to_vec()));

    kv.set("short", b"v".to_vec(), Some(Duration::from_millis(20)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(kv.get("short").await.unwrap(), None);

    // take is single use
    kv.set("nonce", b"n".to_vec(), Some(Duration::from_secs(60)))
        .await
        .unwrap();
    assert_eq!(kv.take("nonce").await.unwrap(), Some(b"n".to_vec()));
    assert_eq!(kv.take("nonce").await.unwrap(), None);

    assert!(kv.delete("plain").await.unwrap());
    assert!(!kv.delete("plain").await.unwrap());
}
