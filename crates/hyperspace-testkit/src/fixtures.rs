//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: wallets with registered
//! identities, and spaces whose events they sign.

use rand::RngCore;

use hyperspace_core::{
    sign_update, AccountId, CreateSpaceInbox, EventHash, InboxAuthPolicy, InboxId, KeyId,
    LocalWallet, RecoverableSignature, SignatureKeypair, SpaceEvent, SpaceId, Transaction,
    WalletSigner,
};
use hyperspace_keys::{
    create_identity, prove_identity_ownership, Identity, IdentityKeyBox, IdentityKeys, KeyBox,
    KeyBoxWithKeyId, SpaceKeyring, X25519StaticSecret,
};
use hyperspace_store::IdentityRecord;

/// A wallet plus the identity keys registered for it.
pub struct TestAccount {
    pub wallet: LocalWallet,
    pub keys: IdentityKeys,
}

impl TestAccount {
    /// Random wallet and identity keys.
    pub fn new() -> Self {
        Self {
            wallet: LocalWallet::generate(),
            keys: create_identity(),
        }
    }

    /// Deterministic wallet and keys derived from `seed`.
    pub fn with_seed(seed: u8) -> Self {
        let secret = |tag: u8| {
            let mut bytes = [0u8; 32];
            bytes[0] = seed;
            bytes[1] = tag;
            bytes[31] = 1;
            bytes
        };
        Self {
            wallet: LocalWallet::from_bytes(&secret(0)).expect("valid wallet secret"),
            keys: IdentityKeys {
                signature: SignatureKeypair::from_bytes(&secret(1)).expect("valid signing secret"),
                encryption: X25519StaticSecret::from_bytes(secret(2)),
            },
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.wallet.address()
    }

    pub fn identity(&self) -> Identity {
        Identity {
            account_id: self.account_id(),
            keys: self.keys.clone(),
        }
    }

    /// The record the relay stores after a successful registration.
    pub fn identity_record(&self) -> IdentityRecord {
        let account_id = self.account_id();
        let proof = prove_identity_ownership(&self.wallet, &account_id, &self.keys)
            .expect("ownership proof");
        IdentityRecord {
            account_id: account_id.clone(),
            signature_public_key: self.keys.signature_public_key(),
            encryption_public_key: self.keys.encryption_public_key(),
            account_proof: proof.account_proof,
            key_proof: proof.key_proof,
            key_box: IdentityKeyBox::seal_with_wallet(&self.keys, &self.wallet, &account_id)
                .expect("identity key box"),
        }
    }

    /// Personal-sign `message` with the wallet, as an Ethereum hex string.
    pub fn wallet_sign(&self, message: &str) -> String {
        self.wallet
            .sign_message(message)
            .expect("wallet signature")
            .to_eth_hex()
    }

    /// Sign a transaction with the identity's signature key.
    pub fn sign_event(&self, transaction: Transaction) -> SpaceEvent {
        SpaceEvent::sign(transaction, self.account_id(), &self.keys.signature)
            .expect("event signature")
    }

    /// Sign an update for `space_id`.
    pub fn sign_update(
        &self,
        space_id: &SpaceId,
        update_id: &str,
        update: &[u8],
    ) -> RecoverableSignature {
        sign_update(
            space_id,
            update_id,
            &self.account_id(),
            update,
            &self.keys.signature,
        )
        .expect("update signature")
    }
}

impl Default for TestAccount {
    fn default() -> Self {
        Self::new()
    }
}

/// A space as one of its members sees it: the chain so far and the keys.
pub struct TestSpace {
    pub id: SpaceId,
    pub keyring: SpaceKeyring,
    pub events: Vec<SpaceEvent>,
}

/// What a creator sends to open a space.
pub struct CreatedSpace {
    pub event: SpaceEvent,
    pub key_id: KeyId,
    pub key_box: KeyBox,
}

impl TestSpace {
    /// A new space owned by `creator`, with one key generation.
    pub fn create(creator: &TestAccount) -> (Self, CreatedSpace) {
        let id = SpaceId::random();
        let keyring = SpaceKeyring::generate();
        let key_id = keyring.key_ids()[0].clone();
        let key_box = keyring
            .key_boxes_for(
                &creator.account_id(),
                &creator.keys.encryption_public_key(),
                &creator.keys.encryption,
            )
            .expect("creator key box")
            .remove(0)
            .key_box();
        let event = creator.sign_event(Transaction::create_space(id.clone(), key_id.clone()));
        let space = Self {
            id,
            keyring,
            events: vec![event.clone()],
        };
        (
            space,
            CreatedSpace {
                event,
                key_id,
                key_box,
            },
        )
    }

    pub fn tip(&self) -> EventHash {
        self.events
            .last()
            .map(SpaceEvent::hash)
            .expect("space has a root event")
    }

    /// Invite `invitee`, boxing every key generation for them.
    pub fn invite(
        &mut self,
        inviter: &TestAccount,
        invitee: &TestAccount,
    ) -> (SpaceEvent, Vec<KeyBoxWithKeyId>) {
        let event = inviter.sign_event(Transaction::create_invitation(
            self.tip(),
            invitee.account_id(),
            self.keyring.key_ids(),
        ));
        let key_boxes = self
            .keyring
            .key_boxes_for(
                &invitee.account_id(),
                &invitee.keys.encryption_public_key(),
                &inviter.keys.encryption,
            )
            .expect("invitee key boxes");
        self.events.push(event.clone());
        (event, key_boxes)
    }

    pub fn accept(&mut self, invitee: &TestAccount) -> SpaceEvent {
        let event = invitee.sign_event(Transaction::accept_invitation(self.tip()));
        self.events.push(event.clone());
        event
    }

    /// Open an inbox in the space. The inbox secret is sealed with the
    /// space key.
    pub fn create_inbox(
        &mut self,
        author: &TestAccount,
        is_public: bool,
        auth_policy: InboxAuthPolicy,
    ) -> (SpaceEvent, InboxId) {
        let inbox_id = InboxId::random();
        let secret = X25519StaticSecret::generate();
        let sealed = self
            .keyring
            .seal(&secret.to_bytes())
            .and_then(|s| s.to_bytes())
            .expect("sealed inbox secret");
        let event = author.sign_event(Transaction::CreateSpaceInbox(CreateSpaceInbox {
            id: random_id(),
            previous_event_hash: self.tip(),
            inbox_id: inbox_id.clone(),
            encryption_public_key: *secret.public_key().as_bytes(),
            secret_key: sealed,
            is_public,
            auth_policy,
        }));
        self.events.push(event.clone());
        (event, inbox_id)
    }

    /// Rotate to a new key generation, boxed for each of `recipients`.
    pub fn rotate(
        &mut self,
        author: &TestAccount,
        recipients: &[&TestAccount],
    ) -> (SpaceEvent, Vec<KeyBoxWithKeyId>) {
        let key_id = self.keyring.rotate();
        let event = author.sign_event(Transaction::rotate_key(self.tip(), key_id));
        let key_boxes = recipients
            .iter()
            .map(|r| {
                self.keyring
                    .active_key_box_for(
                        &r.account_id(),
                        &r.keys.encryption_public_key(),
                        &author.keys.encryption,
                    )
                    .expect("rotation key box")
            })
            .collect();
        self.events.push(event.clone());
        (event, key_boxes)
    }

    /// Drop events that the relay rejected.
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}

/// Create multiple deterministic accounts for multi-party tests.
pub fn multi_party_accounts(count: usize) -> Vec<TestAccount> {
    (0..count).map(|i| TestAccount::with_seed(i as u8 + 1)).collect()
}

fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
