//! Space keyrings: the key generations of one space, as held by a member.
//!
//! Content (CRDT updates, inbox secret keys) is sealed under the newest
//! generation. Invitations carry one key box per generation so a new member
//! can open everything currently in use.

use serde::{Deserialize, Serialize};

use hyperspace_core::encoding::hex_vec;
use hyperspace_core::{AccountId, KeyId};

use crate::crypto::{BoxNonce, EncryptionKey, X25519PublicKey, X25519StaticSecret};
use crate::error::{KeysError, Result};
use crate::keybox::{expect_key_len, KeyBox, KeyBoxWithKeyId};

/// One symmetric content key and its id.
#[derive(Debug, Clone)]
pub struct KeyGeneration {
    pub key_id: KeyId,
    pub key: EncryptionKey,
}

impl KeyGeneration {
    pub fn generate() -> Self {
        Self {
            key_id: KeyId::random(),
            key: EncryptionKey::generate(),
        }
    }
}

/// Ordered key generations of a space, oldest first.
#[derive(Debug, Clone)]
pub struct SpaceKeyring {
    generations: Vec<KeyGeneration>,
}

impl SpaceKeyring {
    /// A keyring with a single fresh generation, for a new space.
    pub fn generate() -> Self {
        Self {
            generations: vec![KeyGeneration::generate()],
        }
    }

    /// Add a generation and make it the active one.
    ///
    /// Publish it with a `rotate-key` event carrying [`Self::active_key_box_for`]
    /// boxes for every member and pending invitee.
    pub fn rotate(&mut self) -> KeyId {
        let generation = KeyGeneration::generate();
        let key_id = generation.key_id.clone();
        self.generations.push(generation);
        key_id
    }

    /// The newest generation.
    pub fn active(&self) -> Result<&KeyGeneration> {
        self.generations.last().ok_or(KeysError::EmptyKeyring)
    }

    pub fn key_ids(&self) -> Vec<KeyId> {
        self.generations.iter().map(|g| g.key_id.clone()).collect()
    }

    pub fn get(&self, key_id: &KeyId) -> Result<&EncryptionKey> {
        self.generations
            .iter()
            .find(|g| &g.key_id == key_id)
            .map(|g| &g.key)
            .ok_or_else(|| KeysError::UnknownKeyGeneration(key_id.clone()))
    }

    /// One key box per generation, addressed to `recipient`.
    pub fn key_boxes_for(
        &self,
        recipient: &AccountId,
        recipient_public: &X25519PublicKey,
        sender_secret: &X25519StaticSecret,
    ) -> Result<Vec<KeyBoxWithKeyId>> {
        self.generations
            .iter()
            .map(|g| {
                KeyBox::seal(
                    recipient.clone(),
                    recipient_public,
                    sender_secret,
                    g.key.as_bytes(),
                )
                .map(|b| b.with_key_id(g.key_id.clone()))
            })
            .collect()
    }

    /// A box of the active generation only, addressed to `recipient`.
    pub fn active_key_box_for(
        &self,
        recipient: &AccountId,
        recipient_public: &X25519PublicKey,
        sender_secret: &X25519StaticSecret,
    ) -> Result<KeyBoxWithKeyId> {
        let active = self.active()?;
        let key_box = KeyBox::seal(
            recipient.clone(),
            recipient_public,
            sender_secret,
            active.key.as_bytes(),
        )?;
        Ok(key_box.with_key_id(active.key_id.clone()))
    }

    /// Rebuild a keyring from the boxes addressed to us.
    ///
    /// Box order is generation order.
    pub fn from_key_boxes(boxes: &[KeyBoxWithKeyId], my_secret: &X25519StaticSecret) -> Result<Self> {
        if boxes.is_empty() {
            return Err(KeysError::EmptyKeyring);
        }
        let generations = boxes
            .iter()
            .map(|b| {
                let key = expect_key_len(b.open(my_secret)?)?;
                Ok(KeyGeneration {
                    key_id: b.id.clone(),
                    key: EncryptionKey::from_bytes(key),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { generations })
    }

    /// Encrypt content under the active generation.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedPayload> {
        let active = self.active()?;
        let nonce = BoxNonce::generate();
        let ciphertext = active.key.encrypt(plaintext, &nonce)?;
        Ok(SealedPayload {
            key_id: active.key_id.clone(),
            nonce,
            ciphertext,
        })
    }

    /// Decrypt content sealed under any generation we hold.
    pub fn open(&self, sealed: &SealedPayload) -> Result<Vec<u8>> {
        self.get(&sealed.key_id)?
            .decrypt(&sealed.ciphertext, &sealed.nonce)
    }
}

/// Content encrypted under one key generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedPayload {
    pub key_id: KeyId,
    pub nonce: BoxNonce,
    #[serde(with = "hex_vec")]
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Serialize to CBOR bytes, the form carried as an opaque update.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| KeysError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| KeysError::SerializationError(e.to_string()))
    }
}
