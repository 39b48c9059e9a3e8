//! Client-side identity persistence.
//!
//! One entry per account on this device, holding the private keys and the
//! current session token. Logging out wipes the entry.

use serde::{Deserialize, Serialize};

use hyperspace_core::AccountId;
use hyperspace_keys::{ExportedKeys, Identity, IdentityKeys};

use crate::error::{Result, StoreError};
use crate::traits::KeyValueStore;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredIdentity {
    account_id: AccountId,
    keys: ExportedKeys,
    session_token: String,
}

/// An identity loaded back from the device store.
#[derive(Clone, Debug)]
pub struct SavedIdentity {
    pub identity: Identity,
    pub session_token: String,
}

/// Persists identities on top of any [`KeyValueStore`].
pub struct IdentityStore<K> {
    kv: K,
}

impl<K: KeyValueStore> IdentityStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    fn key(account_id: &AccountId) -> String {
        format!("identity:{account_id}")
    }

    /// Store the identity and session token, replacing any previous entry.
    pub async fn save(&self, identity: &Identity, session_token: &str) -> Result<()> {
        let stored = StoredIdentity {
            account_id: identity.account_id.clone(),
            keys: identity.keys.export(),
            session_token: session_token.to_string(),
        };
        let json =
            serde_json::to_vec(&stored).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.kv.set(&Self::key(&identity.account_id), json, None).await
    }

    pub async fn load(&self, account_id: &AccountId) -> Result<Option<SavedIdentity>> {
        let Some(bytes) = self.kv.get(&Self::key(account_id)).await? else {
            return Ok(None);
        };
        let stored: StoredIdentity =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if &stored.account_id != account_id {
            return Err(StoreError::InvalidData(format!(
                "identity entry for {account_id} names {}",
                stored.account_id
            )));
        }
        let keys = IdentityKeys::import(&stored.keys)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;

        Ok(Some(SavedIdentity {
            identity: Identity {
                account_id: stored.account_id,
                keys,
            },
            session_token: stored.session_token,
        }))
    }

    pub async fn session_token(&self, account_id: &AccountId) -> Result<Option<String>> {
        Ok(self.load(account_id).await?.map(|saved| saved.session_token))
    }

    /// Forget the identity (logout). Returns whether an entry existed.
    pub async fn wipe(&self, account_id: &AccountId) -> Result<bool> {
        self.kv.delete(&Self::key(account_id)).await
    }
}
