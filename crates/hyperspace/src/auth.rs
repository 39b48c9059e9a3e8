//! Login nonces, sessions and identity registration.
//!
//! Nonces and session tokens live in the [`KeyValueStore`] with a TTL and
//! are checked when used. Nothing evicts them on a timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;

use hyperspace_core::{recover_personal_address, AccountId, RecoverableSignature, SignaturePublicKey};
use hyperspace_keys::{verify_identity_ownership, IdentityKeyBox, PublicIdentity, X25519PublicKey};
use hyperspace_store::{IdentityRecord, KeyValueStore, Store, StoreError};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::siwe::SiweMessage;

/// `POST /login` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub account_id: AccountId,
    /// The EIP-4361 message text.
    pub message: String,
    /// 65-byte wallet signature, hex.
    pub signature: String,
}

/// `POST /identity` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterIdentityRequest {
    pub account_id: AccountId,
    pub message: String,
    pub signature: String,
    pub signature_public_key: SignaturePublicKey,
    pub encryption_public_key: X25519PublicKey,
    pub account_proof: String,
    pub key_proof: String,
    pub key_box: IdentityKeyBox,
}

/// Issues and checks credentials.
pub struct Auth<S> {
    store: Arc<S>,
    siwe_domain: String,
    session_max_ttl: Duration,
    nonce_ttl: Duration,
}

fn nonce_key(account_id: &AccountId) -> String {
    format!("nonce:{account_id}")
}

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

impl<S> Auth<S>
where
    S: Store + KeyValueStore,
{
    pub fn new(store: Arc<S>, config: &ServerConfig) -> Self {
        Self {
            store,
            siwe_domain: config.siwe_domain.clone(),
            session_max_ttl: config.session_max_ttl(),
            nonce_ttl: config.nonce_ttl(),
        }
    }

    /// Issue a single-use login nonce for `account_id`, replacing any previous one.
    pub async fn issue_nonce(&self, account_id: &AccountId) -> Result<String> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        self.store
            .set(&nonce_key(account_id), nonce.clone().into_bytes(), Some(self.nonce_ttl))
            .await?;
        Ok(nonce)
    }

    /// Check a signed sign-in message and consume the nonce.
    ///
    /// Returns how long the session may live.
    pub async fn verify_sign_in(
        &self,
        account_id: &AccountId,
        message: &str,
        signature: &str,
    ) -> Result<Duration> {
        let siwe: SiweMessage = message.parse()?;
        if &siwe.address != account_id {
            return Err(ServerError::Unauthorized(
                "sign-in message names another account".into(),
            ));
        }
        if siwe.domain != self.siwe_domain {
            return Err(ServerError::Unauthorized(format!(
                "sign-in message is for domain {}",
                siwe.domain
            )));
        }

        let signature = RecoverableSignature::from_eth_hex(signature)
            .map_err(|_| ServerError::Unauthorized("malformed signature".into()))?;
        let signer = recover_personal_address(message, &signature)
            .map_err(|_| ServerError::Unauthorized("unrecoverable signature".into()))?;
        if &signer != account_id {
            return Err(ServerError::Unauthorized(
                "signature does not match account".into(),
            ));
        }

        // Single use: taken even when the comparison fails
        let stored = self.store.take(&nonce_key(account_id)).await?;
        if stored.as_deref() != Some(siwe.nonce.as_bytes()) {
            return Err(ServerError::Unauthorized("unknown or expired nonce".into()));
        }

        let now = Utc::now();
        siwe.check_time(now)?;

        let ttl = match siwe.expiration_time {
            Some(exp) => (exp - now)
                .to_std()
                .map_err(|_| ServerError::Unauthorized("sign-in message expired".into()))?
                .min(self.session_max_ttl),
            None => self.session_max_ttl,
        };
        Ok(ttl)
    }

    /// Start a session for `account_id`.
    pub async fn create_session(&self, account_id: &AccountId, ttl: Duration) -> Result<String> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.store
            .set(
                &session_key(&token),
                account_id.as_str().as_bytes().to_vec(),
                Some(ttl),
            )
            .await?;
        Ok(token)
    }

    /// The account behind a live session token.
    pub async fn resolve_session(&self, token: &str) -> Result<AccountId> {
        let account = self
            .store
            .get(&session_key(token))
            .await?
            .ok_or_else(|| ServerError::Unauthorized("invalid or expired session".into()))?;
        let account = String::from_utf8(account)
            .map_err(|_| ServerError::Unauthorized("invalid session".into()))?;
        Ok(AccountId::new(account))
    }

    /// Sign in an account that already has an identity.
    pub async fn login(&self, request: &LoginRequest) -> Result<String> {
        let ttl = self
            .verify_sign_in(&request.account_id, &request.message, &request.signature)
            .await?;
        if self.store.get_identity(&request.account_id).await?.is_none() {
            return Err(ServerError::NotFound(format!(
                "identity for {}",
                request.account_id
            )));
        }
        info!(account_id = %request.account_id, "login");
        self.create_session(&request.account_id, ttl).await
    }

    /// Register a new identity and sign it in.
    pub async fn register_identity(&self, request: RegisterIdentityRequest) -> Result<String> {
        let ttl = self
            .verify_sign_in(&request.account_id, &request.message, &request.signature)
            .await?;

        if !verify_identity_ownership(
            &request.account_id,
            &request.signature_public_key,
            &request.account_proof,
            &request.key_proof,
        ) {
            return Err(ServerError::Unauthorized("invalid ownership proof".into()));
        }

        let record = IdentityRecord {
            account_id: request.account_id.clone(),
            signature_public_key: request.signature_public_key,
            encryption_public_key: request.encryption_public_key,
            account_proof: request.account_proof,
            key_proof: request.key_proof,
            key_box: request.key_box,
        };
        match self.store.insert_identity(record).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => {
                return Err(ServerError::Conflict(format!(
                    "identity for {} already exists",
                    request.account_id
                )))
            }
            Err(e) => return Err(e.into()),
        }

        info!(account_id = %request.account_id, "registered identity");
        self.create_session(&request.account_id, ttl).await
    }

    pub async fn public_identity(&self, account_id: &AccountId) -> Result<PublicIdentity> {
        let record = self.identity(account_id).await?;
        Ok(PublicIdentity {
            account_id: record.account_id,
            signature_public_key: record.signature_public_key,
            encryption_public_key: record.encryption_public_key,
        })
    }

    pub async fn identity(&self, account_id: &AccountId) -> Result<IdentityRecord> {
        self.store
            .get_identity(account_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("identity for {account_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use hyperspace_core::{LocalWallet, WalletSigner};
    use hyperspace_keys::{create_identity, prove_identity_ownership};
    use hyperspace_store::MemoryStore;

    fn auth() -> Auth<MemoryStore> {
        Auth::new(Arc::new(MemoryStore::new()), &ServerConfig::default())
    }

    fn signed(wallet: &LocalWallet, message: &SiweMessage) -> (String, String) {
        let text = message.to_string();
        let signature = wallet.sign_message(&text).unwrap().to_eth_hex();
        (text, signature)
    }

    async fn sign_in_message(auth: &Auth<MemoryStore>, wallet: &LocalWallet) -> SiweMessage {
        let nonce = auth.issue_nonce(&wallet.address()).await.unwrap();
        SiweMessage::new("localhost:3030", &wallet.address(), "http://localhost:3030", &nonce)
    }

    fn register_request(wallet: &LocalWallet, message: String, signature: String) -> RegisterIdentityRequest {
        let account_id = wallet.address();
        let keys = create_identity();
        let proof = prove_identity_ownership(wallet, &account_id, &keys).unwrap();
        RegisterIdentityRequest {
            account_id: account_id.clone(),
            message,
            signature,
            signature_public_key: keys.signature_public_key(),
            encryption_public_key: keys.encryption_public_key(),
            account_proof: proof.account_proof,
            key_proof: proof.key_proof,
            key_box: IdentityKeyBox::seal_with_wallet(&keys, wallet, &account_id).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = auth();
        let wallet = LocalWallet::generate();

        let msg = sign_in_message(&auth, &wallet).await;
        let (text, sig) = signed(&wallet, &msg);
        let token = auth
            .register_identity(register_request(&wallet, text, sig))
            .await
            .unwrap();
        assert_eq!(auth.resolve_session(&token).await.unwrap(), wallet.address());

        let msg = sign_in_message(&auth, &wallet).await;
        let (message, signature) = signed(&wallet, &msg);
        let token = auth
            .login(&LoginRequest {
                account_id: wallet.address(),
                message,
                signature,
            })
            .await
            .unwrap();
        assert_eq!(auth.resolve_session(&token).await.unwrap(), wallet.address());
    }

    #[tokio::test]
    async fn test_nonce_is_single_use() {
        let auth = auth();
        let wallet = LocalWallet::generate();
        let msg = sign_in_message(&auth, &wallet).await;
        let (text, sig) = signed(&wallet, &msg);

        auth.verify_sign_in(&wallet.address(), &text, &sig).await.unwrap();
        let err = auth.verify_sign_in(&wallet.address(), &text, &sig).await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_rejects_wrong_signer_domain_and_expiry() {
        let auth = auth();
        let wallet = LocalWallet::generate();
        let mallory = LocalWallet::generate();

        let msg = sign_in_message(&auth, &wallet).await;
        let (text, _) = signed(&wallet, &msg);
        let (_, forged) = signed(&mallory, &msg);
        assert!(auth.verify_sign_in(&wallet.address(), &text, &forged).await.is_err());

        let mut msg = sign_in_message(&auth, &wallet).await;
        msg.domain = "evil.example".into();
        let (text, sig) = signed(&wallet, &msg);
        assert!(auth.verify_sign_in(&wallet.address(), &text, &sig).await.is_err());

        let mut msg = sign_in_message(&auth, &wallet).await;
        msg.expiration_time = Some(Utc::now() - ChronoDuration::minutes(1));
        let (text, sig) = signed(&wallet, &msg);
        assert!(auth.verify_sign_in(&wallet.address(), &text, &sig).await.is_err());
    }

    #[tokio::test]
    async fn test_session_ttl_capped_by_expiration() {
        let auth = auth();
        let wallet = LocalWallet::generate();
        let mut msg = sign_in_message(&auth, &wallet).await;
        msg.expiration_time = Some(Utc::now() + ChronoDuration::minutes(5));
        let (text, sig) = signed(&wallet, &msg);
        let ttl = auth.verify_sign_in(&wallet.address(), &text, &sig).await.unwrap();
        assert!(ttl <= Duration::from_secs(300));
        assert!(ttl > Duration::from_secs(250));
    }

    #[tokio::test]
    async fn test_login_requires_identity() {
        let auth = auth();
        let wallet = LocalWallet::generate();
        let msg = sign_in_message(&auth, &wallet).await;
        let (message, signature) = signed(&wallet, &msg);
        let err = auth
            .login(&LoginRequest {
                account_id: wallet.address(),
                message,
                signature,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_foreign_proof_and_duplicates() {
        let auth = auth();
        let wallet = LocalWallet::generate();

        let msg = sign_in_message(&auth, &wallet).await;
        let (text, sig) = signed(&wallet, &msg);
        let mut request = register_request(&wallet, text, sig);
        request.signature_public_key = create_identity().signature_public_key();
        let err = auth.register_identity(request).await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)));

        for expect_ok in [true, false] {
            let msg = sign_in_message(&auth, &wallet).await;
            let (text, sig) = signed(&wallet, &msg);
            let result = auth.register_identity(register_request(&wallet, text, sig)).await;
            assert_eq!(result.is_ok(), expect_ok);
        }
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let err = auth().resolve_session("nope").await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)));
    }
}
