//! Cryptographic primitives for Hyperspace.
//!
//! Wraps secp256k1 recoverable signatures and Keccak-256 with strong types.
//! Account ids are Ethereum addresses derived from these keys.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::encoding::{array_from_hex, from_hex_prefixed, hex_array, to_hex_prefixed};
use crate::error::CoreError;
use crate::types::AccountId;

/// Keccak-256 of the given data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Digest used by wallet `personal_sign` (EIP-191 version 0x45).
pub fn eth_message_hash(message: &[u8]) -> [u8; 32] {
    let mut buf = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    buf.extend_from_slice(message);
    keccak256(&buf)
}

/// Ethereum address of a verifying key.
fn address_of(key: &VerifyingKey) -> AccountId {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 tag
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    AccountId::from_address(&address)
}

/// A 33-byte compressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignaturePublicKey(#[serde(with = "hex_array")] pub [u8; 33]);

impl SignaturePublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Convert to `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        to_hex_prefixed(&self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = array_from_hex(s).map_err(|_| CoreError::InvalidPublicKey)?;
        let key = Self(bytes);
        key.to_verifying_key()?;
        Ok(key)
    }

    fn to_verifying_key(&self) -> Result<VerifyingKey, CoreError> {
        VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)
    }

    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(true);
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(point.as_bytes());
        Self(bytes)
    }

    /// The Ethereum address controlled by this key.
    pub fn address(&self) -> Result<AccountId, CoreError> {
        Ok(address_of(&self.to_verifying_key()?))
    }
}

impl fmt::Debug for SignaturePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigPub({})", &hex::encode(self.0)[..16])
    }
}

impl fmt::Display for SignaturePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A recoverable secp256k1 signature: `r || s` plus the recovery id.
///
/// On the wire this is `{"hex": "0x…", "recovery": 0}`.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature {
    /// The 64-byte compact signature.
    #[serde(with = "hex_array")]
    pub hex: [u8; 64],
    /// Recovery id (0 or 1).
    pub recovery: u8,
}

impl RecoverableSignature {
    /// Recover the signer of `message` (Keccak-256 prehash).
    pub fn recover(&self, message: &[u8]) -> Result<SignaturePublicKey, CoreError> {
        self.recover_prehash(&keccak256(message))
    }

    /// Recover the signer of a 32-byte digest.
    pub fn recover_prehash(&self, digest: &[u8; 32]) -> Result<SignaturePublicKey, CoreError> {
        let sig = Signature::from_slice(&self.hex).map_err(|_| CoreError::InvalidSignature)?;
        let recovery_id = RecoveryId::from_byte(self.recovery).ok_or(CoreError::InvalidSignature)?;
        let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
            .map_err(|_| CoreError::RecoveryFailed)?;
        Ok(SignaturePublicKey::from_verifying_key(&key))
    }

    /// Encode as the 65-byte `r || s || v` form wallets produce (`v` = 27 + recovery).
    pub fn to_eth_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&self.hex);
        out[64] = self.recovery + 27;
        out
    }

    /// `0x`-prefixed hex of [`Self::to_eth_bytes`].
    pub fn to_eth_hex(&self) -> String {
        to_hex_prefixed(&self.to_eth_bytes())
    }

    /// Parse a 65-byte wallet signature. Accepts `v` in {0, 1, 27, 28}.
    pub fn from_eth_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != 65 {
            return Err(CoreError::InvalidSignature);
        }
        let recovery = match bytes[64] {
            0 | 1 => bytes[64],
            27 | 28 => bytes[64] - 27,
            _ => return Err(CoreError::InvalidSignature),
        };
        let mut hex = [0u8; 64];
        hex.copy_from_slice(&bytes[..64]);
        Ok(Self { hex, recovery })
    }

    /// Parse a `0x`-prefixed 65-byte wallet signature.
    pub fn from_eth_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = from_hex_prefixed(s).map_err(|_| CoreError::InvalidSignature)?;
        Self::from_eth_bytes(&bytes)
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecoverableSig({}..., v={})",
            &hex::encode(self.hex)[..16],
            self.recovery
        )
    }
}

/// A secp256k1 keypair for signing events, updates and inbox messages.
#[derive(Clone)]
pub struct SignatureKeypair {
    signing_key: SigningKey,
}

impl SignatureKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from a 32-byte secret scalar.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, CoreError> {
        let signing_key = SigningKey::from_slice(secret).map_err(|_| CoreError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Get the raw secret bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    /// Get the public key.
    pub fn public_key(&self) -> SignaturePublicKey {
        SignaturePublicKey::from_verifying_key(self.signing_key.verifying_key())
    }

    /// The Ethereum address of this key.
    pub fn address(&self) -> AccountId {
        address_of(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte digest.
    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, CoreError> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| CoreError::InvalidSignature)?;
        let mut hex = [0u8; 64];
        hex.copy_from_slice(&sig.to_bytes());
        Ok(RecoverableSignature {
            hex,
            recovery: recovery_id.to_byte(),
        })
    }

    /// Sign a message (Keccak-256 prehash).
    pub fn sign(&self, message: &[u8]) -> Result<RecoverableSignature, CoreError> {
        self.sign_prehash(&keccak256(message))
    }

    /// Sign a message the way a wallet does for `personal_sign`.
    pub fn sign_personal(&self, message: &[u8]) -> Result<RecoverableSignature, CoreError> {
        self.sign_prehash(&eth_message_hash(message))
    }
}

impl fmt::Debug for SignatureKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureKeypair({:?})", self.public_key())
    }
}

/// Recover the key that produced a `personal_sign` signature over `message`.
pub fn recover_personal_signer(
    message: &str,
    signature: &RecoverableSignature,
) -> Result<SignaturePublicKey, CoreError> {
    signature.recover_prehash(&eth_message_hash(message.as_bytes()))
}

/// Recover the address that produced a `personal_sign` signature over `message`.
pub fn recover_personal_address(
    message: &str,
    signature: &RecoverableSignature,
) -> Result<AccountId, CoreError> {
    recover_personal_signer(message, signature)?.address()
}

/// An external wallet able to `personal_sign` text messages.
///
/// The account it controls is the account id of every identity it proves.
pub trait WalletSigner {
    /// The wallet's address.
    fn address(&self) -> AccountId;

    /// Sign a UTF-8 message with the wallet's `personal_sign`.
    fn sign_message(&self, message: &str) -> Result<RecoverableSignature, CoreError>;
}

/// A wallet backed by a local secp256k1 key. Used by dev seeding and tests.
#[derive(Clone, Debug)]
pub struct LocalWallet {
    keypair: SignatureKeypair,
}

impl LocalWallet {
    /// Generate a random wallet.
    pub fn generate() -> Self {
        Self {
            keypair: SignatureKeypair::generate(),
        }
    }

    /// Create from a 32-byte secret.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, CoreError> {
        Ok(Self {
            keypair: SignatureKeypair::from_bytes(secret)?,
        })
    }
}

impl WalletSigner for LocalWallet {
    fn address(&self) -> AccountId {
        self.keypair.address()
    }

    fn sign_message(&self, message: &str) -> Result<RecoverableSignature, CoreError> {
        self.keypair.sign_personal(message.as_bytes())
    }
}
