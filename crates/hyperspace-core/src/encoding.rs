//! Hex helpers shared by every byte-valued field on the wire.
//!
//! Bytes travel as lowercase hex with a `0x` prefix. The prefix is optional
//! on input.

use serde::{de, Deserialize, Deserializer, Serializer};

/// Encode bytes as `0x`-prefixed lowercase hex.
pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode hex with or without a `0x` prefix.
pub fn from_hex_prefixed(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(trimmed)
}

/// Decode hex into a fixed-size array.
pub fn array_from_hex<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let bytes = from_hex_prefixed(s)?;
    bytes
        .try_into()
        .map_err(|_| hex::FromHexError::InvalidStringLength)
}

/// Serde adapter for fixed-size byte arrays.
pub mod hex_array {
    use super::*;

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_hex_prefixed(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        array_from_hex(&s).map_err(de::Error::custom)
    }
}

/// Serde adapter for variable-length byte vectors.
pub mod hex_vec {
    use super::*;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_hex_prefixed(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        from_hex_prefixed(&s).map_err(de::Error::custom)
    }
}
