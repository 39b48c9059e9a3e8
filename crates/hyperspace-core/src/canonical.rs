//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! Every signature in the system covers canonical bytes, and every event
//! hash is taken over them, so all parties must produce identical output.

use ciborium::value::Value;

use crate::event::{SpaceEvent, Transaction};

/// Domain tags, one per kind of signed payload.
pub mod domains {
    pub const SPACE_EVENT: &str = "hyperspace/space-event/v1";
    pub const UPDATE: &str = "hyperspace/update/v1";
    pub const SPACE_INBOX_MESSAGE: &str = "hyperspace/space-inbox-message/v1";
    pub const ACCOUNT_INBOX_MESSAGE: &str = "hyperspace/account-inbox-message/v1";
    pub const ACCOUNT_INBOX: &str = "hyperspace/account-inbox/v1";
}

/// Event field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const DOMAIN: u64 = 0;
    pub const TYPE: u64 = 1;
    pub const ID: u64 = 2;
    pub const PREVIOUS_EVENT_HASH: u64 = 3;
    pub const AUTHOR_ACCOUNT: u64 = 4;
    pub const AUTHOR_KEY: u64 = 5;
    pub const BODY: u64 = 6;

    // Body keys
    pub const KEY_ID: u64 = 0;
    pub const INVITEE: u64 = 1;
    pub const KEY_IDS: u64 = 2;
    pub const INBOX_ID: u64 = 3;
    pub const ENCRYPTION_PUBLIC_KEY: u64 = 4;
    pub const SECRET_KEY: u64 = 5;
    pub const IS_PUBLIC: u64 = 6;
    pub const AUTH_POLICY: u64 = 7;
}

pub(crate) fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

pub(crate) fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub(crate) fn bytes(b: &[u8]) -> Value {
    Value::Bytes(b.to_vec())
}

/// Encode integer-keyed entries as a canonical map.
pub(crate) fn canonical_map(entries: Vec<(u64, Value)>) -> Vec<u8> {
    let entries: Vec<(Value, Value)> = entries.into_iter().map(|(k, v)| (int(k), v)).collect();
    encode_cbor_value_canonical(&Value::Map(entries))
}

/// The bytes an event's author signs: everything except the signature.
pub fn event_signing_bytes(event: &SpaceEvent) -> Vec<u8> {
    let tx = &event.transaction;
    let prev = match tx.previous_event_hash() {
        Some(hash) => bytes(hash.as_bytes()),
        None => Value::Null,
    };

    canonical_map(vec![
        (keys::DOMAIN, text(domains::SPACE_EVENT)),
        (keys::TYPE, text(tx.kind())),
        (keys::ID, text(tx.id())),
        (keys::PREVIOUS_EVENT_HASH, prev),
        (keys::AUTHOR_ACCOUNT, text(event.author.account_id.as_str())),
        (
            keys::AUTHOR_KEY,
            bytes(event.author.signature_public_key.as_bytes()),
        ),
        (keys::BODY, body_to_cbor_value(tx)),
    ])
}

/// Encode an entire event to canonical bytes.
///
/// Format: signing_bytes || signature (64) || recovery id (1)
pub fn event_canonical_bytes(event: &SpaceEvent) -> Vec<u8> {
    let mut buf = event_signing_bytes(event);
    buf.extend_from_slice(&event.signature.hex);
    buf.push(event.signature.recovery);
    buf
}

/// Variant-specific fields as a CBOR map.
fn body_to_cbor_value(tx: &Transaction) -> Value {
    let entries = match tx {
        Transaction::CreateSpace(t) => vec![(int(keys::KEY_ID), text(t.key_id.as_str()))],
        Transaction::CreateInvitation(t) => vec![
            (int(keys::INVITEE), text(t.invitee_account_id.as_str())),
            (
                int(keys::KEY_IDS),
                Value::Array(t.key_ids.iter().map(|k| text(k.as_str())).collect()),
            ),
        ],
        Transaction::AcceptInvitation(_) => Vec::new(),
        Transaction::CreateSpaceInbox(t) => vec![
            (int(keys::INBOX_ID), text(t.inbox_id.as_str())),
            (int(keys::ENCRYPTION_PUBLIC_KEY), bytes(&t.encryption_public_key)),
            (int(keys::SECRET_KEY), bytes(&t.secret_key)),
            (int(keys::IS_PUBLIC), Value::Bool(t.is_public)),
            (int(keys::AUTH_POLICY), text(t.auth_policy.as_str())),
        ],
        Transaction::RotateKey(t) => vec![(int(keys::KEY_ID), text(t.key_id.as_str()))],
    };
    Value::Map(entries)
}

/// Encode a CBOR Value to canonical bytes.
///
/// This function ensures:
/// - Map keys are sorted by encoded byte comparison
/// - Integers use smallest encoding
/// - Definite lengths only
fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => {
            encode_integer(buf, *i);
        }
        Value::Bytes(b) => {
            encode_bytes(buf, b);
        }
        Value::Text(s) => {
            encode_text(buf, s);
        }
        Value::Array(arr) => {
            encode_array(buf, arr);
        }
        Value::Map(entries) => {
            encode_map_canonical(buf, entries);
        }
        Value::Bool(b) => {
            buf.push(if *b { 0xf5 } else { 0xf4 });
        }
        Value::Null => {
            buf.push(0xf6);
        }
        // Values are only built by this module; floats and tags never occur.
        Value::Float(_) => {
            panic!("floats not supported in canonical encoding");
        }
        _ => {
            panic!("unsupported CBOR value type");
        }
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SignatureKeypair;
    use crate::event::SpaceEvent;
    use crate::types::{KeyId, SpaceId};

    fn root_event() -> SpaceEvent {
        let keypair = SignatureKeypair::from_bytes(&[0x42; 32]).unwrap();
        let tx = Transaction::create_space(SpaceId::from("space-1"), KeyId::from("key-1"));
        SpaceEvent::sign(tx, keypair.address(), &keypair).unwrap()
    }

    #[test]
    fn test_canonical_encoding_deterministic() {
        let event = root_event();
        assert_eq!(event_canonical_bytes(&event), event_canonical_bytes(&event));
        assert_eq!(event_signing_bytes(&event), event_signing_bytes(&event));
    }

    #[test]
    fn test_canonical_bytes_extend_signing_bytes() {
        let event = root_event();
        let signing = event_signing_bytes(&event);
        let full = event_canonical_bytes(&event);
        assert_eq!(full.len(), signing.len() + 65);
        assert_eq!(&full[..signing.len()], signing.as_slice());
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();

        encode_uint(&mut buf, 0, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 65535);
        assert_eq!(buf, vec![0x19, 0xff, 0xff]);
    }

    #[test]
    fn test_map_key_ordering() {
        let mut buf = Vec::new();
        let entries = vec![
            (Value::Integer(8.into()), Value::Integer(80.into())),
            (Value::Integer(0.into()), Value::Integer(0.into())),
            (Value::Integer(5.into()), Value::Integer(50.into())),
        ];
        encode_map_canonical(&mut buf, &entries);

        assert_eq!(buf[0], 0xa3);
        assert_eq!(buf[1], 0x00); // key 0
        assert_eq!(buf[2], 0x00);
        assert_eq!(buf[3], 0x05); // key 5
        assert_eq!(buf[4], 0x18);
        assert_eq!(buf[5], 50);
        assert_eq!(buf[6], 0x08); // key 8
        assert_eq!(buf[7], 0x18);
        assert_eq!(buf[8], 80);
    }

    #[test]
    fn test_map_order_independent_of_insertion() {
        let a = canonical_map(vec![(1, text("a")), (0, text("b"))]);
        let b = canonical_map(vec![(0, text("b")), (1, text("a"))]);
        assert_eq!(a, b);
    }
}
