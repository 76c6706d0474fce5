//! Purpose: Encode secondary-index entries as sortable composite keys, plus row codecs.
//! Exports: `KEY_SEPARATOR`, `encode_index_key`, `exact_prefix`, `decode_primary_key`,
//! `sortable_i64`, `sortable_f64`, `RowCodec`, `JsonCodec`.
//! Role: Byte layout shared by table inserts (write side) and `match` lookups (read side).
//! Invariants: Composite key = index value ++ 0x00 ++ primary key; primary keys never
//! contain 0x00, so the last separator always marks where the primary key starts.
//! Invariants: Sortable numeric encodings are fixed-width, so byte order equals numeric order.
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

pub const KEY_SEPARATOR: u8 = 0x00;

pub fn encode_index_key(index_value: &str, primary_key: &str) -> Result<Vec<u8>, Error> {
    if primary_key.is_empty() || primary_key.as_bytes().contains(&KEY_SEPARATOR) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("primary key must be non-empty and free of 0x00 bytes"));
    }
    let mut key = Vec::with_capacity(index_value.len() + 1 + primary_key.len());
    key.extend_from_slice(index_value.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(primary_key.as_bytes());
    Ok(key)
}

/// Prefix matching only entries whose index value is exactly `index_value`.
pub fn exact_prefix(index_value: &str) -> Vec<u8> {
    let mut prefix = index_value.as_bytes().to_vec();
    prefix.push(KEY_SEPARATOR);
    prefix
}

pub fn decode_primary_key(composite: &[u8]) -> Result<&str, Error> {
    let split = composite
        .iter()
        .rposition(|byte| *byte == KEY_SEPARATOR)
        .ok_or_else(|| {
            Error::new(ErrorKind::Corrupt).with_message("index key has no separator")
        })?;
    let primary = &composite[split + 1..];
    if primary.is_empty() {
        return Err(Error::new(ErrorKind::Corrupt).with_message("index key has empty primary key"));
    }
    std::str::from_utf8(primary).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("index primary key is not utf-8")
            .with_source(err)
    })
}

/// Sign-aware fixed-width hex encoding of an `i64`.
pub fn sortable_i64(value: i64) -> String {
    format!("{:016x}", (value as u64) ^ (1 << 63))
}

/// Fixed-width hex encoding of an `f64` whose byte order follows numeric order
/// (negative values have every bit flipped, non-negative values only the sign bit).
pub fn sortable_f64(value: f64) -> String {
    let bits = value.to_bits();
    let ordered = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
    format!("{ordered:016x}")
}

/// Row serialization used for the primary store.
pub trait RowCodec<R>: Send + Sync {
    fn encode(&self, row: &R) -> Result<Vec<u8>, Error>;
    fn decode(&self, bytes: &[u8]) -> Result<R, Error>;
}

pub struct JsonCodec<R> {
    _row: PhantomData<fn() -> R>,
}

impl<R> JsonCodec<R> {
    pub fn new() -> Self {
        Self { _row: PhantomData }
    }
}

impl<R> Default for JsonCodec<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Serialize + DeserializeOwned> RowCodec<R> for JsonCodec<R> {
    fn encode(&self, row: &R) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(row).map_err(|err| {
            Error::new(ErrorKind::Codec)
                .with_message("failed to encode row")
                .with_source(err)
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<R, Error> {
        serde_json::from_slice(bytes).map_err(|err| {
            Error::new(ErrorKind::Codec)
                .with_message("failed to decode row")
                .with_source(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        decode_primary_key, encode_index_key, exact_prefix, sortable_f64, sortable_i64,
        JsonCodec, RowCodec,
    };
    use crate::core::error::ErrorKind;

    #[test]
    fn composite_key_groups_by_value_then_primary_key() {
        let a = encode_index_key("SHIPPED", "00000000000000000002").expect("key");
        let b = encode_index_key("SHIPPED", "00000000000000000010").expect("key");
        let c = encode_index_key("SHIPPEDX", "00000000000000000001").expect("key");
        assert!(a < b);
        assert!(b < c);
        assert!(a.starts_with(b"SHIPPED"));
        assert!(!c.starts_with(&exact_prefix("SHIPPED")));
    }

    #[test]
    fn primary_key_is_recovered_even_when_value_has_separator() {
        let key = encode_index_key("a\0b", "42").expect("key");
        assert_eq!(decode_primary_key(&key).expect("decode"), "42");
    }

    #[test]
    fn malformed_keys_are_corrupt() {
        assert_eq!(decode_primary_key(b"novalue").expect_err("err").kind(), ErrorKind::Corrupt);
        assert_eq!(decode_primary_key(b"value\0").expect_err("err").kind(), ErrorKind::Corrupt);
        assert_eq!(encode_index_key("v", "").expect_err("err").kind(), ErrorKind::Usage);
    }

    #[test]
    fn sortable_integers_follow_numeric_order() {
        let values = [i64::MIN, -1_000, -1, 0, 1, 9, 10, 1_000, i64::MAX];
        let encoded: Vec<String> = values.iter().map(|v| sortable_i64(*v)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
        assert!(encoded.iter().all(|e| e.len() == 16));
    }

    #[test]
    fn sortable_floats_follow_numeric_order() {
        let values = [f64::NEG_INFINITY, -967.6, -1.5, -0.0, 0.0, 0.25, 107.6, 767.6, f64::INFINITY];
        let encoded: Vec<String> = values.iter().map(|v| sortable_f64(*v)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn json_codec_reports_codec_errors() {
        let codec: JsonCodec<Vec<u32>> = JsonCodec::new();
        let bytes = codec.encode(&vec![1, 2, 3]).expect("encode");
        assert_eq!(codec.decode(&bytes).expect("decode"), vec![1, 2, 3]);
        let err = codec.decode(b"{not json").expect_err("decode");
        assert_eq!(err.kind(), ErrorKind::Codec);
    }
}
