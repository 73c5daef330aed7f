//! Hashing primitives for LedgerChain
//!
//! Blocks are digested over a canonical JSON rendering: object keys sorted at
//! every level, `", "` / `": "` separators and ASCII-only output with
//! `\uXXXX` escapes. Two nodes holding structurally equal blocks therefore
//! always agree on the digest, regardless of how the fields were ordered on
//! the wire.

use crate::blockchain::Block;
use crate::error::Result;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::ser::Formatter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io;

/// SHA-256 of `data`, rendered as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Digest of a block over its canonical serialization.
pub fn hash_block(block: &Block) -> Result<String> {
    let bytes = canonical_json(block)?;
    Ok(sha256_hex(&bytes))
}

/// Canonical byte encoding of any serializable value.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(256);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
    Sorted(&value).serialize(&mut ser)?;
    Ok(out)
}

/// Serializes a `Value` with object keys in lexicographic order, independent
/// of the map representation serde_json was built with.
struct Sorted<'a>(&'a Value);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Sorted(value))?;
                }
                out.end()
            }
            Value::Array(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(&Sorted(item))?;
                }
                out.end()
            }
            other => other.serialize(serializer),
        }
    }
}

struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"z": [3, {"y": 1, "x": 2}], "c": "d"}});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a": {"c": "d", "z": [3, {"x": 2, "y": 1}]}, "b": 1}"#
        );
    }

    #[test]
    fn test_canonical_json_escapes_non_ascii() {
        let bytes = canonical_json(&json!({"name": "caf\u{e9} \u{1F600}"})).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"name": "caf\u00e9 \ud83d\ude00"}"#
        );
    }

    #[test]
    fn test_canonical_json_keeps_number_kinds() {
        let bytes = canonical_json(&json!({"int": 10, "real": 2.5, "neg": -3})).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"int": 10, "neg": -3, "real": 2.5}"#
        );
    }
}
