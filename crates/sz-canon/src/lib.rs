// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Canonical JSON serialization and SHA-256 content hashing.
//!
//! Canonical form: keys sorted recursively, UTF-8 without ASCII-escaping,
//! two-space indent, exactly one trailing newline. Relies on `serde_json`
//! being built *without* the `preserve_order` feature, so `serde_json::Map`
//! is backed by a `BTreeMap` and every object serializes in key order.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Errors raised while canonicalizing or hashing.
#[derive(Debug, thiserror::Error)]
pub enum CanonError {
    /// The value could not be serialized to JSON.
    #[error("failed to serialize value to canonical JSON: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Reading a file to hash failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Serialize `value` into the canonical byte form described in the module docs.
pub fn canonical_json(value: &Value) -> Result<String, CanonError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    let mut s = String::from_utf8(buf).expect("serde_json only emits valid UTF-8");
    s.push('\n');
    Ok(s)
}

/// Serialize any `Serialize` value by first round-tripping it through
/// [`serde_json::Value`], so canonicalization (key sorting) is guaranteed
/// regardless of the field order declared on the source struct.
pub fn canonical_json_of<T: Serialize>(value: &T) -> Result<String, CanonError> {
    let v = serde_json::to_value(value)?;
    canonical_json(&v)
}

/// Hex-encoded SHA-256 digest of `bytes`, with no prefix.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 digest of `bytes`, formatted as recorded in manifests and
/// snapshots: `sha256:<hex>`.
pub fn sha256_prefixed(bytes: &[u8]) -> String {
    format!("sha256:{}", sha256_hex(bytes))
}

/// Canonicalize `value` and return its `sha256:`-prefixed content hash.
pub fn canonical_hash(value: &Value) -> Result<String, CanonError> {
    let json = canonical_json(value)?;
    Ok(sha256_prefixed(json.as_bytes()))
}

/// Read `path` from disk and return its `sha256:`-prefixed content hash
/// along with its byte length.
///
/// This hashes the bytes actually on disk, never an in-memory
/// reconstruction — the invariant every snapshot in the engine relies on.
pub fn hash_file(path: &Path) -> Result<(String, u64), CanonError> {
    let bytes = std::fs::read(path).map_err(|source| CanonError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok((sha256_prefixed(&bytes), bytes.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_recursively() {
        let v = json!({"b": 1, "a": {"z": 1, "y": 2}});
        let s = canonical_json(&v).unwrap();
        let a_pos = s.find("\"a\"").unwrap();
        let b_pos = s.find("\"b\"").unwrap();
        assert!(a_pos < b_pos);
        let y_pos = s.find("\"y\"").unwrap();
        let z_pos = s.find("\"z\"").unwrap();
        assert!(y_pos < z_pos);
    }

    #[test]
    fn two_space_indent_and_trailing_newline() {
        let v = json!({"a": 1});
        let s = canonical_json(&v).unwrap();
        assert!(s.contains("{\n  \"a\": 1\n}"));
        assert!(s.ends_with('\n'));
        assert!(!s.ends_with("\n\n"));
    }

    #[test]
    fn does_not_escape_unicode() {
        let v = json!({"name": "caf\u{e9}"});
        let s = canonical_json(&v).unwrap();
        assert!(s.contains("café"));
        assert!(!s.contains("\\u00e9"));
    }

    #[test]
    fn identical_values_produce_identical_bytes() {
        let v1 = json!({"y": 2, "x": 1});
        let v2 = json!({"x": 1, "y": 2});
        assert_eq!(canonical_json(&v1).unwrap(), canonical_json(&v2).unwrap());
    }

    #[test]
    fn sha256_prefixed_has_stable_form() {
        let h = sha256_prefixed(b"");
        assert_eq!(
            h,
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash_file_matches_sha256_of_bytes_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        std::fs::write(&path, b"hello").unwrap();
        let (hash, len) = hash_file(&path).unwrap();
        assert_eq!(hash, sha256_prefixed(b"hello"));
        assert_eq!(len, 5);
    }

    #[test]
    fn canonical_json_of_ignores_struct_field_order() {
        #[derive(Serialize)]
        struct A {
            z: i32,
            a: i32,
        }
        let s = canonical_json_of(&A { z: 1, a: 2 }).unwrap();
        assert!(s.find("\"a\"").unwrap() < s.find("\"z\"").unwrap());
    }
}
