//! Canonical JSON encoding and stable content hashing
//!
//! Identity hashes must not depend on how a value was constructed, only on
//! what it contains. Values are serialized to JSON, object keys are sorted
//! recursively, and the compact encoding is digested with SHA-256.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::Result;

/// Number of hex characters kept for node identity hashes.
pub const IDENTITY_HASH_LEN: usize = 8;

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(key, val)| (key, canonicalize(val)))
                .collect();
            Value::Object(Map::from_iter(ordered))
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Serializes a value into canonical JSON bytes with deterministic key order.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&canonical)?)
}

/// Full hexadecimal SHA-256 digest of the canonical encoding of `value`.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String> {
    let digest = Sha256::digest(to_canonical_json_bytes(value)?);
    Ok(format!("{digest:x}"))
}

/// Short identity hash used in node ids (`"{base_id}@{hash}"`).
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON.
pub fn identity_hash<T: Serialize>(value: &T) -> Result<String> {
    let mut full = stable_hash_string(value)?;
    full.truncate(IDENTITY_HASH_LEN);
    Ok(full)
}
