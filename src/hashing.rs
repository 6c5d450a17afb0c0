//! Report Digests - SHA-256 over Canonical JSON
//!
//! Lets a run summary identify exactly which flat report a baseline came from.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let result = Sha256::digest(data);
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(v))
}

fn sort_value(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_value(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_value).collect()),
        other => other,
    }
}

/// Digest of a report (flat, ranked or regression); key order does not matter.
pub fn report_digest<T: Serialize>(report: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(report)?.as_bytes()))
}
