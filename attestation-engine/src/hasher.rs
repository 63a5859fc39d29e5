//! Integrity hashing of alarm summaries
//!
//! The digest covers the date, device, alarm count, max concentration and
//! the instant the hash was generated. The canonical form is compact JSON
//! with keys in lexicographic order, hashed with SHA-256.
//!
//! Because the generation instant is part of the input, hashing the same
//! summary at two different instants yields two different digests. A
//! verifier needs the stored `generated_at` to recompute a digest.

use crate::types::{AlarmSummary, IntegrityHash};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Canonical serialization hashed by [`hash`]
pub fn canonical_payload(summary: &AlarmSummary, generated_at: DateTime<Utc>) -> String {
    let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
    fields.insert("alarm_count", Value::from(summary.alarm_count));
    fields.insert("date", Value::from(summary.date.format("%Y-%m-%d").to_string()));
    fields.insert("device_id", Value::from(summary.device_id.as_str()));
    fields.insert("max_concentration", Value::from(summary.max_concentration));
    fields.insert(
        "timestamp",
        Value::from(generated_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );

    // BTreeMap keeps key order stable regardless of serde_json features
    serde_json::to_string(&fields).unwrap_or_default()
}

/// Deterministic digest of a summary at a given generation instant
pub fn hash(summary: &AlarmSummary, generated_at: DateTime<Utc>) -> IntegrityHash {
    let digest = Sha256::digest(canonical_payload(summary, generated_at).as_bytes());
    IntegrityHash::from_bytes(digest.into())
}
