//! Versioned record codec
//!
//! Every value written to the store is wrapped as
//! `{"schema_version": N, "kind": "...", "data": {...}}`. Records whose kind or
//! version does not match the reader decode as absent, so an old entry is
//! simply refetched instead of being misread.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::Result;

pub trait VersionedRecord: Serialize + DeserializeOwned {
    const KIND: &'static str;
    const SCHEMA_VERSION: u32;
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema_version: u32,
    kind: &'a str,
    data: &'a T,
}

#[derive(Deserialize)]
struct RawEnvelope {
    schema_version: u32,
    kind: String,
    data: serde_json::Value,
}

pub fn encode<T: VersionedRecord>(record: &T) -> Result<String> {
    let envelope = EnvelopeRef {
        schema_version: T::SCHEMA_VERSION,
        kind: T::KIND,
        data: record,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode a stored value, treating corrupt or foreign records as a miss
pub fn decode<T: VersionedRecord>(key: &str, raw: &str) -> Option<T> {
    let envelope: RawEnvelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(key, error = %e, "Discarding unreadable record");
            return None;
        }
    };

    if envelope.kind != T::KIND || envelope.schema_version != T::SCHEMA_VERSION {
        warn!(
            key,
            kind = %envelope.kind,
            schema_version = envelope.schema_version,
            expected_kind = T::KIND,
            expected_version = T::SCHEMA_VERSION,
            "Discarding record with mismatched schema"
        );
        return None;
    }

    match serde_json::from_value(envelope.data) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(key, error = %e, "Discarding record with invalid payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u64,
    }

    impl VersionedRecord for Sample {
        const KIND: &'static str = "sample";
        const SCHEMA_VERSION: u32 = 2;
    }

    #[test]
    fn test_encode_tags_version_and_kind() {
        let raw = encode(&Sample { name: "a".into(), count: 3 }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schema_version"], 2);
        assert_eq!(value["kind"], "sample");
        assert_eq!(value["data"]["count"], 3);
    }

    #[test]
    fn test_decode_valid_record() {
        let sample = Sample { name: "a".into(), count: 3 };
        let raw = encode(&sample).unwrap();
        assert_eq!(decode::<Sample>("k", &raw), Some(sample));
    }

    #[test]
    fn test_decode_rejects_old_version() {
        let raw = r#"{"schema_version":1,"kind":"sample","data":{"name":"a","count":3}}"#;
        assert_eq!(decode::<Sample>("k", raw), None);
    }

    #[test]
    fn test_decode_rejects_foreign_kind_and_garbage() {
        let raw = r#"{"schema_version":2,"kind":"other","data":{"name":"a","count":3}}"#;
        assert_eq!(decode::<Sample>("k", raw), None);
        assert_eq!(decode::<Sample>("k", "not json"), None);
        assert_eq!(
            decode::<Sample>("k", r#"{"schema_version":2,"kind":"sample","data":{"name":1}}"#),
            None
        );
    }
}
