//! Mapping between record values and stored documents.
//!
//! Every record is stored whole under a single `value` field, flagged
//! `__wrapped`, plus an `updatedAt` stamp. Each `$set` therefore replaces the
//! entire record, whatever shape the previous write had. Documents without
//! the flag (written field by field by older writers) still decode.

use crate::serialization::{decode, decode_document, encode, Value};
use crate::store::{Document, ID_FIELD};
use serde_json::Value as Json;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const UPDATED_AT_FIELD: &str = "updatedAt";
const WRAPPED_FIELD: &str = "__wrapped";
const VALUE_FIELD: &str = "value";

/// Build the `$set` fields for writing `value`.
pub(crate) fn to_document(value: &Value, updated_at_ms: i64) -> Document {
    let mut document = Document::new();
    document.insert(VALUE_FIELD.to_string(), encode(value));
    document.insert(WRAPPED_FIELD.to_string(), Json::Bool(true));
    document.insert(UPDATED_AT_FIELD.to_string(), Json::from(updated_at_ms));
    document
}

/// Recover the record value from a stored document.
pub(crate) fn from_document(mut document: Document) -> Value {
    match document.get(WRAPPED_FIELD) {
        Some(Json::Bool(true)) => decode(document.remove(VALUE_FIELD).unwrap_or(Json::Null)),
        _ => {
            document.remove(ID_FIELD);
            document.remove(UPDATED_AT_FIELD);
            document.remove(WRAPPED_FIELD);
            decode_document(document)
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::apply_set;
    use serde_json::json;

    #[test]
    fn test_object_record_is_wrapped_whole() {
        let value = Value::object([("public", Value::from(vec![1u8, 2, 3]))]);
        let document = to_document(&value, 1_700_000_000_000);

        assert_eq!(
            Json::Object(document.clone()),
            json!({
                "value": {"public": {"type": "Buffer", "data": "AQID"}},
                "__wrapped": true,
                "updatedAt": 1_700_000_000_000i64
            })
        );
        assert_eq!(from_document(apply_set(None, "pre-key-1", document)), value);
    }

    #[test]
    fn test_bare_buffer_record_is_wrapped() {
        let value = Value::from(vec![9u8; 4]);
        let document = to_document(&value, 1);
        assert_eq!(document.get("value"), Some(&json!({"type": "Buffer", "data": "CQkJCQ=="})));
        assert_eq!(from_document(document), value);
    }

    #[test]
    fn test_buffer_overwritten_by_object_reads_as_object() {
        let first = apply_set(None, "pre-key-1", to_document(&Value::from(vec![1u8, 2]), 1));
        let object = Value::object([("keyId", Value::from(1u32))]);
        let merged = apply_set(Some(first), "pre-key-1", to_document(&object, 2));
        assert_eq!(from_document(merged), object);
    }

    #[test]
    fn test_object_overwritten_by_smaller_object_drops_old_fields() {
        let wide = Value::object([("a", Value::from(1u32)), ("b", Value::from(2u32))]);
        let first = apply_set(None, "x", to_document(&wide, 1));
        let narrow = Value::object([("a", Value::from(3u32))]);
        let merged = apply_set(Some(first), "x", to_document(&narrow, 2));
        assert_eq!(from_document(merged), narrow);
    }

    #[test]
    fn test_object_overwritten_by_scalar_reads_as_scalar() {
        let object = Value::object([("k", Value::from(true))]);
        let first = apply_set(None, "x", to_document(&object, 1));
        let merged = apply_set(Some(first), "x", to_document(&Value::from("new"), 2));
        assert_eq!(from_document(merged), Value::from("new"));
    }

    #[test]
    fn test_scalar_records_are_wrapped() {
        for value in [Value::from("text"), Value::from(7u32), Value::Null, Value::Array(vec![])] {
            let document = to_document(&value, 1);
            assert_eq!(document.get("__wrapped"), Some(&json!(true)));
            assert_eq!(from_document(document), value);
        }
    }

    #[test]
    fn test_reserved_field_names_survive_inside_records() {
        let value = Value::object([
            ("_id", Value::from("inner")),
            ("updatedAt", Value::from(5u32)),
            ("__wrapped", Value::from(false)),
            ("value", Value::from("payload")),
        ]);
        let document = apply_set(None, "x", to_document(&value, 1));
        assert_eq!(from_document(document), value);
    }

    #[test]
    fn test_field_by_field_document_overwritten_reads_new_record() {
        let legacy = json!({"_id": "x", "stale": 1, "updatedAt": 1});
        let object = Value::object([("fresh", Value::from(2u32))]);
        let merged = apply_set(
            legacy.as_object().cloned(),
            "x",
            to_document(&object, 2),
        );
        assert_eq!(from_document(merged), object);
    }

    #[test]
    fn test_documents_from_older_writers_decode() {
        let document = json!({
            "_id": "creds",
            "registrationId": 1234,
            "updatedAt": "2024-01-01T00:00:00Z",
            "noiseKey": {"public": {"type": "Buffer", "data": "AQ=="}}
        });
        let value = from_document(document.as_object().cloned().unwrap());
        assert_eq!(value.get("registrationId").and_then(Value::as_i64), Some(1234));
        assert!(value.get("_id").is_none());
        assert!(value.get("updatedAt").is_none());
    }
}
