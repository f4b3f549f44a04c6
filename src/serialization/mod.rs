//! Binary-safe document codec.
//!
//! Maps [`Value`] trees onto plain JSON documents a document store can hold,
//! and back. Shapes JSON has no native form for are written as tagged objects:
//!
//! ```text
//! bytes   -> {"type": "Buffer", "data": "<base64>"}
//! map     -> {"type": "Map",    "data": [[key, value], ...]}
//! set     -> {"type": "Set",    "data": [element, ...]}
//! bigint  -> {"type": "BigInt", "data": "<decimal>"}
//! ```
//!
//! Decoding dispatches on the `type` tag. Anything that is not a well-formed
//! tagged shape passes through as a plain object.

pub mod value;

pub use value::Value;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use num_bigint::BigInt;
use serde_json::{Map as JsonMap, Value as Json};
use thiserror::Error;

/// Errors converting decoded values into typed records.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A value had a different shape than the record requires.
    #[error("Unexpected shape for {field}: expected {expected}")]
    UnexpectedShape {
        field: String,
        expected: &'static str,
    },

    /// A required field was absent.
    #[error("Missing field: {0}")]
    MissingField(String),
}

const TYPE_TAG: &str = "type";
const DATA_TAG: &str = "data";

/// Encode a value into a store-safe JSON document value.
pub fn encode(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => Json::Number(n.clone()),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => tagged("Buffer", Json::String(STANDARD.encode(bytes))),
        Value::Array(items) => Json::Array(items.iter().map(encode).collect()),
        Value::Object(fields) => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect(),
        ),
        Value::Map(pairs) => tagged(
            "Map",
            Json::Array(
                pairs
                    .iter()
                    .map(|(k, v)| Json::Array(vec![encode(k), encode(v)]))
                    .collect(),
            ),
        ),
        Value::Set(items) => tagged("Set", Json::Array(items.iter().map(encode).collect())),
        Value::BigInt(n) => tagged("BigInt", Json::String(n.to_string())),
    }
}

/// Decode a JSON document value produced by [`encode`].
pub fn decode(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Number(n),
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(decode).collect()),
        Json::Object(map) => decode_object(map),
    }
}

/// Decode a whole document (a JSON object) into an object value.
pub fn decode_document(document: JsonMap<String, Json>) -> Value {
    decode_object(document)
}

fn tagged(tag: &str, data: Json) -> Json {
    let mut map = JsonMap::new();
    map.insert(TYPE_TAG.to_string(), Json::String(tag.to_string()));
    map.insert(DATA_TAG.to_string(), data);
    Json::Object(map)
}

fn decode_object(map: JsonMap<String, Json>) -> Value {
    if let Some(value) = decode_tagged(&map) {
        return value;
    }
    Value::Object(map.into_iter().map(|(k, v)| (k, decode(v))).collect())
}

fn decode_tagged(map: &JsonMap<String, Json>) -> Option<Value> {
    // Older writers flagged buffers with `buffer: true` and a `value` payload.
    if map.get("buffer") == Some(&Json::Bool(true)) {
        return decode_buffer(map.get("value").or_else(|| map.get(DATA_TAG))?);
    }

    match map.get(TYPE_TAG)?.as_str()? {
        "Buffer" => decode_buffer(map.get(DATA_TAG).or_else(|| map.get("value"))?),
        "Map" => map
            .get(DATA_TAG)?
            .as_array()?
            .iter()
            .map(|pair| match pair.as_array()?.as_slice() {
                [k, v] => Some((decode(k.clone()), decode(v.clone()))),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Value::Map),
        "Set" => Some(Value::set(
            map.get(DATA_TAG)?.as_array()?.iter().cloned().map(decode),
        )),
        "BigInt" => map
            .get(DATA_TAG)?
            .as_str()?
            .parse::<BigInt>()
            .ok()
            .map(Value::BigInt),
        _ => None,
    }
}

fn decode_buffer(data: &Json) -> Option<Value> {
    match data {
        Json::String(b64) => STANDARD.decode(b64).ok().map(Value::Bytes),
        // Node's own Buffer JSON form: an array of byte numbers.
        Json::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Value::Bytes),
        _ => None,
    }
}
