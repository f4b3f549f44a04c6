//! Key record categories and structured key records.

use crate::serialization::{CodecError, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Category of a signal-protocol key record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyCategory {
    PreKey,
    Session,
    SenderKey,
    SenderKeyMemory,
    AppStateSyncKey,
    AppStateSyncVersion,
    /// Category introduced by a newer protocol client.
    Other(String),
}

impl KeyCategory {
    pub fn as_str(&self) -> &str {
        match self {
            KeyCategory::PreKey => "pre-key",
            KeyCategory::Session => "session",
            KeyCategory::SenderKey => "sender-key",
            KeyCategory::SenderKeyMemory => "sender-key-memory",
            KeyCategory::AppStateSyncKey => "app-state-sync-key",
            KeyCategory::AppStateSyncVersion => "app-state-sync-version",
            KeyCategory::Other(name) => name,
        }
    }
}

impl From<&str> for KeyCategory {
    fn from(s: &str) -> Self {
        match s {
            "pre-key" => KeyCategory::PreKey,
            "session" => KeyCategory::Session,
            "sender-key" => KeyCategory::SenderKey,
            "sender-key-memory" => KeyCategory::SenderKeyMemory,
            "app-state-sync-key" => KeyCategory::AppStateSyncKey,
            "app-state-sync-version" => KeyCategory::AppStateSyncVersion,
            other => KeyCategory::Other(other.to_string()),
        }
    }
}

impl FromStr for KeyCategory {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(KeyCategory::from(s))
    }
}

impl fmt::Display for KeyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store identifier for a key record: `"<category>-<id>"`.
pub fn record_id(category: &KeyCategory, id: &str) -> String {
    format!("{}-{}", category.as_str(), id)
}

/// Records to write, grouped by category. `None` deletes the record.
pub type KeyRecordSet = BTreeMap<KeyCategory, BTreeMap<String, Option<Value>>>;

/// Fingerprint of an app-state sync key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppStateSyncKeyFingerprint {
    pub raw_id: Option<u32>,
    pub current_index: Option<u32>,
    pub device_indexes: Vec<u32>,
}

/// Structured form of an app-state sync key record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppStateSyncKeyData {
    pub key_data: Option<Vec<u8>>,
    pub fingerprint: Option<AppStateSyncKeyFingerprint>,
    pub timestamp: Option<i64>,
}

impl AppStateSyncKeyData {
    /// Parse the stored record. Absent fields stay `None`; present fields of
    /// the wrong shape are rejected.
    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_object().ok_or(CodecError::UnexpectedShape {
            field: "app-state-sync-key".to_string(),
            expected: "object",
        })?;

        let key_data = match fields.get("keyData") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_bytes()
                    .map(<[u8]>::to_vec)
                    .ok_or(CodecError::UnexpectedShape {
                        field: "keyData".to_string(),
                        expected: "byte buffer",
                    })?,
            ),
        };

        let fingerprint = match fields.get("fingerprint") {
            None | Some(Value::Null) => None,
            Some(v) => Some(AppStateSyncKeyFingerprint {
                raw_id: u32_field(v, "rawId")?,
                current_index: u32_field(v, "currentIndex")?,
                device_indexes: match v.get("deviceIndexes") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(list) => device_indexes(list).ok_or(CodecError::UnexpectedShape {
                        field: "fingerprint.deviceIndexes".to_string(),
                        expected: "array of 32-bit unsigned integers",
                    })?,
                },
            }),
        };

        let timestamp = match fields.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_i64().ok_or(CodecError::UnexpectedShape {
                field: "timestamp".to_string(),
                expected: "integer",
            })?),
        };

        Ok(Self {
            key_data,
            fingerprint,
            timestamp,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut fields = BTreeMap::new();
        if let Some(key_data) = &self.key_data {
            fields.insert("keyData".to_string(), Value::from(key_data.clone()));
        }
        if let Some(fp) = &self.fingerprint {
            let mut fp_fields = BTreeMap::new();
            if let Some(raw_id) = fp.raw_id {
                fp_fields.insert("rawId".to_string(), Value::from(raw_id));
            }
            if let Some(current_index) = fp.current_index {
                fp_fields.insert("currentIndex".to_string(), Value::from(current_index));
            }
            fp_fields.insert(
                "deviceIndexes".to_string(),
                Value::Array(fp.device_indexes.iter().copied().map(Value::from).collect()),
            );
            fields.insert("fingerprint".to_string(), Value::Object(fp_fields));
        }
        if let Some(timestamp) = self.timestamp {
            fields.insert("timestamp".to_string(), Value::from(timestamp));
        }
        Value::Object(fields)
    }
}

fn device_indexes(list: &Value) -> Option<Vec<u32>> {
    list.as_array()?
        .iter()
        .map(|n| n.as_u64().and_then(|n| u32::try_from(n).ok()))
        .collect()
}

fn u32_field(parent: &Value, name: &str) -> Result<Option<u32>, CodecError> {
    match parent.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or(CodecError::UnexpectedShape {
                field: format!("fingerprint.{}", name),
                expected: "32-bit unsigned integer",
            }),
    }
}

/// A key record as returned by `keys().get`.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyRecord {
    AppStateSyncKey(AppStateSyncKeyData),
    Generic(Value),
}

impl KeyRecord {
    /// Interpret a stored value according to its category.
    pub fn from_stored(category: &KeyCategory, value: Value) -> Result<Self, CodecError> {
        match category {
            KeyCategory::AppStateSyncKey => {
                AppStateSyncKeyData::from_value(&value).map(KeyRecord::AppStateSyncKey)
            }
            _ => Ok(KeyRecord::Generic(value)),
        }
    }

    /// Value form for writing back.
    pub fn into_value(self) -> Value {
        match self {
            KeyRecord::AppStateSyncKey(data) => data.to_value(),
            KeyRecord::Generic(value) => value,
        }
    }

    pub fn as_generic(&self) -> Option<&Value> {
        match self {
            KeyRecord::Generic(value) => Some(value),
            KeyRecord::AppStateSyncKey(_) => None,
        }
    }
}
