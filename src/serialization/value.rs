//! Dynamic value type for credential and key records.
//!
//! Protocol-client records mix plain JSON-like data with shapes a document
//! store cannot hold natively: raw byte buffers, ordered maps with non-string
//! keys, sets, and arbitrary-precision integers. `Value` models all of them so
//! the codec can map them to tagged documents and back.

use num_bigint::BigInt;
use std::collections::BTreeMap;

/// A dynamic record value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// JSON number (integer or float).
    Number(serde_json::Number),
    /// Text string.
    String(String),
    /// Raw byte buffer.
    Bytes(Vec<u8>),
    /// Array of values.
    Array(Vec<Value>),
    /// Plain object with string keys.
    Object(BTreeMap<String, Value>),
    /// Ordered map; keys may be any value and insertion order is preserved.
    Map(Vec<(Value, Value)>),
    /// Insertion-ordered set of distinct values. Build it with [`Value::set`],
    /// which drops duplicates; decoding does the same.
    Set(Vec<Value>),
    /// Arbitrary-precision integer.
    BigInt(BigInt),
}

impl Value {
    /// Build an object value from `(key, value)` pairs.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a set value, dropping duplicate elements but keeping first-seen order.
    pub fn set<I: IntoIterator<Item = Value>>(elements: I) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for element in elements {
            if !out.contains(&element) {
                out.push(element);
            }
        }
        Value::Set(out)
    }

    /// Returns true for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Look up a field of an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Integer view of a number, big integer, or decimal string.
    ///
    /// Protocol clients store 64-bit counters in any of these three shapes
    /// depending on how they were produced.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::BigInt(b) => i64::try_from(b).ok(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|n| u64::try_from(n).ok())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::BigInt(n)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(serde_json::Number::from(n))
                }
            }
        )*
    };
}

impl_from_integer!(u8, u16, u32, u64, i8, i16, i32, i64);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
