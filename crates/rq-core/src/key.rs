//! The primary-key type used by keyed records (spec §3 "Keyed record").

use crate::value::Value;
use std::fmt;

/// A source's primary key, chosen by the caller's `getKey`. Collections and
/// the dataflow's `Index<K, V>` are generic over this type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(i) => write!(f, "{i}"),
            RecordKey::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(i: i64) -> Self {
        RecordKey::Int(i)
    }
}
impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        RecordKey::Str(s.to_string())
    }
}
impl From<String> for RecordKey {
    fn from(s: String) -> Self {
        RecordKey::Str(s)
    }
}

impl TryFrom<&Value> for RecordKey {
    type Error = crate::error::Error;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(i) => Ok(RecordKey::Int(*i)),
            Value::String(s) => Ok(RecordKey::Str(s.clone())),
            other => Err(crate::error::Error::TypeMismatch {
                expected: "int or string key",
                got: other.clone(),
            }),
        }
    }
}

impl From<&RecordKey> for Value {
    fn from(key: &RecordKey) -> Self {
        match key {
            RecordKey::Int(i) => Value::Int(*i),
            RecordKey::Str(s) => Value::String(s.clone()),
        }
    }
}
