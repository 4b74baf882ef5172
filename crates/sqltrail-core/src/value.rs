//! Bind values carried next to statement text.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A positional bind value.
///
/// sqltrail never looks inside these: a statement that gets a context comment
/// appended keeps its values untouched and in the same order, so placeholders
/// (`$1`, `$2`, ...) keep lining up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// `json` / `jsonb` parameter.
    Json(JsonValue),
    Array(Vec<Value>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widening integer access.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i32 => Int,
    i64 => BigInt,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    JsonValue => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(7_i32), Value::Int(7));
        assert_eq!(Value::from(37_i64), Value::BigInt(37));
        assert_eq!(Value::from("task"), Value::Text("task".to_string()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
        assert_eq!(Value::from(vec![1_u8, 2]), Value::Bytes(vec![1, 2]));
        assert_eq!(
            Value::from(vec![Value::BigInt(1), Value::Null]),
            Value::Array(vec![Value::BigInt(1), Value::Null])
        );
        assert_eq!(Value::from(json!({"a": 1})), Value::Json(json!({"a": 1})));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(3).as_i64(), Some(3));
        assert_eq!(Value::Text("a".into()).as_str(), Some("a"));
        assert_eq!(Value::Text("1".into()).as_i64(), None);
        assert!(Value::Null.is_null());
        assert_eq!(Value::Json(json!(null)).as_json(), Some(&json!(null)));
        assert_eq!(Value::Bool(true).as_json(), None);
    }
}
