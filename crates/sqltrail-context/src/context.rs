//! The context value attached to writes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sqltrail_core::{ContextError, ContextErrorKind, Error, Result};

/// Caller-supplied metadata describing why a write happened.
///
/// A context is always a JSON object: keys are kept in insertion order so the
/// comment written to the database reads the way the caller built it. The
/// only ways in are the constructors below, which reject anything that is not
/// an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, JsonValue>);

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from any value that serializes to a JSON object.
    ///
    /// ```
    /// use serde::Serialize;
    /// use sqltrail_context::Context;
    ///
    /// #[derive(Serialize)]
    /// struct Request<'a> {
    ///     endpoint: &'a str,
    ///     user_id: i64,
    /// }
    ///
    /// let ctx = Context::from_serialize(&Request { endpoint: "/todo/complete", user_id: 1 }).unwrap();
    /// assert_eq!(ctx.get("user_id"), Some(&serde_json::json!(1)));
    /// ```
    #[allow(clippy::result_large_err)]
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value)?;
        Self::try_from(json)
    }

    /// Insert a key, returning the previous value for that key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Option<JsonValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow merge: keys in `other` overwrite keys already present.
    pub fn merge(&mut self, other: Context) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, JsonValue> {
        self.0
    }
}

impl From<Map<String, JsonValue>> for Context {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl From<Context> for JsonValue {
    fn from(ctx: Context) -> Self {
        JsonValue::Object(ctx.0)
    }
}

impl TryFrom<JsonValue> for Context {
    type Error = Error;

    fn try_from(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(map) => Ok(Self(map)),
            other => Err(Error::Context(ContextError::new(
                ContextErrorKind::NotAnObject,
                format!("expected a JSON object, got {}", json_kind(&other)),
            ))),
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_objects_convert() {
        let ctx = Context::try_from(json!({"userID": 1})).unwrap();
        assert_eq!(ctx.len(), 1);

        for bad in [json!(null), json!([1, 2]), json!("user"), json!(3)] {
            let err = Context::try_from(bad).unwrap_err();
            assert_eq!(err.context_kind(), Some(ContextErrorKind::NotAnObject));
        }
    }

    #[test]
    fn test_keys_keep_insertion_order() {
        let ctx = Context::new()
            .with("apiEndpoint", "/todo/complete")
            .with("userID", 1)
            .with("queryParams", json!({"id": 37}));
        let keys: Vec<&str> = ctx.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["apiEndpoint", "userID", "queryParams"]);
    }

    #[test]
    fn test_merge_is_shallow_and_overwrites() {
        let mut ctx = Context::new()
            .with("userID", 1)
            .with("meta", json!({"a": 1, "b": 2}));
        ctx.merge(Context::new().with("meta", json!({"c": 3})).with("requestID", "r-1"));

        assert_eq!(ctx.get("userID"), Some(&json!(1)));
        assert_eq!(ctx.get("meta"), Some(&json!({"c": 3})));
        assert_eq!(ctx.get("requestID"), Some(&json!("r-1")));
    }

    #[test]
    fn test_from_serialize_rejects_non_objects() {
        assert!(Context::from_serialize(&vec![1, 2, 3]).is_err());
        let ctx = Context::from_serialize(&json!({"actor": "admin"})).unwrap();
        assert_eq!(JsonValue::from(ctx), json!({"actor": "admin"}));
    }
}
