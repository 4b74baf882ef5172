//! Context comment encoding.
//!
//! A context travels as a block comment wrapped in an affix token:
//!
//! ```text
//! /*Bemi {"apiEndpoint":"/todo/complete","userID":1} Bemi*/
//! ```
//!
//! The same shape is used for a standalone marker statement and for the
//! comment appended to a write.
//!
//! Every `*` inside the JSON payload is written as the escape `\u002a`, so no
//! context value can close the comment early or open a nested one. Decoding
//! needs no special handling: it is ordinary JSON.

use serde_json::{Map, Value as JsonValue};
use sqltrail_context::Context;
use sqltrail_core::{ContextError, ContextErrorKind, Error, Result};

/// Key under which a write's own SQL is folded into its context.
pub const SQL_KEY: &str = "SQL";

/// Encoder/decoder for context comments with a fixed affix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextCodec {
    affix: String,
}

impl ContextCodec {
    pub fn new(affix: impl Into<String>) -> Self {
        Self {
            affix: affix.into(),
        }
    }

    pub fn affix(&self) -> &str {
        &self.affix
    }

    /// Render a context as `/*<affix> <json> <affix>*/`.
    #[allow(clippy::result_large_err)]
    pub fn encode(&self, context: &Context) -> Result<String> {
        let json = serde_json::to_string(context.as_map())?;
        Ok(self.wrap(&json))
    }

    /// Like [`encode`](Self::encode), with the write's SQL placed first under
    /// `"SQL"`. A context key that is itself named `SQL` wins.
    #[allow(clippy::result_large_err)]
    pub fn encode_with_sql(&self, context: &Context, sql: &str) -> Result<String> {
        let mut map = Map::with_capacity(context.len() + 1);
        map.insert(SQL_KEY.to_string(), JsonValue::String(sql.to_string()));
        for (key, value) in context.iter() {
            map.insert(key.clone(), value.clone());
        }
        let json = serde_json::to_string(&map)?;
        Ok(self.wrap(&json))
    }

    /// Encode, optionally folding in `sql`, and refuse results longer than
    /// `max_bytes`.
    #[allow(clippy::result_large_err)]
    pub fn encode_bounded(
        &self,
        context: &Context,
        sql: Option<&str>,
        max_bytes: usize,
    ) -> Result<String> {
        let comment = match sql {
            Some(sql) => self.encode_with_sql(context, sql)?,
            None => self.encode(context)?,
        };
        if comment.len() > max_bytes {
            return Err(Error::Context(ContextError::new(
                ContextErrorKind::TooLarge,
                format!(
                    "encoded context is {} bytes, limit is {max_bytes}",
                    comment.len()
                ),
            )));
        }
        Ok(comment)
    }

    /// Parse a marker statement back into its context.
    #[allow(clippy::result_large_err)]
    pub fn decode(&self, marker: &str) -> Result<Context> {
        let trimmed = marker.trim();
        let payload = trimmed
            .strip_prefix("/*")
            .and_then(|rest| rest.strip_prefix(self.affix.as_str()))
            .and_then(|rest| rest.strip_suffix("*/"))
            .and_then(|rest| rest.strip_suffix(self.affix.as_str()))
            .ok_or_else(|| {
                malformed(format!("statement is not a '{}' context comment", self.affix))
            })?;

        let value: JsonValue = serde_json::from_str(payload.trim()).map_err(|e| {
            Error::Context(
                ContextError::new(ContextErrorKind::Malformed, "context payload is not valid JSON")
                    .with_source(e),
            )
        })?;

        match value {
            JsonValue::Object(map) => Ok(Context::from(map)),
            _ => Err(malformed("context payload is not a JSON object")),
        }
    }

    /// `sql` followed by a space and `comment`.
    pub fn append(sql: &str, comment: &str) -> String {
        let mut merged = String::with_capacity(sql.len() + comment.len() + 1);
        merged.push_str(sql);
        merged.push(' ');
        merged.push_str(comment);
        merged
    }

    fn wrap(&self, json: &str) -> String {
        let payload = json.replace('*', "\\u002a");
        format!("/*{affix} {payload} {affix}*/", affix = self.affix)
    }
}

impl Default for ContextCodec {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_AFFIX)
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::Context(ContextError::new(ContextErrorKind::Malformed, message))
}
