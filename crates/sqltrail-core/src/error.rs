//! Error types for sqltrail operations.

use std::fmt;

/// The primary error type for all sqltrail operations.
#[derive(Debug)]
pub enum Error {
    /// The driver lost or could not use its connection
    Connection(ConnectionError),
    /// Errors reported by the database for a statement
    Query(QueryError),
    /// Context encoding/decoding errors
    Context(ContextError),
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
}

/// A driver-level failure, passed through untouched.
#[derive(Debug)]
pub struct ConnectionError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// An error the database reported for a statement.
///
/// The compaction layer never rewrites these: every field a driver fills in
/// reaches the caller exactly as the driver produced it.
#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub severity: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub column: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Statement timeout
    Timeout,
    /// Other database error
    Database,
}

/// Error raised while turning a context into (or out of) a SQL comment.
#[derive(Debug)]
pub struct ContextError {
    pub kind: ContextErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextErrorKind {
    /// A context comment did not carry a valid JSON object.
    Malformed,
    /// The encoded context is larger than the configured bound.
    TooLarge,
    /// A value offered as a context is not a JSON object.
    NotAnObject,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// The context error kind, if this is a context error.
    pub fn context_kind(&self) -> Option<ContextErrorKind> {
        match self {
            Error::Context(c) => Some(c.kind),
            _ => None,
        }
    }

    /// Shorthand for a configuration error without a source.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }
}

impl QueryError {
    /// Create a database error with just a message.
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            sqlstate: None,
            severity: None,
            message: message.into(),
            detail: None,
            hint: None,
            column: None,
            source: None,
        }
    }
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl ContextError {
    pub fn new(kind: ContextErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Context(e) => write!(f, "Context error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Context(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Serde(_) => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            ContextErrorKind::Malformed => "malformed context",
            ContextErrorKind::TooLarge => "context too large",
            ContextErrorKind::NotAnObject => "context is not an object",
        };
        write!(f, "{}: {}", label, self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ContextError> for Error {
    fn from(err: ContextError) -> Self {
        Error::Context(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for sqltrail operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_accessors() {
        let mut query = QueryError::new(QueryErrorKind::Constraint, "duplicate key value");
        query.sql = Some("INSERT INTO todo (id) VALUES (1)".to_string());
        query.sqlstate = Some("23505".to_string());

        let err = Error::Query(query);
        assert_eq!(err.sqlstate(), Some("23505"));
        assert_eq!(err.sql(), Some("INSERT INTO todo (id) VALUES (1)"));
        assert_eq!(
            err.to_string(),
            "Query error (SQLSTATE 23505): duplicate key value"
        );
        assert_eq!(err.context_kind(), None);
    }

    #[test]
    fn connection_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let mut conn = ConnectionError::new("connection lost");
        conn.source = Some(Box::new(io));

        let err = Error::from(conn);
        assert_eq!(err.to_string(), "Connection error: connection lost");
        assert_eq!(err.sqlstate(), None);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("reset by peer"));
    }

    #[test]
    fn context_error_display_and_kind() {
        let err = Error::from(ContextError::new(
            ContextErrorKind::TooLarge,
            "1000040 bytes exceeds 1000000",
        ));
        assert_eq!(err.context_kind(), Some(ContextErrorKind::TooLarge));
        assert_eq!(
            err.to_string(),
            "Context error: context too large: 1000040 bytes exceeds 1000000"
        );
    }

    #[test]
    fn serde_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::from(parse);
        assert!(matches!(err, Error::Serde(_)));
    }
}
