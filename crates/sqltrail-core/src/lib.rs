//! Core types and traits for sqltrail.
//!
//! This crate provides the foundational abstractions the compaction layer is
//! built on:
//!
//! - `Connection` / `TransactionOps` traits for the driver boundary
//! - `Statement`, `Value` and `Row` for what crosses that boundary
//! - `Error` taxonomy shared by every sqltrail crate
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod row;
pub mod value;

pub use connection::{Connection, IsolationLevel, Statement, TransactionOps};
pub use error::{
    ConfigError, ConnectionError, ContextError, ContextErrorKind, Error, QueryError,
    QueryErrorKind, Result,
};
pub use row::Row;
pub use value::Value;
