//! Ambient context for sqltrail.
//!
//! A [`Context`] says who or what caused a write (actor, request id,
//! endpoint, ...). The [`store`] module keeps the current context scoped to
//! a logical async task so that the connection wrapper can pick it up without
//! every call site threading it through.

pub mod context;
pub mod store;

pub use context::Context;
pub use store::{ScopeError, current, inherit, merge, scope, scope_empty, set};
