//! sqltrail - attach who/why context to SQL writes.
//!
//! Audit pipelines that read the database's change stream can only see what
//! the statement itself carries. sqltrail puts the caller's context (user,
//! endpoint, request id, ...) into each write as a trailing SQL comment, and
//! does it without adding round trips: a transaction that only exists to
//! carry context for one write is sent as that single annotated write.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqltrail::prelude::*;
//!
//! async fn complete_todo(cx: &Cx, conn: &ContextConnection<impl Connection>, id: i64) {
//!     // Explicit transaction: the context marker rides on the next write.
//!     let tx = conn.begin(cx).await.unwrap();
//!     let marker = conn.codec().encode(&Context::new().with("userID", 1)).unwrap();
//!     tx.execute(cx, &marker, &[]).await.unwrap();
//!     tx.execute(cx, "UPDATE todo SET done = true WHERE id = $1", &[Value::BigInt(id)])
//!         .await
//!         .unwrap();
//!     tx.commit(cx).await.unwrap();
//!     // Only `UPDATE todo ... /*Bemi {"userID":1} Bemi*/` reached the database.
//! }
//!
//! async fn handler(cx: &Cx, conn: &ContextConnection<impl Connection>) {
//!     // Ambient context: single writes pick it up automatically.
//!     store::scope(Context::new().with("apiEndpoint", "/todo"), async {
//!         conn.execute(cx, "DELETE FROM todo WHERE done", &[]).await.unwrap();
//!     })
//!     .await;
//! }
//! ```
//!
//! # Crates
//!
//! - `sqltrail-core` - driver traits, values, rows and the error taxonomy
//! - `sqltrail-context` - the [`Context`] type and the task-scoped [`store`]
//! - `sqltrail-compact` - classification, encoding and transaction compaction

pub use sqltrail_core::{
    ConfigError, Connection, ConnectionError, ContextError, ContextErrorKind, Cx, Error,
    IsolationLevel, Outcome, QueryError, QueryErrorKind, Result, Row, Statement, TransactionOps,
    Value,
};

pub use sqltrail_context::{Context, ScopeError, store};

pub use sqltrail_compact::{
    CompactConfig, CompactionState, ContextCodec, ContextConnection, ContextTransaction, Plan,
    StatementKind, TransactionSession, classify, codec, config, session,
};

/// Commonly used types in one import.
pub mod prelude {
    pub use crate::{
        CompactConfig, Connection, Context, ContextConnection, ContextTransaction, Cx, Error,
        IsolationLevel, Outcome, Result, Row, TransactionOps, Value, store,
    };
}
