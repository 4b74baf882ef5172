//! Transaction statement compaction for sqltrail.
//!
//! Writes carry their context as an inline SQL comment. Inside a transaction
//! the caller submits the context as its own marker statement; this crate
//! folds that marker into the writes that follow and, for the common
//! `BEGIN / marker / write / COMMIT` shape, sends only the annotated write.
//!
//! - [`classify`] - lexical statement categories
//! - [`codec`] - `/*<affix> {json} <affix>*/` encoding
//! - [`config`] - [`CompactConfig`]
//! - [`session`] - the per-transaction state machine
//! - [`connection`] - [`ContextConnection`] / [`ContextTransaction`]

pub mod classify;
pub mod codec;
pub mod config;
pub mod connection;
pub mod session;

pub use classify::{StatementKind, classify, is_begin, is_commit, is_context_marker, is_write};
pub use codec::ContextCodec;
pub use config::{CompactConfig, DEFAULT_AFFIX, DEFAULT_MAX_CONTEXT_SIZE};
pub use connection::{ContextConnection, ContextTransaction};
pub use session::{CompactionState, Plan, TransactionSession};
