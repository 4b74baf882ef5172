//! Per-transaction statement planning.
//!
//! A [`TransactionSession`] decides, for each statement submitted inside one
//! transaction, what actually goes to the database. It performs no I/O: the
//! caller hands it a statement and receives a [`Plan`] naming which withheld
//! statements must be replayed first and what (if anything) to send in place
//! of the submitted one.
//!
//! # The compacted shape
//!
//! The common "attach context to one write" transaction looks like:
//!
//! ```text
//! BEGIN                       -- withheld
//! /*Bemi {"userID":1} Bemi*/  -- withheld, recorded
//! UPDATE t SET x = 1          -- sent as: UPDATE t SET x = 1 /*Bemi {"userID":1} Bemi*/
//! COMMIT                      -- withheld
//! ```
//!
//! The database sees a single autocommitted write carrying its context, which
//! is indistinguishable from having run the four statements.
//!
//! # Catch-up
//!
//! As soon as the transaction deviates from that shape (second statement is
//! not a marker, or third statement is not a write), compaction is abandoned:
//! the withheld `BEGIN` is replayed, and from then on every statement is sent,
//! with context appended to writes. Markers are never sent.

use crate::classify::{StatementKind, classify};
use crate::codec::ContextCodec;
use crate::config::CompactConfig;
use sqltrail_context::Context;
use sqltrail_core::{Result, Statement};
use std::sync::Arc;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionState {
    /// Statements may still be withheld.
    Buffering,
    /// Compaction was abandoned; everything but markers is sent.
    PassThrough,
}

/// What to send for one submitted statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    /// Previously withheld statements to send first, in submission order.
    pub replay: Vec<Statement>,
    /// The statement to send in place of the submitted one. `None` means the
    /// submitted statement is answered locally with an empty result.
    pub forward: Option<Statement>,
}

impl Plan {
    fn suppressed() -> Self {
        Self::default()
    }

    pub fn is_suppressed(&self) -> bool {
        self.forward.is_none()
    }
}

#[derive(Debug, Clone)]
struct Observed {
    statement: Statement,
    kind: StatementKind,
    withheld: bool,
}

/// Compaction state for exactly one transaction.
#[derive(Debug)]
pub struct TransactionSession {
    config: Arc<CompactConfig>,
    codec: ContextCodec,
    state: CompactionState,
    observed: Vec<Observed>,
    marker: Option<Context>,
}

impl TransactionSession {
    pub fn new(config: Arc<CompactConfig>) -> Self {
        let codec = ContextCodec::new(config.affix.clone());
        Self {
            config,
            codec,
            state: CompactionState::Buffering,
            observed: Vec::new(),
            marker: None,
        }
    }

    pub fn state(&self) -> CompactionState {
        self.state
    }

    /// Number of statements submitted so far.
    pub fn observed_len(&self) -> usize {
        self.observed.len()
    }

    /// The most recently recorded marker context.
    pub fn context(&self) -> Option<&Context> {
        self.marker.as_ref()
    }

    /// Whether a `BEGIN` has actually reached the database.
    pub fn transaction_opened(&self) -> bool {
        self.observed
            .iter()
            .any(|o| o.kind == StatementKind::Begin && !o.withheld)
    }

    /// Whether the session compacted: a write went out while the `BEGIN`
    /// before it stayed withheld.
    pub fn is_compacted(&self) -> bool {
        self.state == CompactionState::Buffering
            && self
                .observed
                .iter()
                .any(|o| o.kind == StatementKind::Write && !o.withheld)
    }

    /// Decide what to send for `statement`.
    ///
    /// Fails only when a context marker cannot be decoded; the session is
    /// left unchanged in that case.
    #[allow(clippy::result_large_err)]
    pub fn plan(&mut self, statement: Statement) -> Result<Plan> {
        let kind = classify(statement.sql(), self.codec.affix());
        let decoded = match kind {
            StatementKind::ContextMarker => Some(self.codec.decode(statement.sql())?),
            _ => None,
        };

        if self.state == CompactionState::PassThrough {
            let forward = self.emit(&statement, kind, decoded);
            self.record(statement, kind, forward.is_none());
            return Ok(Plan {
                replay: Vec::new(),
                forward,
            });
        }

        let count = self.observed.len() + 1;
        let had_marker = self.marker.is_some();

        if kind == StatementKind::Begin && count == 1 {
            tracing::debug!("Withholding BEGIN");
            self.record(statement, kind, true);
            return Ok(Plan::suppressed());
        }

        if kind == StatementKind::Commit && had_marker && count == 4 {
            tracing::debug!("Withholding COMMIT of compacted transaction");
            self.record(statement, kind, true);
            return Ok(Plan::suppressed());
        }

        let deviates = (count == 2 && kind != StatementKind::ContextMarker)
            || (count == 3 && kind != StatementKind::Write);
        let replay = if deviates {
            tracing::info!(
                observed = count,
                ?kind,
                "Transaction does not compact, switching to pass-through"
            );
            self.state = CompactionState::PassThrough;
            self.catch_up()
        } else {
            Vec::new()
        };

        let forward = self.emit(&statement, kind, decoded);
        self.record(statement, kind, forward.is_none());
        Ok(Plan { replay, forward })
    }

    /// Release every withheld statement except markers, rendered as
    /// pass-through would have rendered it.
    fn catch_up(&mut self) -> Vec<Statement> {
        let pending: Vec<(Statement, StatementKind)> = self
            .observed
            .iter_mut()
            .filter(|o| o.withheld && o.kind != StatementKind::ContextMarker)
            .map(|o| {
                o.withheld = false;
                (o.statement.clone(), o.kind)
            })
            .collect();

        pending
            .iter()
            .map(|(statement, kind)| self.render(statement, *kind))
            .collect()
    }

    fn emit(
        &mut self,
        statement: &Statement,
        kind: StatementKind,
        decoded: Option<Context>,
    ) -> Option<Statement> {
        if let Some(context) = decoded {
            tracing::debug!(keys = context.len(), "Recorded context marker");
            self.marker = Some(context);
            return None;
        }
        Some(self.render(statement, kind))
    }

    /// Append the recorded context to a participating write.
    fn render(&self, statement: &Statement, kind: StatementKind) -> Statement {
        let Some(context) = &self.marker else {
            return statement.clone();
        };
        if kind != StatementKind::Write || !self.config.includes_write(statement.sql()) {
            return statement.clone();
        }

        let sql_field = self.config.inject_sql.then(|| statement.sql());
        match self
            .codec
            .encode_bounded(context, sql_field, self.config.max_context_size)
        {
            Ok(comment) => statement.with_sql(ContextCodec::append(statement.sql(), &comment)),
            Err(e) => {
                tracing::debug!(error = %e, "Sending write without context");
                statement.clone()
            }
        }
    }

    fn record(&mut self, statement: Statement, kind: StatementKind, withheld: bool) {
        self.observed.push(Observed {
            statement,
            kind,
            withheld,
        });
    }
}
