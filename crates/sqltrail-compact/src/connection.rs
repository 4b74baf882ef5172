//! Connection wrapper that merges context into writes.
//!
//! [`ContextConnection`] wraps any [`Connection`] and adds two entry points:
//!
//! - [`ContextConnection::begin`] opens a [`ContextTransaction`], which runs
//!   every statement through a [`TransactionSession`] and executes the
//!   resulting plan.
//! - The plain [`Connection`] methods, used outside a transaction, attach the
//!   ambient context (see [`sqltrail_context::store`]) to a single write by
//!   running it as a one-write transaction that compacts down to the write
//!   itself.

use crate::classify::{is_context_marker, is_write};
use crate::codec::ContextCodec;
use crate::config::CompactConfig;
use crate::session::TransactionSession;
use asupersync::{Cx, Outcome};
use sqltrail_context::{Context, store};
use sqltrail_core::{Connection, Error, IsolationLevel, Result, Row, Statement, TransactionOps, Value};
use std::sync::{Arc, Mutex, PoisonError};

/// Unwrap an `Outcome::Ok`, returning every other variant to the caller.
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            Outcome::Ok(value) => value,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    };
}

fn from_result<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(value) => Outcome::Ok(value),
        Err(e) => Outcome::Err(e),
    }
}

/// A connection that carries caller context into the database.
#[derive(Debug)]
pub struct ContextConnection<C> {
    inner: C,
    config: Arc<CompactConfig>,
    codec: ContextCodec,
}

impl<C: Connection> ContextConnection<C> {
    /// Wrap `inner`, validating `config` first.
    #[allow(clippy::result_large_err)]
    pub fn new(inner: C, config: CompactConfig) -> Result<Self> {
        config.validate()?;
        let codec = ContextCodec::new(config.affix.clone());
        Ok(Self {
            inner,
            config: Arc::new(config),
            codec,
        })
    }

    /// Wrap `inner` with the default configuration.
    pub fn with_defaults(inner: C) -> Self {
        let config = CompactConfig::default();
        Self {
            inner,
            codec: ContextCodec::new(config.affix.clone()),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CompactConfig {
        &self.config
    }

    pub fn codec(&self) -> &ContextCodec {
        &self.codec
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Start a transaction.
    ///
    /// The `BEGIN` is withheld until the transaction turns out not to
    /// compact, so this never touches the database.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn begin(&self, cx: &Cx) -> Outcome<ContextTransaction<'_, C>, Error> {
        let tx = self.transaction();
        try_outcome!(tx.execute(cx, "BEGIN", &[]).await);
        Outcome::Ok(tx)
    }

    /// Start a transaction at a specific isolation level.
    ///
    /// The `SET TRANSACTION` statement sends the withheld `BEGIN` along with
    /// it, so such transactions never compact. If it fails, the transaction
    /// is rolled back before the error is returned.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn begin_with(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> Outcome<ContextTransaction<'_, C>, Error> {
        let tx = self.transaction();
        try_outcome!(tx.execute(cx, "BEGIN", &[]).await);
        match tx.execute(cx, &isolation.set_transaction_sql(), &[]).await {
            Outcome::Ok(_) => Outcome::Ok(tx),
            Outcome::Err(e) => {
                if let Outcome::Err(rollback) = tx.rollback(cx).await {
                    tracing::debug!(error = %rollback, "ROLLBACK after failed SET TRANSACTION failed");
                }
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Execute a statement with `context` attached, ignoring the ambient store.
    #[tracing::instrument(level = "debug", skip(self, cx, context, params))]
    pub async fn execute_with_context(
        &self,
        cx: &Cx,
        context: &Context,
        sql: &str,
        params: &[Value],
    ) -> Outcome<u64, Error> {
        let tx = match try_outcome!(self.prepare_single(cx, context, sql).await) {
            Some(tx) => tx,
            None => {
                self.log_sent(sql);
                return self.inner.execute(cx, sql, params).await;
            }
        };
        let affected = try_outcome!(tx.execute(cx, sql, params).await);
        try_outcome!(tx.commit(cx).await);
        Outcome::Ok(affected)
    }

    /// Run a query with `context` attached, ignoring the ambient store.
    #[tracing::instrument(level = "debug", skip(self, cx, context, params))]
    pub async fn query_with_context(
        &self,
        cx: &Cx,
        context: &Context,
        sql: &str,
        params: &[Value],
    ) -> Outcome<Vec<Row>, Error> {
        let tx = match try_outcome!(self.prepare_single(cx, context, sql).await) {
            Some(tx) => tx,
            None => {
                self.log_sent(sql);
                return self.inner.query(cx, sql, params).await;
            }
        };
        let rows = try_outcome!(tx.query(cx, sql, params).await);
        try_outcome!(tx.commit(cx).await);
        Outcome::Ok(rows)
    }

    /// Run a query returning at most one row with `context` attached.
    #[tracing::instrument(level = "debug", skip(self, cx, context, params))]
    pub async fn query_one_with_context(
        &self,
        cx: &Cx,
        context: &Context,
        sql: &str,
        params: &[Value],
    ) -> Outcome<Option<Row>, Error> {
        let tx = match try_outcome!(self.prepare_single(cx, context, sql).await) {
            Some(tx) => tx,
            None => {
                self.log_sent(sql);
                return self.inner.query_one(cx, sql, params).await;
            }
        };
        let row = try_outcome!(tx.query_one(cx, sql, params).await);
        try_outcome!(tx.commit(cx).await);
        Outcome::Ok(row)
    }

    fn transaction(&self) -> ContextTransaction<'_, C> {
        ContextTransaction {
            conn: &self.inner,
            session: Mutex::new(TransactionSession::new(Arc::clone(&self.config))),
            log_queries: self.config.log_queries,
            finished: false,
        }
    }

    /// Open a transaction already holding `BEGIN` and the marker for `context`,
    /// or `None` when `sql` should simply run as-is.
    async fn prepare_single(
        &self,
        cx: &Cx,
        context: &Context,
        sql: &str,
    ) -> Outcome<Option<ContextTransaction<'_, C>>, Error> {
        if !is_write(sql) || !self.config.includes_write(sql) {
            return Outcome::Ok(None);
        }
        let marker = match self
            .codec
            .encode_bounded(context, None, self.config.max_context_size)
        {
            Ok(marker) => marker,
            Err(e) => {
                tracing::debug!(error = %e, "Sending write without context");
                return Outcome::Ok(None);
            }
        };

        let tx = self.transaction();
        try_outcome!(tx.execute(cx, "BEGIN", &[]).await);
        try_outcome!(tx.execute(cx, &marker, &[]).await);
        Outcome::Ok(Some(tx))
    }

    /// A marker submitted outside a transaction has nothing to attach to.
    fn absorb_marker(&self, sql: &str) -> Option<Result<()>> {
        if !is_context_marker(sql, self.codec.affix()) {
            return None;
        }
        Some(self.codec.decode(sql).map(|context| {
            tracing::debug!(
                keys = context.len(),
                "Dropping context marker sent outside a transaction"
            );
        }))
    }

    fn log_sent(&self, sql: &str) {
        if self.config.log_queries {
            tracing::info!(sql, "Sending statement");
        }
    }
}

impl<C: Connection> Connection for ContextConnection<C> {
    async fn query(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        if let Some(absorbed) = self.absorb_marker(sql) {
            return from_result(absorbed).map(|()| Vec::new());
        }
        match store::current() {
            Some(context) => self.query_with_context(cx, &context, sql, params).await,
            None => {
                self.log_sent(sql);
                self.inner.query(cx, sql, params).await
            }
        }
    }

    async fn query_one(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Option<Row>, Error> {
        if let Some(absorbed) = self.absorb_marker(sql) {
            return from_result(absorbed).map(|()| None);
        }
        match store::current() {
            Some(context) => self.query_one_with_context(cx, &context, sql, params).await,
            None => {
                self.log_sent(sql);
                self.inner.query_one(cx, sql, params).await
            }
        }
    }

    async fn execute(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<u64, Error> {
        if let Some(absorbed) = self.absorb_marker(sql) {
            return from_result(absorbed).map(|()| 0);
        }
        match store::current() {
            Some(context) => self.execute_with_context(cx, &context, sql, params).await,
            None => {
                self.log_sent(sql);
                self.inner.execute(cx, sql, params).await
            }
        }
    }

    async fn ping(&self, cx: &Cx) -> Outcome<(), Error> {
        self.inner.ping(cx).await
    }

    async fn close(self, cx: &Cx) -> Result<()> {
        self.inner.close(cx).await
    }
}

/// A transaction whose statements are compacted before they reach the
/// connection.
///
/// Must be finished with [`commit`](TransactionOps::commit) or
/// [`rollback`](TransactionOps::rollback). Dropping it after a `BEGIN` was
/// sent leaves the transaction open on the connection.
#[derive(Debug)]
pub struct ContextTransaction<'conn, C> {
    conn: &'conn C,
    session: Mutex<TransactionSession>,
    log_queries: bool,
    finished: bool,
}

impl<C: Connection> ContextTransaction<'_, C> {
    /// Plan `statement`, send any replays, and return what to send for it.
    async fn submit(&self, cx: &Cx, statement: Statement) -> Outcome<Option<Statement>, Error> {
        let plan = {
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            match session.plan(statement) {
                Ok(plan) => plan,
                Err(e) => return Outcome::Err(e),
            }
        };

        for replay in &plan.replay {
            self.log_sent(replay);
            try_outcome!(self.conn.execute(cx, replay.sql(), replay.params()).await);
        }
        if let Some(forward) = &plan.forward {
            self.log_sent(forward);
        }
        Outcome::Ok(plan.forward)
    }

    async fn control(&self, cx: &Cx, sql: String) -> Outcome<(), Error> {
        match try_outcome!(self.submit(cx, Statement::raw(sql)).await) {
            Some(stmt) => self.conn.execute(cx, stmt.sql(), stmt.params()).await.map(|_| ()),
            None => Outcome::Ok(()),
        }
    }

    fn log_sent(&self, statement: &Statement) {
        if self.log_queries {
            tracing::info!(
                sql = statement.sql(),
                params = statement.params().len(),
                "Sending statement"
            );
        }
    }

    fn is_compacted(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_compacted()
    }
}

impl<C: Connection> TransactionOps for ContextTransaction<'_, C> {
    async fn query(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        match try_outcome!(self.submit(cx, Statement::new(sql, params.to_vec())).await) {
            Some(stmt) => self.conn.query(cx, stmt.sql(), stmt.params()).await,
            None => Outcome::Ok(Vec::new()),
        }
    }

    async fn query_one(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Option<Row>, Error> {
        match try_outcome!(self.submit(cx, Statement::new(sql, params.to_vec())).await) {
            Some(stmt) => self.conn.query_one(cx, stmt.sql(), stmt.params()).await,
            None => Outcome::Ok(None),
        }
    }

    async fn execute(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<u64, Error> {
        match try_outcome!(self.submit(cx, Statement::new(sql, params.to_vec())).await) {
            Some(stmt) => self.conn.execute(cx, stmt.sql(), stmt.params()).await,
            None => Outcome::Ok(0),
        }
    }

    async fn savepoint(&self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.control(cx, format!("SAVEPOINT {name}")).await
    }

    async fn rollback_to(&self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.control(cx, format!("ROLLBACK TO SAVEPOINT {name}")).await
    }

    async fn release(&self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.control(cx, format!("RELEASE SAVEPOINT {name}")).await
    }

    async fn commit(mut self, cx: &Cx) -> Outcome<(), Error> {
        self.finished = true;
        self.control(cx, "COMMIT".to_string()).await
    }

    async fn rollback(mut self, cx: &Cx) -> Outcome<(), Error> {
        self.finished = true;
        if self.is_compacted() {
            tracing::warn!("Rolling back a compacted transaction; its write is already committed");
        }
        self.control(cx, "ROLLBACK".to_string()).await
    }
}

impl<C> Drop for ContextTransaction<'_, C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        if session.transaction_opened() {
            tracing::warn!("Transaction dropped without COMMIT or ROLLBACK");
        }
    }
}
