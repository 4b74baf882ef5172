//! Recording connection shared by the integration tests.

#![allow(dead_code)]

use asupersync::{Cx, Outcome};
use sqltrail::{Connection, ConnectionError, Error, QueryError, QueryErrorKind, Result, Row, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};

pub const CONTEXT: &str =
    r#"/*Bemi {"apiEndpoint":"/todo/complete","userID":1,"queryParams":{"id":37}} Bemi*/"#;
pub const SELECT: &str = r#"SELECT "Todo"."Todo"."id", "Todo"."Todo"."task", "Todo"."Todo"."isCompleted" FROM "Todo"."Todo" WHERE ("Todo"."Todo"."id" = $1 AND 1=1) LIMIT $2 OFFSET $3"#;
pub const UPDATE: &str = r#"UPDATE "Todo"."Todo" SET "isCompleted" = $1 WHERE ("Todo"."Todo"."id" = $2 AND 1=1) RETURNING "Todo"."Todo"."id", "Todo"."Todo"."task", "Todo"."Todo"."isCompleted""#;
pub const DELETE: &str = r#"DELETE FROM "Todo"."Todo" WHERE ("Todo"."Todo"."id" = $1 AND 1=1)"#;

/// One statement as the database received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub conn: &'static str,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct Wire {
    pub sent: Vec<Sent>,
    pub fail_on: Option<String>,
    /// Every call fails as if the socket had been closed.
    pub disconnected: bool,
}

pub type SharedWire = Arc<Mutex<Wire>>;

pub fn wire() -> SharedWire {
    Arc::new(Mutex::new(Wire::default()))
}

pub fn sent_sql(wire: &SharedWire) -> Vec<String> {
    wire.lock()
        .expect("lock poisoned")
        .sent
        .iter()
        .map(|s| s.sql.clone())
        .collect()
}

/// A connection that records every statement and yields once per call so
/// that concurrent callers interleave.
#[derive(Debug, Clone)]
pub struct RecordingConnection {
    name: &'static str,
    wire: SharedWire,
}

impl RecordingConnection {
    pub fn new(name: &'static str, wire: SharedWire) -> Self {
        Self { name, wire }
    }

    fn record(&self, sql: &str, params: &[Value]) -> impl Future<Output = Outcome<(), Error>> + Send {
        let wire = Arc::clone(&self.wire);
        let sent = Sent {
            conn: self.name,
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        async move {
            YieldOnce::default().await;
            let mut guard = wire.lock().expect("lock poisoned");
            if guard.disconnected {
                return Outcome::Err(Error::Connection(ConnectionError::new(
                    "server closed the connection unexpectedly",
                )));
            }
            let failing = guard
                .fail_on
                .as_deref()
                .is_some_and(|needle| sent.sql.contains(needle));
            let sql = sent.sql.clone();
            guard.sent.push(sent);
            if failing {
                let mut err = QueryError::new(
                    QueryErrorKind::Constraint,
                    "duplicate key value violates unique constraint \"Todo_pkey\"",
                );
                err.sqlstate = Some("23505".to_string());
                err.detail = Some("Key (id)=(37) already exists.".to_string());
                err.sql = Some(sql);
                return Outcome::Err(Error::Query(err));
            }
            Outcome::Ok(())
        }
    }
}

impl Connection for RecordingConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let fut = self.record(sql, params);
        async move {
            fut.await.map(|()| {
                vec![Row::new(
                    vec!["id".into(), "task".into()],
                    vec![Value::BigInt(37), Value::Text("Write tests".into())],
                )]
            })
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let fut = self.record(sql, params);
        async move { fut.await.map(|()| 1) }
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let disconnected = self.wire.lock().expect("lock poisoned").disconnected;
        async move {
            if disconnected {
                Outcome::Err(Error::Connection(ConnectionError::new("no connection")))
            } else {
                Outcome::Ok(())
            }
        }
    }

    async fn close(self, _cx: &Cx) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct YieldOnce {
    yielded: bool,
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// `sql` with `marker` appended the way merged writes are sent.
pub fn merged(sql: &str, marker: &str) -> String {
    format!("{sql} {marker}")
}
