//! Driver-facing seams and the connection lifecycle.
//!
//! A [`Session`] is one physical database session; a [`ConnectionPool`]
//! hands sessions out and takes them back. [`RelationalConnection`] owns at
//! most one session at a time and drives transactions over it.

pub mod connection;
pub mod pool;
#[cfg(feature = "postgres-backend")]
pub mod postgres;

use std::time::Duration;

use crate::error::Result;
use crate::types::{ColumnType, TypedValue, Value};

pub use connection::{ConnectionSettings, ConnectionState, RelationalConnection};
pub use pool::{Connector, SessionPool};

/// A single SQL statement with its bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<TypedValue>,
    /// Column types of the rows the statement returns, in order
    pub returning: Vec<ColumnType>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            returning: Vec::new(),
        }
    }
}

/// What the server answered for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    pub rows_affected: u64,
    pub rows: Vec<Vec<Value>>,
}

impl StatementResult {
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows_affected: rows.len() as u64,
            rows,
        }
    }
}

/// One physical database session, driven by the network driver.
pub trait Session: Send {
    /// Run `statement`; the server aborts it once `timeout` elapses.
    fn execute(&mut self, statement: &Statement, timeout: Option<Duration>) -> Result<StatementResult>;

    /// Run parameterless control SQL (`BEGIN`, `COMMIT`, ...).
    fn batch_execute(&mut self, sql: &str) -> Result<()>;

    /// Whether the underlying socket is known to be dead.
    fn is_closed(&self) -> bool;

    /// Mark the session as unfit for reuse. Pooled sessions are closed
    /// instead of returned once they are dropped.
    fn retire(&mut self) {}
}

/// Shared source of sessions.
pub trait ConnectionPool: Send + Sync {
    fn checkout(&self, timeout: Duration) -> Result<Box<dyn Session>>;

    fn checkin(&self, session: Box<dyn Session>) {
        drop(session);
    }

    /// Give back a session that must not be reused.
    fn discard(&self, mut session: Box<dyn Session>) {
        session.retire();
    }
}
