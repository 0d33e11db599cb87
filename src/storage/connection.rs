use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ConnectionPool, Session, Statement, StatementResult};
use crate::error::{Error, ErrorKind, Result};
use crate::update::{Batch, BatchError, BatchResult, OperationOutcome};

/// Lifecycle of a [`RelationalConnection`].
///
/// `Idle -> Open -> {InTransaction -> Committed | RolledBack} -> Closed`.
/// `Committed` behaves like `Open`; `RolledBack` only allows `close`,
/// `reset` and `reconnect`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Open,
    InTransaction,
    Committed,
    RolledBack,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Open => "open",
            ConnectionState::InTransaction => "in-transaction",
            ConnectionState::Committed => "committed",
            ConnectionState::RolledBack => "rolled-back",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// How long `open` waits for the pool
    pub checkout_timeout: Duration,
    /// Server-side limit for every statement
    pub command_timeout: Option<Duration>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            checkout_timeout: Duration::from_secs(15),
            command_timeout: None,
        }
    }
}

/// Connection handle over a pooled [`Session`]. Not for concurrent use;
/// parallel work takes separate handles.
pub struct RelationalConnection {
    pool: Arc<dyn ConnectionPool>,
    session: Option<Box<dyn Session>>,
    state: ConnectionState,
    settings: ConnectionSettings,
}

impl RelationalConnection {
    pub fn new(pool: Arc<dyn ConnectionPool>, settings: ConnectionSettings) -> Self {
        Self {
            pool,
            session: None,
            state: ConnectionState::Idle,
            settings,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    /// Check a session out of the pool. No-op when one is already held.
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => Err(Error::ConnectionClosed),
            ConnectionState::Idle => {
                let session = self.pool.checkout(self.settings.checkout_timeout)?;
                self.session = Some(session);
                self.transition(ConnectionState::Open);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        self.ensure_ready()?;
        if self.state == ConnectionState::InTransaction {
            return Err(Error::InvalidState("a transaction is already active".into()));
        }
        self.control("BEGIN")?;
        self.transition(ConnectionState::InTransaction);
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.require_transaction()?;
        self.control("COMMIT")?;
        self.transition(ConnectionState::Committed);
        Ok(())
    }

    /// Roll back the active transaction. Later `execute` calls fail with
    /// `TransactionAborted` until `reset` or `reconnect`.
    pub fn rollback(&mut self) -> Result<()> {
        self.require_transaction()?;
        self.abort_transaction();
        Ok(())
    }

    /// Acknowledge a rollback and make the handle usable again.
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => Err(Error::ConnectionClosed),
            ConnectionState::RolledBack => {
                let next = if self.session.is_some() {
                    ConnectionState::Open
                } else {
                    ConnectionState::Idle
                };
                self.transition(next);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Drop the current session and check out a fresh one.
    pub fn reconnect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        if self.state == ConnectionState::InTransaction {
            self.abort_transaction();
        }
        if let Some(session) = self.session.take() {
            debug!("discarding session for reconnect");
            self.pool.discard(session);
        }
        self.transition(ConnectionState::Idle);
        self.open()
    }

    /// Return the session to the pool. The handle cannot be used again.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        self.release();
        Ok(())
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub fn with_transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => match self.state {
                ConnectionState::InTransaction => {
                    self.commit()?;
                    Ok(value)
                }
                ConnectionState::RolledBack => Err(Error::TransactionAborted.into()),
                _ => Ok(value),
            },
            Err(e) => {
                if self.state == ConnectionState::InTransaction {
                    self.abort_transaction();
                }
                Err(e)
            }
        }
    }

    /// Run every statement of `batch` in order. Stops at the first failure;
    /// operations after it are reported as not attempted.
    pub fn execute(&mut self, batch: &Batch) -> std::result::Result<BatchResult, BatchError> {
        self.run_batch(batch, None)
    }

    /// Like [`RelationalConnection::execute`], aborting at `deadline`.
    pub fn execute_with_deadline(
        &mut self,
        batch: &Batch,
        deadline: Instant,
    ) -> std::result::Result<BatchResult, BatchError> {
        self.run_batch(batch, Some(deadline))
    }

    pub(crate) fn run_batch(
        &mut self,
        batch: &Batch,
        deadline: Option<Instant>,
    ) -> std::result::Result<BatchResult, BatchError> {
        let mut outcomes = vec![OperationOutcome::NotAttempted; batch.operation_count()];
        let mut committed = false;
        for stmt in batch.statements() {
            let autocommit = self.state != ConnectionState::InTransaction;
            match self.execute_statement(&stmt.statement, deadline) {
                Ok(result) => {
                    for (slot, outcome) in outcomes[stmt.operations.clone()]
                        .iter_mut()
                        .zip(stmt.attribute(result))
                    {
                        *slot = outcome;
                    }
                    committed |= autocommit;
                }
                Err(source) => {
                    let kind = source.kind();
                    for slot in &mut outcomes[stmt.operations.clone()] {
                        *slot = OperationOutcome::Failed(kind);
                    }
                    return Err(BatchError {
                        failed_index: stmt.operations.start,
                        kind,
                        source,
                        outcomes,
                        partially_committed: committed,
                        rolled_back: self.state == ConnectionState::RolledBack,
                    });
                }
            }
        }
        Ok(BatchResult {
            outcomes,
            round_trips: batch.round_trips(),
        })
    }

    /// Run one statement, applying the command timeout and `deadline`.
    pub fn execute_statement(
        &mut self,
        statement: &Statement,
        deadline: Option<Instant>,
    ) -> Result<StatementResult> {
        self.ensure_ready()?;
        let result = match self.timeout_for(deadline) {
            Some(timeout) if timeout.is_zero() => Err(Error::Timeout(
                "deadline elapsed before the statement was sent".into(),
            )),
            timeout => {
                debug!("executing: {}", statement.sql);
                self.session_mut()?.execute(statement, timeout)
            }
        };
        if let Err(e) = &result {
            self.on_failure(e);
        }
        result
    }

    fn timeout_for(&self, deadline: Option<Instant>) -> Option<Duration> {
        let until_deadline = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        match (self.settings.command_timeout, until_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn ensure_ready(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => Err(Error::ConnectionClosed),
            ConnectionState::RolledBack => Err(Error::TransactionAborted),
            ConnectionState::Idle => self.open(),
            _ => Ok(()),
        }
    }

    fn require_transaction(&self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => Err(Error::ConnectionClosed),
            ConnectionState::InTransaction => Ok(()),
            other => Err(Error::InvalidState(format!("no active transaction ({other})"))),
        }
    }

    fn session_mut(&mut self) -> Result<&mut Box<dyn Session>> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no session checked out".into()))
    }

    /// Transaction control statement with failure bookkeeping.
    fn control(&mut self, sql: &str) -> Result<()> {
        debug!("{}", sql);
        let result = self.session_mut()?.batch_execute(sql);
        if let Err(e) = &result {
            self.on_failure(e);
        }
        result
    }

    fn on_failure(&mut self, err: &Error) {
        if err.kind() == ErrorKind::ConnectionLost {
            warn!("session lost: {}", err);
            self.discard_session();
            // the server discards an open transaction with the session
            let next = if self.state == ConnectionState::InTransaction {
                ConnectionState::RolledBack
            } else {
                ConnectionState::Idle
            };
            self.transition(next);
        } else if self.state == ConnectionState::InTransaction {
            self.abort_transaction();
        }
    }

    fn abort_transaction(&mut self) {
        if let Some(session) = self.session.as_mut() {
            debug!("ROLLBACK");
            if let Err(e) = session.batch_execute("ROLLBACK") {
                warn!("rollback failed: {}", e);
                if e.kind() == ErrorKind::ConnectionLost {
                    self.discard_session();
                }
            }
        }
        self.transition(ConnectionState::RolledBack);
    }

    fn discard_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.discard(session);
        }
    }

    fn release(&mut self) {
        if self.state == ConnectionState::InTransaction {
            self.abort_transaction();
        }
        if let Some(session) = self.session.take() {
            self.pool.checkin(session);
        }
        self.transition(ConnectionState::Closed);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!("connection {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

impl Drop for RelationalConnection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Closed {
            self.release();
        }
    }
}
