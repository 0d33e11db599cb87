use log::{info, warn};
use std::time::Instant;

use super::batch::Batch;
use super::result::{BatchError, BatchResult};
use crate::error::ErrorKind;
use crate::storage::RelationalConnection;

/// Runs batches on a connection and owns the retry policy.
///
/// A batch of more than one statement runs in its own transaction unless
/// the caller already opened one. A lost connection is retried once on a
/// fresh session when nothing of the batch can have committed.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    retry_connection_lost: bool,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self {
            retry_connection_lost: true,
        }
    }
}

impl BatchExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_retry() -> Self {
        Self {
            retry_connection_lost: false,
        }
    }

    pub fn execute(
        &self,
        conn: &mut RelationalConnection,
        batch: &Batch,
    ) -> Result<BatchResult, BatchError> {
        self.execute_inner(conn, batch, None)
    }

    /// Like [`BatchExecutor::execute`]; statements still running at
    /// `deadline` are aborted with `Timeout`.
    pub fn execute_with_deadline(
        &self,
        conn: &mut RelationalConnection,
        batch: &Batch,
        deadline: Instant,
    ) -> Result<BatchResult, BatchError> {
        self.execute_inner(conn, batch, Some(deadline))
    }

    fn execute_inner(
        &self,
        conn: &mut RelationalConnection,
        batch: &Batch,
        deadline: Option<Instant>,
    ) -> Result<BatchResult, BatchError> {
        if batch.is_empty() {
            return Ok(BatchResult {
                outcomes: Vec::new(),
                round_trips: 0,
            });
        }
        let caller_transaction = conn.in_transaction();
        match self.run_once(conn, batch, deadline, caller_transaction) {
            Err(err)
                if self.retry_connection_lost
                    && err.kind == ErrorKind::ConnectionLost
                    && !err.partially_committed
                    && !caller_transaction =>
            {
                info!(
                    "connection lost at operation {}; retrying batch on a fresh session",
                    err.failed_index
                );
                if let Err(e) = conn.reconnect() {
                    warn!("reconnect failed: {}", e);
                    return Err(BatchError::before_start(batch.operation_count(), e));
                }
                self.run_once(conn, batch, deadline, caller_transaction)
            }
            other => other,
        }
    }

    fn run_once(
        &self,
        conn: &mut RelationalConnection,
        batch: &Batch,
        deadline: Option<Instant>,
        caller_transaction: bool,
    ) -> Result<BatchResult, BatchError> {
        let own_transaction = !caller_transaction && batch.round_trips() > 1;
        if own_transaction {
            conn.begin_transaction()
                .map_err(|e| BatchError::before_start(batch.operation_count(), e))?;
        }
        let result = conn.run_batch(batch, deadline);
        if !own_transaction {
            return result;
        }
        match result {
            Ok(result) => match conn.commit() {
                Ok(()) => Ok(result),
                Err(e) => {
                    reset_after_own_transaction(conn);
                    Err(BatchError::at_commit(batch.operation_count(), e, true))
                }
            },
            Err(err) => {
                // the handle was rolled back on failure; the caller never asked
                // for a transaction, so make it usable again
                reset_after_own_transaction(conn);
                Err(err)
            }
        }
    }
}

fn reset_after_own_transaction(conn: &mut RelationalConnection) {
    if let Err(e) = conn.reset() {
        warn!("could not reset connection after failed batch: {}", e);
    }
}
