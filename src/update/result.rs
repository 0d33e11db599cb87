use std::fmt;
use thiserror::Error;

use crate::error::{Error, ErrorKind};
use crate::types::TypedValue;

/// What happened to one operation of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Succeeded {
        rows_affected: u64,
        /// Store-generated values read back, by column
        generated: Vec<(String, TypedValue)>,
    },
    Failed(ErrorKind),
    NotAttempted,
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Succeeded { .. })
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            OperationOutcome::Succeeded { rows_affected, .. } => Some(*rows_affected),
            _ => None,
        }
    }
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationOutcome::Succeeded {
                rows_affected,
                generated,
            } => {
                write!(f, "ok ({rows_affected} row(s))")?;
                for (column, value) in generated {
                    write!(f, " {column}={value}")?;
                }
                Ok(())
            }
            OperationOutcome::Failed(kind) => write!(f, "failed: {kind}"),
            OperationOutcome::NotAttempted => write!(f, "not attempted"),
        }
    }
}

/// Outcome of a fully executed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub outcomes: Vec<OperationOutcome>,
    pub round_trips: usize,
}

/// A batch stopped at `failed_index`; later operations are `NotAttempted`.
#[derive(Error, Debug)]
#[error("operation {failed_index} failed ({kind}): {source}")]
pub struct BatchError {
    pub failed_index: usize,
    pub kind: ErrorKind,
    #[source]
    pub source: Error,
    pub outcomes: Vec<OperationOutcome>,
    /// Some statement committed outside a transaction before the failure
    pub partially_committed: bool,
    /// The transaction the batch ran in was rolled back
    pub rolled_back: bool,
}

impl BatchError {
    /// Failure before any statement reached the server.
    pub(crate) fn before_start(operation_count: usize, source: Error) -> Self {
        let kind = source.kind();
        let mut outcomes = vec![OperationOutcome::NotAttempted; operation_count];
        if let Some(first) = outcomes.first_mut() {
            *first = OperationOutcome::Failed(kind);
        }
        Self {
            failed_index: 0,
            kind,
            source,
            outcomes,
            partially_committed: false,
            rolled_back: false,
        }
    }

    /// Every statement ran but the enclosing transaction did not commit.
    pub(crate) fn at_commit(operation_count: usize, source: Error, rolled_back: bool) -> Self {
        let kind = source.kind();
        Self {
            failed_index: 0,
            kind,
            // a lost COMMIT may or may not have been applied
            partially_committed: kind == ErrorKind::ConnectionLost,
            source,
            outcomes: vec![OperationOutcome::Failed(kind); operation_count],
            rolled_back,
        }
    }
}
