//! Write operations: description, batching, SQL generation and execution.

pub mod batch;
pub mod command;
pub mod executor;
pub mod result;
pub mod sql_generator;

pub use batch::{Attribution, Batch, BatchStatement, CommandBatchBuilder};
pub use command::{operations_from_json, CommandOperation, OperationKind, OperationSpec};
pub use executor::BatchExecutor;
pub use result::{BatchError, BatchResult, OperationOutcome};
pub use sql_generator::UpdateSqlGenerator;
