//! Typed SQL command and value-mapping core of a PostgreSQL provider.
//!
//! [`ProviderServices`] wires a [`TypeMapper`], a [`SqlGenerationHelper`],
//! [`CommandBatchBuilder`]s and [`RelationalConnection`]s for one
//! [`provider::Provider`].

pub mod config;
pub mod dialect;
pub mod error;
pub mod provider;
pub mod sql;
pub mod storage;
pub mod test_support;
pub mod types;
pub mod update;

pub use dialect::{Dialect, PlaceholderStyle};
pub use error::{Error, ErrorKind, Result};
pub use provider::{get_default_provider_registry, ProviderRegistry, ProviderServices};
pub use sql::SqlGenerationHelper;
pub use storage::{ConnectionState, RelationalConnection};
pub use types::{ColumnType, TypeMapper, TypedValue, Value};
pub use update::{
    BatchError, BatchExecutor, BatchResult, CommandBatchBuilder, CommandOperation,
    OperationOutcome,
};
