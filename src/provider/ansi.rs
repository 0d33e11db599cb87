use crate::dialect::Dialect;
use crate::error::Result;
use crate::provider::Provider;
use crate::types::{ColumnType, NativeType, TypeMapper, TypeMapping};

/// Driverless provider rendering portable SQL: `?` parameters and one row
/// per statement. Used to preview batches for databases without
/// multi-row support.
pub struct AnsiProvider;

impl AnsiProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AnsiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for AnsiProvider {
    fn name(&self) -> &str {
        "ansi"
    }

    fn dialect(&self) -> Dialect {
        Dialect::ansi()
    }

    fn register_type_mappings(&self, mapper: &mut TypeMapper) -> Result<()> {
        mapper.register(TypeMapping::new(ColumnType::Integer, NativeType::I64, "bigint"))?;
        mapper.register(TypeMapping::new(ColumnType::Text, NativeType::String, "varchar"))?;
        mapper.register(TypeMapping::new(ColumnType::Boolean, NativeType::Bool, "boolean"))?;
        mapper.register(TypeMapping::new(
            ColumnType::Timestamp,
            NativeType::DateTime,
            "timestamp",
        ))?;
        mapper.register(TypeMapping::new(ColumnType::Binary, NativeType::Bytes, "blob"))?;
        mapper.add_alias("integer", ColumnType::Integer)?;
        mapper.add_alias("character varying", ColumnType::Text)?;
        Ok(())
    }
}
