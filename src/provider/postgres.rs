use crate::dialect::Dialect;
use crate::error::Result;
use crate::provider::Provider;
use crate::storage::Connector;
use crate::types::{ColumnType, NativeType, TypeMapper, TypeMapping};

/// Store-type spellings PostgreSQL accepts for each column type.
const ALIASES: &[(&str, ColumnType)] = &[
    ("int8", ColumnType::Integer),
    ("integer", ColumnType::Integer),
    ("int4", ColumnType::Integer),
    ("int", ColumnType::Integer),
    ("smallint", ColumnType::Integer),
    ("int2", ColumnType::Integer),
    ("serial", ColumnType::Integer),
    ("bigserial", ColumnType::Integer),
    ("varchar", ColumnType::Text),
    ("character varying", ColumnType::Text),
    ("char", ColumnType::Text),
    ("character", ColumnType::Text),
    ("citext", ColumnType::Text),
    ("name", ColumnType::Text),
    ("bool", ColumnType::Boolean),
    ("timestamp without time zone", ColumnType::Timestamp),
];

/// PostgreSQL database provider.
pub struct PostgresProvider;

impl PostgresProvider {
    /// Create a new PostgreSQL provider instance.
    pub fn new() -> Self {
        Self
    }
}

impl Default for PostgresProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for PostgresProvider {
    fn name(&self) -> &str {
        "postgres"
    }

    fn dialect(&self) -> Dialect {
        Dialect::postgres()
    }

    fn register_type_mappings(&self, mapper: &mut TypeMapper) -> Result<()> {
        mapper.register(TypeMapping::new(ColumnType::Integer, NativeType::I64, "bigint"))?;
        mapper.register(TypeMapping::new(ColumnType::Text, NativeType::String, "text"))?;
        mapper.register(TypeMapping::new(ColumnType::Boolean, NativeType::Bool, "boolean"))?;
        mapper.register(TypeMapping::new(
            ColumnType::Timestamp,
            NativeType::DateTime,
            "timestamp",
        ))?;
        mapper.register(TypeMapping::new(ColumnType::Binary, NativeType::Bytes, "bytea"))?;
        for (alias, column_type) in ALIASES {
            mapper.add_alias(alias, *column_type)?;
        }
        Ok(())
    }

    #[cfg(feature = "postgres-backend")]
    fn connector(&self, dsn: &str) -> Result<Box<dyn Connector>> {
        Ok(Box::new(crate::storage::postgres::PgConnector::new(dsn)))
    }

    #[cfg(not(feature = "postgres-backend"))]
    fn connector(&self, _dsn: &str) -> Result<Box<dyn Connector>> {
        Err(crate::error::Error::Config(
            "built without the postgres-backend feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn mapper() -> TypeMapper {
        let mut mapper = TypeMapper::new();
        PostgresProvider::new().register_type_mappings(&mut mapper).unwrap();
        mapper
    }

    #[test]
    fn canonical_store_types() {
        let mapper = mapper();
        let names: Vec<(ColumnType, &str)> = ColumnType::ALL
            .iter()
            .map(|t| (*t, mapper.find_mapping(*t).unwrap().store_type.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                (ColumnType::Integer, "bigint"),
                (ColumnType::Text, "text"),
                (ColumnType::Boolean, "boolean"),
                (ColumnType::Timestamp, "timestamp"),
                (ColumnType::Binary, "bytea"),
            ]
        );
    }

    #[test]
    fn aliases_resolve_to_canonical_mappings() {
        let mapper = mapper();
        assert_eq!(
            mapper.find_by_store_type("INT4").map(|m| m.column_type),
            Some(ColumnType::Integer)
        );
        assert_eq!(
            mapper.find_by_store_type("character varying(40)").map(|m| m.column_type),
            Some(ColumnType::Text)
        );
        assert!(mapper.find_by_store_type("jsonb").is_none());
    }

    #[test]
    fn registering_twice_is_harmless() {
        let mut mapper = mapper();
        PostgresProvider::new().register_type_mappings(&mut mapper).unwrap();
        assert_eq!(mapper.render(ColumnType::Integer, &Value::Integer(42)).unwrap(), "42");
    }
}
