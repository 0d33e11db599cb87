use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::types::{ColumnType, TypeMapper, TypedValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

/// One row-level mutation handed over by the update pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOperation {
    pub kind: OperationKind,
    pub schema: Option<String>,
    pub table: String,
    /// Columns written by INSERT or UPDATE, in order
    pub values: Vec<(String, TypedValue)>,
    /// Predicate identifying the target row of UPDATE or DELETE
    pub keys: Vec<(String, TypedValue)>,
    /// Store-generated columns to read back after INSERT
    pub returning: Vec<(String, ColumnType)>,
}

impl CommandOperation {
    fn new(kind: OperationKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            schema: None,
            table: table.into(),
            values: Vec::new(),
            keys: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn insert(table: impl Into<String>) -> Self {
        Self::new(OperationKind::Insert, table)
    }

    pub fn update(table: impl Into<String>) -> Self {
        Self::new(OperationKind::Update, table)
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, table)
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn value(mut self, column: impl Into<String>, value: TypedValue) -> Self {
        self.values.push((column.into(), value));
        self
    }

    pub fn key(mut self, column: impl Into<String>, value: TypedValue) -> Self {
        self.keys.push((column.into(), value));
        self
    }

    pub fn returning(mut self, column: impl Into<String>, column_type: ColumnType) -> Self {
        self.returning.push((column.into(), column_type));
        self
    }

    /// Check that the operation carries what its kind needs.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidOperation {
            table: self.table.clone(),
            reason: reason.to_string(),
        };
        match self.kind {
            OperationKind::Insert => {
                if !self.keys.is_empty() {
                    return Err(invalid("insert does not take a key predicate"));
                }
            }
            OperationKind::Update => {
                if self.values.is_empty() {
                    return Err(invalid("update needs at least one column to set"));
                }
                if self.keys.is_empty() {
                    return Err(invalid("update needs a key predicate"));
                }
            }
            OperationKind::Delete => {
                if self.keys.is_empty() {
                    return Err(invalid("delete needs a key predicate"));
                }
                if !self.values.is_empty() {
                    return Err(invalid("delete does not take column values"));
                }
            }
        }
        if self.kind != OperationKind::Insert && !self.returning.is_empty() {
            return Err(invalid("only insert reads back generated columns"));
        }
        Ok(())
    }

    pub(crate) fn has_null_key(&self) -> bool {
        self.keys.iter().any(|(_, v)| v.value().is_null())
    }

    pub(crate) fn parameter_count(&self) -> usize {
        self.values.len() + self.keys.iter().filter(|(_, v)| !v.value().is_null()).count()
    }
}

/// Column value as written in an operations file: the value is column text
/// decoded through the [`TypeMapper`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub column: String,
    pub r#type: ColumnType,
    /// Literal or server text; omitted means NULL
    #[serde(default)]
    pub value: Option<String>,
}

/// Serialised form of a [`CommandOperation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    pub kind: OperationKind,
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
    #[serde(default)]
    pub values: Vec<ColumnSpec>,
    #[serde(default)]
    pub keys: Vec<ColumnSpec>,
    #[serde(default)]
    pub returning: Vec<ColumnSpec>,
}

impl OperationSpec {
    pub fn into_operation(self, mapper: &TypeMapper) -> Result<CommandOperation> {
        let decode = |c: ColumnSpec| -> Result<(String, TypedValue)> {
            let value = match &c.value {
                Some(text) => TypedValue::new(c.r#type, mapper.parse(c.r#type, text)?)?,
                None => TypedValue::null(c.r#type),
            };
            Ok((c.column, value))
        };
        let op = CommandOperation {
            kind: self.kind,
            schema: self.schema,
            table: self.table,
            values: self.values.into_iter().map(&decode).collect::<Result<_>>()?,
            keys: self.keys.into_iter().map(&decode).collect::<Result<_>>()?,
            returning: self
                .returning
                .into_iter()
                .map(|c| (c.column, c.r#type))
                .collect(),
        };
        op.validate()?;
        Ok(op)
    }
}

/// Parse a JSON array of operations.
pub fn operations_from_json(json: &str, mapper: &TypeMapper) -> Result<Vec<CommandOperation>> {
    let specs: Vec<OperationSpec> =
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid operations file: {e}")))?;
    specs.into_iter().map(|s| s.into_operation(mapper)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{NativeType, TypeMapping, Value};

    fn mapper() -> TypeMapper {
        let mut m = TypeMapper::new();
        m.register(TypeMapping::new(ColumnType::Integer, NativeType::I64, "bigint")).unwrap();
        m.register(TypeMapping::new(ColumnType::Text, NativeType::String, "text")).unwrap();
        m
    }

    #[test]
    fn validate_requires_keys_for_update_and_delete() {
        let err = CommandOperation::update("users")
            .value("name", TypedValue::text("x"))
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(CommandOperation::delete("users").validate().is_err());
        assert!(CommandOperation::insert("users").validate().is_ok());
        assert!(CommandOperation::delete("users")
            .key("id", TypedValue::integer(1))
            .returning("id", ColumnType::Integer)
            .validate()
            .is_err());
    }

    #[test]
    fn parses_operations_json() {
        let json = r#"[
            {"kind": "insert", "table": "users",
             "values": [{"column": "name", "type": "text", "value": "'O''Brien'"},
                        {"column": "nick", "type": "text"}],
             "returning": [{"column": "id", "type": "integer"}]},
            {"kind": "delete", "schema": "app", "table": "users",
             "keys": [{"column": "id", "type": "integer", "value": "7"}]}
        ]"#;
        let ops = operations_from_json(json, &mapper()).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].values[0].1.value(), &Value::Text("O'Brien".into()));
        assert!(ops[0].values[1].1.value().is_null());
        assert_eq!(ops[0].returning, vec![("id".to_string(), ColumnType::Integer)]);
        assert_eq!(ops[1].schema.as_deref(), Some("app"));
        assert_eq!(ops[1].keys[0].1, TypedValue::integer(7));
    }

    #[test]
    fn json_value_must_decode() {
        let json = r#"[{"kind": "delete", "table": "t",
                        "keys": [{"column": "id", "type": "integer", "value": "seven"}]}]"#;
        let err = operations_from_json(json, &mapper()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }
}
