//! SQL text for single-row and multi-row modification statements.

use std::ops::Range;

use super::batch::{Attribution, BatchStatement};
use super::command::{CommandOperation, OperationKind};
use crate::error::{Error, Result};
use crate::sql::SqlGenerationHelper;
use crate::storage::Statement;
use crate::types::{TypedValue, Value};

const TARGET_ALIAS: &str = "t";
const VALUES_ALIAS: &str = "v";

/// Collects bind parameters and hands out their placeholders.
struct Params<'a> {
    helper: &'a SqlGenerationHelper,
    values: Vec<TypedValue>,
}

impl<'a> Params<'a> {
    fn new(helper: &'a SqlGenerationHelper) -> Self {
        Self {
            helper,
            values: Vec::new(),
        }
    }

    fn bind(&mut self, value: &TypedValue) -> String {
        self.values.push(value.clone());
        self.helper.parameter_placeholder(self.values.len())
    }

    /// Placeholder with an explicit cast, needed inside `VALUES` lists.
    fn bind_cast(&mut self, value: &TypedValue) -> Result<String> {
        let store_type = self
            .helper
            .type_mapper()
            .find_mapping(value.kind())
            .map(|m| m.store_type.clone())
            .ok_or_else(|| Error::type_mismatch(value.kind(), "no mapping registered"))?;
        Ok(format!("{}::{}", self.bind(value), store_type))
    }
}

#[derive(Debug, Clone)]
pub struct UpdateSqlGenerator {
    helper: SqlGenerationHelper,
}

impl UpdateSqlGenerator {
    pub fn new(helper: SqlGenerationHelper) -> Self {
        Self { helper }
    }

    pub fn helper(&self) -> &SqlGenerationHelper {
        &self.helper
    }

    /// One statement for the operation at `index`.
    pub fn single(&self, op: &CommandOperation, index: usize) -> Result<BatchStatement> {
        let table = self.helper.delimit(op.schema.as_deref(), &op.table)?;
        let mut params = Params::new(&self.helper);
        let mut sql = match op.kind {
            OperationKind::Insert => {
                let mut sql = format!("INSERT INTO {table}");
                if op.values.is_empty() {
                    sql.push_str(" DEFAULT VALUES");
                } else {
                    let columns = self.column_list(op.values.iter().map(|(c, _)| c.as_str()))?;
                    let placeholders = op
                        .values
                        .iter()
                        .map(|(_, v)| params.bind(v))
                        .collect::<Vec<_>>()
                        .join(", ");
                    sql.push_str(&format!(" ({columns}) VALUES ({placeholders})"));
                }
                sql
            }
            OperationKind::Update => {
                let mut assignments = Vec::with_capacity(op.values.len());
                for (column, value) in &op.values {
                    assignments.push(format!(
                        "{} = {}",
                        self.helper.quote_identifier(column)?,
                        params.bind(value)
                    ));
                }
                let predicate = self.key_predicate(&op.keys, &mut params)?;
                format!("UPDATE {table} SET {} WHERE {predicate}", assignments.join(", "))
            }
            OperationKind::Delete => {
                let predicate = self.key_predicate(&op.keys, &mut params)?;
                format!("DELETE FROM {table} WHERE {predicate}")
            }
        };
        if !op.returning.is_empty() {
            let columns = self.column_list(op.returning.iter().map(|(c, _)| c.as_str()))?;
            sql.push_str(&format!(" RETURNING {columns}"));
        }
        Ok(BatchStatement {
            statement: Statement {
                sql,
                params: params.values,
                returning: op.returning.iter().map(|(_, t)| *t).collect(),
            },
            operations: index..index + 1,
            attribution: Attribution::RowsAffected,
            generated_columns: op.returning.iter().map(|(c, _)| c.clone()).collect(),
        })
    }

    /// One statement for same-shaped operations starting at `start`.
    pub fn multi(&self, ops: &[CommandOperation], start: usize) -> Result<BatchStatement> {
        let first = match ops {
            [] => {
                return Err(Error::InvalidOperation {
                    table: String::new(),
                    reason: "empty operation group".into(),
                })
            }
            [only] => return self.single(only, start),
            [first, ..] => first,
        };
        let operations = start..start + ops.len();
        match first.kind {
            OperationKind::Insert => self.multi_insert(first, ops, operations),
            OperationKind::Update => self.multi_update(first, ops, operations),
            OperationKind::Delete => self.multi_delete(first, ops, operations),
        }
    }

    fn multi_insert(
        &self,
        first: &CommandOperation,
        ops: &[CommandOperation],
        operations: Range<usize>,
    ) -> Result<BatchStatement> {
        let table = self.helper.delimit(first.schema.as_deref(), &first.table)?;
        let columns = self.column_list(first.values.iter().map(|(c, _)| c.as_str()))?;
        let mut params = Params::new(&self.helper);
        let rows = ops
            .iter()
            .map(|op| {
                let row = op
                    .values
                    .iter()
                    .map(|(_, v)| params.bind(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({row})")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("INSERT INTO {table} ({columns}) VALUES {rows}");
        if !first.returning.is_empty() {
            let returning = self.column_list(first.returning.iter().map(|(c, _)| c.as_str()))?;
            sql.push_str(&format!(" RETURNING {returning}"));
        }
        Ok(BatchStatement {
            statement: Statement {
                sql,
                params: params.values,
                returning: first.returning.iter().map(|(_, t)| *t).collect(),
            },
            operations,
            attribution: Attribution::RowPosition,
            generated_columns: first.returning.iter().map(|(c, _)| c.clone()).collect(),
        })
    }

    fn multi_update(
        &self,
        first: &CommandOperation,
        ops: &[CommandOperation],
        operations: Range<usize>,
    ) -> Result<BatchStatement> {
        let table = self.helper.delimit(first.schema.as_deref(), &first.table)?;
        let target = self.helper.quote_identifier(TARGET_ALIAS)?;
        let source = self.helper.quote_identifier(VALUES_ALIAS)?;
        let set_count = first.values.len();
        let width = set_count + first.keys.len();
        let aliases = (0..width)
            .map(|i| self.helper.quote_identifier(&format!("c{i}")))
            .collect::<Result<Vec<_>>>()?;

        let mut params = Params::new(&self.helper);
        let mut rows = Vec::with_capacity(ops.len());
        for op in ops {
            let mut row = Vec::with_capacity(width);
            for (_, value) in op.values.iter().chain(op.keys.iter()) {
                row.push(params.bind_cast(value)?);
            }
            rows.push(format!("({})", row.join(", ")));
        }

        let mut assignments = Vec::with_capacity(set_count);
        for (i, (column, _)) in first.values.iter().enumerate() {
            assignments.push(format!(
                "{} = {source}.{}",
                self.helper.quote_identifier(column)?,
                aliases[i]
            ));
        }
        let mut predicate = Vec::with_capacity(first.keys.len());
        let mut returning = Vec::with_capacity(first.keys.len());
        for (i, (column, _)) in first.keys.iter().enumerate() {
            let column = self.helper.quote_identifier(column)?;
            let key = &aliases[set_count + i];
            predicate.push(format!("{target}.{column} = {source}.{key}"));
            // the matched key, not the updated column value
            returning.push(format!("{source}.{key}"));
        }

        let sql = format!(
            "UPDATE {table} AS {target} SET {} FROM (VALUES {}) AS {source} ({}) WHERE {} RETURNING {}",
            assignments.join(", "),
            rows.join(", "),
            aliases.join(", "),
            predicate.join(" AND "),
            returning.join(", ")
        );
        Ok(self.keyed_statement(first, ops, sql, params.values, operations))
    }

    fn multi_delete(
        &self,
        first: &CommandOperation,
        ops: &[CommandOperation],
        operations: Range<usize>,
    ) -> Result<BatchStatement> {
        let table = self.helper.delimit(first.schema.as_deref(), &first.table)?;
        let keys = self.column_list(first.keys.iter().map(|(c, _)| c.as_str()))?;
        let mut params = Params::new(&self.helper);
        let tuples = ops
            .iter()
            .map(|op| {
                let tuple = op
                    .keys
                    .iter()
                    .map(|(_, v)| params.bind(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({tuple})")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("DELETE FROM {table} WHERE ({keys}) IN ({tuples}) RETURNING {keys}");
        Ok(self.keyed_statement(first, ops, sql, params.values, operations))
    }

    fn keyed_statement(
        &self,
        first: &CommandOperation,
        ops: &[CommandOperation],
        sql: String,
        params: Vec<TypedValue>,
        operations: Range<usize>,
    ) -> BatchStatement {
        let keys: Vec<Vec<Value>> = ops
            .iter()
            .map(|op| op.keys.iter().map(|(_, v)| v.value().clone()).collect())
            .collect();
        BatchStatement {
            statement: Statement {
                sql,
                params,
                returning: first.keys.iter().map(|(_, v)| v.kind()).collect(),
            },
            operations,
            attribution: Attribution::ReturnedKey(keys),
            generated_columns: Vec::new(),
        }
    }

    fn key_predicate(&self, keys: &[(String, TypedValue)], params: &mut Params<'_>) -> Result<String> {
        let mut parts = Vec::with_capacity(keys.len());
        for (column, value) in keys {
            let column = self.helper.quote_identifier(column)?;
            if value.value().is_null() {
                parts.push(format!("{column} IS NULL"));
            } else {
                parts.push(format!("{column} = {}", params.bind(value)));
            }
        }
        Ok(parts.join(" AND "))
    }

    fn column_list<'c>(&self, columns: impl Iterator<Item = &'c str>) -> Result<String> {
        Ok(columns
            .map(|c| self.helper.quote_identifier(c))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }
}
