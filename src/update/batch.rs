use log::debug;
use std::ops::Range;

use super::command::{CommandOperation, OperationKind};
use super::result::OperationOutcome;
use super::sql_generator::UpdateSqlGenerator;
use crate::error::{Error, Result};
use crate::sql::SqlGenerationHelper;
use crate::storage::{Statement, StatementResult};
use crate::types::{TypedValue, Value};

/// How the rows a statement returns map back to its operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribution {
    /// Single operation; the affected-row count belongs to it
    RowsAffected,
    /// Multi-row insert; returned row `i` belongs to operation `i`
    RowPosition,
    /// Multi-row update/delete returning key columns; one key per operation
    ReturnedKey(Vec<Vec<Value>>),
}

/// One round trip of a [`Batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    pub statement: Statement,
    /// Indices of the operations this statement carries
    pub operations: Range<usize>,
    pub attribution: Attribution,
    pub generated_columns: Vec<String>,
}

impl BatchStatement {
    pub(crate) fn attribute(&self, result: StatementResult) -> Vec<OperationOutcome> {
        match &self.attribution {
            Attribution::RowsAffected => {
                let generated = result
                    .rows
                    .into_iter()
                    .next()
                    .map(|row| self.label(row))
                    .unwrap_or_default();
                vec![OperationOutcome::Succeeded {
                    rows_affected: result.rows_affected,
                    generated,
                }]
            }
            Attribution::RowPosition => {
                let mut rows = result.rows.into_iter();
                self.operations
                    .clone()
                    .map(|_| OperationOutcome::Succeeded {
                        rows_affected: 1,
                        generated: rows.next().map(|row| self.label(row)).unwrap_or_default(),
                    })
                    .collect()
            }
            Attribution::ReturnedKey(keys) => keys
                .iter()
                .map(|key| OperationOutcome::Succeeded {
                    rows_affected: result
                        .rows
                        .iter()
                        .filter(|row| row.as_slice() == key.as_slice())
                        .count() as u64,
                    generated: Vec::new(),
                })
                .collect(),
        }
    }

    fn label(&self, row: Vec<Value>) -> Vec<(String, TypedValue)> {
        self.generated_columns
            .iter()
            .zip(self.statement.returning.iter())
            .zip(row)
            .filter_map(|((column, kind), value)| {
                TypedValue::new(*kind, value).ok().map(|v| (column.clone(), v))
            })
            .collect()
    }
}

/// Immutable, ordered list of statements produced by a builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    statements: Vec<BatchStatement>,
    operation_count: usize,
}

impl Batch {
    pub fn statements(&self) -> &[BatchStatement] {
        &self.statements
    }

    pub fn operation_count(&self) -> usize {
        self.operation_count
    }

    pub fn round_trips(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// All statements as one script, for display.
    pub fn to_sql(&self, terminator: &str) -> String {
        self.statements
            .iter()
            .map(|s| format!("{}{}", s.statement.sql, terminator))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Single-use builder turning operations into the fewest statements.
pub struct CommandBatchBuilder {
    generator: UpdateSqlGenerator,
    max_batch_size: usize,
    operations: Vec<CommandOperation>,
    closed: bool,
}

impl CommandBatchBuilder {
    pub fn new(helper: SqlGenerationHelper, max_batch_size: usize) -> Self {
        Self {
            generator: UpdateSqlGenerator::new(helper),
            max_batch_size: max_batch_size.max(1),
            operations: Vec::new(),
            closed: false,
        }
    }

    pub fn append(&mut self, op: CommandOperation) -> Result<()> {
        if self.closed {
            return Err(Error::BuilderClosed);
        }
        op.validate()?;
        self.operations.push(op);
        Ok(())
    }

    pub fn append_all(&mut self, ops: impl IntoIterator<Item = CommandOperation>) -> Result<()> {
        for op in ops {
            self.append(op)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the builder and group the appended operations.
    ///
    /// Consecutive operations of the same shape share one statement when
    /// the dialect has multi-row syntax. Operations are never reordered.
    pub fn build(&mut self) -> Result<Batch> {
        if self.closed {
            return Err(Error::BuilderClosed);
        }
        self.closed = true;
        let ops = std::mem::take(&mut self.operations);
        let dialect = self.generator.helper().dialect();
        let multi_row = dialect.multi_row;
        let max_parameters = dialect.max_parameters;

        let mut statements = Vec::new();
        let mut start = 0;
        while start < ops.len() {
            let mut end = start + 1;
            if multi_row && groupable(&ops[start]) {
                let mut params = ops[start].parameter_count();
                while end < ops.len()
                    && end - start < self.max_batch_size
                    && same_shape(&ops[start], &ops[end])
                    && !targets_same_row(&ops[start..end], &ops[end])
                    && params + ops[end].parameter_count() <= max_parameters
                {
                    params += ops[end].parameter_count();
                    end += 1;
                }
            }
            statements.push(self.generator.multi(&ops[start..end], start)?);
            start = end;
        }
        debug!(
            "built batch of {} operation(s) in {} statement(s)",
            ops.len(),
            statements.len()
        );
        Ok(Batch {
            statements,
            operation_count: ops.len(),
        })
    }
}

fn groupable(op: &CommandOperation) -> bool {
    !(op.kind == OperationKind::Insert && op.values.is_empty()) && !op.has_null_key()
}

/// Whether `next` touches a row an operation of `group` already keys on.
/// A multi-row UPDATE applies at most one joined row per target row.
fn targets_same_row(group: &[CommandOperation], next: &CommandOperation) -> bool {
    next.kind != OperationKind::Insert && group.iter().any(|op| op.keys == next.keys)
}

fn same_shape(a: &CommandOperation, b: &CommandOperation) -> bool {
    fn names<T>(cols: &[(String, T)]) -> impl Iterator<Item = &str> {
        cols.iter().map(|(c, _)| c.as_str())
    }
    groupable(b)
        && a.kind == b.kind
        && a.schema == b.schema
        && a.table == b.table
        && names(&a.values).eq(names(&b.values))
        && names(&a.keys).eq(names(&b.keys))
        && a.values.iter().map(|(_, v)| v.kind()).eq(b.values.iter().map(|(_, v)| v.kind()))
        && a.keys.iter().map(|(_, v)| v.kind()).eq(b.keys.iter().map(|(_, v)| v.kind()))
        && a.returning == b.returning
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::error::ErrorKind;
    use crate::provider::{postgres::PostgresProvider, Provider};
    use crate::types::{ColumnType, TypeMapper};
    use std::sync::Arc;

    fn builder(dialect: Dialect, max_batch_size: usize) -> CommandBatchBuilder {
        let mut mapper = TypeMapper::new();
        PostgresProvider::new().register_type_mappings(&mut mapper).unwrap();
        CommandBatchBuilder::new(
            SqlGenerationHelper::new(dialect, Arc::new(mapper)),
            max_batch_size,
        )
    }

    fn insert(table: &str, id: i64) -> CommandOperation {
        CommandOperation::insert(table)
            .value("id", TypedValue::integer(id))
            .value("name", TypedValue::text(format!("row {id}")))
    }

    fn delete(table: &str, id: i64) -> CommandOperation {
        CommandOperation::delete(table).key("id", TypedValue::integer(id))
    }

    /// Operation indices in statement order, restricted to `table`.
    fn order_for(batch: &Batch, ops: &[CommandOperation], table: &str) -> Vec<usize> {
        batch
            .statements()
            .iter()
            .flat_map(|s| s.operations.clone())
            .filter(|i| ops[*i].table == table)
            .collect()
    }

    #[test]
    fn same_shape_inserts_share_one_statement() {
        let mut b = builder(Dialect::postgres(), 100);
        b.append_all((1..=3).map(|i| insert("users", i))).unwrap();
        let batch = b.build().unwrap();
        assert_eq!(batch.round_trips(), 1);
        assert_eq!(batch.operation_count(), 3);
    }

    #[test]
    fn without_multi_row_each_operation_is_a_statement() {
        let mut b = builder(Dialect::ansi(), 100);
        b.append_all((1..=3).map(|i| insert("users", i))).unwrap();
        assert_eq!(b.build().unwrap().round_trips(), 3);
    }

    #[test]
    fn append_after_build_fails() {
        let mut empty = builder(Dialect::postgres(), 100);
        assert!(empty.build().unwrap().is_empty());
        assert_eq!(
            empty.append(insert("users", 1)).unwrap_err().kind(),
            ErrorKind::BuilderClosed
        );

        let mut b = builder(Dialect::postgres(), 100);
        b.append_all((1..=5).map(|i| insert("users", i))).unwrap();
        b.build().unwrap();
        assert_eq!(b.append(insert("users", 6)).unwrap_err().kind(), ErrorKind::BuilderClosed);
        assert_eq!(b.build().unwrap_err().kind(), ErrorKind::BuilderClosed);
    }

    #[test]
    fn grouping_never_reorders_across_tables() {
        let ops = vec![
            insert("parents", 1),
            insert("children", 1),
            insert("parents", 2),
            insert("parents", 3),
            delete("children", 9),
            insert("children", 2),
            delete("parents", 4),
        ];
        let mut b = builder(Dialect::postgres(), 100);
        b.append_all(ops.clone()).unwrap();
        let batch = b.build().unwrap();
        assert_eq!(batch.round_trips(), 6);
        for table in ["parents", "children"] {
            let expected: Vec<usize> = (0..ops.len()).filter(|i| ops[*i].table == table).collect();
            assert_eq!(order_for(&batch, &ops, table), expected);
        }
    }

    #[test]
    fn different_shapes_are_not_grouped() {
        let mut b = builder(Dialect::postgres(), 100);
        b.append(insert("users", 1)).unwrap();
        b.append(CommandOperation::insert("users").value("id", TypedValue::integer(2)))
            .unwrap();
        b.append(insert("users", 3).returning("created", ColumnType::Timestamp))
            .unwrap();
        b.append(CommandOperation::insert("users")).unwrap();
        b.append(CommandOperation::insert("users")).unwrap();
        assert_eq!(b.build().unwrap().round_trips(), 5);
    }

    #[test]
    fn null_keys_are_never_grouped() {
        let mut b = builder(Dialect::postgres(), 100);
        b.append(delete("users", 1)).unwrap();
        b.append(CommandOperation::delete("users").key("id", TypedValue::null(ColumnType::Integer)))
            .unwrap();
        b.append(delete("users", 3)).unwrap();
        assert_eq!(b.build().unwrap().round_trips(), 3);
    }

    #[test]
    fn max_batch_size_splits_groups() {
        let mut b = builder(Dialect::postgres(), 2);
        b.append_all((1..=5).map(|i| insert("users", i))).unwrap();
        let batch = b.build().unwrap();
        let ranges: Vec<_> = batch.statements().iter().map(|s| s.operations.clone()).collect();
        assert_eq!(ranges, vec![0..2, 2..4, 4..5]);
    }

    #[test]
    fn parameter_limit_splits_groups() {
        let dialect = Dialect {
            max_parameters: 5,
            ..Dialect::postgres()
        };
        let mut b = builder(dialect, 100);
        b.append_all((1..=5).map(|i| insert("users", i))).unwrap();
        assert_eq!(b.build().unwrap().round_trips(), 3);
    }

    #[test]
    fn invalid_operation_is_rejected_on_append() {
        let mut b = builder(Dialect::postgres(), 100);
        let err = b.append(CommandOperation::delete("users")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(b.is_empty());
    }

    fn rename(id: i64, name: &str) -> CommandOperation {
        CommandOperation::update("users")
            .value("name", TypedValue::text(name))
            .key("id", TypedValue::integer(id))
    }

    #[test]
    fn repeated_keys_start_a_new_statement() {
        let mut b = builder(Dialect::postgres(), 100);
        b.append_all([rename(1, "a"), rename(2, "b"), rename(1, "c"), rename(3, "d")])
            .unwrap();
        let batch = b.build().unwrap();
        let ranges: Vec<_> = batch.statements().iter().map(|s| s.operations.clone()).collect();
        assert_eq!(ranges, vec![0..2, 2..4]);

        let mut b = builder(Dialect::postgres(), 100);
        b.append_all([delete("users", 7), delete("users", 7)]).unwrap();
        let batch = b.build().unwrap();
        assert_eq!(batch.round_trips(), 2);
        let outcomes = batch.statements()[0].attribute(StatementResult::affected(1));
        assert_eq!(outcomes[0].rows_affected(), Some(1));
    }

    #[test]
    fn repeated_insert_values_still_group() {
        let mut b = builder(Dialect::postgres(), 100);
        b.append_all([insert("users", 1), insert("users", 1)]).unwrap();
        assert_eq!(b.build().unwrap().round_trips(), 1);
    }

    #[test]
    fn grouped_update_of_a_key_column_attributes_old_keys() {
        let mut b = builder(Dialect::postgres(), 100);
        b.append_all((1..=2).map(|id| {
            CommandOperation::update("users")
                .value("id", TypedValue::integer(id + 10))
                .key("id", TypedValue::integer(id))
        }))
        .unwrap();
        let batch = b.build().unwrap();
        assert_eq!(batch.round_trips(), 1);
        let stmt = &batch.statements()[0];
        assert!(stmt.statement.sql.ends_with("RETURNING \"v\".\"c1\""));

        let outcomes = stmt.attribute(StatementResult::with_rows(vec![
            vec![Value::Integer(2)],
            vec![Value::Integer(1)],
        ]));
        let counts: Vec<_> = outcomes.iter().map(|o| o.rows_affected()).collect();
        assert_eq!(counts, vec![Some(1), Some(1)]);
    }

    /// Deterministic mixed workload over three tables with colliding keys.
    fn workload(len: usize, seed: u64) -> Vec<CommandOperation> {
        let mut state = seed;
        let mut next = move |n: u64| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) % n
        };
        (0..len)
            .map(|_| {
                let table = ["parents", "children", "audit"][next(3) as usize];
                let id = next(4) as i64;
                match next(3) {
                    0 => insert(table, id),
                    1 => CommandOperation::update(table)
                        .value("name", TypedValue::text(format!("v{id}")))
                        .key("id", TypedValue::integer(id)),
                    _ => delete(table, id),
                }
            })
            .collect()
    }

    #[test]
    fn grouping_preserves_order_for_any_batch_size() {
        for seed in 1..=20 {
            let ops = workload(60, seed);
            for max in [1, 2, 3, 7, 1000] {
                let mut b = builder(Dialect::postgres(), max);
                b.append_all(ops.clone()).unwrap();
                let batch = b.build().unwrap();

                let flat: Vec<usize> = batch
                    .statements()
                    .iter()
                    .flat_map(|s| s.operations.clone())
                    .collect();
                assert_eq!(flat, (0..ops.len()).collect::<Vec<_>>(), "seed {seed} max {max}");
                for table in ["parents", "children", "audit"] {
                    let expected: Vec<usize> =
                        (0..ops.len()).filter(|i| ops[*i].table == table).collect();
                    assert_eq!(order_for(&batch, &ops, table), expected);
                }
                for stmt in batch.statements() {
                    assert!(stmt.operations.len() <= max);
                    let group = &ops[stmt.operations.clone()];
                    assert!(group.iter().all(|op| op.table == group[0].table));
                    if group[0].kind != OperationKind::Insert {
                        for (i, op) in group.iter().enumerate() {
                            assert!(!group[..i].iter().any(|o| o.keys == op.keys));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn attributes_rows_by_position_and_key() {
        let mut b = builder(Dialect::postgres(), 100);
        b.append_all((1..=2).map(|i| insert("users", i).returning("seq", ColumnType::Integer)))
            .unwrap();
        b.append_all((1..=3).map(|i| delete("users", i))).unwrap();
        let batch = b.build().unwrap();

        let inserted = batch.statements()[0].attribute(StatementResult::with_rows(vec![
            vec![Value::Integer(10)],
            vec![Value::Integer(11)],
        ]));
        assert_eq!(
            inserted[1],
            OperationOutcome::Succeeded {
                rows_affected: 1,
                generated: vec![("seq".into(), TypedValue::integer(11))],
            }
        );

        let deleted = batch.statements()[1].attribute(StatementResult::with_rows(vec![
            vec![Value::Integer(3)],
            vec![Value::Integer(1)],
        ]));
        let counts: Vec<_> = deleted.iter().map(|o| o.rows_affected()).collect();
        assert_eq!(counts, vec![Some(1), Some(0), Some(1)]);
    }
}
