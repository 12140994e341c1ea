// Compiled-query execution over one table.
//
// A compiled query carries at most one driver condition the planner chose
// to push down, plus residual conditions evaluated row-by-row. The driver
// materializes candidates through the scan specializations; residuals
// filter the candidates under the row seqlock; the result is a sorted
// selection of packed references.

use crate::error::{MemrisError, Result};
use crate::selection::Selection;
use crate::table::typed::TypedTable;
use crate::types::Lane;

use super::args::ArgValue;
use super::condition::{decode_condition_args, CompiledCondition, Operator, RowPredicate};

#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub driver: Option<CompiledCondition>,
    pub residual: Vec<CompiledCondition>,
}

impl CompiledQuery {
    pub fn scan_all() -> Self {
        Self {
            driver: None,
            residual: Vec::new(),
        }
    }

    pub fn driven_by(driver: CompiledCondition) -> Self {
        Self {
            driver: Some(driver),
            residual: Vec::new(),
        }
    }

    pub fn and(mut self, condition: CompiledCondition) -> Self {
        self.residual.push(condition);
        self
    }

    /// Materialize the query against a table: driver scan first, then
    /// residual row-by-row filtering.
    pub fn execute(&self, table: &TypedTable, args: &[ArgValue]) -> Result<Selection> {
        let mut rows = match &self.driver {
            None => table.scan_all(),
            Some(condition) => driver_rows(table, condition, args)?,
        };
        for condition in &self.residual {
            if rows.is_empty() {
                break;
            }
            let predicate = RowPredicate::compile(condition.clone())?;
            let decoded = decode_condition_args(condition, args)?;
            rows = predicate.filter(table, &rows, &decoded)?;
        }
        Ok(table.selection_of(&rows))
    }
}

/// Run the driver condition through the table's scan specializations.
/// Operators without a push-down form fall back to residual evaluation
/// over the full table.
fn driver_rows(
    table: &TypedTable,
    condition: &CompiledCondition,
    args: &[ArgValue],
) -> Result<Vec<u32>> {
    match condition.op {
        Operator::Between => {
            let upper_slot = condition.upper_slot.ok_or_else(|| {
                MemrisError::ArgumentShape("BETWEEN requires two argument slots".to_string())
            })?;
            let decoded = decode_condition_args(condition, args)?;
            let scanner = table
                .specialization()
                .between_scanner(condition.column, condition.type_code)?;
            Ok(scanner(table, &decoded[condition.arg_slot], &decoded[upper_slot])?.to_index_array())
        }
        Operator::In => {
            let decoded = decode_condition_args(condition, args)?;
            let scanner = table
                .specialization()
                .in_scanner(condition.column, condition.type_code);
            Ok(scanner(table, &decoded[condition.arg_slot])?.to_index_array())
        }
        Operator::Eq | Operator::IgnoreCaseEq => equality_rows(table, condition, args),
        _ => residual_fallback(table, condition, args),
    }
}

fn equality_rows(
    table: &TypedTable,
    condition: &CompiledCondition,
    args: &[ArgValue],
) -> Result<Vec<u32>> {
    let decoded = decode_condition_args(condition, args)?;
    let target = &decoded[condition.arg_slot];
    if target.is_null() {
        // Scans only visit present cells, so a null target cannot be
        // pushed down; evaluate it as a residual instead.
        return residual_fallback(table, condition, args);
    }
    let fold_case = condition.ignore_case || condition.op == Operator::IgnoreCaseEq;
    match condition.type_code.lane() {
        Lane::Long => {
            let value = target
                .as_long()?
                .ok_or_else(|| MemrisError::ArgumentShape("missing scan target".to_string()))?;
            table.scan_equals_long(condition.column, value)
        }
        Lane::Int => {
            let value = target
                .as_int()?
                .ok_or_else(|| MemrisError::ArgumentShape("missing scan target".to_string()))?;
            table.scan_equals_int(condition.column, value)
        }
        Lane::Str => {
            let value = target
                .as_str()?
                .ok_or_else(|| MemrisError::ArgumentShape("missing scan target".to_string()))?;
            if fold_case {
                table.scan_equals_string_ignore_case(condition.column, value)
            } else {
                table.scan_equals_string(condition.column, value)
            }
        }
    }
}

fn residual_fallback(
    table: &TypedTable,
    condition: &CompiledCondition,
    args: &[ArgValue],
) -> Result<Vec<u32>> {
    let predicate = RowPredicate::compile(condition.clone())?;
    let decoded = decode_condition_args(condition, args)?;
    predicate.filter(table, &table.scan_all(), &decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs;
    use crate::types::{FieldMetadata, TableMetadata, TypeCode, Value};
    use crate::EngineConfig;

    fn table() -> TypedTable {
        let meta = TableMetadata::new(
            "person",
            vec![
                FieldMetadata::id("id", TypeCode::Long),
                FieldMetadata::new("name", TypeCode::String),
                FieldMetadata::primitive("age", TypeCode::Int),
                FieldMetadata::new("salary", TypeCode::Double),
            ],
        );
        let t = TypedTable::new(meta, &EngineConfig::default()).unwrap();
        let people: [(&str, i32, f64); 5] = [
            ("Ada", 36, 50_000.0),
            ("Linus", 54, 75_000.0),
            ("Grace", 41, 100_000.0),
            ("Alan", 41, 125_000.0),
            ("Edsger", 72, 90_000.0),
        ];
        for (i, (name, age, salary)) in people.iter().enumerate() {
            t.insert(&[
                Value::Long(i as i64),
                Value::Str(name.to_string()),
                Value::Int(*age),
                Value::Double(*salary),
            ])
            .unwrap();
        }
        t
    }

    #[test]
    fn test_driver_between_with_residual() {
        let t = table();
        let query = CompiledQuery::driven_by(CompiledCondition::between(3, TypeCode::Double, 0, 1))
            .and(CompiledCondition::new(2, TypeCode::Int, Operator::Eq, 2));
        let args = [
            ArgValue::Scalar(Value::Double(60_000.0)),
            ArgValue::Scalar(Value::Double(130_000.0)),
            ArgValue::Scalar(Value::Int(41)),
        ];
        let selection = query.execute(&t, &args).unwrap();
        assert_eq!(selection.to_index_array(), vec![2, 3]);
    }

    #[test]
    fn test_driver_in() {
        let t = table();
        let query = CompiledQuery::driven_by(CompiledCondition::new(
            0,
            TypeCode::Long,
            Operator::In,
            0,
        ));
        let args = [ArgValue::LongArray(vec![1, 4])];
        let selection = query.execute(&t, &args).unwrap();
        assert_eq!(selection.to_index_array(), vec![1, 4]);
    }

    #[test]
    fn test_driver_equality_ignore_case() {
        let t = table();
        let query = CompiledQuery::driven_by(CompiledCondition::new(
            1,
            TypeCode::String,
            Operator::IgnoreCaseEq,
            0,
        ));
        let args = [ArgValue::Scalar(Value::Str("grace".into()))];
        let selection = query.execute(&t, &args).unwrap();
        assert_eq!(selection.to_index_array(), vec![2]);
    }

    #[test]
    fn test_null_equality_falls_back_to_residual() {
        let t = table();
        let r = t
            .insert(&[Value::Long(9), Value::Null, Value::Int(1), Value::Null])
            .unwrap();
        let query =
            CompiledQuery::driven_by(CompiledCondition::new(1, TypeCode::String, Operator::Eq, 0));
        let args = [ArgValue::Scalar(Value::Null)];
        let selection = query.execute(&t, &args).unwrap();
        assert_eq!(selection.to_index_array(), vec![refs::row_index(r)]);
    }

    #[test]
    fn test_ordering_driver_uses_fallback() {
        let t = table();
        let query =
            CompiledQuery::driven_by(CompiledCondition::new(2, TypeCode::Int, Operator::Gte, 0));
        let args = [ArgValue::Scalar(Value::Int(54))];
        let selection = query.execute(&t, &args).unwrap();
        assert_eq!(selection.to_index_array(), vec![1, 4]);
    }

    #[test]
    fn test_scan_all_with_residuals_only() {
        let t = table();
        let query = CompiledQuery::scan_all()
            .and(CompiledCondition::new(2, TypeCode::Int, Operator::Lt, 0));
        let args = [ArgValue::Scalar(Value::Int(42))];
        let selection = query.execute(&t, &args).unwrap();
        assert_eq!(selection.to_index_array(), vec![0, 2, 3]);
    }

    #[test]
    fn test_empty_candidates_short_circuit_residuals() {
        let t = table();
        let query = CompiledQuery::driven_by(CompiledCondition::new(
            0,
            TypeCode::Long,
            Operator::In,
            0,
        ))
        .and(CompiledCondition::new(2, TypeCode::Int, Operator::Eq, 1));
        let args = [ArgValue::LongArray(vec![]), ArgValue::Scalar(Value::Int(41))];
        let selection = query.execute(&t, &args).unwrap();
        assert!(selection.is_empty());
    }

    #[test]
    fn test_tombstoned_rows_never_surface() {
        let t = table();
        assert!(t.remove_by_id(2));
        let query = CompiledQuery::driven_by(CompiledCondition::between(3, TypeCode::Double, 0, 1));
        // A wide range still skips the tombstoned row.
        let args = [
            ArgValue::Scalar(Value::Double(0.0)),
            ArgValue::Scalar(Value::Double(1e9)),
        ];
        let selection = query.execute(&t, &args).unwrap();
        assert_eq!(selection.to_index_array(), vec![0, 1, 3, 4]);
    }
}
