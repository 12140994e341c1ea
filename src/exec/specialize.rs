// Executor specialization.
//
// The hot path must not re-dispatch on type per row. For each
// (column, type-code, operation) triple this registry hands out one
// closure that reads the right lane with the right normalization, built on
// demand and cached per table. With specialization disabled the same
// builders run per call and nothing is cached, which is the generic
// dispatch fallback.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{MemrisError, Result};
use crate::refs::{self, RowRef, NONE_REF};
use crate::selection::Selection;
use crate::table::typed::TypedTable;
use crate::types::{
    int_lane_to_value, int_lane_value, long_lane_to_value, long_lane_value, str_lane_value, Lane,
    TypeCode, Value,
};

use super::args::DecodedArg;

/// Operations the registry specializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecOp {
    ReadField,
    ReadId,
    ReadGrouping,
    ReadStorage,
    ResolveById,
    ResolveByColumn,
    ScanBetween,
    ScanIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SpecKey {
    column: u32,
    type_code: u8,
    op: SpecOp,
}

impl SpecKey {
    fn new(op: SpecOp, column: usize, type_code: TypeCode) -> Self {
        Self {
            column: column as u32,
            type_code: type_code.code(),
            op,
        }
    }
}

pub type FieldReader = Arc<dyn Fn(&TypedTable, u32) -> Result<Value> + Send + Sync>;
pub type TargetResolver = Arc<dyn Fn(&TypedTable, &Value) -> Result<RowRef> + Send + Sync>;
pub type RangeScanner =
    Arc<dyn Fn(&TypedTable, &DecodedArg, &DecodedArg) -> Result<Selection> + Send + Sync>;
pub type ListScanner = Arc<dyn Fn(&TypedTable, &DecodedArg) -> Result<Selection> + Send + Sync>;

/// Per-table registry of specialized accessors.
pub struct SpecializationCache {
    enabled: bool,
    readers: DashMap<SpecKey, FieldReader>,
    resolvers: DashMap<SpecKey, TargetResolver>,
    range_scanners: DashMap<SpecKey, RangeScanner>,
    list_scanners: DashMap<SpecKey, ListScanner>,
}

impl SpecializationCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            readers: DashMap::new(),
            resolvers: DashMap::new(),
            range_scanners: DashMap::new(),
            list_scanners: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of cached specializations, across all operation kinds.
    pub fn cached_count(&self) -> usize {
        self.readers.len() + self.resolvers.len() + self.range_scanners.len()
            + self.list_scanners.len()
    }

    fn reader_for(&self, op: SpecOp, column: usize, type_code: TypeCode) -> FieldReader {
        let build = || match op {
            SpecOp::ReadStorage => build_storage_reader(column, type_code),
            _ => build_field_reader(column, type_code),
        };
        if !self.enabled {
            return build();
        }
        self.readers
            .entry(SpecKey::new(op, column, type_code))
            .or_insert_with(build)
            .value()
            .clone()
    }

    /// Logical-typed field read.
    pub fn field_reader(&self, column: usize, type_code: TypeCode) -> FieldReader {
        self.reader_for(SpecOp::ReadField, column, type_code)
    }

    /// Read of the id column, cached under its own operation key.
    pub fn id_reader(&self, column: usize, type_code: TypeCode) -> FieldReader {
        self.reader_for(SpecOp::ReadId, column, type_code)
    }

    /// Grouping-value read used by aggregation consumers.
    pub fn grouping_reader(&self, column: usize, type_code: TypeCode) -> FieldReader {
        self.reader_for(SpecOp::ReadGrouping, column, type_code)
    }

    /// Raw lane-value read, without logical-type reconstruction.
    pub fn storage_reader(&self, column: usize, type_code: TypeCode) -> FieldReader {
        self.reader_for(SpecOp::ReadStorage, column, type_code)
    }

    /// Resolve a target row by primary key.
    pub fn resolver_by_id(&self, column: usize, type_code: TypeCode) -> TargetResolver {
        let build = || build_resolver_by_id(column, type_code);
        if !self.enabled {
            return build();
        }
        self.resolvers
            .entry(SpecKey::new(SpecOp::ResolveById, column, type_code))
            .or_insert_with(build)
            .value()
            .clone()
    }

    /// Resolve a target row by scanning a column for the first match.
    pub fn resolver_by_column(&self, column: usize, type_code: TypeCode) -> TargetResolver {
        let build = || build_resolver_by_column(column, type_code);
        if !self.enabled {
            return build();
        }
        self.resolvers
            .entry(SpecKey::new(SpecOp::ResolveByColumn, column, type_code))
            .or_insert_with(build)
            .value()
            .clone()
    }

    /// Inclusive range scan producing a selection. String lanes have no
    /// range order and are rejected.
    pub fn between_scanner(&self, column: usize, type_code: TypeCode) -> Result<RangeScanner> {
        if type_code.lane() == Lane::Str {
            return Err(MemrisError::UnsupportedOperation(format!(
                "BETWEEN is not applicable to {} columns",
                type_code.name()
            )));
        }
        let build = || build_range_scanner(column, type_code);
        if !self.enabled {
            return Ok(build());
        }
        Ok(self
            .range_scanners
            .entry(SpecKey::new(SpecOp::ScanBetween, column, type_code))
            .or_insert_with(build)
            .value()
            .clone())
    }

    /// IN-list scan producing a selection.
    pub fn in_scanner(&self, column: usize, type_code: TypeCode) -> ListScanner {
        let build = || build_list_scanner(column, type_code);
        if !self.enabled {
            return build();
        }
        self.list_scanners
            .entry(SpecKey::new(SpecOp::ScanIn, column, type_code))
            .or_insert_with(build)
            .value()
            .clone()
    }
}

fn build_field_reader(column: usize, type_code: TypeCode) -> FieldReader {
    match type_code.lane() {
        Lane::Long => Arc::new(move |table, row| {
            let (present, value) = table.read_long_cell(column, row as usize)?;
            Ok(if present {
                long_lane_to_value(value, type_code)
            } else {
                Value::Null
            })
        }),
        Lane::Int => Arc::new(move |table, row| {
            let (present, value) = table.read_int_cell(column, row as usize)?;
            Ok(if present {
                int_lane_to_value(value, type_code)
            } else {
                Value::Null
            })
        }),
        Lane::Str => Arc::new(move |table, row| {
            Ok(table
                .read_string_cell(column, row as usize)?
                .map(Value::Str)
                .unwrap_or(Value::Null))
        }),
    }
}

fn build_storage_reader(column: usize, type_code: TypeCode) -> FieldReader {
    match type_code.lane() {
        Lane::Long => Arc::new(move |table, row| {
            let (present, value) = table.read_long_cell(column, row as usize)?;
            Ok(if present { Value::Long(value) } else { Value::Null })
        }),
        Lane::Int => Arc::new(move |table, row| {
            let (present, value) = table.read_int_cell(column, row as usize)?;
            Ok(if present { Value::Int(value) } else { Value::Null })
        }),
        Lane::Str => Arc::new(move |table, row| {
            Ok(table
                .read_string_cell(column, row as usize)?
                .map(Value::Str)
                .unwrap_or(Value::Null))
        }),
    }
}

fn build_resolver_by_id(column: usize, type_code: TypeCode) -> TargetResolver {
    match type_code.lane() {
        Lane::Str => Arc::new(move |table, key| {
            let Some(key) = str_lane_value(key, type_code, column)? else {
                return Ok(NONE_REF);
            };
            Ok(table.lookup_by_id_str(&key))
        }),
        Lane::Long => Arc::new(move |table, key| {
            let Some(key) = long_lane_value(key, type_code, column)? else {
                return Ok(NONE_REF);
            };
            Ok(table.lookup_by_id(key))
        }),
        Lane::Int => Arc::new(move |table, key| {
            let Some(key) = int_lane_value(key, type_code, column)? else {
                return Ok(NONE_REF);
            };
            Ok(table.lookup_by_id(i64::from(key)))
        }),
    }
}

fn build_resolver_by_column(column: usize, type_code: TypeCode) -> TargetResolver {
    match type_code.lane() {
        Lane::Long => Arc::new(move |table, key| {
            let Some(target) = long_lane_value(key, type_code, column)? else {
                return Ok(NONE_REF);
            };
            Ok(first_ref(table, &table.scan_equals_long(column, target)?))
        }),
        Lane::Int => Arc::new(move |table, key| {
            let Some(target) = int_lane_value(key, type_code, column)? else {
                return Ok(NONE_REF);
            };
            Ok(first_ref(table, &table.scan_equals_int(column, target)?))
        }),
        Lane::Str => Arc::new(move |table, key| {
            let Some(target) = str_lane_value(key, type_code, column)? else {
                return Ok(NONE_REF);
            };
            Ok(first_ref(table, &table.scan_equals_string(column, &target)?))
        }),
    }
}

fn first_ref(table: &TypedTable, rows: &[u32]) -> RowRef {
    rows.first()
        .map(|&row| refs::pack(row, table.row_generation(row as usize)))
        .unwrap_or(NONE_REF)
}

fn build_range_scanner(column: usize, type_code: TypeCode) -> RangeScanner {
    match type_code.lane() {
        Lane::Int => Arc::new(move |table, low, high| {
            let (Some(low), Some(high)) = (low.as_int()?, high.as_int()?) else {
                return Ok(Selection::empty());
            };
            Ok(table.selection_of(&table.scan_between_int(column, low, high)?))
        }),
        // String lanes are rejected before a scanner is built.
        _ => Arc::new(move |table, low, high| {
            let (Some(low), Some(high)) = (low.as_long()?, high.as_long()?) else {
                return Ok(Selection::empty());
            };
            Ok(table.selection_of(&table.scan_between_long(column, low, high)?))
        }),
    }
}

fn build_list_scanner(column: usize, type_code: TypeCode) -> ListScanner {
    match type_code.lane() {
        Lane::Long => Arc::new(move |table, arg| {
            let list = arg.as_long_list()?;
            if list.is_empty() {
                return Ok(Selection::empty());
            }
            Ok(table.selection_of(&table.scan_in_long(column, list)?))
        }),
        Lane::Int => Arc::new(move |table, arg| {
            let list = arg.as_int_list()?;
            if list.is_empty() {
                return Ok(Selection::empty());
            }
            Ok(table.selection_of(&table.scan_in_int(column, list)?))
        }),
        Lane::Str => Arc::new(move |table, arg| {
            let list = arg.as_str_list()?;
            if list.is_empty() {
                return Ok(Selection::empty());
            }
            Ok(table.selection_of(&table.scan_in_string(column, list)?))
        }),
    }
}
