// Typed table: one page-column per schema field composed with the row
// substrate and the primary-key index.
//
// Insert claims a slot, writes every column under the row seqlock, binds
// the primary key, publishes the columns, releases the seqlock, then
// counts the row live. Reads validate lane compatibility and observe the
// row through the seqlock. Scans are type-dispatched to the owning column
// and tombstone-filtered before returning.

use crate::column::ColumnStorage;
use crate::error::{MemrisError, Result};
use crate::exec::specialize::SpecializationCache;
use crate::refs::{self, RowRef, NONE_REF};
use crate::selection::Selection;
use crate::types::{
    int_lane_to_value, int_lane_value, long_lane_to_value, long_lane_value, str_lane_value, Lane,
    TableMetadata, TypeCode, Value,
};
use crate::EngineConfig;

use super::pk_index::{PkEntry, PkIndex};
use super::substrate::TableSubstrate;

enum Staged {
    Long(Option<i64>),
    Int(Option<i32>),
    Str(Option<String>),
}

enum IdKey {
    Long(i64),
    Str(String),
}

pub struct TypedTable {
    meta: TableMetadata,
    substrate: TableSubstrate,
    columns: Vec<ColumnStorage>,
    pk: PkIndex,
    id_column: usize,
    specialization: SpecializationCache,
}

impl TypedTable {
    pub fn new(meta: TableMetadata, config: &EngineConfig) -> Result<TypedTable> {
        config.validate()?;
        let id_column = meta.id_position().ok_or_else(|| {
            MemrisError::ArgumentShape(format!(
                "schema {} declares no id field",
                meta.entity_name
            ))
        })?;
        let columns = meta
            .fields
            .iter()
            .map(|field| {
                ColumnStorage::for_lane(
                    field.type_code.lane(),
                    config.page_size,
                    config.max_pages,
                    config.initial_pages,
                )
            })
            .collect();
        let pk = PkIndex::for_lane(meta.fields[id_column].type_code.lane());
        let substrate =
            TableSubstrate::new(config.page_size, config.max_pages, config.initial_pages);
        tracing::debug!(
            entity = %meta.entity_name,
            columns = meta.fields.len(),
            page_size = config.page_size,
            "created typed table"
        );
        Ok(Self {
            meta,
            substrate,
            columns,
            pk,
            id_column,
            specialization: SpecializationCache::new(config.specialization),
        })
    }

    pub fn entity_name(&self) -> &str {
        &self.meta.entity_name
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.meta
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn id_column(&self) -> usize {
        self.id_column
    }

    pub fn type_code_at(&self, column: usize) -> Result<TypeCode> {
        self.check_column(column)?;
        Ok(self.meta.fields[column].type_code)
    }

    pub fn lane_at(&self, column: usize) -> Result<Lane> {
        self.check_column(column)?;
        Ok(self.columns[column].lane())
    }

    pub fn page_size(&self) -> usize {
        self.substrate.page_size()
    }

    pub fn capacity(&self) -> usize {
        self.substrate.capacity()
    }

    pub fn allocated_count(&self) -> usize {
        self.substrate.allocated_count()
    }

    pub fn live_count(&self) -> usize {
        self.substrate.live_count()
    }

    pub fn current_generation(&self) -> u64 {
        self.substrate.current_generation()
    }

    pub fn row_generation(&self, row: usize) -> u64 {
        self.substrate.row_generation(row)
    }

    pub fn is_tombstoned(&self, row: usize) -> bool {
        self.substrate.is_tombstoned(row)
    }

    /// Per-table executor specialization registry.
    pub fn specialization(&self) -> &SpecializationCache {
        &self.specialization
    }

    #[inline]
    fn check_column(&self, column: usize) -> Result<()> {
        if column >= self.columns.len() {
            return Err(MemrisError::OutOfBounds {
                what: "column",
                index: column,
                limit: self.columns.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.substrate.capacity() {
            return Err(MemrisError::OutOfBounds {
                what: "row",
                index: row,
                limit: self.substrate.capacity(),
            });
        }
        Ok(())
    }

    fn lane_mismatch(&self, column: usize, expected: Lane) -> MemrisError {
        MemrisError::TypeMismatch {
            column,
            expected: expected.name(),
            actual: self.columns[column].lane().name(),
        }
    }

    fn long_column(&self, column: usize) -> Result<&crate::column::LongColumn> {
        self.check_column(column)?;
        self.columns[column]
            .as_long()
            .ok_or_else(|| self.lane_mismatch(column, Lane::Long))
    }

    fn int_column(&self, column: usize) -> Result<&crate::column::IntColumn> {
        self.check_column(column)?;
        self.columns[column]
            .as_int()
            .ok_or_else(|| self.lane_mismatch(column, Lane::Int))
    }

    fn str_column(&self, column: usize) -> Result<&crate::column::StringColumn> {
        self.check_column(column)?;
        self.columns[column]
            .as_str()
            .ok_or_else(|| self.lane_mismatch(column, Lane::Str))
    }

    /// Insert one row. Values are validated and normalized to lane form
    /// before any slot is claimed, so a rejected insert has no effect.
    pub fn insert(&self, values: &[Value]) -> Result<RowRef> {
        if values.len() != self.columns.len() {
            return Err(MemrisError::ArgumentShape(format!(
                "insert expects {} values, got {}",
                self.columns.len(),
                values.len()
            )));
        }
        let mut staged = Vec::with_capacity(values.len());
        for (column, value) in values.iter().enumerate() {
            let field = &self.meta.fields[column];
            if value.is_null() && field.primitive_non_null {
                return Err(MemrisError::NullInPrimitive { column });
            }
            staged.push(match field.type_code.lane() {
                Lane::Long => Staged::Long(long_lane_value(value, field.type_code, column)?),
                Lane::Int => Staged::Int(int_lane_value(value, field.type_code, column)?),
                Lane::Str => Staged::Str(str_lane_value(value, field.type_code, column)?),
            });
        }
        let id_key = self.id_key_of(&staged)?;

        let (row, generation) = self.substrate.allocate_row()?;
        {
            let _ticket = self.substrate.begin_write(row as usize);
            for (column, lane_value) in staged.into_iter().enumerate() {
                self.write_staged(column, row as usize, lane_value)?;
            }
            match id_key {
                IdKey::Long(key) => self.pk.put_long(key, PkEntry { row, generation }),
                IdKey::Str(key) => self.pk.put_str(key, PkEntry { row, generation }),
            }
            for column in &self.columns {
                column.publish(row as usize + 1);
            }
        }
        self.substrate.increment_row_count();
        Ok(refs::pack(row, generation))
    }

    fn id_key_of(&self, staged: &[Staged]) -> Result<IdKey> {
        match &staged[self.id_column] {
            Staged::Long(Some(value)) => Ok(IdKey::Long(*value)),
            Staged::Int(Some(value)) => Ok(IdKey::Long(i64::from(*value))),
            Staged::Str(Some(value)) => Ok(IdKey::Str(value.clone())),
            _ => Err(MemrisError::ArgumentShape(
                "id value must not be null".to_string(),
            )),
        }
    }

    fn write_staged(&self, column: usize, row: usize, staged: Staged) -> Result<()> {
        match (&self.columns[column], staged) {
            (ColumnStorage::Long(col), Staged::Long(Some(value))) => col.set(row, value),
            (ColumnStorage::Long(col), Staged::Long(None)) => col.set_null(row),
            (ColumnStorage::Int(col), Staged::Int(Some(value))) => col.set(row, value),
            (ColumnStorage::Int(col), Staged::Int(None)) => col.set_null(row),
            (ColumnStorage::Str(col), Staged::Str(Some(value))) => col.set(row, value),
            (ColumnStorage::Str(col), Staged::Str(None)) => col.set_null(row),
            (storage, _) => Err(MemrisError::TypeMismatch {
                column,
                expected: storage.lane().name(),
                actual: "staged value of another lane",
            }),
        }
    }

    /// Tombstone the referenced row. Stale references return false with no
    /// effect; a true result means the row is tombstoned under this
    /// reference's generation, whichever caller flipped the flag.
    pub fn tombstone(&self, reference: RowRef) -> bool {
        if refs::is_none(reference) {
            return false;
        }
        let row = refs::row_index(reference) as usize;
        if row >= self.substrate.allocated_count() {
            return false;
        }
        if refs::gen_tag(self.substrate.row_generation(row)) != refs::generation_tag(reference) {
            return false;
        }
        // The id is immutable for the slot's current generation; read the
        // key and the full generation before the flip so only this
        // incarnation's index entry can be dropped afterwards.
        let generation = self.substrate.row_generation(row);
        let id_key = self.read_id_key(row);
        if !self.substrate.tombstone(reference) {
            return false;
        }
        if let Ok(Some(id_key)) = id_key {
            match id_key {
                IdKey::Long(key) => self.pk.remove_long_if(key, row as u32, generation),
                IdKey::Str(key) => self.pk.remove_str_if(&key, row as u32, generation),
            }
        }
        true
    }

    fn read_id_key(&self, row: usize) -> Result<Option<IdKey>> {
        match &self.columns[self.id_column] {
            ColumnStorage::Long(col) => {
                let cell = self.substrate.read_with_seqlock(row, || {
                    Ok::<_, MemrisError>((col.is_present(row)?, col.get(row)?))
                })?;
                Ok(cell.0.then_some(IdKey::Long(cell.1)))
            }
            ColumnStorage::Int(col) => {
                let cell = self.substrate.read_with_seqlock(row, || {
                    Ok::<_, MemrisError>((col.is_present(row)?, col.get(row)?))
                })?;
                Ok(cell.0.then_some(IdKey::Long(i64::from(cell.1))))
            }
            ColumnStorage::Str(col) => {
                let value = self.substrate.read_with_seqlock(row, || col.get(row))?;
                Ok(value.map(IdKey::Str))
            }
        }
    }

    pub fn is_live(&self, reference: RowRef) -> bool {
        if refs::is_none(reference) {
            return false;
        }
        let row = refs::row_index(reference) as usize;
        row < self.substrate.allocated_count()
            && !self.substrate.is_tombstoned(row)
            && refs::gen_tag(self.substrate.row_generation(row)) == refs::generation_tag(reference)
    }

    /// Presence and lane value of a long-lane cell, observed atomically
    /// under the row seqlock. Absent cells read as the lane zero.
    pub fn read_long_cell(&self, column: usize, row: usize) -> Result<(bool, i64)> {
        let col = self.long_column(column)?;
        self.check_row(row)?;
        self.substrate.read_with_seqlock(row, || {
            Ok::<_, MemrisError>((col.is_present(row)?, col.get(row)?))
        })
    }

    pub fn read_int_cell(&self, column: usize, row: usize) -> Result<(bool, i32)> {
        let col = self.int_column(column)?;
        self.check_row(row)?;
        self.substrate.read_with_seqlock(row, || {
            Ok::<_, MemrisError>((col.is_present(row)?, col.get(row)?))
        })
    }

    pub fn read_string_cell(&self, column: usize, row: usize) -> Result<Option<String>> {
        let col = self.str_column(column)?;
        self.check_row(row)?;
        self.substrate.read_with_seqlock(row, || col.get(row))
    }

    pub fn read_long(&self, column: usize, row: usize) -> Result<i64> {
        Ok(self.read_long_cell(column, row)?.1)
    }

    pub fn read_int(&self, column: usize, row: usize) -> Result<i32> {
        Ok(self.read_int_cell(column, row)?.1)
    }

    pub fn read_string(&self, column: usize, row: usize) -> Result<Option<String>> {
        self.read_string_cell(column, row)
    }

    pub fn is_present(&self, column: usize, row: usize) -> Result<bool> {
        self.check_column(column)?;
        self.check_row(row)?;
        self.columns[column].is_present(row)
    }

    /// Logical-typed read: the inverse of insert's lane normalization.
    pub fn read_value(&self, column: usize, row: usize) -> Result<Value> {
        let type_code = self.type_code_at(column)?;
        match type_code.lane() {
            Lane::Long => {
                let (present, value) = self.read_long_cell(column, row)?;
                Ok(if present {
                    long_lane_to_value(value, type_code)
                } else {
                    Value::Null
                })
            }
            Lane::Int => {
                let (present, value) = self.read_int_cell(column, row)?;
                Ok(if present {
                    int_lane_to_value(value, type_code)
                } else {
                    Value::Null
                })
            }
            Lane::Str => Ok(self
                .read_string_cell(column, row)?
                .map(Value::Str)
                .unwrap_or(Value::Null)),
        }
    }

    fn validate_entry(&self, entry: PkEntry) -> RowRef {
        let row = entry.row as usize;
        if self.substrate.is_tombstoned(row) {
            return NONE_REF;
        }
        if self.substrate.row_generation(row) != entry.generation {
            return NONE_REF;
        }
        refs::pack(entry.row, entry.generation)
    }

    /// Primary-key lookup. `NONE_REF` means no live row is bound to the
    /// key: absent, tombstoned, and reused slots all look the same.
    pub fn lookup_by_id(&self, key: i64) -> RowRef {
        match self.pk.get_long(key) {
            Some(entry) => self.validate_entry(entry),
            None => NONE_REF,
        }
    }

    pub fn lookup_by_id_str(&self, key: &str) -> RowRef {
        match self.pk.get_str(key) {
            Some(entry) => self.validate_entry(entry),
            None => NONE_REF,
        }
    }

    pub fn remove_by_id(&self, key: i64) -> bool {
        let reference = self.lookup_by_id(key);
        !refs::is_none(reference) && self.tombstone(reference)
    }

    pub fn remove_by_id_str(&self, key: &str) -> bool {
        let reference = self.lookup_by_id_str(key);
        !refs::is_none(reference) && self.tombstone(reference)
    }

    fn filter_tombstoned(&self, mut rows: Vec<u32>) -> Vec<u32> {
        rows.retain(|&row| !self.substrate.is_tombstoned(row as usize));
        rows
    }

    pub fn scan_equals_long(&self, column: usize, value: i64) -> Result<Vec<u32>> {
        let col = self.long_column(column)?;
        Ok(self.filter_tombstoned(col.scan_eq(value, self.substrate.allocated_count())))
    }

    pub fn scan_equals_int(&self, column: usize, value: i32) -> Result<Vec<u32>> {
        let col = self.int_column(column)?;
        Ok(self.filter_tombstoned(col.scan_eq(value, self.substrate.allocated_count())))
    }

    pub fn scan_equals_bool(&self, column: usize, value: bool) -> Result<Vec<u32>> {
        self.scan_equals_int(column, i32::from(value))
    }

    pub fn scan_equals_string(&self, column: usize, value: &str) -> Result<Vec<u32>> {
        let col = self.str_column(column)?;
        Ok(self.filter_tombstoned(col.scan_eq(value, self.substrate.allocated_count())))
    }

    pub fn scan_equals_string_ignore_case(&self, column: usize, value: &str) -> Result<Vec<u32>> {
        let col = self.str_column(column)?;
        Ok(self.filter_tombstoned(col.scan_eq_ignore_case(value, self.substrate.allocated_count())))
    }

    /// Inclusive range scan over the long lane. Bounds arrive already in
    /// lane form (sortable encoding for doubles, epoch values for
    /// temporal types).
    pub fn scan_between_long(&self, column: usize, low: i64, high: i64) -> Result<Vec<u32>> {
        let col = self.long_column(column)?;
        Ok(self.filter_tombstoned(col.scan_between(low, high, self.substrate.allocated_count())))
    }

    pub fn scan_between_int(&self, column: usize, low: i32, high: i32) -> Result<Vec<u32>> {
        let col = self.int_column(column)?;
        Ok(self.filter_tombstoned(col.scan_between(low, high, self.substrate.allocated_count())))
    }

    pub fn scan_in_long(&self, column: usize, values: &[i64]) -> Result<Vec<u32>> {
        let col = self.long_column(column)?;
        Ok(self.filter_tombstoned(col.scan_in(values, self.substrate.allocated_count())))
    }

    pub fn scan_in_int(&self, column: usize, values: &[i32]) -> Result<Vec<u32>> {
        let col = self.int_column(column)?;
        Ok(self.filter_tombstoned(col.scan_in(values, self.substrate.allocated_count())))
    }

    pub fn scan_in_string(&self, column: usize, values: &[String]) -> Result<Vec<u32>> {
        let col = self.str_column(column)?;
        Ok(self.filter_tombstoned(col.scan_in(values, self.substrate.allocated_count())))
    }

    /// Enumerate every allocated, non-tombstoned row index.
    pub fn scan_all(&self) -> Vec<u32> {
        let allocated = self.substrate.allocated_count();
        (0..allocated)
            .filter(|&row| !self.substrate.is_tombstoned(row))
            .map(|row| row as u32)
            .collect()
    }

    /// Pack scan results into a selection, tagging each row with its
    /// current generation.
    pub fn selection_of(&self, rows: &[u32]) -> Selection {
        Selection::new(
            rows.iter()
                .map(|&row| refs::pack(row, self.substrate.row_generation(row as usize)))
                .collect(),
        )
    }
}
