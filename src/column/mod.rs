// Column storage module
//
// Paged, lazily-allocated columns with a monotone published watermark and
// predicate push-down scans. Primitive lanes store i32/i64 cells behind
// plain atomics; the string lane stores epoch-managed heap values. Cross
// cell consistency is the table seqlock's job, not the column's.

pub mod primitive;
pub mod string;

pub use primitive::{IntColumn, LaneCell, LongColumn, PageColumn};
pub use string::StringColumn;

use crate::error::Result;
use crate::types::Lane;

/// One physical column, dispatched by storage lane.
pub enum ColumnStorage {
    Long(LongColumn),
    Int(IntColumn),
    Str(StringColumn),
}

impl ColumnStorage {
    pub fn for_lane(lane: Lane, page_size: usize, max_pages: usize, initial_pages: usize) -> Self {
        match lane {
            Lane::Long => ColumnStorage::Long(LongColumn::new(page_size, max_pages, initial_pages)),
            Lane::Int => ColumnStorage::Int(IntColumn::new(page_size, max_pages, initial_pages)),
            Lane::Str => ColumnStorage::Str(StringColumn::new(page_size, max_pages, initial_pages)),
        }
    }

    pub fn lane(&self) -> Lane {
        match self {
            ColumnStorage::Long(_) => Lane::Long,
            ColumnStorage::Int(_) => Lane::Int,
            ColumnStorage::Str(_) => Lane::Str,
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            ColumnStorage::Long(c) => c.capacity(),
            ColumnStorage::Int(c) => c.capacity(),
            ColumnStorage::Str(c) => c.capacity(),
        }
    }

    pub fn is_present(&self, index: usize) -> Result<bool> {
        match self {
            ColumnStorage::Long(c) => c.is_present(index),
            ColumnStorage::Int(c) => c.is_present(index),
            ColumnStorage::Str(c) => c.is_present(index),
        }
    }

    pub fn set_null(&self, index: usize) -> Result<()> {
        match self {
            ColumnStorage::Long(c) => c.set_null(index),
            ColumnStorage::Int(c) => c.set_null(index),
            ColumnStorage::Str(c) => c.set_null(index),
        }
    }

    pub fn publish(&self, watermark: usize) {
        match self {
            ColumnStorage::Long(c) => c.publish(watermark),
            ColumnStorage::Int(c) => c.publish(watermark),
            ColumnStorage::Str(c) => c.publish(watermark),
        }
    }

    pub fn published_count(&self) -> usize {
        match self {
            ColumnStorage::Long(c) => c.published_count(),
            ColumnStorage::Int(c) => c.published_count(),
            ColumnStorage::Str(c) => c.published_count(),
        }
    }

    pub fn as_long(&self) -> Option<&LongColumn> {
        match self {
            ColumnStorage::Long(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&IntColumn> {
        match self {
            ColumnStorage::Int(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&StringColumn> {
        match self {
            ColumnStorage::Str(c) => Some(c),
            _ => None,
        }
    }
}
