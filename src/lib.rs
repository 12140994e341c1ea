// Memris-core - in-memory column-oriented table engine
// Core library module
//
// The engine stores entities in paged, lazily-allocated columns with a
// per-row seqlock for read/write atomicity, generational row references
// for stale-reference detection, a lock-free free-list for slot reuse, and
// a concurrent primary-key index. Scans push predicates down to the owning
// column and return sorted selections of packed references.

pub mod column;
pub mod encoding;
pub mod error;
pub mod exec;
pub mod refs;
pub mod selection;
pub mod table;
pub mod types;

pub use error::{MemrisError, Result};
pub use refs::{RowRef, NONE_REF};
pub use selection::Selection;
pub use table::typed::TypedTable;
pub use types::{FieldMetadata, Lane, TableMetadata, TypeCode, Value};

/// Maximum rows per page. Page offsets must fit in 16 bits.
pub const MAX_PAGE_SIZE: usize = 65_535;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub page_size: usize,
    pub max_pages: usize,
    pub initial_pages: usize,
    pub specialization: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 1024,
            max_pages: 1024,
            initial_pages: 1,
            specialization: true,
        }
    }
}

impl EngineConfig {
    /// Total row capacity implied by the paging parameters.
    pub fn capacity(&self) -> usize {
        self.page_size * self.max_pages
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(MemrisError::ArgumentShape(format!(
                "page_size must be in 1..={MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.max_pages == 0 {
            return Err(MemrisError::ArgumentShape(
                "max_pages must be positive".to_string(),
            ));
        }
        if self
            .page_size
            .checked_mul(self.max_pages)
            .is_none_or(|capacity| capacity > i32::MAX as usize)
        {
            return Err(MemrisError::ArgumentShape(format!(
                "page_size * max_pages must not exceed {}",
                i32::MAX
            )));
        }
        if self.initial_pages == 0 || self.initial_pages > self.max_pages {
            return Err(MemrisError::ArgumentShape(format!(
                "initial_pages must be in 1..={}, got {}",
                self.max_pages, self.initial_pages
            )));
        }
        Ok(())
    }
}
