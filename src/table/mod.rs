// Table substrate module
//
// Row lifecycle (allocation, generational tagging, tombstoning, reuse),
// per-row seqlock coordination, the free-list of recycled row slots, the
// primary-key index, and the typed table that composes them with column
// storage.

pub mod free_list;
pub mod pk_index;
pub mod row_meta;
pub mod substrate;
pub mod typed;

pub use free_list::FreeList;
pub use pk_index::{PkEntry, PkIndex};
pub use row_meta::RowMetaPages;
pub use substrate::{TableSubstrate, WriteTicket};
pub use typed::TypedTable;

use std::time::Duration;

/// Staged backoff for CAS retry and seqlock spin loops: brief busy-spins
/// first, then scheduler yields, then 1 ns sleeps.
pub(crate) struct Backoff {
    attempts: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 10;
    const YIELD_LIMIT: u32 = 20;

    pub fn new() -> Self {
        Self { attempts: 0 }
    }

    pub fn spin(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts <= Self::SPIN_LIMIT {
            for _ in 0..(1 << self.attempts.min(6)) {
                std::hint::spin_loop();
            }
        } else if self.attempts <= Self::YIELD_LIMIT {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_nanos(1));
        }
    }

    #[allow(dead_code)]
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
