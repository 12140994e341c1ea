// Per-row metadata pages: generation, tombstone flag, and seqlock counter.
//
// Pages parallel the column pages and are installed lazily with the same
// CAS discipline. All cells are plain atomics; a missing page reads as
// generation 0 (uninitialized), not tombstoned, seqlock stable.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering};

struct MetaPage {
    generation: Box<[AtomicU64]>,
    tombstone: Box<[AtomicU32]>,
    seqlock: Box<[AtomicU64]>,
}

impl MetaPage {
    fn new(page_size: usize) -> Self {
        Self {
            generation: (0..page_size).map(|_| AtomicU64::new(0)).collect(),
            tombstone: (0..page_size).map(|_| AtomicU32::new(0)).collect(),
            seqlock: (0..page_size).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

/// Lazily paged row-meta storage. Callers validate row bounds; indices
/// passed here must be below `capacity()`.
pub struct RowMetaPages {
    pages: Box<[AtomicPtr<MetaPage>]>,
    page_size: usize,
}

impl RowMetaPages {
    pub fn new(page_size: usize, max_pages: usize, initial_pages: usize) -> Self {
        let pages = (0..max_pages)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let meta = Self { pages, page_size };
        for page_no in 0..initial_pages.min(max_pages) {
            meta.page_or_install(page_no);
        }
        meta
    }

    pub fn capacity(&self) -> usize {
        self.page_size * self.pages.len()
    }

    #[inline]
    fn locate(&self, row: usize) -> (usize, usize) {
        debug_assert!(row < self.capacity());
        (row / self.page_size, row % self.page_size)
    }

    fn page(&self, page_no: usize) -> Option<&MetaPage> {
        let ptr = self.pages[page_no].load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // Safety: installed pages are only freed in Drop.
            Some(unsafe { &*ptr })
        }
    }

    fn page_or_install(&self, page_no: usize) -> &MetaPage {
        let slot = &self.pages[page_no];
        let current = slot.load(Ordering::Acquire);
        if !current.is_null() {
            // Safety: see `page`.
            return unsafe { &*current };
        }
        let fresh = Box::into_raw(Box::new(MetaPage::new(self.page_size)));
        match slot.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                tracing::trace!(page = page_no, "installed row-meta page");
                // Safety: we just installed this pointer.
                unsafe { &*fresh }
            }
            Err(winner) => {
                // Safety: the CAS failed, so `fresh` was never shared.
                unsafe { drop(Box::from_raw(fresh)) };
                // Safety: see `page`.
                unsafe { &*winner }
            }
        }
    }

    pub fn generation(&self, row: usize) -> u64 {
        let (page_no, offset) = self.locate(row);
        self.page(page_no)
            .map_or(0, |page| page.generation[offset].load(Ordering::Acquire))
    }

    pub fn set_generation(&self, row: usize, generation: u64) {
        let (page_no, offset) = self.locate(row);
        self.page_or_install(page_no).generation[offset].store(generation, Ordering::Release);
    }

    pub fn is_tombstoned(&self, row: usize) -> bool {
        let (page_no, offset) = self.locate(row);
        self.page(page_no)
            .is_some_and(|page| page.tombstone[offset].load(Ordering::Acquire) != 0)
    }

    pub fn clear_tombstone(&self, row: usize) {
        let (page_no, offset) = self.locate(row);
        self.page_or_install(page_no).tombstone[offset].store(0, Ordering::Release);
    }

    /// CAS the tombstone flag 0 -> 1. Returns true only for the caller
    /// that performed the flip.
    pub fn try_set_tombstone(&self, row: usize) -> bool {
        let (page_no, offset) = self.locate(row);
        self.page_or_install(page_no).tombstone[offset]
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The seqlock cell for a row, installing its page on first touch.
    pub fn seqlock_cell(&self, row: usize) -> &AtomicU64 {
        let (page_no, offset) = self.locate(row);
        &self.page_or_install(page_no).seqlock[offset]
    }

    pub fn seqlock_value(&self, row: usize) -> u64 {
        let (page_no, offset) = self.locate(row);
        self.page(page_no)
            .map_or(0, |page| page.seqlock[offset].load(Ordering::Acquire))
    }
}

impl Drop for RowMetaPages {
    fn drop(&mut self) {
        for slot in self.pages.iter() {
            let ptr = slot.swap(ptr::null_mut(), Ordering::Relaxed);
            if !ptr.is_null() {
                // Safety: Drop has exclusive access.
                unsafe { drop(Box::from_raw(ptr)) };
            }
        }
    }
}
