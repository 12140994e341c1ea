// Paged primitive column storage for the int and long lanes.
//
// Pages are allocated lazily and installed with a CAS; losers of the race
// free their page and reuse the winner's. Each cell pairs a lane value with
// a presence byte. Writers store the value relaxed and release the presence
// byte; the per-column `published` watermark is the happens-before edge for
// scan readers that never take the row seqlock.

use std::collections::HashSet;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicPtr, AtomicU8, AtomicUsize, Ordering};

use crate::error::{MemrisError, Result};

/// IN-lists at or below this size are probed linearly instead of through a
/// hash set.
const SMALL_IN_SCAN: usize = 8;

/// Atomic cell of a primitive storage lane.
pub trait LaneCell: Default + Send + Sync + 'static {
    type Value: Copy + Ord + Eq + std::hash::Hash + Default + Send + Sync + 'static;

    fn load(&self, order: Ordering) -> Self::Value;
    fn store(&self, value: Self::Value, order: Ordering);
}

impl LaneCell for AtomicI64 {
    type Value = i64;

    #[inline]
    fn load(&self, order: Ordering) -> i64 {
        AtomicI64::load(self, order)
    }

    #[inline]
    fn store(&self, value: i64, order: Ordering) {
        AtomicI64::store(self, value, order)
    }
}

impl LaneCell for AtomicI32 {
    type Value = i32;

    #[inline]
    fn load(&self, order: Ordering) -> i32 {
        AtomicI32::load(self, order)
    }

    #[inline]
    fn store(&self, value: i32, order: Ordering) {
        AtomicI32::store(self, value, order)
    }
}

struct Page<C: LaneCell> {
    values: Box<[C]>,
    present: Box<[AtomicU8]>,
}

impl<C: LaneCell> Page<C> {
    fn new(page_size: usize) -> Self {
        Self {
            values: (0..page_size).map(|_| C::default()).collect(),
            present: (0..page_size).map(|_| AtomicU8::new(0)).collect(),
        }
    }
}

/// Paged, lazily-allocated column of lane values with a monotone published
/// watermark. Rows `[0, published)` are safe for concurrent scan readers.
pub struct PageColumn<C: LaneCell> {
    pages: Box<[AtomicPtr<Page<C>>]>,
    published: AtomicUsize,
    page_size: usize,
}

pub type LongColumn = PageColumn<AtomicI64>;
pub type IntColumn = PageColumn<AtomicI32>;

impl<C: LaneCell> PageColumn<C> {
    pub fn new(page_size: usize, max_pages: usize, initial_pages: usize) -> Self {
        let pages = (0..max_pages)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let column = Self {
            pages,
            published: AtomicUsize::new(0),
            page_size,
        };
        for page_no in 0..initial_pages.min(max_pages) {
            column.page_or_install(page_no);
        }
        column
    }

    pub fn capacity(&self) -> usize {
        self.page_size * self.pages.len()
    }

    #[inline]
    fn check_bounds(&self, index: usize) -> Result<()> {
        if index >= self.capacity() {
            return Err(MemrisError::OutOfBounds {
                what: "row",
                index,
                limit: self.capacity(),
            });
        }
        Ok(())
    }

    #[inline]
    fn locate(&self, index: usize) -> (usize, usize) {
        (index / self.page_size, index % self.page_size)
    }

    fn page(&self, page_no: usize) -> Option<&Page<C>> {
        let ptr = self.pages[page_no].load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // Safety: installed pages are only freed in Drop, which takes
            // &mut self and therefore cannot race with this shared borrow.
            Some(unsafe { &*ptr })
        }
    }

    fn page_or_install(&self, page_no: usize) -> &Page<C> {
        let slot = &self.pages[page_no];
        let current = slot.load(Ordering::Acquire);
        if !current.is_null() {
            // Safety: see `page`.
            return unsafe { &*current };
        }
        let fresh = Box::into_raw(Box::new(Page::new(self.page_size)));
        match slot.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                tracing::trace!(page = page_no, "installed column page");
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

    /// Read the cell value. Absent cells read as the lane zero.
    pub fn get(&self, index: usize) -> Result<C::Value> {
        self.check_bounds(index)?;
        let (page_no, offset) = self.locate(index);
        match self.page(page_no) {
            Some(page) if page.present[offset].load(Ordering::Acquire) != 0 => {
                Ok(page.values[offset].load(Ordering::Relaxed))
            }
            _ => Ok(C::Value::default()),
        }
    }

    pub fn is_present(&self, index: usize) -> Result<bool> {
        self.check_bounds(index)?;
        let (page_no, offset) = self.locate(index);
        Ok(self
            .page(page_no)
            .is_some_and(|page| page.present[offset].load(Ordering::Acquire) != 0))
    }

    /// Write the cell. Writer exclusivity per row is the table seqlock's
    /// responsibility; concurrent writes to distinct indices are fine.
    pub fn set(&self, index: usize, value: C::Value) -> Result<()> {
        self.check_bounds(index)?;
        let (page_no, offset) = self.locate(index);
        let page = self.page_or_install(page_no);
        page.values[offset].store(value, Ordering::Relaxed);
        page.present[offset].store(1, Ordering::Release);
        Ok(())
    }

    pub fn set_null(&self, index: usize) -> Result<()> {
        self.check_bounds(index)?;
        let (page_no, offset) = self.locate(index);
        let page = self.page_or_install(page_no);
        page.present[offset].store(0, Ordering::Release);
        page.values[offset].store(C::Value::default(), Ordering::Relaxed);
        Ok(())
    }

    /// Monotonically raise the published watermark. Watermarks at or below
    /// the current value are a no-op.
    pub fn publish(&self, watermark: usize) {
        let mut current = self.published.load(Ordering::Relaxed);
        while watermark > current {
            match self.published.compare_exchange_weak(
                current,
                watermark,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }

    fn scan_matching<F>(&self, limit: usize, predicate: F) -> Vec<u32>
    where
        F: Fn(C::Value) -> bool,
    {
        let upper = self.published_count().min(limit).min(self.capacity());
        let mut out = Vec::new();
        let mut index = 0;
        for page_no in 0..self.pages.len() {
            if index >= upper {
                break;
            }
            let page_end = (index + self.page_size).min(upper);
            let Some(page) = self.page(page_no) else {
                index = page_end;
                continue;
            };
            for offset in 0..(page_end - index) {
                if page.present[offset].load(Ordering::Acquire) != 0
                    && predicate(page.values[offset].load(Ordering::Relaxed))
                {
                    out.push((index + offset) as u32);
                }
            }
            index = page_end;
        }
        out
    }

    pub fn scan_eq(&self, target: C::Value, limit: usize) -> Vec<u32> {
        self.scan_matching(limit, |v| v == target)
    }

    pub fn scan_lt(&self, target: C::Value, limit: usize) -> Vec<u32> {
        self.scan_matching(limit, |v| v < target)
    }

    pub fn scan_le(&self, target: C::Value, limit: usize) -> Vec<u32> {
        self.scan_matching(limit, |v| v <= target)
    }

    pub fn scan_gt(&self, target: C::Value, limit: usize) -> Vec<u32> {
        self.scan_matching(limit, |v| v > target)
    }

    pub fn scan_ge(&self, target: C::Value, limit: usize) -> Vec<u32> {
        self.scan_matching(limit, |v| v >= target)
    }

    /// Inclusive range scan.
    pub fn scan_between(&self, low: C::Value, high: C::Value, limit: usize) -> Vec<u32> {
        self.scan_matching(limit, |v| v >= low && v <= high)
    }

    pub fn scan_in(&self, targets: &[C::Value], limit: usize) -> Vec<u32> {
        if targets.is_empty() {
            return Vec::new();
        }
        if targets.len() <= SMALL_IN_SCAN {
            self.scan_matching(limit, |v| targets.contains(&v))
        } else {
            let set: HashSet<C::Value> = targets.iter().copied().collect();
            self.scan_matching(limit, |v| set.contains(&v))
        }
    }
}

impl<C: LaneCell> Drop for PageColumn<C> {
    fn drop(&mut self) {
        for slot in self.pages.iter() {
            let ptr = slot.swap(ptr::null_mut(), Ordering::Relaxed);
            if !ptr.is_null() {
                // Safety: Drop has exclusive access; no reader can hold a
                // page reference past the column's lifetime.
                unsafe { drop(Box::from_raw(ptr)) };
            }
        }
    }
}
