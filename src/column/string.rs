// Paged string-lane column storage.
//
// Cells hold epoch-managed pointers: null means absent, otherwise the cell
// points at an immutable heap string. Writers swap the pointer and defer
// destruction of the replaced value; readers pin an epoch guard for the
// duration of the dereference, so a concurrent overwrite can never free a
// string out from under them.

use std::collections::HashSet;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam::epoch::{self, Atomic, Owned, Shared};

use crate::error::{MemrisError, Result};

const SMALL_IN_SCAN: usize = 8;

struct StringPage {
    cells: Box<[Atomic<String>]>,
}

impl StringPage {
    fn new(page_size: usize) -> Self {
        Self {
            cells: (0..page_size).map(|_| Atomic::null()).collect(),
        }
    }
}

/// Paged, lazily-allocated column of optional strings with a monotone
/// published watermark. Shares the publication contract of the primitive
/// lanes; only the cell representation differs.
pub struct StringColumn {
    pages: Box<[AtomicPtr<StringPage>]>,
    published: AtomicUsize,
    page_size: usize,
}

impl StringColumn {
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

    fn page(&self, page_no: usize) -> Option<&StringPage> {
        let ptr = self.pages[page_no].load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // Safety: installed pages are only freed in Drop.
            Some(unsafe { &*ptr })
        }
    }

    fn page_or_install(&self, page_no: usize) -> &StringPage {
        let slot = &self.pages[page_no];
        let current = slot.load(Ordering::Acquire);
        if !current.is_null() {
            // Safety: see `page`.
            return unsafe { &*current };
        }
        let fresh = Box::into_raw(Box::new(StringPage::new(self.page_size)));
        match slot.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                tracing::trace!(page = page_no, "installed string page");
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

    /// Read the cell, cloning the stored string. `None` means absent.
    pub fn get(&self, index: usize) -> Result<Option<String>> {
        self.check_bounds(index)?;
        let (page_no, offset) = self.locate(index);
        let Some(page) = self.page(page_no) else {
            return Ok(None);
        };
        let guard = epoch::pin();
        let shared = page.cells[offset].load(Ordering::Acquire, &guard);
        // Safety: the guard keeps a swapped-out string alive until unpinned.
        Ok(unsafe { shared.as_ref() }.cloned())
    }

    pub fn is_present(&self, index: usize) -> Result<bool> {
        self.check_bounds(index)?;
        let (page_no, offset) = self.locate(index);
        let Some(page) = self.page(page_no) else {
            return Ok(false);
        };
        let guard = epoch::pin();
        Ok(!page.cells[offset].load(Ordering::Acquire, &guard).is_null())
    }

    pub fn set(&self, index: usize, value: String) -> Result<()> {
        self.check_bounds(index)?;
        let (page_no, offset) = self.locate(index);
        let page = self.page_or_install(page_no);
        let guard = epoch::pin();
        let old = page.cells[offset].swap(Owned::new(value), Ordering::AcqRel, &guard);
        if !old.is_null() {
            // Safety: the old string is unreachable once every pinned
            // reader moves past this epoch.
            unsafe { guard.defer_destroy(old) };
        }
        Ok(())
    }

    pub fn set_null(&self, index: usize) -> Result<()> {
        self.check_bounds(index)?;
        let (page_no, offset) = self.locate(index);
        let page = self.page_or_install(page_no);
        let guard = epoch::pin();
        let old = page.cells[offset].swap(Shared::null(), Ordering::AcqRel, &guard);
        if !old.is_null() {
            // Safety: see `set`.
            unsafe { guard.defer_destroy(old) };
        }
        Ok(())
    }

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
        F: Fn(&str) -> bool,
    {
        let upper = self.published_count().min(limit).min(self.capacity());
        let mut out = Vec::new();
        let guard = epoch::pin();
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
                let shared = page.cells[offset].load(Ordering::Acquire, &guard);
                // Safety: the pinned guard keeps the string alive.
                if let Some(value) = unsafe { shared.as_ref() } {
                    if predicate(value) {
                        out.push((index + offset) as u32);
                    }
                }
            }
            index = page_end;
        }
        out
    }

    pub fn scan_eq(&self, target: &str, limit: usize) -> Vec<u32> {
        self.scan_matching(limit, |v| v == target)
    }

    pub fn scan_eq_ignore_case(&self, target: &str, limit: usize) -> Vec<u32> {
        self.scan_matching(limit, |v| v.eq_ignore_ascii_case(target))
    }

    pub fn scan_in(&self, targets: &[String], limit: usize) -> Vec<u32> {
        if targets.is_empty() {
            return Vec::new();
        }
        if targets.len() <= SMALL_IN_SCAN {
            self.scan_matching(limit, |v| targets.iter().any(|t| t == v))
        } else {
            let set: HashSet<&str> = targets.iter().map(|t| t.as_str()).collect();
            self.scan_matching(limit, |v| set.contains(v))
        }
    }
}

impl Drop for StringColumn {
    fn drop(&mut self) {
        // Safety: Drop has exclusive access; no guard can still reference
        // these cells.
        let guard = unsafe { epoch::unprotected() };
        for slot in self.pages.iter() {
            let ptr = slot.swap(ptr::null_mut(), Ordering::Relaxed);
            if ptr.is_null() {
                continue;
            }
            // Safety: exclusive access, pointer was installed from a Box.
            let page = unsafe { Box::from_raw(ptr) };
            for cell in page.cells.iter() {
                let shared = cell.load(Ordering::Relaxed, guard);
                if !shared.is_null() {
                    // Safety: no other reference to the string remains.
                    unsafe { drop(shared.into_owned()) };
                }
            }
        }
    }
}
