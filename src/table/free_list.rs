// Lock-free free-list of reusable row slots.
//
// A Treiber stack: push and pop swing the head pointer with CAS, backing
// off under contention. Popped nodes are handed to epoch-based reclamation
// so a concurrent pop can still dereference them safely. The size counter
// is approximate, maintained with relaxed increments.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::epoch::{self, Atomic, Owned};

use super::Backoff;

struct FreeNode {
    row: u32,
    next: Atomic<FreeNode>,
}

pub struct FreeList {
    head: Atomic<FreeNode>,
    size: AtomicUsize,
}

impl FreeList {
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
            size: AtomicUsize::new(0),
        }
    }

    /// Push a recycled row index. Lock-free; always succeeds.
    pub fn push(&self, row: u32) {
        let guard = epoch::pin();
        let mut node = Owned::new(FreeNode {
            row,
            next: Atomic::null(),
        });
        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            node.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                node,
                Ordering::Release,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => {
                    self.size.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(failure) => {
                    node = failure.new;
                    backoff.spin();
                }
            }
        }
    }

    /// Pop the most recently pushed row index, or `None` when empty.
    pub fn pop(&self) -> Option<u32> {
        let guard = epoch::pin();
        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            // Safety: the pinned guard protects the node from reclamation.
            let node = unsafe { head.as_ref() }?;
            let next = node.next.load(Ordering::Acquire, &guard);
            match self.head.compare_exchange_weak(
                head,
                next,
                Ordering::Release,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => {
                    self.size.fetch_sub(1, Ordering::Relaxed);
                    let row = node.row;
                    // Safety: the node is unlinked; free it once all
                    // pinned readers move on.
                    unsafe { guard.defer_destroy(head) };
                    return Some(row);
                }
                Err(_) => backoff.spin(),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }

    /// Approximate number of entries.
    pub fn approximate_len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FreeList {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lifo_order() {
        let list = FreeList::new();
        assert!(list.is_empty());
        assert_eq!(list.pop(), None);

        list.push(1);
        list.push(2);
        list.push(3);
        assert_eq!(list.approximate_len(), 3);

        assert_eq!(list.pop(), Some(3));
        assert_eq!(list.pop(), Some(2));
        assert_eq!(list.pop(), Some(1));
        assert_eq!(list.pop(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_concurrent_push_pop_conserves_entries() {
        let list = Arc::new(FreeList::new());
        let mut handles = vec![];

        for t in 0..4u32 {
            let l = list.clone();
            handles.push(thread::spawn(move || {
                for i in 0..1_000 {
                    l.push(t * 1_000 + i);
                }
            }));
        }

        let mut poppers = vec![];
        for _ in 0..4 {
            let l = list.clone();
            poppers.push(thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..1_000 {
                    loop {
                        if let Some(row) = l.pop() {
                            seen.push(row);
                            break;
                        }
                        thread::yield_now();
                    }
                }
                seen
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        let mut all = HashSet::new();
        for popper in poppers {
            for row in popper.join().unwrap() {
                // No entry may be popped twice.
                assert!(all.insert(row));
            }
        }
        assert_eq!(all.len(), 4_000);
        assert!(list.is_empty());
    }
}
