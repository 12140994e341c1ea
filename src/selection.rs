// Immutable sorted sets of packed row references with boolean algebra.
//
// A selection is the materialized result of a scan. Inputs are normalized
// (sorted, deduplicated) at construction and never rejected; all set
// operations are linear merges over the sorted representation.

use once_cell::sync::Lazy;

use crate::refs::{self, RowRef};

static EMPTY: Lazy<Selection> = Lazy::new(|| Selection { refs: Vec::new() });

/// An immutable, strictly ascending set of packed references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    refs: Vec<RowRef>,
}

impl Selection {
    /// The distinguished empty selection.
    pub fn empty() -> Selection {
        EMPTY.clone()
    }

    /// Build a selection from arbitrary input, normalizing order and
    /// duplicates.
    pub fn new(mut refs: Vec<RowRef>) -> Selection {
        refs.sort_unstable();
        refs.dedup();
        Selection { refs }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Membership test by binary search.
    pub fn contains(&self, reference: RowRef) -> bool {
        self.refs.binary_search(&reference).is_ok()
    }

    pub fn union(&self, other: &Selection) -> Selection {
        let (a, b) = (&self.refs, &other.refs);
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    out.push(a[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(b[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&a[i..]);
        out.extend_from_slice(&b[j..]);
        Selection { refs: out }
    }

    pub fn intersect(&self, other: &Selection) -> Selection {
        let (a, b) = (&self.refs, &other.refs);
        let mut out = Vec::with_capacity(a.len().min(b.len()));
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        Selection { refs: out }
    }

    pub fn subtract(&self, other: &Selection) -> Selection {
        let (a, b) = (&self.refs, &other.refs);
        let mut out = Vec::with_capacity(a.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    out.push(a[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&a[i..]);
        Selection { refs: out }
    }

    pub fn as_refs(&self) -> &[RowRef] {
        &self.refs
    }

    pub fn to_ref_array(&self) -> Vec<RowRef> {
        self.refs.clone()
    }

    pub fn to_index_array(&self) -> Vec<u32> {
        self.refs.iter().map(|&r| refs::row_index(r)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef> + '_ {
        self.refs.iter().copied()
    }
}
