// Primary-key index: concurrent map from key to (row index, generation).
//
// Exact-put semantics: re-inserting a key replaces the mapping. Lookups
// return the stored pair; callers re-validate tombstone and generation
// against the table before trusting it. Removal is generation-checked so a
// stale tombstone can never evict a reborn row's fresh mapping.

use dashmap::DashMap;

use crate::types::Lane;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PkEntry {
    pub row: u32,
    pub generation: u64,
}

/// Key lane is fixed by the schema's id field: integer keys widen to i64,
/// string keys use the string lane.
pub enum PkIndex {
    Long(DashMap<i64, PkEntry>),
    Str(DashMap<String, PkEntry>),
}

impl PkIndex {
    pub fn for_lane(lane: Lane) -> Self {
        match lane {
            Lane::Str => PkIndex::Str(DashMap::new()),
            Lane::Long | Lane::Int => PkIndex::Long(DashMap::new()),
        }
    }

    pub fn is_string_keyed(&self) -> bool {
        matches!(self, PkIndex::Str(_))
    }

    pub fn len(&self) -> usize {
        match self {
            PkIndex::Long(map) => map.len(),
            PkIndex::Str(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn put_long(&self, key: i64, entry: PkEntry) {
        debug_assert!(!self.is_string_keyed());
        if let PkIndex::Long(map) = self {
            map.insert(key, entry);
        }
    }

    pub fn put_str(&self, key: String, entry: PkEntry) {
        debug_assert!(self.is_string_keyed());
        if let PkIndex::Str(map) = self {
            map.insert(key, entry);
        }
    }

    pub fn get_long(&self, key: i64) -> Option<PkEntry> {
        match self {
            PkIndex::Long(map) => map.get(&key).map(|entry| *entry),
            PkIndex::Str(_) => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<PkEntry> {
        match self {
            PkIndex::Str(map) => map.get(key).map(|entry| *entry),
            PkIndex::Long(_) => None,
        }
    }

    /// Remove the mapping only while it still points at the given row and
    /// generation. Removing an absent key is a no-op.
    pub fn remove_long_if(&self, key: i64, row: u32, generation: u64) {
        if let PkIndex::Long(map) = self {
            map.remove_if(&key, |_, entry| {
                entry.row == row && entry.generation == generation
            });
        }
    }

    pub fn remove_str_if(&self, key: &str, row: u32, generation: u64) {
        if let PkIndex::Str(map) = self {
            map.remove_if(key, |_, entry| {
                entry.row == row && entry.generation == generation
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let index = PkIndex::for_lane(Lane::Long);
        index.put_long(1, PkEntry { row: 0, generation: 1 });
        assert_eq!(index.get_long(1), Some(PkEntry { row: 0, generation: 1 }));
        assert_eq!(index.get_long(2), None);
    }

    #[test]
    fn test_last_writer_wins() {
        let index = PkIndex::for_lane(Lane::Long);
        index.put_long(1, PkEntry { row: 0, generation: 1 });
        index.put_long(1, PkEntry { row: 5, generation: 3 });
        assert_eq!(index.get_long(1), Some(PkEntry { row: 5, generation: 3 }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_generation_checked_removal() {
        let index = PkIndex::for_lane(Lane::Long);
        index.put_long(1, PkEntry { row: 0, generation: 2 });

        // Stale removal attempt leaves the fresh mapping in place.
        index.remove_long_if(1, 0, 1);
        assert!(index.get_long(1).is_some());

        index.remove_long_if(1, 0, 2);
        assert_eq!(index.get_long(1), None);

        // Removing an absent key is a no-op.
        index.remove_long_if(1, 0, 2);
    }

    #[test]
    fn test_string_lane() {
        let index = PkIndex::for_lane(Lane::Str);
        assert!(index.is_string_keyed());
        index.put_str("alpha".to_string(), PkEntry { row: 3, generation: 7 });
        assert_eq!(index.get_str("alpha"), Some(PkEntry { row: 3, generation: 7 }));
        index.remove_str_if("alpha", 3, 7);
        assert!(index.is_empty());
    }

    #[test]
    fn test_int_lane_widens_to_long_keys() {
        let index = PkIndex::for_lane(Lane::Int);
        index.put_long(42, PkEntry { row: 1, generation: 1 });
        assert!(index.get_long(42).is_some());
    }
}
