//! External index-handle contract (spec.md §6 "Index handle (external)") and
//! one concrete in-memory implementation used to exercise the index-scan,
//! delete and update executors. This is explicitly NOT the on-disk B+-tree
//! format described in spec.md §6 — that format is out of scope.

use crate::record::Rid;
use anyhow::Result;
use std::collections::BTreeMap;
use std::ops::Bound;
use parking_lot::Mutex;

/// A semi-open range endpoint over the ordered key space, directly usable
/// with `BTreeMap::range`. `lower_bound`/`upper_bound`/`leaf_begin`/
/// `leaf_end` from spec.md §6 all reduce to one of these three variants.
pub type KeyBound = Bound<Vec<u8>>;

pub fn leaf_begin() -> KeyBound {
    Bound::Unbounded
}

pub fn leaf_end() -> KeyBound {
    Bound::Unbounded
}

pub fn lower_bound(key: &[u8]) -> KeyBound {
    Bound::Included(key.to_vec())
}

pub fn upper_bound(key: &[u8]) -> KeyBound {
    Bound::Excluded(key.to_vec())
}

/// Ordered key -> rid map backing a secondary index. Keys are the packed
/// concatenation of the indexed columns' byte slices (spec.md §3 "Index
/// meta"), compared lexicographically.
pub trait IndexHandle: Send + Sync {
    fn insert_entry(&self, key: &[u8], rid: Rid) -> Result<()>;
    fn delete_entry(&self, key: &[u8]) -> Result<()>;
    /// All entries with key in `[lower, upper)`, in key order.
    fn scan(&self, lower: KeyBound, upper: KeyBound) -> Vec<(Vec<u8>, Rid)>;
}

/// `BTreeMap`-backed index, keyed by the packed composite key. One rid per
/// key (spec.md's `delete_entry(key, txn)` takes no rid, implying a
/// single-valued mapping per distinct key).
#[derive(Default)]
pub struct MemIndex {
    entries: Mutex<BTreeMap<Vec<u8>, Rid>>,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexHandle for MemIndex {
    fn insert_entry(&self, key: &[u8], rid: Rid) -> Result<()> {
        self.entries.lock().insert(key.to_vec(), rid);
        Ok(())
    }

    fn delete_entry(&self, key: &[u8]) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn scan(&self, lower: KeyBound, upper: KeyBound) -> Vec<(Vec<u8>, Rid)> {
        self.entries
            .lock()
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_lookup_on_missing_key_is_empty() {
        let idx = MemIndex::new();
        idx.insert_entry(b"a", Rid::new(1, 0)).unwrap();
        let found = idx.scan(lower_bound(b"zzz"), upper_bound(b"zzz"));
        assert!(found.is_empty());
    }

    #[test]
    fn range_scan_respects_semi_open_bounds() {
        let idx = MemIndex::new();
        for (k, p) in [(b"a", 1), (b"b", 2), (b"c", 3)] {
            idx.insert_entry(k, Rid::new(p, 0)).unwrap();
        }
        let found = idx.scan(lower_bound(b"a"), upper_bound(b"b"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, b"a");
    }

    #[test]
    fn delete_then_reinsert_same_key() {
        let idx = MemIndex::new();
        idx.insert_entry(b"k", Rid::new(1, 0)).unwrap();
        idx.delete_entry(b"k").unwrap();
        assert!(idx.scan(leaf_begin(), leaf_end()).is_empty());
        idx.insert_entry(b"k", Rid::new(2, 0)).unwrap();
        assert_eq!(idx.scan(leaf_begin(), leaf_end())[0].1, Rid::new(2, 0));
    }
}
