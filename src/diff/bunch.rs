// In-memory reference bunches and the sorted bunch merge.

use std::collections::HashMap;
use std::collections::hash_map;

use crate::element::IdRefs;

/// Number of consecutive IDs sharing one index record.
pub const BUNCH_ID_WIDTH: i64 = 64;

#[inline]
pub fn bunch_id(id: i64) -> i64 {
    id / BUNCH_ID_WIDTH
}

/// All buffered references of one bunch, sorted by ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdRefBunch {
    pub id: i64,
    pub idrefs: Vec<IdRefs>,
}

impl IdRefBunch {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            idrefs: Vec::new(),
        }
    }

    /// Add `r` to the refs of `id`, creating the entry at its sorted
    /// position if needed. Returns false if the ref was already present.
    pub fn add(&mut self, id: i64, r: i64) -> bool {
        let idx = match self.idrefs.binary_search_by_key(&id, |e| e.id) {
            Ok(idx) => idx,
            Err(idx) => {
                self.idrefs.insert(idx, IdRefs::new(id));
                idx
            }
        };
        self.idrefs[idx].add(r)
    }
}

/// Buffer of bunches keyed by bunch ID, used during linear import.
#[derive(Debug, Default)]
pub struct IdRefBunches {
    bunches: HashMap<i64, IdRefBunch>,
    entries: usize,
}

impl IdRefBunches {
    pub fn with_capacity(bunches: usize) -> Self {
        Self {
            bunches: HashMap::with_capacity(bunches),
            entries: 0,
        }
    }

    pub fn add(&mut self, id: i64, r: i64) {
        let bid = bunch_id(id);
        let bunch = self
            .bunches
            .entry(bid)
            .or_insert_with(|| IdRefBunch::new(bid));
        if bunch.add(id, r) {
            self.entries += 1;
        }
    }

    /// Number of distinct buffered `(id, ref)` pairs.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.bunches.is_empty()
    }

    pub fn bunch_count(&self) -> usize {
        self.bunches.len()
    }

    pub fn get(&self, bunch_id: i64) -> Option<&IdRefBunch> {
        self.bunches.get(&bunch_id)
    }

    pub fn iter(&self) -> hash_map::Values<'_, i64, IdRefBunch> {
        self.bunches.values()
    }

    /// Empty the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.bunches.clear();
        self.entries = 0;
    }
}

/// Merge `new` into `old`.
///
/// Both inputs must be sorted by ID with sorted, duplicate-free refs; this
/// is not checked. For IDs in both, refs are united; a `new` entry with
/// empty refs removes the `old` entry. `new` entries without a match are
/// inserted in order unless their refs are empty.
pub fn merge_bunch(mut old: Vec<IdRefs>, new: &[IdRefs]) -> Vec<IdRefs> {
    let mut cursor = 0;
    for entry in new {
        while cursor < old.len() && old[cursor].id < entry.id {
            cursor += 1;
        }
        if cursor < old.len() && old[cursor].id == entry.id {
            if entry.refs.is_empty() {
                old.remove(cursor);
            } else {
                for &r in &entry.refs {
                    old[cursor].add(r);
                }
            }
        } else if !entry.refs.is_empty() {
            old.insert(cursor, entry.clone());
        }
    }
    old
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(id: i64, refs: &[i64]) -> IdRefs {
        IdRefs {
            id,
            refs: refs.to_vec(),
        }
    }

    #[test]
    fn merge_idrefs() {
        let mut bunch = merge_bunch(Vec::new(), &[e(50, &[1])]);
        assert_eq!(bunch, vec![e(50, &[1])]);

        // before
        bunch = merge_bunch(bunch, &[e(40, &[3])]);
        assert_eq!(bunch[0], e(40, &[3]));

        // after
        bunch = merge_bunch(bunch, &[e(70, &[4])]);
        assert_eq!(bunch[2], e(70, &[4]));

        // in between
        bunch = merge_bunch(bunch, &[e(60, &[5])]);
        assert_eq!(bunch[2], e(60, &[5]));

        // same id
        bunch = merge_bunch(bunch, &[e(50, &[0, 5])]);
        assert_eq!(bunch[1], e(50, &[0, 1, 5]));
        assert_eq!(bunch.len(), 4);

        // remove multiple
        bunch = merge_bunch(bunch, &[e(40, &[]), e(60, &[])]);
        assert_eq!(bunch, vec![e(50, &[0, 1, 5]), e(70, &[4])]);

        // removing unknown ids is a no-op
        bunch = merge_bunch(bunch, &[e(10, &[]), e(99, &[])]);
        assert_eq!(bunch.len(), 2);
    }

    #[test]
    fn merge_many_at_once() {
        let old = vec![e(2, &[20]), e(4, &[40]), e(6, &[60])];
        let new = vec![e(1, &[10]), e(4, &[41]), e(5, &[50]), e(7, &[70])];
        assert_eq!(
            merge_bunch(old, &new),
            vec![
                e(1, &[10]),
                e(2, &[20]),
                e(4, &[40, 41]),
                e(5, &[50]),
                e(6, &[60]),
                e(7, &[70]),
            ]
        );
    }

    #[test]
    fn idref_bunches() {
        let mut bunches = IdRefBunches::default();
        bunches.add(100, 999);
        assert_eq!(bunches.get(1).unwrap().idrefs[0], e(100, &[999]));

        // before
        bunches.add(99, 888);
        assert_eq!(bunches.get(1).unwrap().idrefs[0], e(99, &[888]));

        // after
        bunches.add(102, 777);
        assert_eq!(bunches.get(1).unwrap().idrefs[2], e(102, &[777]));

        // in between
        bunches.add(101, 666);
        assert_eq!(bunches.get(1).unwrap().idrefs[2], e(101, &[666]));

        // same id
        bunches.add(100, 998);
        assert_eq!(bunches.get(1).unwrap().idrefs[1], e(100, &[998, 999]));

        // duplicate
        bunches.add(100, 998);
        assert_eq!(bunches.get(1).unwrap().idrefs[1], e(100, &[998, 999]));

        assert_eq!(bunches.bunch_count(), 1);
        assert_eq!(bunches.len(), 5);

        bunches.add(5, 1);
        assert_eq!(bunches.bunch_count(), 2);
        bunches.clear();
        assert!(bunches.is_empty());
        assert_eq!(bunches.len(), 0);
    }

    #[test]
    fn bunch_ids() {
        assert_eq!(bunch_id(0), 0);
        assert_eq!(bunch_id(63), 0);
        assert_eq!(bunch_id(64), 1);
        assert_eq!(bunch_id(1 << 40), 1 << 34);
    }
}
