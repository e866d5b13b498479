//! Per-node sets of pending entry modifications.

use std::collections::BTreeMap;

use writebuf_pages::{HilbertEntry, NodeEntry, NodeKind, RectEntry, Srid};

use crate::key::{entry_key, EntryKey};

/// Bookkeeping bytes charged per stored modification, on top of the
/// entry payload.
pub const MOD_OVERHEAD_BYTES: u64 = 32;

/// The pending entry-level changes of one index node, ordered by
/// [`EntryKey`].
///
/// At most one modification exists per key: staging an entry whose key
/// is already present replaces the stored value. Every staging
/// operation reports the signed byte delta it caused, so the buffer
/// above can track its memory footprint; replacements cost the size
/// difference (possibly negative), fresh insertions cost the entry plus
/// [`MOD_OVERHEAD_BYTES`].
#[derive(Debug, Clone)]
pub struct ModificationSet {
    kind: NodeKind,
    srid: Srid,
    mods: BTreeMap<EntryKey, NodeEntry>,
}

impl ModificationSet {
    #[must_use]
    pub const fn new(kind: NodeKind, srid: Srid) -> Self {
        Self {
            kind,
            srid,
            mods: BTreeMap::new(),
        }
    }

    /// The node shape this set belongs to.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The reference system used for leaf curve positions.
    #[inline]
    #[must_use]
    pub const fn srid(&self) -> Srid {
        self.srid
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    /// Stage an insertion or update of `entry`, replacing any
    /// modification stored under the same key. Returns the byte delta.
    pub fn stage(&mut self, entry: NodeEntry) -> i64 {
        let key = entry_key(&entry, self.kind, self.srid);
        self.stage_keyed(key, entry)
    }

    /// Stage the removal of `entry`: its key is derived from the full
    /// entry (Hilbert leaf keys need the rectangle), then a pointer-only
    /// tombstone is stored under that key. Returns the byte delta.
    pub fn stage_removal(&mut self, entry: &NodeEntry) -> i64 {
        let key = entry_key(entry, self.kind, self.srid);
        let tombstone = match entry {
            NodeEntry::Rect(e) => NodeEntry::Rect(RectEntry::tombstone(e.pointer)),
            NodeEntry::Hilbert(e) => NodeEntry::Hilbert(HilbertEntry::tombstone(e.pointer, e.lhv)),
        };
        self.stage_keyed(key, tombstone)
    }

    fn stage_keyed(&mut self, key: EntryKey, entry: NodeEntry) -> i64 {
        let new_size = entry.byte_size() as i64;
        match self.mods.insert(key, entry) {
            Some(old) => new_size - old.byte_size() as i64,
            None => new_size + MOD_OVERHEAD_BYTES as i64,
        }
    }

    /// The stored modifications, smallest key first.
    pub fn iter(&self) -> impl Iterator<Item = (&EntryKey, &NodeEntry)> {
        self.mods.iter()
    }

    /// Drop the set, returning the bytes it had accumulated.
    #[must_use]
    pub fn destroy(self) -> u64 {
        self.mods
            .values()
            .map(|e| e.byte_size() as u64 + MOD_OVERHEAD_BYTES)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use writebuf_pages::{BoundingBox, RECT_ENTRY_BYTES};

    fn bbox(x: f64) -> BoundingBox {
        BoundingBox::new([x, x], [x + 1.0, x + 1.0])
    }

    fn entry(pointer: u32, x: f64) -> NodeEntry {
        RectEntry::new(pointer, bbox(x)).into()
    }

    #[test]
    fn staging_charges_entry_plus_overhead() {
        let mut set = ModificationSet::new(NodeKind::Rtree, Srid::WGS84);
        let delta = set.stage(entry(10, 0.0));
        assert_eq!(delta, RECT_ENTRY_BYTES as i64 + MOD_OVERHEAD_BYTES as i64);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn restaging_a_key_replaces_and_costs_the_difference() {
        let mut set = ModificationSet::new(NodeKind::Rtree, Srid::WGS84);
        set.stage(entry(10, 0.0));

        // Same pointer, new rectangle: same size, zero delta, one entry.
        assert_eq!(set.stage(entry(10, 3.0)), 0);
        assert_eq!(set.len(), 1);
        let (_, stored) = set.iter().next().unwrap();
        assert_eq!(stored.bbox().unwrap().min, [3.0, 3.0]);

        // Replacing a full entry with its tombstone shrinks the set.
        let delta = set.stage_removal(&entry(10, 3.0));
        assert_eq!(delta, 4 - RECT_ENTRY_BYTES as i64);
        assert_eq!(set.len(), 1);
        assert!(set.iter().next().unwrap().1.is_tombstone());
    }

    #[test]
    fn traversal_is_key_ordered() {
        let mut set = ModificationSet::new(NodeKind::Rtree, Srid::WGS84);
        for pointer in [30, 10, 20, 25] {
            set.stage(entry(pointer, f64::from(pointer)));
        }
        let pointers: Vec<u32> = set.iter().map(|(_, e)| e.pointer()).collect();
        assert_eq!(pointers, vec![10, 20, 25, 30]);
    }

    #[test]
    fn destroy_returns_the_accumulated_bytes() {
        let mut set = ModificationSet::new(NodeKind::Rtree, Srid::WGS84);
        let mut charged = 0i64;
        charged += set.stage(entry(1, 0.0));
        charged += set.stage(entry(2, 1.0));
        charged += set.stage_removal(&entry(3, 2.0));
        charged += set.stage(entry(1, 5.0)); // replacement, zero delta

        assert_eq!(set.destroy(), charged as u64);
    }
}
