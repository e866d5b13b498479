//! Index nodes: the page-sized unit the write buffer operates on.
//!
//! One tagged type covers the three concrete node shapes of the
//! supported index families. The capability surface is deliberately
//! small: append, positional overwrite, entry access, cloning, in-place
//! copy, and serialized size: everything the buffering and merge
//! machinery needs, and nothing of the tree algorithms themselves.

use crate::entry::{HilbertEntry, NodeEntry, RectEntry};

/// Shape of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// R-tree or R*-tree node (leaf or internal).
    Rtree,
    /// Hilbert R-tree leaf node.
    HilbertLeaf,
    /// Hilbert R-tree internal node.
    HilbertInternal,
}

/// One index node.
///
/// R-tree nodes and Hilbert leaves hold plain rectangle entries; Hilbert
/// internal nodes hold entries augmented with the largest Hilbert value
/// of their subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexNode {
    Rtree(Vec<RectEntry>),
    HilbertLeaf(Vec<RectEntry>),
    HilbertInternal(Vec<HilbertEntry>),
}

impl IndexNode {
    /// An empty node of `kind` with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(kind: NodeKind, capacity: usize) -> Self {
        match kind {
            NodeKind::Rtree => Self::Rtree(Vec::with_capacity(capacity)),
            NodeKind::HilbertLeaf => Self::HilbertLeaf(Vec::with_capacity(capacity)),
            NodeKind::HilbertInternal => Self::HilbertInternal(Vec::with_capacity(capacity)),
        }
    }

    /// An empty node of `kind`.
    #[must_use]
    pub fn empty(kind: NodeKind) -> Self {
        Self::with_capacity(kind, 0)
    }

    /// The node's shape.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Rtree(_) => NodeKind::Rtree,
            Self::HilbertLeaf(_) => NodeKind::HilbertLeaf,
            Self::HilbertInternal(_) => NodeKind::HilbertInternal,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Rtree(v) | Self::HilbertLeaf(v) => v.len(),
            Self::HilbertInternal(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry at `position`, if any.
    #[must_use]
    pub fn entry_at(&self, position: usize) -> Option<NodeEntry> {
        match self {
            Self::Rtree(v) | Self::HilbertLeaf(v) => {
                v.get(position).copied().map(NodeEntry::Rect)
            }
            Self::HilbertInternal(v) => v.get(position).copied().map(NodeEntry::Hilbert),
        }
    }

    /// The pointer of the entry at `position`, if any.
    #[must_use]
    pub fn pointer_at(&self, position: usize) -> Option<u32> {
        match self {
            Self::Rtree(v) | Self::HilbertLeaf(v) => v.get(position).map(|e| e.pointer),
            Self::HilbertInternal(v) => v.get(position).map(|e| e.pointer),
        }
    }

    /// Iterate over the entries in storage order.
    pub fn entries(&self) -> impl Iterator<Item = NodeEntry> + '_ {
        (0..self.len()).filter_map(|i| self.entry_at(i))
    }

    /// Append `entry`. Tombstones and shape mismatches are rejected and
    /// return `false`.
    pub fn push_entry(&mut self, entry: &NodeEntry) -> bool {
        if entry.is_tombstone() {
            return false;
        }
        match (self, entry) {
            (Self::Rtree(v) | Self::HilbertLeaf(v), NodeEntry::Rect(e)) => {
                v.push(*e);
                true
            }
            (Self::HilbertInternal(v), NodeEntry::Hilbert(e)) => {
                v.push(*e);
                true
            }
            _ => false,
        }
    }

    /// Overwrite the entry at `position`. Tombstones, shape mismatches,
    /// and out-of-range positions are rejected and return `false`.
    pub fn set_entry(&mut self, position: usize, entry: &NodeEntry) -> bool {
        if entry.is_tombstone() {
            return false;
        }
        match (self, entry) {
            (Self::Rtree(v) | Self::HilbertLeaf(v), NodeEntry::Rect(e)) => {
                match v.get_mut(position) {
                    Some(slot) => {
                        *slot = *e;
                        true
                    }
                    None => false,
                }
            }
            (Self::HilbertInternal(v), NodeEntry::Hilbert(e)) => match v.get_mut(position) {
                Some(slot) => {
                    *slot = *e;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Copy `source` into this node, reusing the existing allocation
    /// where the shapes match.
    pub fn copy_from(&mut self, source: &Self) {
        match (self, source) {
            (Self::Rtree(dst), Self::Rtree(src))
            | (Self::HilbertLeaf(dst), Self::HilbertLeaf(src)) => dst.clone_from(src),
            (Self::HilbertInternal(dst), Self::HilbertInternal(src)) => dst.clone_from(src),
            (dst, src) => *dst = src.clone(),
        }
    }

    /// Serialized byte size of the node: the header plus every entry.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        let entries: usize = match self {
            Self::Rtree(v) | Self::HilbertLeaf(v) => v.iter().map(RectEntry::byte_size).sum(),
            Self::HilbertInternal(v) => v.iter().map(HilbertEntry::byte_size).sum(),
        };
        crate::codec::HEADER_BYTES + entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BoundingBox;
    use crate::hilbert::HilbertValue;

    fn bbox(x: f64) -> BoundingBox {
        BoundingBox::new([x, x], [x + 1.0, x + 1.0])
    }

    #[test]
    fn append_and_read_back() {
        let mut node = IndexNode::empty(NodeKind::Rtree);
        assert!(node.push_entry(&RectEntry::new(10, bbox(0.0)).into()));
        assert!(node.push_entry(&RectEntry::new(20, bbox(1.0)).into()));

        assert_eq!(node.len(), 2);
        assert_eq!(node.pointer_at(0), Some(10));
        assert_eq!(node.pointer_at(1), Some(20));
        assert_eq!(node.pointer_at(2), None);
        assert_eq!(node.entry_at(0).unwrap().pointer(), 10);
    }

    #[test]
    fn append_rejects_tombstones_and_wrong_shapes() {
        let mut node = IndexNode::empty(NodeKind::Rtree);
        assert!(!node.push_entry(&RectEntry::tombstone(5).into()));
        assert!(!node.push_entry(&HilbertEntry::new(5, bbox(0.0), HilbertValue(1)).into()));
        assert!(node.is_empty());

        let mut internal = IndexNode::empty(NodeKind::HilbertInternal);
        assert!(!internal.push_entry(&RectEntry::new(5, bbox(0.0)).into()));
        assert!(internal.push_entry(&HilbertEntry::new(5, bbox(0.0), HilbertValue(1)).into()));
    }

    #[test]
    fn set_entry_overwrites_in_place() {
        let mut node = IndexNode::empty(NodeKind::HilbertLeaf);
        node.push_entry(&RectEntry::new(1, bbox(0.0)).into());

        assert!(node.set_entry(0, &RectEntry::new(2, bbox(5.0)).into()));
        assert_eq!(node.pointer_at(0), Some(2));
        assert!(!node.set_entry(3, &RectEntry::new(9, bbox(0.0)).into()));
        assert!(!node.set_entry(0, &RectEntry::tombstone(9).into()));
        assert_eq!(node.len(), 1);
    }

    #[test]
    fn copy_from_keeps_the_destination_usable() {
        let mut src = IndexNode::empty(NodeKind::Rtree);
        src.push_entry(&RectEntry::new(1, bbox(0.0)).into());
        src.push_entry(&RectEntry::new(2, bbox(1.0)).into());

        let mut dst = IndexNode::empty(NodeKind::Rtree);
        dst.push_entry(&RectEntry::new(9, bbox(9.0)).into());
        dst.copy_from(&src);
        assert_eq!(dst, src);

        // Shape changes fall back to a full replacement.
        let mut other = IndexNode::empty(NodeKind::HilbertInternal);
        other.copy_from(&src);
        assert_eq!(other, src);
    }

    #[test]
    fn byte_size_counts_header_and_entries() {
        let mut node = IndexNode::empty(NodeKind::Rtree);
        assert_eq!(node.byte_size(), 5);
        node.push_entry(&RectEntry::new(1, bbox(0.0)).into());
        assert_eq!(node.byte_size(), 5 + 36);

        let mut internal = IndexNode::empty(NodeKind::HilbertInternal);
        internal.push_entry(&HilbertEntry::new(1, bbox(0.0), HilbertValue(3)).into());
        assert_eq!(internal.byte_size(), 5 + 44);
    }
}
