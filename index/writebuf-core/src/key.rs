//! Ordering keys for buffered modifications.

use writebuf_pages::{hilbert_value, HilbertValue, NodeEntry, NodeKind, Srid};

/// Total order over the entries of one node.
///
/// R-tree and R*-tree entries order by pointer alone. Hilbert entries
/// order by curve position first and break ties by pointer, so two
/// entries are the same key only when both coincide. A set never mixes
/// the two variants; the node kind fixes which one is in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryKey {
    /// Pointer order.
    Pointer(u32),
    /// `(curve position, pointer)` order.
    Curve { value: HilbertValue, pointer: u32 },
}

/// The ordering key of `entry` within a node of `kind`.
///
/// Hilbert leaf entries compute their curve position from the rectangle
/// here, at key-derivation time; internal entries use their stored
/// largest Hilbert value.
#[must_use]
pub fn entry_key(entry: &NodeEntry, kind: NodeKind, srid: Srid) -> EntryKey {
    match kind {
        NodeKind::Rtree => EntryKey::Pointer(entry.pointer()),
        NodeKind::HilbertLeaf => {
            debug_assert!(
                entry.bbox().is_some(),
                "hilbert leaf keys need the rectangle; derive the key before stripping it"
            );
            let value = entry
                .bbox()
                .map_or_else(HilbertValue::default, |b| hilbert_value(b, srid));
            EntryKey::Curve {
                value,
                pointer: entry.pointer(),
            }
        }
        NodeKind::HilbertInternal => {
            let value = match entry {
                NodeEntry::Hilbert(e) => e.lhv,
                NodeEntry::Rect(_) => {
                    debug_assert!(false, "rect entry in a hilbert internal node");
                    HilbertValue::default()
                }
            };
            EntryKey::Curve {
                value,
                pointer: entry.pointer(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use writebuf_pages::{BoundingBox, HilbertEntry, RectEntry};

    fn bbox(x: f64) -> BoundingBox {
        BoundingBox::new([x, x], [x + 1.0, x + 1.0])
    }

    #[test]
    fn pointer_keys_order_by_pointer() {
        let a = entry_key(
            &RectEntry::new(10, bbox(5.0)).into(),
            NodeKind::Rtree,
            Srid::WGS84,
        );
        let b = entry_key(
            &RectEntry::new(20, bbox(0.0)).into(),
            NodeKind::Rtree,
            Srid::WGS84,
        );
        assert!(a < b);
        // The rectangle plays no role for pointer keys.
        assert_eq!(
            a,
            entry_key(
                &RectEntry::new(10, bbox(99.0)).into(),
                NodeKind::Rtree,
                Srid::WGS84
            )
        );
    }

    #[test]
    fn curve_keys_break_ties_by_pointer() {
        let lhv = HilbertValue(42);
        let a = entry_key(
            &HilbertEntry::new(1, bbox(0.0), lhv).into(),
            NodeKind::HilbertInternal,
            Srid::WGS84,
        );
        let b = entry_key(
            &HilbertEntry::new(2, bbox(0.0), lhv).into(),
            NodeKind::HilbertInternal,
            Srid::WGS84,
        );
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    fn leaf_curve_keys_come_from_the_rectangle() {
        let near = entry_key(
            &RectEntry::new(7, bbox(0.0)).into(),
            NodeKind::HilbertLeaf,
            Srid::WGS84,
        );
        let same_spot = entry_key(
            &RectEntry::new(7, bbox(0.0)).into(),
            NodeKind::HilbertLeaf,
            Srid::WGS84,
        );
        let far = entry_key(
            &RectEntry::new(7, bbox(80.0)).into(),
            NodeKind::HilbertLeaf,
            Srid::WGS84,
        );
        assert_eq!(near, same_spot);
        assert_ne!(near, far);
    }
}
