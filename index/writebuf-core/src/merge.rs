//! Combining pending modifications with a fetched node.

use core::cmp::Ordering;

use writebuf_pages::IndexNode;

use crate::key::entry_key;
use crate::mods::ModificationSet;

/// Merge the ordered modification `set` with a fetched `node` (or none,
/// for a node that only exists in the buffer) into the current version
/// of the node, sorted by entry key.
///
/// Classic two-pointer merge: both inputs are key-ordered, and on a key
/// collision the modification wins; it is the more recent version of
/// that entry. Tombstones fall out here: node append rejects them, so a
/// pending removal erases its on-page counterpart from the output.
///
/// The fetched input is untouched; the caller keeps ownership.
#[must_use]
pub fn merge(set: &ModificationSet, node: Option<&IndexNode>) -> IndexNode {
    let kind = set.kind();
    let srid = set.srid();
    debug_assert!(
        node.is_none_or(|n| n.kind() == kind),
        "merging across node shapes"
    );

    let node_len = node.map_or(0, IndexNode::len);
    let capacity = if node_len == 0 {
        set.len()
    } else {
        set.len().min(node_len)
    };
    let mut merged = IndexNode::with_capacity(kind, capacity);

    let Some(node) = node else {
        for (_, entry) in set.iter() {
            merged.push_entry(entry);
        }
        return merged;
    };

    let mut at = 0;
    for (key, entry) in set.iter() {
        // Drain node entries ordered before this modification; a key
        // collision skips the superseded on-page entry.
        while let Some(page_entry) = node.entry_at(at) {
            match entry_key(&page_entry, kind, srid).cmp(key) {
                Ordering::Less => {
                    merged.push_entry(&page_entry);
                    at += 1;
                }
                Ordering::Equal => {
                    at += 1;
                    break;
                }
                Ordering::Greater => break,
            }
        }
        merged.push_entry(entry);
    }
    while let Some(page_entry) = node.entry_at(at) {
        merged.push_entry(&page_entry);
        at += 1;
    }

    merged
}
