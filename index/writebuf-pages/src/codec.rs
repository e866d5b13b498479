//! Node serialization.
//!
//! Fixed little-endian layout, sized exactly by
//! [`IndexNode::byte_size`]:
//!
//! ```text
//! | kind: u8 | count: u32 | entries ...                            |
//! |          |            | pointer: u32 | bbox: 4 x f64 [| lhv: u64] |
//! ```
//!
//! The `lhv` field is only present for Hilbert internal nodes. The kind
//! tag `0xFF` never occurs in encoded nodes; it is the erased state of
//! the underlying flash page, so a freshly allocated, never-written page
//! decodes to [`DecodeError::Blank`].

use crate::bbox::BoundingBox;
use crate::entry::{HilbertEntry, RectEntry, RECT_ENTRY_BYTES};
use crate::hilbert::HilbertValue;
use crate::node::{IndexNode, NodeKind};

/// Size of the node header: kind tag plus entry count.
pub const HEADER_BYTES: usize = 1 + 4;

const TAG_RTREE: u8 = 1;
const TAG_HILBERT_LEAF: u8 = 2;
const TAG_HILBERT_INTERNAL: u8 = 3;

/// Tag of an erased flash page.
const TAG_BLANK: u8 = 0xFF;

/// Rejected byte images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The page is in its erased state; no node was ever written here.
    #[error("page is blank")]
    Blank,
    /// The kind tag does not name a node shape.
    #[error("unknown node kind tag {0:#04x}")]
    UnknownKind(u8),
    /// The buffer ends before the encoded entries do.
    #[error("truncated node image")]
    Truncated,
}

/// Encode `node` into its serialized form.
///
/// # Panics
/// If the node contains a tombstone entry. Node append rejects
/// tombstones, so only a hand-assembled node can trip this.
#[must_use]
pub fn encode_node(node: &IndexNode) -> Vec<u8> {
    let mut out = Vec::with_capacity(node.byte_size());
    let (tag, count) = match node {
        IndexNode::Rtree(v) => (TAG_RTREE, v.len()),
        IndexNode::HilbertLeaf(v) => (TAG_HILBERT_LEAF, v.len()),
        IndexNode::HilbertInternal(v) => (TAG_HILBERT_INTERNAL, v.len()),
    };
    out.push(tag);
    out.extend_from_slice(&(count as u32).to_le_bytes());

    match node {
        IndexNode::Rtree(v) | IndexNode::HilbertLeaf(v) => {
            for entry in v {
                encode_rect(entry, &mut out);
            }
        }
        IndexNode::HilbertInternal(v) => {
            for entry in v {
                encode_hilbert(entry, &mut out);
            }
        }
    }
    out
}

/// Decode a node from the beginning of `bytes`; trailing bytes (page
/// padding) are ignored.
///
/// # Errors
/// [`DecodeError::Blank`] for an erased page, otherwise shape and length
/// violations.
pub fn decode_node(bytes: &[u8]) -> Result<IndexNode, DecodeError> {
    let mut r = Reader { bytes, at: 0 };
    let tag = r.u8()?;
    if tag == TAG_BLANK {
        return Err(DecodeError::Blank);
    }
    let count = r.u32()? as usize;
    // Capacity hint bounded by what the buffer could actually hold, so
    // a corrupt count cannot trigger a giant allocation.
    let capacity = count.min(bytes.len() / RECT_ENTRY_BYTES + 1);

    match tag {
        TAG_RTREE | TAG_HILBERT_LEAF => {
            let mut entries = Vec::with_capacity(capacity);
            for _ in 0..count {
                entries.push(decode_rect(&mut r)?);
            }
            Ok(if tag == TAG_RTREE {
                IndexNode::Rtree(entries)
            } else {
                IndexNode::HilbertLeaf(entries)
            })
        }
        TAG_HILBERT_INTERNAL => {
            let mut entries = Vec::with_capacity(capacity);
            for _ in 0..count {
                let rect = decode_rect(&mut r)?;
                let lhv = HilbertValue(r.u64()?);
                entries.push(HilbertEntry {
                    pointer: rect.pointer,
                    bbox: rect.bbox,
                    lhv,
                });
            }
            Ok(IndexNode::HilbertInternal(entries))
        }
        other => Err(DecodeError::UnknownKind(other)),
    }
}

/// The node kind a byte image would decode to, without decoding the
/// entries.
///
/// # Errors
/// Same header failures as [`decode_node`].
pub fn peek_kind(bytes: &[u8]) -> Result<NodeKind, DecodeError> {
    match bytes.first().copied() {
        None => Err(DecodeError::Truncated),
        Some(TAG_BLANK) => Err(DecodeError::Blank),
        Some(TAG_RTREE) => Ok(NodeKind::Rtree),
        Some(TAG_HILBERT_LEAF) => Ok(NodeKind::HilbertLeaf),
        Some(TAG_HILBERT_INTERNAL) => Ok(NodeKind::HilbertInternal),
        Some(other) => Err(DecodeError::UnknownKind(other)),
    }
}

fn encode_rect(entry: &RectEntry, out: &mut Vec<u8>) {
    out.extend_from_slice(&entry.pointer.to_le_bytes());
    let bbox = entry.bbox.expect("tombstones are never encoded");
    for coord in [bbox.min[0], bbox.min[1], bbox.max[0], bbox.max[1]] {
        out.extend_from_slice(&coord.to_le_bytes());
    }
}

fn encode_hilbert(entry: &HilbertEntry, out: &mut Vec<u8>) {
    encode_rect(
        &RectEntry {
            pointer: entry.pointer,
            bbox: entry.bbox,
        },
        out,
    );
    out.extend_from_slice(&entry.lhv.0.to_le_bytes());
}

fn decode_rect(r: &mut Reader<'_>) -> Result<RectEntry, DecodeError> {
    let pointer = r.u32()?;
    let min = [r.f64()?, r.f64()?];
    let max = [r.f64()?, r.f64()?];
    Ok(RectEntry::new(pointer, BoundingBox::new(min, max)))
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let slice = self
            .bytes
            .get(self.at..self.at + N)
            .ok_or(DecodeError::Truncated)?;
        self.at += N;
        Ok(slice.try_into().expect("slice length checked"))
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take::<8>()?))
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take::<8>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f64) -> BoundingBox {
        BoundingBox::new([x, x], [x + 1.0, x + 2.0])
    }

    #[test]
    fn round_trip_all_kinds() {
        let rtree = IndexNode::Rtree(vec![
            RectEntry::new(1, bbox(0.0)),
            RectEntry::new(2, bbox(4.0)),
        ]);
        let leaf = IndexNode::HilbertLeaf(vec![RectEntry::new(3, bbox(1.0))]);
        let internal = IndexNode::HilbertInternal(vec![
            HilbertEntry::new(4, bbox(2.0), HilbertValue(77)),
            HilbertEntry::new(5, bbox(3.0), HilbertValue(99)),
        ]);

        for node in [rtree, leaf, internal] {
            let bytes = encode_node(&node);
            assert_eq!(bytes.len(), node.byte_size());
            assert_eq!(peek_kind(&bytes).unwrap(), node.kind());
            assert_eq!(decode_node(&bytes).unwrap(), node);
        }
    }

    #[test]
    fn trailing_page_padding_is_ignored() {
        let node = IndexNode::Rtree(vec![RectEntry::new(1, bbox(0.0))]);
        let mut bytes = encode_node(&node);
        bytes.resize(bytes.len() + 64, 0);
        assert_eq!(decode_node(&bytes).unwrap(), node);
    }

    #[test]
    fn erased_pages_decode_to_blank() {
        let erased = vec![0xFF; 128];
        assert_eq!(decode_node(&erased), Err(DecodeError::Blank));
        assert_eq!(peek_kind(&erased), Err(DecodeError::Blank));
    }

    #[test]
    fn malformed_images_are_rejected() {
        assert_eq!(decode_node(&[]), Err(DecodeError::Truncated));
        assert_eq!(decode_node(&[0x07, 0, 0, 0, 0]), Err(DecodeError::UnknownKind(0x07)));

        let node = IndexNode::Rtree(vec![RectEntry::new(1, bbox(0.0))]);
        let bytes = encode_node(&node);
        assert_eq!(
            decode_node(&bytes[..bytes.len() - 3]),
            Err(DecodeError::Truncated)
        );
    }
}
