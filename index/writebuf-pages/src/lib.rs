//! # Index Pages
//!
//! Node and entry representation shared by the spatial-index write
//! buffer, polymorphic over three node shapes:
//!
//! | Shape | Entry | Ordering key |
//! |-------|-------|--------------|
//! | [`NodeKind::Rtree`] | pointer + rectangle | pointer |
//! | [`NodeKind::HilbertLeaf`] | pointer + rectangle | Hilbert value of the rectangle center |
//! | [`NodeKind::HilbertInternal`] | pointer + rectangle + largest Hilbert value | stored largest Hilbert value |
//!
//! The crate deliberately knows nothing about tree algorithms: it
//! provides the node capability surface (append, positional overwrite,
//! access, clone, copy, byte size), the Hilbert curve used for
//! ordering, and the serialized node form that travels to and from the
//! storage pages.
//!
//! Spatial reference systems are data here, not ambient state: the
//! [`Srid`] rides along wherever a Hilbert value is computed, so two
//! indices over different reference systems can interleave freely.

mod bbox;
mod codec;
mod entry;
mod hilbert;
mod node;

pub use bbox::BoundingBox;
pub use codec::{decode_node, encode_node, peek_kind, DecodeError, HEADER_BYTES};
pub use entry::{
    HilbertEntry, NodeEntry, RectEntry, BBOX_BYTES, HILBERT_ENTRY_BYTES, POINTER_BYTES,
    RECT_ENTRY_BYTES,
};
pub use hilbert::{hilbert_value, HilbertValue, Srid};
pub use node::{IndexNode, NodeKind};
