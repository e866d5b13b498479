//! Index node entries.
//!
//! Two concrete entry shapes cover the three node kinds: plain
//! rectangle entries (R-tree and R*-tree nodes, Hilbert leaf nodes) and
//! augmented entries carrying a largest-Hilbert-value (Hilbert internal
//! nodes).
//!
//! An entry whose rectangle is absent is a *tombstone*: it marks the
//! pending removal of the entry with the same pointer. Tombstones travel
//! through modification sets but are rejected by node append, so they
//! never reach a persisted node.

use crate::bbox::BoundingBox;
use crate::hilbert::HilbertValue;

/// Serialized size of an entry pointer.
pub const POINTER_BYTES: usize = 4;

/// Serialized size of a bounding rectangle (four `f64` coordinates).
pub const BBOX_BYTES: usize = 32;

/// Serialized size of a rectangle entry.
pub const RECT_ENTRY_BYTES: usize = POINTER_BYTES + BBOX_BYTES;

/// Serialized size of a Hilbert internal entry.
pub const HILBERT_ENTRY_BYTES: usize = RECT_ENTRY_BYTES + 8;

/// Entry of an R-tree/R*-tree node or a Hilbert leaf node: a pointer
/// (object id or child page) and its rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectEntry {
    pub pointer: u32,
    /// `None` marks a tombstone.
    pub bbox: Option<BoundingBox>,
}

impl RectEntry {
    #[inline]
    #[must_use]
    pub const fn new(pointer: u32, bbox: BoundingBox) -> Self {
        Self {
            pointer,
            bbox: Some(bbox),
        }
    }

    /// A removal marker for `pointer`.
    #[inline]
    #[must_use]
    pub const fn tombstone(pointer: u32) -> Self {
        Self {
            pointer,
            bbox: None,
        }
    }

    /// Serialized size: the full entry, or just the pointer for a
    /// tombstone.
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        if self.bbox.is_some() {
            RECT_ENTRY_BYTES
        } else {
            POINTER_BYTES
        }
    }
}

/// Entry of a Hilbert internal node: pointer, rectangle, and the largest
/// Hilbert value among the rectangles below the child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HilbertEntry {
    pub pointer: u32,
    /// `None` marks a tombstone.
    pub bbox: Option<BoundingBox>,
    /// Largest Hilbert value enclosed by `bbox`.
    pub lhv: HilbertValue,
}

impl HilbertEntry {
    #[inline]
    #[must_use]
    pub const fn new(pointer: u32, bbox: BoundingBox, lhv: HilbertValue) -> Self {
        Self {
            pointer,
            bbox: Some(bbox),
            lhv,
        }
    }

    /// A removal marker for `pointer` at curve position `lhv`.
    #[inline]
    #[must_use]
    pub const fn tombstone(pointer: u32, lhv: HilbertValue) -> Self {
        Self {
            pointer,
            bbox: None,
            lhv,
        }
    }

    #[must_use]
    pub const fn byte_size(&self) -> usize {
        if self.bbox.is_some() {
            HILBERT_ENTRY_BYTES
        } else {
            POINTER_BYTES
        }
    }
}

/// Either entry shape, as stored in modification sets and handed across
/// node kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeEntry {
    Rect(RectEntry),
    Hilbert(HilbertEntry),
}

impl NodeEntry {
    /// The entry's pointer value.
    #[must_use]
    pub const fn pointer(&self) -> u32 {
        match self {
            Self::Rect(e) => e.pointer,
            Self::Hilbert(e) => e.pointer,
        }
    }

    /// The entry's rectangle, absent on tombstones.
    #[must_use]
    pub const fn bbox(&self) -> Option<&BoundingBox> {
        match self {
            Self::Rect(e) => e.bbox.as_ref(),
            Self::Hilbert(e) => e.bbox.as_ref(),
        }
    }

    /// Whether this entry marks a removal.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.bbox().is_none()
    }

    /// Serialized size of the entry.
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        match self {
            Self::Rect(e) => e.byte_size(),
            Self::Hilbert(e) => e.byte_size(),
        }
    }
}

impl From<RectEntry> for NodeEntry {
    fn from(e: RectEntry) -> Self {
        Self::Rect(e)
    }
}

impl From<HilbertEntry> for NodeEntry {
    fn from(e: HilbertEntry) -> Self {
        Self::Hilbert(e)
    }
}
