//! # Spatial-Index Write Buffer
//!
//! In-memory buffering of entry-level node modifications for flash-aware
//! spatial indices (R-tree, R*-tree, Hilbert R-tree).
//!
//! ## How it fits together
//!
//! ```text
//! index operation ──► BufferedIndex ──► WriteBuffer ──► ModificationSet (per node)
//!                                          │
//!                         read: fetch ◄────┤ flush: merge + encode
//!                                          ▼
//!                                      PageStore  (flash simulator or memory)
//! ```
//!
//! A write never touches storage directly: it lands as one modification
//! in the ordered set of its node ([`ModificationSet`]). A read fetches
//! the persisted node through the [`PageStore`] and [`merge`]s the
//! pending modifications over it, yielding the most recent sorted
//! version. A flush materializes that merged node back into its page
//! and empties the set.
//!
//! Modification ordering follows the index family: plain pointer order
//! for R-trees, `(Hilbert value, pointer)` for Hilbert R-trees, with
//! leaf curve positions computed from the entry rectangle at staging
//! time under an explicit [`Srid`](writebuf_pages::Srid).

mod adapter;
mod buffer;
mod key;
mod merge;
mod mods;

pub use adapter::{BufferedIndex, NodeSource, SpatialIndex, SpatialPredicate};
pub use buffer::{BufferConfig, BufferError, MemStore, PageStore, StoreError, WriteBuffer};
pub use key::{entry_key, EntryKey};
pub use merge::merge;
pub use mods::{ModificationSet, MOD_OVERHEAD_BYTES};

use writebuf_pages::NodeKind;

/// Supported index families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Guttman R-tree.
    Rtree,
    /// R*-tree.
    RstarTree,
    /// Hilbert R-tree.
    HilbertRtree,
}

impl IndexKind {
    /// The node shape used by this family at the given tree height.
    #[must_use]
    pub const fn node_kind(self, height: u32) -> NodeKind {
        match self {
            Self::Rtree | Self::RstarTree => NodeKind::Rtree,
            Self::HilbertRtree => {
                if height == 0 {
                    NodeKind::HilbertLeaf
                } else {
                    NodeKind::HilbertInternal
                }
            }
        }
    }
}
