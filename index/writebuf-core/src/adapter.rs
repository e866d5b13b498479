//! Routing spatial-index operations through the write buffer.
//!
//! The tree algorithms themselves live elsewhere; this module defines
//! the narrow surface the buffer consumes from them ([`SpatialIndex`])
//! and the node-access hooks they consume from the buffer
//! ([`NodeSource`]). [`BufferedIndex`] ties one index to one buffer and
//! forwards operations.

use std::io;
use std::path::Path;

use writebuf_pages::{BoundingBox, IndexNode, NodeEntry, Srid};

use crate::buffer::{BufferConfig, BufferError, PageStore, WriteBuffer};
use crate::IndexKind;

/// Spatial comparison applied by a selection query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialPredicate {
    /// The candidate rectangle overlaps the query window.
    Intersects,
    /// The candidate rectangle lies fully inside the query window.
    ContainedBy,
}

impl SpatialPredicate {
    /// Evaluate the predicate for `candidate` against `window`.
    #[must_use]
    pub fn eval(self, window: &BoundingBox, candidate: &BoundingBox) -> bool {
        match self {
            Self::Intersects => window.intersects(candidate),
            Self::ContainedBy => window.contains(candidate),
        }
    }
}

/// Node fetch/stage hooks handed to the underlying index.
///
/// Every operation names the node by page number and tree height; the
/// reference system for Hilbert ordering is a property of the source,
/// never ambient state.
pub trait NodeSource {
    /// The reference system entries are ordered under.
    fn srid(&self) -> Srid;

    /// Register a brand-new node.
    fn create(&mut self, page: u32, height: u32);

    /// The current (merged) version of a node.
    ///
    /// # Errors
    /// Buffer or store failures.
    fn fetch(&mut self, page: u32, height: u32) -> Result<IndexNode, BufferError>;

    /// Stage an entry insertion or update; returns the byte delta.
    fn stage(&mut self, page: u32, height: u32, entry: NodeEntry) -> i64;

    /// Stage an entry removal; returns the byte delta.
    fn stage_removal(&mut self, page: u32, height: u32, entry: &NodeEntry) -> i64;

    /// Allocate pages for new nodes.
    fn allocate(&mut self, count: usize) -> Vec<u32>;

    /// Discard a node's buffered modifications without writing them;
    /// returns the freed bytes.
    fn discard(&mut self, page: u32) -> u64;
}

impl<S: PageStore> NodeSource for WriteBuffer<S> {
    fn srid(&self) -> Srid {
        Self::srid(self)
    }

    fn create(&mut self, page: u32, height: u32) {
        self.create_node(page, height);
    }

    fn fetch(&mut self, page: u32, height: u32) -> Result<IndexNode, BufferError> {
        self.read_node(page, height)
    }

    fn stage(&mut self, page: u32, height: u32, entry: NodeEntry) -> i64 {
        Self::stage(self, page, height, entry)
    }

    fn stage_removal(&mut self, page: u32, height: u32, entry: &NodeEntry) -> i64 {
        Self::stage_removal(self, page, height, entry)
    }

    fn allocate(&mut self, count: usize) -> Vec<u32> {
        self.store_mut().allocate_pages(count)
    }

    fn discard(&mut self, page: u32) -> u64 {
        self.drop_node(page)
    }
}

/// Capabilities consumed from an underlying spatial index.
///
/// The index reaches storage exclusively through the [`NodeSource`]
/// passed into each call, which is how its writes end up buffered.
pub trait SpatialIndex {
    /// The index family, deciding node shapes and entry ordering.
    fn family(&self) -> IndexKind;

    /// Insert an object rectangle under `pointer`.
    fn insert(&mut self, nodes: &mut dyn NodeSource, pointer: u32, bounds: &BoundingBox) -> bool;

    /// Remove the object `pointer` with rectangle `bounds`.
    fn remove(&mut self, nodes: &mut dyn NodeSource, pointer: u32, bounds: &BoundingBox) -> bool;

    /// Replace one object with another.
    fn update(
        &mut self,
        nodes: &mut dyn NodeSource,
        old_pointer: u32,
        old_bounds: &BoundingBox,
        new_pointer: u32,
        new_bounds: &BoundingBox,
    ) -> bool;

    /// Pointers of all objects matching `predicate` against `window`.
    fn search(
        &mut self,
        nodes: &mut dyn NodeSource,
        window: &BoundingBox,
        predicate: SpatialPredicate,
    ) -> Vec<u32>;

    /// Persist the index header.
    ///
    /// # Errors
    /// I/O failures writing the header file.
    fn write_header(&mut self, path: &Path) -> io::Result<()>;

    /// Tear the index down, discarding whatever node state it still has
    /// buffered. Returns the freed bytes; the index value itself is
    /// freed by dropping it afterwards.
    fn destroy(&mut self, nodes: &mut dyn NodeSource) -> u64;
}

/// One spatial index with its writes routed through a write buffer.
pub struct BufferedIndex<I, S> {
    index: I,
    buffer: WriteBuffer<S>,
}

impl<I: SpatialIndex, S: PageStore> BufferedIndex<I, S> {
    /// Wrap `index` over `store`. When `persist` is set, the empty root
    /// node is placed in the buffer right away at the first allocated
    /// page with height 0.
    pub fn create(index: I, store: S, srid: Srid, persist: bool) -> Self {
        let config = BufferConfig {
            family: index.family(),
            srid,
        };
        let mut buffer = WriteBuffer::new(store, config);
        if persist {
            let pages = buffer.store_mut().allocate_pages(1);
            if let Some(&root) = pages.first() {
                buffer.create_node(root, 0);
            }
        }
        Self { index, buffer }
    }

    /// The index family.
    #[must_use]
    pub fn family(&self) -> IndexKind {
        self.index.family()
    }

    pub fn insert(&mut self, pointer: u32, bounds: &BoundingBox) -> bool {
        self.index.insert(&mut self.buffer, pointer, bounds)
    }

    pub fn remove(&mut self, pointer: u32, bounds: &BoundingBox) -> bool {
        self.index.remove(&mut self.buffer, pointer, bounds)
    }

    pub fn update(
        &mut self,
        old_pointer: u32,
        old_bounds: &BoundingBox,
        new_pointer: u32,
        new_bounds: &BoundingBox,
    ) -> bool {
        self.index
            .update(&mut self.buffer, old_pointer, old_bounds, new_pointer, new_bounds)
    }

    pub fn search(&mut self, window: &BoundingBox, predicate: SpatialPredicate) -> Vec<u32> {
        self.index.search(&mut self.buffer, window, predicate)
    }

    /// Persist the index header.
    ///
    /// # Errors
    /// I/O failures from the header writer.
    pub fn write_header(&mut self, path: &Path) -> io::Result<()> {
        self.index.write_header(path)
    }

    /// Flush every buffered node to storage.
    ///
    /// # Errors
    /// See [`WriteBuffer::flush_all`].
    pub fn flush(&mut self) -> Result<u64, BufferError> {
        self.buffer.flush_all()
    }

    /// Destroy the index: the underlying index discards its buffered
    /// node state, then both it and the buffer are dropped. Returns the
    /// freed buffer bytes.
    pub fn destroy(mut self) -> u64 {
        self.index.destroy(&mut self.buffer)
    }

    #[inline]
    pub const fn buffer(&self) -> &WriteBuffer<S> {
        &self.buffer
    }

    #[inline]
    pub const fn buffer_mut(&mut self) -> &mut WriteBuffer<S> {
        &mut self.buffer
    }

    #[inline]
    pub const fn index(&self) -> &I {
        &self.index
    }
}
