//! The write buffer: per-node modification sets over a page store.

use std::collections::HashMap;

use flashsim_device::Lba;
use flashsim_ftl::{FlashSim, SimError};
use log::trace;
use writebuf_pages::{decode_node, encode_node, DecodeError, IndexNode, NodeEntry, Srid};

use crate::mods::ModificationSet;
use crate::{merge, IndexKind};

/// Storage of node-sized logical pages underneath the write buffer.
///
/// Implemented by the flash simulator facade for device-backed indices
/// and by [`MemStore`] for buffer-only operation and tests.
pub trait PageStore {
    /// Usable bytes per page (the data area).
    fn page_bytes(&self) -> usize;

    /// Allocate up to `count` pages; a short result means the store is
    /// full.
    fn allocate_pages(&mut self, count: usize) -> Vec<u32>;

    /// Release one page.
    ///
    /// # Errors
    /// [`StoreError`] when the page is not allocated.
    fn release_page(&mut self, page: u32) -> Result<(), StoreError>;

    /// Read one full page.
    ///
    /// # Errors
    /// [`StoreError`] when the page is not allocated or the device
    /// fails.
    fn read_page(&mut self, page: u32) -> Result<Vec<u8>, StoreError>;

    /// Write `bytes` at the start of a page; `bytes.len()` is at most
    /// [`page_bytes`](Self::page_bytes).
    ///
    /// # Errors
    /// [`StoreError`] when the page is not allocated or the device
    /// fails.
    fn write_page(&mut self, page: u32, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Page-store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("page {0} is not allocated")]
    Unmapped(u32),
    #[error(transparent)]
    Flash(#[from] SimError),
}

/// Write-buffer failures.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(DecodeError),
    /// The merged node no longer fits in one page; the pending
    /// modifications are kept so the caller can split the node first.
    #[error("merged node needs {needed} bytes but pages hold {page_bytes}")]
    NodeTooLarge { needed: usize, page_bytes: usize },
}

/// Buffer configuration, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// The index family served, deciding node shapes and entry
    /// ordering.
    pub family: IndexKind,
    /// Reference system for Hilbert leaf ordering.
    pub srid: Srid,
}

struct BufferedNode {
    height: u32,
    mods: ModificationSet,
}

/// In-memory write buffer holding entry-level modifications per index
/// node.
///
/// Writes stage into per-node [`ModificationSet`]s; reads fetch the
/// persisted node through the store and [`merge`] the pending
/// modifications over it; flushing materializes the merged node back
/// into its page and drops the set. The buffer tracks the byte total of
/// everything staged so a caller can bound its footprint.
pub struct WriteBuffer<S> {
    store: S,
    family: IndexKind,
    srid: Srid,
    nodes: HashMap<u32, BufferedNode>,
    buffered_bytes: i64,
}

impl<S: PageStore> WriteBuffer<S> {
    pub fn new(store: S, config: BufferConfig) -> Self {
        Self {
            store,
            family: config.family,
            srid: config.srid,
            nodes: HashMap::new(),
            buffered_bytes: 0,
        }
    }

    /// The index family this buffer serves.
    #[inline]
    #[must_use]
    pub const fn family(&self) -> IndexKind {
        self.family
    }

    /// The reference system for Hilbert leaf ordering.
    #[inline]
    #[must_use]
    pub const fn srid(&self) -> Srid {
        self.srid
    }

    #[inline]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Bytes currently staged across all nodes.
    #[inline]
    #[must_use]
    pub const fn buffered_bytes(&self) -> i64 {
        self.buffered_bytes
    }

    /// Number of nodes with buffered state.
    #[must_use]
    pub fn buffered_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Register a brand-new node at `page`. Until its first flush the
    /// node exists only in the buffer; reads see its staged entries
    /// merged over nothing.
    pub fn create_node(&mut self, page: u32, height: u32) {
        self.mods_for(page, height);
    }

    /// Stage an insertion or update into the node at `page`. Returns
    /// the byte delta.
    pub fn stage(&mut self, page: u32, height: u32, entry: NodeEntry) -> i64 {
        let delta = self.mods_for(page, height).stage(entry);
        self.buffered_bytes += delta;
        delta
    }

    /// Stage a removal from the node at `page`. Returns the byte delta.
    pub fn stage_removal(&mut self, page: u32, height: u32, entry: &NodeEntry) -> i64 {
        let delta = self.mods_for(page, height).stage_removal(entry);
        self.buffered_bytes += delta;
        delta
    }

    /// The current version of the node at `page`: the persisted node
    /// (if any) with all pending modifications merged over it.
    ///
    /// # Errors
    /// Store or codec failures; a blank page counts as "no node yet".
    pub fn read_node(&mut self, page: u32, height: u32) -> Result<IndexNode, BufferError> {
        let kind = self.family.node_kind(height);
        let fetched = self.fetch(page)?;
        match self.nodes.get(&page) {
            Some(node) => Ok(merge(&node.mods, fetched.as_ref())),
            None => Ok(fetched.unwrap_or_else(|| IndexNode::empty(kind))),
        }
    }

    /// Merge and persist the node at `page`, dropping its buffered
    /// modifications. Returns the freed bytes (zero when nothing was
    /// buffered).
    ///
    /// # Errors
    /// Store and codec failures, and [`BufferError::NodeTooLarge`] when
    /// the merged node exceeds the page; the modifications stay
    /// buffered in every error case.
    pub fn flush_node(&mut self, page: u32) -> Result<u64, BufferError> {
        let Some(buffered) = self.nodes.remove(&page) else {
            return Ok(0);
        };

        let fetched = match self.fetch(page) {
            Ok(f) => f,
            Err(err) => {
                self.nodes.insert(page, buffered);
                return Err(err);
            }
        };
        let merged = merge(&buffered.mods, fetched.as_ref());
        let bytes = encode_node(&merged);

        if bytes.len() > self.store.page_bytes() {
            let err = BufferError::NodeTooLarge {
                needed: bytes.len(),
                page_bytes: self.store.page_bytes(),
            };
            self.nodes.insert(page, buffered);
            return Err(err);
        }
        if let Err(err) = self.store.write_page(page, &bytes) {
            self.nodes.insert(page, buffered);
            return Err(err.into());
        }

        let freed = buffered.mods.destroy();
        self.buffered_bytes -= freed as i64;
        trace!(
            "flushed node {page}: {} entries in {} bytes, freed {freed}",
            merged.len(),
            bytes.len()
        );
        Ok(freed)
    }

    /// Flush every buffered node. Returns the total freed bytes.
    ///
    /// # Errors
    /// First failure wins; already-flushed nodes stay flushed.
    pub fn flush_all(&mut self) -> Result<u64, BufferError> {
        let mut pages: Vec<u32> = self.nodes.keys().copied().collect();
        pages.sort_unstable();

        let mut freed = 0;
        for page in pages {
            freed += self.flush_node(page)?;
        }
        Ok(freed)
    }

    /// Discard the buffered modifications of `page` without writing.
    /// Returns the freed bytes.
    pub fn drop_node(&mut self, page: u32) -> u64 {
        match self.nodes.remove(&page) {
            Some(buffered) => {
                let freed = buffered.mods.destroy();
                self.buffered_bytes -= freed as i64;
                freed
            }
            None => 0,
        }
    }

    /// Remove the node at `page` entirely: drop its buffered state and
    /// release the underlying page. Returns the freed buffer bytes.
    ///
    /// # Errors
    /// Store failures from the page release.
    pub fn destroy_node(&mut self, page: u32) -> Result<u64, BufferError> {
        let freed = self.drop_node(page);
        self.store.release_page(page)?;
        Ok(freed)
    }

    fn mods_for(&mut self, page: u32, height: u32) -> &mut ModificationSet {
        let kind = self.family.node_kind(height);
        let srid = self.srid;
        &mut self
            .nodes
            .entry(page)
            .or_insert_with(|| BufferedNode {
                height,
                mods: ModificationSet::new(kind, srid),
            })
            .mods
    }

    fn fetch(&mut self, page: u32) -> Result<Option<IndexNode>, BufferError> {
        let bytes = self.store.read_page(page)?;
        match decode_node(&bytes) {
            Ok(node) => Ok(Some(node)),
            Err(DecodeError::Blank) => Ok(None),
            Err(err) => Err(BufferError::Codec(err)),
        }
    }
}

/// Memory-backed page store: pages live in a map, erased state is
/// `0xFF`.
pub struct MemStore {
    page_bytes: usize,
    pages: HashMap<u32, Vec<u8>>,
    next: u32,
}

impl MemStore {
    #[must_use]
    pub fn new(page_bytes: usize) -> Self {
        Self {
            page_bytes,
            pages: HashMap::new(),
            next: 0,
        }
    }
}

impl PageStore for MemStore {
    fn page_bytes(&self) -> usize {
        self.page_bytes
    }

    fn allocate_pages(&mut self, count: usize) -> Vec<u32> {
        (0..count)
            .map(|_| {
                let page = self.next;
                self.next += 1;
                self.pages.insert(page, vec![0xFF; self.page_bytes]);
                page
            })
            .collect()
    }

    fn release_page(&mut self, page: u32) -> Result<(), StoreError> {
        self.pages
            .remove(&page)
            .map(|_| ())
            .ok_or(StoreError::Unmapped(page))
    }

    fn read_page(&mut self, page: u32) -> Result<Vec<u8>, StoreError> {
        self.pages
            .get(&page)
            .cloned()
            .ok_or(StoreError::Unmapped(page))
    }

    fn write_page(&mut self, page: u32, bytes: &[u8]) -> Result<(), StoreError> {
        let slot = self
            .pages
            .get_mut(&page)
            .ok_or(StoreError::Unmapped(page))?;
        // A write replaces the page wholesale, like the out-of-place
        // path underneath: fresh erased state, then the payload.
        slot.fill(0xFF);
        slot[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl PageStore for FlashSim {
    fn page_bytes(&self) -> usize {
        self.device().geometry().page_size.data as usize
    }

    fn allocate_pages(&mut self, count: usize) -> Vec<u32> {
        self.alloc_pages(count).into_iter().map(Lba::get).collect()
    }

    fn release_page(&mut self, page: u32) -> Result<(), StoreError> {
        FlashSim::release_page(self, Lba::new(page)).map_err(StoreError::from)
    }

    fn read_page(&mut self, page: u32) -> Result<Vec<u8>, StoreError> {
        let mut buf = vec![0u8; PageStore::page_bytes(self)];
        FlashSim::read_page(self, Lba::new(page), &mut buf, 0)?;
        Ok(buf)
    }

    fn write_page(&mut self, page: u32, bytes: &[u8]) -> Result<(), StoreError> {
        FlashSim::write_page(self, Lba::new(page), bytes, 0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashsim_device::{DeviceGeometry, PageSize, ReadTiming};
    use flashsim_ftl::{DeviceSpec, FtlConfig, FtlModuleId, FtlSpec, VfdModuleId};
    use writebuf_pages::{BoundingBox, NodeKind, RectEntry};

    fn bbox(x: f64) -> BoundingBox {
        BoundingBox::new([x, x], [x + 1.0, x + 1.0])
    }

    fn rect(pointer: u32, x: f64) -> NodeEntry {
        RectEntry::new(pointer, bbox(x)).into()
    }

    fn config(family: IndexKind) -> BufferConfig {
        BufferConfig {
            family,
            srid: Srid::WGS84,
        }
    }

    fn mem_buffer() -> WriteBuffer<MemStore> {
        WriteBuffer::new(MemStore::new(512), config(IndexKind::Rtree))
    }

    #[test]
    fn created_nodes_read_back_their_staged_entries() {
        let mut buffer = mem_buffer();
        let page = buffer.store_mut().allocate_pages(1)[0];
        buffer.create_node(page, 0);

        buffer.stage(page, 0, rect(3, 3.0));
        buffer.stage(page, 0, rect(1, 1.0));

        let node = buffer.read_node(page, 0).unwrap();
        assert_eq!(node.kind(), NodeKind::Rtree);
        let pointers: Vec<u32> = node.entries().map(|e| e.pointer()).collect();
        assert_eq!(pointers, vec![1, 3]);
    }

    #[test]
    fn flush_persists_and_empties_the_buffer() {
        let mut buffer = mem_buffer();
        let page = buffer.store_mut().allocate_pages(1)[0];
        buffer.create_node(page, 0);
        buffer.stage(page, 0, rect(1, 1.0));
        buffer.stage(page, 0, rect(2, 2.0));
        assert!(buffer.buffered_bytes() > 0);

        let freed = buffer.flush_node(page).unwrap();
        assert!(freed > 0);
        assert_eq!(buffer.buffered_bytes(), 0);
        assert_eq!(buffer.buffered_nodes(), 0);

        // The node now lives in the store and reads back without mods.
        let node = buffer.read_node(page, 0).unwrap();
        assert_eq!(node.len(), 2);

        // A second flush has nothing to do.
        assert_eq!(buffer.flush_node(page).unwrap(), 0);
    }

    #[test]
    fn reads_merge_pending_mods_over_the_persisted_node() {
        let mut buffer = mem_buffer();
        let page = buffer.store_mut().allocate_pages(1)[0];
        buffer.create_node(page, 0);
        for pointer in [10, 20, 30] {
            buffer.stage(page, 0, rect(pointer, f64::from(pointer)));
        }
        buffer.flush_node(page).unwrap();

        buffer.stage(page, 0, rect(25, 2.5));
        buffer.stage_removal(page, 0, &rect(10, 10.0));
        buffer.stage(page, 0, rect(20, 99.0));

        let node = buffer.read_node(page, 0).unwrap();
        let pointers: Vec<u32> = node.entries().map(|e| e.pointer()).collect();
        assert_eq!(pointers, vec![20, 25, 30]);
        assert_eq!(node.entry_at(0).unwrap().bbox().unwrap().min, [99.0, 99.0]);

        // Flushing the merged state keeps it.
        buffer.flush_node(page).unwrap();
        let node = buffer.read_node(page, 0).unwrap();
        let pointers: Vec<u32> = node.entries().map(|e| e.pointer()).collect();
        assert_eq!(pointers, vec![20, 25, 30]);
    }

    #[test]
    fn drop_node_discards_without_writing() {
        let mut buffer = mem_buffer();
        let page = buffer.store_mut().allocate_pages(1)[0];
        buffer.create_node(page, 0);
        buffer.stage(page, 0, rect(1, 1.0));

        let freed = buffer.drop_node(page);
        assert!(freed > 0);
        assert_eq!(buffer.buffered_bytes(), 0);
        assert!(buffer.read_node(page, 0).unwrap().is_empty());
    }

    #[test]
    fn destroy_node_releases_the_page() {
        let mut buffer = mem_buffer();
        let page = buffer.store_mut().allocate_pages(1)[0];
        buffer.create_node(page, 0);
        buffer.stage(page, 0, rect(1, 1.0));

        buffer.destroy_node(page).unwrap();
        assert!(matches!(
            buffer.read_node(page, 0),
            Err(BufferError::Store(StoreError::Unmapped(_)))
        ));
    }

    #[test]
    fn oversized_nodes_refuse_to_flush_and_keep_their_mods() {
        let mut buffer = WriteBuffer::new(MemStore::new(64), config(IndexKind::Rtree));
        let page = buffer.store_mut().allocate_pages(1)[0];
        buffer.create_node(page, 0);
        // Two 36-byte entries plus the header exceed 64 bytes.
        buffer.stage(page, 0, rect(1, 1.0));
        buffer.stage(page, 0, rect(2, 2.0));

        assert!(matches!(
            buffer.flush_node(page),
            Err(BufferError::NodeTooLarge { .. })
        ));
        assert_eq!(buffer.buffered_nodes(), 1);
        assert!(buffer.buffered_bytes() > 0);
    }

    #[test]
    fn hilbert_families_pick_the_node_shape_by_height() {
        let mut buffer = WriteBuffer::new(MemStore::new(512), config(IndexKind::HilbertRtree));
        let pages = buffer.store_mut().allocate_pages(2);

        buffer.create_node(pages[0], 0);
        buffer.create_node(pages[1], 1);
        assert_eq!(
            buffer.read_node(pages[0], 0).unwrap().kind(),
            NodeKind::HilbertLeaf
        );
        assert_eq!(
            buffer.read_node(pages[1], 1).unwrap().kind(),
            NodeKind::HilbertInternal
        );
    }

    #[test]
    fn buffer_runs_on_the_flash_simulator() {
        let device = DeviceSpec {
            module: VfdModuleId::Nand03,
            geometry: DeviceGeometry {
                block_count: 4,
                pages_per_block: 4,
                page_size: PageSize::new(256, 0),
                erase_limit: 100,
                read_time: ReadTiming::new(25, 1),
                program_time: 200,
                erase_time: 1500,
            },
            image: None,
        };
        let ftl = FtlSpec {
            module: FtlModuleId::Ftl01,
            config: FtlConfig {
                map_size: 12,
                wear_leveling_threshold: 4,
            },
        };
        let sim = FlashSim::initialize(&device, &ftl).unwrap();

        let mut buffer = WriteBuffer::new(sim, config(IndexKind::Rtree));
        let page = buffer.store_mut().allocate_pages(1)[0];
        buffer.create_node(page, 0);
        for pointer in [10, 20, 30] {
            buffer.stage(page, 0, rect(pointer, f64::from(pointer)));
        }
        buffer.flush_node(page).unwrap();

        // Overwrite through the buffer: the flush goes out of place on
        // the device underneath, invisibly up here.
        buffer.stage(page, 0, rect(20, 99.0));
        buffer.stage_removal(page, 0, &rect(30, 30.0));
        buffer.flush_node(page).unwrap();

        let node = buffer.read_node(page, 0).unwrap();
        let pointers: Vec<u32> = node.entries().map(|e| e.pointer()).collect();
        assert_eq!(pointers, vec![10, 20]);
        assert_eq!(node.entry_at(1).unwrap().bbox().unwrap().min, [99.0, 99.0]);

        // The device saw real I/O.
        assert!(buffer.store().device().counters().unwrap().write_total() >= 2);
    }
}
