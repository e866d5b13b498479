//! Logical-to-physical page mapping with out-of-place writes.
//!
//! The mapper owns the flash device and hands out logical page addresses
//! ([`Lba`]) backed by physical pages ([`Pba`]). Writes to a live page go
//! out of place: a fresh physical page is allocated, the old one is marked
//! dead, and the mapping is updated before the call returns. Dead pages
//! are reclaimed by [garbage collection](crate::Ftl::reclaim_block) when
//! allocation runs out of free pages.
//!
//! ## Invariants
//!
//! - For every mapped `Lba` the reverse map points back at it, and the
//!   mapped physical page is `Allocated` or `Live`.
//! - The free/dirty/dead lists partition all blocks except the single
//!   reserved block, consistently with the per-block histograms.
//! - A block joins the dead list eagerly, the moment its last page dies;
//!   it leaves the free list only when an allocation claims its first
//!   page.

use std::collections::VecDeque;

use flashsim_device::{BlockId, DeviceError, FlashDevice, Lba, PageId, Pba};
use log::debug;

use crate::block::{BlockState, PageState};

/// Mapper configuration, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct FtlConfig {
    /// Size of the logical address space handed out by
    /// [`alloc_pages`](crate::Ftl::alloc_pages).
    pub map_size: u32,
    /// Erase-count gap between the most-dirty and least-erased block
    /// above which reclamation swaps block contents to even out wear.
    pub wear_leveling_threshold: u32,
}

/// Mapper failures.
#[derive(Debug, thiserror::Error)]
pub enum FtlError {
    /// The logical page is outside the map or not mapped.
    #[error("logical page {0} is not mapped")]
    InvalidLba(Lba),
    /// The mapped physical page is in a state the operation does not
    /// accept.
    #[error("logical page {lba} maps to a {state:?} page")]
    InvalidPageState { lba: Lba, state: PageState },
    /// The requested window does not fit in a page.
    #[error("window [{offset}, {offset} + {len}) exceeds the {page_bytes}-byte page")]
    IoOverflow {
        offset: usize,
        len: usize,
        page_bytes: usize,
    },
    /// No physical page left, even after garbage collection.
    #[error("no physical page available")]
    NoMemory,
    /// Reclamation found nothing to erase.
    #[error("no dead pages to reclaim")]
    NotDirty,
    /// Reclamation needs erase counters the device does not provide.
    #[error("reclamation requires the counter capability")]
    UnsupportedObject,
    /// The device failed underneath.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Page-mapping flash translation layer over a [`FlashDevice`].
///
/// Reclamation strategy: erase fully dead blocks first; otherwise move
/// the surviving pages of the block with the most dead pages into the
/// reserved block and erase it, swapping block contents with the
/// least-erased block beforehand when the wear gap exceeds the
/// configured threshold.
#[derive(Debug)]
pub struct Ftl<D> {
    pub(crate) device: D,
    config: FtlConfig,
    /// `Lba → Pba`, `None` = unmapped.
    map: Vec<Option<Pba>>,
    /// Flat page index `→ Lba`, the inverse of `map`.
    pub(crate) rmap: Vec<Option<Lba>>,
    pub(crate) blocks: Vec<BlockState>,
    pub(crate) free_list: VecDeque<BlockId>,
    pub(crate) dirty_list: Vec<BlockId>,
    pub(crate) dead_list: Vec<BlockId>,
    pub(crate) reserved: BlockId,
    /// Next logical address to probe when allocating.
    cursor: u32,
}

impl<D: FlashDevice> Ftl<D> {
    /// Wire the mapper to `device`. The last block becomes the reserved
    /// block; all others start out free.
    pub fn new(device: D, config: FtlConfig) -> Self {
        let geometry = device.geometry();
        let block_count = geometry.block_count;
        let pages_per_block = geometry.pages_per_block;

        let blocks = (0..block_count)
            .map(|_| BlockState::new(pages_per_block))
            .collect();
        let free_list = (0..block_count - 1).map(BlockId::new).collect();
        let rmap = vec![None; geometry.page_count() as usize];

        Self {
            device,
            config,
            map: vec![None; config.map_size as usize],
            rmap,
            blocks,
            free_list,
            dirty_list: Vec::new(),
            dead_list: Vec::new(),
            reserved: BlockId::new(block_count - 1),
            cursor: 0,
        }
    }

    /// The wrapped device.
    #[inline]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Mutable access to the wrapped device (counter resets and the
    /// like).
    #[inline]
    pub const fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The mapper configuration.
    #[inline]
    pub const fn config(&self) -> &FtlConfig {
        &self.config
    }

    /// The block currently held in reserve for reclamation copies.
    #[inline]
    pub const fn reserved_block(&self) -> BlockId {
        self.reserved
    }

    /// Page states and histogram of `block`.
    #[must_use]
    pub fn block_state(&self, block: BlockId) -> &BlockState {
        &self.blocks[block.index()]
    }

    /// Physical location of `lba`, or `None` when unmapped or out of
    /// range.
    #[must_use]
    pub fn translate(&self, lba: Lba) -> Option<Pba> {
        let pba = *self.map.get(lba.index())?;
        if let Some(p) = pba {
            debug_assert_eq!(
                self.rmap[self.page_index(p)],
                Some(lba),
                "reverse map out of sync for {lba}"
            );
        }
        pba
    }

    /// Allocate up to `count` logical pages and return the addresses that
    /// could actually be backed by physical pages. A short result means
    /// the device filled up mid-way; no error is raised for partial
    /// allocations.
    pub fn alloc_pages(&mut self, count: usize) -> Vec<Lba> {
        let mut out = Vec::with_capacity(count);
        if count == 0 {
            return out;
        }

        for _ in 0..self.config.map_size {
            let lba = Lba::new(self.cursor);
            if self.map[lba.index()].is_none() {
                let Some(pba) = self.alloc_new_page() else {
                    // Device full; leave the cursor on the unfilled slot.
                    return out;
                };
                self.register(lba, Some(pba));
                out.push(lba);
                if out.len() == count {
                    self.cursor = (self.cursor + 1) % self.config.map_size;
                    return out;
                }
            }
            self.cursor = (self.cursor + 1) % self.config.map_size;
        }

        out
    }

    /// Give a logical page back: a never-written allocation returns to
    /// `Free`, a live page becomes `Dead` and waits for reclamation. The
    /// mapping is cleared either way.
    ///
    /// # Errors
    /// [`FtlError::InvalidLba`] when unmapped,
    /// [`FtlError::InvalidPageState`] when the page is neither allocated
    /// nor live.
    pub fn release_page(&mut self, lba: Lba) -> Result<(), FtlError> {
        let pba = self.lookup(lba)?;
        match self.state(pba) {
            PageState::Allocated => self.set_page_state(pba, PageState::Free),
            PageState::Live => self.set_page_state(pba, PageState::Dead),
            state @ (PageState::Free | PageState::Dead) => {
                return Err(FtlError::InvalidPageState { lba, state });
            }
        }
        self.register(lba, None);
        Ok(())
    }

    /// Read `buf.len()` bytes starting at `offset` within the logical
    /// page `lba`.
    ///
    /// The device transfers whole pages, so the page is staged in a
    /// scratch buffer and the requested window copied out.
    ///
    /// # Errors
    /// [`FtlError::IoOverflow`] when the window exceeds the page,
    /// [`FtlError::InvalidLba`] when unmapped, and device failures.
    pub fn read_page(&mut self, lba: Lba, buf: &mut [u8], offset: usize) -> Result<(), FtlError> {
        self.check_window(offset, buf.len())?;
        let pba = self.lookup(lba)?;

        let mut scratch = vec![0u8; self.device.geometry().page_bytes()];
        self.device.read_page(pba, &mut scratch)?;
        buf.copy_from_slice(&scratch[offset..offset + buf.len()]);
        Ok(())
    }

    /// Write `buf` at `offset` within the logical page `lba`.
    ///
    /// A first write lands in the page allocated for `lba`; overwriting a
    /// live page goes out of place through a fresh allocation, and the
    /// superseded page is marked dead. The new mapping is published
    /// before the call returns.
    ///
    /// # Errors
    /// [`FtlError::IoOverflow`], [`FtlError::InvalidLba`],
    /// [`FtlError::InvalidPageState`] on free/dead targets,
    /// [`FtlError::NoMemory`] when no fresh page can be found for an
    /// overwrite, and device failures.
    pub fn write_page(&mut self, lba: Lba, buf: &[u8], offset: usize) -> Result<(), FtlError> {
        self.check_window(offset, buf.len())?;
        let mut pba = self.lookup(lba)?;

        match self.state(pba) {
            state @ (PageState::Free | PageState::Dead) => {
                return Err(FtlError::InvalidPageState { lba, state });
            }
            PageState::Live => {
                let fresh = self.alloc_new_page().ok_or(FtlError::NoMemory)?;
                // Reclamation may have relocated the old page; fetch the
                // mapping again before killing it.
                let old = self.lookup(lba)?;
                self.set_page_state(old, PageState::Dead);
                self.register(lba, Some(fresh));
                pba = fresh;
            }
            PageState::Allocated => {}
        }

        let mut scratch = vec![0u8; self.device.geometry().page_bytes()];
        scratch[offset..offset + buf.len()].copy_from_slice(buf);
        self.device.write_page(pba, &scratch)?;

        self.set_page_state(pba, PageState::Live);
        Ok(())
    }

    /// Claim one physical page: first fit in the dirty list, then the
    /// front of the free list, then one reclamation attempt before
    /// giving up.
    pub(crate) fn alloc_new_page(&mut self) -> Option<Pba> {
        let mut reclaimed = false;
        loop {
            if let Some(pba) = self.alloc_from_dirty() {
                return Some(pba);
            }
            if let Some(pba) = self.alloc_from_free() {
                return Some(pba);
            }
            if reclaimed {
                return None;
            }
            reclaimed = true;
            if let Err(err) = self.reclaim_block() {
                debug!("reclamation failed: {err}");
                return None;
            }
        }
    }

    /// Lowest free page of the oldest dirty block that still has one.
    fn alloc_from_dirty(&mut self) -> Option<Pba> {
        let block = self
            .dirty_list
            .iter()
            .copied()
            .find(|b| self.blocks[b.index()].free_pages() > 0)?;
        let page = self.blocks[block.index()].first_free()?;
        let pba = Pba::new(block, page);
        self.set_page_state(pba, PageState::Allocated);
        Some(pba)
    }

    /// Open a fresh block: claim its first page and move the block to
    /// the dirty list.
    fn alloc_from_free(&mut self) -> Option<Pba> {
        let block = self.free_list.pop_front()?;
        let pba = Pba::new(block, PageId::new(0));
        self.set_page_state(pba, PageState::Allocated);
        self.dirty_list.push(block);
        Some(pba)
    }

    fn check_window(&self, offset: usize, len: usize) -> Result<(), FtlError> {
        let page_bytes = self.device.geometry().page_bytes();
        if offset > page_bytes || len > page_bytes - offset {
            return Err(FtlError::IoOverflow {
                offset,
                len,
                page_bytes,
            });
        }
        Ok(())
    }

    fn lookup(&self, lba: Lba) -> Result<Pba, FtlError> {
        self.translate(lba).ok_or(FtlError::InvalidLba(lba))
    }

    pub(crate) fn state(&self, pba: Pba) -> PageState {
        self.blocks[pba.block.index()].state(pba.page)
    }

    pub(crate) fn page_index(&self, pba: Pba) -> usize {
        self.device.geometry().page_index(pba)
    }

    /// Install `lba → pba`, unhooking whatever either side pointed at
    /// before. `None` clears the mapping.
    pub(crate) fn register(&mut self, lba: Lba, pba: Option<Pba>) {
        if let Some(old) = self.map[lba.index()] {
            let idx = self.page_index(old);
            self.rmap[idx] = None;
        }
        self.map[lba.index()] = pba;
        if let Some(new) = pba {
            let idx = self.page_index(new);
            self.rmap[idx] = Some(lba);
        }
    }

    /// Transition one page, keeping the histogram current and moving the
    /// block to the dead list the moment its last page dies.
    pub(crate) fn set_page_state(&mut self, pba: Pba, next: PageState) {
        let pages_per_block = self.device.geometry().pages_per_block;
        let block = &mut self.blocks[pba.block.index()];
        let old = block.set(pba.page, next);
        if old != next && next == PageState::Dead && block.dead_pages() == pages_per_block {
            self.move_dirty_to_dead(pba.block);
        }
    }

    fn move_dirty_to_dead(&mut self, block: BlockId) {
        if let Some(pos) = self.dirty_list.iter().position(|&b| b == block) {
            self.dirty_list.remove(pos);
        }
        self.dead_list.push(block);
    }

    pub(crate) fn mark_block_free(&mut self, block: BlockId) {
        let pages_per_block = self.device.geometry().pages_per_block;
        for page in 0..pages_per_block {
            self.set_page_state(Pba::new(block, PageId::new(page)), PageState::Free);
        }
    }
}
