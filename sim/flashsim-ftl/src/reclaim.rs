//! Garbage collection and wear leveling.
//!
//! Reclamation runs when allocation finds no free page. Fully dead
//! blocks are the cheap prey: they are erased wholesale and returned to
//! the free list. Otherwise one victim is evicted through the reserved
//! block: its surviving pages are packed into the reserve, the victim is
//! erased and becomes the new reserve. When the erase-count gap between
//! the most-dirty and the least-erased block exceeds the configured
//! threshold, the contents of the least-erased block are rotated through
//! first so that the rarely-erased block takes the next round of wear.

use flashsim_device::{BlockId, FlashDevice, IoCounters, PageId, Pba};
use log::{debug, trace};

use crate::block::PageState;
use crate::ftl::{Ftl, FtlError};

impl<D: FlashDevice> Ftl<D> {
    /// Make free pages available by erasing reclaimable blocks.
    ///
    /// # Errors
    /// [`FtlError::UnsupportedObject`] when the device has no erase
    /// counters, [`FtlError::NotDirty`] when no block holds a dead page,
    /// and device failures. A block that breaks during reclamation stays
    /// where it was; it is never retried.
    pub fn reclaim_block(&mut self) -> Result<(), FtlError> {
        if self.device.counters().is_none() {
            return Err(FtlError::UnsupportedObject);
        }

        // Fully dead blocks need no copying at all.
        if !self.dead_list.is_empty() {
            trace!("erasing {} fully dead block(s)", self.dead_list.len());
            while let Some(&block) = self.dead_list.first() {
                self.device.erase_block(block)?;
                self.mark_block_free(block);
                self.dead_list.remove(0);
                self.free_list.push_back(block);
            }
            return Ok(());
        }

        if self.dirty_list.is_empty() {
            return Err(FtlError::NotDirty);
        }

        let counters = self.device.counters().ok_or(FtlError::UnsupportedObject)?;
        let (most_dirty, most_dead, least_erased, wear_gap) = self.pick_victims(counters);
        if most_dead == 0 {
            return Err(FtlError::NotDirty);
        }

        if wear_gap > self.config().wear_leveling_threshold {
            debug!(
                "wear leveling: rotating block {least_erased} through the reserve, \
                 reclaiming {most_dirty} (gap {wear_gap})"
            );
            let reserve = self.reserved;
            self.relocate_block(least_erased, reserve)?;
            self.retire_into_reserved(most_dirty, least_erased)
        } else {
            trace!("garbage collecting block {most_dirty} ({most_dead} dead pages)");
            let reserve = self.reserved;
            self.retire_into_reserved(most_dirty, reserve)
        }
    }

    /// Scan the dirty list for the block with the most dead pages and
    /// the block with the fewest erases (first match wins ties), and the
    /// erase-count gap between the two.
    fn pick_victims(&self, counters: &IoCounters) -> (BlockId, u32, BlockId, u32) {
        let mut most_dirty = self.dirty_list[0];
        let mut most_dead = self.blocks[most_dirty.index()].dead_pages();
        let mut least_erased = self.dirty_list[0];
        let mut least_erases = counters.erase_count(least_erased);

        for &block in &self.dirty_list[1..] {
            let dead = self.blocks[block.index()].dead_pages();
            if dead > most_dead {
                most_dead = dead;
                most_dirty = block;
            }
            let erases = counters.erase_count(block);
            if erases < least_erases {
                least_erases = erases;
                least_erased = block;
            }
        }

        let gap = counters.erase_count(most_dirty) - least_erases;
        (most_dirty, most_dead, least_erased, gap)
    }

    /// Evict `victim` through `target` and install it as the new
    /// reserved block.
    ///
    /// This is the one place that mutates the reserve: the victim's
    /// surviving pages are packed into `target`, the victim is erased,
    /// leaves the dirty list, and replaces the previous reserve, which
    /// joins the dirty list (it now carries relocated pages, or will
    /// receive allocations soon).
    fn retire_into_reserved(&mut self, victim: BlockId, target: BlockId) -> Result<(), FtlError> {
        self.relocate_block(victim, target)?;

        if let Some(pos) = self.dirty_list.iter().position(|&b| b == victim) {
            self.dirty_list.remove(pos);
        }
        let previous = std::mem::replace(&mut self.reserved, victim);
        self.dirty_list.push(previous);
        Ok(())
    }

    /// Pack the live and allocated pages of `src` into `dst` starting at
    /// page 0, rewiring the logical mappings, then erase `src`.
    ///
    /// Live pages are copied through the device; allocated pages carry
    /// no data yet, so only their state and mapping move.
    fn relocate_block(&mut self, src: BlockId, dst: BlockId) -> Result<(), FtlError> {
        let geometry = *self.device.geometry();
        let mut scratch = vec![0u8; geometry.page_bytes()];
        let mut slot = 0u32;

        for page in 0..geometry.pages_per_block {
            let from = Pba::new(src, PageId::new(page));
            let to = Pba::new(dst, PageId::new(slot));
            match self.state(from) {
                PageState::Live => {
                    self.device.read_page(from, &mut scratch)?;
                    self.device.write_page(to, &scratch)?;
                    self.set_page_state(to, PageState::Live);
                    self.remap(from, to);
                    slot += 1;
                }
                PageState::Allocated => {
                    self.set_page_state(to, PageState::Allocated);
                    self.remap(from, to);
                    slot += 1;
                }
                PageState::Free | PageState::Dead => {}
            }
        }

        self.device.erase_block(src)?;
        self.mark_block_free(src);
        Ok(())
    }

    /// Point the logical page that lived at `from` to `to`.
    fn remap(&mut self, from: Pba, to: Pba) {
        let idx = self.page_index(from);
        debug_assert!(
            self.rmap[idx].is_some(),
            "surviving page {from} without a mapping"
        );
        if let Some(lba) = self.rmap[idx] {
            self.register(lba, Some(to));
        }
    }
}
