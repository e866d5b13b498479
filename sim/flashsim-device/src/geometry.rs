//! Device geometry and timing configuration.
//!
//! A [`DeviceGeometry`] is fixed at initialization time and shared by every
//! device variant. It describes the array shape (blocks × pages × bytes),
//! the per-block erase budget, and the abstract operation timings used by
//! the latency-accounting variants.

use crate::ids::{BlockId, Pba};

/// Byte size of one page, split into the data area and the spare
/// (out-of-band) area. I/O always covers the full page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    /// Data area size in bytes.
    pub data: u32,
    /// Spare (out-of-band) area size in bytes.
    pub spare: u32,
}

impl PageSize {
    #[inline]
    #[must_use]
    pub const fn new(data: u32, spare: u32) -> Self {
        Self { data, spare }
    }

    /// Total page size: data plus spare.
    #[inline]
    #[must_use]
    pub const fn total(self) -> u32 {
        self.data + self.spare
    }
}

/// Abstract read timing: a fixed random-access cost plus a serial cost per
/// transferred byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadTiming {
    /// Cost of positioning a random read (time units).
    pub random: u64,
    /// Serial transfer cost per byte (time units).
    pub serial: u64,
}

impl ReadTiming {
    #[inline]
    #[must_use]
    pub const fn new(random: u64, serial: u64) -> Self {
        Self { random, serial }
    }
}

/// Shape and timing of a simulated flash array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceGeometry {
    /// Number of erase blocks. At least two (one is held in reserve by the
    /// translation layer).
    pub block_count: u32,
    /// Number of pages per erase block, at least one.
    pub pages_per_block: u32,
    /// Page size (data + spare).
    pub page_size: PageSize,
    /// Number of erase cycles a block survives before it breaks.
    pub erase_limit: u32,
    /// Read timing parameters.
    pub read_time: ReadTiming,
    /// Cost of one page program operation (time units).
    pub program_time: u64,
    /// Cost of one block erase operation (time units).
    pub erase_time: u64,
}

/// Rejected geometry configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("at least two erase blocks are required, got {0}")]
    TooFewBlocks(u32),
    #[error("blocks must hold at least one page")]
    NoPages,
    #[error("page data area must be non-empty")]
    EmptyPage,
}

impl DeviceGeometry {
    /// Check the structural constraints; every device constructor calls
    /// this before allocating state.
    ///
    /// # Errors
    /// A [`GeometryError`] naming the violated constraint.
    pub const fn validate(&self) -> Result<(), GeometryError> {
        if self.block_count < 2 {
            return Err(GeometryError::TooFewBlocks(self.block_count));
        }
        if self.pages_per_block == 0 {
            return Err(GeometryError::NoPages);
        }
        if self.page_size.data == 0 {
            return Err(GeometryError::EmptyPage);
        }
        Ok(())
    }

    /// Total number of page slots on the device.
    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> u32 {
        self.block_count * self.pages_per_block
    }

    /// Full byte size of one page.
    #[inline]
    #[must_use]
    pub const fn page_bytes(&self) -> usize {
        self.page_size.total() as usize
    }

    /// Byte size of one erase block.
    #[inline]
    #[must_use]
    pub const fn block_bytes(&self) -> usize {
        self.page_bytes() * self.pages_per_block as usize
    }

    /// Byte size of the whole array image.
    #[inline]
    #[must_use]
    pub const fn total_bytes(&self) -> usize {
        self.block_bytes() * self.block_count as usize
    }

    /// Flat page index of `pba`, block-major and page-minor.
    #[inline]
    #[must_use]
    pub const fn page_index(&self, pba: Pba) -> usize {
        pba.block.index() * self.pages_per_block as usize + pba.page.index()
    }

    /// Byte offset of the page `pba` within the array image.
    #[inline]
    #[must_use]
    pub const fn page_offset(&self, pba: Pba) -> usize {
        self.page_index(pba) * self.page_bytes()
    }

    /// Whether `pba` addresses a page slot of this array.
    #[inline]
    #[must_use]
    pub const fn contains(&self, pba: Pba) -> bool {
        pba.block.get() < self.block_count && pba.page.get() < self.pages_per_block
    }

    /// Whether `block` is a block of this array.
    #[inline]
    #[must_use]
    pub const fn contains_block(&self, block: BlockId) -> bool {
        block.get() < self.block_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PageId;

    fn geometry() -> DeviceGeometry {
        DeviceGeometry {
            block_count: 4,
            pages_per_block: 4,
            page_size: PageSize::new(28, 4),
            erase_limit: 10,
            read_time: ReadTiming::new(25, 1),
            program_time: 200,
            erase_time: 1500,
        }
    }

    #[test]
    fn derived_sizes() {
        let g = geometry();
        assert_eq!(g.page_count(), 16);
        assert_eq!(g.page_bytes(), 32);
        assert_eq!(g.block_bytes(), 128);
        assert_eq!(g.total_bytes(), 512);
    }

    #[test]
    fn page_indexing_is_block_major() {
        let g = geometry();
        let pba = Pba::new(BlockId::new(2), PageId::new(3));
        assert_eq!(g.page_index(pba), 11);
        assert_eq!(g.page_offset(pba), 11 * 32);
    }

    #[test]
    fn validation_rejects_degenerate_shapes() {
        let mut g = geometry();
        g.block_count = 1;
        assert_eq!(g.validate(), Err(GeometryError::TooFewBlocks(1)));

        let mut g = geometry();
        g.pages_per_block = 0;
        assert_eq!(g.validate(), Err(GeometryError::NoPages));

        let mut g = geometry();
        g.page_size = PageSize::new(0, 8);
        assert_eq!(g.validate(), Err(GeometryError::EmptyPage));

        assert!(geometry().validate().is_ok());
    }
}
