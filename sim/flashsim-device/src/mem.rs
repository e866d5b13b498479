//! In-memory device variant with a faithful NAND payload.

use crate::counters::{IoCounters, LatencyTotals};
use crate::geometry::DeviceGeometry;
use crate::ids::{BlockId, Pba};
use crate::nand::NandCore;
use crate::{Capabilities, DeviceError, FlashDevice};

/// Byte value of an erased cell: all bits set.
pub(crate) const ERASED: u8 = 0xFF;

/// Memory-resident flash array.
///
/// The whole array lives in a single flat image, block-major and
/// page-minor. Erase fills a block with `0xFF`; programming AND-s the
/// incoming buffer into the page, so bits only ever clear between erases
/// (NAND semantics: rewriting a page without an erase corrupts it the
/// same way real hardware would).
#[derive(Debug, Clone)]
pub struct MemNand {
    core: NandCore,
    latency: LatencyTotals,
    image: Vec<u8>,
}

impl MemNand {
    /// # Errors
    /// [`DeviceError::Geometry`] when the geometry is invalid.
    pub fn new(geometry: DeviceGeometry) -> Result<Self, DeviceError> {
        let core = NandCore::new(geometry)?;
        let image = vec![ERASED; geometry.total_bytes()];
        Ok(Self {
            core,
            latency: LatencyTotals::new(),
            image,
        })
    }

    fn page_range(&self, pba: Pba) -> core::ops::Range<usize> {
        let start = self.core.geometry.page_offset(pba);
        start..start + self.core.geometry.page_bytes()
    }
}

impl FlashDevice for MemNand {
    fn geometry(&self) -> &DeviceGeometry {
        &self.core.geometry
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COUNTER | Capabilities::LATENCY
    }

    fn erase_block(&mut self, block: BlockId) -> Result<(), DeviceError> {
        self.core.guard(block)?;
        let start = block.index() * self.core.geometry.block_bytes();
        self.image[start..start + self.core.geometry.block_bytes()].fill(ERASED);
        self.core.counters.note_erase(block);
        self.latency.add_erase(&self.core.geometry);
        Ok(())
    }

    fn read_page(&mut self, pba: Pba, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.core.guard_page(pba)?;
        assert_eq!(buf.len(), self.core.geometry.page_bytes(), "short page buffer");
        buf.copy_from_slice(&self.image[self.page_range(pba)]);
        self.core.counters.note_read(pba);
        self.latency.add_read(&self.core.geometry);
        Ok(())
    }

    fn write_page(&mut self, pba: Pba, buf: &[u8]) -> Result<(), DeviceError> {
        self.core.guard_page(pba)?;
        assert_eq!(buf.len(), self.core.geometry.page_bytes(), "short page buffer");
        let range = self.page_range(pba);
        for (cell, byte) in self.image[range].iter_mut().zip(buf) {
            *cell &= *byte;
        }
        self.core.counters.note_write(pba);
        self.latency.add_write(&self.core.geometry);
        Ok(())
    }

    fn counters(&self) -> Option<&IoCounters> {
        Some(&self.core.counters)
    }

    fn counters_mut(&mut self) -> Option<&mut IoCounters> {
        Some(&mut self.core.counters)
    }

    fn latencies(&self) -> Option<&LatencyTotals> {
        Some(&self.latency)
    }

    fn latencies_mut(&mut self) -> Option<&mut LatencyTotals> {
        Some(&mut self.latency)
    }
}
