//! Bookkeeping-only device variants.
//!
//! [`CounterNand`] tracks I/O counters without holding any page payload;
//! [`TimedNand`] adds latency accounting on top. Both are useful when an
//! experiment only measures I/O patterns and wear, not data contents.

use crate::counters::{IoCounters, LatencyTotals};
use crate::geometry::DeviceGeometry;
use crate::ids::{BlockId, Pba};
use crate::{Capabilities, DeviceError, FlashDevice};

/// State every NAND variant carries: the geometry and the I/O counters.
#[derive(Debug, Clone)]
pub(crate) struct NandCore {
    pub(crate) geometry: DeviceGeometry,
    pub(crate) counters: IoCounters,
}

impl NandCore {
    pub(crate) fn new(geometry: DeviceGeometry) -> Result<Self, DeviceError> {
        geometry.validate()?;
        let counters = IoCounters::new(&geometry);
        Ok(Self { geometry, counters })
    }

    /// Fail with [`DeviceError::BlockBroken`] once the block's erase
    /// counter has reached the limit. Checked by every operation, so a
    /// worn-out block rejects reads and writes too, not just erases.
    pub(crate) fn guard(&self, block: BlockId) -> Result<(), DeviceError> {
        assert!(self.geometry.contains_block(block), "block {block} out of range");
        if self.counters.erase_count(block) >= self.geometry.erase_limit {
            return Err(DeviceError::BlockBroken(block));
        }
        Ok(())
    }

    pub(crate) fn guard_page(&self, pba: Pba) -> Result<(), DeviceError> {
        assert!(self.geometry.contains(pba), "page {pba} out of range");
        self.guard(pba.block)
    }
}

/// Counter-only device: structurally valid reads, programs, and erases,
/// without a page payload.
#[derive(Debug, Clone)]
pub struct CounterNand {
    core: NandCore,
}

impl CounterNand {
    /// # Errors
    /// [`DeviceError::Geometry`] when the geometry is invalid.
    pub fn new(geometry: DeviceGeometry) -> Result<Self, DeviceError> {
        Ok(Self {
            core: NandCore::new(geometry)?,
        })
    }
}

impl FlashDevice for CounterNand {
    fn geometry(&self) -> &DeviceGeometry {
        &self.core.geometry
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COUNTER
    }

    fn erase_block(&mut self, block: BlockId) -> Result<(), DeviceError> {
        self.core.guard(block)?;
        self.core.counters.note_erase(block);
        Ok(())
    }

    fn read_page(&mut self, pba: Pba, _buf: &mut [u8]) -> Result<(), DeviceError> {
        self.core.guard_page(pba)?;
        self.core.counters.note_read(pba);
        Ok(())
    }

    fn write_page(&mut self, pba: Pba, _buf: &[u8]) -> Result<(), DeviceError> {
        self.core.guard_page(pba)?;
        self.core.counters.note_write(pba);
        Ok(())
    }

    fn counters(&self) -> Option<&IoCounters> {
        Some(&self.core.counters)
    }

    fn counters_mut(&mut self) -> Option<&mut IoCounters> {
        Some(&mut self.core.counters)
    }

    fn latencies(&self) -> Option<&LatencyTotals> {
        None
    }

    fn latencies_mut(&mut self) -> Option<&mut LatencyTotals> {
        None
    }
}

/// Counter + latency device, still without a payload.
#[derive(Debug, Clone)]
pub struct TimedNand {
    core: NandCore,
    latency: LatencyTotals,
}

impl TimedNand {
    /// # Errors
    /// [`DeviceError::Geometry`] when the geometry is invalid.
    pub fn new(geometry: DeviceGeometry) -> Result<Self, DeviceError> {
        Ok(Self {
            core: NandCore::new(geometry)?,
            latency: LatencyTotals::new(),
        })
    }
}

impl FlashDevice for TimedNand {
    fn geometry(&self) -> &DeviceGeometry {
        &self.core.geometry
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COUNTER | Capabilities::LATENCY
    }

    fn erase_block(&mut self, block: BlockId) -> Result<(), DeviceError> {
        self.core.guard(block)?;
        self.core.counters.note_erase(block);
        self.latency.add_erase(&self.core.geometry);
        Ok(())
    }

    fn read_page(&mut self, pba: Pba, _buf: &mut [u8]) -> Result<(), DeviceError> {
        self.core.guard_page(pba)?;
        self.core.counters.note_read(pba);
        self.latency.add_read(&self.core.geometry);
        Ok(())
    }

    fn write_page(&mut self, pba: Pba, _buf: &[u8]) -> Result<(), DeviceError> {
        self.core.guard_page(pba)?;
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
