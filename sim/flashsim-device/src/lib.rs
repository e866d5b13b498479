//! # Virtual Flash Device
//!
//! Byte-addressable NAND flash array simulation at page/block granularity.
//!
//! ## What you get
//!
//! - Typed [`BlockId`]/[`PageId`]/[`Pba`]/[`Lba`] identifiers.
//! - A [`DeviceGeometry`] describing the array shape, erase budget, and
//!   abstract operation timings.
//! - The [`FlashDevice`] trait: page read/program, block erase, wear-out
//!   failure, and capability-gated counter/latency access.
//! - Four device variants with progressive capability:
//!
//! | Variant | Counters | Latency | Payload |
//! |---------|----------|---------|---------|
//! | [`CounterNand`] | yes | no | no |
//! | [`TimedNand`] | yes | yes | no |
//! | [`MemNand`] | yes | yes | in-memory image |
//! | [`FileNand`] | yes | yes | file-backed image |
//!
//! ## Semantics
//!
//! Erase is the only way back: it fills the whole block with `0xFF` and is
//! bounded by the geometry's `erase_limit`, after which every operation on
//! the block fails with [`DeviceError::BlockBroken`]; the simulator never
//! recovers a worn-out block. Programming follows NAND rules on the
//! in-memory variant (bits can only clear, so the incoming buffer is
//! AND-ed into the page); the file-backed variant overwrites and flushes
//! after every mutation.
//!
//! I/O is whole-page: `read_page`/`write_page` take a buffer of exactly
//! `page_bytes` and the translation layer on top carves out sub-page
//! windows.

mod counters;
mod file;
mod geometry;
mod ids;
mod mem;
mod nand;

pub use counters::{IoCounters, LatencyTotals};
pub use file::FileNand;
pub use geometry::{DeviceGeometry, GeometryError, PageSize, ReadTiming};
pub use ids::{BlockId, Lba, PageId, Pba};
pub use mem::MemNand;
pub use nand::{CounterNand, TimedNand};

bitflags::bitflags! {
    /// Optional instrumentation a device variant advertises.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// Per-page read/write and per-block erase counters.
        const COUNTER = 1 << 0;
        /// Cumulative read/write/erase latency totals.
        const LATENCY = 1 << 1;
    }
}

/// Failures of the device data plane.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The configured geometry is structurally invalid.
    #[error("invalid device geometry")]
    Geometry(#[from] GeometryError),
    /// The block reached its erase limit; it stays broken for good.
    #[error("block {0} has reached its erase limit")]
    BlockBroken(BlockId),
    /// The backing image file failed.
    #[error("flash image I/O failed")]
    Io(#[from] std::io::Error),
}

/// A simulated flash array.
///
/// Implementations share the wear-out contract: once a block's erase
/// counter reaches the geometry's `erase_limit`, every erase, read, and
/// write on that block fails with [`DeviceError::BlockBroken`].
///
/// Buffers passed to [`read_page`](Self::read_page) and
/// [`write_page`](Self::write_page) must span exactly
/// [`DeviceGeometry::page_bytes`]; sub-page windowing is the caller's
/// concern. Variants without a payload ignore the buffer contents and
/// only keep the books.
///
/// # Panics
///
/// Implementations panic when addressed outside the configured geometry;
/// the translation layer validates addresses before they reach the
/// device.
pub trait FlashDevice {
    /// The array shape this device was initialized with.
    fn geometry(&self) -> &DeviceGeometry;

    /// The instrumentation this variant advertises.
    fn capabilities(&self) -> Capabilities;

    /// Erase one block: resets its pages to `0xFF` (payload variants) and
    /// consumes one erase cycle.
    ///
    /// # Errors
    /// [`DeviceError::BlockBroken`] once the erase limit is reached.
    fn erase_block(&mut self, block: BlockId) -> Result<(), DeviceError>;

    /// Read one full page into `buf`.
    ///
    /// # Errors
    /// [`DeviceError::BlockBroken`] on a worn-out block.
    fn read_page(&mut self, pba: Pba, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// Program one full page from `buf`.
    ///
    /// # Errors
    /// [`DeviceError::BlockBroken`] on a worn-out block.
    fn write_page(&mut self, pba: Pba, buf: &[u8]) -> Result<(), DeviceError>;

    /// I/O counters, if the [`Capabilities::COUNTER`] capability is
    /// present.
    fn counters(&self) -> Option<&IoCounters>;

    /// Mutable counter access (for the reset operations).
    fn counters_mut(&mut self) -> Option<&mut IoCounters>;

    /// Latency totals, if the [`Capabilities::LATENCY`] capability is
    /// present.
    fn latencies(&self) -> Option<&LatencyTotals>;

    /// Mutable latency access (for the reset operations).
    fn latencies_mut(&mut self) -> Option<&mut LatencyTotals>;
}

impl<D: FlashDevice + ?Sized> FlashDevice for Box<D> {
    fn geometry(&self) -> &DeviceGeometry {
        (**self).geometry()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn erase_block(&mut self, block: BlockId) -> Result<(), DeviceError> {
        (**self).erase_block(block)
    }

    fn read_page(&mut self, pba: Pba, buf: &mut [u8]) -> Result<(), DeviceError> {
        (**self).read_page(pba, buf)
    }

    fn write_page(&mut self, pba: Pba, buf: &[u8]) -> Result<(), DeviceError> {
        (**self).write_page(pba, buf)
    }

    fn counters(&self) -> Option<&IoCounters> {
        (**self).counters()
    }

    fn counters_mut(&mut self) -> Option<&mut IoCounters> {
        (**self).counters_mut()
    }

    fn latencies(&self) -> Option<&LatencyTotals> {
        (**self).latencies()
    }

    fn latencies_mut(&mut self) -> Option<&mut LatencyTotals> {
        (**self).latencies_mut()
    }
}
