//! # Flash Translation Layer
//!
//! Page-mapping translation on top of a
//! [virtual flash device](flashsim_device), with out-of-place writes,
//! reserved-block garbage collection, and wear leveling.
//!
//! ## What you get
//!
//! - [`Ftl`]: the mapper with logical address allocation, release, windowed
//!   page I/O, and reclamation.
//! - [`PageState`]/[`BlockState`]: per-page lifecycle tracking with
//!   per-block histograms.
//! - [`FlashSim`]: the facade that selects a device variant and the
//!   translation algorithm by module id and wires them together.
//!
//! ## Allocation and reclamation
//!
//! Logical addresses are probed round-robin through the map. Physical
//! pages come from the oldest dirty block that still has a free page,
//! then from the front of the free list; when both run dry, reclamation
//! erases fully dead blocks, or evicts the block with the most dead
//! pages by packing its surviving pages into the reserved block. A
//! wear-leveling rotation kicks in when the erase-count gap between the
//! most-dirty and the least-erased block exceeds the configured
//! threshold.
//!
//! ```no_run
//! use flashsim_device::{DeviceGeometry, PageSize, ReadTiming};
//! use flashsim_ftl::{DeviceSpec, FlashSim, FtlConfig, FtlModuleId, FtlSpec, VfdModuleId};
//!
//! let device = DeviceSpec {
//!     module: VfdModuleId::Nand03,
//!     geometry: DeviceGeometry {
//!         block_count: 1024,
//!         pages_per_block: 64,
//!         page_size: PageSize::new(2048, 0),
//!         erase_limit: 100_000,
//!         read_time: ReadTiming::new(25, 0),
//!         program_time: 200,
//!         erase_time: 1500,
//!     },
//!     image: None,
//! };
//! let ftl = FtlSpec {
//!     module: FtlModuleId::Ftl01,
//!     config: FtlConfig {
//!         map_size: 65_536,
//!         wear_leveling_threshold: 4,
//!     },
//! };
//!
//! let mut sim = FlashSim::initialize(&device, &ftl)?;
//! let lbas = sim.alloc_pages(2);
//! sim.write_page(lbas[0], &[0x42; 2048], 0)?;
//! # Ok::<(), flashsim_ftl::SimError>(())
//! ```

mod block;
mod facade;
mod ftl;
mod reclaim;

pub use block::{BlockState, PageState};
pub use facade::{DeviceSpec, FlashSim, FtlModuleId, FtlSpec, SimError, VfdModuleId};
pub use ftl::{Ftl, FtlConfig, FtlError};
