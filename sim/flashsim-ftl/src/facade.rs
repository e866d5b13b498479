//! Simulator facade: module selection and wiring.
//!
//! [`FlashSim::initialize`] builds the selected device variant and the
//! selected translation algorithm and wires them together. The facade
//! owns the only handle to the stack; dropping it tears everything down
//! in reverse construction order.

use std::path::PathBuf;

use flashsim_device::{
    CounterNand, DeviceError, DeviceGeometry, FileNand, FlashDevice, IoCounters, LatencyTotals,
    Lba, MemNand, TimedNand,
};
use log::debug;

use crate::ftl::{Ftl, FtlConfig, FtlError};

/// Default image path of the file-backed device when none is configured.
const DEFAULT_IMAGE: &str = "flash.image";

/// Device variant selectors. The numeric codes are the stable wire ids
/// used by external configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfdModuleId {
    /// Counters only, no payload.
    Nand01,
    /// Counters and latency accounting.
    Nand02,
    /// Counters, latency, and an in-memory page image.
    Nand03,
    /// Counters, latency, and a file-backed page image.
    Nand04,
}

impl VfdModuleId {
    /// Decode a numeric selector.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Nand01),
            2 => Some(Self::Nand02),
            3 => Some(Self::Nand03),
            4 => Some(Self::Nand04),
            _ => None,
        }
    }

    /// The numeric selector of this variant.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Nand01 => 1,
            Self::Nand02 => 2,
            Self::Nand03 => 3,
            Self::Nand04 => 4,
        }
    }
}

/// Translation-layer selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtlModuleId {
    /// The page-mapping FTL with reserved-block reclamation.
    Ftl01,
}

impl FtlModuleId {
    /// Decode a numeric selector.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Ftl01),
            _ => None,
        }
    }

    /// The numeric selector of this algorithm.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Ftl01 => 1,
        }
    }
}

/// Device half of the simulator configuration.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub module: VfdModuleId,
    pub geometry: DeviceGeometry,
    /// Image path for [`VfdModuleId::Nand04`]; `flash.image` when unset.
    pub image: Option<PathBuf>,
}

/// Translation half of the simulator configuration.
#[derive(Debug, Clone, Copy)]
pub struct FtlSpec {
    pub module: FtlModuleId,
    pub config: FtlConfig,
}

/// Facade failures.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A numeric selector did not name a known module.
    #[error("unknown module selector {0}")]
    WrongModuleId(u32),
    /// The selected device could not be brought up.
    #[error("module initialization failed")]
    ModuleInitFailed(#[source] DeviceError),
    /// The device does not expose the queried instrumentation.
    #[error("the device does not expose that interface")]
    UnsupportedInterface,
    /// A data-plane operation failed.
    #[error(transparent)]
    Ftl(#[from] FtlError),
}

/// The assembled simulator: one device variant behind one translation
/// layer.
pub struct FlashSim {
    ftl: Ftl<Box<dyn FlashDevice>>,
}

impl FlashSim {
    /// Build and wire the configured modules.
    ///
    /// # Errors
    /// [`SimError::ModuleInitFailed`] when the device rejects its
    /// geometry or its image file cannot be created.
    pub fn initialize(device: &DeviceSpec, ftl: &FtlSpec) -> Result<Self, SimError> {
        let dev: Box<dyn FlashDevice> = match device.module {
            VfdModuleId::Nand01 => Box::new(
                CounterNand::new(device.geometry).map_err(SimError::ModuleInitFailed)?,
            ),
            VfdModuleId::Nand02 => {
                Box::new(TimedNand::new(device.geometry).map_err(SimError::ModuleInitFailed)?)
            }
            VfdModuleId::Nand03 => {
                Box::new(MemNand::new(device.geometry).map_err(SimError::ModuleInitFailed)?)
            }
            VfdModuleId::Nand04 => {
                let path = device
                    .image
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE));
                Box::new(
                    FileNand::create(device.geometry, &path).map_err(SimError::ModuleInitFailed)?,
                )
            }
        };

        let FtlModuleId::Ftl01 = ftl.module;
        debug!(
            "flash simulator up: device {:?}, {} blocks x {} pages x {} bytes, map size {}",
            device.module,
            device.geometry.block_count,
            device.geometry.pages_per_block,
            device.geometry.page_bytes(),
            ftl.config.map_size
        );
        Ok(Self {
            ftl: Ftl::new(dev, ftl.config),
        })
    }

    /// Decode numeric module selectors from external configuration.
    ///
    /// # Errors
    /// [`SimError::WrongModuleId`] for a selector naming no module.
    pub fn module_ids(
        vfd_code: u32,
        ftl_code: u32,
    ) -> Result<(VfdModuleId, FtlModuleId), SimError> {
        let Some(vfd) = VfdModuleId::from_code(vfd_code) else {
            return Err(SimError::WrongModuleId(vfd_code));
        };
        let Some(ftl) = FtlModuleId::from_code(ftl_code) else {
            return Err(SimError::WrongModuleId(ftl_code));
        };
        Ok((vfd, ftl))
    }

    /// Allocate up to `count` logical pages; the result length is the
    /// number actually allocated.
    pub fn alloc_pages(&mut self, count: usize) -> Vec<Lba> {
        self.ftl.alloc_pages(count)
    }

    /// Release one logical page.
    ///
    /// # Errors
    /// See [`Ftl::release_page`].
    pub fn release_page(&mut self, lba: Lba) -> Result<(), SimError> {
        Ok(self.ftl.release_page(lba)?)
    }

    /// Read a window of a logical page.
    ///
    /// # Errors
    /// See [`Ftl::read_page`].
    pub fn read_page(&mut self, lba: Lba, buf: &mut [u8], offset: usize) -> Result<(), SimError> {
        Ok(self.ftl.read_page(lba, buf, offset)?)
    }

    /// Write a window of a logical page.
    ///
    /// # Errors
    /// See [`Ftl::write_page`].
    pub fn write_page(&mut self, lba: Lba, buf: &[u8], offset: usize) -> Result<(), SimError> {
        Ok(self.ftl.write_page(lba, buf, offset)?)
    }

    /// The translation layer.
    #[inline]
    pub const fn ftl(&self) -> &Ftl<Box<dyn FlashDevice>> {
        &self.ftl
    }

    /// Mutable access to the translation layer.
    #[inline]
    pub const fn ftl_mut(&mut self) -> &mut Ftl<Box<dyn FlashDevice>> {
        &mut self.ftl
    }

    /// The device behind the translation layer.
    #[inline]
    pub fn device(&self) -> &dyn FlashDevice {
        &**self.ftl.device()
    }

    /// Mutable device access (counter and latency resets).
    #[inline]
    pub fn device_mut(&mut self) -> &mut dyn FlashDevice {
        &mut **self.ftl.device_mut()
    }

    /// The device's I/O counters.
    ///
    /// # Errors
    /// [`SimError::UnsupportedInterface`] when the device variant lacks
    /// the counter capability.
    pub fn counters(&self) -> Result<&IoCounters, SimError> {
        self.device()
            .counters()
            .ok_or(SimError::UnsupportedInterface)
    }

    /// The device's latency totals.
    ///
    /// # Errors
    /// [`SimError::UnsupportedInterface`] when the device variant lacks
    /// the latency capability.
    pub fn latencies(&self) -> Result<&LatencyTotals, SimError> {
        self.device()
            .latencies()
            .ok_or(SimError::UnsupportedInterface)
    }
}
