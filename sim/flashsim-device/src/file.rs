//! File-backed device variant.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::counters::{IoCounters, LatencyTotals};
use crate::geometry::DeviceGeometry;
use crate::ids::{BlockId, Pba};
use crate::mem::ERASED;
use crate::nand::NandCore;
use crate::{Capabilities, DeviceError, FlashDevice};

/// Flash array persisted as a flat image file.
///
/// The image is `block_count · pages_per_block · page_bytes` bytes,
/// block-major and page-minor, with no header; erased state is `0xFF`.
/// Programming overwrites the page and every mutation is synced to disk
/// before the operation returns.
#[derive(Debug)]
pub struct FileNand {
    core: NandCore,
    latency: LatencyTotals,
    image: File,
}

impl FileNand {
    /// Create (or truncate) the image at `path` and fill it with erased
    /// bytes.
    ///
    /// # Errors
    /// [`DeviceError::Geometry`] when the geometry is invalid,
    /// [`DeviceError::Io`] when the image cannot be created or written.
    pub fn create(geometry: DeviceGeometry, path: &Path) -> Result<Self, DeviceError> {
        let core = NandCore::new(geometry)?;
        let mut image = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let page = vec![ERASED; geometry.page_bytes()];
        for _ in 0..geometry.page_count() {
            image.write_all(&page)?;
        }
        image.sync_data()?;
        log::debug!(
            "created flash image at {} ({} bytes)",
            path.display(),
            geometry.total_bytes()
        );

        Ok(Self {
            core,
            latency: LatencyTotals::new(),
            image,
        })
    }
}

impl FlashDevice for FileNand {
    fn geometry(&self) -> &DeviceGeometry {
        &self.core.geometry
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COUNTER | Capabilities::LATENCY
    }

    fn erase_block(&mut self, block: BlockId) -> Result<(), DeviceError> {
        self.core.guard(block)?;
        let offset = block.index() * self.core.geometry.block_bytes();
        self.image.seek(SeekFrom::Start(offset as u64))?;
        let page = vec![ERASED; self.core.geometry.page_bytes()];
        for _ in 0..self.core.geometry.pages_per_block {
            self.image.write_all(&page)?;
        }
        self.image.sync_data()?;
        self.core.counters.note_erase(block);
        self.latency.add_erase(&self.core.geometry);
        Ok(())
    }

    fn read_page(&mut self, pba: Pba, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.core.guard_page(pba)?;
        assert_eq!(buf.len(), self.core.geometry.page_bytes(), "short page buffer");
        let offset = self.core.geometry.page_offset(pba);
        self.image.seek(SeekFrom::Start(offset as u64))?;
        self.image.read_exact(buf)?;
        self.core.counters.note_read(pba);
        self.latency.add_read(&self.core.geometry);
        Ok(())
    }

    fn write_page(&mut self, pba: Pba, buf: &[u8]) -> Result<(), DeviceError> {
        self.core.guard_page(pba)?;
        assert_eq!(buf.len(), self.core.geometry.page_bytes(), "short page buffer");
        let offset = self.core.geometry.page_offset(pba);
        self.image.seek(SeekFrom::Start(offset as u64))?;
        self.image.write_all(buf)?;
        self.image.sync_data()?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PageSize, ReadTiming};
    use crate::ids::PageId;

    fn geometry() -> DeviceGeometry {
        DeviceGeometry {
            block_count: 2,
            pages_per_block: 2,
            page_size: PageSize::new(16, 0),
            erase_limit: 10,
            read_time: ReadTiming::new(25, 1),
            program_time: 200,
            erase_time: 1500,
        }
    }

    #[test]
    fn image_starts_erased_with_exact_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.image");
        let mut dev = FileNand::create(geometry(), &path).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 64);

        let mut buf = [0u8; 16];
        dev.read_page(Pba::new(BlockId::new(1), PageId::new(1)), &mut buf)
            .unwrap();
        assert_eq!(buf, [ERASED; 16]);
    }

    #[test]
    fn write_read_erase_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.image");
        let mut dev = FileNand::create(geometry(), &path).unwrap();

        let pba = Pba::new(BlockId::new(0), PageId::new(1));
        let pattern = [0x5A; 16];
        let mut buf = [0u8; 16];

        dev.write_page(pba, &pattern).unwrap();
        dev.read_page(pba, &mut buf).unwrap();
        assert_eq!(buf, pattern);

        // Unlike the in-memory NAND, the file image overwrites.
        dev.write_page(pba, &[0xA5; 16]).unwrap();
        dev.read_page(pba, &mut buf).unwrap();
        assert_eq!(buf, [0xA5; 16]);

        dev.erase_block(BlockId::new(0)).unwrap();
        dev.read_page(pba, &mut buf).unwrap();
        assert_eq!(buf, [ERASED; 16]);
    }

    #[test]
    fn wear_out_applies_to_the_image_too() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.image");
        let mut dev = FileNand::create(geometry(), &path).unwrap();

        for _ in 0..10 {
            dev.erase_block(BlockId::new(0)).unwrap();
        }
        assert!(matches!(
            dev.erase_block(BlockId::new(0)),
            Err(DeviceError::BlockBroken(_))
        ));
    }
}
