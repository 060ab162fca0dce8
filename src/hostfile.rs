//! Host-file-backed block device
//!
//! Backs a device with a plain file whose bytes are a linear image of the
//! media starting at offset 0. Intended for disk-image tools and the test
//! harness; only built with the `std` feature.

use alloc::vec;
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::device::{BlockDevice, SectorIo};
use crate::error::{Error, Result};

const SECTOR_SIZE: u16 = 512;

/// A raw device stored in a host file.
#[derive(Debug)]
pub struct HostFileDevice {
    file: std::fs::File,
    sector_count: u64,
}

impl HostFileDevice {
    /// Create (or truncate) an image file of `size` bytes.
    ///
    /// `size` is rounded down to a whole number of sectors. The file is
    /// extended sparsely where the filesystem supports it.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let size = size - size % u64::from(SECTOR_SIZE);
        file.set_len(size)?;
        Ok(Self {
            file,
            sector_count: size / u64::from(SECTOR_SIZE),
        })
    }

    /// Open an existing image file; the device size is the file size
    /// rounded down to a whole number of sectors.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            sector_count: len / u64::from(SECTOR_SIZE),
        })
    }

    fn seek_to(&mut self, sector: u64) -> io::Result<()> {
        let offset = sector * u64::from(SECTOR_SIZE);
        self.file.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

impl SectorIo for HostFileDevice {
    fn sector_size(&self) -> u16 {
        SECTOR_SIZE
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn raw_sector_read(&mut self, sector: u64, dst: &mut [u8]) -> Result<()> {
        self.seek_to(sector)
            .and_then(|_| self.file.read_exact(dst))
            .map_err(|_| Error::ReadFailure)
    }

    fn raw_sector_write(&mut self, sector: u64, src: &[u8]) -> Result<()> {
        self.seek_to(sector)
            .and_then(|_| self.file.write_all(src))
            .map_err(|_| Error::WriteFailure)
    }

    fn raw_sector_erase_range(&mut self, sector: u64, count: u64) -> Result<()> {
        // Erased sectors read back as zeroes
        let zeroes = vec![0u8; usize::from(SECTOR_SIZE)];
        for s in sector..sector + count {
            self.seek_to(s)
                .and_then(|_| self.file.write_all(&zeroes))
                .map_err(|_| Error::EraseFailure)?;
        }
        Ok(())
    }

    fn raw_sync(&mut self) -> Result<()> {
        self.file.sync_data().map_err(|_| Error::WriteFailure)
    }
}

/// Create an image file and wrap it in a buffered [`BlockDevice`].
///
/// Four sector buffers are allocated, enough for the sequential access
/// patterns of scanning and formatting.
pub fn create_device<P: AsRef<Path>>(path: P, size: u64) -> io::Result<BlockDevice<HostFileDevice>> {
    let raw = HostFileDevice::create(path, size)?;
    wrap(raw)
}

/// Open an existing image file and wrap it in a buffered [`BlockDevice`].
pub fn open_device<P: AsRef<Path>>(path: P) -> io::Result<BlockDevice<HostFileDevice>> {
    let raw = HostFileDevice::open(path)?;
    wrap(raw)
}

fn wrap(raw: HostFileDevice) -> io::Result<BlockDevice<HostFileDevice>> {
    BlockDevice::new(raw)
        .and_then(|mut device| {
            device.allocate_buffers(4)?;
            Ok(device)
        })
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))
}
