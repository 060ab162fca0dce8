//! Block device abstraction with byte-granular cached access
//!
//! [`SectorIo`] is the seam a backing store implements: four raw
//! sector-level primitives plus geometry. [`BlockDevice`] wraps an
//! implementation and layers the byte-granular `read`/`write`/`erase_range`
//! API on top, using the direct-mapped [`BufferPool`] for read-modify-write
//! handling of partial sectors.
//!
//! Without buffers (the initial state, or after `allocate_buffers(0)`) all
//! accesses must be sector-aligned. For power-loss resiliency call
//! [`BlockDevice::sync`] at appropriate times; filesystem layers should do
//! so after closing a file.
//!
//! Callers must serialize access to a device; there is no internal locking
//! and concurrent use is undefined.

use core::fmt;

use crate::buffer::{BufferPool, SectorBuffer};
use crate::error::{Error, Result};
use crate::partition::PartitionTable;
use crate::types::{size_bits, MAX_SECTOR_SIZE, MIN_SECTOR_SIZE};

/// Raw sector-level interface to a backing store.
///
/// Implementations promise that `sector_size` is a power of two between 512
/// and 4096 and constant for the life of the device. Buffer lengths passed
/// to the transfer methods are always whole multiples of the sector size.
pub trait SectorIo {
    /// Sector size in bytes.
    fn sector_size(&self) -> u16;

    /// Total number of sectors.
    fn sector_count(&self) -> u64;

    /// Read `dst.len() / sector_size` sectors starting at `sector`.
    fn raw_sector_read(&mut self, sector: u64, dst: &mut [u8]) -> Result<()>;

    /// Write `src.len() / sector_size` sectors starting at `sector`.
    fn raw_sector_write(&mut self, sector: u64, src: &[u8]) -> Result<()>;

    /// Erase `count` sectors starting at `sector`. Erased sectors read back
    /// as zeroes.
    fn raw_sector_erase_range(&mut self, sector: u64, count: u64) -> Result<()>;

    /// Commit any writes the backing store itself has buffered.
    fn raw_sync(&mut self) -> Result<()>;
}

/// Hit/miss counters for one operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct FuncStats {
    /// Accesses satisfied by a cached sector
    pub hits: u32,
    /// Accesses that had to go to the media
    pub misses: u32,
}

impl FuncStats {
    fn update(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    /// Total accesses counted.
    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

/// Cache statistics, for observability only.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    /// Read accesses
    pub read: FuncStats,
    /// Write accesses
    pub write: FuncStats,
    /// Erase accesses
    pub erase: FuncStats,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Read hit {:5}, miss {:5}", self.read.hits, self.read.misses)?;
        writeln!(f, "  Write hit {:5}, miss {:5}", self.write.hits, self.write.misses)?;
        write!(f, "  Erase hit {:5}, miss {:5}", self.erase.hits, self.erase.misses)
    }
}

/// A sector-addressable device with optional byte-granular buffering.
#[derive(Debug)]
pub struct BlockDevice<D: SectorIo> {
    raw: D,
    sector_size: u32,
    shift: u32,
    pool: Option<BufferPool>,
    stats: Stats,
    partitions: PartitionTable,
}

impl<D: SectorIo> BlockDevice<D> {
    /// Wrap a raw device.
    ///
    /// Fails with `BadParam` when the reported sector size is not a power
    /// of two in the supported 512..=4096 range. No buffers are allocated;
    /// until [`allocate_buffers`](Self::allocate_buffers) is called, all
    /// accesses must be sector-aligned.
    pub fn new(raw: D) -> Result<Self> {
        let sector_size = u32::from(raw.sector_size());
        if !sector_size.is_power_of_two()
            || !(MIN_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&sector_size)
        {
            return Err(Error::BadParam);
        }
        Ok(Self {
            raw,
            sector_size,
            shift: size_bits(sector_size),
            pool: None,
            stats: Stats::default(),
            partitions: PartitionTable::new(),
        })
    }

    /// Sector size in bytes.
    pub fn sector_size(&self) -> u16 {
        self.sector_size as u16
    }

    /// Total number of sectors.
    pub fn sector_count(&self) -> u64 {
        self.raw.sector_count()
    }

    /// Device capacity in bytes.
    pub fn size(&self) -> u64 {
        self.raw.sector_count() << self.shift
    }

    /// Smallest erasable unit; same as the sector size for block devices.
    pub fn block_size(&self) -> usize {
        self.sector_size as usize
    }

    /// Partitions registered by a scan or format.
    pub fn partitions(&self) -> &PartitionTable {
        &self.partitions
    }

    /// Mutable access to the partition registry.
    pub fn partitions_mut(&mut self) -> &mut PartitionTable {
        &mut self.partitions
    }

    /// Cache statistics.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The wrapped raw device.
    pub fn raw(&self) -> &D {
        &self.raw
    }

    /// Unwrap the raw device, discarding cache state. Call
    /// [`sync`](Self::sync) first if dirty data may be outstanding.
    pub fn into_raw(self) -> D {
        self.raw
    }

    /// Set the number of sector buffers to use.
    ///
    /// `count` is rounded up to a power of two; pass 0 to flush and disable
    /// buffering. Byte-granular (unaligned) access requires at least one
    /// buffer. Returns an error when flushing existing buffers fails.
    pub fn allocate_buffers(&mut self, count: usize) -> Result<()> {
        self.flush_buffers()?;
        self.pool = None;
        if count == 0 {
            return Ok(());
        }
        self.pool = Some(BufferPool::new(self.sector_size as usize, count));
        Ok(())
    }

    fn check_aligned(&self, address: u64, size: u64, what: &str) -> Result<()> {
        let mask = u64::from(self.sector_size) - 1;
        if (address & mask) != 0 || (size & mask) != 0 {
            log::error!("{} misaligned 0x{:x}, 0x{:x}", what, address, size);
            return Err(Error::MisAligned);
        }
        Ok(())
    }

    /// Read `dst.len()` bytes starting at byte `address`.
    pub fn read(&mut self, address: u64, dst: &mut [u8]) -> Result<()> {
        let pool = match self.pool.as_mut() {
            Some(pool) => pool,
            None => {
                self.check_aligned(address, dst.len() as u64, "read")?;
                return self.raw.raw_sector_read(address >> self.shift, dst);
            }
        };

        let mut sector = address >> self.shift;
        let mut offset = (address & u64::from(self.sector_size - 1)) as usize;
        let mut done = 0;

        while done < dst.len() {
            let chunk = (dst.len() - done).min(self.sector_size as usize - offset);
            let buf = pool.get(sector);
            self.stats.read.update(buf.sector == sector);
            if buf.sector != sector {
                flush_buffer(&mut self.raw, buf)?;
                buf.invalidate();
                self.raw.raw_sector_read(sector, &mut buf.data)?;
                buf.sector = sector;
            }

            dst[done..done + chunk].copy_from_slice(&buf.data[offset..offset + chunk]);

            done += chunk;
            sector += 1;
            offset = 0;
        }

        Ok(())
    }

    /// Write `src.len()` bytes starting at byte `address`.
    ///
    /// Partial sectors are read-modify-written; whole-sector spans skip the
    /// read. Data lands in the cache and reaches the media on eviction or
    /// [`sync`](Self::sync).
    pub fn write(&mut self, address: u64, src: &[u8]) -> Result<()> {
        let pool = match self.pool.as_mut() {
            Some(pool) => pool,
            None => {
                self.check_aligned(address, src.len() as u64, "write")?;
                return self.raw.raw_sector_write(address >> self.shift, src);
            }
        };

        let mut sector = address >> self.shift;
        let mut offset = (address & u64::from(self.sector_size - 1)) as usize;
        let mut done = 0;

        while done < src.len() {
            let chunk = (src.len() - done).min(self.sector_size as usize - offset);
            let buf = pool.get(sector);
            self.stats.write.update(buf.sector == sector);
            if buf.sector != sector {
                flush_buffer(&mut self.raw, buf)?;
                if offset != 0 || chunk != self.sector_size as usize {
                    buf.invalidate();
                    self.raw.raw_sector_read(sector, &mut buf.data)?;
                }
                buf.sector = sector;
            }

            buf.data[offset..offset + chunk].copy_from_slice(&src[done..done + chunk]);
            buf.dirty = true;

            done += chunk;
            sector += 1;
            offset = 0;
        }

        Ok(())
    }

    /// Erase a sector-aligned byte range.
    ///
    /// Erased sectors read back as zeroes (block device backing stores zero
    /// rather than flash-erase). Cached sectors in the range are zeroed and
    /// marked clean, since the media already holds the erased state.
    pub fn erase_range(&mut self, address: u64, size: u64) -> Result<()> {
        self.check_aligned(address, size, "erase")?;

        let start = address >> self.shift;
        let count = size >> self.shift;
        self.raw.raw_sector_erase_range(start, count)?;

        if let Some(pool) = self.pool.as_mut() {
            for sector in start..start + count {
                let buf = pool.get(sector);
                self.stats.erase.update(buf.sector == sector);
                if buf.sector == sector {
                    buf.data.fill(0);
                    buf.dirty = false;
                }
            }
        }

        Ok(())
    }

    /// Flush all dirty buffers, then sync the backing store.
    pub fn sync(&mut self) -> Result<()> {
        self.flush_buffers()?;
        self.raw.raw_sync()
    }

    fn flush_buffers(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.as_mut() {
            for buf in pool.iter_mut() {
                flush_buffer(&mut self.raw, buf)?;
            }
        }
        Ok(())
    }
}

fn flush_buffer<D: SectorIo>(raw: &mut D, buf: &mut SectorBuffer) -> Result<()> {
    if !buf.dirty {
        return Ok(());
    }
    raw.raw_sector_write(buf.sector, &buf.data)?;
    buf.dirty = false;
    Ok(())
}
