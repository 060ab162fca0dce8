//! Disk partitioning and block device access.
//!
//! A `no_std` + `alloc` library for tools that sit between raw
//! block-addressable media and filesystem drivers: installers, disk-image
//! builders and volume managers. Three layers:
//!
//! 1. **Block device** — [`BlockDevice`] wraps any [`SectorIo`]
//!    implementation and turns arbitrary byte-range reads, writes and
//!    erases into aligned sector I/O through a small write-back cache.
//! 2. **Scanner** — [`Scanner`] walks a device from sector 0 outwards and
//!    yields [`PartInfo`] descriptors for MBR, GPT, FAT and exFAT volumes,
//!    verifying GPT header CRCs along the way.
//! 3. **Formatter** — [`format::mbr`] and [`format::gpt`] lay out fresh
//!    partition tables, including the protective MBR and backup GPT
//!    structures, from a validated [`PartitionTable`].
//!
//! # Usage
//!
//! ```ignore
//! use blockpart::{BlockDevice, PartitionTable, format, scan_partitions};
//!
//! let mut dev = BlockDevice::new(raw)?;
//!
//! // Lay out two partitions covering 60% and 40% of the usable space.
//! let mut table = PartitionTable::new();
//! table.add_gpt("system", 0, 60, Guid::ZERO, None);
//! table.add_gpt("data", 0, 40, Guid::ZERO, None);
//! format::gpt::format_disk(&mut dev, table, None)?;
//!
//! // Re-read what is on the media.
//! scan_partitions(&mut dev)?;
//! for part in dev.partitions().iter() {
//!     // ...
//! }
//! ```
//!
//! The library is single-threaded and performs no internal locking;
//! concurrent access to one device is undefined. Diagnostics go through the
//! [`log`] facade.

#![no_std]
#![warn(missing_docs)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod buffer;
pub mod crc;
pub mod device;
pub mod error;
pub mod format;
pub mod layout;
pub mod partition;
pub mod scanner;
pub mod types;
pub mod validate;

#[cfg(feature = "std")]
pub mod hostfile;

pub use error::{Error, Result};
pub use device::{BlockDevice, SectorIo, Stats};
pub use partition::{PartInfo, PartitionTable};
pub use scanner::{scan_partitions, Scanner};
pub use types::SysType;
pub use validate::validate;

#[cfg(feature = "std")]
pub use hostfile::HostFileDevice;

// The on-disk GUID type is part of the public API.
pub use uguid::{guid, Guid};
