//! Partition scanner
//!
//! Walks a device from sector 0 outwards and lazily yields one
//! [`PartInfo`] per partition found. Recognises plain MBR tables including
//! extended (0x05) chains, GPT behind a protective MBR, and "superfloppy"
//! media whose sector 0 is itself a FAT or exFAT boot sector.
//!
//! The scanner is a small state machine: `idle` until the first call, then
//! `MBR` or `GPT` while records remain, ending in `done` or (terminally)
//! `error`. A scanner in the error state yields nothing further; the cause
//! is available from [`Scanner::error`].

use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use uguid::Guid;

use crate::device::{BlockDevice, SectorIo};
use crate::error::{Error, Result};
use crate::layout::gpt::{verify_header, GptEntry, GptHeader, GPT_ENTRY_SIZE, PRIMARY_HEADER_LBA};
use crate::layout::mbr::{PartitionRecord, RECORD_COUNT};
use crate::layout::{fat, signature_ok};
use crate::partition::PartInfo;
use crate::types::{size_bits, sysind, systype_from_indicator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Mbr,
    Gpt,
    Error,
    Done,
}

/// Lazy partition enumerator for one device.
pub struct Scanner<'d, D: SectorIo> {
    device: &'d mut BlockDevice<D>,
    state: State,
    error: Option<Error>,
    /// Working sector: boot sector, EBR or GPT entry array
    buffer: Vec<u8>,
    /// Probe buffer for partition first sectors (GPT path)
    probe: Vec<u8>,
    mbr_entries: Vec<PartitionRecord>,
    /// Entries remaining in the GPT array
    num_entries: usize,
    index: usize,
    /// Next GPT entry-array sector to load
    sector: u64,
    /// Yielded MBR partitions, for mbr<N> naming
    mbr_count: u32,
    shift: u32,
}

impl<'d, D: SectorIo> Scanner<'d, D> {
    /// Create a scanner over `device`. Nothing is read until the first call
    /// to [`next_partition`](Self::next_partition).
    pub fn new(device: &'d mut BlockDevice<D>) -> Self {
        let sector_size = usize::from(device.sector_size());
        let shift = size_bits(sector_size as u32);
        Self {
            device,
            state: State::Idle,
            error: None,
            buffer: vec![0; sector_size],
            probe: vec![0; sector_size],
            mbr_entries: Vec::new(),
            num_entries: 0,
            index: 0,
            sector: 0,
            mbr_count: 0,
            shift,
        }
    }

    /// The error that moved the scanner into its terminal error state.
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    fn fail(&mut self, err: Error) {
        self.state = State::Error;
        self.error = Some(err);
    }

    /// Collect the valid records of the boot sector in `self.buffer`,
    /// rebasing their start by `base_lba` (non-zero for EBR sectors).
    fn scan_mbr_entries(&mut self, base_lba: u32) {
        self.mbr_entries.clear();
        for i in 0..RECORD_COUNT {
            let mut rec = PartitionRecord::from_sector(&self.buffer, i);
            if rec.starting_lba == 0 || rec.size_in_lba == 0 {
                continue;
            }
            rec.starting_lba = rec.starting_lba.wrapping_add(base_lba);
            self.mbr_entries.push(rec);
        }
        self.index = 0;
    }

    /// First step out of `idle`: classify sector 0.
    fn start(&mut self) -> Option<PartInfo> {
        if let Err(err) = self.device.read(0, &mut self.buffer) {
            self.fail(err);
            return None;
        }

        // A volume boot record at sector 0 means partitionless media: one
        // synthetic partition covering the whole device.
        if let Some(vol) = fat::identify(&self.buffer) {
            self.state = State::Done;
            return Some(PartInfo {
                name: vol.label.unwrap_or_default(),
                offset: 0,
                size: self.device.size(),
                systype: vol.systype,
                ..PartInfo::default()
            });
        }

        if !signature_ok(&self.buffer) {
            self.state = State::Done;
            return None;
        }

        if PartitionRecord::from_sector(&self.buffer, 0).os_type == sysind::EFI_GPT {
            // Protective MBR: load and verify the primary GPT header
            if let Err(err) = self
                .device
                .read(PRIMARY_HEADER_LBA << self.shift, &mut self.buffer)
            {
                log::error!("GPT header read failed");
                self.fail(err);
                return None;
            }
            if !verify_header(&self.buffer) {
                log::error!("GPT invalid");
                self.fail(Error::BadParam);
                return None;
            }
            let header = GptHeader::decode(&self.buffer);
            self.num_entries = header.num_partition_entries as usize;
            self.sector = header.partition_entry_lba;
            self.index = 0;
            self.state = State::Gpt;
        } else {
            self.scan_mbr_entries(0);
            self.state = State::Mbr;
        }

        None
    }

    fn next_mbr(&mut self) -> Option<Option<PartInfo>> {
        if self.index >= self.mbr_entries.len() {
            self.state = State::Done;
            return Some(None);
        }
        let entry = self.mbr_entries[self.index];
        self.index += 1;

        let offset = u64::from(entry.starting_lba) << self.shift;
        if self.device.read(offset, &mut self.buffer).is_err() {
            // Unreadable partition start: skip the record
            return None;
        }

        if entry.os_type == sysind::EXTENDED {
            // EBR: its records replace the current table, rebased
            self.scan_mbr_entries(entry.starting_lba);
            return None;
        }

        let mut part = PartInfo {
            offset,
            size: u64::from(entry.size_in_lba) << self.shift,
            sysind: entry.os_type,
            ..PartInfo::default()
        };
        part.systype = match fat::identify(&self.buffer) {
            Some(vol) => vol.systype,
            None => systype_from_indicator(entry.os_type),
        };
        self.mbr_count += 1;
        part.name = format!("mbr{}", self.mbr_count);
        Some(Some(part))
    }

    fn next_gpt(&mut self) -> Option<Option<PartInfo>> {
        if self.index >= self.num_entries {
            self.state = State::Done;
            return Some(None);
        }

        let entries_per_sector = self.buffer.len() / GPT_ENTRY_SIZE;
        if self.index % entries_per_sector == 0 {
            if let Err(err) = self.device.read(self.sector << self.shift, &mut self.buffer) {
                self.fail(err);
                return Some(None);
            }
            self.sector += 1;
        }

        let offset = (self.index % entries_per_sector) * GPT_ENTRY_SIZE;
        let entry = GptEntry::decode(&self.buffer[offset..offset + GPT_ENTRY_SIZE]);
        self.index += 1;
        if !entry.is_used() {
            return None;
        }

        let byte_offset = entry.starting_lba << self.shift;
        if self.device.read(byte_offset, &mut self.probe).is_err() {
            // Unreadable partition start: skip the entry
            return None;
        }

        let mut part = PartInfo {
            offset: byte_offset,
            size: (1 + entry.ending_lba - entry.starting_lba) << self.shift,
            type_guid: entry.partition_type_guid,
            unique_guid: entry.unique_partition_guid,
            name: entry.name_string(),
            ..PartInfo::default()
        };
        if let Some(vol) = fat::identify(&self.probe) {
            part.systype = vol.systype;
        }
        Some(Some(part))
    }

    /// Yield the next partition, or `None` when the scan is complete or has
    /// failed (see [`error`](Self::error)).
    pub fn next_partition(&mut self) -> Option<PartInfo> {
        if self.state == State::Idle {
            if let Some(part) = self.start() {
                return Some(part);
            }
        }

        loop {
            let step = match self.state {
                State::Mbr => self.next_mbr(),
                State::Gpt => self.next_gpt(),
                _ => return None,
            };
            if let Some(result) = step {
                return result;
            }
        }
    }
}

impl<D: SectorIo> Iterator for Scanner<'_, D> {
    type Item = PartInfo;

    fn next(&mut self) -> Option<PartInfo> {
        self.next_partition()
    }
}

/// Scan `device` and replace its partition registry with the result.
///
/// GPT partitions with an empty name take the string form of their unique
/// GUID. Returns the number of partitions found, or the scanner's error.
pub fn scan_partitions<D: SectorIo>(device: &mut BlockDevice<D>) -> Result<usize> {
    let mut found: Vec<PartInfo> = Vec::new();
    let mut scanner = Scanner::new(device);
    while let Some(mut part) = scanner.next_partition() {
        if part.name.is_empty() && part.unique_guid != Guid::ZERO {
            part.name = format!("{}", part.unique_guid);
        }
        found.push(part);
    }
    if let Some(err) = scanner.error() {
        return Err(err);
    }

    let registry = device.partitions_mut();
    registry.clear();
    let count = found.len();
    for part in found {
        registry.push(part);
    }
    Ok(count)
}
