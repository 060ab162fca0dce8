//! Partition descriptors and the owning partition table

use alloc::collections::VecDeque;
use alloc::string::String;
use core::fmt;

use uguid::Guid;

use crate::types::{gpt_type_name, SysType, BASIC_DATA_GUID};

/// One partition record.
///
/// Before validation `size` may hold a percentage (1..=100) of the
/// allocatable region and `offset` may be 0 meaning "not yet placed";
/// [`validate`](crate::validate::validate) turns both into final byte
/// values. GPT partitions carry the GUID pair; MBR partitions carry the
/// system indicator and a synthesized `mbr<N>` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// Partition name, up to 36 code units on disk (GPT only; MBR names
    /// are synthesized)
    pub name: String,
    /// Byte offset from the device start, 1 MiB aligned; 0 = unplaced
    pub offset: u64,
    /// Size in bytes, or a percentage (values of 100 and below)
    pub size: u64,
    /// Volume type reported by boot-sector identification
    pub systype: SysType,
    /// MBR system indicator
    pub sysind: u8,
    /// GPT partition type GUID
    pub type_guid: Guid,
    /// GPT unique partition GUID; zero requests generation at format time
    pub unique_guid: Guid,
}

impl Default for PartInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            offset: 0,
            size: 0,
            systype: SysType::Unknown,
            sysind: 0,
            type_guid: Guid::ZERO,
            unique_guid: Guid::ZERO,
        }
    }
}

impl PartInfo {
    /// End offset, one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

impl fmt::Display for PartInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' @ 0x{:x}, size 0x{:x}, {}",
            self.name, self.offset, self.size, self.systype
        )?;
        if self.type_guid != Guid::ZERO {
            match gpt_type_name(&self.type_guid) {
                Some(name) => write!(f, ", EFI type {}", name)?,
                None => write!(f, ", EFI type {}", self.type_guid)?,
            }
        }
        if self.unique_guid != Guid::ZERO {
            write!(f, ", id {}", self.unique_guid)?;
        }
        if self.sysind != 0 {
            write!(f, ", sysind 0x{:02x}", self.sysind)?;
        }
        Ok(())
    }
}

/// Ordered owning sequence of partition records.
///
/// Built by the caller before a format, or by the scanner; records transfer
/// into a device's registry by popping from the front.
#[derive(Debug, Default, Clone)]
pub struct PartitionTable {
    items: VecDeque<PartInfo>,
}

impl PartitionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a record.
    pub fn push(&mut self, part: PartInfo) {
        self.items.push_back(part);
    }

    /// Append an MBR partition.
    ///
    /// `size` is bytes, or a percentage of the allocatable region when 100
    /// or less. Pass `offset` 0 to let validation place the partition.
    pub fn add_mbr(&mut self, sysind: u8, offset: u64, size: u64) {
        self.push(PartInfo {
            sysind,
            offset,
            size,
            ..PartInfo::default()
        });
    }

    /// Append a GPT partition.
    ///
    /// A zero `unique_guid` is generated at format time; `type_guid`
    /// defaults to basic data.
    pub fn add_gpt(
        &mut self,
        name: &str,
        offset: u64,
        size: u64,
        unique_guid: Guid,
        type_guid: Option<Guid>,
    ) {
        self.push(PartInfo {
            name: String::from(name),
            offset,
            size,
            unique_guid,
            type_guid: type_guid.unwrap_or(BASIC_DATA_GUID),
            ..PartInfo::default()
        });
    }

    /// Remove and return the first record.
    pub fn pop_front(&mut self) -> Option<PartInfo> {
        self.items.pop_front()
    }

    /// Drop all records.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate over records in table order.
    pub fn iter(&self) -> impl Iterator<Item = &PartInfo> {
        self.items.iter()
    }

    /// Iterate mutably over records in table order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PartInfo> {
        self.items.iter_mut()
    }

    /// Records as one contiguous slice.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [PartInfo] {
        self.items.make_contiguous()
    }

    /// Sort records by ascending offset; unplaced (offset 0) records sort
    /// first.
    pub(crate) fn sort_by_offset(&mut self) {
        self.items.make_contiguous().sort_by_key(|part| part.offset);
    }
}

impl IntoIterator for PartitionTable {
    type Item = PartInfo;
    type IntoIter = alloc::collections::vec_deque::IntoIter<PartInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hand_off_order() {
        let mut table = PartitionTable::new();
        table.add_mbr(0x06, 0, 50);
        table.add_mbr(0x01, 0, 5);
        assert_eq!(table.len(), 2);

        let first = table.pop_front().expect("first record");
        assert_eq!(first.sysind, 0x06);
        let second = table.pop_front().expect("second record");
        assert_eq!(second.sysind, 0x01);
        assert!(table.pop_front().is_none());
    }

    #[test]
    fn test_gpt_defaults() {
        let mut table = PartitionTable::new();
        table.add_gpt("sys", 0, 40, Guid::ZERO, None);
        let part = table.iter().next().expect("record");
        assert_eq!(part.type_guid, BASIC_DATA_GUID);
        assert_eq!(part.unique_guid, Guid::ZERO);
        assert_eq!(part.name, "sys");
    }

    #[test]
    fn test_sort_zeros_first() {
        let mut table = PartitionTable::new();
        table.add_mbr(0x06, 0x200000, 0x100000);
        table.add_mbr(0x06, 0, 10);
        table.add_mbr(0x06, 0x100000, 0x100000);
        table.sort_by_offset();
        let offsets: alloc::vec::Vec<u64> = table.iter().map(|p| p.offset).collect();
        assert_eq!(offsets, [0, 0x100000, 0x200000]);
    }
}
