//! GPT header and entry codec

use alloc::string::String;
use alloc::vec;

use uguid::Guid;

use crate::crc::crc32;

/// "EFI PART", little-endian
pub const GPT_SIGNATURE: u64 = 0x5452_4150_2049_4645;

/// GPT revision 1.0
pub const GPT_REVISION_V1: u32 = 0x0001_0000;

/// Size of the defined header fields
pub const GPT_HEADER_SIZE: usize = 92;

/// Size of one partition entry
pub const GPT_ENTRY_SIZE: usize = 128;

/// UTF-16 code units in an entry name
pub const GPT_NAME_UNITS: usize = 36;

/// LBA of the primary GPT header
pub const PRIMARY_HEADER_LBA: u64 = 1;

/// GPT header fields.
///
/// The remainder of the header sector past [`GPT_HEADER_SIZE`] is reserved
/// and must be zero on disk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GptHeader {
    /// Must be [`GPT_SIGNATURE`]
    pub signature: u64,
    /// Must be [`GPT_REVISION_V1`]
    pub revision: u32,
    /// Bytes covered by `header_crc32`, at least 92
    pub header_size: u32,
    /// CRC-32 of the first `header_size` bytes with this field zeroed
    pub header_crc32: u32,
    /// LBA of the sector holding this header
    pub my_lba: u64,
    /// LBA of the other copy of the header
    pub alternate_lba: u64,
    /// First LBA available for partition data
    pub first_usable_lba: u64,
    /// Last LBA available for partition data
    pub last_usable_lba: u64,
    /// Disk GUID
    pub disk_guid: Guid,
    /// First LBA of the entry array this header describes
    pub partition_entry_lba: u64,
    /// Entry slots in the array
    pub num_partition_entries: u32,
    /// Bytes per entry, always 128 here
    pub sizeof_partition_entry: u32,
    /// CRC-32 over the full entry array, zero slots included
    pub partition_entry_array_crc32: u32,
}

impl GptHeader {
    /// Decode the defined header fields from the start of a sector.
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            signature: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            revision: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            header_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            header_crc32: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            my_lba: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            alternate_lba: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            first_usable_lba: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            last_usable_lba: u64::from_le_bytes(buf[48..56].try_into().unwrap()),
            disk_guid: Guid::from_bytes(buf[56..72].try_into().unwrap()),
            partition_entry_lba: u64::from_le_bytes(buf[72..80].try_into().unwrap()),
            num_partition_entries: u32::from_le_bytes(buf[80..84].try_into().unwrap()),
            sizeof_partition_entry: u32::from_le_bytes(buf[84..88].try_into().unwrap()),
            partition_entry_array_crc32: u32::from_le_bytes(buf[88..92].try_into().unwrap()),
        }
    }

    /// Encode the header into the start of a zeroed sector buffer.
    ///
    /// `header_crc32` is written as stored in the struct; use
    /// [`GptHeader::update_crc`] to compute it first.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.signature.to_le_bytes());
        buf[8..12].copy_from_slice(&self.revision.to_le_bytes());
        buf[12..16].copy_from_slice(&self.header_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.header_crc32.to_le_bytes());
        buf[20..24].fill(0);
        buf[24..32].copy_from_slice(&self.my_lba.to_le_bytes());
        buf[32..40].copy_from_slice(&self.alternate_lba.to_le_bytes());
        buf[40..48].copy_from_slice(&self.first_usable_lba.to_le_bytes());
        buf[48..56].copy_from_slice(&self.last_usable_lba.to_le_bytes());
        buf[56..72].copy_from_slice(&self.disk_guid.to_bytes());
        buf[72..80].copy_from_slice(&self.partition_entry_lba.to_le_bytes());
        buf[80..84].copy_from_slice(&self.num_partition_entries.to_le_bytes());
        buf[84..88].copy_from_slice(&self.sizeof_partition_entry.to_le_bytes());
        buf[88..92].copy_from_slice(&self.partition_entry_array_crc32.to_le_bytes());
    }

    /// Recompute `header_crc32` over the defined fields.
    pub fn update_crc(&mut self) {
        let mut buf = [0u8; GPT_HEADER_SIZE];
        self.header_crc32 = 0;
        self.encode(&mut buf);
        self.header_crc32 = crc32(0, &buf);
    }
}

/// Verify a GPT header sector.
///
/// Checks, in order: signature, revision, header size (at least 92 and no
/// larger than the sector), entry size, entry count, then the header CRC
/// computed over `header_size` bytes with the CRC field zeroed.
pub fn verify_header(sector: &[u8]) -> bool {
    let header = GptHeader::decode(sector);
    if header.signature != GPT_SIGNATURE {
        return false;
    }
    if header.revision != GPT_REVISION_V1 {
        return false;
    }
    let size = header.header_size as usize;
    if size < GPT_HEADER_SIZE || size > sector.len() {
        return false;
    }
    if header.sizeof_partition_entry as usize != GPT_ENTRY_SIZE {
        return false;
    }
    if header.num_partition_entries > 128 {
        return false;
    }

    let mut copy = vec![0u8; size];
    copy.copy_from_slice(&sector[..size]);
    copy[16..20].fill(0);
    let crc = crc32(0, &copy);
    if crc != header.header_crc32 {
        log::error!(
            "GPT header crc 0x{:08x}, stored 0x{:08x}",
            crc,
            header.header_crc32
        );
        return false;
    }

    true
}

/// One 128-byte GPT partition entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptEntry {
    /// Partition type GUID; zero marks an unused slot
    pub partition_type_guid: Guid,
    /// Unique partition GUID
    pub unique_partition_guid: Guid,
    /// First LBA of the partition
    pub starting_lba: u64,
    /// Last LBA of the partition, inclusive
    pub ending_lba: u64,
    /// Attribute bits
    pub attributes: u64,
    /// Partition name, UTF-16LE
    pub partition_name: [u16; GPT_NAME_UNITS],
}

impl Default for GptEntry {
    fn default() -> Self {
        Self {
            partition_type_guid: Guid::ZERO,
            unique_partition_guid: Guid::ZERO,
            starting_lba: 0,
            ending_lba: 0,
            attributes: 0,
            partition_name: [0; GPT_NAME_UNITS],
        }
    }
}

impl GptEntry {
    /// Decode an entry from 128 bytes.
    pub fn decode(buf: &[u8]) -> Self {
        let mut name = [0u16; GPT_NAME_UNITS];
        for (i, unit) in name.iter_mut().enumerate() {
            let offset = 56 + i * 2;
            *unit = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
        }
        Self {
            partition_type_guid: Guid::from_bytes(buf[0..16].try_into().unwrap()),
            unique_partition_guid: Guid::from_bytes(buf[16..32].try_into().unwrap()),
            starting_lba: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            ending_lba: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            attributes: u64::from_le_bytes(buf[48..56].try_into().unwrap()),
            partition_name: name,
        }
    }

    /// Encode the entry into 128 bytes.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..16].copy_from_slice(&self.partition_type_guid.to_bytes());
        buf[16..32].copy_from_slice(&self.unique_partition_guid.to_bytes());
        buf[32..40].copy_from_slice(&self.starting_lba.to_le_bytes());
        buf[40..48].copy_from_slice(&self.ending_lba.to_le_bytes());
        buf[48..56].copy_from_slice(&self.attributes.to_le_bytes());
        for (i, unit) in self.partition_name.iter().enumerate() {
            let offset = 56 + i * 2;
            buf[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
        }
    }

    /// A slot is used when its type GUID is non-zero.
    pub fn is_used(&self) -> bool {
        self.partition_type_guid != Guid::ZERO
    }

    /// Store `name` one code unit per byte, truncated to 36 units.
    pub fn set_name(&mut self, name: &str) {
        self.partition_name = [0; GPT_NAME_UNITS];
        for (unit, byte) in self.partition_name.iter_mut().zip(name.bytes()) {
            *unit = u16::from(byte);
        }
    }

    /// Decode the name by truncation at the first NUL.
    ///
    /// Code units above 0xFF are narrowed to their low byte. Real UTF-16
    /// decoding is deliberately not attempted so that names survive a
    /// format/scan round trip unchanged.
    pub fn name_string(&self) -> String {
        self.partition_name
            .iter()
            .take_while(|&&unit| unit != 0)
            .map(|&unit| unit as u8 as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uguid::guid;

    fn sample_header() -> GptHeader {
        GptHeader {
            signature: GPT_SIGNATURE,
            revision: GPT_REVISION_V1,
            header_size: GPT_HEADER_SIZE as u32,
            header_crc32: 0,
            my_lba: 1,
            alternate_lba: 204799,
            first_usable_lba: 34,
            last_usable_lba: 204766,
            disk_guid: guid!("61d3ce8a-d7c9-400b-8f00-6fdab7d52765"),
            partition_entry_lba: 2,
            num_partition_entries: 128,
            sizeof_partition_entry: GPT_ENTRY_SIZE as u32,
            partition_entry_array_crc32: 0xDEADBEEF,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = sample_header();
        header.update_crc();
        let mut buf = [0u8; 512];
        header.encode(&mut buf);
        assert_eq!(GptHeader::decode(&buf), header);
    }

    #[test]
    fn test_header_verify() {
        let mut header = sample_header();
        header.update_crc();
        let mut buf = [0u8; 512];
        header.encode(&mut buf);
        assert!(verify_header(&buf));

        // Any flipped byte inside the CRC span must fail verification
        buf[21] ^= 0x40;
        assert!(!verify_header(&buf));
    }

    #[test]
    fn test_entry_name_truncation() {
        let mut entry = GptEntry::default();
        entry.set_name("My FAT partition");
        assert_eq!(entry.name_string(), "My FAT partition");

        // Non-ASCII code units narrow to one byte
        entry.partition_name[0] = 0x0141; // 'Ł'
        assert_eq!(entry.name_string().as_bytes()[0], 0x41);
    }

    #[test]
    fn test_entry_roundtrip() {
        let mut entry = GptEntry {
            partition_type_guid: guid!("ebd0a0a2-b9e5-4433-87c0-68b6b72699c7"),
            unique_partition_guid: guid!("23672da9-d8ae-43fa-8776-5c2929d88901"),
            starting_lba: 2048,
            ending_lba: 104447,
            attributes: 0,
            partition_name: [0; GPT_NAME_UNITS],
        };
        entry.set_name("data");
        let mut buf = [0u8; GPT_ENTRY_SIZE];
        entry.encode(&mut buf);
        let decoded = GptEntry::decode(&buf);
        assert_eq!(decoded, entry);
        assert!(decoded.is_used());
    }
}
