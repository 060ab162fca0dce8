//! FAT and exFAT boot sector identification
//!
//! Recognises a volume from its first sector only. The library reports the
//! volume type; it does not mount anything.

use alloc::string::String;

use crate::layout::signature_ok;
use crate::types::SysType;

// Max FAT12 clusters. Differs from the specs, but matches real
// DOS/Windows behaviour.
const MAX_FAT12: u32 = 0xFF5;

const EXFAT_FS_TYPE: &[u8; 8] = b"EXFAT   ";
const FAT32_FS_TYPE: &[u8; 8] = b"FAT32   ";

/// Result of a successful boot-sector identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Filesystem type
    pub systype: SysType,
    /// Volume label, if the boot sector carries one
    pub label: Option<String>,
}

/// Volume label with trailing padding removed, `None` when blank.
fn label(bytes: &[u8]) -> Option<String> {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0x20 && b != 0)
        .map_or(0, |i| i + 1);
    if end == 0 {
        return None;
    }
    Some(bytes[..end].iter().map(|&b| b as char).collect())
}

/// Identify a FAT12/16/32 or exFAT volume from its boot sector.
///
/// Returns `None` when the sector is not a recognisable volume boot record.
/// FAT volumes formatted by early MS-DOS lack the `FAT` type string, so
/// FAT12/16 detection falls back to plausibility checks on the BPB fields,
/// with the FAT12/FAT16 split decided by cluster count.
pub fn identify(sector: &[u8]) -> Option<Volume> {
    // exFAT leaves the legacy BPB area zeroed and stores its type string
    // where FAT keeps the OEM name.
    if signature_ok(sector) && &sector[3..11] == EXFAT_FS_TYPE {
        log::debug!("found exFAT volume");
        return Some(Volume {
            systype: SysType::ExFat,
            label: None,
        });
    }

    // Valid JumpBoot code? (short jump, near jump or near call)
    let jmp = sector[0];
    if jmp != 0xEB && jmp != 0xE9 && jmp != 0xE8 {
        return None;
    }

    if signature_ok(sector) && &sector[82..90] == FAT32_FS_TYPE {
        log::debug!("found FAT32 volume");
        return Some(Volume {
            systype: SysType::Fat32,
            label: label(&sector[71..82]),
        });
    }

    let sector_size = u16::from_le_bytes([sector[11], sector[12]]);
    let sec_per_clus = sector[13];
    let reserved = u16::from_le_bytes([sector[14], sector[15]]);
    let num_fats = sector[16];
    let dir_entries = u16::from_le_bytes([sector[17], sector[18]]);
    let sectors16 = u16::from_le_bytes([sector[19], sector[20]]);
    let fat_length = u16::from_le_bytes([sector[22], sector[23]]);
    let sectors32 = u32::from_le_bytes(sector[32..36].try_into().unwrap());

    let plausible = sector_size.is_power_of_two()
        && (512..=4096).contains(&sector_size)
        && sec_per_clus != 0
        && sec_per_clus.is_power_of_two()
        && reserved != 0
        && (num_fats == 1 || num_fats == 2)
        && dir_entries != 0
        && (sectors16 >= 128 || sectors32 >= 0x10000)
        && fat_length != 0;
    if !plausible {
        return None;
    }

    let total_sectors = if sectors16 != 0 {
        u32::from(sectors16)
    } else {
        sectors32
    };
    let clusters = total_sectors / u32::from(sec_per_clus);
    let systype = if clusters <= MAX_FAT12 {
        SysType::Fat12
    } else {
        SysType::Fat16
    };
    log::debug!("found {} volume", systype);

    Some(Volume {
        systype,
        label: label(&sector[43..54]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::write_signature;

    fn fat16_boot_sector() -> [u8; 512] {
        let mut buf = [0u8; 512];
        buf[0] = 0xEB;
        buf[11..13].copy_from_slice(&512u16.to_le_bytes()); // sector size
        buf[13] = 4; // sectors per cluster
        buf[14..16].copy_from_slice(&1u16.to_le_bytes()); // reserved
        buf[16] = 2; // FATs
        buf[17..19].copy_from_slice(&512u16.to_le_bytes()); // root entries
        buf[19..21].copy_from_slice(&40960u16.to_le_bytes()); // sectors
        buf[22..24].copy_from_slice(&40u16.to_le_bytes()); // FAT length
        buf[43..54].copy_from_slice(b"TESTVOLUME ");
        write_signature(&mut buf);
        buf
    }

    #[test]
    fn test_identify_fat16() {
        let vol = identify(&fat16_boot_sector()).expect("should identify");
        assert_eq!(vol.systype, SysType::Fat16);
        assert_eq!(vol.label.as_deref(), Some("TESTVOLUME"));
    }

    #[test]
    fn test_identify_fat12_by_cluster_count() {
        let mut buf = fat16_boot_sector();
        // 2048 sectors / 4 per cluster = 512 clusters -> FAT12
        buf[19..21].copy_from_slice(&2048u16.to_le_bytes());
        // keep the >=128 sector plausibility satisfied
        let vol = identify(&buf).expect("should identify");
        assert_eq!(vol.systype, SysType::Fat12);
    }

    #[test]
    fn test_identify_fat32() {
        let mut buf = [0u8; 512];
        buf[0] = 0xEB;
        buf[82..90].copy_from_slice(b"FAT32   ");
        buf[71..82].copy_from_slice(b"BIGVOL     ");
        write_signature(&mut buf);
        let vol = identify(&buf).expect("should identify");
        assert_eq!(vol.systype, SysType::Fat32);
        assert_eq!(vol.label.as_deref(), Some("BIGVOL"));
    }

    #[test]
    fn test_identify_exfat() {
        let mut buf = [0u8; 512];
        buf[0] = 0xEB;
        buf[3..11].copy_from_slice(b"EXFAT   ");
        write_signature(&mut buf);
        let vol = identify(&buf).expect("should identify");
        assert_eq!(vol.systype, SysType::ExFat);
    }

    #[test]
    fn test_reject_bare_mbr() {
        let mut buf = [0u8; 512];
        write_signature(&mut buf);
        assert!(identify(&buf).is_none());
    }

    #[test]
    fn test_reject_bad_jump() {
        let mut buf = fat16_boot_sector();
        buf[0] = 0x00;
        assert!(identify(&buf).is_none());
    }
}
