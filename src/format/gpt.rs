//! GPT formatter

use alloc::vec;

use uguid::Guid;

use crate::crc::crc32;
use crate::device::{BlockDevice, SectorIo};
use crate::error::{Error, Result};
use crate::layout::gpt::{
    GptEntry, GptHeader, GPT_ENTRY_SIZE, GPT_HEADER_SIZE, GPT_REVISION_V1, GPT_SIGNATURE,
};
use crate::layout::mbr::PartitionRecord;
use crate::layout::write_signature;
use crate::partition::PartitionTable;
use crate::types::{align_up, size_bits, sysind, BASIC_DATA_GUID, GPT_ITEMS, PARTITION_ALIGN};
use crate::validate::validate;

/// Random 16-byte GUID.
fn generate_guid() -> Result<Guid> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes).map_err(|_| Error::NoMem)?;
    Ok(Guid::from_bytes(bytes))
}

/// Re-partition `device` with a GPT layout.
///
/// All existing partition information on the media is destroyed. Writes the
/// primary header and entry array, their backup copies at the end of the
/// device, and the protective MBR at sector 0. A zero or absent `disk_guid`
/// is generated, as are unique GUIDs for entries that carry none; generated
/// entry GUIDs are visible in the registry afterwards. On success the
/// records move into the device's partition registry.
pub fn format_disk<D: SectorIo>(
    device: &mut BlockDevice<D>,
    mut table: PartitionTable,
    disk_guid: Option<Guid>,
) -> Result<()> {
    if table.is_empty() || table.len() > GPT_ITEMS {
        return Err(Error::BadParam);
    }

    let sector_size = u32::from(device.sector_size());
    let shift = size_bits(sector_size);
    let device_sectors = device.sector_count();

    // Size of one copy of the entry array, in sectors
    let table_sectors = ((GPT_ITEMS * GPT_ENTRY_SIZE) >> shift) as u64;
    let align_sectors = PARTITION_ALIGN >> shift;
    let backup_table_sector = device_sectors
        .checked_sub(1 + table_sectors)
        .ok_or(Error::NoSpace)?;
    let first_block = align_up(2 + table_sectors, align_sectors);
    if backup_table_sector <= first_block {
        return Err(Error::NoSpace);
    }
    validate(
        &mut table,
        first_block,
        backup_table_sector - first_block,
        sector_size,
    )?;

    // Fill the 128 entry slots sector by sector, accumulating the array
    // checksum over used and zero slots alike, and writing each filled
    // sector to the primary and backup array locations.
    let entries_per_sector = sector_size as usize / GPT_ENTRY_SIZE;
    let mut buf = vec![0u8; sector_size as usize];
    let mut array_crc = 0u32;
    let parts = table.as_mut_slice();
    for slot in 0..GPT_ITEMS {
        let index = slot % entries_per_sector;
        if index == 0 {
            buf.fill(0);
        }

        if let Some(part) = parts.get_mut(slot) {
            if part.unique_guid == Guid::ZERO {
                part.unique_guid = generate_guid()?;
            }
            if part.type_guid == Guid::ZERO {
                part.type_guid = BASIC_DATA_GUID;
            }
            let mut entry = GptEntry {
                partition_type_guid: part.type_guid,
                unique_partition_guid: part.unique_guid,
                starting_lba: part.offset >> shift,
                ending_lba: (part.end() >> shift) - 1,
                ..GptEntry::default()
            };
            entry.set_name(&part.name);
            entry.encode(&mut buf[index * GPT_ENTRY_SIZE..(index + 1) * GPT_ENTRY_SIZE]);
        }

        if index + 1 == entries_per_sector {
            array_crc = crc32(array_crc, &buf);
            let relative = (slot / entries_per_sector) as u64;
            device.write((2 + relative) << shift, &buf)?;
            device.write((backup_table_sector + relative) << shift, &buf)?;
        }
    }

    // Primary header at LBA 1
    let mut header = GptHeader {
        signature: GPT_SIGNATURE,
        revision: GPT_REVISION_V1,
        header_size: GPT_HEADER_SIZE as u32,
        header_crc32: 0,
        my_lba: 1,
        alternate_lba: device_sectors - 1,
        first_usable_lba: 2 + table_sectors,
        last_usable_lba: backup_table_sector - 1,
        disk_guid: match disk_guid {
            Some(guid) if guid != Guid::ZERO => guid,
            _ => generate_guid()?,
        },
        partition_entry_lba: 2,
        num_partition_entries: GPT_ITEMS as u32,
        sizeof_partition_entry: GPT_ENTRY_SIZE as u32,
        partition_entry_array_crc32: array_crc,
    };
    header.update_crc();
    buf.fill(0);
    header.encode(&mut buf);
    device.write(header.my_lba << shift, &buf)?;

    // Secondary header at the last sector, pointing at the backup array
    core::mem::swap(&mut header.my_lba, &mut header.alternate_lba);
    header.partition_entry_lba = backup_table_sector;
    header.update_crc();
    buf.fill(0);
    header.encode(&mut buf);
    device.write(header.my_lba << shift, &buf)?;

    // Protective MBR at sector 0
    buf.fill(0);
    let record = PartitionRecord {
        boot_indicator: 0,
        start_chs: [0, 2, 0],
        os_type: sysind::EFI_GPT,
        end_chs: [0xfe, 0xff, 0],
        starting_lba: 1,
        size_in_lba: (device_sectors - 1).min(u64::from(u32::MAX)) as u32,
    };
    record.to_sector(&mut buf, 0);
    write_signature(&mut buf);
    device.write(0, &buf)?;

    device.sync()?;

    log::debug!("GPT format complete, {} partitions", table.len());

    let registry = device.partitions_mut();
    registry.clear();
    while let Some(part) = table.pop_front() {
        registry.push(part);
    }

    Ok(())
}
