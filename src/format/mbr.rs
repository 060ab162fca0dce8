//! MBR formatter

use alloc::format;
use alloc::vec;

use crate::device::{BlockDevice, SectorIo};
use crate::error::{Error, Result};
use crate::layout::mbr::{encode_chs, PartitionRecord, RECORD_COUNT, SECTORS_PER_TRACK};
use crate::layout::write_signature;
use crate::partition::PartitionTable;
use crate::types::{size_bits, sysind, systype_from_indicator, SysType, PARTITION_ALIGN};
use crate::validate::validate;

/// Re-partition `device` with up to four MBR partitions.
///
/// All existing partition information on the media is destroyed. The first
/// 1 MiB is reserved for the boot record; partition offsets and sizes are
/// fixed up by [`validate`]. On success the records move into the device's
/// partition registry with synthesized `mbr<N>` names.
pub fn format_disk<D: SectorIo>(
    device: &mut BlockDevice<D>,
    mut table: PartitionTable,
) -> Result<()> {
    if table.is_empty() || table.len() > RECORD_COUNT {
        return Err(Error::BadParam);
    }

    let sector_size = u32::from(device.sector_size());
    let shift = size_bits(sector_size);
    let device_sectors = device.sector_count();

    let first_block = PARTITION_ALIGN >> shift;
    if device_sectors <= first_block {
        return Err(Error::NoSpace);
    }
    validate(
        &mut table,
        first_block,
        device_sectors - first_block,
        sector_size,
    )?;

    // Determine drive CHS geometry without any consideration of the real
    // drive: sectors per track fixed at 63, heads doubled from 8 until the
    // cylinder count fits.
    let mut heads: u32 = 8;
    while device_sectors / u64::from(heads * SECTORS_PER_TRACK) > 1024 {
        heads *= 2;
        if heads > 255 {
            break;
        }
    }
    let heads = heads.min(255);

    let mut buf = vec![0u8; sector_size as usize];
    for (index, part) in table.iter_mut().enumerate() {
        if part.sysind == 0 {
            part.sysind = sysind::EXFAT; // IFS
        }
        let start = (part.offset >> shift) as u32;
        let count = (part.size >> shift) as u32;
        let record = PartitionRecord {
            boot_indicator: 0,
            start_chs: encode_chs(start, heads),
            os_type: part.sysind,
            end_chs: encode_chs(start + count - 1, heads),
            starting_lba: start,
            size_in_lba: count,
        };
        record.to_sector(&mut buf, index);
    }
    write_signature(&mut buf);

    device.write(0, &buf)?;
    device.sync()?;

    log::debug!("MBR format complete, {} partitions", table.len());

    // Hand the records to the device registry
    let registry = device.partitions_mut();
    registry.clear();
    let mut index = 0;
    while let Some(mut part) = table.pop_front() {
        index += 1;
        if part.name.is_empty() {
            part.name = format!("mbr{}", index);
        }
        if part.systype == SysType::Unknown {
            part.systype = systype_from_indicator(part.sysind);
        }
        registry.push(part);
    }

    Ok(())
}
