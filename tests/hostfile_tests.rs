//! Host image file tests: persistence across close/reopen and buffering

mod common;

use blockpart::hostfile::{create_device, open_device};
use blockpart::{format, guid, scan_partitions, Error, Guid, PartitionTable};
use common::MIB;
use tempdir::TempDir;

const DISK_GUID: Guid = guid!("61d3ce8a-d7c9-400b-8f00-6fdab7d52765");
const PART_GUIDS: [Guid; 5] = [
    guid!("23672da9-d8ae-43fa-8776-5c2929d88901"),
    guid!("13b4becf-d095-41df-b41c-321f184be598"),
    guid!("40a78f58-5977-41d1-97fd-cf542c9a1a4c"),
    guid!("21da42c0-0bfb-4a53-b85d-05eb3f361805"),
    guid!("3cd54234-cb54-4ed5-bc8b-55fc7d428470"),
];

fn gpt_table() -> PartitionTable {
    let mut table = PartitionTable::new();
    table.add_gpt("My FAT partition", 0, 50, PART_GUIDS[0], None);
    table.add_gpt("My other partition", 0, 10, PART_GUIDS[1], None);
    table.add_gpt("yet another one", 0, 20, PART_GUIDS[2], None);
    table.add_gpt("last basic partition", 0, 18, PART_GUIDS[3], None);
    table.add_gpt("custom partition type", 0, 2, PART_GUIDS[4], None);
    table
}

#[test]
fn test_create_format_reopen_scan() {
    let tmp = TempDir::new("blockpart-test").expect("tempdir");
    let path = tmp.path().join("test-gpt.img");

    let mut dev = create_device(&path, 100 * MIB).expect("create");
    assert_eq!(dev.size(), 100 * MIB);
    format::gpt::format_disk(&mut dev, gpt_table(), Some(DISK_GUID)).expect("format");
    assert_eq!(scan_partitions(&mut dev).expect("scan"), 5);
    drop(dev);

    let mut dev = open_device(&path).expect("open");
    assert_eq!(dev.size(), 100 * MIB);
    assert_eq!(scan_partitions(&mut dev).expect("rescan"), 5);
    let guids: Vec<Guid> = dev.partitions().iter().map(|p| p.unique_guid).collect();
    assert_eq!(guids, PART_GUIDS);
}

#[test]
fn test_mbr_image_reopen() {
    let tmp = TempDir::new("blockpart-test").expect("tempdir");
    let path = tmp.path().join("test-mbr.img");

    let mut dev = create_device(&path, 100 * MIB).expect("create");
    let mut table = PartitionTable::new();
    table.add_mbr(0x06, 0, 50);
    table.add_mbr(0x06, 0, 10);
    table.add_mbr(0x06, 0, 35);
    table.add_mbr(0x01, 0, 5);
    format::mbr::format_disk(&mut dev, table).expect("format");
    drop(dev);

    let mut dev = open_device(&path).expect("open");
    assert_eq!(scan_partitions(&mut dev).expect("scan"), 4);
    let names: Vec<String> = dev.partitions().iter().map(|p| p.name.clone()).collect();
    assert_eq!(names, ["mbr1", "mbr2", "mbr3", "mbr4"]);
}

#[test]
fn test_buffering_scenario() {
    let tmp = TempDir::new("blockpart-test").expect("tempdir");
    let path = tmp.path().join("buffering.img");

    let mut dev = create_device(&path, 100 * MIB).expect("create");
    format::gpt::format_disk(&mut dev, gpt_table(), Some(DISK_GUID)).expect("format");
    drop(dev);

    let mut dev = open_device(&path).expect("open");
    scan_partitions(&mut dev).expect("scan");
    let base = dev.partitions().iter().next().expect("partition").offset;
    let offset = base + 12345;

    let payload: Vec<u8> = (0..32u8).map(|b| b.wrapping_mul(7)).collect();
    let mut readback = vec![0u8; payload.len()];

    // Without buffers, unaligned access is refused
    dev.allocate_buffers(0).expect("deallocate");
    assert_eq!(dev.write(offset, &payload), Err(Error::MisAligned));
    assert_eq!(dev.read(offset, &mut readback), Err(Error::MisAligned));

    // One buffer is enough for byte-granular access
    dev.allocate_buffers(1).expect("allocate");
    dev.write(offset, &payload).expect("write");
    dev.read(offset, &mut readback).expect("read");
    assert_eq!(readback, payload);
    dev.sync().expect("sync");
    drop(dev);

    // The bytes survived the reopen
    let mut dev = open_device(&path).expect("reopen");
    let mut readback = vec![0u8; payload.len()];
    dev.read(offset, &mut readback).expect("read");
    assert_eq!(readback, payload);
}
