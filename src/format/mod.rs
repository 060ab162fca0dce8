//! Partition table formatters
//!
//! Write a brand-new MBR or GPT layout to a device from a caller-built
//! [`PartitionTable`](crate::PartitionTable). Both paths validate the table
//! first, then serialize the on-disk records and `sync()`. Any write
//! failure is returned immediately without rollback; the media may be left
//! partially written.

pub mod gpt;
pub mod mbr;
