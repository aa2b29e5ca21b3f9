use std::mem::size_of;

use chrono::{DateTime, TimeZone, Utc};
use static_assertions::const_assert_eq;

use crate::endian::{Be16, Be32};
use crate::util::{padded_name, OnDisk};

const_assert_eq!(size_of::<RawSuperBlock>(), 92);

pub const EFS_MAGIC: u32 = 0x0007_2959;
/// Magic of filesystems that may be larger than 8 GiB
pub const EFS_NEW_MAGIC: u32 = 0x0007_295A;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct RawSuperBlock {
    pub size: Be32,
    pub first_cg: Be32,
    pub cg_size: Be32,
    pub cg_inode_blocks: Be16,
    pub sectors: Be16,
    pub heads: Be16,
    pub cg_count: Be16,
    pub dirty: Be16,
    /// IRIX aligns the following `int` to 4 bytes
    pub _padding: Be16,
    pub time: Be32,
    pub magic: Be32,
    pub name: [u8; 6],
    pub pack: [u8; 6],
    pub bitmap_size: Be32,
    pub free_blocks: Be32,
    pub free_inodes: Be32,
    pub bitmap_block: Be32,
    pub replicated_superblock: Be32,
    pub last_allocated_inode: Be32,
    pub spare: [u8; 20],
    pub checksum: Be32,
}

unsafe impl OnDisk for RawSuperBlock {}

/// The superblock of an EFS filesystem. All block numbers are relative to the start of the filesystem.
///
/// The filesystem is divided into `cg_count` cylinder groups of `cg_size` blocks each, the first one starting at
/// `first_cg`. The first `cg_inode_blocks` blocks of every cylinder group hold inodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub size: i32,
    pub first_cg: i32,
    pub cg_size: i32,
    pub cg_inode_blocks: i16,
    pub cg_count: i16,
    pub dirty: bool,
    pub time: u32,
    pub magic: u32,
    pub name: String,
    pub pack: String,
    pub free_blocks: i32,
    pub free_inodes: i32,
}

impl SuperBlock {
    pub fn has_valid_magic(&self) -> bool {
        self.magic == EFS_MAGIC || self.magic == EFS_NEW_MAGIC
    }

    /// True iff the cylinder group layout allows locating inodes at all.
    pub fn has_usable_geometry(&self) -> bool {
        self.first_cg >= 0 && self.cg_size > 0 && self.cg_inode_blocks > 0 && self.cg_count > 0
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.time), 0).single()
    }
}

impl From<RawSuperBlock> for SuperBlock {
    fn from(raw: RawSuperBlock) -> Self {
        Self {
            size: raw.size.get_signed(),
            first_cg: raw.first_cg.get_signed(),
            cg_size: raw.cg_size.get_signed(),
            cg_inode_blocks: raw.cg_inode_blocks.get_signed(),
            cg_count: raw.cg_count.get_signed(),
            dirty: raw.dirty.get() != 0,
            time: raw.time.get(),
            magic: raw.magic.get(),
            name: padded_name(&raw.name),
            pack: padded_name(&raw.pack),
            free_blocks: raw.free_blocks.get_signed(),
            free_inodes: raw.free_inodes.get_signed(),
        }
    }
}
