use crate::efs::{InodeNo, ROOT_INODE_NO};

/// The layout constants of an EFS volume. The parser components never refer to format constants directly but receive
/// an `EfsLayout`, which makes them testable with synthetic images.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EfsLayout {
    /// Size of a basic block in bytes. Block numbers in the volume header, the superblock, and extents count these.
    pub block_size: u32,
    /// How many bytes at the start of the image are read to decode the volume header.
    pub header_len: usize,
    /// The partition table slot that holds the EFS filesystem.
    pub partition_slot: usize,
    /// Position of the superblock, in blocks relative to the start of the filesystem.
    pub superblock_block: u32,
    pub root_inode: InodeNo,
}

impl EfsLayout {
    /// The layout used by IRIX for disks and CD-ROMs.
    pub const IRIX: Self = Self {
        block_size: 512,
        header_len: 51200,
        partition_slot: 7,
        superblock_block: 1,
        root_inode: ROOT_INODE_NO,
    };

    pub fn block_size_usize(&self) -> usize {
        self.block_size as usize
    }

    pub fn block_to_byte(&self, block: u64) -> u64 {
        block * u64::from(self.block_size)
    }
}
