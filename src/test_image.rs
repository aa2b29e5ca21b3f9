//! Builder for small synthetic EFS images used by the unit tests.

use num::Integer;

use crate::efs::{
    build_dir_block, extents_per_block, Dentry, Extent, InodeNo, RawExtent, RawInode, RawSuperBlock,
    DIRECT_EXTENT_COUNT, EFS_MAGIC, INODE_SIZE,
};
use crate::endian::{Be16, Be32};
use crate::sgi::{checksum, RawPartition, RawVolumeFile, RawVolumeHeader, VOLUME_HEADER_MAGIC};
use crate::util::OnDisk;

const BLOCK_SIZE: usize = 512;

/// A disk with a volume header and one EFS partition of two cylinder groups. Data blocks are handed out in ascending
/// order, with a free block after every allocation so that consecutive extents are never physically adjacent.
pub struct TestImage {
    bytes: Vec<u8>,
    next_free_block: u32,
    last_allocation: u32,
}

impl TestImage {
    pub const PARTITION_FIRST_BLOCK: u32 = 120;
    pub const FS_BLOCKS: u32 = 410;
    pub const FIRST_CG: u32 = 2;
    pub const CG_SIZE: u32 = 200;
    pub const CG_INODE_BLOCKS: u32 = 4;
    pub const CG_COUNT: u32 = 2;
    pub const INODES_PER_CG: u32 = Self::CG_INODE_BLOCKS * (BLOCK_SIZE / INODE_SIZE) as u32;

    pub fn new() -> Self {
        let disk_blocks = Self::PARTITION_FIRST_BLOCK + Self::FS_BLOCKS;
        let mut image = Self {
            bytes: vec![0; disk_blocks as usize * BLOCK_SIZE],
            next_free_block: Self::FIRST_CG + Self::CG_INODE_BLOCKS,
            last_allocation: 0,
        };
        image.write_volume_header(disk_blocks);
        image.write_superblock();
        image
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Byte offset in the image of filesystem block `block`
    pub fn block_offset(block: u32) -> usize {
        (Self::PARTITION_FIRST_BLOCK + block) as usize * BLOCK_SIZE
    }

    /// Byte offset in the image of the record of inode `inode_no`
    pub fn inode_offset(inode_no: InodeNo) -> usize {
        let inodes_per_block = (BLOCK_SIZE / INODE_SIZE) as u32;
        let cg = inode_no / Self::INODES_PER_CG;
        assert!(cg < Self::CG_COUNT);
        let block = Self::FIRST_CG + cg * Self::CG_SIZE + (inode_no % Self::INODES_PER_CG) / inodes_per_block;
        Self::block_offset(block) + (inode_no % inodes_per_block) as usize * INODE_SIZE
    }

    /// First block of the most recent data allocation
    pub fn last_data_block(&self) -> u32 {
        self.last_allocation
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn write_volume_header(&mut self, disk_blocks: u32) {
        let mut raw = RawVolumeHeader { magic: Be32::new(VOLUME_HEADER_MAGIC), ..RawVolumeHeader::default() };
        raw.boot_file[..5].copy_from_slice(b"/unix");
        raw.device_parameters.cylinders = Be16::new(1);
        raw.device_parameters.heads = Be16::new(1);
        raw.device_parameters.sectors_per_track = Be16::new(disk_blocks as u16);
        raw.device_parameters.bytes_per_sector = Be16::new(BLOCK_SIZE as u16);
        raw.volume_files[0] = RawVolumeFile { name: *b"sash\0\0\0\0", first_block: Be32::new(2), len: Be32::new(4096) };
        raw.partitions[7] = RawPartition {
            num_blocks: Be32::new(Self::FS_BLOCKS),
            first_block: Be32::new(Self::PARTITION_FIRST_BLOCK),
            kind: Be32::new(7),
        };
        raw.partitions[8] =
            RawPartition { num_blocks: Be32::new(disk_blocks), first_block: Be32::new(0), kind: Be32::new(6) };
        raw.checksum = Be32::new(0u32.wrapping_sub(checksum(&raw)));
        self.write_at(0, raw.as_bytes());
    }

    fn write_superblock(&mut self) {
        let raw = RawSuperBlock {
            size: Be32::new(Self::FS_BLOCKS),
            first_cg: Be32::new(Self::FIRST_CG),
            cg_size: Be32::new(Self::CG_SIZE),
            cg_inode_blocks: Be16::new(Self::CG_INODE_BLOCKS as u16),
            sectors: Be16::new(Self::FS_BLOCKS as u16),
            heads: Be16::new(1),
            cg_count: Be16::new(Self::CG_COUNT as u16),
            time: Be32::new(712_000_000),
            magic: Be32::new(EFS_MAGIC),
            name: *b"test\0\0",
            pack: *b"efs\0\0\0",
            ..RawSuperBlock::default()
        };
        self.write_at(Self::block_offset(1), raw.as_bytes());
    }

    /// Reserves `len` contiguous data blocks, skipping the inode blocks of the second cylinder group.
    fn allocate(&mut self, len: u32) -> u32 {
        let second_cg = Self::FIRST_CG + Self::CG_SIZE;
        let mut start = self.next_free_block;
        if start < second_cg + Self::CG_INODE_BLOCKS && start + len > second_cg {
            start = second_cg + Self::CG_INODE_BLOCKS;
        }
        assert!(start + len <= Self::FIRST_CG + Self::CG_COUNT * Self::CG_SIZE, "test image is full");
        // leave a gap so that the next allocation is not adjacent
        self.next_free_block = start + len + 1;
        self.last_allocation = start;
        start
    }

    /// Writes `content` into freshly allocated runs of `run_lens` blocks and returns the extents describing them.
    pub fn write_fragmented(&mut self, content: &[u8], run_lens: &[u32]) -> Vec<Extent> {
        let total_blocks: u32 = run_lens.iter().sum();
        assert!(total_blocks as usize * BLOCK_SIZE >= content.len());

        let mut extents = Vec::new();
        let mut logical_start = 0;
        for &len in run_lens {
            let start_block = self.allocate(len);
            let chunk_start = (logical_start as usize * BLOCK_SIZE).min(content.len());
            let chunk_end = ((logical_start + len) as usize * BLOCK_SIZE).min(content.len());
            let chunk = content[chunk_start..chunk_end].to_vec();
            self.write_at(Self::block_offset(start_block), &chunk);
            extents.push(Extent { logical_start, start_block, len });
            logical_start += len;
        }
        extents
    }

    fn write_inode(&mut self, inode_no: InodeNo, mode: u16, size: u32, extent_count: usize, raw_extents: &[RawExtent]) {
        let mut raw = RawInode {
            mode: Be16::new(mode),
            link_count: Be16::new(1),
            uid: Be16::new(100),
            gid: Be16::new(20),
            size: Be32::new(size),
            atime: Be32::new(700_000_000),
            mtime: Be32::new(700_000_000),
            ctime: Be32::new(700_000_000),
            extent_count: Be16::new(extent_count as u16),
            ..RawInode::default()
        };
        raw.extents[..raw_extents.len()].copy_from_slice(raw_extents);
        self.write_at(Self::inode_offset(inode_no), raw.as_bytes());
    }

    /// Writes an inode whose extents are stored inline.
    pub fn add_inode(&mut self, inode_no: InodeNo, mode: u16, size: u32, extents: &[Extent]) {
        assert!(extents.len() <= DIRECT_EXTENT_COUNT);
        let raw_extents: Vec<_> = extents.iter().copied().map(RawExtent::new).collect();
        self.write_inode(inode_no, mode, size, extents.len(), &raw_extents);
    }

    /// Writes `extents` into indirect extent blocks, each allocated separately, and an inode pointing to them.
    pub fn add_indirect_inode(&mut self, inode_no: InodeNo, mode: u16, size: u32, extents: &[Extent]) {
        assert!(extents.len() > DIRECT_EXTENT_COUNT);
        let mut pointers = Vec::new();
        for chunk in extents.chunks(extents_per_block(BLOCK_SIZE)) {
            let block = self.allocate(1);
            let raw: Vec<u8> =
                chunk.iter().flat_map(|&extent| RawExtent::new(extent).as_bytes().to_vec()).collect();
            self.write_at(Self::block_offset(block), &raw);
            pointers.push(Extent { logical_start: 0, start_block: block, len: 1 });
        }
        // the first pointer stores the number of pointers
        pointers[0].logical_start = pointers.len() as u32;

        let raw_pointers: Vec<_> = pointers.into_iter().map(RawExtent::new).collect();
        self.write_inode(inode_no, mode, size, extents.len(), &raw_pointers);
    }

    pub fn add_file(&mut self, inode_no: InodeNo, mode: u16, content: &[u8]) {
        let blocks = Integer::div_ceil(&content.len(), &BLOCK_SIZE) as u32;
        let extents = if blocks == 0 { Vec::new() } else { self.write_fragmented(content, &[blocks]) };
        self.add_inode(inode_no, mode, content.len() as u32, &extents);
    }

    pub fn add_symlink(&mut self, inode_no: InodeNo, target: &str) {
        self.add_file(inode_no, 0o120777, target.as_bytes());
    }

    /// Writes a directory containing `.`, `..`, and `entries`, filling each block before starting the next one.
    pub fn add_dir(&mut self, inode_no: InodeNo, parent: InodeNo, entries: &[(&str, InodeNo)]) {
        let entries: Vec<_> = entries.iter().map(|&(name, inode_no)| (name.as_bytes(), inode_no)).collect();
        self.add_dir_with_raw_names(inode_no, parent, &entries);
    }

    /// Like `add_dir`, for names that are not valid UTF-8.
    pub fn add_dir_with_raw_names(&mut self, inode_no: InodeNo, parent: InodeNo, entries: &[(&[u8], InodeNo)]) {
        let dot_dirs: [(&[u8], InodeNo); 2] = [(&b"."[..], inode_no), (&b".."[..], parent)];
        let dentries = dot_dirs
            .iter()
            .chain(entries)
            .map(|&(name, inode_no)| Dentry { inode_no, name: name.to_vec() });

        let mut blocks: Vec<Vec<Dentry>> = vec![Vec::new()];
        for dentry in dentries {
            let current = blocks.last_mut().unwrap();
            current.push(dentry);
            if build_dir_block(current, BLOCK_SIZE).is_none() {
                let dentry = current.pop().unwrap();
                blocks.push(vec![dentry]);
            }
        }

        let content: Vec<u8> =
            blocks.iter().flat_map(|dentries| build_dir_block(dentries, BLOCK_SIZE).unwrap()).collect();
        let extents = self.write_fragmented(&content, &[blocks.len() as u32]);
        self.add_inode(inode_no, 0o040755, content.len() as u32, &extents);
    }
}
