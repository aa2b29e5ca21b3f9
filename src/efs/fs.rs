use std::convert::TryFrom;
use std::mem::size_of;

use log::{debug, trace, warn};

use crate::efs::{
    check_coverage, decode_extent_blocks, extents_per_block, parse_dir_block, Dentry, Extent, ExtentMap, Inode,
    InodeNo, RawInode, RawSuperBlock, SuperBlock, INODE_SIZE,
};
use crate::error::{EfsError, Result};
use crate::format::EfsLayout;
use crate::image::ByteStore;
use crate::sgi::Partition;
use crate::util::{FromU32, OnDisk};

/// An EFS filesystem inside a partition of `store`. It only ever reads from `store`, and holds no data besides the
/// superblock.
pub struct Filesystem<S: ByteStore> {
    store: S,
    layout: EfsLayout,
    /// First block of the partition, relative to the start of the image
    first_block: u32,
    num_blocks: u32,
    superblock: SuperBlock,
}

impl<S: ByteStore> Filesystem<S> {
    /// Binds `store` to `partition` and reads the superblock. Like the volume header, the superblock is not rejected
    /// if its magic number is wrong; an image is only recognized as not being EFS when its root inode is unusable.
    pub fn new(store: S, layout: EfsLayout, partition: Partition) -> Result<Self> {
        let mut instance = Self {
            store,
            layout,
            first_block: partition.first_block,
            num_blocks: partition.num_blocks,
            superblock: SuperBlock::from(RawSuperBlock::default()),
        };
        instance.superblock = instance.read_superblock()?;
        debug!(
            "superblock: {} blocks, {} cylinder groups of {} blocks starting at {}, {} inode blocks each",
            instance.superblock.size,
            instance.superblock.cg_count,
            instance.superblock.cg_size,
            instance.superblock.first_cg,
            instance.superblock.cg_inode_blocks
        );
        if !instance.superblock.has_valid_magic() {
            warn!("superblock magic is {:#010x}", instance.superblock.magic);
        }
        Ok(instance)
    }

    fn read_superblock(&self) -> Result<SuperBlock> {
        let offset = self.block_offset(self.layout.superblock_block);
        let mut bytes = [0; size_of::<RawSuperBlock>()];
        if self.layout.superblock_block >= self.num_blocks || offset + bytes.len() as u64 > self.store.len() {
            // no superblock to read, leave it zeroed so that no inode can be located
            debug!("superblock at byte {} lies outside the partition or the image", offset);
            return Ok(SuperBlock::from(RawSuperBlock::default()));
        }
        self.store.read_exact_at(&mut bytes, offset)?;
        Ok(SuperBlock::from(RawSuperBlock::read_from(&bytes)))
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    /// The byte offset in the image of block `block` of the filesystem
    fn block_offset(&self, block: u32) -> u64 {
        self.layout.block_to_byte(u64::from(self.first_block) + u64::from(block))
    }

    fn inodes_per_block(&self) -> u32 {
        self.layout.block_size / INODE_SIZE as u32
    }

    /// Returns the filesystem block holding inode `inode_no` and the byte offset of the inode within that block, or
    /// None if the geometry in the superblock does not allow locating it inside the partition.
    fn locate_inode(&self, inode_no: InodeNo) -> Option<(u32, usize)> {
        let superblock = &self.superblock;
        if !superblock.has_usable_geometry() {
            return None;
        }
        let inodes_per_block = self.inodes_per_block();
        let inodes_per_cg = u64::from(u32::try_from(superblock.cg_inode_blocks).ok()?) * u64::from(inodes_per_block);
        let cg = u64::from(inode_no) / inodes_per_cg;
        if cg >= u64::try_from(superblock.cg_count).ok()? {
            return None;
        }
        let block_in_cg = (u64::from(inode_no) % inodes_per_cg) / u64::from(inodes_per_block);
        let block = u64::try_from(superblock.first_cg).ok()?
            + cg * u64::try_from(superblock.cg_size).ok()?
            + block_in_cg;
        let block = u32::try_from(block).ok().filter(|&block| block < self.num_blocks)?;
        let offset_in_block = (inode_no % inodes_per_block) as usize * INODE_SIZE;
        Some((block, offset_in_block))
    }

    pub fn inode(&self, inode_no: InodeNo) -> Result<Inode> {
        let (block, offset_in_block) =
            self.locate_inode(inode_no).ok_or(EfsError::InodeOutOfRange { inode: inode_no })?;
        let offset = self.block_offset(block) + offset_in_block as u64;
        if offset + INODE_SIZE as u64 > self.store.len() {
            return Err(EfsError::InodeOutOfRange { inode: inode_no });
        }
        trace!("reading inode {} from block {} at byte {}", inode_no, block, offset);

        let mut bytes = [0; INODE_SIZE];
        self.store.read_exact_at(&mut bytes, offset)?;
        Ok(Inode::new(inode_no, &RawInode::read_from(&bytes)))
    }

    pub fn root_inode(&self) -> Result<Inode> {
        self.inode(self.layout.root_inode)
    }

    /// Returns the root inode if the partition holds an EFS filesystem, or `EfsError::NotEfs` if it does not. I/O
    /// errors are passed through.
    pub fn validate(&self) -> Result<Inode> {
        match self.root_inode() {
            Ok(root) if root.size == 0 => Err(EfsError::NotEfs("root inode is empty".to_string())),
            Ok(root) => Ok(root),
            Err(EfsError::InodeOutOfRange { .. }) => {
                Err(EfsError::NotEfs("root inode lies outside the partition".to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Resolves the extents of `inode` into the ordered list of extents covering its content.
    pub fn extents(&self, inode: &Inode) -> Result<Vec<Extent>> {
        let malformed = |detail: String| EfsError::MalformedExtents { inode: inode.number, detail };

        let extents = match &inode.extents {
            ExtentMap::Direct(extents) => extents.clone(),
            ExtentMap::Indirect(pointers) => self.read_indirect_extents(inode, pointers)?,
            ExtentMap::Invalid(reason) => return Err(malformed(reason.clone())),
        };
        check_coverage(&extents, u64::from(inode.size), self.layout.block_size).map_err(malformed)?;
        if let Some(outside) = extents.iter().find(|extent| extent.end_block() > self.num_blocks) {
            return Err(malformed(format!(
                "extent at blocks {}..{} lies outside the filesystem",
                outside.start_block,
                outside.end_block()
            )));
        }
        Ok(extents)
    }

    fn read_indirect_extents(&self, inode: &Inode, pointers: &[Extent]) -> Result<Vec<Extent>> {
        let extent_count = usize::from(inode.extent_count);
        let available: usize = pointers
            .iter()
            .map(|pointer| usize::fromx(pointer.len) * extents_per_block(self.layout.block_size_usize()))
            .sum();
        if available < extent_count {
            return Err(EfsError::MalformedExtents {
                inode: inode.number,
                detail: format!("indirect blocks hold {} extents but the inode has {}", available, extent_count),
            });
        }
        debug!(
            "inode {} has {} extents in {} indirect runs",
            inode.number,
            extent_count,
            pointers.len()
        );

        let mut blocks = Vec::new();
        for pointer in pointers {
            if pointer.end_block() > self.num_blocks {
                return Err(EfsError::MalformedExtents {
                    inode: inode.number,
                    detail: format!("indirect extent block {} lies outside the filesystem", pointer.start_block),
                });
            }
            self.read_blocks_into(pointer, &mut blocks)?;
        }
        decode_extent_blocks(&blocks, extent_count)
            .map_err(|detail| EfsError::MalformedExtents { inode: inode.number, detail })
    }

    fn read_blocks_into(&self, extent: &Extent, buf: &mut Vec<u8>) -> Result<()> {
        let old_len = buf.len();
        buf.resize(old_len + usize::fromx(extent.len) * self.layout.block_size_usize(), 0);
        self.store.read_exact_at(&mut buf[old_len..], self.block_offset(extent.start_block))?;
        Ok(())
    }

    /// Returns exactly `inode.size` bytes of content. This is the data of a regular file, the target of a symlink, or
    /// the directory blocks of a directory.
    pub fn file_contents(&self, inode: &Inode) -> Result<Vec<u8>> {
        let extents = self.extents(inode)?;
        let mut contents = Vec::with_capacity(self.layout.block_size_usize() * extents.len());
        for extent in &extents {
            self.read_blocks_into(extent, &mut contents)?;
        }
        contents.truncate(inode.size as usize);
        Ok(contents)
    }

    /// Decodes all dentries of the directory `inode`, in on-disk order, including `.` and `..`.
    pub fn read_dir(&self, inode: &Inode) -> Result<Vec<Dentry>> {
        if !inode.is_dir() {
            return Err(EfsError::NotADirectory(inode.number));
        }
        let block_size = self.layout.block_size_usize();
        if inode.size as usize % block_size != 0 {
            return Err(EfsError::MalformedDirectory {
                inode: inode.number,
                block: inode.size as usize / block_size,
                detail: format!("directory size {} is not a multiple of the block size", inode.size),
            });
        }

        let contents = self.file_contents(inode)?;
        let mut dentries = Vec::new();
        for (block_idx, block) in contents.chunks_exact(block_size).enumerate() {
            let mut block_dentries = parse_dir_block(block).map_err(|detail| EfsError::MalformedDirectory {
                inode: inode.number,
                block: block_idx,
                detail,
            })?;
            dentries.append(&mut block_dentries);
        }
        Ok(dentries)
    }
}
