use std::mem::size_of;

use itertools::Itertools;
use num::Integer;
use static_assertions::const_assert_eq;

use crate::efs::BlockIdx;
use crate::endian::Be24;
use crate::util::OnDisk;

const_assert_eq!(size_of::<RawExtent>(), 8);

/// The largest number of blocks a single extent can describe.
pub const MAX_EXTENT_LEN: u32 = u8::MAX as u32;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RawExtent {
    /// Always zero in a valid extent
    pub magic: u8,
    pub start_block: Be24,
    pub len: u8,
    pub logical_start: Be24,
}

unsafe impl OnDisk for RawExtent {}

impl RawExtent {
    pub fn new(extent: Extent) -> Self {
        assert!(extent.len <= MAX_EXTENT_LEN);
        Self {
            magic: 0,
            start_block: Be24::new(extent.start_block),
            len: extent.len as u8,
            logical_start: Be24::new(extent.logical_start),
        }
    }

    pub fn decode(&self) -> Result<Extent, String> {
        if self.magic != 0 {
            return Err(format!("extent has magic {:#04x}", self.magic));
        }
        Ok(Extent {
            logical_start: self.logical_start.get(),
            start_block: self.start_block.get(),
            len: u32::from(self.len),
        })
    }
}

/// A run of `len` blocks starting at block `start_block` of the filesystem, holding the blocks `logical_start..` of a
/// file's content.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Extent {
    pub logical_start: u32,
    pub start_block: BlockIdx,
    pub len: u32,
}

impl Extent {
    pub fn logical_end(&self) -> u32 {
        self.logical_start + self.len
    }

    pub fn end_block(&self) -> BlockIdx {
        self.start_block + self.len
    }
}

/// Where an inode's extents are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtentMap {
    /// The extents are stored in the inode itself.
    Direct(Vec<Extent>),
    /// The inode holds extents pointing to blocks that contain the actual extents. Every pointer describes a run of
    /// such extent blocks; the runs are concatenated in order.
    Indirect(Vec<Extent>),
    /// The inode's extents could not be decoded.
    Invalid(String),
}

impl ExtentMap {
    /// Interprets the extent array of an inode with `extent_count` extents.
    pub fn new(raw_extents: &[RawExtent], extent_count: usize) -> Self {
        if extent_count <= raw_extents.len() {
            match raw_extents[..extent_count].iter().map(RawExtent::decode).collect::<Result<Vec<_>, _>>() {
                Ok(extents) => Self::Direct(extents),
                Err(reason) => Self::Invalid(reason),
            }
        } else {
            // the logical start of the first pointer is reused to store the number of pointers
            let pointer_count = raw_extents[0].logical_start.get() as usize;
            if pointer_count == 0 || pointer_count > raw_extents.len() {
                return Self::Invalid(format!("inode claims {} indirect extents", pointer_count));
            }
            let pointers: Result<Vec<_>, _> = raw_extents[..pointer_count]
                .iter()
                .map(|raw| raw.decode().map(|pointer| Extent { logical_start: 0, ..pointer }))
                .collect();
            match pointers {
                Ok(pointers) => Self::Indirect(pointers),
                Err(reason) => Self::Invalid(reason),
            }
        }
    }
}

/// How many extents fit into one extent block.
pub fn extents_per_block(block_size: usize) -> usize {
    block_size / size_of::<RawExtent>()
}

/// Decodes the first `extent_count` extents stored in the concatenated extent blocks `blocks`.
pub fn decode_extent_blocks(blocks: &[u8], extent_count: usize) -> Result<Vec<Extent>, String> {
    let raw_extents = RawExtent::slice_from(blocks);
    if raw_extents.len() < extent_count {
        return Err(format!(
            "indirect blocks hold {} extents but the inode has {}",
            raw_extents.len(),
            extent_count
        ));
    }
    raw_extents[..extent_count].iter().map(RawExtent::decode).collect()
}

/// Checks that `extents` cover the blocks of a file with `size` bytes exactly once and in order.
pub fn check_coverage(extents: &[Extent], size: u64, block_size: u32) -> Result<(), String> {
    if let Some(empty) = extents.iter().find(|extent| extent.len == 0) {
        return Err(format!("extent at logical block {} is empty", empty.logical_start));
    }
    if let Some(first) = extents.first() {
        if first.logical_start != 0 {
            return Err(format!("first extent starts at logical block {}", first.logical_start));
        }
    }
    if let Some((previous, next)) = extents
        .iter()
        .tuple_windows()
        .find(|(previous, next)| previous.logical_end() != next.logical_start)
    {
        return Err(format!(
            "extent ending at logical block {} is followed by one starting at {}",
            previous.logical_end(),
            next.logical_start
        ));
    }

    let covered: u64 = extents.iter().map(|extent| u64::from(extent.len)).sum();
    let expected = Integer::div_ceil(&size, &u64::from(block_size));
    if covered != expected {
        return Err(format!(
            "extents cover {} blocks but {} bytes need {}",
            covered, size, expected
        ));
    }
    Ok(())
}
