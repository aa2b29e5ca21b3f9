use std::mem::size_of;

use static_assertions::const_assert_eq;

use crate::efs::{ExtentMap, InodeNo, RawExtent};
use crate::endian::{Be16, Be32};
use crate::util::OnDisk;

const_assert_eq!(size_of::<RawInode>(), INODE_SIZE);

pub const INODE_SIZE: usize = 128;
pub const DIRECT_EXTENT_COUNT: usize = 12;

const FILE_TYPE_MASK: u16 = 0o170000;
const FILE_TYPE_DIRECTORY: u16 = 0o040000;
const FILE_TYPE_REGULAR: u16 = 0o100000;
const FILE_TYPE_SYMLINK: u16 = 0o120000;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct RawInode {
    pub mode: Be16,
    pub link_count: Be16,
    pub uid: Be16,
    pub gid: Be16,
    pub size: Be32,
    pub atime: Be32,
    pub mtime: Be32,
    pub ctime: Be32,
    pub generation: Be32,
    pub extent_count: Be16,
    pub version: u8,
    pub spare: u8,
    /// For device files, the first bytes hold the device number instead
    pub extents: [RawExtent; DIRECT_EXTENT_COUNT],
}

unsafe impl OnDisk for RawInode {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    /// Devices, FIFOs, and sockets, which have no content to archive
    Other,
}

impl FileType {
    pub fn from_mode(mode: u16) -> Self {
        match mode & FILE_TYPE_MASK {
            FILE_TYPE_REGULAR => Self::Regular,
            FILE_TYPE_DIRECTORY => Self::Directory,
            FILE_TYPE_SYMLINK => Self::Symlink,
            _ => Self::Other,
        }
    }

    pub fn has_extents(self) -> bool {
        self != Self::Other
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub number: InodeNo,
    pub mode: u16,
    pub link_count: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub extent_count: u16,
    pub extents: ExtentMap,
}

impl Inode {
    /// Decoding is permissive: whether the extents make sense is only checked when the content is read.
    pub fn new(number: InodeNo, raw: &RawInode) -> Self {
        let mode = raw.mode.get();
        let extent_count = raw.extent_count.get();
        let extents = if FileType::from_mode(mode).has_extents() {
            ExtentMap::new(&raw.extents, usize::from(extent_count))
        } else {
            ExtentMap::Direct(Vec::new())
        };

        Self {
            number,
            mode,
            link_count: raw.link_count.get(),
            uid: raw.uid.get(),
            gid: raw.gid.get(),
            size: raw.size.get(),
            atime: raw.atime.get(),
            mtime: raw.mtime.get(),
            ctime: raw.ctime.get(),
            extent_count,
            extents,
        }
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    /// The permission bits, including setuid, setgid, and sticky
    pub fn permissions(&self) -> u16 {
        self.mode & !FILE_TYPE_MASK
    }
}
