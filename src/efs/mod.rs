mod dentry;
mod extent;
mod fs;
mod inode;
mod superblock;
mod walk;

pub use self::dentry::*;
pub use self::extent::*;
pub use self::fs::*;
pub use self::inode::*;
pub use self::superblock::*;
pub use self::walk::*;

pub type InodeNo = u32;
/// Index of a block, relative to the start of the filesystem
pub type BlockIdx = u32;

pub const ROOT_INODE_NO: InodeNo = 2;
