//! Error types for the EFS reader.
//!
//! Reading an image can end in one of three ways that callers need to tell apart: success, an image that is simply
//! not an EFS volume (`NotEfs`), and everything else, which is either an I/O failure or a structural defect inside an
//! EFS volume. The latter are fatal for a conversion; `NotEfs` is an expected outcome for foreign input.

use std::path::PathBuf;

use thiserror::Error;

use crate::efs::InodeNo;

#[derive(Debug, Error)]
pub enum EfsError {
    /// Operating system I/O error, including reads past the end of the image.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The partition does not contain an EFS filesystem.
    #[error("invalid EFS: {0}")]
    NotEfs(String),

    /// The record of an inode lies outside the partition or the image.
    #[error("inode {inode} lies outside the filesystem")]
    InodeOutOfRange { inode: InodeNo },

    /// The extents of an inode do not describe its contents.
    #[error("malformed extent map in inode {inode}: {detail}")]
    MalformedExtents { inode: InodeNo, detail: String },

    /// A block of a directory could not be decoded.
    #[error("malformed directory block {block} in inode {inode}: {detail}")]
    MalformedDirectory { inode: InodeNo, block: usize, detail: String },

    /// A directory operation was attempted on an inode that is not a directory.
    #[error("inode {0} is not a directory")]
    NotADirectory(InodeNo),

    /// The output file exists already and is never overwritten.
    #[error("output file {} already exists", .0.display())]
    OutputExists(PathBuf),
}

impl EfsError {
    /// True iff the error means that the input is not an EFS filesystem at all, as opposed to an I/O failure or a
    /// corrupt EFS filesystem.
    pub fn is_not_efs(&self) -> bool {
        matches!(self, EfsError::NotEfs(_))
    }
}

pub type Result<T, E = EfsError> = std::result::Result<T, E>;
