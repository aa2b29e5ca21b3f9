use std::cmp::min;
use std::convert::{TryFrom, TryInto};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use memmap::{Mmap, MmapOptions};
use nix::ioctl_read;

/// Random-access, read-only view of the bytes of an image.
pub trait ByteStore {
    fn len(&self) -> u64;

    /// Fills `buf` with the bytes starting at `offset`. Fails with `UnexpectedEof` if the store ends before `buf` is
    /// full.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ByteStore for [u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset).map_err(|_| eof(offset, buf.len()))?;
        let end = start.checked_add(buf.len()).ok_or_else(|| eof(offset, buf.len()))?;
        let bytes = self.get(start..end).ok_or_else(|| eof(offset, buf.len()))?;
        buf.copy_from_slice(bytes);
        Ok(())
    }
}

impl ByteStore for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.as_slice().read_exact_at(buf, offset)
    }
}

impl<T: ByteStore + ?Sized> ByteStore for &T {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset)
    }
}

fn eof(offset: u64, len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {} bytes at offset {} goes past the end of the image", len, offset),
    )
}

/// Reads the first `len` bytes of `store`. An image shorter than `len` is padded with zeros, so that a short or empty
/// file fails validation instead of failing to read.
pub fn read_prefix<S: ByteStore + ?Sized>(store: &S, len: usize) -> io::Result<Vec<u8>> {
    let available = usize::try_from(min(store.len(), len as u64)).unwrap_or(len);
    let mut prefix = vec![0; len];
    store.read_exact_at(&mut prefix[..available], 0)?;
    Ok(prefix)
}

/// An EFS image, either a regular file or a block device (e.g. a CD-ROM drive), mapped read-only into memory.
pub struct Image {
    /// None for an empty file, which cannot be mapped
    mmap: Option<Mmap>,
    // the lock is released when the file is dropped
    _file: File,
}

impl Image {
    pub fn open<P: AsRef<Path>>(image_path: P) -> Result<Self> {
        let image_path = image_path.as_ref().canonicalize()?;
        let file = OpenOptions::new().read(true).open(&image_path)?;
        // the lock is only advisory, it keeps other well-behaved processes from writing while we read
        file.try_lock_shared()
            .with_context(|| format!("{} is locked by another process", image_path.display()))?;

        let size = Self::get_file_size(&file)?;
        let mmap = if size == 0 {
            None
        } else {
            // SAFETY: We assume that no other process is modifying the image
            Some(unsafe { MmapOptions::new().len(size).map(&file)? })
        };
        Ok(Self { mmap, _file: file })
    }

    pub fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    fn get_file_size(file: &File) -> Result<usize> {
        let metadata = file.metadata()?;
        let filetype = metadata.file_type();
        let len = if filetype.is_file() {
            metadata.len()
        } else if filetype.is_block_device() {
            Self::get_block_device_size(file)?
        } else {
            bail!("Expected path to a file or a block device")
        };

        len.try_into()
            .with_context(|| format!("File size {} does not fit into a usize", len))
    }

    // declared in linux/fs.h
    // The type is declared as size_t due to a bug that cannot be fixed due to backwards compatibility. Passing u64
    // instead of usize works on 64bit systems. cfr. https://lists.debian.org/debian-glibc/2005/12/msg00069.html
    #[cfg(target_os = "linux")]
    ioctl_read!(block_device_size, 0x12, 114, u64);

    /// PANICS: Panics if `file` is not a block device.
    #[cfg(target_os = "linux")]
    fn get_block_device_size(file: &File) -> Result<u64> {
        assert!(file.metadata()?.file_type().is_block_device());
        let mut size = 0;
        // SAFETY: the nix crate provides no safety documentation, so we must just assume that this is safe.
        unsafe {
            Self::block_device_size(file.as_raw_fd(), &mut size)?;
        }
        Ok(size)
    }

    #[cfg(not(target_os = "linux"))]
    fn get_block_device_size(_file: &File) -> Result<u64> {
        bail!("Reading from block devices is only supported on Linux")
    }
}

impl ByteStore for Image {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.as_slice().read_exact_at(buf, offset)
    }
}
