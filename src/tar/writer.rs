use std::io::{self, Write};

use log::trace;

use crate::tar::header::{
    write_str, UstarHeader, BLOCK_SIZE, GNU_LONG_LINK_NAME, NAME_LEN, PREFIX_LEN, TYPE_DIRECTORY, TYPE_GNU_LONG_LINK,
    TYPE_GNU_LONG_NAME, TYPE_REGULAR, TYPE_SYMLINK,
};
use crate::util::OnDisk;

/// Ownership and timestamp of an archive entry
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct EntryMetadata {
    /// Permission bits, without the file type
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Seconds since the Unix epoch
    pub mtime: u64,
}

/// Writes a tar archive sequentially into `out`. The archive is only complete after `finish` has been called.
pub struct TarWriter<W: Write> {
    out: W,
    bytes_written: u64,
}

impl<W: Write> TarWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, bytes_written: 0 }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Appends a directory entry; `path` is stored with a trailing `/`.
    pub fn append_dir(&mut self, path: &[u8], metadata: &EntryMetadata) -> io::Result<()> {
        let trimmed_len = path.iter().rposition(|&byte| byte != b'/').map_or(0, |idx| idx + 1);
        let mut dir_path = path[..trimmed_len].to_vec();
        dir_path.push(b'/');
        let header = self.prepare_header(TYPE_DIRECTORY, &dir_path, metadata, 0)?;
        self.write_block(header.as_bytes())
    }

    pub fn append_file(&mut self, path: &[u8], metadata: &EntryMetadata, content: &[u8]) -> io::Result<()> {
        let header = self.prepare_header(TYPE_REGULAR, path, metadata, content.len() as u64)?;
        self.write_block(header.as_bytes())?;
        self.write_padded(content)
    }

    pub fn append_symlink(&mut self, path: &[u8], metadata: &EntryMetadata, target: &[u8]) -> io::Result<()> {
        if target.len() > NAME_LEN {
            self.write_gnu_record(TYPE_GNU_LONG_LINK, target)?;
        }
        let mut header = self.prepare_header(TYPE_SYMLINK, path, metadata, 0)?;
        let stored_len = target.len().min(NAME_LEN);
        write_str(&mut header.linkname, &target[..stored_len]);
        header.seal();
        self.write_block(header.as_bytes())
    }

    /// Terminates the archive with two zero blocks and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.write_block(&[0; BLOCK_SIZE])?;
        self.write_block(&[0; BLOCK_SIZE])?;
        self.out.flush()?;
        Ok(self.out)
    }

    /// Builds a sealed header for `path`, writing a GNU long name record first if the path does not fit. The path
    /// bytes are stored as they are.
    fn prepare_header(
        &mut self,
        typeflag: u8,
        path: &[u8],
        metadata: &EntryMetadata,
        size: u64,
    ) -> io::Result<UstarHeader> {
        trace!("archiving {:?} ({} bytes)", String::from_utf8_lossy(path), size);
        let mut header = UstarHeader::new(typeflag);
        match split_path(path) {
            Some((prefix, name)) => {
                write_str(&mut header.prefix, prefix);
                write_str(&mut header.name, name);
            }
            None => {
                self.write_gnu_record(TYPE_GNU_LONG_NAME, path)?;
                write_str(&mut header.name, &path[..NAME_LEN]);
            }
        }
        header.set_mode(metadata.mode);
        header.set_uid(metadata.uid);
        header.set_gid(metadata.gid);
        header.set_size(size);
        header.set_mtime(metadata.mtime);
        header.seal();
        Ok(header)
    }

    /// Writes a record whose content is `value` followed by a NUL byte.
    fn write_gnu_record(&mut self, typeflag: u8, value: &[u8]) -> io::Result<()> {
        let mut header = UstarHeader::new(typeflag);
        write_str(&mut header.name, GNU_LONG_LINK_NAME);
        header.set_mode(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_size(value.len() as u64 + 1);
        header.set_mtime(0);
        header.seal();
        self.write_block(header.as_bytes())?;

        let mut content = value.to_vec();
        content.push(0);
        self.write_padded(&content)
    }

    fn write_block(&mut self, block: &[u8]) -> io::Result<()> {
        debug_assert_eq!(block.len(), BLOCK_SIZE);
        self.out.write_all(block)?;
        self.bytes_written += block.len() as u64;
        Ok(())
    }

    /// Writes `data` followed by zeros up to the next block boundary.
    fn write_padded(&mut self, data: &[u8]) -> io::Result<()> {
        self.out.write_all(data)?;
        let padding = (BLOCK_SIZE - data.len() % BLOCK_SIZE) % BLOCK_SIZE;
        self.out.write_all(&[0; BLOCK_SIZE][..padding])?;
        self.bytes_written += (data.len() + padding) as u64;
        Ok(())
    }
}

/// Splits `path` into the ustar `prefix` and `name` fields, or returns None if it does not fit into them. The split
/// happens at a `/`, which is stored in neither field.
fn split_path(path: &[u8]) -> Option<(&[u8], &[u8])> {
    if path.len() <= NAME_LEN {
        return Some((&path[..0], path));
    }
    path.iter()
        .enumerate()
        .filter(|&(_, &byte)| byte == b'/')
        .map(|(idx, _)| (&path[..idx], &path[idx + 1..]))
        .find(|(prefix, name)| prefix.len() <= PREFIX_LEN && !name.is_empty() && name.len() <= NAME_LEN)
}
