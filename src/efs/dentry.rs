use std::mem::size_of;

use static_assertions::const_assert_eq;

use crate::efs::InodeNo;
use crate::endian::{Be16, Be32};
use crate::util::OnDisk;

const_assert_eq!(size_of::<DirBlockHeader>(), DIR_BLOCK_HEADER_SIZE);
const_assert_eq!(size_of::<DentryHeader>(), DENTRY_HEADER_SIZE);

pub const DIR_BLOCK_MAGIC: u16 = 0xBEEF;
const DIR_BLOCK_HEADER_SIZE: usize = 4;
const DENTRY_HEADER_SIZE: usize = 5;
/// Dentries start at even offsets, since slots store offsets divided by two
const ALIGNMENT: usize = 2;

/// The header at the start of every directory block. It is followed by `slot_count` single-byte slots; a nonzero slot
/// holds the offset of a dentry divided by two.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct DirBlockHeader {
    pub magic: Be16,
    /// Offset of the first byte used by dentries, divided by two. Dentries fill the block from its end.
    pub first_used: u8,
    pub slot_count: u8,
}

unsafe impl OnDisk for DirBlockHeader {}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct DentryHeader {
    pub inode_no: Be32,
    pub name_len: u8,
}

unsafe impl OnDisk for DentryHeader {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dentry {
    pub inode_no: InodeNo,
    pub name: Vec<u8>,
}

impl Dentry {
    /// True iff the dentry represents either the current directory `.` or the parent directory `..`
    pub fn is_dot_dir(&self) -> bool {
        self.name == b"." || self.name == b".."
    }

    /// Number of bytes the dentry occupies in its block
    pub fn dentry_len(&self) -> usize {
        aligned_length(DENTRY_HEADER_SIZE + self.name.len(), ALIGNMENT)
    }
}

/// Decodes the dentries of one directory block, in slot order. Free slots are skipped, `.` and `..` are returned
/// like any other dentry.
pub fn parse_dir_block(block: &[u8]) -> Result<Vec<Dentry>, String> {
    if block.len() < DIR_BLOCK_HEADER_SIZE {
        return Err(format!("block of {} bytes cannot hold a header", block.len()));
    }
    let header = DirBlockHeader::read_from(block);
    if header.magic.get() != DIR_BLOCK_MAGIC {
        return Err(format!("magic is {:#06x}", header.magic.get()));
    }

    let slots_end = DIR_BLOCK_HEADER_SIZE + usize::from(header.slot_count);
    if slots_end > block.len() {
        return Err(format!("{} slots do not fit into the block", header.slot_count));
    }
    let live_start = usize::from(header.first_used) * ALIGNMENT;
    if header.slot_count > 0 && (live_start < slots_end || live_start >= block.len()) {
        return Err(format!("first used byte {} is outside the dentry area", live_start));
    }

    let mut dentries = Vec::new();
    for (slot_idx, &slot) in block[DIR_BLOCK_HEADER_SIZE..slots_end].iter().enumerate() {
        if slot == 0 {
            continue;
        }
        let offset = usize::from(slot) * ALIGNMENT;
        let dentry =
            parse_dentry(block, offset, live_start).map_err(|reason| format!("slot {}: {}", slot_idx, reason))?;
        dentries.push(dentry);
    }
    Ok(dentries)
}

fn parse_dentry(block: &[u8], offset: usize, live_start: usize) -> Result<Dentry, String> {
    if offset < live_start {
        return Err(format!("dentry at {} lies before the first used byte {}", offset, live_start));
    }
    let name_start = offset + DENTRY_HEADER_SIZE;
    if name_start > block.len() {
        return Err(format!("dentry at {} overruns the block", offset));
    }
    let header = DentryHeader::read_from(&block[offset..]);
    let name_end = name_start + usize::from(header.name_len);
    if name_end > block.len() {
        return Err(format!("name of dentry at {} overruns the block", offset));
    }

    let name = &block[name_start..name_end];
    if name.is_empty() {
        return Err(format!("dentry at {} has an empty name", offset));
    }
    if name.iter().any(|&byte| byte == 0 || byte == b'/') {
        return Err(format!("name of dentry at {} contains NUL or '/'", offset));
    }
    Ok(Dentry { inode_no: header.inode_no.get(), name: name.to_vec() })
}

/// Builds a directory block holding `dentries`, laid out the way IRIX does: slots in order, dentries packed against
/// the end of the block. Returns None if the dentries do not fit.
pub fn build_dir_block(dentries: &[Dentry], block_size: usize) -> Option<Vec<u8>> {
    let mut block = vec![0; block_size];
    let mut dentry_start = block_size;
    let slots_end = DIR_BLOCK_HEADER_SIZE + dentries.len();

    for (slot_idx, dentry) in dentries.iter().enumerate() {
        dentry_start = dentry_start.checked_sub(dentry.dentry_len())?;
        if dentry_start < slots_end || dentry.name.len() > usize::from(u8::MAX) {
            return None;
        }
        let header = DentryHeader { inode_no: Be32::new(dentry.inode_no), name_len: dentry.name.len() as u8 };
        block[dentry_start..dentry_start + DENTRY_HEADER_SIZE].copy_from_slice(header.as_bytes());
        let name_start = dentry_start + DENTRY_HEADER_SIZE;
        block[name_start..name_start + dentry.name.len()].copy_from_slice(&dentry.name);
        block[DIR_BLOCK_HEADER_SIZE + slot_idx] = u8::try_from(dentry_start / ALIGNMENT).ok()?;
    }

    let header = DirBlockHeader {
        magic: Be16::new(DIR_BLOCK_MAGIC),
        // an empty block has no used bytes
        first_used: if dentries.is_empty() { 0 } else { u8::try_from(dentry_start / ALIGNMENT).ok()? },
        slot_count: u8::try_from(dentries.len()).ok()?,
    };
    block[..DIR_BLOCK_HEADER_SIZE].copy_from_slice(header.as_bytes());
    Some(block)
}

const fn aligned_length(n: usize, alignment: usize) -> usize {
    (n + alignment - 1) / alignment * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dentry(inode_no: InodeNo, name: &str) -> Dentry {
        Dentry { inode_no, name: name.as_bytes().to_vec() }
    }

    #[test]
    fn parses_built_block() {
        let dentries = vec![dentry(2, "."), dentry(2, ".."), dentry(17, "usr"), dentry(4, "unix.IP22")];
        let block = build_dir_block(&dentries, 512).unwrap();
        assert_eq!(parse_dir_block(&block), Ok(dentries));
    }

    #[test]
    fn lays_out_dentries_from_block_end() {
        let block = build_dir_block(&[dentry(0x0102_0304, "ab")], 512).unwrap();
        assert_eq!(&block[..5], &[0xBE, 0xEF, 252, 1, 252]);
        assert_eq!(&block[504..511], &[0x01, 0x02, 0x03, 0x04, 2, b'a', b'b']);
    }

    #[test]
    fn skips_free_slots() {
        let mut block = build_dir_block(&[dentry(3, "a"), dentry(4, "b")], 512).unwrap();
        block[DIR_BLOCK_HEADER_SIZE] = 0;
        assert_eq!(parse_dir_block(&block), Ok(vec![dentry(4, "b")]));
    }

    #[test]
    fn accepts_empty_block() {
        let block = build_dir_block(&[], 512).unwrap();
        assert_eq!(parse_dir_block(&block), Ok(Vec::new()));
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(parse_dir_block(&[0; 512]).is_err());
    }

    #[test]
    fn rejects_name_overrunning_block() {
        let mut block = build_dir_block(&[dentry(3, "abc")], 512).unwrap();
        // the dentry starts at 504, a name of 9 bytes would end at 518
        block[508] = 9;
        assert!(parse_dir_block(&block).is_err());
    }

    #[test]
    fn rejects_dentry_outside_live_area() {
        let mut block = build_dir_block(&[dentry(3, "abc")], 512).unwrap();
        block[DIR_BLOCK_HEADER_SIZE] = 10;
        assert!(parse_dir_block(&block).is_err());
    }

    #[test]
    fn rejects_too_many_slots() {
        let mut block = build_dir_block(&[], 16).unwrap();
        block[3] = 20;
        assert!(parse_dir_block(&block).is_err());
    }

    #[test]
    fn rejects_names_with_separator() {
        let block = build_dir_block(&[dentry(3, "a/b")], 512).unwrap();
        assert!(parse_dir_block(&block).is_err());
    }

    #[test]
    fn recognizes_dot_dirs() {
        assert!(dentry(2, ".").is_dot_dir());
        assert!(dentry(2, "..").is_dot_dir());
        assert!(!dentry(2, "...").is_dot_dir());
        assert!(!dentry(2, ".profile").is_dot_dir());
    }

    #[test]
    fn refuses_to_build_overfull_block() {
        let dentries: Vec<_> = (0..100).map(|i| dentry(i, "a_long_file_name")).collect();
        assert!(build_dir_block(&dentries, 512).is_none());
    }
}
