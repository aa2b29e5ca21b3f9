use std::mem::size_of;

use static_assertions::const_assert_eq;

use crate::util::OnDisk;

const_assert_eq!(size_of::<UstarHeader>(), BLOCK_SIZE);

pub const BLOCK_SIZE: usize = 512;
pub const NAME_LEN: usize = 100;
pub const PREFIX_LEN: usize = 155;

pub const TYPE_REGULAR: u8 = b'0';
pub const TYPE_SYMLINK: u8 = b'2';
pub const TYPE_DIRECTORY: u8 = b'5';
/// GNU extension: the content of this record is the name of the next entry
pub const TYPE_GNU_LONG_NAME: u8 = b'L';
/// GNU extension: the content of this record is the link target of the next entry
pub const TYPE_GNU_LONG_LINK: u8 = b'K';
pub const GNU_LONG_LINK_NAME: &[u8] = b"././@LongLink";

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
const USTAR_VERSION: &[u8; 2] = b"00";

/// A POSIX ustar header block. Numeric fields are NUL-terminated octal strings.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct UstarHeader {
    pub name: [u8; NAME_LEN],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub checksum: [u8; 8],
    pub typeflag: u8,
    pub linkname: [u8; NAME_LEN],
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub devmajor: [u8; 8],
    pub devminor: [u8; 8],
    pub prefix: [u8; PREFIX_LEN],
    pub padding: [u8; 12],
}

unsafe impl OnDisk for UstarHeader {}

impl UstarHeader {
    pub fn new(typeflag: u8) -> Self {
        let mut header = Self::read_from(&[0; BLOCK_SIZE]);
        header.typeflag = typeflag;
        header.magic = *USTAR_MAGIC;
        header.version = *USTAR_VERSION;
        header
    }

    /// Computes and stores the checksum. Must be called after all other fields are set.
    pub fn seal(&mut self) {
        self.checksum = [b' '; 8];
        let sum: u32 = self.as_bytes().iter().map(|&byte| u32::from(byte)).sum();
        // six digits, NUL, space
        write_octal(&mut self.checksum[..7], u64::from(sum));
        self.checksum[7] = b' ';
    }

    pub fn verify_checksum(&self) -> bool {
        let mut copy = *self;
        copy.seal();
        copy.checksum == self.checksum
    }

    pub fn set_mode(&mut self, mode: u32) {
        write_octal(&mut self.mode, u64::from(mode));
    }

    pub fn set_uid(&mut self, uid: u32) {
        write_octal(&mut self.uid, u64::from(uid));
    }

    pub fn set_gid(&mut self, gid: u32) {
        write_octal(&mut self.gid, u64::from(gid));
    }

    pub fn set_size(&mut self, size: u64) {
        write_octal(&mut self.size, size);
    }

    pub fn set_mtime(&mut self, mtime: u64) {
        write_octal(&mut self.mtime, mtime);
    }

    pub fn size(&self) -> u64 {
        parse_octal(&self.size)
    }

    pub fn name_bytes(&self) -> &[u8] {
        until_nul(&self.name)
    }

    pub fn prefix_bytes(&self) -> &[u8] {
        until_nul(&self.prefix)
    }

    pub fn linkname_bytes(&self) -> &[u8] {
        until_nul(&self.linkname)
    }
}

/// Writes `value` as zero-padded octal into all but the last byte of `field`, which is set to NUL.
/// PANICS: Panics if `value` does not fit into the field.
pub fn write_octal(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    let octal = format!("{:0width$o}", value, width = digits);
    assert!(octal.len() == digits, "{} does not fit into {} octal digits", value, digits);
    field[..digits].copy_from_slice(octal.as_bytes());
    field[digits] = 0;
}

pub fn parse_octal(field: &[u8]) -> u64 {
    field
        .iter()
        .skip_while(|&&byte| byte == b' ')
        .take_while(|&&byte| (b'0'..=b'7').contains(&byte))
        .fold(0, |value, &digit| value * 8 + u64::from(digit - b'0'))
}

/// Copies `value` into `field`, which must be large enough; the remainder stays zeroed.
pub fn write_str(field: &mut [u8], value: &[u8]) {
    field[..value.len()].copy_from_slice(value);
}

fn until_nul(field: &[u8]) -> &[u8] {
    let len = field.iter().position(|&byte| byte == 0).unwrap_or(field.len());
    &field[..len]
}
