use std::convert::TryFrom;
use std::mem::{align_of, size_of};
use std::slice;

use static_assertions::const_assert;

const_assert!(size_of::<usize>() >= size_of::<u32>());

/// Extension trait for a convenience method which transmutes a slice to a slice of another type
/// while ensuring correct alignment and size.
pub trait ExactAlign {
    /// SAFETY: See the documentation for `slice::align_to`
    unsafe fn exact_align_to<Target>(&self) -> &[Target];
}

impl<T> ExactAlign for [T] {
    unsafe fn exact_align_to<Target>(&self) -> &[Target] {
        let (before, target, after) = self.align_to::<Target>();
        assert!(before.is_empty());
        assert!(after.is_empty());
        target
    }
}

/// Marker for structs that mirror an on-disk record byte for byte.
///
/// SAFETY: Implementors must be `repr(C)` or `repr(transparent)`, have an alignment of 1, contain no padding, and be
/// valid for every bit pattern. All on-disk records of this crate are built from `u8` arrays and the big-endian
/// wrappers in `endian`, which satisfy these requirements.
pub unsafe trait OnDisk: Copy {
    /// PANICS: Panics if `bytes` is shorter than `Self`.
    fn read_from(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= size_of::<Self>());
        debug_assert_eq!(align_of::<Self>(), 1);
        // SAFETY: `bytes` covers at least `size_of::<Self>()` bytes and `Self` is valid for every bit pattern.
        unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Self) }
    }

    /// Interprets a slice of raw bytes as a slice of records.
    /// PANICS: Panics if `bytes.len()` is not a multiple of the record size.
    fn slice_from(bytes: &[u8]) -> &[Self] {
        // SAFETY: `Self` has an alignment of 1 and is valid for every bit pattern, so only the length can mismatch,
        // which `exact_align_to` checks.
        unsafe { bytes.exact_align_to::<Self>() }
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: `Self` contains no padding, so all of its bytes are initialized.
        unsafe { slice::from_raw_parts(self as *const Self as *const u8, size_of::<Self>()) }
    }
}

/// Lossless widening of on-disk `u32` values to `usize`, guaranteed by the `const_assert` above.
pub trait FromU32 {
    fn fromx(n: u32) -> Self;
}

impl FromU32 for usize {
    fn fromx(n: u32) -> Self {
        usize::try_from(n).expect("usize is at least 32 bits wide")
    }
}

/// Reads a NUL-padded fixed-width name field as printed by IRIX tools.
pub fn padded_name(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&byte| byte == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).trim_end().to_string()
}
