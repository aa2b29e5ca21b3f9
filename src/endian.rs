use std::fmt::{self, Debug, Formatter};

/// SGI machines are big-endian, so every multi-byte integer in the volume header and in the EFS structures is stored
/// most significant byte first. `Be16`, `Be24`, and `Be32` wrap the raw bytes of such a value. They have an alignment
/// of 1, which allows on-disk structs built from them to be read from arbitrary offsets of the image.
macro_rules! big_endian_int {
    ($name:ident, $full:ty, $len:expr) => {
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, PartialEq, Eq)]
        pub struct $name([u8; $len]);

        impl $name {
            const MAX: $full = <$full>::MAX >> ((std::mem::size_of::<$full>() - $len) * 8);

            /// PANICS: Panics if `value` does not fit into the on-disk width.
            pub fn new(value: $full) -> Self {
                assert!(value <= Self::MAX, "{} does not fit into {} bytes", value, $len);
                let bytes = value.to_be_bytes();
                let mut raw = [0; $len];
                raw.copy_from_slice(&bytes[bytes.len() - $len..]);
                Self(raw)
            }

            pub fn get(self) -> $full {
                let mut bytes = [0; std::mem::size_of::<$full>()];
                let skip = bytes.len() - $len;
                bytes[skip..].copy_from_slice(&self.0);
                <$full>::from_be_bytes(bytes)
            }
        }

        impl From<$name> for $full {
            fn from(value: $name) -> Self {
                value.get()
            }
        }

        impl Debug for $name {
            fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
                self.get().fmt(formatter)
            }
        }
    };
}

big_endian_int!(Be16, u16, 2);
big_endian_int!(Be24, u32, 3);
big_endian_int!(Be32, u32, 4);

impl Be16 {
    /// Reinterprets the value as a two's complement signed integer, for fields declared as `short` by IRIX.
    pub fn get_signed(self) -> i16 {
        i16::from_be_bytes(self.0)
    }
}

impl Be32 {
    /// Reinterprets the value as a two's complement signed integer, for fields declared as `int` by IRIX.
    pub fn get_signed(self) -> i32 {
        i32::from_be_bytes(self.0)
    }

    pub fn new_signed(value: i32) -> Self {
        Self(value.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_most_significant_byte_first() {
        let value = Be32([0x0B, 0xE5, 0xA9, 0x41]);
        assert_eq!(value.get(), 0x0BE5_A941);
    }

    #[test]
    fn writes_most_significant_byte_first() {
        assert_eq!(Be16::new(0xBEEF).0, [0xBE, 0xEF]);
        assert_eq!(Be24::new(0x12_3456).0, [0x12, 0x34, 0x56]);
    }

    #[test]
    fn reads_signed_values() {
        assert_eq!(Be32::new_signed(-2).get_signed(), -2);
        assert_eq!(Be16::new(0xFFFF).get_signed(), -1);
    }

    #[test]
    #[should_panic]
    fn rejects_values_wider_than_the_field() {
        Be24::new(0x0100_0000);
    }
}
