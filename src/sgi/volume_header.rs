use std::mem::size_of;

use log::warn;
use static_assertions::const_assert_eq;

use crate::endian::{Be16, Be32};
use crate::util::{padded_name, OnDisk};

const_assert_eq!(size_of::<RawVolumeHeader>(), 512);
const_assert_eq!(size_of::<RawDeviceParameters>(), 48);
const_assert_eq!(size_of::<RawVolumeFile>(), 16);
const_assert_eq!(size_of::<RawPartition>(), 12);

pub const VOLUME_HEADER_MAGIC: u32 = 0x0BE5_A941;
pub const PARTITION_COUNT: usize = 16;
pub const VOLUME_FILE_COUNT: usize = 15;

/// The volume header as stored in the first block of an SGI disk.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct RawVolumeHeader {
    pub magic: Be32,
    pub root_partition: Be16,
    pub swap_partition: Be16,
    pub boot_file: [u8; 16],
    pub device_parameters: RawDeviceParameters,
    pub volume_files: [RawVolumeFile; VOLUME_FILE_COUNT],
    pub partitions: [RawPartition; PARTITION_COUNT],
    pub checksum: Be32,
    pub fill: Be32,
}

unsafe impl OnDisk for RawVolumeHeader {}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct RawDeviceParameters {
    pub skew: u8,
    pub gap1: u8,
    pub gap2: u8,
    pub spares_per_cylinder: u8,
    pub cylinders: Be16,
    pub heads_start: Be16,
    pub heads: Be16,
    pub command_queue_depth: u8,
    pub cylinders_hi: u8,
    pub unused: Be16,
    pub sectors_per_track: Be16,
    pub bytes_per_sector: Be16,
    pub interleave: Be16,
    pub flags: Be32,
    pub data_rate: Be32,
    pub retries: Be32,
    pub ms_per_word: Be32,
    pub xgap1: Be16,
    pub xsync: Be16,
    pub xrdly: Be16,
    pub xgap2: Be16,
    pub xrgate: Be16,
    pub xwcont: Be16,
}

/// An entry of the volume directory, which stores small files such as the boot loader `sash` inside the volume
/// header partition.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct RawVolumeFile {
    pub name: [u8; 8],
    pub first_block: Be32,
    pub len: Be32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct RawPartition {
    pub num_blocks: Be32,
    pub first_block: Be32,
    pub kind: Be32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PartitionType {
    VolumeHeader,
    TrackReplacement,
    SectorReplacement,
    Raw,
    Bsd,
    SysV,
    Volume,
    Efs,
    LogicalVolume,
    RawLogicalVolume,
    Xfs,
    XfsLog,
    Xlv,
    Xvm,
    Unknown(u32),
}

impl From<u32> for PartitionType {
    fn from(tag: u32) -> Self {
        match tag {
            0 => Self::VolumeHeader,
            1 => Self::TrackReplacement,
            2 => Self::SectorReplacement,
            3 => Self::Raw,
            4 => Self::Bsd,
            5 => Self::SysV,
            6 => Self::Volume,
            7 => Self::Efs,
            8 => Self::LogicalVolume,
            9 => Self::RawLogicalVolume,
            10 => Self::Xfs,
            11 => Self::XfsLog,
            12 => Self::Xlv,
            13 => Self::Xvm,
            other => Self::Unknown(other),
        }
    }
}

/// A block range of the disk. Block numbers are in units of the layout's block size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Partition {
    pub num_blocks: u32,
    pub first_block: u32,
    pub kind: PartitionType,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.num_blocks == 0
    }
}

impl From<RawPartition> for Partition {
    fn from(raw: RawPartition) -> Self {
        Self {
            num_blocks: raw.num_blocks.get(),
            first_block: raw.first_block.get(),
            kind: PartitionType::from(raw.kind.get()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceGeometry {
    pub cylinders: u16,
    pub heads: u16,
    pub sectors_per_track: u16,
    pub bytes_per_sector: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeFile {
    pub name: String,
    pub first_block: u32,
    pub len: u32,
}

#[derive(Debug, Clone)]
pub struct VolumeHeader {
    pub magic: u32,
    pub root_partition: i16,
    pub swap_partition: i16,
    pub boot_file: String,
    pub geometry: DeviceGeometry,
    pub volume_files: Vec<VolumeFile>,
    pub partitions: [Partition; PARTITION_COUNT],
    checksum_matches: bool,
}

impl VolumeHeader {
    /// Decodes the volume header at the start of `bytes`. This never fails: a header with a wrong magic number or
    /// checksum is still returned, whether the disk is usable is decided by looking at the filesystem itself.
    /// PANICS: Panics if `bytes` is shorter than a volume header (512 bytes).
    pub fn new(bytes: &[u8]) -> Self {
        let raw = RawVolumeHeader::read_from(bytes);
        let header = Self::from(raw);
        if !header.has_valid_magic() {
            warn!("volume header magic is {:#010x}, expected {:#010x}", header.magic, VOLUME_HEADER_MAGIC);
        } else if !header.checksum_matches {
            warn!("volume header checksum does not match");
        }
        header
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == VOLUME_HEADER_MAGIC
    }

    pub fn checksum_matches(&self) -> bool {
        self.checksum_matches
    }

    /// PANICS: Panics if `slot >= PARTITION_COUNT`.
    pub fn partition(&self, slot: usize) -> Partition {
        self.partitions[slot]
    }
}

impl From<RawVolumeHeader> for VolumeHeader {
    fn from(raw: RawVolumeHeader) -> Self {
        let device_parameters = raw.device_parameters;
        let geometry = DeviceGeometry {
            cylinders: device_parameters.cylinders.get(),
            heads: device_parameters.heads.get(),
            sectors_per_track: device_parameters.sectors_per_track.get(),
            bytes_per_sector: device_parameters.bytes_per_sector.get(),
        };
        let volume_files = raw
            .volume_files
            .iter()
            .filter(|file| file.name[0] != 0)
            .map(|file| VolumeFile {
                name: padded_name(&file.name),
                first_block: file.first_block.get(),
                len: file.len.get(),
            })
            .collect();

        Self {
            magic: raw.magic.get(),
            root_partition: raw.root_partition.get_signed(),
            swap_partition: raw.swap_partition.get_signed(),
            boot_file: padded_name(&raw.boot_file),
            geometry,
            volume_files,
            partitions: raw.partitions.map(Partition::from),
            checksum_matches: checksum(&raw) == 0,
        }
    }
}

/// The header is valid if the sum of all its big-endian 32 bit words, including the checksum itself, is zero.
pub fn checksum(raw: &RawVolumeHeader) -> u32 {
    raw.as_bytes()
        .chunks_exact(4)
        .map(|word| u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
        .fold(0u32, |sum, word| sum.wrapping_add(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_image::TestImage;

    #[test]
    fn decodes_partition_table() {
        let image = TestImage::new().into_bytes();
        let header = VolumeHeader::new(&image);

        assert!(header.has_valid_magic());
        assert!(header.checksum_matches());
        let efs = header.partition(7);
        assert_eq!(efs.kind, PartitionType::Efs);
        assert_eq!(efs.first_block, TestImage::PARTITION_FIRST_BLOCK);
        assert_eq!(efs.num_blocks, TestImage::FS_BLOCKS);
        assert_eq!(header.partition(8).kind, PartitionType::Volume);
        assert!(header.partition(0).is_empty());
    }

    #[test]
    fn decodes_geometry_and_volume_directory() {
        let image = TestImage::new().into_bytes();
        let header = VolumeHeader::new(&image);

        assert_eq!(header.geometry.bytes_per_sector, 512);
        assert_eq!(header.boot_file, "/unix");
        assert_eq!(
            header.volume_files,
            vec![VolumeFile { name: "sash".to_string(), first_block: 2, len: 4096 }]
        );
    }

    #[test]
    fn accepts_wrong_magic() {
        let bytes = vec![0xFF; 512];
        let header = VolumeHeader::new(&bytes);
        assert!(!header.has_valid_magic());
        assert_eq!(header.partition(7).kind, PartitionType::Unknown(0xFFFF_FFFF));
    }

    #[test]
    fn detects_checksum_mismatch() {
        let mut image = TestImage::new().into_bytes();
        image[100] ^= 0x01;
        let header = VolumeHeader::new(&image);
        assert!(header.has_valid_magic());
        assert!(!header.checksum_matches());
    }

    #[test]
    fn zeroed_header_has_empty_partitions() {
        let header = VolumeHeader::new(&[0; 512]);
        assert!(header.partitions.iter().all(Partition::is_empty));
        assert!(header.volume_files.is_empty());
    }
}
