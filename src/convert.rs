use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info};

use crate::efs::{FileType, Filesystem, Inode, WalkEntry};
use crate::error::EfsError;
use crate::format::EfsLayout;
use crate::image::{read_prefix, ByteStore, Image};
use crate::sgi::VolumeHeader;
use crate::tar::{EntryMetadata, TarWriter};

/// What a conversion wrote into the archive
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub directories: usize,
    pub files: usize,
    pub symlinks: usize,
    /// Devices, FIFOs, and sockets, which are not archived
    pub skipped: usize,
    pub content_bytes: u64,
}

/// The default output path: `input` with its extension replaced by `tar`.
pub fn output_path_for(input: &Path) -> PathBuf {
    input.with_extension("tar")
}

/// Fails with `EfsError::OutputExists` if something exists at `output`, without touching it.
pub fn ensure_output_absent(output: &Path) -> Result<(), EfsError> {
    match fs::symlink_metadata(output) {
        Ok(_) => Err(EfsError::OutputExists(output.to_path_buf())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn create_output(output: &Path) -> Result<File, EfsError> {
    OpenOptions::new().write(true).create_new(true).open(output).map_err(|err| match err.kind() {
        io::ErrorKind::AlreadyExists => EfsError::OutputExists(output.to_path_buf()),
        _ => err.into(),
    })
}

/// Decodes the volume header of `store` and binds the filesystem in the layout's partition slot to it. Returns
/// `EfsError::NotEfs` if that partition does not hold an EFS filesystem.
pub fn open_filesystem<S: ByteStore>(store: S, layout: EfsLayout) -> Result<Filesystem<S>, EfsError> {
    let header_bytes = read_prefix(&store, layout.header_len)?;
    let volume_header = VolumeHeader::new(&header_bytes);
    log_volume_header(&volume_header);
    let partition = volume_header.partition(layout.partition_slot);
    debug!(
        "partition {}: {:?}, {} blocks starting at block {}",
        layout.partition_slot, partition.kind, partition.num_blocks, partition.first_block
    );
    if partition.is_empty() {
        return Err(EfsError::NotEfs(format!("partition {} is empty", layout.partition_slot)));
    }

    let fs = Filesystem::new(store, layout, partition)?;
    let root = fs.validate()?;
    debug!("root directory has {} bytes in {} extents", root.size, root.extent_count);
    Ok(fs)
}

fn log_volume_header(header: &VolumeHeader) {
    let geometry = &header.geometry;
    debug!(
        "volume header: {} cylinders, {} heads, {} sectors of {} bytes",
        geometry.cylinders, geometry.heads, geometry.sectors_per_track, geometry.bytes_per_sector
    );
    debug!(
        "root partition {}, swap partition {}, boot file {:?}",
        header.root_partition, header.swap_partition, header.boot_file
    );
    for file in &header.volume_files {
        debug!("volume directory: {:?}, {} bytes at block {}", file.name, file.len, file.first_block);
    }
}

/// Opens the image at `input` and checks that it holds an EFS filesystem.
pub fn open_image(input: &Path, layout: EfsLayout) -> Result<Filesystem<Image>> {
    let image = Image::open(input)?;
    let fs = open_filesystem(image, layout).with_context(|| format!("Unable to read {}", input.display()))?;
    Ok(fs)
}

fn entry_metadata(inode: &Inode) -> EntryMetadata {
    EntryMetadata {
        mode: u32::from(inode.permissions()),
        uid: u32::from(inode.uid),
        gid: u32::from(inode.gid),
        mtime: u64::from(inode.mtime),
    }
}

/// Appends every file of `fs` to `archive`, in walk order. Does not finish the archive.
pub fn write_archive<S: ByteStore, W: Write>(
    fs: &Filesystem<S>,
    archive: &mut TarWriter<W>,
) -> Result<ConversionStats, EfsError> {
    let mut stats = ConversionStats::default();
    for entry in fs.walk()? {
        let WalkEntry { path, inode } = entry?;
        let metadata = entry_metadata(&inode);
        match inode.file_type() {
            FileType::Directory => {
                archive.append_dir(&path, &metadata)?;
                stats.directories += 1;
            }
            FileType::Regular => {
                let content = fs.file_contents(&inode)?;
                archive.append_file(&path, &metadata, &content)?;
                stats.files += 1;
                stats.content_bytes += content.len() as u64;
            }
            FileType::Symlink => {
                let target = fs.file_contents(&inode)?;
                archive.append_symlink(&path, &metadata, &target)?;
                stats.symlinks += 1;
            }
            FileType::Other => {
                info!(
                    "skipping {} (inode {}, mode {:o})",
                    String::from_utf8_lossy(&path),
                    inode.number,
                    inode.mode
                );
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

/// Converts the EFS image at `input` into a new tar archive at `output`. `output` is never overwritten, and is removed
/// again if the conversion fails.
pub fn convert(input: &Path, output: &Path, layout: EfsLayout) -> Result<ConversionStats> {
    ensure_output_absent(output)?;
    let filesystem = open_image(input, layout)?;

    let file = create_output(output)?;
    match write_tar(&filesystem, file) {
        Ok(stats) => {
            info!(
                "wrote {} directories, {} files ({} bytes), {} symlinks; skipped {}",
                stats.directories, stats.files, stats.content_bytes, stats.symlinks, stats.skipped
            );
            Ok(stats)
        }
        Err(err) => {
            if let Err(remove_err) = fs::remove_file(output) {
                debug!("unable to remove {}: {}", output.display(), remove_err);
            }
            Err(err.context(format!("Unable to convert {}", input.display())))
        }
    }
}

fn write_tar<S: ByteStore>(fs: &Filesystem<S>, file: File) -> Result<ConversionStats> {
    let mut archive = TarWriter::new(BufWriter::new(file));
    let stats = write_archive(fs, &mut archive)?;
    let total = archive.bytes_written();
    let file = archive.finish()?.into_inner().context("Unable to flush the archive")?;
    file.sync_all()?;
    debug!("archive holds {} bytes before the end marker", total);
    Ok(stats)
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|time| time.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_else(|| "?".to_string())
}

/// Describes the filesystem of `fs` in one line: volume name, pack, time of the last update in UTC, and free space.
pub fn summary<S: ByteStore>(fs: &Filesystem<S>) -> String {
    let superblock = fs.superblock();
    format!(
        "volume {:?}, pack {:?}, last update {}, {} free blocks, {} free inodes{}",
        superblock.name,
        superblock.pack,
        format_time(superblock.last_update()),
        superblock.free_blocks,
        superblock.free_inodes,
        if superblock.dirty { ", not cleanly unmounted" } else { "" }
    )
}

/// Formats `entry` like `ls -l`: permissions, owner, size, modification time in UTC, and path. Name bytes that are not
/// UTF-8 are shown as U+FFFD.
pub fn listing_line(entry: &WalkEntry) -> String {
    let inode = &entry.inode;
    let mtime = format_time(Utc.timestamp_opt(i64::from(inode.mtime), 0).single());
    format!(
        "{} {:>5}/{:<5} {:>10} {} {}",
        permission_string(inode),
        inode.uid,
        inode.gid,
        inode.size,
        mtime,
        String::from_utf8_lossy(&entry.path)
    )
}

fn permission_string(inode: &Inode) -> String {
    let kind = match inode.file_type() {
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
        FileType::Regular => '-',
        FileType::Other => '?',
    };
    let permissions = inode.permissions();
    let bits = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    std::iter::once(kind)
        .chain(bits.iter().map(|&(bit, c)| if permissions & bit != 0 { c } else { '-' }))
        .collect()
}

/// Prints one line per file of `fs` to `out`.
pub fn list<S: ByteStore, W: Write>(fs: &Filesystem<S>, out: &mut W) -> Result<usize> {
    let mut count = 0;
    for entry in fs.walk()? {
        writeln!(out, "{}", listing_line(&entry?))?;
        count += 1;
    }
    Ok(count)
}
