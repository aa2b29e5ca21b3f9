//! Minimal writer for POSIX ustar archives, with the GNU extensions for long names and link targets.

mod header;
mod writer;

pub use self::writer::*;

#[cfg(test)]
pub mod testing {
    use num::Integer;

    use crate::tar::header::{parse_octal, UstarHeader, BLOCK_SIZE, TYPE_GNU_LONG_LINK, TYPE_GNU_LONG_NAME};
    use crate::util::OnDisk;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ArchivedEntry {
        pub typeflag: u8,
        pub path: Vec<u8>,
        pub mode: u32,
        pub content: Vec<u8>,
        pub link_target: String,
    }

    impl ArchivedEntry {
        pub fn new(typeflag: u8, path: &str, mode: u32, content: &[u8], link_target: &str) -> Self {
            Self {
                typeflag,
                path: path.as_bytes().to_vec(),
                mode,
                content: content.to_vec(),
                link_target: link_target.to_string(),
            }
        }
    }

    fn until_nul(bytes: &[u8]) -> &[u8] {
        let len = bytes.iter().position(|&byte| byte == 0).unwrap_or(bytes.len());
        &bytes[..len]
    }

    /// Decodes an archive, resolving GNU long name records. Panics on anything malformed, including a missing end
    /// marker.
    pub fn read_archive(bytes: &[u8]) -> Vec<ArchivedEntry> {
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);
        let mut entries = Vec::new();
        let mut long_name = None;
        let mut long_link = None;
        let mut offset = 0;
        loop {
            let block = &bytes[offset..offset + BLOCK_SIZE];
            if block.iter().all(|&byte| byte == 0) {
                assert!(bytes[offset..].iter().all(|&byte| byte == 0));
                assert!(bytes.len() - offset >= 2 * BLOCK_SIZE);
                return entries;
            }
            let header = UstarHeader::read_from(block);
            assert!(header.verify_checksum());
            let size = header.size() as usize;
            let content = bytes[offset + BLOCK_SIZE..offset + BLOCK_SIZE + size].to_vec();
            offset += BLOCK_SIZE + Integer::div_ceil(&size, &BLOCK_SIZE) * BLOCK_SIZE;

            match header.typeflag {
                TYPE_GNU_LONG_NAME => long_name = Some(until_nul(&content).to_vec()),
                TYPE_GNU_LONG_LINK => long_link = Some(String::from_utf8_lossy(until_nul(&content)).into_owned()),
                typeflag => {
                    let path = long_name.take().unwrap_or_else(|| match header.prefix_bytes() {
                        [] => header.name_bytes().to_vec(),
                        prefix => [prefix, &b"/"[..], header.name_bytes()].concat(),
                    });
                    let link_target = long_link
                        .take()
                        .unwrap_or_else(|| String::from_utf8_lossy(header.linkname_bytes()).into_owned());
                    entries.push(ArchivedEntry {
                        typeflag,
                        path,
                        mode: parse_octal(&header.mode) as u32,
                        content,
                        link_target,
                    });
                }
            }
        }
    }
}
