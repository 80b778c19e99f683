//! Store-only ZIP writer.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Local file header 1 (30) │ name │ content    │
//! ├──────────────────────────────────────────────┤
//! │ ...                                          │
//! ├──────────────────────────────────────────────┤
//! │ Central directory header 1 (46) │ name       │
//! ├──────────────────────────────────────────────┤
//! │ ...                                          │
//! ├──────────────────────────────────────────────┤
//! │ End of central directory (22)                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Timestamps are zero and nothing is
//! compressed, so the output depends only on the ordered entry list.

pub mod crc32;
pub mod path;

use crate::error::{AppError, Result};

pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4B50;
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4B50;
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4B50;

pub const LOCAL_FILE_HEADER_SIZE: usize = 30;
pub const CENTRAL_DIRECTORY_HEADER_SIZE: usize = 46;
pub const END_OF_CENTRAL_DIRECTORY_SIZE: usize = 22;

/// "2.0": plain stored files and directories.
const ZIP_VERSION: u16 = 20;
const METHOD_STORE: u16 = 0;

/// A single logical file destined for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub content: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Fields shared by the local and central headers of one entry.
#[derive(Debug, Clone)]
struct EntryRecord {
    name: String,
    crc32: u32,
    size: u32,
    local_header_offset: u32,
}

impl EntryRecord {
    fn name_len(&self) -> u16 {
        // Checked when the record is built.
        self.name.len() as u16
    }

    fn local_header(&self) -> [u8; LOCAL_FILE_HEADER_SIZE] {
        let mut bytes = [0u8; LOCAL_FILE_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        bytes[4..6].copy_from_slice(&ZIP_VERSION.to_le_bytes());
        // 6..8 flags, 10..12 mod time, 12..14 mod date: zero
        bytes[8..10].copy_from_slice(&METHOD_STORE.to_le_bytes());
        bytes[14..18].copy_from_slice(&self.crc32.to_le_bytes());
        bytes[18..22].copy_from_slice(&self.size.to_le_bytes());
        bytes[22..26].copy_from_slice(&self.size.to_le_bytes());
        bytes[26..28].copy_from_slice(&self.name_len().to_le_bytes());
        // 28..30 extra field length: zero
        bytes
    }

    fn central_header(&self) -> [u8; CENTRAL_DIRECTORY_HEADER_SIZE] {
        let mut bytes = [0u8; CENTRAL_DIRECTORY_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        bytes[4..6].copy_from_slice(&ZIP_VERSION.to_le_bytes());
        bytes[6..8].copy_from_slice(&ZIP_VERSION.to_le_bytes());
        // 8..10 flags, 12..16 mod time/date: zero
        bytes[10..12].copy_from_slice(&METHOD_STORE.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.crc32.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.size.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.size.to_le_bytes());
        bytes[28..30].copy_from_slice(&self.name_len().to_le_bytes());
        // 30..42 extra len, comment len, disk number, internal and external attributes: zero
        bytes[42..46].copy_from_slice(&self.local_header_offset.to_le_bytes());
        bytes
    }
}

fn end_of_central_directory(
    entry_count: u16,
    directory_size: u32,
    directory_offset: u32,
) -> [u8; END_OF_CENTRAL_DIRECTORY_SIZE] {
    let mut bytes = [0u8; END_OF_CENTRAL_DIRECTORY_SIZE];
    bytes[0..4].copy_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
    // 4..8 this disk, directory disk: zero
    bytes[8..10].copy_from_slice(&entry_count.to_le_bytes());
    bytes[10..12].copy_from_slice(&entry_count.to_le_bytes());
    bytes[12..16].copy_from_slice(&directory_size.to_le_bytes());
    bytes[16..20].copy_from_slice(&directory_offset.to_le_bytes());
    // 20..22 comment length: zero
    bytes
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| AppError::Archive(format!("{what} of {value} bytes exceeds the 4 GiB limit")))
}

/// Encode `entries`, in order, as a store-only ZIP archive.
///
/// Entry paths are sanitized first; see [`path::sanitize_entry_path`].
pub fn encode(entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    let entry_count = u16::try_from(entries.len()).map_err(|_| {
        AppError::Archive(format!("{} entries exceed the limit of 65535", entries.len()))
    })?;

    let payload: usize = entries
        .iter()
        .map(|e| {
            LOCAL_FILE_HEADER_SIZE + CENTRAL_DIRECTORY_HEADER_SIZE + 2 * e.path.len() + e.content.len()
        })
        .sum();
    let mut out = Vec::with_capacity(payload + END_OF_CENTRAL_DIRECTORY_SIZE);
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        let name = path::sanitize_entry_path(&entry.path);
        if u16::try_from(name.len()).is_err() {
            return Err(AppError::Archive(format!(
                "entry name of {} bytes exceeds the limit of 65535",
                name.len()
            )));
        }
        let record = EntryRecord {
            crc32: crc32::checksum(&entry.content),
            size: to_u32(entry.content.len(), "entry")?,
            local_header_offset: to_u32(out.len(), "archive offset")?,
            name,
        };

        out.extend_from_slice(&record.local_header());
        out.extend_from_slice(record.name.as_bytes());
        out.extend_from_slice(&entry.content);
        records.push(record);
    }

    let directory_start = out.len();
    let directory_offset = to_u32(directory_start, "central directory offset")?;
    for record in &records {
        out.extend_from_slice(&record.central_header());
        out.extend_from_slice(record.name.as_bytes());
    }
    let directory_size = to_u32(out.len() - directory_start, "central directory")?;

    out.extend_from_slice(&end_of_central_directory(
        entry_count,
        directory_size,
        directory_offset,
    ));
    Ok(out)
}
