use crate::error::{ArchiveError, Result};
use std::fmt;
use std::io::{Read, Write};
use std::ops::{BitOr, BitOrAssign};
use std::time::{SystemTime, UNIX_EPOCH};

/// Magic number: "ARCH" (0x48435241 read as a little-endian u32)
pub const MAGIC_NUMBER: [u8; 4] = *b"ARCH";

/// Current format version, major in the high byte, minor in the low byte
pub const FORMAT_VERSION: u16 = 0x0100;
pub const FORMAT_VERSION_MAJOR: u16 = FORMAT_VERSION >> 8;
pub const FORMAT_VERSION_MINOR: u16 = FORMAT_VERSION & 0xFF;

/// Header size in bytes
pub const HEADER_SIZE: usize = 96;

/// Entry table record size in bytes
pub const ENTRY_SIZE: usize = 324;

/// Size of the NUL-padded name field
pub const NAME_FIELD_SIZE: usize = 256;

/// Maximum entry name length in bytes (UTF-8), leaving room for the NUL
pub const MAX_NAME_LENGTH: usize = NAME_FIELD_SIZE - 1;

const HEADER_RESERVED: usize = 64;
const ENTRY_RESERVED: usize = 32;

/// Per-entry flag bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EntryFlags(u16);

impl EntryFlags {
    pub const COMPRESSED: Self = Self(0x01);
    pub const ENCRYPTED: Self = Self(0x02);
    pub const DIRECTORY: Self = Self(0x04);
    pub const SYMLINK: Self = Self(0x08);
    pub const MODIFIED: Self = Self(0x10);

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Unknown bits are kept so verbatim copies preserve them
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Listing letters: C=compressed, E=encrypted, D=directory, L=symlink
    pub fn letters(self) -> String {
        [
            (Self::COMPRESSED, 'C'),
            (Self::ENCRYPTED, 'E'),
            (Self::DIRECTORY, 'D'),
            (Self::SYMLINK, 'L'),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, letter)| *letter)
        .collect()
    }
}

impl BitOr for EntryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntryFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for EntryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.letters())
    }
}

/// Normalize an entry name: forward slashes, no leading `/` or `./`,
/// no empty components.
///
/// Names with `..` components or longer than [`MAX_NAME_LENGTH`] bytes are
/// rejected rather than truncated.
pub fn normalize_name(name: &str) -> Result<String> {
    let replaced = name.replace('\\', "/");
    let mut parts = Vec::new();
    for part in replaced.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(ArchiveError::PathError(format!(
                    "Parent directory component in name: {}",
                    name
                )))
            }
            _ => parts.push(part),
        }
    }

    let normalized = parts.join("/");
    if normalized.is_empty() {
        return Err(ArchiveError::PathError(format!("Empty entry name: {:?}", name)));
    }
    if normalized.len() > MAX_NAME_LENGTH {
        return Err(ArchiveError::PathError(format!(
            "Name too long: {} bytes (max {})",
            normalized.len(),
            MAX_NAME_LENGTH
        )));
    }
    Ok(normalized)
}

/// Archive header at offset 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub version: u16,
    pub header_size: u16,
    pub file_count: u32,
    pub total_size: u32,
    pub archive_size: u32,
    pub create_time: i64,
    pub flags: u32,
}

impl ArchiveHeader {
    pub fn new() -> Self {
        let create_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            version: FORMAT_VERSION,
            header_size: HEADER_SIZE as u16,
            file_count: 0,
            total_size: 0,
            archive_size: 0,
            create_time,
            flags: 0,
        }
    }

    pub fn version_major(&self) -> u16 {
        self.version >> 8
    }

    pub fn version_minor(&self) -> u16 {
        self.version & 0xFF
    }

    /// Byte offset where the entry table starts
    pub fn table_offset(&self) -> u64 {
        self.header_size as u64
    }

    /// Byte offset where the data region starts
    pub fn data_offset(&self) -> u64 {
        self.table_offset() + self.file_count as u64 * ENTRY_SIZE as u64
    }

    /// archive_size / total_size as a percentage (0 for an empty archive)
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        self.archive_size as f64 / self.total_size as f64 * 100.0
    }

    /// Write header to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&MAGIC_NUMBER)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.header_size.to_le_bytes())?;
        writer.write_all(&self.file_count.to_le_bytes())?;
        writer.write_all(&self.total_size.to_le_bytes())?;
        writer.write_all(&self.archive_size.to_le_bytes())?;
        writer.write_all(&self.create_time.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&[0u8; HEADER_RESERVED])?;
        Ok(())
    }

    /// Read and validate a header.
    ///
    /// Consumes exactly [`HEADER_SIZE`] bytes; a larger `header_size` is
    /// left for the caller to skip.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC_NUMBER {
            return Err(ArchiveError::InvalidMagic);
        }

        let version = read_u16(&mut reader)?;
        let header_size = read_u16(&mut reader)?;
        let file_count = read_u32(&mut reader)?;
        let total_size = read_u32(&mut reader)?;
        let archive_size = read_u32(&mut reader)?;
        let create_time = read_i64(&mut reader)?;
        let flags = read_u32(&mut reader)?;

        let mut reserved = [0u8; HEADER_RESERVED];
        reader.read_exact(&mut reserved)?;

        let header = Self {
            version,
            header_size,
            file_count,
            total_size,
            archive_size,
            create_time,
            flags,
        };
        header.validate()?;
        Ok(header)
    }

    /// Validate version compatibility and header size
    pub fn validate(&self) -> Result<()> {
        if self.version_major() != FORMAT_VERSION_MAJOR {
            return Err(ArchiveError::UnsupportedVersion(self.version));
        }
        if (self.header_size as usize) < HEADER_SIZE {
            return Err(ArchiveError::InvalidFormat(format!(
                "Header size {} is smaller than {}",
                self.header_size, HEADER_SIZE
            )));
        }
        Ok(())
    }
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry table record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub file_size: u32,
    pub stored_size: u32,
    pub offset: u32,
    pub mtime: i64,
    pub atime: i64,
    pub mode: u16,
    pub flags: EntryFlags,
    pub crc32: u32,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.flags.contains(EntryFlags::DIRECTORY)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(EntryFlags::ENCRYPTED)
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(EntryFlags::COMPRESSED)
    }

    /// Write entry to the entry table
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let name_bytes = self.name.as_bytes();
        if name_bytes.len() > MAX_NAME_LENGTH {
            return Err(ArchiveError::PathError(format!(
                "Name too long: {} bytes (max {})",
                name_bytes.len(),
                MAX_NAME_LENGTH
            )));
        }

        let mut name_buf = [0u8; NAME_FIELD_SIZE];
        name_buf[..name_bytes.len()].copy_from_slice(name_bytes);
        writer.write_all(&name_buf)?;

        writer.write_all(&self.file_size.to_le_bytes())?;
        writer.write_all(&self.stored_size.to_le_bytes())?;
        writer.write_all(&self.offset.to_le_bytes())?;
        writer.write_all(&self.mtime.to_le_bytes())?;
        writer.write_all(&self.atime.to_le_bytes())?;
        writer.write_all(&self.mode.to_le_bytes())?;
        writer.write_all(&self.flags.bits().to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&[0u8; ENTRY_RESERVED])?;
        Ok(())
    }

    /// Read entry from the entry table
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut name_buf = [0u8; NAME_FIELD_SIZE];
        reader.read_exact(&mut name_buf)?;
        let name_len = name_buf
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ArchiveError::InvalidFormat("Entry name is not NUL-terminated".to_string()))?;
        let name = String::from_utf8(name_buf[..name_len].to_vec())
            .map_err(|e| ArchiveError::InvalidFormat(format!("Invalid UTF-8 in entry name: {}", e)))?;

        let file_size = read_u32(&mut reader)?;
        let stored_size = read_u32(&mut reader)?;
        let offset = read_u32(&mut reader)?;
        let mtime = read_i64(&mut reader)?;
        let atime = read_i64(&mut reader)?;
        let mode = read_u16(&mut reader)?;
        let flags = EntryFlags::from_bits(read_u16(&mut reader)?);
        let crc32 = read_u32(&mut reader)?;

        let mut reserved = [0u8; ENTRY_RESERVED];
        reader.read_exact(&mut reserved)?;

        Ok(Self {
            name,
            file_size,
            stored_size,
            offset,
            mtime,
            atime,
            mode,
            flags,
            crc32,
        })
    }
}

// Helper functions for reading primitive types
fn read_u16<R: Read>(mut reader: R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(mut reader: R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i64<R: Read>(mut reader: R) -> Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> FileEntry {
        FileEntry {
            name: "docs/readme.txt".to_string(),
            file_size: 5000,
            stored_size: 2000,
            offset: 1024,
            mtime: 1_699_999_999,
            atime: 1_700_000_000,
            mode: 0o644,
            flags: EntryFlags::COMPRESSED | EntryFlags::ENCRYPTED,
            crc32: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn test_magic_matches_packed_constant() {
        assert_eq!(u32::from_le_bytes(MAGIC_NUMBER), 0x4843_5241);
    }

    #[test]
    fn test_header_layout() {
        let header = ArchiveHeader {
            version: FORMAT_VERSION,
            header_size: HEADER_SIZE as u16,
            file_count: 3,
            total_size: 4096,
            archive_size: 2048,
            create_time: 1_700_000_000,
            flags: 0x03,
        };

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[0..4], b"ARCH");
        assert_eq!(&buf[4..6], &[0x00, 0x01]);
        assert_eq!(&buf[8..12], &3u32.to_le_bytes());

        let parsed = ArchiveHeader::read_from(&buf[..]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.data_offset(), (HEADER_SIZE + 3 * ENTRY_SIZE) as u64);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut buf = Vec::new();
        ArchiveHeader::new().write_to(&mut buf).unwrap();
        buf[0] = b'Z';
        assert!(matches!(
            ArchiveHeader::read_from(&buf[..]),
            Err(ArchiveError::InvalidMagic)
        ));
    }

    #[test]
    fn test_header_rejects_other_major_version() {
        let mut header = ArchiveHeader::new();
        header.version = 0x0200;
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert!(matches!(
            ArchiveHeader::read_from(&buf[..]),
            Err(ArchiveError::UnsupportedVersion(0x0200))
        ));

        // A newer minor version of the same major is accepted
        header.version = 0x0107;
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert!(ArchiveHeader::read_from(&buf[..]).is_ok());
    }

    #[test]
    fn test_truncated_header_is_io_error() {
        let mut buf = Vec::new();
        ArchiveHeader::new().write_to(&mut buf).unwrap();
        let result = ArchiveHeader::read_from(&buf[..40]);
        assert!(matches!(result, Err(ArchiveError::Io(_))));
    }

    #[test]
    fn test_entry_layout() {
        let entry = sample_entry();
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), ENTRY_SIZE);
        assert_eq!(buf[entry.name.len()], 0);

        let parsed = FileEntry::read_from(&buf[..]).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_entry_name_limit() {
        let mut entry = sample_entry();
        entry.name = "a".repeat(MAX_NAME_LENGTH);
        assert!(entry.write_to(Vec::new()).is_ok());

        entry.name = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            entry.write_to(Vec::new()),
            Err(ArchiveError::PathError(_))
        ));
    }

    #[test]
    fn test_flag_letters() {
        assert_eq!(EntryFlags::empty().letters(), "");
        assert_eq!((EntryFlags::COMPRESSED | EntryFlags::ENCRYPTED).letters(), "CE");
        assert_eq!(EntryFlags::DIRECTORY.letters(), "D");
        assert_eq!((EntryFlags::SYMLINK | EntryFlags::MODIFIED).letters(), "L");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(normalize_name("/tmp//x/./y").unwrap(), "tmp/x/y");
        assert_eq!(normalize_name(".\\dir\\file").unwrap(), "dir/file");
        assert!(normalize_name("../etc/passwd").is_err());
        assert!(normalize_name("a/../../b").is_err());
        assert!(normalize_name("/").is_err());
        assert!(normalize_name(&"n".repeat(300)).is_err());
    }
}
