use crate::archive::format::{
    ArchiveHeader, EntryFlags, FileEntry, ENTRY_SIZE, HEADER_SIZE, MAX_NAME_LENGTH,
};
use crate::checksum;
use crate::codec::EncodedEntry;
use crate::error::{ArchiveError, Result};
use filetime::FileTime;
use std::fs::{File, Metadata};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Largest size the u32 offset and size fields can describe
const MAX_ARCHIVE_SIZE: u64 = u32::MAX as u64;

/// Filesystem metadata recorded with each entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub mtime: i64,
    pub atime: i64,
    pub mode: u16,
}

impl EntryMetadata {
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            mtime: FileTime::from_last_modification_time(meta).unix_seconds(),
            atime: FileTime::from_last_access_time(meta).unix_seconds(),
            mode: permission_bits(meta),
        }
    }
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> u16 {
    use std::os::unix::fs::PermissionsExt;
    (meta.permissions().mode() & 0o7777) as u16
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata) -> u16 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Archive writer.
///
/// The header is written as a placeholder on creation. Entry data is
/// spooled to an anonymous temporary file while the entry table is kept in
/// memory; [`finish`](Self::finish) lays out header, table, and data
/// contiguously and back-patches the header.
pub struct ArchiveWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    spool: BufWriter<File>,
    entries: Vec<FileEntry>,
    data_len: u64,
    total_size: u64,
}

impl ArchiveWriter {
    /// Create (or truncate) an archive file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file(file, path)
    }

    /// Build an archive into an already-open, empty file.
    ///
    /// `path` is used for diagnostics and to place the data spool next to
    /// the archive.
    pub fn from_file<P: Into<PathBuf>>(file: File, path: P) -> Result<Self> {
        let path = path.into();
        let mut writer = BufWriter::new(file);

        // Placeholder header (patched in finish)
        ArchiveHeader::new()
            .write_to(&mut writer)
            .map_err(|e| e.writing(&path))?;

        let spool_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let spool = tempfile::tempfile_in(&spool_dir).map_err(|source| ArchiveError::Open {
            path: spool_dir,
            source,
        })?;

        Ok(Self {
            path,
            writer,
            spool: BufWriter::new(spool),
            entries: Vec::new(),
            data_len: 0,
            total_size: 0,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Check that one more entry of the given sizes still fits the format
    pub fn check_capacity(&self, original_size: usize, stored_size: usize) -> Result<()> {
        let table_end = (HEADER_SIZE + (self.entries.len() + 1) * ENTRY_SIZE) as u64;
        let archive_end = table_end + self.data_len + stored_size as u64;
        if archive_end > MAX_ARCHIVE_SIZE {
            return Err(ArchiveError::InvalidArgument(format!(
                "Archive would grow to {} bytes (format limit {})",
                archive_end, MAX_ARCHIVE_SIZE
            )));
        }

        let total = self.total_size + original_size as u64;
        if total > MAX_ARCHIVE_SIZE {
            return Err(ArchiveError::InvalidArgument(format!(
                "Total original size would reach {} bytes (format limit {})",
                total, MAX_ARCHIVE_SIZE
            )));
        }
        Ok(())
    }

    /// Append an entry produced by the codec pipeline
    pub fn append(
        &mut self,
        name: &str,
        encoded: &EncodedEntry,
        meta: EntryMetadata,
    ) -> Result<&FileEntry> {
        let entry = FileEntry {
            name: name.to_string(),
            file_size: encoded.original_size as u32,
            stored_size: 0,
            offset: 0,
            mtime: meta.mtime,
            atime: meta.atime,
            mode: meta.mode,
            flags: encoded.flags,
            crc32: encoded.crc32,
        };
        self.check_capacity(encoded.original_size, encoded.stored_size())?;
        self.push(entry, &encoded.stored)
    }

    /// Append a directory entry; directories carry no data
    pub fn append_directory(&mut self, name: &str, meta: EntryMetadata) -> Result<&FileEntry> {
        let entry = FileEntry {
            name: name.to_string(),
            file_size: 0,
            stored_size: 0,
            offset: 0,
            mtime: meta.mtime,
            atime: meta.atime,
            mode: meta.mode,
            flags: EntryFlags::DIRECTORY,
            crc32: checksum::crc32(&[]),
        };
        self.check_capacity(0, 0)?;
        self.push(entry, &[])
    }

    /// Copy an entry from another archive without re-encoding it
    pub fn copy_entry(&mut self, entry: &FileEntry, stored: &[u8]) -> Result<&FileEntry> {
        if stored.len() != entry.stored_size as usize {
            return Err(ArchiveError::InvalidArgument(format!(
                "Stored data for {} is {} bytes, entry records {}",
                entry.name,
                stored.len(),
                entry.stored_size
            )));
        }
        self.check_capacity(entry.file_size as usize, stored.len())?;
        self.push(entry.clone(), stored)
    }

    fn push(&mut self, mut entry: FileEntry, stored: &[u8]) -> Result<&FileEntry> {
        if entry.name.len() > MAX_NAME_LENGTH {
            return Err(ArchiveError::PathError(format!(
                "Name too long: {} bytes (max {})",
                entry.name.len(),
                MAX_NAME_LENGTH
            )));
        }

        self.spool
            .write_all(stored)
            .map_err(|source| ArchiveError::Write {
                path: self.path.clone(),
                source,
            })?;

        // Relative to the data region until finish() knows the table size
        entry.offset = self.data_len as u32;
        entry.stored_size = stored.len() as u32;
        self.data_len += stored.len() as u64;
        self.total_size += entry.file_size as u64;

        debug!(name = %entry.name, stored = entry.stored_size, flags = %entry.flags, "appended entry");
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Write the entry table and data region, then back-patch the header
    pub fn finish(self) -> Result<ArchiveHeader> {
        let path = self.path.clone();
        self.write_layout().map_err(|e| e.writing(path))
    }

    fn write_layout(self) -> Result<ArchiveHeader> {
        let Self {
            mut writer,
            spool,
            entries,
            data_len,
            total_size,
            ..
        } = self;

        let table_end = (HEADER_SIZE + entries.len() * ENTRY_SIZE) as u64;

        let mut header = ArchiveHeader::new();
        header.file_count = entries.len() as u32;
        header.total_size = total_size as u32;
        header.archive_size = (table_end + data_len) as u32;

        writer.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        for entry in &entries {
            let mut placed = entry.clone();
            placed.offset = (table_end + entry.offset as u64) as u32;
            placed.write_to(&mut writer)?;
            header.flags |= u32::from(entry.flags.bits());
        }

        let mut spool = spool.into_inner().map_err(|e| e.into_error())?;
        spool.seek(SeekFrom::Start(0))?;
        let copied = io::copy(&mut spool, &mut writer)?;
        if copied != data_len {
            return Err(ArchiveError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("data spool holds {} bytes, expected {}", copied, data_len),
            )));
        }

        writer.seek(SeekFrom::Start(0))?;
        header.write_to(&mut writer)?;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::format::FORMAT_VERSION;
    use crate::codec;
    use tempfile::TempDir;

    #[test]
    fn test_layout_is_header_table_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layout.arc");

        let mut writer = ArchiveWriter::create(&path).unwrap();
        let a = codec::encode(b"first", 0, None).unwrap();
        let b = codec::encode(b"second!", 0, None).unwrap();
        writer.append("a.txt", &a, EntryMetadata::default()).unwrap();
        writer.append("b.txt", &b, EntryMetadata::default()).unwrap();
        let header = writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let table_end = HEADER_SIZE + 2 * ENTRY_SIZE;
        assert_eq!(header.file_count, 2);
        assert_eq!(header.total_size, 12);
        assert_eq!(header.archive_size as usize, bytes.len());
        assert_eq!(header.version, FORMAT_VERSION);
        assert_eq!(bytes.len(), table_end + 12);
        assert_eq!(&bytes[table_end..table_end + 5], b"first");
        assert_eq!(&bytes[table_end + 5..], b"second!");

        let parsed = ArchiveHeader::read_from(&bytes[..]).unwrap();
        assert_eq!(parsed, header);

        let second = FileEntry::read_from(&bytes[HEADER_SIZE + ENTRY_SIZE..]).unwrap();
        assert_eq!(second.name, "b.txt");
        assert_eq!(second.offset as usize, table_end + 5);
    }

    #[test]
    fn test_empty_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.arc");
        let header = ArchiveWriter::create(&path).unwrap().finish().unwrap();
        assert_eq!(header.file_count, 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_SIZE as u64);
    }

    #[test]
    fn test_header_flags_summarize_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flags.arc");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        let encoded = codec::encode(&[7u8; 512], 6, None).unwrap();
        writer.append("c.bin", &encoded, EntryMetadata::default()).unwrap();
        writer
            .append_directory("dir", EntryMetadata::default())
            .unwrap();
        let header = writer.finish().unwrap();
        assert_eq!(
            header.flags,
            u32::from((EntryFlags::COMPRESSED | EntryFlags::DIRECTORY).bits())
        );
    }

    #[test]
    fn test_copy_entry_checks_length() {
        let dir = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::create(dir.path().join("copy.arc")).unwrap();
        let entry = FileEntry {
            name: "x".to_string(),
            file_size: 3,
            stored_size: 3,
            offset: 0,
            mtime: 0,
            atime: 0,
            mode: 0o644,
            flags: EntryFlags::empty(),
            crc32: checksum::crc32(b"abc"),
        };
        assert!(writer.copy_entry(&entry, b"ab").is_err());
        assert!(writer.copy_entry(&entry, b"abc").is_ok());
    }

    #[test]
    fn test_rejects_long_names() {
        let dir = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::create(dir.path().join("long.arc")).unwrap();
        let encoded = codec::encode(b"x", 0, None).unwrap();
        let name = "n".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            writer.append(&name, &encoded, EntryMetadata::default()),
            Err(ArchiveError::PathError(_))
        ));
        assert_eq!(writer.entry_count(), 0);
    }
}
