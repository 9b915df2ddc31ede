use crate::archive::format::{ArchiveHeader, FileEntry, ENTRY_SIZE};
use crate::codec;
use crate::context::Password;
use crate::error::{ArchiveError, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Archive reader with O(1) entry lookup by name
pub struct ArchiveReader {
    path: PathBuf,
    file: File,
    header: ArchiveHeader,
    entries: Vec<FileEntry>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ArchiveReader {
    /// Open an archive, validating the header and every table entry
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| ArchiveError::Open {
            path: path.clone(),
            source,
        })?;
        let file_len = file
            .metadata()
            .map_err(|source| ArchiveError::Read {
                path: path.clone(),
                source,
            })?
            .len();

        let mut reader = BufReader::new(file);
        let header = ArchiveHeader::read_from(&mut reader).map_err(|e| e.reading(&path))?;
        let entries = read_table(&mut reader, &header, file_len).map_err(|e| e.reading(&path))?;

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            index.entry(entry.name.clone()).or_insert(i);
        }

        debug!(path = %path.display(), entries = entries.len(), "opened archive");

        Ok(Self {
            path,
            file: reader.into_inner(),
            header,
            entries,
            index,
        })
    }

    /// Read and validate only the header of an archive
    pub fn read_header<P: AsRef<Path>>(path: P) -> Result<ArchiveHeader> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        ArchiveHeader::read_from(BufReader::new(file)).map_err(|e| e.reading(path))
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Entries in table order
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Look up an entry by name (first match if names repeat)
    pub fn find(&self, name: &str) -> Option<&FileEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Read an entry's stored bytes without decoding them
    pub fn read_stored(&mut self, entry: &FileEntry) -> Result<Vec<u8>> {
        let len = entry.stored_size as usize;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| ArchiveError::OutOfMemory(len))?;
        data.resize(len, 0);

        self.file
            .seek(SeekFrom::Start(entry.offset as u64))
            .and_then(|_| self.file.read_exact(&mut data))
            .map_err(|source| ArchiveError::Read {
                path: self.path.clone(),
                source,
            })?;
        Ok(data)
    }

    /// Read an entry and run it back through the codec pipeline
    pub fn read_entry(&mut self, entry: &FileEntry, password: Option<&Password>) -> Result<Vec<u8>> {
        let stored = self.read_stored(entry)?;
        codec::decode(stored, entry, password)
    }

    /// Read and decode an entry by name
    pub fn read_file(&mut self, name: &str, password: Option<&Password>) -> Result<Vec<u8>> {
        let entry = self
            .find(name)
            .cloned()
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;
        self.read_entry(&entry, password)
    }
}

fn read_table<R: Read + Seek>(
    reader: &mut R,
    header: &ArchiveHeader,
    file_len: u64,
) -> Result<Vec<FileEntry>> {
    let data_start = header.data_offset();
    if data_start > file_len {
        return Err(ArchiveError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "entry table for {} entries ends at {}, file is {} bytes",
                header.file_count, data_start, file_len
            ),
        )));
    }

    reader.seek(SeekFrom::Start(header.table_offset()))?;

    // file_count is bounded by the length check above
    let capacity = (header.file_count as usize).min(file_len as usize / ENTRY_SIZE);
    let mut entries = Vec::with_capacity(capacity);

    for index in 0..header.file_count {
        let entry = FileEntry::read_from(&mut *reader)?;
        let start = entry.offset as u64;
        let end = start + entry.stored_size as u64;
        if start < data_start || end > file_len {
            return Err(ArchiveError::InvalidFormat(format!(
                "Entry {} ({}) data range {}..{} lies outside the data region {}..{}",
                index, entry.name, start, end, data_start, file_len
            )));
        }
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::format::{EntryFlags, HEADER_SIZE};
    use crate::archive::writer::{ArchiveWriter, EntryMetadata};
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn build(dir: &TempDir, password: Option<&Password>) -> PathBuf {
        let path = dir.path().join("test.arc");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        for (name, data) in [("a.txt", &b"alpha alpha alpha"[..]), ("b/c.txt", &b"charlie"[..])] {
            let encoded = codec::encode(data, 6, password).unwrap();
            writer.append(name, &encoded, EntryMetadata::default()).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_open_and_read() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir, None);

        let mut reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.entry_count(), 2);
        assert_eq!(reader.header().file_count, 2);
        assert!(reader.contains("b/c.txt"));
        assert_eq!(reader.read_file("a.txt", None).unwrap(), b"alpha alpha alpha");
        assert_eq!(reader.read_file("b/c.txt", None).unwrap(), b"charlie");

        let err = reader.read_file("missing", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_encrypted_entries() {
        let dir = TempDir::new().unwrap();
        let password = Password::new("pw");
        let path = build(&dir, Some(&password));

        let mut reader = ArchiveReader::open(&path).unwrap();
        let entry = reader.find("a.txt").cloned().unwrap();
        assert!(entry.flags.contains(EntryFlags::ENCRYPTED | EntryFlags::COMPRESSED));
        assert!(matches!(
            reader.read_entry(&entry, None),
            Err(ArchiveError::PasswordRequired)
        ));
        assert_eq!(
            reader.read_entry(&entry, Some(&password)).unwrap(),
            b"alpha alpha alpha"
        );
    }

    #[test]
    fn test_truncated_table() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir, None);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..HEADER_SIZE + ENTRY_SIZE + 10]).unwrap();

        let err = ArchiveReader::open(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadFailed);
    }

    #[test]
    fn test_truncated_data() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir, None);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();

        let err = ArchiveReader::open(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_huge_file_count_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("liar.arc");
        let mut header = ArchiveHeader::new();
        header.file_count = u32::MAX;
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        std::fs::write(&path, &bytes).unwrap();

        assert!(ArchiveReader::open(&path).is_err());
    }

    #[test]
    fn test_debug_output() {
        let dir = TempDir::new().unwrap();
        let path = build(&dir, None);

        let reader = ArchiveReader::open(&path).unwrap();
        let debug = format!("{:?}", reader);
        assert!(debug.starts_with("ArchiveReader"));
        assert!(debug.contains("test.arc"));
        assert!(debug.contains("entries: 2"));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ArchiveReader::open(dir.path().join("nope.arc")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OpenFailed);
    }
}
