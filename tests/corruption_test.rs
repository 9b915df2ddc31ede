//! Corruption Detection Suite
//!
//! Damaged archives must be rejected or reported, never trusted and never
//! a panic.

use archpack::{
    Archiver, ArchiveError, ArchiveReader, Context, Engine, ErrorKind, Reporter, HEADER_SIZE,
};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::{NamedTempFile, TempDir};

#[derive(Default)]
struct Outcomes {
    ok: Mutex<Vec<String>>,
    crc_mismatches: Mutex<Vec<String>>,
    other: Mutex<Vec<String>>,
}

impl Reporter for Outcomes {
    fn verified(&self, name: &str, outcome: Result<(), &ArchiveError>) {
        match outcome {
            Ok(()) => self.ok.lock().unwrap().push(name.to_string()),
            Err(ArchiveError::CrcMismatch { .. }) => {
                self.crc_mismatches.lock().unwrap().push(name.to_string())
            }
            Err(_) => self.other.lock().unwrap().push(name.to_string()),
        }
    }
}

/// Helper: Create a valid three-entry archive, stored uncompressed
fn create_test_archive(dir: &TempDir) -> PathBuf {
    let mut files = Vec::new();
    for (name, data) in [
        ("one.txt", b"Hello, World!".to_vec()),
        ("two.bin", vec![0xAB; 1024]),
        ("three.txt", b"last entry".to_vec()),
    ] {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        files.push(path);
    }

    let archive = dir.path().join("test.arc");
    let ctx = Context::new().with_compression_level(0).unwrap();
    Engine::new().create(&ctx, &archive, &files).unwrap();
    archive
}

/// Helper: Corrupt bytes at specific offset
fn corrupt_byte_at(path: &Path, offset: u64, new_value: u8) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&[new_value]).unwrap();
}

/// Helper: Truncate file at specific offset
fn truncate_at(path: &Path, new_length: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(new_length).unwrap();
}

#[test]
fn test_single_flipped_byte_is_one_crc_mismatch() {
    let dir = TempDir::new().unwrap();
    let archive = create_test_archive(&dir);

    let entry = ArchiveReader::open(&archive).unwrap().entries()[1].clone();
    let offset = entry.offset as u64 + 100;
    corrupt_byte_at(&archive, offset, 0x00);

    let outcomes = Arc::new(Outcomes::default());
    let ctx = Context::new().with_reporter(outcomes.clone());
    let result = Engine::new().verify(&ctx, &archive);

    match result {
        Err(ArchiveError::Corrupted { failed, total }) => {
            assert_eq!(failed, 1);
            assert_eq!(total, 3);
        }
        other => panic!("Expected Corrupted, got: {:?}", other),
    }

    // Remaining entries were still checked
    assert_eq!(*outcomes.crc_mismatches.lock().unwrap(), vec![entry.name.clone()]);
    assert_eq!(outcomes.ok.lock().unwrap().len(), 2);
    assert!(outcomes.other.lock().unwrap().is_empty());

    println!("✓ Tampering detected in exactly one entry");
}

#[test]
fn test_flipped_byte_fails_only_that_extract() {
    let dir = TempDir::new().unwrap();
    let archive = create_test_archive(&dir);
    let entry = ArchiveReader::open(&archive).unwrap().entries()[0].clone();
    corrupt_byte_at(&archive, entry.offset as u64, b'J');

    let dest = dir.path().join("out");
    let summary = Engine::new()
        .extract(&Context::new(), &archive, &dest)
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.extracted, 2);
}

#[test]
fn test_clean_archive_verifies() {
    let dir = TempDir::new().unwrap();
    let archive = create_test_archive(&dir);
    let report = Engine::new().verify(&Context::new(), &archive).unwrap();
    assert_eq!(report.total(), 3);
    assert_eq!(report.failed(), 0);
}

#[test]
fn test_corrupted_magic_number() {
    let dir = TempDir::new().unwrap();
    let archive = create_test_archive(&dir);
    corrupt_byte_at(&archive, 0, 0xFF);

    match ArchiveReader::open(&archive) {
        Err(ArchiveError::InvalidMagic) => {}
        Err(other) => panic!("Expected InvalidMagic, got: {:?}", other),
        Ok(_) => panic!("Expected InvalidMagic, archive opened"),
    }

    let err = Engine::new().test(&Context::new(), &archive).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
}

#[test]
fn test_unsupported_major_version() {
    let dir = TempDir::new().unwrap();
    let archive = create_test_archive(&dir);
    // Version is a little-endian u16 at offset 4; the major byte is offset 5
    corrupt_byte_at(&archive, 5, 99);

    match ArchiveReader::open(&archive) {
        Err(ArchiveError::UnsupportedVersion(v)) => assert_eq!(v >> 8, 99),
        Err(other) => panic!("Expected UnsupportedVersion, got: {:?}", other),
        Ok(_) => panic!("Expected UnsupportedVersion, archive opened"),
    }
}

#[test]
fn test_truncated_header() {
    let dir = TempDir::new().unwrap();
    let archive = create_test_archive(&dir);
    truncate_at(&archive, HEADER_SIZE as u64 - 10);

    let err = ArchiveReader::open(&archive).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ReadFailed);
    let err = Engine::new().test(&Context::new(), &archive).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadFailed);
}

#[test]
fn test_truncated_entry_table() {
    let dir = TempDir::new().unwrap();
    let archive = create_test_archive(&dir);
    truncate_at(&archive, HEADER_SIZE as u64 + 100);

    let err = Engine::new().list(&Context::new(), &archive).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadFailed);
}

#[test]
fn test_truncated_data_region() {
    let dir = TempDir::new().unwrap();
    let archive = create_test_archive(&dir);
    let len = fs::metadata(&archive).unwrap().len();
    truncate_at(&archive, len - 1);

    let err = Engine::new().verify(&Context::new(), &archive).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
}

#[test]
fn test_empty_and_garbage_files() {
    let empty = NamedTempFile::new().unwrap();
    assert!(ArchiveReader::open(empty.path()).is_err());

    let mut garbage = NamedTempFile::new().unwrap();
    garbage.write_all(&[0x5A; 4096]).unwrap();
    garbage.flush().unwrap();
    let err = ArchiveReader::open(garbage.path()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
}

#[test]
fn test_entry_offset_outside_file() {
    let dir = TempDir::new().unwrap();
    let archive = create_test_archive(&dir);
    // Offset field of the first entry: name(256) + file_size(4) + stored_size(4)
    let offset_field = HEADER_SIZE as u64 + 264;
    for (i, byte) in 0xFFFF_FF00u32.to_le_bytes().iter().enumerate() {
        corrupt_byte_at(&archive, offset_field + i as u64, *byte);
    }

    let err = ArchiveReader::open(&archive).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
}
