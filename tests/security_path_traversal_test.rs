//! Path Traversal Prevention Tests
//!
//! Entry names are normalized on the way in, and names that would escape
//! the destination are refused on the way out.

use archpack::{
    codec, normalize_name, Archiver, ArchiveWriter, Context, Engine, EntryMetadata, ErrorKind,
    MAX_NAME_LENGTH,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_name_normalization() {
    println!("\n🔒 Testing entry name normalization");

    assert_eq!(normalize_name("a\\b\\c.txt").unwrap(), "a/b/c.txt");
    assert_eq!(normalize_name("/etc/passwd").unwrap(), "etc/passwd");
    assert_eq!(normalize_name("./docs//readme.md").unwrap(), "docs/readme.md");
    assert_eq!(normalize_name("dir/./file").unwrap(), "dir/file");

    for bad in ["../../etc/passwd", "a/../../b", "..", "", "/", "./"] {
        let err = normalize_name(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{:?}", bad);
    }
    println!("  ✅ Traversal and empty names rejected");
}

#[test]
fn test_name_length_limit() {
    let exact = "a".repeat(MAX_NAME_LENGTH);
    assert_eq!(normalize_name(&exact).unwrap(), exact);

    let over = "a".repeat(MAX_NAME_LENGTH + 1);
    assert_eq!(
        normalize_name(&over).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn test_extract_refuses_escaping_entries() {
    println!("\n🔒 Testing extraction of a hostile archive");

    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("hostile.arc");

    // Built with the low-level writer, which stores names as given
    let mut writer = ArchiveWriter::create(&archive).unwrap();
    for (name, data) in [
        ("../escaped.txt", &b"malicious"[..]),
        ("safe/inner.txt", &b"fine"[..]),
        ("nested/../../also_escaped.txt", &b"malicious"[..]),
    ] {
        let encoded = codec::encode(data, 6, None).unwrap();
        writer.append(name, &encoded, EntryMetadata::default()).unwrap();
    }
    writer.finish().unwrap();

    let dest = dir.path().join("dest");
    let summary = Engine::new()
        .extract(&Context::new(), &archive, &dest)
        .unwrap();

    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(fs::read(dest.join("safe").join("inner.txt")).unwrap(), b"fine");
    assert!(!dir.path().join("escaped.txt").exists());
    assert!(!dir.path().join("also_escaped.txt").exists());

    println!("  ✅ Escaping entries skipped, safe entry extracted");
}

#[test]
fn test_absolute_entry_lands_inside_destination() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("absolute.arc");

    let mut writer = ArchiveWriter::create(&archive).unwrap();
    let encoded = codec::encode(b"contained", 0, None).unwrap();
    writer
        .append("/abs/file.txt", &encoded, EntryMetadata::default())
        .unwrap();
    writer.finish().unwrap();

    let dest = dir.path().join("dest");
    Engine::new()
        .extract(&Context::new(), &archive, &dest)
        .unwrap();
    assert_eq!(
        fs::read(dest.join("abs").join("file.txt")).unwrap(),
        b"contained"
    );
}
