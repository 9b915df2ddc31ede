#![no_main]

use archpack::{ArchiveReader, Password};
use libfuzzer_sys::fuzz_target;
use std::io::Write;
use tempfile::NamedTempFile;

fuzz_target!(|data: &[u8]| {
    let mut temp_file = match NamedTempFile::new() {
        Ok(f) => f,
        Err(_) => return,
    };
    if temp_file.write_all(data).is_err() || temp_file.flush().is_err() {
        return;
    }

    // Opening validates header and table; must never panic
    let mut reader = match ArchiveReader::open(temp_file.path()) {
        Ok(r) => r,
        Err(_) => return,
    };

    let password = Password::new("fuzz");
    let entries = reader.entries().to_vec();
    for entry in &entries {
        // Bound allocations
        if entry.file_size > 16 * 1024 * 1024 {
            continue;
        }
        let _ = reader.read_entry(entry, None);
        let _ = reader.read_entry(entry, Some(&password));
        let _ = reader.find(&entry.name);
    }

    let _ = reader.entry_count();
    let _ = reader.contains("");
    let _ = reader.contains("../../../etc/passwd");
});
