//! Values returned by engine operations.

use crate::archive::{ArchiveHeader, FileEntry};
use std::fmt;
use std::path::PathBuf;

/// Outcome of create, add, remove and update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Inputs named by the caller (after expansion)
    pub requested: usize,
    /// Entries newly encoded from disk
    pub written: usize,
    /// Entries carried over verbatim from the previous archive
    pub copied: usize,
    pub removed: usize,
    /// Names that matched nothing in the archive
    pub skipped: usize,
    /// Inputs that failed and were left out
    pub failed: usize,
    pub file_count: u32,
    pub total_size: u32,
    pub archive_size: u32,
}

impl WriteSummary {
    pub(crate) fn new(requested: usize) -> Self {
        Self {
            requested,
            ..Self::default()
        }
    }

    pub(crate) fn record_header(&mut self, header: &ArchiveHeader) {
        self.file_count = header.file_count;
        self.total_size = header.total_size;
        self.archive_size = header.archive_size;
    }

    /// True if the archive file was rewritten
    pub fn changed(&self) -> bool {
        self.written > 0 || self.removed > 0
    }
}

/// Outcome of extract
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub total: usize,
    pub extracted: usize,
    pub failed: usize,
}

impl ExtractSummary {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Archive contents as returned by list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub archive: PathBuf,
    pub header: ArchiveHeader,
    pub entries: Vec<FileEntry>,
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = &self.header;
        writeln!(f, "Archive: {}", self.archive.display())?;
        writeln!(
            f,
            "Version: {}.{}",
            header.version_major(),
            header.version_minor()
        )?;
        writeln!(f, "Files: {}", header.file_count)?;
        writeln!(f, "Total size: {} bytes", header.total_size)?;
        writeln!(f, "Archive size: {} bytes", header.archive_size)?;
        writeln!(f, "Compression ratio: {:.2}%", header.compression_ratio())?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<40} {:>12} {:>12} {:<5}",
            "Name", "Size", "Stored", "Flags"
        )?;
        writeln!(f, "{}", "-".repeat(72))?;
        for entry in &self.entries {
            writeln!(
                f,
                "{:<40} {:>12} {:>12} {:<5}",
                entry.name,
                entry.file_size,
                entry.stored_size,
                entry.flags.letters()
            )?;
        }
        Ok(())
    }
}

/// Per-entry verification result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCheck {
    pub name: String,
    pub error: Option<String>,
}

/// Outcome of verify
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub checks: Vec<EntryCheck>,
}

impl VerifyReport {
    pub(crate) fn record(&mut self, name: &str, error: Option<String>) {
        self.checks.push(EntryCheck {
            name: name.to_string(),
            error,
        });
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn failed(&self) -> usize {
        self.checks.iter().filter(|c| c.error.is_some()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryCheck> {
        self.checks.iter().filter(|c| c.error.is_some())
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} entries verified",
            self.total() - self.failed(),
            self.total()
        )
    }
}
