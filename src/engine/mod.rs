//! Archive operations.
//!
//! [`Archiver`] is the capability surface: eight operations, each taking a
//! [`Context`] and an archive path. [`Engine`] implements them on top of
//! [`ArchiveReader`], [`ArchiveWriter`] and the codec pipeline.
//!
//! Every operation that writes an archive builds it in a staged temporary
//! file and renames it over the target only once it is complete, so a
//! failure at any earlier point leaves the previous archive untouched.

mod report;
mod rewrite;

pub use report::{EntryCheck, ExtractSummary, Listing, VerifyReport, WriteSummary};

use crate::archive::{normalize_name, ArchiveHeader, ArchiveReader, ArchiveWriter, EntryMetadata, FileEntry};
use crate::codec::{self, EncodedEntry};
use crate::context::Context;
use crate::error::{ArchiveError, Result};
use crate::inputs::{self, Input, InputKind};
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The eight archive operations
pub trait Archiver {
    /// Build a new archive from `files`, replacing any existing file at `archive`
    fn create(&self, ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary>;

    /// Extract every entry into `dest`
    fn extract(&self, ctx: &Context, archive: &Path, dest: &Path) -> Result<ExtractSummary>;

    fn list(&self, ctx: &Context, archive: &Path) -> Result<Listing>;

    /// Append `files`; creates the archive if it does not exist
    fn add(&self, ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary>;

    /// Drop the entries named by `files`
    fn remove(&self, ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary>;

    /// Re-encode the entries named by `files` from their current contents on disk
    fn update(&self, ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary>;

    /// Decode every entry and check its CRC without writing anything
    fn verify(&self, ctx: &Context, archive: &Path) -> Result<VerifyReport>;

    /// Check magic and version only
    fn test(&self, ctx: &Context, archive: &Path) -> Result<ArchiveHeader>;
}

/// Archive engine
#[derive(Debug, Default, Clone, Copy)]
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Self
    }
}

impl Archiver for Engine {
    fn create(&self, ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary> {
        if files.is_empty() {
            return Err(ArchiveError::InvalidArgument("No input files given".to_string()));
        }

        // Every input must exist before anything is written
        let inputs = inputs::collect(ctx, files)?;

        let mut staged = rewrite::Staged::begin(ctx, archive)?;
        let mut summary = WriteSummary::new(inputs.len());
        write_inputs(ctx, staged.writer(), &inputs, &mut summary, 0, inputs.len())?;

        if summary.written == 0 {
            return Err(ArchiveError::NothingWritten(archive.to_path_buf()));
        }

        let header = staged.commit()?;
        summary.record_header(&header);

        if summary.written < summary.requested {
            ctx.report_error(&format!(
                "only {} of {} files were archived",
                summary.written, summary.requested
            ));
        }
        ctx.reporter().progress(100, "done");

        info!(
            archive = %archive.display(),
            files = header.file_count,
            size = header.archive_size,
            "created archive"
        );
        Ok(summary)
    }

    fn extract(&self, ctx: &Context, archive: &Path, dest: &Path) -> Result<ExtractSummary> {
        let mut reader = ArchiveReader::open(archive)?;
        fs::create_dir_all(dest).map_err(|source| ArchiveError::Write {
            path: dest.to_path_buf(),
            source,
        })?;

        let entries = reader.entries().to_vec();
        let mut summary = ExtractSummary {
            total: entries.len(),
            ..ExtractSummary::default()
        };
        let mut directories = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            ctx.report_progress(i, entries.len(), &entry.name);
            match extract_entry(ctx, &mut reader, entry, dest) {
                Ok(target) => {
                    summary.extracted += 1;
                    if entry.is_dir() {
                        directories.push((target, entry));
                    }
                }
                Err(err) => {
                    summary.failed += 1;
                    ctx.report_error(&format!("Failed to extract {}: {}", entry.name, err));
                }
            }
        }

        // Writing files bumps directory times, so directories go last, deepest first
        for (target, entry) in directories.iter().rev() {
            restore_metadata(target, entry);
        }
        ctx.reporter().progress(100, "done");

        info!(
            archive = %archive.display(),
            extracted = summary.extracted,
            failed = summary.failed,
            "extracted archive"
        );
        Ok(summary)
    }

    fn list(&self, _ctx: &Context, archive: &Path) -> Result<Listing> {
        let reader = ArchiveReader::open(archive)?;
        Ok(Listing {
            archive: archive.to_path_buf(),
            header: reader.header().clone(),
            entries: reader.entries().to_vec(),
        })
    }

    fn add(&self, ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary> {
        rewrite::add(self, ctx, archive, files)
    }

    fn remove(&self, ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary> {
        rewrite::remove(ctx, archive, files)
    }

    fn update(&self, ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary> {
        rewrite::update(ctx, archive, files)
    }

    fn verify(&self, ctx: &Context, archive: &Path) -> Result<VerifyReport> {
        let mut reader = ArchiveReader::open(archive)?;
        let entries = reader.entries().to_vec();
        let mut report = VerifyReport::default();

        for (i, entry) in entries.iter().enumerate() {
            ctx.report_progress(i, entries.len(), &entry.name);
            let outcome = if entry.is_dir() {
                Ok(())
            } else {
                reader.read_entry(entry, ctx.password()).map(|_| ())
            };
            ctx.reporter().verified(&entry.name, outcome.as_ref().map(|_| ()));
            report.record(&entry.name, outcome.err().map(|e| e.to_string()));
        }
        ctx.reporter().progress(100, "done");

        let failed = report.failed();
        if failed > 0 {
            warn!(archive = %archive.display(), failed, "verification failed");
            return Err(ArchiveError::Corrupted {
                failed,
                total: report.total(),
            });
        }

        info!(archive = %archive.display(), entries = report.total(), "verified archive");
        Ok(report)
    }

    fn test(&self, _ctx: &Context, archive: &Path) -> Result<ArchiveHeader> {
        ArchiveReader::read_header(archive)
    }
}

/// An input that has been read and encoded, ready to append
struct PreparedEntry {
    name: String,
    meta: EntryMetadata,
    /// `None` for directories
    encoded: Option<EncodedEntry>,
}

impl PreparedEntry {
    fn original_size(&self) -> usize {
        self.encoded.as_ref().map_or(0, |e| e.original_size)
    }

    fn stored_size(&self) -> usize {
        self.encoded.as_ref().map_or(0, EncodedEntry::stored_size)
    }
}

/// Read and encode one input. Failures here only affect this input.
fn prepare(ctx: &Context, input: &Input, writer: &ArchiveWriter) -> Result<PreparedEntry> {
    let name = input.entry_name()?;
    let read_error = |source: io::Error| ArchiveError::Read {
        path: input.source.clone(),
        source,
    };

    let meta = fs::metadata(&input.source).map_err(read_error)?;
    let encoded = match input.kind {
        InputKind::Directory => None,
        InputKind::File => {
            if meta.len() > u32::MAX as u64 {
                return Err(ArchiveError::InvalidArgument(format!(
                    "{} is {} bytes, larger than an entry can hold",
                    input.source.display(),
                    meta.len()
                )));
            }
            let raw = fs::read(&input.source).map_err(read_error)?;
            Some(codec::encode(&raw, ctx.compression_level(), ctx.password())?)
        }
    };

    let prepared = PreparedEntry {
        name,
        meta: EntryMetadata::from_metadata(&meta),
        encoded,
    };
    writer.check_capacity(prepared.original_size(), prepared.stored_size())?;
    Ok(prepared)
}

/// Append a prepared entry. Errors here are fatal for the whole archive.
fn store(writer: &mut ArchiveWriter, prepared: &PreparedEntry) -> Result<()> {
    match &prepared.encoded {
        Some(encoded) => writer.append(&prepared.name, encoded, prepared.meta)?,
        None => writer.append_directory(&prepared.name, prepared.meta)?,
    };
    Ok(())
}

/// Encode and append `inputs`, reporting progress as items `done..total`
fn write_inputs(
    ctx: &Context,
    writer: &mut ArchiveWriter,
    inputs: &[Input],
    summary: &mut WriteSummary,
    done: usize,
    total: usize,
) -> Result<()> {
    for (i, input) in inputs.iter().enumerate() {
        let label = input.source.display().to_string();
        ctx.report_progress(done + i, total, &label);

        match prepare(ctx, input, writer) {
            Ok(prepared) => {
                store(writer, &prepared)?;
                summary.written += 1;
            }
            Err(err) => {
                summary.failed += 1;
                ctx.report_error(&format!("Failed to add {}: {}", label, err));
            }
        }
    }
    Ok(())
}

/// Extract one entry, returning the path it was written to
fn extract_entry(
    ctx: &Context,
    reader: &mut ArchiveReader,
    entry: &FileEntry,
    dest: &Path,
) -> Result<PathBuf> {
    let target = output_path(dest, &entry.name)?;
    let write_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| ArchiveError::Write { path, source }
    };

    if entry.is_dir() {
        fs::create_dir_all(&target).map_err(write_error(&target))?;
        return Ok(target);
    }

    // Decode fully before touching the filesystem
    let data = reader.read_entry(entry, ctx.password())?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(write_error(parent))?;
    }
    fs::write(&target, &data).map_err(write_error(&target))?;
    restore_metadata(&target, entry);

    debug!(name = %entry.name, size = data.len(), "extracted entry");
    Ok(target)
}

/// Join an entry name onto `dest`, refusing names that would escape it
fn output_path(dest: &Path, name: &str) -> Result<PathBuf> {
    let normalized = normalize_name(name)?;
    Ok(normalized
        .split('/')
        .fold(dest.to_path_buf(), |path, part| path.join(part)))
}

/// Best effort: a failure is logged, the extracted data stays
fn restore_metadata(path: &Path, entry: &FileEntry) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = u32::from(entry.mode) & 0o777;
        if mode != 0 {
            if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
                warn!(path = %path.display(), error = %err, "cannot restore permissions");
            }
        }
    }

    let mtime = FileTime::from_unix_time(entry.mtime, 0);
    let atime = FileTime::from_unix_time(entry.atime, 0);
    if let Err(err) = filetime::set_file_times(path, atime, mtime) {
        warn!(path = %path.display(), error = %err, "cannot restore file times");
    }
}
