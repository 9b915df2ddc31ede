//! Staged rewrites: add, remove and update.
//!
//! The original archive is opened read-only, a complete new archive is
//! built in a temporary file next to it (or in the configured staging
//! directory), and the temporary file is renamed over the original. The
//! rename is the only step that changes what is at the archive path.

use super::{prepare, store, write_inputs, Archiver, Engine, WriteSummary};
use crate::archive::{ArchiveHeader, ArchiveReader, ArchiveWriter, EntryFlags, FileEntry};
use crate::context::Context;
use crate::error::{ArchiveError, Result};
use crate::inputs::{self, entry_name_for, Input};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// A new archive being built in a temporary file
pub(super) struct Staged {
    archive: PathBuf,
    temp: NamedTempFile,
    writer: ArchiveWriter,
}

impl Staged {
    pub(super) fn begin(ctx: &Context, archive: &Path) -> Result<Self> {
        let dir = match ctx.staging_dir() {
            Some(dir) => dir.to_path_buf(),
            None => match archive.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix(".archpack-").suffix(".tmp");
        if let Some(permissions) = new_archive_permissions(archive) {
            builder.permissions(permissions);
        }
        let temp = builder
            .tempfile_in(&dir)
            .map_err(|source| ArchiveError::Open { path: dir, source })?;
        let file = temp.as_file().try_clone().map_err(|source| ArchiveError::Open {
            path: temp.path().to_path_buf(),
            source,
        })?;
        let writer = ArchiveWriter::from_file(file, temp.path())?;

        debug!(archive = %archive.display(), staged = %temp.path().display(), "staging archive");
        Ok(Self {
            archive: archive.to_path_buf(),
            temp,
            writer,
        })
    }

    pub(super) fn writer(&mut self) -> &mut ArchiveWriter {
        &mut self.writer
    }

    /// Finish the staged archive and rename it over the target
    pub(super) fn commit(self) -> Result<ArchiveHeader> {
        let Self {
            archive,
            temp,
            writer,
        } = self;

        let header = writer.finish()?;
        carry_permissions(&archive, temp.path());
        temp.persist(&archive).map_err(|e| ArchiveError::Write {
            path: archive.clone(),
            source: e.error,
        })?;

        debug!(archive = %archive.display(), "committed staged archive");
        Ok(header)
    }
}

/// Temporary files are created 0600; give a rewritten archive the original's mode
fn carry_permissions(archive: &Path, staged: &Path) {
    let permissions = match fs::metadata(archive) {
        Ok(meta) => meta.permissions(),
        Err(_) => return,
    };
    if let Err(err) = fs::set_permissions(staged, permissions) {
        warn!(path = %staged.display(), error = %err, "cannot set archive permissions");
    }
}

/// A brand new archive is created 0666 minus the umask, like `File::create`
#[cfg(unix)]
fn new_archive_permissions(archive: &Path) -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    if archive.exists() {
        return None;
    }
    Some(fs::Permissions::from_mode(0o666))
}

#[cfg(not(unix))]
fn new_archive_permissions(_archive: &Path) -> Option<fs::Permissions> {
    None
}

fn copy_verbatim(
    original: &mut ArchiveReader,
    writer: &mut ArchiveWriter,
    entry: &FileEntry,
) -> Result<()> {
    let stored = original.read_stored(entry)?;
    writer.copy_entry(entry, &stored)?;
    debug!(name = %entry.name, "copied entry");
    Ok(())
}

/// Commit only if entries were dropped or re-encoded
fn finish(staged: Staged, original: ArchiveReader, summary: &mut WriteSummary) -> Result<()> {
    if summary.changed() {
        drop(original);
        let header = staged.commit()?;
        summary.record_header(&header);
    } else {
        summary.record_header(original.header());
    }
    Ok(())
}

/// Entry names for the paths given to remove/update
fn target_names(files: &[PathBuf]) -> Result<Vec<(String, &PathBuf)>> {
    if files.is_empty() {
        return Err(ArchiveError::InvalidArgument("No files given".to_string()));
    }
    files
        .iter()
        .map(|path| Ok((entry_name_for(path)?, path)))
        .collect()
}

fn report_unmatched<'a>(
    ctx: &Context,
    names: impl Iterator<Item = &'a str>,
    matched: &HashSet<String>,
    summary: &mut WriteSummary,
) {
    for name in names {
        if !matched.contains(name) {
            summary.skipped += 1;
            ctx.report_error(&format!("{}: not found in archive", name));
        }
    }
}

pub(super) fn add(
    engine: &Engine,
    ctx: &Context,
    archive: &Path,
    files: &[PathBuf],
) -> Result<WriteSummary> {
    if !archive.exists() {
        info!(archive = %archive.display(), "archive does not exist, creating it");
        return engine.create(ctx, archive, files);
    }
    if files.is_empty() {
        return Err(ArchiveError::InvalidArgument("No input files given".to_string()));
    }

    let inputs = inputs::collect(ctx, files)?;
    let mut original = ArchiveReader::open(archive)?;
    let mut staged = Staged::begin(ctx, archive)?;

    let existing = original.entries().to_vec();
    let total = existing.len() + inputs.len();
    let mut summary = WriteSummary::new(inputs.len());

    for (i, entry) in existing.iter().enumerate() {
        ctx.report_progress(i, total, &entry.name);
        copy_verbatim(&mut original, staged.writer(), entry)?;
        summary.copied += 1;
    }
    write_inputs(ctx, staged.writer(), &inputs, &mut summary, existing.len(), total)?;

    if summary.written == 0 {
        return Err(ArchiveError::NothingWritten(archive.to_path_buf()));
    }

    drop(original);
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
        added = summary.written,
        files = header.file_count,
        "added to archive"
    );
    Ok(summary)
}

pub(super) fn remove(ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary> {
    let targets = target_names(files)?;
    let names: HashSet<&str> = targets.iter().map(|(name, _)| name.as_str()).collect();

    let mut original = ArchiveReader::open(archive)?;
    let mut staged = Staged::begin(ctx, archive)?;

    let entries = original.entries().to_vec();
    let mut summary = WriteSummary::new(targets.len());
    let mut matched = HashSet::new();

    for (i, entry) in entries.iter().enumerate() {
        ctx.report_progress(i, entries.len(), &entry.name);
        if names.contains(entry.name.as_str()) {
            debug!(name = %entry.name, "removed entry");
            matched.insert(entry.name.clone());
            summary.removed += 1;
            continue;
        }
        copy_verbatim(&mut original, staged.writer(), entry)?;
        summary.copied += 1;
    }

    report_unmatched(ctx, targets.iter().map(|(name, _)| name.as_str()), &matched, &mut summary);

    finish(staged, original, &mut summary)?;
    ctx.reporter().progress(100, "done");

    info!(archive = %archive.display(), removed = summary.removed, "removed from archive");
    Ok(summary)
}

pub(super) fn update(ctx: &Context, archive: &Path, files: &[PathBuf]) -> Result<WriteSummary> {
    let targets = target_names(files)?;
    let sources: HashMap<&str, &PathBuf> = targets
        .iter()
        .map(|(name, path)| (name.as_str(), *path))
        .collect();

    let mut original = ArchiveReader::open(archive)?;
    let mut staged = Staged::begin(ctx, archive)?;

    let entries = original.entries().to_vec();
    let mut summary = WriteSummary::new(targets.len());
    let mut matched = HashSet::new();

    for (i, entry) in entries.iter().enumerate() {
        ctx.report_progress(i, entries.len(), &entry.name);

        let source = match sources.get(entry.name.as_str()) {
            Some(source) => source,
            None => {
                copy_verbatim(&mut original, staged.writer(), entry)?;
                summary.copied += 1;
                continue;
            }
        };
        matched.insert(entry.name.clone());

        // Directories carry no data to re-encode
        if entry.is_dir() {
            debug!(name = %entry.name, "directory entry, nothing to update");
            copy_verbatim(&mut original, staged.writer(), entry)?;
            summary.copied += 1;
            continue;
        }

        match prepare(ctx, &Input::file(source.as_path()), staged.writer()) {
            Ok(mut prepared) => {
                if let Some(encoded) = prepared.encoded.as_mut() {
                    encoded.flags.insert(EntryFlags::MODIFIED);
                }
                store(staged.writer(), &prepared)?;
                summary.written += 1;
                debug!(name = %entry.name, "updated entry");
            }
            Err(err) => {
                ctx.report_error(&format!(
                    "Failed to update {}: {}; keeping archived copy",
                    entry.name, err
                ));
                summary.failed += 1;
                copy_verbatim(&mut original, staged.writer(), entry)?;
                summary.copied += 1;
            }
        }
    }

    report_unmatched(ctx, targets.iter().map(|(name, _)| name.as_str()), &matched, &mut summary);

    finish(staged, original, &mut summary)?;
    ctx.reporter().progress(100, "done");

    info!(archive = %archive.display(), updated = summary.written, "updated archive");
    Ok(summary)
}
