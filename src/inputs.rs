//! Expansion of user-supplied paths into archive inputs.

use crate::archive::normalize_name;
use crate::context::Context;
use crate::error::{ArchiveError, Result};
use glob::Pattern;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    File,
    Directory,
}

/// One filesystem object to be stored as an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub source: PathBuf,
    pub kind: InputKind,
}

impl Input {
    pub fn file<P: Into<PathBuf>>(source: P) -> Self {
        Self {
            source: source.into(),
            kind: InputKind::File,
        }
    }

    pub fn directory<P: Into<PathBuf>>(source: P) -> Self {
        Self {
            source: source.into(),
            kind: InputKind::Directory,
        }
    }

    /// The normalized name this input is stored under
    pub fn entry_name(&self) -> Result<String> {
        entry_name_for(&self.source)
    }
}

/// Normalized entry name for a filesystem path
pub fn entry_name_for(path: &Path) -> Result<String> {
    let text = path.to_str().ok_or_else(|| {
        ArchiveError::PathError(format!("Path is not valid UTF-8: {}", path.display()))
    })?;
    normalize_name(text)
}

struct Excludes(Vec<Pattern>);

impl Excludes {
    fn new(patterns: &[String]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self(compiled))
    }

    /// Match against the normalized name and its final component
    fn matches(&self, path: &Path) -> bool {
        if self.0.is_empty() {
            return false;
        }
        let text = path.to_string_lossy();
        let name = normalize_name(&text).unwrap_or_else(|_| text.replace('\\', "/"));
        let last = name.rsplit('/').next().unwrap_or(&name);
        self.0.iter().any(|p| p.matches(&name) || p.matches(last))
    }
}

/// Expand `paths` into inputs, in argument order.
///
/// Every path must exist. Directories are only accepted when the context is
/// recursive; they are walked in file-name order and contribute a directory
/// entry for themselves and each subdirectory. Symlinks are followed.
pub fn collect(ctx: &Context, paths: &[PathBuf]) -> Result<Vec<Input>> {
    let excludes = Excludes::new(ctx.exclude())?;
    let mut inputs = Vec::with_capacity(paths.len());

    for path in paths {
        let meta = fs::metadata(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ArchiveError::NotFound(path.clone()),
            _ => ArchiveError::Read {
                path: path.clone(),
                source,
            },
        })?;

        if excludes.matches(path) {
            debug!(path = %path.display(), "excluded");
            continue;
        }

        if meta.is_dir() {
            if !ctx.recursive() {
                return Err(ArchiveError::InvalidArgument(format!(
                    "{} is a directory (enable recursive mode to include it)",
                    path.display()
                )));
            }
            walk(path, &excludes, &mut inputs)?;
        } else if meta.is_file() {
            inputs.push(Input::file(path.clone()));
        } else {
            warn!(path = %path.display(), "skipping special file");
        }
    }

    Ok(inputs)
}

fn walk(root: &Path, excludes: &Excludes, inputs: &mut Vec<Input>) -> Result<()> {
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !excludes.matches(e.path()));

    for entry in walker {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            ArchiveError::Read {
                path,
                source: io::Error::from(err),
            }
        })?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            inputs.push(Input::directory(entry.into_path()));
        } else if file_type.is_file() {
            inputs.push(Input::file(entry.into_path()));
        } else {
            warn!(path = %entry.path().display(), "skipping special file");
        }
    }
    Ok(())
}
