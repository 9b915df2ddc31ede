//! Per-invocation configuration threaded through every engine call.
//!
//! A [`Context`] carries the compression level, the optional password, input
//! collection settings, and the [`Reporter`] that receives progress and
//! error notifications. There is no process-wide state: two contexts can
//! drive two engines independently.

use crate::codec::compression::{DEFAULT_LEVEL, MAX_LEVEL};
use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

/// An archive password, wiped from memory when dropped
#[derive(Clone)]
pub struct Password {
    inner: Zeroizing<String>,
}

impl Password {
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self {
            inner: Zeroizing::new(password.into()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Receives notifications while an operation runs.
///
/// Callbacks are invoked inline and must return promptly. Within one
/// operation `progress` percentages never decrease.
pub trait Reporter: Send + Sync {
    /// Progress in percent (0-100) with a label, usually the entry name
    fn progress(&self, percent: u8, label: &str) {
        trace!(percent, label, "progress");
    }

    /// A recovered failure the operation continued past
    fn error(&self, message: &str) {
        warn!("{}", message);
    }

    /// Outcome of checking one entry during verify
    fn verified(&self, name: &str, outcome: std::result::Result<(), &ArchiveError>) {
        match outcome {
            Ok(()) => debug!(name, "verified"),
            Err(err) => warn!(name, error = %err, "verification failed"),
        }
    }
}

/// Reporter that only emits `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {}

/// Settings loadable from a TOML file.
///
/// ```toml
/// compression_level = 9
/// recursive = true
/// exclude = ["*.tmp", ".git"]
/// staging_dir = "/var/tmp"
/// ```
///
/// Passwords are never read from config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub compression_level: u32,
    pub recursive: bool,
    pub exclude: Vec<String>,
    pub staging_dir: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_LEVEL,
            recursive: false,
            exclude: Vec::new(),
            staging_dir: None,
        }
    }
}

impl ArchiveConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ArchiveError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

/// Configuration for one archive invocation
#[derive(Clone)]
pub struct Context {
    compression_level: u32,
    password: Option<Password>,
    recursive: bool,
    exclude: Vec<String>,
    staging_dir: Option<PathBuf>,
    reporter: Arc<dyn Reporter>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            compression_level: DEFAULT_LEVEL,
            password: None,
            recursive: false,
            exclude: Vec::new(),
            staging_dir: None,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Build a context from loaded settings
    pub fn from_config(config: &ArchiveConfig) -> Result<Self> {
        let mut ctx = Self::new()
            .with_compression_level(config.compression_level)?
            .with_recursive(config.recursive)
            .with_exclude(config.exclude.iter().cloned());
        ctx.staging_dir = config.staging_dir.clone();
        Ok(ctx)
    }

    /// Build a context from a TOML config file
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_config(&ArchiveConfig::load(path)?)
    }

    /// Set the compression level (0 stores, 9 is smallest)
    pub fn with_compression_level(mut self, level: u32) -> Result<Self> {
        if level > MAX_LEVEL {
            return Err(ArchiveError::InvalidArgument(format!(
                "Compression level must be between 0 and {}, got {}",
                MAX_LEVEL, level
            )));
        }
        self.compression_level = level;
        Ok(self)
    }

    /// Encrypt new entries and decrypt existing ones with `password`
    pub fn with_password<P: Into<Password>>(mut self, password: P) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Add glob patterns for inputs to skip
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Directory for temporary archives; defaults to the archive's own directory
    pub fn with_staging_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// The password, if one is set and non-empty
    pub fn password(&self) -> Option<&Password> {
        self.password.as_ref().filter(|p| !p.is_empty())
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    /// Report progress for item `index` of `count`
    pub(crate) fn report_progress(&self, index: usize, count: usize, label: &str) {
        let percent = if count == 0 {
            100
        } else {
            (index.min(count) * 100 / count) as u8
        };
        self.reporter.progress(percent, label);
    }

    pub(crate) fn report_error(&self, message: &str) {
        self.reporter.error(message);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("compression_level", &self.compression_level)
            .field("password", &self.password)
            .field("recursive", &self.recursive)
            .field("exclude", &self.exclude)
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}
