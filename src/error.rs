use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Coarse classification of an [`ArchiveError`].
///
/// Every error maps onto exactly one kind, so callers can branch on the
/// failure class without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OpenFailed,
    ReadFailed,
    WriteFailed,
    OutOfMemory,
    InvalidArgument,
    NotFound,
    CompressionFailed,
    EncryptionFailed,
    Corrupted,
    PasswordRequired,
    DecryptionFailed,
    DecompressionFailed,
    InvalidFormat,
}

/// Unified error type for all archive operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    // I/O errors
    #[error("Failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot allocate {0} bytes")]
    OutOfMemory(usize),

    // Argument errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),

    #[error("No files were written to {}", .0.display())]
    NothingWritten(PathBuf),

    // Format errors
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    #[error("Invalid magic number in archive header")]
    InvalidMagic,

    #[error("Unsupported archive version: {}.{}", .0 >> 8, .0 & 0xFF)]
    UnsupportedVersion(u16),

    // Pipeline errors
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed (wrong password or damaged data)")]
    DecryptionFailed,

    #[error("Entry is encrypted, password required")]
    PasswordRequired,

    #[error("CRC mismatch: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("Archive is corrupted: {failed} of {total} entries failed verification")]
    Corrupted { failed: usize, total: usize },
}

impl ArchiveError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open { .. } => ErrorKind::OpenFailed,
            Self::Read { .. } | Self::Io(_) => ErrorKind::ReadFailed,
            Self::Write { .. } | Self::NothingWritten(_) => ErrorKind::WriteFailed,
            Self::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Self::InvalidArgument(_) | Self::PathError(_) | Self::Config(_) => {
                ErrorKind::InvalidArgument
            }
            Self::NotFound(_) | Self::EntryNotFound(_) => ErrorKind::NotFound,
            Self::InvalidFormat(_) | Self::InvalidMagic | Self::UnsupportedVersion(_) => {
                ErrorKind::InvalidFormat
            }
            Self::CompressionFailed(_) => ErrorKind::CompressionFailed,
            Self::DecompressionFailed(_) => ErrorKind::DecompressionFailed,
            Self::EncryptionFailed => ErrorKind::EncryptionFailed,
            Self::DecryptionFailed => ErrorKind::DecryptionFailed,
            Self::PasswordRequired => ErrorKind::PasswordRequired,
            Self::CrcMismatch { .. } | Self::Corrupted { .. } => ErrorKind::Corrupted,
        }
    }

    /// Attach a path to a bare I/O error raised while reading `path`
    pub(crate) fn reading(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Io(source) => Self::Read {
                path: path.into(),
                source,
            },
            other => other,
        }
    }

    /// Attach a path to a bare I/O error raised while writing `path`
    pub(crate) fn writing(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Io(source) => Self::Write {
                path: path.into(),
                source,
            },
            other => other,
        }
    }
}

impl From<toml::de::Error> for ArchiveError {
    fn from(err: toml::de::Error) -> Self {
        ArchiveError::Config(err.to_string())
    }
}

impl From<glob::PatternError> for ArchiveError {
    fn from(err: glob::PatternError) -> Self {
        ArchiveError::InvalidArgument(format!("bad exclude pattern: {}", err))
    }
}
