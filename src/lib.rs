//! archpack: a single-file archive container
//!
//! An archive is a fixed header, a contiguous table of fixed-size entries,
//! and a data region holding each entry's stored bytes. Entries are
//! optionally deflate-compressed and optionally encrypted with a
//! password-derived AES-256-GCM key; every entry carries the CRC32 of its
//! original bytes, checked on every read.
//!
//! # Example
//!
//! ```no_run
//! use archpack::{Archiver, Context, Engine};
//! use std::path::{Path, PathBuf};
//!
//! let engine = Engine::new();
//! let ctx = Context::new().with_compression_level(9)?.with_password("secret");
//!
//! let archive = Path::new("backup.arc");
//! engine.create(&ctx, archive, &[PathBuf::from("notes.txt")])?;
//! engine.verify(&ctx, archive)?;
//! engine.extract(&ctx, archive, Path::new("restored"))?;
//! # Ok::<(), archpack::ArchiveError>(())
//! ```

pub mod archive;
pub mod checksum;
pub mod codec;
pub mod context;
pub mod engine;
pub mod error;
pub mod inputs;

pub use archive::{
    normalize_name, ArchiveHeader, ArchiveReader, ArchiveWriter, EntryFlags, EntryMetadata,
    FileEntry, ENTRY_SIZE, FORMAT_VERSION, HEADER_SIZE, MAGIC_NUMBER, MAX_NAME_LENGTH,
};
pub use codec::EncodedEntry;
pub use context::{ArchiveConfig, Context, Password, Reporter, TracingReporter};
pub use engine::{
    Archiver, Engine, EntryCheck, ExtractSummary, Listing, VerifyReport, WriteSummary,
};
pub use error::{ArchiveError, ErrorKind, Result};
