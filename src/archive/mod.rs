mod format;
mod reader;
mod writer;

pub use format::{
    normalize_name, ArchiveHeader, EntryFlags, FileEntry, ENTRY_SIZE, FORMAT_VERSION,
    FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR, HEADER_SIZE, MAGIC_NUMBER, MAX_NAME_LENGTH,
    NAME_FIELD_SIZE,
};
pub use reader::ArchiveReader;
pub use writer::{ArchiveWriter, EntryMetadata};
