//! Entry codec pipeline.
//!
//! Writing compresses then encrypts; reading decrypts, decompresses, and
//! finally checks the CRC32 of the original bytes. The order is fixed: the
//! stored bytes of an encrypted entry are ciphertext of the compressed
//! stream, never the other way around.

pub mod compression;
pub mod encryption;

use crate::archive::{EntryFlags, FileEntry};
use crate::checksum;
use crate::context::Password;
use crate::error::{ArchiveError, Result};
use tracing::{debug, warn};

/// Output of [`encode`]: the bytes to store plus what is needed to undo them
#[derive(Debug, Clone)]
pub struct EncodedEntry {
    pub stored: Vec<u8>,
    pub flags: EntryFlags,
    /// CRC32 of the original bytes
    pub crc32: u32,
    pub original_size: usize,
}

impl EncodedEntry {
    pub fn stored_size(&self) -> usize {
        self.stored.len()
    }
}

/// Run the write half of the pipeline over `raw`.
///
/// A compression failure falls back to storing the bytes uncompressed. An
/// encryption failure is returned as an error: data is never stored in the
/// clear when a password is configured.
pub fn encode(raw: &[u8], level: u32, password: Option<&Password>) -> Result<EncodedEntry> {
    let crc32 = checksum::crc32(raw);
    let mut flags = EntryFlags::empty();

    let mut stored = if level > 0 {
        match compression::compress(raw, level) {
            Ok(compressed) => {
                flags.insert(EntryFlags::COMPRESSED);
                compressed
            }
            Err(err) => {
                warn!("compression failed, storing uncompressed: {}", err);
                raw.to_vec()
            }
        }
    } else {
        raw.to_vec()
    };

    if let Some(password) = password.filter(|p| !p.is_empty()) {
        stored = encryption::encrypt(&stored, password)?;
        flags.insert(EntryFlags::ENCRYPTED);
    }

    debug!(
        original = raw.len(),
        stored = stored.len(),
        flags = %flags,
        "encoded entry"
    );

    Ok(EncodedEntry {
        stored,
        flags,
        crc32,
        original_size: raw.len(),
    })
}

/// Run the read half of the pipeline over an entry's stored bytes
pub fn decode(stored: Vec<u8>, entry: &FileEntry, password: Option<&Password>) -> Result<Vec<u8>> {
    let decrypted = if entry.is_encrypted() {
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or(ArchiveError::PasswordRequired)?;
        encryption::decrypt(&stored, password)?
    } else {
        stored
    };

    let raw = if entry.is_compressed() {
        compression::decompress(&decrypted, entry.file_size as usize)?
    } else {
        decrypted
    };

    if raw.len() != entry.file_size as usize {
        return Err(ArchiveError::CrcMismatch {
            expected: entry.crc32,
            actual: checksum::crc32(&raw),
        });
    }
    checksum::verify(&raw, entry.crc32)?;
    Ok(raw)
}
