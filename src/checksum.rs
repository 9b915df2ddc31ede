//! CRC32 (IEEE 802.3) checksums over entry contents.

use crate::error::{ArchiveError, Result};

/// Compute the CRC32 of a byte span
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Check `data` against an expected CRC32
pub fn verify(data: &[u8], expected: u32) -> Result<()> {
    let actual = crc32(data);
    if actual != expected {
        return Err(ArchiveError::CrcMismatch { expected, actual });
    }
    Ok(())
}
