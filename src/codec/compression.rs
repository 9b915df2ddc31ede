//! Deflate codec (zlib framing) for entry payloads.

use crate::error::{ArchiveError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Highest supported compression level
pub const MAX_LEVEL: u32 = 9;

/// Default compression level
pub const DEFAULT_LEVEL: u32 = 6;

/// Compress `data` at `level` (0-9). Level 0 returns the input unchanged.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    if level > MAX_LEVEL {
        return Err(ArchiveError::InvalidArgument(format!(
            "Compression level {} out of range 0-{}",
            level, MAX_LEVEL
        )));
    }
    if level == 0 {
        return Ok(data.to_vec());
    }

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| ArchiveError::CompressionFailed(format!("Deflate compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| ArchiveError::CompressionFailed(format!("Deflate compression failed: {}", e)))
}

/// Decompress `data`, which must inflate to exactly `expected_len` bytes
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    output
        .try_reserve_exact(expected_len)
        .map_err(|_| ArchiveError::OutOfMemory(expected_len))?;

    // One extra byte lets us notice streams that inflate past the recorded size
    let mut decoder = ZlibDecoder::new(data).take(expected_len as u64 + 1);
    decoder
        .read_to_end(&mut output)
        .map_err(|e| ArchiveError::DecompressionFailed(format!("Deflate decompression failed: {}", e)))?;

    if output.len() != expected_len {
        return Err(ArchiveError::DecompressionFailed(format!(
            "Inflated size does not match recorded size of {} bytes",
            expected_len
        )));
    }
    Ok(output)
}
