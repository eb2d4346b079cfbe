// compression.rs — Save-file body compression
//
// Save bodies are compressed as one whole buffer with raw deflate (no
// zlib header, windowBits = -15). The decompressor therefore needs the
// entire file in memory up front; streamed decompression is not
// supported by this layer.

use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use std::io::Read;
use thiserror::Error;

/// Maximum decompressed save body size, to guard against decompression
/// bombs from hostile files.
pub const MAX_DECOMPRESS_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("deflate failed: {0}")]
    Deflate(std::io::Error),

    #[error("inflate failed: {0}")]
    Inflate(std::io::Error),

    #[error("decompressed size exceeds limit of {limit} bytes")]
    TooLarge { limit: usize },
}

/// Compress a whole save body with raw deflate.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut encoder = DeflateEncoder::new(data, Compression::default());
    let mut out = Vec::with_capacity(data.len() / 2);
    encoder.read_to_end(&mut out).map_err(CompressionError::Deflate)?;
    Ok(out)
}

/// Decompress a whole save body, bounded by `max_size`.
pub fn decompress(data: &[u8], max_size: usize) -> Result<Vec<u8>, CompressionError> {
    let mut decoder = DeflateDecoder::new(data).take(max_size as u64 + 1);
    let mut out = Vec::with_capacity(data.len() * 4);
    decoder.read_to_end(&mut out).map_err(CompressionError::Inflate)?;
    if out.len() > max_size {
        return Err(CompressionError::TooLarge { limit: max_size });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let body: Vec<u8> = (0..5000u32).flat_map(|i| (i % 97).to_le_bytes()).collect();
        let packed = compress(&body).unwrap();
        assert!(packed.len() < body.len());
        let unpacked = decompress(&packed, MAX_DECOMPRESS_SIZE).unwrap();
        assert_eq!(body, unpacked);
    }

    #[test]
    fn test_size_limit() {
        let body = vec![0u8; 10000];
        let packed = compress(&body).unwrap();
        assert!(decompress(&packed, 100).is_err());
        assert!(decompress(&packed, 20000).is_ok());
    }

    #[test]
    fn test_empty_body() {
        let packed = compress(&[]).unwrap();
        let unpacked = decompress(&packed, MAX_DECOMPRESS_SIZE).unwrap();
        assert!(unpacked.is_empty());
    }
}
