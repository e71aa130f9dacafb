//! Compression algorithms for MDict data blocks.
//!
//! MDict files support multiple compression formats:
//! - None (type 0): No compression
//! - LZO (type 1): Fast decompression using lzokay
//! - Zlib (type 2): Standard deflate compression
//!
//! Only `None` and `Zlib` can be produced by the writer.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::trace;
use lzokay::decompress::decompress as lzokay_decompress;

use crate::archive::models::CompressionType;
use crate::types::error::{DictError, Result};

/// Decompresses a payload and checks the result against `expected_size`.
///
/// # Errors
/// Returns `DecompressionError` when the codec fails, `SizeMismatch` when the
/// output length differs from the size recorded in the block index.
pub fn decompress_payload(
    payload: &[u8],
    compression_type: CompressionType,
    expected_size: u64,
) -> Result<Vec<u8>> {
    let decompressed = match compression_type {
        CompressionType::None => {
            trace!("No compression, copying {} bytes", payload.len());
            payload.to_vec()
        }
        CompressionType::Lzo => {
            trace!(
                "Decompressing with LZO: {} bytes -> {} bytes (expected)",
                payload.len(),
                expected_size
            );
            let mut output = vec![0u8; expected_size as usize];
            let written = lzokay_decompress(payload, &mut output).map_err(|e| {
                DictError::DecompressionError(format!("LZO decompression failed: {:?}", e))
            })?;
            output.truncate(written);
            output
        }
        CompressionType::Zlib => {
            trace!(
                "Decompressing with Zlib: {} bytes -> {} bytes (expected)",
                payload.len(),
                expected_size
            );
            // one extra byte is enough to detect an oversized stream
            let mut output = Vec::new();
            ZlibDecoder::new(payload)
                .take(expected_size.saturating_add(1))
                .read_to_end(&mut output)
                .map_err(|e| {
                    DictError::DecompressionError(format!("Zlib decompression failed: {}", e))
                })?;
            output
        }
    };

    if decompressed.len() as u64 != expected_size {
        return Err(DictError::SizeMismatch {
            context: format!("{:?} decompressed block", compression_type),
            expected: expected_size,
            found: decompressed.len() as u64,
        });
    }

    Ok(decompressed)
}

/// Compresses a payload for the writer.
pub fn compress_payload(payload: &[u8], compression_type: CompressionType) -> Result<Vec<u8>> {
    match compression_type {
        CompressionType::None => Ok(payload.to_vec()),
        CompressionType::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            Ok(encoder.finish()?)
        }
        CompressionType::Lzo => Err(DictError::InvalidFormat(
            "LZO compression is not supported when writing".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlib_payload_survives_compression() {
        let text = b"abandon abandon abandon, abase, abash".repeat(8);
        let packed = compress_payload(&text, CompressionType::Zlib).unwrap();
        assert!(packed.len() < text.len());
        let unpacked = decompress_payload(&packed, CompressionType::Zlib, text.len() as u64).unwrap();
        assert_eq!(unpacked, text);
    }

    #[test]
    fn size_mismatch_is_reported() {
        let packed = compress_payload(b"short", CompressionType::Zlib).unwrap();
        let err = decompress_payload(&packed, CompressionType::Zlib, 99).unwrap_err();
        assert!(matches!(err, DictError::SizeMismatch { expected: 99, found: 5, .. }));
    }

    #[test]
    fn oversized_zlib_stream_stops_early() {
        let text = vec![b'x'; 4096];
        let packed = compress_payload(&text, CompressionType::Zlib).unwrap();
        let err = decompress_payload(&packed, CompressionType::Zlib, 16).unwrap_err();
        assert!(matches!(err, DictError::SizeMismatch { expected: 16, found: 17, .. }));
    }

    #[test]
    fn garbage_zlib_fails() {
        let err = decompress_payload(&[1, 2, 3, 4], CompressionType::Zlib, 4).unwrap_err();
        assert!(matches!(err, DictError::DecompressionError(_)));
    }
}
