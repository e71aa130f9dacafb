//! Block content decoding.
//!
//! Turns a raw on-disk block into plain bytes (decryption, decompression,
//! checksum) and splits decoded key blocks into [`KeyEntry`] values.

use std::cmp::min;

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::Encoding;
use log::trace;

use crate::archive::codec::{compression, crypto};
use crate::archive::models::{CompressionType, EncryptionType, KeyEntry, MdictHeader};
use crate::archive::utils;
use crate::types::error::{DictError, Result};

/// Decodes a raw, compressed and possibly encrypted block.
///
/// # Block Structure
/// ```text
/// [4 bytes] info (LE): bits 0-3 compression, 4-7 encryption, 8-15 encrypted prefix length
/// [4 bytes] Adler32 of the decompressed data (BE)
/// [N bytes] payload
/// ```
///
/// Without a master key the decryption key is `RIPEMD-128(checksum bytes)`.
pub fn decode_block(
    raw_block: &mut [u8],
    expected_decompressed_size: u64,
    master_key: Option<&[u8; 16]>,
) -> Result<Vec<u8>> {
    if raw_block.len() < 8 {
        return Err(DictError::InvalidFormat(
            "Block too short (minimum 8 bytes required)".to_string(),
        ));
    }

    let info = LittleEndian::read_u32(&raw_block[0..4]);
    let compression_type = CompressionType::try_from((info & 0xF) as u8)?;
    let encryption_type = EncryptionType::try_from(((info >> 4) & 0xF) as u8)?;
    let encryption_size = ((info >> 8) & 0xFF) as usize;
    let checksum_expected = BigEndian::read_u32(&raw_block[4..8]);

    trace!(
        "Decoding block: compression={:?}, encryption={:?}, expected_size={} bytes",
        compression_type,
        encryption_type,
        expected_decompressed_size
    );

    if encryption_type != EncryptionType::None {
        let decryption_key = match master_key {
            Some(key) => *key,
            None => crypto::ripemd128(&[&raw_block[4..8]]),
        };
        let payload = &mut raw_block[8..];
        let decrypt_len = min(encryption_size, payload.len());
        crypto::decrypt_payload_in_place(&mut payload[..decrypt_len], encryption_type, &decryption_key);
    }

    let decompressed =
        compression::decompress_payload(&raw_block[8..], compression_type, expected_decompressed_size)?;

    let checksum_actual = adler32_slice(decompressed.as_slice());
    if checksum_actual != checksum_expected {
        return Err(DictError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
        });
    }

    Ok(decompressed)
}

/// Parses key entries from a decoded key block.
pub fn parse_key_entries(data: &[u8], header: &MdictHeader) -> Result<Vec<KeyEntry>> {
    let mut entries = Vec::new();
    let mut reader = data;

    while !reader.is_empty() {
        let record_id = utils::read_number(&mut reader, header.version.number_width())?;
        let text = read_null_terminated_string(&mut reader, header.encoding)?;
        entries.push(KeyEntry { id: record_id, text });
    }

    Ok(entries)
}

/// Reads a NUL-terminated string and advances the slice past the terminator.
fn read_null_terminated_string(reader: &mut &[u8], encoding: &'static Encoding) -> Result<String> {
    let width = utils::unit_width(encoding);
    let end_pos = if width == 2 {
        reader
            .chunks_exact(2)
            .position(|chunk| chunk == [0, 0])
            .map(|chunk_index| chunk_index * 2)
    } else {
        reader.iter().position(|&byte| byte == 0)
    }
    .ok_or_else(|| DictError::InvalidFormat("Missing null terminator in string".to_string()))?;

    let (decoded, _) = encoding.decode_without_bom_handling(&reader[..end_pos]);
    *reader = &reader[end_pos + width..];

    Ok(decoded.into_owned())
}
