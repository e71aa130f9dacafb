//! Parser for the key and record block indexes of MDict 1.x and 2.x files.

use std::io::{Read, Seek, SeekFrom};

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, info};

use crate::archive::codec::{compression, crypto};
use crate::archive::models::{BlockMeta, BlockType, CompressionType, MdictHeader, MdictVersion};
use crate::archive::utils;
use crate::types::error::{DictError, Result};

/// Largest decompressed block accepted from an index. Real compilers write
/// blocks of a few dozen kilobytes; the record index carries no checksum.
pub const MAX_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Block layout of an archive, as declared by its indexes.
#[derive(Debug)]
pub struct BlockLayout {
    pub key_blocks: Vec<BlockMeta>,
    pub record_blocks: Vec<BlockMeta>,
    pub num_entries: u64,
}

/// Reads both block indexes. The reader must be positioned right after the header.
pub fn parse<R: Read + Seek>(file: &mut R, header: &MdictHeader) -> Result<BlockLayout> {
    let (key_blocks, num_entries) = parse_block_info(file, header, BlockType::Key)?;

    let total_key_blocks_size: u64 = key_blocks.iter().map(|b| b.compressed_size).sum();
    file.seek(SeekFrom::Current(total_key_blocks_size as i64))?;

    let (record_blocks, record_entries) = parse_block_info(file, header, BlockType::Record)?;
    if record_entries != num_entries {
        return Err(DictError::CountMismatch {
            item_type: "entries in record section".to_string(),
            expected: num_entries,
            found: record_entries,
        });
    }

    info!(
        "Block layout: {} key blocks, {} record blocks, {} entries",
        key_blocks.len(),
        record_blocks.len(),
        num_entries
    );

    Ok(BlockLayout {
        key_blocks,
        record_blocks,
        num_entries,
    })
}

/// Generic parser for block metadata (key and record).
fn parse_block_info<R: Seek + Read>(
    file: &mut R,
    header: &MdictHeader,
    block_type: BlockType,
) -> Result<(Vec<BlockMeta>, u64)> {
    info!("Parsing {} block info section", block_type);

    let (index_data, num_blocks, num_entries) = match block_type {
        BlockType::Key => parse_key_block_index(file, header)?,
        BlockType::Record => parse_record_block_index(file, header)?,
    };

    let initial_file_offset = file.stream_position()?;
    let (blocks, total_entries) =
        extract_block_metas(&index_data, header, block_type, initial_file_offset)?;

    if blocks.len() as u64 != num_blocks {
        return Err(DictError::CountMismatch {
            item_type: format!("{} blocks in index", block_type),
            expected: num_blocks,
            found: blocks.len() as u64,
        });
    }

    if block_type == BlockType::Key && total_entries != num_entries {
        return Err(DictError::CountMismatch {
            item_type: "key entries in index".to_string(),
            expected: num_entries,
            found: total_entries,
        });
    }

    debug!("{} index metadata: {} blocks defined", block_type, blocks.len());
    Ok((blocks, num_entries))
}

/// Extracts block metadata from the decompressed index data.
fn extract_block_metas(
    index_data: &[u8],
    header: &MdictHeader,
    block_type: BlockType,
    initial_file_offset: u64,
) -> Result<(Vec<BlockMeta>, u64)> {
    let width = header.version.number_width();
    let mut blocks = Vec::new();
    let mut reader = index_data;
    let mut total_entries = 0u64;
    let mut file_offset = initial_file_offset;
    let mut decompressed_offset: u64 = 0;

    while !reader.is_empty() {
        if block_type == BlockType::Key {
            total_entries += utils::read_number(&mut reader, width)?;
            // first and last key of the block
            skip_text(&mut reader, header)?;
            skip_text(&mut reader, header)?;
        }

        let compressed_size = utils::read_number(&mut reader, width)?;
        let decompressed_size = utils::read_number(&mut reader, width)?;
        if compressed_size > MAX_BLOCK_SIZE || decompressed_size > MAX_BLOCK_SIZE {
            return Err(DictError::InvalidFormat(format!(
                "{} block {} declares {} bytes compressed, {} bytes decompressed (limit {})",
                block_type,
                blocks.len(),
                compressed_size,
                decompressed_size,
                MAX_BLOCK_SIZE
            )));
        }

        blocks.push(BlockMeta {
            compressed_size,
            decompressed_size,
            file_offset,
            decompressed_offset,
        });
        file_offset = file_offset
            .checked_add(compressed_size)
            .ok_or_else(|| overflow(block_type, "file offsets"))?;
        decompressed_offset = decompressed_offset
            .checked_add(decompressed_size)
            .ok_or_else(|| overflow(block_type, "decompressed offsets"))?;
    }

    Ok((blocks, total_entries))
}

fn overflow(block_type: BlockType, what: &str) -> DictError {
    DictError::InvalidFormat(format!("{} block {} overflow", block_type, what))
}

/// Skips a length-prefixed text field without decoding it.
///
/// The prefix counts text units, not bytes; v2 adds one terminator unit.
fn skip_text(reader: &mut &[u8], header: &MdictHeader) -> Result<()> {
    let text_len_units = utils::read_small_number(reader, header.version.small_number_width())?;
    let total_bytes = ((text_len_units + header.version.text_terminator_units()) as usize)
        * utils::unit_width(header.encoding);

    if reader.len() < total_bytes {
        return Err(DictError::InvalidFormat("Incomplete key text in index".to_string()));
    }

    *reader = &reader[total_bytes..];
    Ok(())
}

/// Parses the key block info section and reads the (compressed) key index.
///
/// Info section layout:
/// - v2: 5 × u64 (blocks, entries, index decompressed len, index compressed len,
///   key blocks len) followed by a big-endian Adler32 checksum
/// - v1: 4 × u32 (blocks, entries, index len, key blocks len), no checksum
fn parse_key_block_index<R: Seek + Read>(
    file: &mut R,
    header: &MdictHeader,
) -> Result<(Vec<u8>, u64, u64)> {
    let info_size = match header.version {
        MdictVersion::V1 => 16,
        MdictVersion::V2 => 40,
    };
    let mut info_bytes = vec![0u8; info_size];
    file.read_exact(&mut info_bytes)?;

    if header.encryption_flags.encrypt_record_blocks {
        if let Some(ref key) = header.master_key {
            debug!("Decrypting key block info (Salsa20)");
            crypto::salsa_decrypt(&mut info_bytes, key);
        } else {
            return Err(DictError::PasscodeRequired);
        }
    }

    if header.version == MdictVersion::V2 {
        let checksum_expected = file.read_u32::<BigEndian>()?;
        let checksum_actual = adler32_slice(&info_bytes);
        if checksum_actual != checksum_expected {
            return Err(DictError::ChecksumMismatch {
                expected: checksum_expected,
                actual: checksum_actual,
            });
        }
    }

    let width = header.version.number_width();
    let mut reader = info_bytes.as_slice();
    let num_blocks = utils::read_number(&mut reader, width)?;
    let num_entries = utils::read_number(&mut reader, width)?;
    let key_index_decomp_len = match header.version {
        MdictVersion::V2 => Some(utils::read_number(&mut reader, width)?),
        MdictVersion::V1 => None,
    };
    let key_index_comp_len = utils::read_number(&mut reader, width)?;
    let _key_blocks_len = utils::read_number(&mut reader, width)?;

    info!(
        "Key block info: blocks={}, entries={}, index_compressed={} bytes",
        num_blocks, num_entries, key_index_comp_len
    );

    let compressed = read_sized(file, key_index_comp_len, "key index")?;
    let index_data = decompress_key_index(&compressed, key_index_decomp_len, header)?;

    Ok((index_data, num_blocks, num_entries))
}

/// Parses the record block info section and reads the (uncompressed) record index.
fn parse_record_block_index<R: Seek + Read>(
    file: &mut R,
    header: &MdictHeader,
) -> Result<(Vec<u8>, u64, u64)> {
    let width = header.version.number_width();
    let num_blocks = utils::read_number(file, width)?;
    let num_entries = utils::read_number(file, width)?;
    let record_index_len = utils::read_number(file, width)?;
    let _record_blocks_len = utils::read_number(file, width)?;

    let index_data = read_sized(file, record_index_len, "record index")?;
    Ok((index_data, num_blocks, num_entries))
}

/// Reads exactly `len` bytes, refusing lengths that run past the end of the file.
fn read_sized<R: Seek + Read>(file: &mut R, len: u64, context: &str) -> Result<Vec<u8>> {
    let position = file.stream_position()?;
    let end = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(position))?;
    if position.saturating_add(len) > end {
        return Err(DictError::InvalidFormat(format!(
            "{} of {} bytes at offset {} runs past end of file ({} bytes)",
            context, len, position, end
        )));
    }
    let mut data = vec![0u8; len as usize];
    file.read_exact(&mut data)?;
    Ok(data)
}

/// Decompresses the raw key index block.
///
/// v2 layout: `[u32 LE compression type][u32 BE Adler32 of plain data][payload]`,
/// the payload optionally obfuscated with the fast cipher. v1 stores it raw.
fn decompress_key_index(compressed: &[u8], decomp_len: Option<u64>, header: &MdictHeader) -> Result<Vec<u8>> {
    if decomp_len.is_some_and(|len| len > MAX_BLOCK_SIZE) {
        return Err(DictError::InvalidFormat(format!(
            "Key index declares {:?} decompressed bytes (limit {})",
            decomp_len, MAX_BLOCK_SIZE
        )));
    }
    let Some(decomp_len) = decomp_len else {
        debug!("Processing v1.x key index ({} bytes, uncompressed)", compressed.len());
        return Ok(compressed.to_vec());
    };

    if compressed.len() < 8 {
        return Err(DictError::InvalidFormat("Key index too short".to_string()));
    }
    debug!(
        "Processing v2.x key index (compressed: {} bytes, decompressed: {} bytes)",
        compressed.len(),
        decomp_len
    );

    let mut payload = compressed[8..].to_vec();
    if header.encryption_flags.encrypt_key_index {
        debug!("Decrypting key index (fast decrypt with checksum-derived key)");
        let key = crypto::derive_key_for_v2_index(compressed);
        crypto::fast_decrypt(&mut payload, &key);
    }

    let compression_type = CompressionType::try_from(LittleEndian::read_u32(&compressed[0..4]) as u8)?;
    let decompressed = compression::decompress_payload(&payload, compression_type, decomp_len)?;

    let checksum_expected = BigEndian::read_u32(&compressed[4..8]);
    let checksum_actual = adler32_slice(decompressed.as_slice());
    if checksum_actual != checksum_expected {
        return Err(DictError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
        });
    }
    Ok(decompressed)
}
