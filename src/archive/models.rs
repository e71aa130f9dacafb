//! Data structures describing the on-disk MDict container.
//!
//! Nothing outside the `archive` module sees these types; the rest of the
//! crate only handles [`TocEntry`](crate::TocEntry) and [`RawBlock`](crate::RawBlock).

use std::collections::HashMap;
use std::fmt;

use encoding_rs::Encoding;

use crate::types::error::{DictError, Result};

/// Text encoding of keys and records.
pub type MdictEncoding = &'static Encoding;

/// Master decryption key, derived from the passcode when one is configured.
pub type MasterKey = Option<[u8; 16]>;

/// Style id → (opening markup, closing markup), from the header `StyleSheet` attribute.
pub type Stylesheet = HashMap<u8, (String, String)>;

/// Encryption flags parsed from the MDict header.
///
/// - Bit 0x01: Record data blocks are encrypted
/// - Bit 0x02: Key index block is encrypted
#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptionFlags {
    pub encrypt_record_blocks: bool,
    pub encrypt_key_index: bool,
}

/// User-visible header metadata.
#[derive(Debug, Clone)]
pub struct MdictMetadata {
    pub title: String,
    pub engine_version: String,
    pub description: Option<String>,
    pub stylesheet: Stylesheet,
}

/// Complete parsed header of an MDict file.
#[derive(Debug)]
pub struct MdictHeader {
    pub version: MdictVersion,
    pub encoding: MdictEncoding,
    pub encryption_flags: EncryptionFlags,
    pub master_key: MasterKey,
    pub metadata: MdictMetadata,
}

/// Metadata describing a single compressed data block.
#[derive(Debug, Clone, Copy)]
pub struct BlockMeta {
    /// Size of the compressed block data as stored in the file (bytes).
    pub compressed_size: u64,
    /// Size of the block after decompression (bytes).
    pub decompressed_size: u64,
    /// Absolute byte offset where this block's compressed data begins in the file.
    pub file_offset: u64,
    /// Offset of this block in the virtual concatenated decompressed stream.
    pub decompressed_offset: u64,
}

impl BlockMeta {
    pub fn file_end(&self) -> u64 {
        self.file_offset + self.compressed_size
    }

    pub fn decompressed_end(&self) -> u64 {
        self.decompressed_offset + self.decompressed_size
    }
}

/// A key entry as stored in a key block: record offset plus headword.
#[derive(Debug)]
pub struct KeyEntry {
    pub id: u64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdictVersion {
    V1,
    V2,
}

impl MdictVersion {
    /// Returns the byte width for numeric fields in this MDict version.
    ///
    /// - V1: 4 bytes (u32)
    /// - V2: 8 bytes (u64)
    pub fn number_width(&self) -> usize {
        match self {
            MdictVersion::V1 => 4,
            MdictVersion::V2 => 8,
        }
    }

    /// Returns the byte width for text length prefixes in this MDict version.
    ///
    /// - V1: 1 byte (u8)
    /// - V2: 2 bytes (u16)
    pub fn small_number_width(&self) -> usize {
        match self {
            MdictVersion::V1 => 1,
            MdictVersion::V2 => 2,
        }
    }

    /// Key index text fields carry a terminator unit from v2 on.
    pub fn text_terminator_units(&self) -> u64 {
        match self {
            MdictVersion::V1 => 0,
            MdictVersion::V2 => 1,
        }
    }
}

impl TryFrom<f32> for MdictVersion {
    type Error = DictError;
    fn try_from(v: f32) -> Result<Self> {
        if v < 2.0 {
            Ok(Self::V1)
        } else if v < 3.0 {
            Ok(Self::V2)
        } else {
            Err(DictError::UnsupportedVersion(v))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Key,
    Record,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlockType::Key => write!(f, "key"),
            BlockType::Record => write!(f, "record"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lzo,
    Zlib,
}

impl CompressionType {
    pub fn code(self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lzo => 1,
            CompressionType::Zlib => 2,
        }
    }
}

impl TryFrom<u8> for CompressionType {
    type Error = DictError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Lzo),
            2 => Ok(Self::Zlib),
            _ => Err(DictError::InvalidFormat(format!("Unknown compression type: {}", value))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    None,
    Fast,
    Salsa20,
}

impl TryFrom<u8> for EncryptionType {
    type Error = DictError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Fast),
            2 => Ok(Self::Salsa20),
            _ => Err(DictError::InvalidFormat(format!("Unknown encryption type: {}", value))),
        }
    }
}
