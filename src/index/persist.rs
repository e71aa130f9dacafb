//! On-disk index format.
//!
//! ```text
//! [4 bytes]  magic "MDXI"
//! [4 bytes]  format version (BE u32)
//! [N bytes]  IndexHeader (bincode)
//! [M bytes]  IndexBody (bincode)
//! [4 bytes]  Adler32 of everything above (BE u32)
//! ```
//!
//! Only ordered containers are serialized, so equal indexes produce equal bytes.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use adler2::adler32_slice;
use bincode::Options;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, info};
use twox_hash::XxHash64;

use super::{Index, IndexBody, IndexHeader, RankingWeights};
use crate::archive::Archive;
use crate::types::error::{DictError, Result};

pub const INDEX_MAGIC: &[u8; 4] = b"MDXI";

/// Bumped whenever the layout of [`IndexHeader`] or [`IndexBody`] changes.
pub const INDEX_FORMAT_VERSION: u32 = 2;

const PREAMBLE_LEN: usize = 8;
const CHECKSUM_LEN: usize = 4;

fn codec(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(limit)
        .reject_trailing_bytes()
}

/// Serializes an index.
pub fn to_bytes(index: &Index) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(INDEX_MAGIC);
    out.extend_from_slice(&INDEX_FORMAT_VERSION.to_be_bytes());
    codec(u64::MAX).serialize_into(&mut out, &index.header)?;
    codec(u64::MAX).serialize_into(&mut out, &index.body)?;
    let checksum = adler32_slice(&out);
    out.extend_from_slice(&checksum.to_be_bytes());
    Ok(out)
}

/// Deserializes and validates an index.
///
/// # Errors
/// - `IndexVersionMismatch` when the file has another format version
/// - `IndexCorrupt` for anything unreadable
pub fn from_bytes(bytes: &[u8]) -> Result<Index> {
    if bytes.len() < PREAMBLE_LEN + CHECKSUM_LEN || &bytes[..4] != INDEX_MAGIC {
        return Err(DictError::IndexCorrupt("missing index magic".to_string()));
    }

    let version = BigEndian::read_u32(&bytes[4..8]);
    if version != INDEX_FORMAT_VERSION {
        return Err(DictError::IndexVersionMismatch {
            context: "format version",
            expected: INDEX_FORMAT_VERSION as u64,
            found: version as u64,
        });
    }

    let (content, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let expected = BigEndian::read_u32(trailer);
    let actual = adler32_slice(content);
    if expected != actual {
        return Err(DictError::IndexCorrupt(format!(
            "checksum mismatch: expected {:#010x}, got {:#010x}",
            expected, actual
        )));
    }

    let mut reader = &content[PREAMBLE_LEN..];
    let limit = reader.len() as u64;
    let header: IndexHeader = codec(limit)
        .allow_trailing_bytes()
        .deserialize_from(&mut reader)
        .map_err(|e| DictError::IndexCorrupt(format!("unreadable header: {}", e)))?;
    let body: IndexBody = codec(limit)
        .deserialize(reader)
        .map_err(|e| DictError::IndexCorrupt(format!("unreadable body: {}", e)))?;

    let index = Index { header, body };
    index.validate().map_err(DictError::IndexCorrupt)?;
    Ok(index)
}

/// Writes the index next to its final path and renames it into place.
pub fn save(index: &Index, path: &Path) -> Result<()> {
    let bytes = to_bytes(index)?;
    let tmp = path.with_extension("mdxi.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    info!("Index saved to {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Reads an index file. I/O failures other than a missing file count as corruption.
pub fn load(path: &Path) -> Result<Index> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => DictError::Io(e),
        _ => DictError::IndexCorrupt(format!("cannot read {}: {}", path.display(), e)),
    })?;
    debug!("Loading index from {} ({} bytes)", path.display(), bytes.len());
    from_bytes(&bytes)
}

/// Fingerprint of a weight set, as compared against the index header.
pub fn weights_fingerprint(weights: &RankingWeights) -> u64 {
    let mut bytes = Vec::with_capacity(24);
    for value in [
        weights.headword,
        weights.variant,
        weights.pos,
        weights.body,
        weights.body_cap,
        weights.exact_case_bonus,
    ] {
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    XxHash64::oneshot(0, &bytes)
}

/// Checks that `index` was built from `archive` with `weights`.
pub fn check_provenance(index: &Index, archive: &Archive, weights: &RankingWeights) -> Result<()> {
    let header = &index.header;
    if header.archive_checksum != archive.checksum() {
        return Err(DictError::IndexVersionMismatch {
            context: "archive checksum",
            expected: archive.checksum(),
            found: header.archive_checksum,
        });
    }
    if header.archive_size != archive.file_len() {
        return Err(DictError::IndexVersionMismatch {
            context: "archive size",
            expected: archive.file_len(),
            found: header.archive_size,
        });
    }
    if header.entry_count as usize != archive.len() {
        return Err(DictError::IndexVersionMismatch {
            context: "entry count",
            expected: archive.len() as u64,
            found: header.entry_count as u64,
        });
    }
    if header.weights != *weights {
        return Err(DictError::IndexVersionMismatch {
            context: "ranking weights",
            expected: weights_fingerprint(weights),
            found: weights_fingerprint(&header.weights),
        });
    }
    Ok(())
}
