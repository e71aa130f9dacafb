//! Error types shared by every layer of the crate.
//!
//! The archive layer raises the low-level format variants (`ChecksumMismatch`,
//! `DecompressionError`, ...). They never leave the archive module on their
//! own: [`Archive::open`](crate::Archive::open) folds them into
//! [`DictError::ArchiveCorrupt`] and [`Archive::read`](crate::Archive::read)
//! folds them into [`DictError::EntryMissing`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::models::EntryKey;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum DictError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive path does not exist.
    #[error("Dictionary archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    /// The archive is structurally unusable. No partial recovery is attempted.
    #[error("Cannot open dictionary, archive is corrupt: {0}")]
    ArchiveCorrupt(String),

    /// The MDict file version is unsupported (3.0+).
    #[error("Unsupported MDict version: {0}. Only v1.x and v2.x are supported.")]
    UnsupportedVersion(f32),

    /// The archive is encrypted, but no passcode was provided to derive the decryption key.
    #[error("Encrypted archive requires a passcode, but none was provided.")]
    PasscodeRequired,

    /// A checksum validation failed, indicating data corruption.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// An error occurred during decryption, often due to a wrong key or corrupted data.
    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    /// An error occurred during decompression.
    #[error("Decompression failed: {0}")]
    DecompressionError(String),

    /// A declared count of items does not match the actual number of items found.
    #[error("Count mismatch for {item_type}: expected {expected}, but found {found}")]
    CountMismatch {
        item_type: String,
        expected: u64,
        found: u64,
    },

    /// A buffer or data block has an unexpected size after an operation.
    #[error("Size mismatch for {context}: expected {expected} bytes, but found {found} bytes")]
    SizeMismatch {
        context: String,
        expected: u64,
        found: u64,
    },

    /// The data does not conform to the MDict format.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A mutex lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A mutex lock was poisoned, indicating a panic in another thread holding the lock.")]
    LockPoisoned,

    /// The entry could not be read from the archive (unknown key or undecodable block).
    #[error("Entry {0} is missing or unreadable")]
    EntryMissing(EntryKey),

    /// The entry was read but lacks its mandatory headword.
    #[error("Entry {key} is malformed: {reason}")]
    MalformedEntry { key: EntryKey, reason: String },

    /// The persisted index was produced by another format version, archive or weighting.
    #[error("Index mismatch on {context}: expected {expected:#x}, found {found:#x}")]
    IndexVersionMismatch {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    /// The persisted index is unreadable.
    #[error("Index is corrupt: {0}")]
    IndexCorrupt(String),

    /// The persisted index could not be encoded.
    #[error("Index serialization failed: {0}")]
    Serialize(#[from] bincode::Error),

    /// The configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DictError {
    /// Folds a failure raised while opening an archive into the public taxonomy.
    ///
    /// Truncation and every structural inconsistency become `ArchiveCorrupt`.
    /// Errors the caller can act on (`PasscodeRequired`, `UnsupportedVersion`,
    /// `ArchiveNotFound`) and non-EOF I/O errors pass through unchanged.
    pub(crate) fn into_open_error(self) -> DictError {
        match self {
            DictError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                DictError::ArchiveCorrupt(format!("truncated archive ({})", e))
            }
            DictError::ChecksumMismatch { .. }
            | DictError::DecryptionError(_)
            | DictError::DecompressionError(_)
            | DictError::CountMismatch { .. }
            | DictError::SizeMismatch { .. }
            | DictError::InvalidFormat(_) => DictError::ArchiveCorrupt(self.to_string()),
            other => other,
        }
    }

    /// True for the index failures that are answered with a rebuild.
    pub fn needs_rebuild(&self) -> bool {
        matches!(
            self,
            DictError::IndexVersionMismatch { .. } | DictError::IndexCorrupt(_)
        )
    }
}

/// A convenience `Result` type alias using the crate's `DictError` type.
pub type Result<T> = std::result::Result<T, DictError>;
