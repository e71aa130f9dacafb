//! Data structures shared between the archive, the parser and the index.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a dictionary entry: its ordinal in archive order.
///
/// Keys are dense (`0..num_entries`) and never reused within one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey(pub u32);

impl EntryKey {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One row of the archive's table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Headword as stored in the key block.
    pub headword: String,
    /// Offset of the record in the virtual concatenated record stream.
    pub record_offset: u64,
    /// Size of the record in bytes.
    pub record_size: u64,
    /// Index of the record block holding this record.
    pub block_index: usize,
}

/// The owned bytes of one entry, as produced by the archive reader.
#[derive(Debug, Clone)]
pub struct RawBlock {
    pub key: EntryKey,
    pub headword: String,
    pub bytes: Vec<u8>,
}
