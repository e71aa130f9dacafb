//! Sequential access to archive entries.

use log::trace;

use super::Archive;
use crate::types::error::{DictError, Result};
use crate::types::models::{EntryKey, RawBlock};

/// Iterator over every entry's [`RawBlock`] in archive order.
///
/// The most recently decoded record block is kept in memory, so a full scan
/// decodes each block once. A block that fails to decode yields
/// `EntryMissing` for each entry inside it and iteration carries on.
///
/// Created by [`Archive::blocks()`](crate::Archive::blocks).
pub struct Blocks<'a> {
    archive: &'a Archive,
    position: usize,
    cached_block_index: Option<usize>,
    cached_block: Option<Vec<u8>>,
}

impl<'a> Blocks<'a> {
    pub(super) fn new(archive: &'a Archive, start: usize) -> Self {
        Self {
            archive,
            position: start,
            cached_block_index: None,
            cached_block: None,
        }
    }
}

impl<'a> Iterator for Blocks<'a> {
    type Item = Result<RawBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.archive.toc().get(self.position)?;
        let key = EntryKey(self.position as u32);
        self.position += 1;

        if self.cached_block_index != Some(entry.block_index) {
            trace!("Loading record block {}", entry.block_index);
            self.cached_block_index = Some(entry.block_index);
            self.cached_block = self.archive.read_record_block(entry.block_index).ok();
        }

        let Some(block) = self.cached_block.as_deref() else {
            return Some(Err(DictError::EntryMissing(key)));
        };
        Some(
            self.archive
                .slice_record(block, entry)
                .map(|bytes| RawBlock {
                    key,
                    headword: entry.headword.clone(),
                    bytes,
                })
                .map_err(|_| DictError::EntryMissing(key)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.archive.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Blocks<'_> {}
