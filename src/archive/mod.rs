//! Read access to MDict `.mdx` archives (format versions 1.x and 2.x).
//!
//! All byte-level knowledge of the container lives below this module. The
//! rest of the crate sees [`Archive`], [`TocEntry`] and [`RawBlock`] only.

pub(crate) mod codec;
pub(crate) mod format;
mod iter;
pub mod models;
pub(crate) mod utils;
pub mod writer;

use std::fs::File;
use std::hash::Hasher;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use log::{debug, info};
use twox_hash::XxHash64;

use crate::types::error::{DictError, Result};
use crate::types::models::{EntryKey, RawBlock, TocEntry};

pub use codec::crypto::registration_code;
pub use iter::Blocks;
use models::{BlockMeta, BlockType, MdictEncoding, MdictHeader, Stylesheet};

/// Options applied while opening an archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// `(regcode_hex, user_email)` for archives with encrypted record blocks.
    pub passcode: Option<(String, String)>,
    /// Encoding label that replaces the one declared in the header.
    pub encoding: Option<String>,
}

/// Everything the entry parser needs to turn record bytes into text.
#[derive(Debug, Clone)]
pub struct RecordFormat {
    pub encoding: MdictEncoding,
    pub stylesheet: Stylesheet,
}

/// An open MDict archive with its full table of contents.
///
/// Immutable once opened; the file handle is released on drop.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    file: Mutex<File>,
    header: MdictHeader,
    key_blocks: Vec<BlockMeta>,
    record_blocks: Vec<BlockMeta>,
    toc: Vec<TocEntry>,
    checksum: u64,
    modified: u64,
    file_len: u64,
}

impl Archive {
    /// Opens an archive and reads its table of contents.
    ///
    /// # Errors
    /// - `ArchiveNotFound` if `path` does not exist
    /// - `ArchiveCorrupt` on truncation, checksum failures or inconsistent indexes
    /// - `UnsupportedVersion` / `PasscodeRequired` as raised by the header
    pub fn open(path: impl AsRef<Path>, options: &ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DictError::ArchiveNotFound(path.to_path_buf()));
        }
        info!("Opening MDict archive: {}", path.display());
        Self::open_inner(path, options).map_err(DictError::into_open_error)
    }

    fn open_inner(path: &Path, options: &ArchiveOptions) -> Result<Self> {
        let mut file = File::open(path)?;
        let metadata = file.metadata()?;
        let file_len = metadata.len();
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs())
            .unwrap_or(0);

        let passcode = options
            .passcode
            .as_ref()
            .map(|(regcode, email)| (regcode.as_str(), email.as_str()));
        let mut header = format::header::parse(&mut file, passcode)?;

        if let Some(label) = options.encoding.as_deref() {
            let overridden = utils::parse_encoding(label);
            if overridden != header.encoding {
                debug!(
                    "Text encoding overridden: header='{}', final='{}'",
                    header.encoding.name(),
                    overridden.name()
                );
            }
            header.encoding = overridden;
        }

        let layout = format::index::parse(&mut file, &header)?;
        check_blocks_within_file(&layout.key_blocks, BlockType::Key, file_len)?;
        check_blocks_within_file(&layout.record_blocks, BlockType::Record, file_len)?;

        let checksum = stream_checksum(&mut file)?;

        let mut archive = Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            header,
            key_blocks: layout.key_blocks,
            record_blocks: layout.record_blocks,
            toc: Vec::new(),
            checksum,
            modified,
            file_len,
        };
        archive.toc = archive.read_toc(layout.num_entries)?;

        info!(
            "Archive '{}' opened: {} entries, {} record blocks, checksum {:016x}",
            archive.header.metadata.title,
            archive.toc.len(),
            archive.record_blocks.len(),
            archive.checksum
        );
        Ok(archive)
    }

    /// Decodes every key block and resolves each key to its record location.
    fn read_toc(&self, num_entries: u64) -> Result<Vec<TocEntry>> {
        if num_entries > u32::MAX as u64 {
            return Err(DictError::InvalidFormat(format!(
                "Archive declares {} entries, more than can be addressed",
                num_entries
            )));
        }

        let mut keys = Vec::with_capacity(num_entries as usize);
        for block_index in 0..self.key_blocks.len() {
            let decoded = self.read_block(BlockType::Key, block_index)?;
            keys.extend(format::content::parse_key_entries(&decoded, &self.header)?);
        }
        if keys.len() as u64 != num_entries {
            return Err(DictError::CountMismatch {
                item_type: "decoded key entries".to_string(),
                expected: num_entries,
                found: keys.len() as u64,
            });
        }

        let stream_len = self.record_blocks.last().map_or(0, BlockMeta::decompressed_end);
        let mut toc = Vec::with_capacity(keys.len());
        for (position, entry) in keys.iter().enumerate() {
            let next_offset = keys.get(position + 1).map_or(stream_len, |next| next.id);
            if entry.id >= stream_len || next_offset < entry.id {
                return Err(DictError::InvalidFormat(format!(
                    "Record offset {} of '{}' is out of order or beyond the record stream ({} bytes)",
                    entry.id, entry.text, stream_len
                )));
            }
            let block_index = self
                .record_blocks
                .partition_point(|block| block.decompressed_offset <= entry.id)
                - 1;
            toc.push(TocEntry {
                headword: entry.text.clone(),
                record_offset: entry.id,
                record_size: next_offset - entry.id,
                block_index,
            });
        }
        Ok(toc)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.header.metadata.title
    }

    pub fn description(&self) -> Option<&str> {
        self.header.metadata.description.as_deref()
    }

    /// Number of entries in the table of contents.
    pub fn len(&self) -> usize {
        self.toc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toc.is_empty()
    }

    /// The table of contents in archive order; position `i` is `EntryKey(i)`.
    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    pub fn toc_entry(&self, key: EntryKey) -> Option<&TocEntry> {
        self.toc.get(key.index())
    }

    /// xxHash64 of the whole archive file.
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    /// Modification time of the archive file, in seconds since the Unix epoch.
    pub fn modified(&self) -> u64 {
        self.modified
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn record_format(&self) -> RecordFormat {
        RecordFormat {
            encoding: self.header.encoding,
            stylesheet: self.header.metadata.stylesheet.clone(),
        }
    }

    /// Reads the record of one entry.
    ///
    /// Unknown keys and undecodable blocks are both reported as `EntryMissing`.
    pub fn read(&self, key: EntryKey) -> Result<RawBlock> {
        let entry = self.toc_entry(key).ok_or(DictError::EntryMissing(key))?;
        let block = self
            .read_record_block(entry.block_index)
            .map_err(|e| missing(key, e))?;
        let bytes = self.slice_record(&block, entry).map_err(|e| missing(key, e))?;
        Ok(RawBlock {
            key,
            headword: entry.headword.clone(),
            bytes,
        })
    }

    /// Sequential iterator over every entry, decoding each record block once.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks::new(self, 0)
    }

    /// Like [`blocks`](Self::blocks), starting at `start`.
    pub fn blocks_from(&self, start: EntryKey) -> Blocks<'_> {
        Blocks::new(self, start.index())
    }

    pub(crate) fn read_record_block(&self, block_index: usize) -> Result<Vec<u8>> {
        self.read_block(BlockType::Record, block_index)
    }

    /// Copies a record out of its decoded block.
    pub(crate) fn slice_record(&self, block: &[u8], entry: &TocEntry) -> Result<Vec<u8>> {
        let block_meta = self.record_blocks.get(entry.block_index).ok_or_else(|| {
            DictError::InvalidFormat(format!("Invalid record block index: {}", entry.block_index))
        })?;
        let start = (entry.record_offset - block_meta.decompressed_offset) as usize;
        let end = start + entry.record_size as usize;
        if end > block.len() {
            return Err(DictError::InvalidFormat(format!(
                "Record location [{}..{}] is out of bounds for block of size {}",
                start,
                end,
                block.len()
            )));
        }
        Ok(block[start..end].to_vec())
    }

    fn read_block(&self, block_type: BlockType, block_index: usize) -> Result<Vec<u8>> {
        let blocks = match block_type {
            BlockType::Key => &self.key_blocks,
            BlockType::Record => &self.record_blocks,
        };
        let block_meta = blocks.get(block_index).ok_or_else(|| {
            DictError::InvalidFormat(format!("Invalid {} block index: {}", block_type, block_index))
        })?;
        self.read_and_decode_block(*block_meta)
    }

    fn read_and_decode_block(&self, block_meta: BlockMeta) -> Result<Vec<u8>> {
        let mut raw_block = vec![0u8; block_meta.compressed_size as usize];
        {
            let mut file = self.file.lock().map_err(|_| DictError::LockPoisoned)?;
            file.seek(SeekFrom::Start(block_meta.file_offset))?;
            file.read_exact(&mut raw_block)?;
        }
        format::content::decode_block(
            &mut raw_block,
            block_meta.decompressed_size,
            self.header.master_key.as_ref(),
        )
    }
}

fn missing(key: EntryKey, cause: DictError) -> DictError {
    debug!("Entry {} unreadable: {}", key, cause);
    DictError::EntryMissing(key)
}

fn check_blocks_within_file(blocks: &[BlockMeta], block_type: BlockType, file_len: u64) -> Result<()> {
    match blocks.last() {
        Some(last) if last.file_end() > file_len => Err(DictError::InvalidFormat(format!(
            "{} blocks end at byte {}, beyond the end of the file ({} bytes)",
            block_type,
            last.file_end(),
            file_len
        ))),
        _ => Ok(()),
    }
}

/// Streams the whole file through xxHash64, leaving the cursor at the end.
fn stream_checksum(file: &mut File) -> Result<u64> {
    file.seek(SeekFrom::Start(0))?;
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.write(&buffer[..read]);
    }
    Ok(hasher.finish())
}
