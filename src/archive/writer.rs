//! Writer for MDict 2.0 archives.
//!
//! Produces files the [`Archive`](crate::Archive) reader accepts: UTF-8,
//! UTF-16LE or any single/multi-byte encoding `encoding_rs` can encode,
//! zlib or no compression, optionally an encrypted key index and record
//! blocks encrypted under a master key.
//! Entries keep the order they were added in.

use std::fs;
use std::path::Path;

use adler2::adler32_slice;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use encoding_rs::{Encoding, UTF_16LE};
use log::debug;
use quick_xml::escape::escape;

use crate::archive::codec::{compression, crypto};
use crate::archive::models::CompressionType;
use crate::types::error::{DictError, Result};

/// Encryption code of Salsa20/8 in a block info word.
const SALSA20_CODE: u32 = 2;

/// Builder for an MDict 2.0 `.mdx` file.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    title: String,
    description: String,
    encoding: &'static Encoding,
    compression: CompressionType,
    encrypt_key_index: bool,
    record_key: Option<[u8; 16]>,
    entries_per_block: usize,
    stylesheet: Vec<(u8, String, String)>,
    entries: Vec<(String, String)>,
}

impl ArchiveWriter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            encoding: encoding_rs::UTF_8,
            compression: CompressionType::Zlib,
            encrypt_key_index: false,
            record_key: None,
            entries_per_block: 64,
            stylesheet: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// `None` or `Zlib`; LZO is rejected when the archive is written.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn encrypt_key_index(mut self, encrypt: bool) -> Self {
        self.encrypt_key_index = encrypt;
        self
    }

    /// Encrypts record blocks and the key block info with Salsa20/8 under
    /// `master_key`. Readers then need the matching passcode, see
    /// [`crypto::registration_code`].
    pub fn encrypt_records(mut self, master_key: [u8; 16]) -> Self {
        self.record_key = Some(master_key);
        self
    }

    /// Entries per key block and per record block (at least 1).
    pub fn entries_per_block(mut self, entries: usize) -> Self {
        self.entries_per_block = entries.max(1);
        self
    }

    /// Adds a stylesheet rule applied to `` `id` `` markers in records.
    pub fn style(mut self, id: u8, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.stylesheet.push((id, open.into(), close.into()));
        self
    }

    /// Appends an entry; its position becomes its `EntryKey`.
    pub fn add(&mut self, headword: impl Into<String>, record: impl Into<String>) -> &mut Self {
        self.entries.push((headword.into(), record.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path.as_ref(), bytes)?;
        debug!(
            "Wrote archive '{}' with {} entries to {}",
            self.title,
            self.entries.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Serializes the whole archive.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_header(&mut out)?;

        let records: Vec<Vec<u8>> = self
            .entries
            .iter()
            .map(|(_, record)| self.encode_terminated(record))
            .collect();
        let mut offsets = Vec::with_capacity(records.len());
        let mut offset = 0u64;
        for record in &records {
            offsets.push(offset);
            offset += record.len() as u64;
        }

        self.write_key_section(&mut out, &offsets)?;
        self.write_record_section(&mut out, &records)?;
        Ok(out)
    }

    fn write_header(&self, out: &mut Vec<u8>) -> Result<()> {
        let encoding_label = if self.encoding == UTF_16LE {
            "UTF-16"
        } else {
            self.encoding.name()
        };
        let stylesheet: String = self
            .stylesheet
            .iter()
            .map(|(id, open, close)| format!("{}\n{}\n{}\n", id, open, close))
            .collect();
        let xml = format!(
            "<Dictionary GeneratedByEngineVersion=\"2.0\" RequiredEngineVersion=\"2.0\" \
             Encrypted=\"{}\" Encoding=\"{}\" Format=\"Html\" Title=\"{}\" \
             Description=\"{}\" StyleSheet=\"{}\"/>\r\n\0",
            self.encryption_flags(),
            encoding_label,
            escape(self.title.as_str()),
            escape(self.description.as_str()),
            escape(stylesheet.as_str()),
        );
        let header_bytes = utf16le(&xml);

        out.write_u32::<BigEndian>(header_bytes.len() as u32)?;
        out.extend_from_slice(&header_bytes);
        out.write_u32::<LittleEndian>(adler32_slice(&header_bytes))?;
        Ok(())
    }

    fn write_key_section(&self, out: &mut Vec<u8>, offsets: &[u64]) -> Result<()> {
        let mut index = Vec::new();
        let mut blocks = Vec::new();

        for (chunk_index, chunk) in self.entries.chunks(self.entries_per_block).enumerate() {
            let base = chunk_index * self.entries_per_block;
            let mut plain = Vec::new();
            for (position, (headword, _)) in chunk.iter().enumerate() {
                plain.write_u64::<BigEndian>(offsets[base + position])?;
                plain.extend(self.encode_terminated(headword));
            }
            let block = self.encode_block(&plain, None)?;

            index.write_u64::<BigEndian>(chunk.len() as u64)?;
            let first = &chunk[0].0;
            let last = &chunk[chunk.len() - 1].0;
            for text in [first, last] {
                let encoded = self.encode(text);
                let units = encoded.len() / self.unit_width();
                index.write_u16::<BigEndian>(units as u16)?;
                index.extend(encoded);
                index.extend(std::iter::repeat(0u8).take(self.unit_width()));
            }
            index.write_u64::<BigEndian>(block.len() as u64)?;
            index.write_u64::<BigEndian>(plain.len() as u64)?;
            blocks.push(block);
        }

        let mut key_index = Vec::new();
        key_index.write_u32::<LittleEndian>(self.compression.code() as u32)?;
        key_index.write_u32::<BigEndian>(adler32_slice(&index))?;
        let mut payload = compression::compress_payload(&index, self.compression)?;
        if self.encrypt_key_index {
            let key = crypto::derive_key_for_v2_index(&key_index);
            crypto::fast_encrypt(&mut payload, &key);
        }
        key_index.extend(payload);

        let key_blocks_len: usize = blocks.iter().map(Vec::len).sum();
        let mut info = Vec::with_capacity(40);
        info.write_u64::<BigEndian>(blocks.len() as u64)?;
        info.write_u64::<BigEndian>(self.entries.len() as u64)?;
        info.write_u64::<BigEndian>(index.len() as u64)?;
        info.write_u64::<BigEndian>(key_index.len() as u64)?;
        info.write_u64::<BigEndian>(key_blocks_len as u64)?;

        let checksum = adler32_slice(&info);
        if let Some(master_key) = &self.record_key {
            crypto::salsa_decrypt(&mut info, master_key);
        }
        out.extend_from_slice(&info);
        out.write_u32::<BigEndian>(checksum)?;
        out.extend(key_index);
        for block in blocks {
            out.extend(block);
        }
        Ok(())
    }

    fn write_record_section(&self, out: &mut Vec<u8>, records: &[Vec<u8>]) -> Result<()> {
        let mut sizes = Vec::new();
        let mut blocks = Vec::new();
        for chunk in records.chunks(self.entries_per_block) {
            let plain = chunk.concat();
            let block = self.encode_block(&plain, self.record_key.as_ref())?;
            sizes.push((block.len() as u64, plain.len() as u64));
            blocks.push(block);
        }

        let blocks_len: usize = blocks.iter().map(Vec::len).sum();
        out.write_u64::<BigEndian>(blocks.len() as u64)?;
        out.write_u64::<BigEndian>(records.len() as u64)?;
        out.write_u64::<BigEndian>(sizes.len() as u64 * 16)?;
        out.write_u64::<BigEndian>(blocks_len as u64)?;
        for (compressed, decompressed) in sizes {
            out.write_u64::<BigEndian>(compressed)?;
            out.write_u64::<BigEndian>(decompressed)?;
        }
        for block in blocks {
            out.extend(block);
        }
        Ok(())
    }

    /// `[u32 LE info][u32 BE Adler32 of plain][payload]`. With a key, the
    /// first 255 payload bytes are Salsa20/8 encrypted and the info word
    /// records that length.
    fn encode_block(&self, plain: &[u8], key: Option<&[u8; 16]>) -> Result<Vec<u8>> {
        if self.compression == CompressionType::Lzo {
            return Err(DictError::InvalidFormat(
                "LZO compression is not supported when writing".to_string(),
            ));
        }
        let mut payload = compression::compress_payload(plain, self.compression)?;
        let mut info = self.compression.code() as u32;
        if let Some(key) = key {
            let encrypted_len = payload.len().min(0xFF);
            crypto::salsa_decrypt(&mut payload[..encrypted_len], key);
            info |= (SALSA20_CODE << 4) | ((encrypted_len as u32) << 8);
        }

        let mut block = Vec::with_capacity(payload.len() + 8);
        block.write_u32::<LittleEndian>(info)?;
        block.write_u32::<BigEndian>(adler32_slice(plain))?;
        block.extend(payload);
        Ok(block)
    }

    /// Header `Encrypted` attribute: bit 0 for record blocks, bit 1 for the key index.
    fn encryption_flags(&self) -> u8 {
        let records = if self.record_key.is_some() { 1 } else { 0 };
        let key_index = if self.encrypt_key_index { 2 } else { 0 };
        records | key_index
    }

    fn unit_width(&self) -> usize {
        if self.encoding == UTF_16LE {
            2
        } else {
            1
        }
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        if self.encoding == UTF_16LE {
            utf16le(text)
        } else {
            self.encoding.encode(text).0.into_owned()
        }
    }

    fn encode_terminated(&self, text: &str) -> Vec<u8> {
        let mut bytes = self.encode(text);
        bytes.extend(std::iter::repeat(0u8).take(self.unit_width()));
        bytes
    }
}

// encoding_rs only decodes UTF-16.
fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}
