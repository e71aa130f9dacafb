//! MDict file header parsing and encryption key derivation.
//!
//! This module handles:
//! - Validating the header checksum and root element (the file signature)
//! - Extracting metadata (title, encoding, encryption flags, stylesheet)
//! - Deriving the master decryption key from a passcode

use std::collections::HashMap;
use std::io::Read;

use adler2::adler32_slice;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use encoding_rs::UTF_16LE;
use log::{debug, info, trace};
use quick_xml::{events::Event, Reader};

use crate::archive::codec::crypto;
use crate::archive::models::{
    EncryptionFlags, MasterKey, MdictEncoding, MdictHeader, MdictMetadata, MdictVersion, Stylesheet,
};
use crate::archive::utils;
use crate::types::error::{DictError, Result};

/// Upper bound for the XML header; anything larger is a damaged length field.
const MAX_HEADER_LEN: u32 = 16 * 1024 * 1024;

/// Root elements written by MDict compilers.
const ROOT_ELEMENTS: &[&str] = &["Dictionary", "Library_Data"];

/// Parses the MDict file header from the beginning of the file.
///
/// # Header Structure
/// ```text
/// [4 bytes] Header length (big-endian u32)
/// [N bytes] XML metadata (UTF-16LE, NUL terminated)
/// [4 bytes] Adler32 checksum (little-endian u32)
/// ```
///
/// # Parameters
/// * `file` - Reader positioned at the start of an MDict file
/// * `passcode` - Optional `(regcode_hex, user_email)` for encrypted files
pub fn parse<R: Read>(file: &mut R, passcode: Option<(&str, &str)>) -> Result<MdictHeader> {
    info!("Parsing MDict header");

    let header_len = file.read_u32::<BigEndian>()?;
    trace!("Header length: {} bytes", header_len);
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(DictError::InvalidFormat(format!(
            "Implausible header length: {} bytes",
            header_len
        )));
    }

    let mut header_bytes = vec![0u8; header_len as usize];
    file.read_exact(&mut header_bytes)?;

    let checksum_expected = file.read_u32::<LittleEndian>()?;
    let checksum_actual = adler32_slice(header_bytes.as_slice());
    trace!("Header checksum: expected={:#010x}, actual={:#010x}", checksum_expected, checksum_actual);
    if checksum_actual != checksum_expected {
        return Err(DictError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
        });
    }

    let (decoded_header, _, _) = UTF_16LE.decode(&header_bytes);

    // Drop control characters (including the trailing NUL) except whitespace
    let sanitized_header: String = decoded_header
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();

    let (root, attrs) = parse_xml_attributes(&sanitized_header)?;
    if !ROOT_ELEMENTS.contains(&root.as_str()) {
        return Err(DictError::InvalidFormat(format!(
            "Unexpected header root element <{}>",
            root
        )));
    }

    let (version, encoding, encryption_flags, metadata) = build_header_from_attributes(&attrs)?;
    let master_key = try_derive_master_key(passcode)?;

    info!(
        "Header parsed successfully: version={}, title='{}', encoding={}, encrypted=(blocks={}, index={})",
        metadata.engine_version,
        metadata.title,
        encoding.name(),
        encryption_flags.encrypt_record_blocks,
        encryption_flags.encrypt_key_index
    );

    Ok(MdictHeader {
        version,
        encoding,
        encryption_flags,
        master_key,
        metadata,
    })
}

/// Extracts the root element name and all of its attributes.
///
/// The MDict header is a single XML element with all metadata as attributes.
fn parse_xml_attributes(xml: &str) -> Result<(String, HashMap<String, String>)> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let root = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attrs = e
                    .attributes()
                    .map(|attr_result| {
                        let attr = attr_result.map_err(|e| {
                            DictError::InvalidFormat(format!("Failed to parse XML attribute: {}", e))
                        })?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map_err(|e| {
                                DictError::InvalidFormat(format!("Failed to decode XML value: {}", e))
                            })?
                            .into_owned();
                        Ok((key, value))
                    })
                    .collect::<Result<HashMap<_, _>>>()?;
                return Ok((root, attrs));
            }
            Ok(Event::Eof) => {
                return Err(DictError::InvalidFormat(
                    "No root element found in header XML".to_string(),
                ))
            }
            Err(e) => {
                return Err(DictError::InvalidFormat(format!(
                    "Failed to read header XML: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Constructs header components from parsed XML attributes.
///
/// Applies defaults for missing optional fields.
fn build_header_from_attributes(
    attrs: &HashMap<String, String>,
) -> Result<(MdictVersion, MdictEncoding, EncryptionFlags, MdictMetadata)> {
    let version_str = attrs
        .get("GeneratedByEngineVersion")
        .map(String::as_str)
        .unwrap_or("1.0");
    let version_f32: f32 = version_str.trim().parse().map_err(|e| {
        DictError::InvalidFormat(format!("Could not parse 'GeneratedByEngineVersion': {}", e))
    })?;
    let version = MdictVersion::try_from(version_f32)?;
    debug!("MDict version: {} (parsed as {:?})", version_str, version);

    let encoding = attrs
        .get("Encoding")
        .filter(|s| !s.trim().is_empty())
        .map(|s| utils::parse_encoding(s))
        .unwrap_or(encoding_rs::UTF_8);
    debug!("Text encoding: {}", encoding.name());

    // "Encrypted" is a bitmask; older compilers write "Yes"/"No"
    let encryption_flags = attrs
        .get("Encrypted")
        .map(|s| match s.trim() {
            "Yes" => 0x01,
            other => other.parse::<u8>().unwrap_or(0),
        })
        .map(|flag_val| {
            debug!("Encryption flags: {:#04x}", flag_val);
            EncryptionFlags {
                encrypt_record_blocks: (flag_val & 0x01) != 0,
                encrypt_key_index: (flag_val & 0x02) != 0,
            }
        })
        .unwrap_or_default();

    let title = attrs
        .get("Title")
        .cloned()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Untitled Dictionary".to_string());
    let description = attrs.get("Description").cloned();
    let stylesheet = attrs
        .get("StyleSheet")
        .map(|raw| parse_stylesheet(raw))
        .unwrap_or_default();

    let metadata = MdictMetadata {
        title,
        engine_version: version_str.to_string(),
        description,
        stylesheet,
    };

    Ok((version, encoding, encryption_flags, metadata))
}

/// Parses the `StyleSheet` attribute: repeating groups of three lines
/// (style id, opening markup, closing markup).
pub fn parse_stylesheet(raw: &str) -> Stylesheet {
    let lines: Vec<&str> = raw.lines().collect();
    let mut stylesheet = Stylesheet::new();
    for group in lines.chunks(3) {
        if let [id, open, close] = group {
            if let Ok(id) = id.trim().parse::<u8>() {
                stylesheet.insert(id, (open.to_string(), close.to_string()));
            }
        }
    }
    trace!("Parsed {} stylesheet entries", stylesheet.len());
    stylesheet
}

/// Derives the master decryption key from an explicit `(regcode_hex, user_email)` passcode.
fn try_derive_master_key(passcode: Option<(&str, &str)>) -> Result<MasterKey> {
    let Some((reg_code_hex, user_email)) = passcode else {
        return Ok(None);
    };

    info!("Deriving master decryption key from provided passcode");
    let reg_code = hex::decode(reg_code_hex.trim())
        .map_err(|e| DictError::DecryptionError(format!("Invalid regcode hex: {}", e)))?;
    if reg_code.len() != 16 {
        return Err(DictError::DecryptionError(
            "Registration code must be exactly 16 bytes (32 hex chars)".to_string(),
        ));
    }

    let master_key = crypto::derive_master_key(&reg_code, user_email.as_bytes())?;
    debug!("Master key derived successfully");
    Ok(Some(master_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stylesheet_groups_of_three() {
        let sheet = parse_stylesheet("1\n<b>\n</b>\n2\n<i>\n</i>\nbroken");
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet[&1], ("<b>".to_string(), "</b>".to_string()));
        assert_eq!(sheet[&2].1, "</i>");
    }

    #[test]
    fn root_and_attributes_are_extracted() {
        let xml = r#"<Dictionary GeneratedByEngineVersion="2.0" Encoding="GBK" Encrypted="2" Title="T &amp; D"/>"#;
        let (root, attrs) = parse_xml_attributes(xml).unwrap();
        assert_eq!(root, "Dictionary");
        let (version, encoding, flags, meta) = build_header_from_attributes(&attrs).unwrap();
        assert_eq!(version, MdictVersion::V2);
        assert_eq!(encoding, encoding_rs::GB18030);
        assert!(flags.encrypt_key_index && !flags.encrypt_record_blocks);
        assert_eq!(meta.title, "T & D");
    }

    #[test]
    fn version_three_is_rejected() {
        let mut attrs = HashMap::new();
        attrs.insert("GeneratedByEngineVersion".to_string(), "3.0".to_string());
        assert!(matches!(
            build_header_from_attributes(&attrs),
            Err(DictError::UnsupportedVersion(_))
        ));
    }
}
