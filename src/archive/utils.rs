//! Low-level byte reading utilities

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};

use crate::types::error::{DictError, Result};

/// Read a 4 or 8 byte big-endian number.
///
/// Width depends on format version (v1.x uses 4 bytes, v2.x uses 8 bytes).
pub fn read_number(reader: &mut impl Read, number_width: usize) -> Result<u64> {
    match number_width {
        8 => Ok(reader.read_u64::<BigEndian>()?),
        4 => Ok(reader.read_u32::<BigEndian>()? as u64),
        _ => Err(DictError::InvalidFormat(format!("Invalid number width: {}", number_width))),
    }
}

/// Read a 1 or 2 byte big-endian number.
///
/// Used for text length prefixes in the key index.
pub fn read_small_number(reader: &mut impl Read, number_width: usize) -> Result<u64> {
    match number_width {
        2 => Ok(reader.read_u16::<BigEndian>()? as u64),
        1 => Ok(reader.read_u8()? as u64),
        _ => Err(DictError::InvalidFormat(format!("Invalid small number width: {}", number_width))),
    }
}

/// Width in bytes of one text unit (and of the NUL terminator) for an encoding.
pub fn unit_width(encoding: &'static Encoding) -> usize {
    if encoding == UTF_16LE || encoding == UTF_16BE {
        2
    } else {
        1
    }
}

/// Resolves an encoding label, folding the legacy Chinese labels into GB18030.
///
/// Unknown labels fall back to UTF-8.
pub fn parse_encoding(label: &str) -> &'static Encoding {
    let label = label.trim();
    let label = if label.eq_ignore_ascii_case("GBK") || label.eq_ignore_ascii_case("GB2312") {
        "GB18030"
    } else {
        label
    };
    Encoding::for_label(label.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_version_dependent_widths() {
        let bytes = [0u8, 0, 0, 0, 0, 0, 1, 2];
        assert_eq!(read_number(&mut &bytes[..], 8).unwrap(), 0x0102);
        assert_eq!(read_number(&mut &bytes[4..], 4).unwrap(), 0x0102);
        assert_eq!(read_small_number(&mut &bytes[6..], 2).unwrap(), 0x0102);
        assert!(read_number(&mut &bytes[..], 3).is_err());
    }

    #[test]
    fn legacy_chinese_labels_map_to_gb18030() {
        assert_eq!(parse_encoding("GBK"), encoding_rs::GB18030);
        assert_eq!(parse_encoding("gb2312"), encoding_rs::GB18030);
        assert_eq!(parse_encoding("UTF-16"), UTF_16LE);
        assert_eq!(parse_encoding("no-such-label"), encoding_rs::UTF_8);
        assert_eq!(unit_width(UTF_16LE), 2);
        assert_eq!(unit_width(encoding_rs::UTF_8), 1);
    }
}
