mod common;

use std::fs;

use encoding_rs::{Encoding, GB18030, UTF_16LE, UTF_8};
use mdict_lookup::archive::models::CompressionType;
use mdict_lookup::archive::registration_code;
use mdict_lookup::entry;
use mdict_lookup::{
    Archive, ArchiveOptions, ArchiveWriter, DictError, Dictionary, DictionaryConfig, EntryKey, EntryKind, Passcode,
    QueryMode,
};

use common::{read_bytes, sample_archive, sample_writer, write_archive, SAMPLE_ENTRIES};

type ArchiveFixture = (&'static str, &'static Encoding, CompressionType, bool, usize);

/// Name, encoding, compression, encrypted key index, entries per block.
fn archive_fixtures() -> Vec<ArchiveFixture> {
    vec![
        ("utf8-zlib.mdx", UTF_8, CompressionType::Zlib, false, 4),
        ("utf8-plain.mdx", UTF_8, CompressionType::None, false, 3),
        ("utf8-encrypted.mdx", UTF_8, CompressionType::Zlib, true, 5),
        ("utf16-zlib.mdx", UTF_16LE, CompressionType::Zlib, false, 4),
        ("utf16-encrypted.mdx", UTF_16LE, CompressionType::None, true, 1),
    ]
}

fn assert_archive_fixture(fixture: &ArchiveFixture) {
    let (name, encoding, compression, encrypted, per_block) = *fixture;
    let dir = tempfile::tempdir().expect("temp dir");
    let writer = sample_writer()
        .encoding(encoding)
        .compression(compression)
        .encrypt_key_index(encrypted)
        .entries_per_block(per_block);
    let path = write_archive(dir.path(), name, &writer);

    let archive = Archive::open(&path, &ArchiveOptions::default())
        .unwrap_or_else(|e| panic!("open {}: {}", name, e));
    assert_eq!(archive.len(), SAMPLE_ENTRIES.len(), "entry count mismatch in {}", name);
    assert_eq!(archive.title(), "Sample Dictionary");
    assert_eq!(archive.description(), Some("Fixture for lookup tests"));

    for win in archive.toc().windows(2) {
        assert!(
            win[0].record_offset < win[1].record_offset,
            "non-monotonic offset in {}",
            name
        );
    }

    let format = archive.record_format();
    let sequential: Vec<_> = archive
        .blocks()
        .map(|r| r.unwrap_or_else(|e| panic!("block in {}: {}", name, e)))
        .collect();
    assert_eq!(sequential.len(), SAMPLE_ENTRIES.len());

    for (position, (headword, record)) in SAMPLE_ENTRIES.iter().enumerate() {
        let key = EntryKey(position as u32);
        let raw = archive
            .read(key)
            .unwrap_or_else(|e| panic!("read {} in {}: {}", headword, name, e));
        assert_eq!(raw.headword, *headword, "headword mismatch at {} in {}", key, name);
        assert_eq!(raw.bytes, sequential[position].bytes, "random and sequential reads differ in {}", name);

        let (text, _) = format.encoding.decode_without_bom_handling(&raw.bytes);
        assert_eq!(text.trim_end_matches('\0'), *record, "record mismatch for {} in {}", headword, name);
    }
}

#[test]
fn archive_fixtures_read_back() {
    for fixture in &archive_fixtures() {
        assert_archive_fixture(fixture);
    }
}

#[test]
fn legacy_chinese_encoding_is_decoded() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut writer = ArchiveWriter::new("中文词典").encoding(GB18030).entries_per_block(2);
    writer.add("测试", "测试的意思");
    writer.add("跳转", "@@@LINK=测试");
    writer.add("LatinMix", "纯ASCII键");
    let path = write_archive(dir.path(), "gbk.mdx", &writer);

    let archive = Archive::open(&path, &ArchiveOptions::default()).expect("open gbk archive");
    let headwords: Vec<&str> = archive.toc().iter().map(|e| e.headword.as_str()).collect();
    assert_eq!(headwords, vec!["测试", "跳转", "LatinMix"]);
    assert_eq!(archive.title(), "中文词典");

    let format = archive.record_format();
    let redirect = entry::parse(&archive.read(EntryKey(1)).expect("read redirect"), &format)
        .expect("parse redirect");
    assert_eq!(redirect.kind, EntryKind::Redirect);
    assert_eq!(redirect.cross_refs, vec!["测试"]);
}

#[test]
fn encoding_override_replaces_header_encoding() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut writer = ArchiveWriter::new("Latin").encoding(encoding_rs::WINDOWS_1252);
    writer.add("naïve", "naïve record");
    let path = write_archive(dir.path(), "latin.mdx", &writer);

    let declared = Archive::open(&path, &ArchiveOptions::default()).expect("open latin archive");
    assert_eq!(declared.toc()[0].headword, "naïve");

    let options = ArchiveOptions {
        encoding: Some("UTF-8".to_string()),
        ..Default::default()
    };
    let overridden = Archive::open(&path, &options).expect("open with override");
    assert_ne!(overridden.toc()[0].headword, "naïve");
    assert_eq!(overridden.record_format().encoding, UTF_8);
}

#[test]
fn stylesheet_is_applied_to_records() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut writer = ArchiveWriter::new("Styled")
        .style(1, "<b>", "</b>")
        .style(2, r#"<span class="pos">"#, "</span>");
    writer.add("style-demo", "`1`bold span`2`noun`3`plain");
    let path = write_archive(dir.path(), "styled.mdx", &writer);

    let archive = Archive::open(&path, &ArchiveOptions::default()).expect("open styled archive");
    let record = entry::parse(&archive.read(EntryKey(0)).expect("read"), &archive.record_format())
        .expect("parse styled entry");
    assert_eq!(record.markup, r#"<b>bold span</b><span class="pos">noun</span>plain"#);
    assert!(!record.markup.contains('`'));
    assert!(record.parts_of_speech.contains("noun"));
}

#[test]
fn missing_archive_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.mdx");
    match Archive::open(&path, &ArchiveOptions::default()) {
        Err(DictError::ArchiveNotFound(reported)) => assert_eq!(reported, path),
        other => panic!("expected ArchiveNotFound, got {:?}", other.map(|a| a.len())),
    }
}

#[test]
fn truncation_after_header_is_corrupt() {
    let (dir, path) = sample_archive();
    let bytes = read_bytes(&path);
    let header_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

    // right after the header, inside the key section and inside the record blocks
    for cut in [4 + header_len + 4, 4 + header_len + 30, bytes.len() - 5] {
        let truncated = dir.path().join(format!("truncated-{}.mdx", cut));
        fs::write(&truncated, &bytes[..cut]).expect("write truncated archive");
        match Archive::open(&truncated, &ArchiveOptions::default()) {
            Err(DictError::ArchiveCorrupt(_)) => {}
            other => panic!("cut at {}: expected ArchiveCorrupt, got {:?}", cut, other.map(|a| a.len())),
        }
    }
}

#[test]
fn damaged_header_is_corrupt() {
    let (dir, path) = sample_archive();
    let mut bytes = read_bytes(&path);
    bytes[10] ^= 0x20;
    let damaged = dir.path().join("damaged.mdx");
    fs::write(&damaged, &bytes).expect("write damaged archive");
    assert!(matches!(
        Archive::open(&damaged, &ArchiveOptions::default()),
        Err(DictError::ArchiveCorrupt(_))
    ));
}

#[test]
fn damaged_record_block_fails_only_its_entries() {
    let dir = tempfile::tempdir().expect("temp dir");
    let writer = sample_writer().compression(CompressionType::None).entries_per_block(4);
    let path = write_archive(dir.path(), "plain.mdx", &writer);
    let mut bytes = read_bytes(&path);
    // the final NUL of the last record, inside the last record block
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).expect("write damaged archive");

    let archive = Archive::open(&path, &ArchiveOptions::default()).expect("open despite damaged block");
    assert!(archive.read(EntryKey(0)).is_ok());
    assert!(matches!(archive.read(EntryKey(14)), Err(DictError::EntryMissing(EntryKey(14)))));
    assert!(matches!(archive.read(EntryKey(99)), Err(DictError::EntryMissing(EntryKey(99)))));

    let failures: Vec<EntryKey> = archive
        .blocks()
        .filter_map(|r| match r {
            Err(DictError::EntryMissing(key)) => Some(key),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![EntryKey(12), EntryKey(13), EntryKey(14)]);
}

#[test]
fn checksum_tracks_content() {
    let (dir, path) = sample_archive();
    let first = Archive::open(&path, &ArchiveOptions::default()).expect("open");
    let again = Archive::open(&path, &ArchiveOptions::default()).expect("reopen");
    assert_eq!(first.checksum(), again.checksum());

    let mut writer = sample_writer();
    writer.add("zebra", "a striped animal");
    let changed = write_archive(dir.path(), "changed.mdx", &writer);
    let other = Archive::open(&changed, &ArchiveOptions::default()).expect("open changed");
    assert_ne!(first.checksum(), other.checksum());
}

/// Byte offset of the record section preamble (blocks, entries, index length).
fn record_section_start(bytes: &[u8], blocks: u64, entries: u64) -> usize {
    let mut preamble = Vec::new();
    for value in [blocks, entries, blocks * 16] {
        preamble.extend_from_slice(&value.to_be_bytes());
    }
    bytes
        .windows(preamble.len())
        .rposition(|window| window == preamble.as_slice())
        .expect("record section preamble")
}

#[test]
fn implausible_record_block_sizes_are_corrupt() {
    let (dir, path) = sample_archive();
    let bytes = read_bytes(&path);
    let start = record_section_start(&bytes, 4, SAMPLE_ENTRIES.len() as u64);
    let first_compressed = start + 32;
    let first_decompressed = start + 40;

    for (name, offset, value) in [
        ("huge-decompressed.mdx", first_decompressed, 1u64 << 63),
        ("huge-compressed.mdx", first_compressed, u64::MAX - 8),
        ("oversized-block.mdx", first_decompressed, 512 * 1024 * 1024),
    ] {
        let mut patched = bytes.clone();
        patched[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
        let damaged = dir.path().join(name);
        fs::write(&damaged, &patched).expect("write patched archive");

        match Archive::open(&damaged, &ArchiveOptions::default()) {
            Err(DictError::ArchiveCorrupt(_)) => {}
            other => panic!("{}: expected ArchiveCorrupt, got {:?}", name, other.map(|a| a.len())),
        }
        let opened = mdict_lookup::Dictionary::open(mdict_lookup::DictionaryConfig::new(&damaged));
        assert!(matches!(opened, Err(DictError::ArchiveCorrupt(_))), "{}", name);
    }
}

#[test]
fn iteration_can_start_mid_archive() {
    let (_dir, path) = sample_archive();
    let archive = Archive::open(&path, &ArchiveOptions::default()).expect("open");

    let tail: Vec<_> = archive
        .blocks_from(EntryKey(10))
        .map(|r| r.expect("block").headword)
        .collect();
    let expected: Vec<String> = SAMPLE_ENTRIES[10..].iter().map(|(h, _)| h.to_string()).collect();
    assert_eq!(tail, expected);
    assert_eq!(archive.blocks_from(EntryKey(13)).len(), 2);
    assert_eq!(archive.blocks_from(EntryKey(99)).count(), 0);
}

#[test]
fn encrypted_records_need_the_passcode() {
    let dir = tempfile::tempdir().expect("temp dir");
    let master_key = *b"sample master ke";
    let email = "reader@example.com";
    let regcode = hex::encode(registration_code(&master_key, email.as_bytes()));
    let writer = sample_writer().encrypt_records(master_key).encrypt_key_index(true);
    let path = write_archive(dir.path(), "locked.mdx", &writer);

    let unlocked = ArchiveOptions {
        passcode: Some((regcode.clone(), email.to_string())),
        ..Default::default()
    };
    let archive = Archive::open(&path, &unlocked).expect("open with passcode");
    let format = archive.record_format();
    for (position, (headword, record)) in SAMPLE_ENTRIES.iter().enumerate() {
        let raw = archive.read(EntryKey(position as u32)).expect("read encrypted record");
        let (text, _) = format.encoding.decode_without_bom_handling(&raw.bytes);
        assert_eq!(text.trim_end_matches('\0'), *record, "record mismatch for {}", headword);
    }

    assert!(matches!(
        Archive::open(&path, &ArchiveOptions::default()),
        Err(DictError::PasscodeRequired)
    ));
    let wrong_email = ArchiveOptions {
        passcode: Some((regcode.clone(), "someone@example.com".to_string())),
        ..Default::default()
    };
    assert!(matches!(Archive::open(&path, &wrong_email), Err(DictError::ArchiveCorrupt(_))));

    let mut config = DictionaryConfig::new(&path);
    config.passcode = Some(Passcode {
        regcode,
        email: email.to_string(),
    });
    let dict = Dictionary::open(config).expect("open dictionary with passcode");
    assert_eq!(dict.query("colour", QueryMode::Exact).headwords(), vec!["colour"]);
}
