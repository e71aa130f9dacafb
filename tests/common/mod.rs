#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use mdict_lookup::{ArchiveWriter, Dictionary, DictionaryConfig};
use tempfile::TempDir;

/// Headword and record of every sample entry, in archive order.
pub const SAMPLE_ENTRIES: &[(&str, &str)] = &[
    (
        "run",
        r#"<b>run</b> <span class="pos">verb</span> <span class="sensenum">1</span> move swiftly on foot <span class="sensenum">2</span> manage or operate, see <a href="entry://operate">operate</a>"#,
    ),
    ("runner", r#"<span class="pos">noun</span> a person who runs; a fast runner"#),
    ("the", r#"<span class="pos">determiner</span> definite article"#),
    ("then", r#"<span class="pos">adverb</span> at that time"#),
    ("tea", r#"<span class="pos">noun</span> a hot drink made from leaves"#),
    ("cat", r#"<span class="pos">noun</span> a small domesticated animal"#),
    ("car", r#"<span class="pos">noun</span> a road vehicle"#),
    ("Cape", r#"<span class="pos">noun</span> a headland; a sleeveless cloak"#),
    ("café", r#"<span class="pos">noun</span> a small restaurant, also <i class="variant">caff</i>"#),
    (
        "colour",
        r#"<span class="pos">noun</span> <span class="orthvar">color</span> the property of reflecting light"#,
    ),
    ("operate", r#"<span class="pos">verb</span> to run a machine"#),
    ("ran", "@@@LINK=run"),
    ("kick the bucket", "<i>idiom</i> to die"),
    ("dog", r#"<span class="pos">noun</span> a domesticated animal that barks"#),
    ("scan", r#"<span class="pos">verb</span> look at all parts carefully"#),
];

pub fn key_of(headword: &str) -> u32 {
    SAMPLE_ENTRIES
        .iter()
        .position(|(h, _)| *h == headword)
        .unwrap_or_else(|| panic!("no sample entry {}", headword)) as u32
}

pub fn sample_writer() -> ArchiveWriter {
    let mut writer = ArchiveWriter::new("Sample Dictionary")
        .description("Fixture for lookup tests")
        .entries_per_block(4);
    for (headword, record) in SAMPLE_ENTRIES {
        writer.add(*headword, *record);
    }
    writer
}

pub fn write_archive(dir: &Path, name: &str, writer: &ArchiveWriter) -> PathBuf {
    let path = dir.join(name);
    writer
        .write_to(&path)
        .unwrap_or_else(|e| panic!("failed to write {}: {}", path.display(), e));
    path
}

/// A temp dir holding `sample.mdx`.
pub fn sample_archive() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_archive(dir.path(), "sample.mdx", &sample_writer());
    (dir, path)
}

pub fn open_dictionary(config: DictionaryConfig) -> Dictionary {
    let path = config.archive_path.clone();
    Dictionary::open(config).unwrap_or_else(|e| panic!("failed to open {}: {}", path.display(), e))
}

pub fn read_bytes(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e))
}
