//! # mdict-lookup
//!
//! Lookup core for MDict (`.mdx` 1.x/2.x) dictionaries: archive decoding,
//! entry parsing, a persisted search index and an exact/prefix/fuzzy/full-text
//! query engine with LRU caching.
//!
//! ```no_run
//! use mdict_lookup::{Dictionary, DictionaryConfig, QueryMode};
//!
//! let dict = Dictionary::open(DictionaryConfig::new("oald.mdx")).unwrap();
//! for hit in dict.query("run", QueryMode::Prefix).iter() {
//!     let entry = dict.fetch_entry(hit.key).unwrap();
//!     println!("{} ({:.1}): {}", hit.headword, hit.score, entry.body);
//! }
//! ```
pub mod archive;
pub mod cache;
pub mod config;
pub mod dictionary;
pub mod entry;
pub mod index;
pub mod query;
pub mod types;

// Re-export the main types for convenience
pub use archive::{writer::ArchiveWriter, Archive, ArchiveOptions, RecordFormat};
pub use cache::{CacheStats, DictCache};
pub use config::{DictionaryConfig, Passcode};
pub use dictionary::{Dictionary, IndexStatus, QueryHandle};
pub use entry::{EntryKind, EntryRecord, NormalizedForms, Sense};
pub use index::{BuildOptions, BuildSummary, Index, RankingWeights, TextField};
pub use query::{Hit, QueryMode, QueryResult};
pub use types::error::{DictError, Result};
pub use types::models::{EntryKey, RawBlock, TocEntry};
