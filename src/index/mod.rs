//! The search index: headword table, n-gram table and posting lists.
//!
//! An [`Index`] is built once from an archive ([`build`]) or loaded from
//! disk ([`persist::load`]) and is read-only afterwards.

pub mod builder;
pub mod ngram;
pub mod persist;

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::types::models::EntryKey;

pub use builder::{build, BuildOptions, BuildSummary};
pub use ngram::NgramIndex;

/// Relative weights of the fields an entry is indexed under.
///
/// Recorded in the index header; changing them invalidates persisted indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    /// Headword and headword tokens.
    pub headword: u32,
    /// Variant spellings.
    pub variant: u32,
    /// Part-of-speech tags.
    pub pos: u32,
    /// Per occurrence in the body.
    pub body: u32,
    /// Body occurrences counted per token and entry.
    pub body_cap: u32,
    /// Added to an Exact hit whose headword matches the query verbatim.
    pub exact_case_bonus: u32,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            headword: 100,
            variant: 80,
            pos: 20,
            body: 4,
            body_cap: 8,
            exact_case_bonus: 10,
        }
    }
}

/// One row of the sorted headword table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadwordSlot {
    /// Folded headword or variant spelling.
    pub form: String,
    pub key: EntryKey,
    pub weight: u32,
    /// The form is a variant spelling, not the headword itself.
    pub variant: bool,
}

/// The part of an entry a token was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextField {
    /// Headword and variant spellings.
    Headword,
    /// Parts of speech and definition text.
    Body,
}

/// One entry of a posting list, weighted per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub key: EntryKey,
    pub headword: u32,
    pub body: u32,
}

impl Posting {
    /// Weight within `field`, or over the whole entry for `None`.
    pub fn weight(&self, field: Option<TextField>) -> u32 {
        match field {
            None => self.headword.saturating_add(self.body),
            Some(TextField::Headword) => self.headword,
            Some(TextField::Body) => self.body,
        }
    }
}

/// Provenance and parameters of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    /// xxHash64 of the archive the index was built from.
    pub archive_checksum: u64,
    pub archive_size: u64,
    /// Archive modification time, used as the build stamp.
    pub archive_modified: u64,
    pub entry_count: u32,
    pub skipped: u32,
    pub weights: RankingWeights,
}

/// The searchable structures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBody {
    /// Headword of every TOC entry, by key.
    pub headwords: Vec<String>,
    /// Sorted by `(form, key)`.
    pub slots: Vec<HeadwordSlot>,
    pub ngrams: NgramIndex,
    /// Token → postings sorted by key.
    pub postings: BTreeMap<String, Vec<Posting>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub header: IndexHeader,
    pub body: IndexBody,
}

impl Index {
    pub fn entry_count(&self) -> usize {
        self.header.entry_count as usize
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.header.weights
    }

    pub fn headword(&self, key: EntryKey) -> Option<&str> {
        self.body.headwords.get(key.index()).map(String::as_str)
    }

    pub fn slots(&self) -> &[HeadwordSlot] {
        &self.body.slots
    }

    /// Slots whose form equals `form`.
    pub fn slots_for(&self, form: &str) -> &[HeadwordSlot] {
        let slots = &self.body.slots;
        let start = slots.partition_point(|slot| slot.form.as_str() < form);
        let end = start + slots[start..].partition_point(|slot| slot.form == form);
        &slots[start..end]
    }

    /// Slots whose form starts with `prefix`, in table order.
    pub fn slots_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a HeadwordSlot> + 'a {
        let slots = &self.body.slots;
        let start = slots.partition_point(|slot| slot.form.as_str() < prefix);
        slots[start..]
            .iter()
            .take_while(move |slot| slot.form.starts_with(prefix))
    }

    pub fn ngrams(&self) -> &NgramIndex {
        &self.body.ngrams
    }

    pub fn postings(&self, token: &str) -> &[Posting] {
        self.body.postings.get(token).map_or(&[], Vec::as_slice)
    }

    /// Token dictionary range starting at `prefix`.
    pub fn tokens_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Vec<Posting>)> + 'a {
        self.body
            .postings
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(token, _)| token.starts_with(prefix))
    }

    /// Checks that every structure only refers to keys of the TOC.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        let count = self.entry_count();
        if self.body.headwords.len() != count {
            return Err(format!(
                "{} headwords for {} entries",
                self.body.headwords.len(),
                count
            ));
        }
        if let Some(slot) = self.body.slots.iter().find(|slot| slot.key.index() >= count) {
            return Err(format!("headword slot refers to unknown entry {}", slot.key));
        }
        if !self.body.slots.windows(2).all(|pair| {
            (pair[0].form.as_str(), pair[0].key) <= (pair[1].form.as_str(), pair[1].key)
        }) {
            return Err("headword table is not sorted".to_string());
        }
        for (token, postings) in &self.body.postings {
            if let Some(posting) = postings.iter().find(|p| p.key.index() >= count) {
                return Err(format!("posting for '{}' refers to unknown entry {}", token, posting.key));
            }
        }
        self.body.ngrams.validate()
    }
}
