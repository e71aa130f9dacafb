//! One-pass index construction over an archive.
//!
//! Entries are read sequentially, parsed in parallel batches and merged in
//! archive order, so the result does not depend on thread scheduling.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use super::{HeadwordSlot, Index, IndexBody, IndexHeader, NgramIndex, Posting, RankingWeights, TextField};
use crate::archive::Archive;
use crate::entry::{self, normalize, EntryRecord};
use crate::types::error::Result;
use crate::types::models::RawBlock;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub weights: RankingWeights,
    /// Entries parsed per parallel batch.
    pub batch_size: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            weights: RankingWeights::default(),
            batch_size: 1024,
        }
    }
}

/// Outcome of a build: entries indexed and entries skipped as missing or malformed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub indexed: usize,
    pub skipped: usize,
}

/// Builds the index for every entry of `archive`.
///
/// Unreadable and malformed entries are logged and counted, never fatal.
pub fn build(archive: &Archive, options: &BuildOptions) -> (Index, BuildSummary) {
    let started = Instant::now();
    let format = archive.record_format();
    let batch_size = options.batch_size.max(1);
    let mut accumulator = Accumulator::new(archive, options.weights);
    let mut summary = BuildSummary::default();

    let mut blocks = archive.blocks();
    loop {
        let batch: Vec<Result<RawBlock>> = blocks.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        let parsed: Vec<Result<EntryRecord>> = batch
            .into_par_iter()
            .map(|raw| raw.and_then(|raw| entry::parse(&raw, &format)))
            .collect();

        for result in parsed {
            match result {
                Ok(record) => {
                    accumulator.add(&record);
                    summary.indexed += 1;
                }
                Err(e) => {
                    warn!("Skipping entry: {}", e);
                    summary.skipped += 1;
                }
            }
        }
        debug!("Indexed {} of {} entries", summary.indexed + summary.skipped, archive.len());
    }

    let index = accumulator.finish(archive, summary);
    info!(
        "Index built in {:.2?}: {} entries indexed, {} skipped, {} headword slots, {} tokens",
        started.elapsed(),
        summary.indexed,
        summary.skipped,
        index.body.slots.len(),
        index.body.postings.len()
    );
    (index, summary)
}

struct Accumulator {
    weights: RankingWeights,
    headwords: Vec<String>,
    slots: Vec<HeadwordSlot>,
    postings: BTreeMap<String, Vec<Posting>>,
}

impl Accumulator {
    fn new(archive: &Archive, weights: RankingWeights) -> Self {
        Self {
            weights,
            headwords: archive.toc().iter().map(|entry| entry.headword.trim().to_string()).collect(),
            slots: Vec::new(),
            postings: BTreeMap::new(),
        }
    }

    /// Must be called in ascending key order, so posting lists stay sorted.
    fn add(&mut self, record: &EntryRecord) {
        let weights = self.weights;
        self.headwords[record.key.index()] = record.headword.clone();

        let folded = &record.forms.folded;
        self.slots.push(HeadwordSlot {
            form: folded.clone(),
            key: record.key,
            weight: weights.headword,
            variant: false,
        });
        let variant_forms: BTreeSet<String> = record
            .variants
            .iter()
            .map(|variant| normalize::fold(variant))
            .filter(|form| !form.is_empty() && form != folded)
            .collect();
        for form in variant_forms {
            self.slots.push(HeadwordSlot {
                form,
                key: record.key,
                weight: weights.variant,
                variant: true,
            });
        }

        for (token, posting) in token_weights(record, &weights) {
            self.postings.entry(token).or_default().push(posting);
        }
    }

    fn finish(mut self, archive: &Archive, summary: BuildSummary) -> Index {
        self.slots.sort_by(|a, b| (a.form.as_str(), a.key).cmp(&(b.form.as_str(), b.key)));

        let mut forms: Vec<String> = self
            .slots
            .iter()
            .filter(|slot| !slot.variant)
            .map(|slot| slot.form.clone())
            .collect();
        forms.dedup();

        Index {
            header: IndexHeader {
                archive_checksum: archive.checksum(),
                archive_size: archive.file_len(),
                archive_modified: archive.modified(),
                entry_count: archive.len() as u32,
                skipped: summary.skipped as u32,
                weights: self.weights,
            },
            body: IndexBody {
                headwords: self.headwords,
                slots: self.slots,
                ngrams: NgramIndex::build(forms),
                postings: self.postings,
            },
        }
    }
}

/// Posting of every token of an entry. Weights saturate instead of overflowing.
fn token_weights(record: &EntryRecord, weights: &RankingWeights) -> BTreeMap<String, Posting> {
    let mut result: BTreeMap<String, Posting> = BTreeMap::new();
    let mut add = |token: String, field: TextField, weight: u32| {
        let posting = result.entry(token).or_insert(Posting {
            key: record.key,
            headword: 0,
            body: 0,
        });
        let slot = match field {
            TextField::Headword => &mut posting.headword,
            TextField::Body => &mut posting.body,
        };
        *slot = slot.saturating_add(weight);
    };

    let headword_tokens: BTreeSet<String> = record.forms.tokens.iter().cloned().collect();
    for token in headword_tokens {
        add(token, TextField::Headword, weights.headword);
    }
    let variant_tokens: BTreeSet<String> = record.variants.iter().flat_map(|v| normalize::tokenize(v)).collect();
    for token in variant_tokens {
        add(token, TextField::Headword, weights.variant);
    }
    let pos_tokens: BTreeSet<String> = record
        .parts_of_speech
        .iter()
        .flat_map(|p| normalize::tokenize(p))
        .collect();
    for token in pos_tokens {
        add(token, TextField::Body, weights.pos);
    }

    let mut body_counts: BTreeMap<String, u32> = BTreeMap::new();
    for token in normalize::tokenize(&record.body) {
        *body_counts.entry(token).or_default() += 1;
    }
    for (token, count) in body_counts {
        add(token, TextField::Body, weights.body.saturating_mul(count.min(weights.body_cap)));
    }
    result
}
