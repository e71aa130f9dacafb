//! One [`MatchStrategy`] per [`QueryMode`](super::QueryMode).

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use regex::Regex;

use super::{Hit, Query};
use crate::index::{HeadwordSlot, Index, TextField};
use crate::types::models::EntryKey;

/// Produces unranked hits for a normalized query.
pub trait MatchStrategy {
    fn candidates(&self, index: &Index, query: &Query) -> Vec<Hit>;
}

fn hit(index: &Index, key: EntryKey, score: f32) -> Hit {
    Hit {
        key,
        headword: index.headword(key).unwrap_or("").to_string(),
        score,
    }
}

/// Folded query equals a folded headword or variant spelling.
///
/// Score: slot weight, plus the case bonus when the headword equals the
/// query verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl MatchStrategy for ExactMatch {
    fn candidates(&self, index: &Index, query: &Query) -> Vec<Hit> {
        let bonus = index.weights().exact_case_bonus as f32;
        index
            .slots_for(&query.folded)
            .iter()
            .map(|slot| {
                let mut score = slot.weight as f32;
                if index.headword(slot.key) == Some(query.text.as_str()) {
                    score += bonus;
                }
                hit(index, slot.key, score)
            })
            .collect()
    }
}

/// Folded headword starts with the folded query.
///
/// Score: `weight * query_len / headword_len`, so closer completions rank first.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixMatch;

impl MatchStrategy for PrefixMatch {
    fn candidates(&self, index: &Index, query: &Query) -> Vec<Hit> {
        let query_len = query.folded.chars().count() as f32;
        index
            .slots_with_prefix(&query.folded)
            .filter(|slot| !slot.variant)
            .map(|slot| {
                let form_len = slot.form.chars().count().max(1) as f32;
                hit(index, slot.key, slot.weight as f32 * query_len / form_len)
            })
            .collect()
    }
}

/// Folded headword within `max_distance` optimal-string-alignment edits.
///
/// Score: `max_distance - distance + 1 + weight / 1000`, i.e. by distance
/// ascending, then weight descending.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatch {
    pub max_distance: usize,
}

impl MatchStrategy for FuzzyMatch {
    fn candidates(&self, index: &Index, query: &Query) -> Vec<Hit> {
        let ngrams = index.ngrams();
        let positions = ngrams.candidates(&query.folded, self.max_distance);
        debug!(
            "Fuzzy '{}': {} candidates of {} forms",
            query.folded,
            positions.len(),
            ngrams.len()
        );

        let mut hits = Vec::new();
        for form in positions.into_iter().filter_map(|p| ngrams.form(p)) {
            let distance = strsim::osa_distance(&query.folded, form);
            if distance > self.max_distance {
                continue;
            }
            let closeness = self.max_distance as f32 - distance as f32 + 1.0;
            hits.extend(
                index
                    .slots_for(form)
                    .iter()
                    .filter(|slot| !slot.variant)
                    .map(|slot: &HeadwordSlot| hit(index, slot.key, closeness + slot.weight as f32 / 1000.0)),
            );
        }
        hits
    }
}

/// Entries sharing at least one token with the query.
///
/// Score: sum of matching posting weights over the number of distinct query
/// tokens. `*` and `?` inside a token match any run of characters and any
/// single character. With a `field`, only postings from that field count.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullTextMatch {
    pub field: Option<TextField>,
}

impl MatchStrategy for FullTextMatch {
    fn candidates(&self, index: &Index, query: &Query) -> Vec<Hit> {
        let tokens: BTreeSet<&str> = query.tokens.iter().map(String::as_str).collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut totals: BTreeMap<EntryKey, u64> = BTreeMap::new();
        for token in &tokens {
            for (key, weight) in token_weights(index, token, self.field) {
                *totals.entry(key).or_default() += weight as u64;
            }
        }

        let divisor = tokens.len() as f32;
        totals
            .into_iter()
            .map(|(key, total)| hit(index, key, total as f32 / divisor))
            .collect()
    }
}

/// Weight per key for one query token. A wildcard token counts each key once,
/// with its best matching token.
fn token_weights(index: &Index, token: &str, field: Option<TextField>) -> BTreeMap<EntryKey, u32> {
    let mut weights = BTreeMap::new();
    let Some(wildcard_at) = token.find(|c: char| c == '*' || c == '?') else {
        for posting in index.postings(token) {
            let weight = posting.weight(field);
            if weight > 0 {
                weights.insert(posting.key, weight);
            }
        }
        return weights;
    };

    let Some(pattern) = glob_regex(token) else {
        return weights;
    };
    let literal_prefix = &token[..wildcard_at];
    for (_, postings) in index
        .tokens_with_prefix(literal_prefix)
        .filter(|(candidate, _)| pattern.is_match(candidate))
    {
        for posting in postings {
            let weight = posting.weight(field);
            if weight > 0 {
                let best = weights.entry(posting.key).or_insert(0);
                *best = (*best).max(weight);
            }
        }
    }
    weights
}

fn glob_regex(token: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    for c in token.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs_translate_to_anchored_regexes() {
        let re = glob_regex("ru*n?r").unwrap();
        assert!(re.is_match("runner"));
        assert!(re.is_match("ruinar"));
        assert!(!re.is_match("runners"));
        assert!(glob_regex("a.b*").unwrap().is_match("a.bc"));
        assert!(!glob_regex("a.b*").unwrap().is_match("axbc"));
    }
}
