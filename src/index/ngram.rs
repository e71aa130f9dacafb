//! Character bigram index over folded headwords, used for fuzzy candidates.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

const START: char = '\u{2}';
const END: char = '\u{3}';

/// Each optimal-string-alignment edit (a transposition included) destroys
/// at most this many bigrams of the padded query.
const GRAMS_PER_EDIT: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NgramIndex {
    /// Distinct folded headwords, sorted.
    forms: Vec<String>,
    /// Bigram → ascending positions in `forms`.
    grams: BTreeMap<String, Vec<u32>>,
}

impl NgramIndex {
    /// Builds the index. `forms` must be sorted and free of duplicates.
    pub fn build(forms: Vec<String>) -> Self {
        let mut grams: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for (position, form) in forms.iter().enumerate() {
            for gram in bigrams(form) {
                grams.entry(gram).or_default().push(position as u32);
            }
        }
        Self { forms, grams }
    }

    pub fn forms(&self) -> &[String] {
        &self.forms
    }

    pub fn form(&self, position: u32) -> Option<&str> {
        self.forms.get(position as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    /// Positions of forms that may lie within `max_distance` edits of `query`.
    ///
    /// Never drops a form that is within the distance. Forms must share at
    /// least `distinct_bigrams(query) - 3 * max_distance` bigrams with the
    /// query and differ in length by at most `max_distance`; when the shared
    /// bound is not positive, every form in the length window is returned.
    pub fn candidates(&self, query: &str, max_distance: usize) -> Vec<u32> {
        let query_len = query.chars().count();
        let in_window = |position: u32| {
            self.form(position).is_some_and(|form| {
                form.chars().count().abs_diff(query_len) <= max_distance
            })
        };

        let query_grams = bigrams(query);
        let required = query_grams.len().saturating_sub(GRAMS_PER_EDIT.saturating_mul(max_distance));
        if required == 0 {
            return (0..self.forms.len() as u32).filter(|&p| in_window(p)).collect();
        }

        let mut shared: BTreeMap<u32, usize> = BTreeMap::new();
        for gram in &query_grams {
            for &position in self.grams.get(gram).map_or(&[][..], Vec::as_slice) {
                *shared.entry(position).or_default() += 1;
            }
        }
        shared
            .into_iter()
            .filter(|&(position, count)| count >= required && in_window(position))
            .map(|(position, _)| position)
            .collect()
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if !self.forms.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err("fuzzy forms are not sorted".to_string());
        }
        let len = self.forms.len() as u32;
        match self.grams.values().flatten().find(|&&p| p >= len) {
            Some(p) => Err(format!("bigram refers to unknown form {}", p)),
            None => Ok(()),
        }
    }
}

/// Distinct bigrams of `text` padded with start and end markers.
pub fn bigrams(text: &str) -> BTreeSet<String> {
    let padded: Vec<char> = std::iter::once(START)
        .chain(text.chars())
        .chain(std::iter::once(END))
        .collect();
    padded.windows(2).map(|pair| pair.iter().collect()).collect()
}
