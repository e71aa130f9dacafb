//! Query engine: match modes over a read-only [`Index`].

pub mod ranking;
pub mod strategy;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entry::normalize;
use crate::index::{Index, TextField};
use crate::types::models::EntryKey;

pub use strategy::{ExactMatch, FullTextMatch, FuzzyMatch, MatchStrategy, PrefixMatch};

/// How a query string is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryMode {
    Exact,
    Prefix,
    Fuzzy { max_distance: usize },
    FullText,
    /// Full-text search restricted to one field of the entry.
    FullTextIn { field: TextField },
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Exact => write!(f, "exact"),
            QueryMode::Prefix => write!(f, "prefix"),
            QueryMode::Fuzzy { max_distance } => write!(f, "fuzzy(<= {})", max_distance),
            QueryMode::FullText => write!(f, "full-text"),
            QueryMode::FullTextIn { field: TextField::Headword } => write!(f, "full-text(headword)"),
            QueryMode::FullTextIn { field: TextField::Body } => write!(f, "full-text(body)"),
        }
    }
}

/// A normalized query, shared by every strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Query as typed, whitespace runs collapsed.
    pub text: String,
    pub folded: String,
    /// Tokens with `*`/`?` wildcards kept.
    pub tokens: Vec<String>,
}

impl Query {
    pub fn new(text: &str) -> Self {
        Self {
            text: collapse_whitespace(text),
            folded: normalize::fold(text),
            tokens: normalize::tokenize_query(text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.folded.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub key: EntryKey,
    pub headword: String,
    pub score: f32,
}

/// Hits ordered by score descending, then headword, then key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    hits: Vec<Hit>,
}

impl QueryResult {
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }

    pub fn keys(&self) -> Vec<EntryKey> {
        self.hits.iter().map(|hit| hit.key).collect()
    }

    pub fn headwords(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.headword.as_str()).collect()
    }

    pub fn truncated(mut self, limit: usize) -> Self {
        self.hits.truncate(limit);
        self
    }

    pub fn into_hits(self) -> Vec<Hit> {
        self.hits
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Hit;
    type IntoIter = std::slice::Iter<'a, Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

/// Runs `text` against `index` in the given mode.
///
/// Blank queries return an empty result.
pub fn run(index: &Index, text: &str, mode: QueryMode) -> QueryResult {
    let query = Query::new(text);
    if query.is_empty() {
        return QueryResult::default();
    }
    let hits = match mode {
        QueryMode::Exact => ExactMatch.candidates(index, &query),
        QueryMode::Prefix => PrefixMatch.candidates(index, &query),
        QueryMode::Fuzzy { max_distance } => FuzzyMatch { max_distance }.candidates(index, &query),
        QueryMode::FullText => FullTextMatch::default().candidates(index, &query),
        QueryMode::FullTextIn { field } => FullTextMatch { field: Some(field) }.candidates(index, &query),
    };
    QueryResult {
        hits: ranking::rank(hits),
    }
}

/// Runs a query and shares the result.
pub fn run_shared(index: &Index, text: &str, mode: QueryMode, limit: usize) -> Arc<QueryResult> {
    Arc::new(run(index, text, mode).truncated(limit))
}

/// Cache key of a query: its normalized text and mode.
///
/// Exact queries keep their case because the case bonus depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub text: String,
    pub mode: QueryMode,
}

impl QueryKey {
    pub fn new(text: &str, mode: QueryMode) -> Self {
        let text = match mode {
            QueryMode::Exact => collapse_whitespace(text),
            _ => normalize::fold(text),
        };
        Self { text, mode }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
