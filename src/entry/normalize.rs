//! Text normalization shared by index building and querying.
//!
//! Every form is derived deterministically from its input, so a query
//! normalized here compares directly against what the builder stored.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// All match-mode variants of one headword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedForms {
    /// The trimmed headword as written.
    pub exact: String,
    /// Case-insensitive, diacritic-free form used for Exact/Prefix/Fuzzy.
    pub folded: String,
    /// Diacritic-free with the original case kept.
    pub stripped: String,
    /// Bag of words of the folded form, in order.
    pub tokens: Vec<String>,
}

impl NormalizedForms {
    pub fn of(text: &str) -> Self {
        let folded = fold(text);
        Self {
            exact: text.trim().to_string(),
            tokens: tokenize(&folded),
            stripped: strip_diacritics(text),
            folded,
        }
    }
}

/// NFKD decomposition, combining marks removed, lowercased, runs of
/// whitespace collapsed to one space.
pub fn fold(text: &str) -> String {
    let lowered: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    collapse_whitespace(&lowered)
}

/// Removes diacritics but keeps case and compatibility characters.
pub fn strip_diacritics(text: &str) -> String {
    let stripped: String = text.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect();
    collapse_whitespace(&stripped)
}

/// Splits text into folded tokens on anything that is not alphanumeric.
pub fn tokenize(text: &str) -> Vec<String> {
    split_tokens(&fold(text), |c| c.is_alphanumeric())
}

/// Like [`tokenize`], but keeps the `*` and `?` wildcards inside tokens.
pub fn tokenize_query(text: &str) -> Vec<String> {
    split_tokens(&fold(text), |c| c.is_alphanumeric() || c == '*' || c == '?')
}

fn split_tokens(folded: &str, keep: impl Fn(char) -> bool) -> Vec<String> {
    folded
        .split(|c: char| !keep(c))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
