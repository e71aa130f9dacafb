//! Entry parsing: raw record bytes to a structured [`EntryRecord`].

pub mod markup;
pub mod normalize;

use std::collections::BTreeSet;

use log::trace;

use crate::archive::RecordFormat;
use crate::types::error::{DictError, Result};
use crate::types::models::{EntryKey, RawBlock};

pub use markup::Sense;
pub use normalize::NormalizedForms;

const REDIRECT_PREFIX: &str = "@@@LINK=";

/// What kind of entry a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A single-word headword.
    Headword,
    /// A multi-word headword (idiom, phrasal verb).
    Phrase,
    /// `@@@LINK=` record pointing at another headword.
    Redirect,
}

/// A parsed dictionary entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub key: EntryKey,
    pub headword: String,
    pub forms: NormalizedForms,
    pub kind: EntryKind,
    pub parts_of_speech: BTreeSet<String>,
    pub variants: Vec<String>,
    pub senses: Vec<Sense>,
    /// Plain text with markup removed.
    pub body: String,
    /// Target headwords, in document order.
    pub cross_refs: Vec<String>,
    /// The decoded record after stylesheet substitution.
    pub markup: String,
}

impl EntryRecord {
    pub fn is_redirect(&self) -> bool {
        self.kind == EntryKind::Redirect
    }
}

/// Parses one record.
///
/// Only a missing headword is fatal; unknown markup ends up in the body.
pub fn parse(raw: &RawBlock, format: &RecordFormat) -> Result<EntryRecord> {
    let headword = raw.headword.trim();
    if headword.is_empty() {
        return Err(DictError::MalformedEntry {
            key: raw.key,
            reason: "empty headword".to_string(),
        });
    }

    let (decoded, _) = format.encoding.decode_without_bom_handling(&raw.bytes);
    let text = decoded.trim_end_matches('\0');
    let forms = NormalizedForms::of(headword);

    if let Some(target) = text.trim_start().strip_prefix(REDIRECT_PREFIX) {
        let target = target.trim();
        trace!("Entry {} redirects to '{}'", raw.key, target);
        return Ok(EntryRecord {
            key: raw.key,
            headword: headword.to_string(),
            forms,
            kind: EntryKind::Redirect,
            parts_of_speech: BTreeSet::new(),
            variants: Vec::new(),
            senses: Vec::new(),
            body: String::new(),
            cross_refs: if target.is_empty() { Vec::new() } else { vec![target.to_string()] },
            markup: text.to_string(),
        });
    }

    let styled = markup::substitute_stylesheet(text, &format.stylesheet);
    let extracted = markup::extract(&styled);
    let kind = if headword.contains(char::is_whitespace) {
        EntryKind::Phrase
    } else {
        EntryKind::Headword
    };

    Ok(EntryRecord {
        key: raw.key,
        headword: headword.to_string(),
        forms,
        kind,
        parts_of_speech: extracted.parts_of_speech,
        variants: extracted.variants,
        senses: extracted.senses,
        body: extracted.body,
        cross_refs: extracted.cross_refs,
        markup: styled,
    })
}
