//! Tolerant scanner for the HTML-like markup of MDict records.
//!
//! Records are not well-formed XML (unclosed `<br>`, stray `&nbsp;`), so the
//! scanner works on regex-matched tags and never fails. Elements it does not
//! know contribute their text to the body.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::archive::models::Stylesheet;

static STYLE_PATTERN: OnceLock<Regex> = OnceLock::new();
static TAG_PATTERN: OnceLock<Regex> = OnceLock::new();
static ATTR_PATTERN: OnceLock<Regex> = OnceLock::new();

fn style_regex() -> &'static Regex {
    STYLE_PATTERN.get_or_init(|| Regex::new(r"`(\d+)`").expect("Invalid stylesheet regex pattern"))
}

fn tag_regex() -> &'static Regex {
    TAG_PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9:_-]*)([^>]*)>")
            .expect("Invalid tag regex pattern")
    })
}

fn attr_regex() -> &'static Regex {
    ATTR_PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\b(class|href)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("Invalid attribute regex pattern")
    })
}

/// Replaces backtick style ids (`` `1` ``) with the stylesheet's tag pairs.
///
/// A new style closes the previous one; the last style is closed at the end.
/// Unknown ids only close the current style.
pub fn substitute_stylesheet(text: &str, stylesheet: &Stylesheet) -> String {
    if stylesheet.is_empty() {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len());
    let mut last_pos = 0;
    let mut current_closing_tag = "";

    for cap in style_regex().captures_iter(text) {
        let Some(whole) = cap.get(0) else { continue };
        result.push_str(&text[last_pos..whole.start()]);
        result.push_str(current_closing_tag);
        current_closing_tag = "";

        if let Some((open_tag, close_tag)) = cap[1].parse::<u8>().ok().and_then(|id| stylesheet.get(&id)) {
            result.push_str(open_tag);
            current_closing_tag = close_tag.as_str();
        }
        last_pos = whole.end();
    }

    result.push_str(&text[last_pos..]);
    result.push_str(current_closing_tag);
    result
}

/// Semantic role of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    PartOfSpeech,
    Variant,
    SenseNumber,
    CrossRef,
}

impl Role {
    fn classify(name: &str, class: Option<&str>) -> Option<Role> {
        let classes = class.unwrap_or("");
        let has_class = |wanted: &str| classes.split_whitespace().any(|c| c.eq_ignore_ascii_case(wanted));
        if name == "pos" || has_class("pos") {
            Some(Role::PartOfSpeech)
        } else if name == "variant" || has_class("variant") || has_class("orthvar") {
            Some(Role::Variant)
        } else if name == "sn" || has_class("sensenum") {
            Some(Role::SenseNumber)
        } else if has_class("crossref") {
            Some(Role::CrossRef)
        } else {
            None
        }
    }
}

/// One numbered sense of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sense {
    pub number: String,
    pub text: String,
}

/// Structured content extracted from a record.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub parts_of_speech: BTreeSet<String>,
    pub variants: Vec<String>,
    pub senses: Vec<Sense>,
    pub body: String,
    pub cross_refs: Vec<String>,
}

struct OpenElement {
    name: String,
    role: Option<Role>,
    captured: String,
    /// Target from `href="entry://..."`, already recorded.
    linked: bool,
}

const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "meta", "link", "input", "wbr", "source", "embed"];
const BREAKING_ELEMENTS: &[&str] = &["br", "p", "div", "li", "tr", "h1", "h2", "h3", "h4", "ul", "ol", "table"];
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "head", "title"];

/// Extracts parts of speech, variants, senses, cross-references and plain body text.
pub fn extract(markup: &str) -> Extracted {
    let mut out = Extracted::default();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut last_pos = 0;

    for cap in tag_regex().captures_iter(markup) {
        let Some(whole) = cap.get(0) else { continue };
        if hidden(&stack) == 0 {
            push_text(&mut out, &mut stack, &decode_entities(&markup[last_pos..whole.start()]));
        }
        last_pos = whole.end();

        let Some(name) = cap.get(2) else { continue }; // comment
        let name = name.as_str().to_ascii_lowercase();
        let closing = !cap[1].is_empty();
        let attrs = cap.get(3).map_or("", |m| m.as_str());

        if BREAKING_ELEMENTS.contains(&name.as_str()) {
            push_break(&mut out, &mut stack);
        }

        if closing {
            if let Some(depth) = stack.iter().rposition(|open| open.name == name) {
                while stack.len() > depth {
                    if let Some(open) = stack.pop() {
                        close_element(&mut out, open);
                    }
                }
            }
            continue;
        }

        if VOID_ELEMENTS.contains(&name.as_str()) || attrs.trim_end().ends_with('/') {
            continue;
        }

        let (class, href) = attributes(attrs);
        let mut element = OpenElement {
            role: Role::classify(&name, class.as_deref()),
            name,
            captured: String::new(),
            linked: false,
        };
        if let Some(target) = href.as_deref().and_then(|h| h.strip_prefix("entry://")) {
            let target = decode_entities(target.split('#').next().unwrap_or(""));
            let target = target.trim();
            if !target.is_empty() {
                out.cross_refs.push(target.to_string());
                element.linked = true;
            }
        }
        stack.push(element);
    }

    if hidden(&stack) == 0 {
        push_text(&mut out, &mut stack, &decode_entities(&markup[last_pos..]));
    }
    while let Some(open) = stack.pop() {
        close_element(&mut out, open);
    }

    out.body = collapse(&out.body);
    for sense in &mut out.senses {
        sense.text = collapse(&sense.text);
    }
    out
}

fn hidden(stack: &[OpenElement]) -> usize {
    stack
        .iter()
        .filter(|open| HIDDEN_ELEMENTS.contains(&open.name.as_str()))
        .count()
}

fn current_role(stack: &[OpenElement]) -> Option<Role> {
    stack.iter().rev().find_map(|open| open.role)
}

fn push_text(out: &mut Extracted, stack: &mut [OpenElement], text: &str) {
    if text.is_empty() {
        return;
    }
    match current_role(stack) {
        Some(Role::PartOfSpeech) | Some(Role::Variant) | Some(Role::SenseNumber) => {}
        Some(Role::CrossRef) | None => {
            out.body.push_str(text);
            if let Some(sense) = out.senses.last_mut() {
                sense.text.push_str(text);
            }
        }
    }
    if let Some(owner) = stack.iter_mut().rev().find(|open| open.role.is_some()) {
        owner.captured.push_str(text);
    }
}

fn push_break(out: &mut Extracted, stack: &mut [OpenElement]) {
    push_text(out, stack, " ");
}

fn close_element(out: &mut Extracted, open: OpenElement) {
    let captured = collapse(&open.captured);
    if captured.is_empty() {
        return;
    }
    match open.role {
        Some(Role::PartOfSpeech) => {
            out.parts_of_speech.insert(captured.to_lowercase());
        }
        Some(Role::Variant) => {
            if !out.variants.contains(&captured) {
                out.variants.push(captured);
            }
        }
        Some(Role::SenseNumber) => out.senses.push(Sense {
            number: captured,
            text: String::new(),
        }),
        Some(Role::CrossRef) if !open.linked => out.cross_refs.push(captured),
        _ => {}
    }
}

fn attributes(attrs: &str) -> (Option<String>, Option<String>) {
    let mut class = None;
    let mut href = None;
    for cap in attr_regex().captures_iter(attrs) {
        let value = cap
            .get(2)
            .or_else(|| cap.get(3))
            .or_else(|| cap.get(4))
            .map(|m| m.as_str().to_string());
        if cap[1].eq_ignore_ascii_case("class") {
            class = class.or(value);
        } else {
            href = href.or(value);
        }
    }
    (class, href)
}

/// Decodes numeric character references and the common named entities.
/// Unknown entities are kept verbatim.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&candidate[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = name.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "middot" => Some('·'),
        "mdash" => Some('\u{2014}'),
        "ndash" => Some('\u{2013}'),
        _ => None,
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stylesheet_ids_are_nested_and_closed() {
        let mut sheet = Stylesheet::new();
        sheet.insert(1, ("<b>".to_string(), "</b>".to_string()));
        sheet.insert(2, ("<i>".to_string(), "</i>".to_string()));
        assert_eq!(
            substitute_stylesheet("`1`run`2`verb`9`plain", &sheet),
            "<b>run</b><i>verb</i>plain"
        );
        assert_eq!(substitute_stylesheet("`1`bold", &sheet), "<b>bold</b>");
    }

    #[test]
    fn extracts_semantic_elements() {
        let html = r#"<b>run</b> <span class="pos">Verb</span> <i class="orthvar">ran</i>
            <span class="sensenum">1</span> move fast &amp; far
            <sn>2</sn> operate, see <a href="entry://operate#top">operate</a>
            <span class="crossref">go</span><script>ignored()</script>"#;
        let out = extract(html);

        assert_eq!(out.parts_of_speech.iter().collect::<Vec<_>>(), vec!["verb"]);
        assert_eq!(out.variants, vec!["ran"]);
        assert_eq!(out.senses.len(), 2);
        assert_eq!(out.senses[0], Sense { number: "1".to_string(), text: "move fast & far".to_string() });
        assert_eq!(out.senses[1].number, "2");
        assert!(out.senses[1].text.starts_with("operate, see operate"));
        assert_eq!(out.cross_refs, vec!["operate", "go"]);
        assert_eq!(out.body, "run move fast & far operate, see operate go");
    }

    #[test]
    fn unknown_and_unbalanced_markup_becomes_body() {
        let out = extract("<idiom>kick the <u>bucket</idiom> to die<br>quietly </p>");
        assert_eq!(out.body, "kick the bucket to die quietly");
        assert!(out.senses.is_empty());
        assert!(out.cross_refs.is_empty());
    }

    #[test]
    fn entities_decode_or_survive() {
        assert_eq!(decode_entities("a&nbsp;b &#233; &#x41; &bogus; &"), "a\u{a0}b é A &bogus; &");
    }
}
