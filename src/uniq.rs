//! Protection of verbatim content.
//!
//! Before templates are expanded, tags whose content must not be touched by the wiki-text parser
//! (`<nowiki>`, `<pre>`, `<math>`, `<ref>`, …) are cut out of the text and replaced by opaque
//! placeholders of the form `\x7fUNIQ-<nonce>-<index>-QINU\x7f`. The cut-out parts live in a
//! [`Uniquifier`] table for the rest of the document's processing. HTML comments are removed.
//!
//! On the page itself, the inclusion-control tags follow the "not included" rule: `<includeonly>`
//! regions are removed, `<noinclude>` and `<onlyinclude>` tags are dropped but their content kept.

use std::{collections::BTreeMap, sync::LazyLock};

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, Input, MatchKind};
use compact_str::CompactString;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::{
    entities::replace_entities,
    utils::{finder, to_lowercase},
};

pub const PLACEHOLDER_PREFIX: &str = "\x7fUNIQ-";
pub const PLACEHOLDER_SUFFIX: &str = "-QINU\x7f";

/// Tags whose content is preserved verbatim.
pub const PRESERVED_TAGS: &[&str] = &[
    "nowiki",
    "pre",
    "math",
    "ref",
    "references",
    "source",
    "syntaxhighlight",
    "timeline",
    "gallery",
    "imagemap",
];

/// Inclusion-control tags.
pub const INCLUSION_TAGS: &[&str] = &["includeonly", "noinclude", "onlyinclude"];

const NONCE_LENGTH: usize = 16;
const MAX_REPLACE_NESTING: usize = 32;

/// Format the placeholder for entry `index` of a document with the given nonce.
pub fn placeholder(nonce: &str, index: usize) -> String {
    format!("{PLACEHOLDER_PREFIX}{nonce}-{index:08}{PLACEHOLDER_SUFFIX}")
}

/// If `bytes` starts with a well-formed placeholder, return its length.
pub(crate) fn placeholder_len(bytes: &[u8]) -> Option<usize> {
    let rest = bytes.strip_prefix(PLACEHOLDER_PREFIX.as_bytes())?;
    let nonce = rest.iter().take_while(|b| b.is_ascii_alphanumeric()).count();
    if nonce == 0 || rest.get(nonce) != Some(&b'-') {
        return None;
    }
    let rest = &rest[nonce + 1..];
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || !rest[digits..].starts_with(PLACEHOLDER_SUFFIX.as_bytes()) {
        return None;
    }
    Some(PLACEHOLDER_PREFIX.len() + nonce + 1 + digits + PLACEHOLDER_SUFFIX.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqEntry {
    pub placeholder: String,
    /// Lowercased tag name.
    pub tag_name: CompactString,
    pub attributes: BTreeMap<CompactString, String>,
    pub body: String,
    pub self_closing: bool,
    /// The exact source text the placeholder stands for.
    pub source: String,
}

/// Per-document placeholder table.
#[derive(Debug, Clone)]
pub struct Uniquifier {
    nonce: String,
    entries: Vec<UniqEntry>,
    by_placeholder: FxHashMap<String, usize>,
}

impl Default for Uniquifier {
    fn default() -> Self {
        Self::new()
    }
}

// patterns are matched case-insensitively; order matters where one is a prefix of another
const OPEN_PATTERNS: &[&str] = &[
    "<!--",
    "<nowiki",
    "<pre",
    "<math",
    "<references",
    "<ref",
    "<source",
    "<syntaxhighlight",
    "<timeline",
    "<gallery",
    "<imagemap",
    "<includeonly",
    "<noinclude",
    "<onlyinclude",
    "</noinclude",
    "</onlyinclude",
    "</includeonly",
];

static OPEN_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    let mut builder = AhoCorasickBuilder::new();
    builder
        .match_kind(MatchKind::LeftmostFirst)
        .ascii_case_insensitive(true);
    let aho_corasick = builder.build(OPEN_PATTERNS).unwrap();
    tracing::debug!(
        "built aho-corasick successfully, kind: {:?}",
        aho_corasick.kind()
    );
    aho_corasick
});

static CLOSE_REGEXES: LazyLock<FxHashMap<&'static str, Regex>> = LazyLock::new(|| {
    PRESERVED_TAGS
        .iter()
        .chain(INCLUSION_TAGS)
        .map(|&tag| (tag, Regex::new(&format!(r"(?i)</{tag}\s*>")).unwrap()))
        .collect()
});

static ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .unwrap()
});

/// Parse the attribute part of a tag (`name="value" other=x flag`). Names are lowercased, values
/// have their character references decoded.
pub fn parse_attributes(text: &str) -> BTreeMap<CompactString, String> {
    ATTRIBUTE_REGEX
        .captures_iter(text)
        .map(|caps| {
            let name = CompactString::from(to_lowercase(&caps[1]));
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or(String::new(), |m| replace_entities(m.as_str()).into_owned());
            (name, value)
        })
        .collect()
}

/// Find the `>` that ends the opening tag whose attributes start at `from`; quoted attribute
/// values may contain `>`.
fn find_tag_end(text: &str, from: usize) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in text.as_bytes()[from..].iter().enumerate() {
        match (quote, b) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'<') => return None,
            (None, b'>') => return Some(from + i),
            _ => {}
        }
    }
    None
}

impl Uniquifier {
    /// Create a table with a random nonce.
    pub fn new() -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LENGTH)
            .map(char::from)
            .collect();
        Self::with_nonce(nonce)
    }

    /// Create a table with a fixed nonce, for reproducible placeholders. Characters other than
    /// ASCII letters and digits are dropped, and the nonce is padded to at least eight characters.
    pub fn with_nonce(nonce: impl Into<String>) -> Self {
        let mut nonce: String = nonce
            .into()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        while nonce.len() < 8 {
            nonce.push('0');
        }
        Self {
            nonce,
            entries: Vec::new(),
            by_placeholder: FxHashMap::default(),
        }
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn entries(&self) -> &[UniqEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, placeholder: &str) -> Option<&UniqEntry> {
        self.by_placeholder
            .get(placeholder)
            .map(|&index| &self.entries[index])
    }

    /// The nonce must not appear in the text we are about to protect, otherwise placeholders
    /// could collide with input. Only adjustable while no placeholder has been handed out.
    fn ensure_unique_nonce(&mut self, text: &str) {
        if !self.entries.is_empty() {
            return;
        }
        while text.contains(&format!("{PLACEHOLDER_PREFIX}{}-", self.nonce)) {
            tracing::debug!(
                message = "input contains placeholder-like text, extending nonce",
                nonce = self.nonce.as_str()
            );
            self.nonce.push('x');
        }
    }

    /// Register a new entry and return its placeholder.
    pub fn insert(
        &mut self,
        tag_name: &str,
        attributes: BTreeMap<CompactString, String>,
        body: String,
        self_closing: bool,
        source: String,
    ) -> String {
        let index = self.entries.len();
        let placeholder = placeholder(&self.nonce, index);
        self.by_placeholder.insert(placeholder.clone(), index);
        self.entries.push(UniqEntry {
            placeholder: placeholder.clone(),
            tag_name: CompactString::from(to_lowercase(tag_name)),
            attributes,
            body,
            self_closing,
            source,
        });
        placeholder
    }

    /// Protect a tag built from parts (as `{{#tag:…}}` does) and return its placeholder.
    pub fn insert_tag(
        &mut self,
        tag_name: &str,
        attributes: BTreeMap<CompactString, String>,
        body: String,
    ) -> String {
        let mut source = format!("<{tag_name}");
        for (name, value) in &attributes {
            source.push_str(&format!(" {name}=\"{}\"", value.replace('"', "&quot;")));
        }
        source.push('>');
        source.push_str(&body);
        source.push_str(&format!("</{tag_name}>"));
        self.insert(tag_name, attributes, body, false, source)
    }

    /// Replace preserved tags with placeholders and drop comments.
    #[tracing::instrument(level = "debug", skip_all, fields(len = text.len()))]
    pub fn replace_tags(&mut self, text: &str) -> String {
        self.ensure_unique_nonce(text);

        let mut result = String::with_capacity(text.len());
        let mut last_end = 0;
        let mut pos = 0;

        while let Some(m) = OPEN_MATCHER.find(Input::new(text).span(pos..text.len())) {
            let start = m.start();
            let pattern = OPEN_PATTERNS[m.pattern().as_usize()];

            let Some(end) = self.replace_one(text, start, m.end(), pattern, &mut result, last_end)
            else {
                // not a tag after all, keep scanning right after the `<`
                pos = start + 1;
                continue;
            };
            last_end = end;
            pos = end;
        }

        result.push_str(&text[last_end..]);
        result
    }

    /// Handle a single candidate match. On success the text before the match (from `last_end`)
    /// and the replacement are pushed to `result` and the end of the consumed source is returned.
    fn replace_one(
        &mut self,
        text: &str,
        start: usize,
        name_end: usize,
        pattern: &str,
        result: &mut String,
        last_end: usize,
    ) -> Option<usize> {
        if pattern == "<!--" {
            let end = finder!("-->")
                .find(&text.as_bytes()[name_end..])
                .map_or(text.len(), |i| name_end + i + 3);
            result.push_str(&text[last_end..start]);
            return Some(end);
        }

        // the name must end here: `<prefix>` is not `<pre>`
        match text.as_bytes().get(name_end) {
            Some(b'>' | b'/') => {}
            Some(b) if b.is_ascii_whitespace() => {}
            _ => return None,
        }
        let gt = find_tag_end(text, name_end)?;

        if let Some(tag) = pattern.strip_prefix("</") {
            if !text[name_end..gt].trim().is_empty() {
                return None;
            }
            debug_assert!(INCLUSION_TAGS.contains(&tag));
            result.push_str(&text[last_end..start]);
            return Some(gt + 1);
        }

        let tag = &pattern[1..];
        let attributes_text = &text[name_end..gt];
        let self_closing = attributes_text.trim_end().ends_with('/');
        let attributes_text = attributes_text.trim_end().trim_end_matches('/');

        match tag {
            "noinclude" | "onlyinclude" => {
                result.push_str(&text[last_end..start]);
                return Some(gt + 1);
            }
            "includeonly" => {
                let end = if self_closing {
                    gt + 1
                } else {
                    CLOSE_REGEXES[tag]
                        .find_at(text, gt + 1)
                        .map_or(text.len(), |close| close.end())
                };
                result.push_str(&text[last_end..start]);
                return Some(end);
            }
            _ => {}
        }

        let (body, end) = if self_closing {
            ("", gt + 1)
        } else {
            // unterminated preserved tags stay literal text
            let close = CLOSE_REGEXES[tag].find_at(text, gt + 1)?;
            (&text[gt + 1..close.start()], close.end())
        };

        result.push_str(&text[last_end..start]);
        if tag == "nowiki" && body.is_empty() {
            return Some(end);
        }

        let placeholder = self.insert(
            tag,
            parse_attributes(attributes_text),
            body.to_string(),
            self_closing,
            text[start..end].to_string(),
        );
        result.push_str(&placeholder);
        Some(end)
    }

    /// Put the original source back in place of every placeholder issued by this table.
    /// Unknown placeholders are left alone.
    pub fn replace_uniq(&self, text: &str) -> String {
        self.replace_uniq_nested(text, 0)
    }

    fn replace_uniq_nested(&self, text: &str, nesting: usize) -> String {
        let finder = finder!(PLACEHOLDER_PREFIX);
        let mut result = String::with_capacity(text.len());
        let mut last_end = 0;

        for start in finder.find_iter(text.as_bytes()) {
            if start < last_end {
                continue;
            }
            let Some(length) = placeholder_len(&text.as_bytes()[start..]) else {
                continue;
            };
            let Some(entry) = self.get(&text[start..start + length]) else {
                continue;
            };

            result.push_str(&text[last_end..start]);
            if nesting < MAX_REPLACE_NESTING && entry.source.contains(PLACEHOLDER_PREFIX) {
                result.push_str(&self.replace_uniq_nested(&entry.source, nesting + 1));
            } else {
                result.push_str(&entry.source);
            }
            last_end = start + length;
        }

        result.push_str(&text[last_end..]);
        result
    }
}
