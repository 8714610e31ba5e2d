//! Tokenizing scanner for MediaWiki markup.
//!
//! The scanner is a single forward pass over the input with a few bytes of lookahead. It never
//! fails: shapes it does not recognize are emitted as [`TokenKind::Text`]. Tokens reference the
//! input by byte offset, so the caller keeps the buffer and slices it with [`Token::text`].
//!
//! Context that influences tokenization:
//!
//! - *beginning of line*: headings, list items, horizontal rules, preformatted lines and table
//!   markup are only structural at the start of a line (`{|` inside a line is just text),
//! - *table depth*: cell, row and caption markup at line start is only structural inside a table,
//! - *link depth*: a `|` inside `[[…]]` is emitted as [`TokenKind::Special`],
//! - tags are consumed as a whole, so nothing inside `<…>` is ever structural.

use std::{fmt, ops::Range};

use memchr::memchr;

use crate::{
    uniq,
    utils::{finder, utf8_len},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    End,
    Text,
    Entity,
    Special,
    MagicWord,
    Comment,
    BoxOpen,
    BoxClose,
    HttpUrl,
    Break,
    BeginTable,
    EndTable,
    HtmlTag,
    Style,
    Pre,
    Section,
    SectionEnd,
    Item,
    Colon,
    Semicolon,
    HRule,
    Newline,
    Column,
    Row,
    TableCaption,
    UrlLink,
    Uniq,
    HtmlTagEnd,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::End => "end",
            TokenKind::Text => "text",
            TokenKind::Entity => "entity",
            TokenKind::Special => "special",
            TokenKind::MagicWord => "magicword",
            TokenKind::Comment => "comment",
            TokenKind::BoxOpen => "box_open",
            TokenKind::BoxClose => "box_close",
            TokenKind::HttpUrl => "http_url",
            TokenKind::Break => "break",
            TokenKind::BeginTable => "begin_table",
            TokenKind::EndTable => "end_table",
            TokenKind::HtmlTag => "html_tag",
            TokenKind::Style => "style",
            TokenKind::Pre => "pre",
            TokenKind::Section => "section",
            TokenKind::SectionEnd => "section_end",
            TokenKind::Item => "item",
            TokenKind::Colon => "colon",
            TokenKind::Semicolon => "semicolon",
            TokenKind::HRule => "hrule",
            TokenKind::Newline => "newline",
            TokenKind::Column => "column",
            TokenKind::Row => "row",
            TokenKind::TableCaption => "tablecaption",
            TokenKind::UrlLink => "urllink",
            TokenKind::Uniq => "uniq",
            TokenKind::HtmlTagEnd => "html_tag_end",
        }
    }

    /// Whether this token ends a logical line.
    pub fn ends_line(self) -> bool {
        matches!(self, TokenKind::Newline | TokenKind::Break | TokenKind::End)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A token: a kind plus a byte range into the scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub start: u32,
    pub length: u32,
}

impl Token {
    pub fn end(&self) -> usize {
        self.start as usize + self.length as usize
    }

    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end()
    }

    /// The part of `source` this token covers. `source` must be the buffer that was scanned.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.range()]
    }
}

/// HTML elements (and parser extension tags) that are tokenized as tags.
const KNOWN_TAGS: &[&str] = &[
    "abbr", "b", "bdi", "big", "blockquote", "br", "caption", "center", "cite", "code", "data",
    "dd", "del", "dfn", "div", "dl", "dt", "em", "font", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "i", "ins", "kbd", "li", "mark", "ol", "p", "pre", "q", "rb", "rp", "rt", "rtc", "ruby", "s",
    "samp", "small", "span", "strike", "strong", "sub", "sup", "table", "td", "th", "time", "tr",
    "tt", "u", "ul", "var", "wbr",
    // extension and inclusion tags
    "nowiki", "math", "ref", "references", "source", "syntaxhighlight", "timeline", "gallery",
    "imagemap", "poem", "includeonly", "noinclude", "onlyinclude",
];

/// Behavior switches recognized as `__NAME__`.
const MAGIC_WORDS: &[&str] = &[
    "NOTOC", "FORCETOC", "TOC", "NOEDITSECTION", "NEWSECTIONLINK", "NONEWSECTIONLINK",
    "NOGALLERY", "HIDDENCAT", "NOCONTENTCONVERT", "NOCC", "NOTITLECONVERT", "NOTC", "START", "END",
    "INDEX", "NOINDEX", "STATICREDIRECT", "DISAMBIG", "EXPECTUNUSEDCATEGORY",
];

const URL_SCHEMES: &[&str] = &["http://", "https://", "ftp://", "mailto:"];

fn is_stop_byte(b: u8) -> bool {
    matches!(
        b,
        b'\n' | b'[' | b']' | b'<' | b'&' | b'\'' | b'{' | b'}' | b'|' | b'!' | b':' | b'_' | 0x7f
    )
}

fn is_url_body_byte(b: u8) -> bool {
    !(b.is_ascii_whitespace()
        || matches!(b, b'<' | b'>' | b'[' | b']' | b'"' | b'|' | b'{' | b'}' | 0x7f))
}

/// Scan `text` into tokens. The returned sequence always ends with a [`TokenKind::End`] token.
///
/// # Panics
///
/// Panics if `text` is longer than `u32::MAX` bytes.
pub fn scan(text: &str) -> Vec<Token> {
    assert!(
        u32::try_from(text.len()).is_ok(),
        "scanner input must be smaller than 4 GiB"
    );
    Scanner::new(text).run()
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// End of the region currently being scanned; shorter than the input while inside a heading.
    limit: usize,
    /// `(start, length)` of the closing `==` run of the heading currently being scanned.
    pending_section_end: Option<(usize, usize)>,
    bol: bool,
    link_depth: u32,
    table_depth: u32,
    in_urllink: bool,
    /// `Some(b'|')` or `Some(b'!')` if the current line opened a table cell.
    cell_line: Option<u8>,
    /// The current line started with `;`, so the next `:` separates term and definition.
    definition_line: bool,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            limit: text.len(),
            pending_section_end: None,
            bol: true,
            link_depth: 0,
            table_depth: 0,
            in_urllink: false,
            cell_line: None,
            definition_line: false,
            // rough guess: one token per eight bytes
            tokens: Vec::with_capacity(text.len() / 8 + 1),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            if let Some((start, length)) = self.pending_section_end {
                if self.pos >= start {
                    self.push(TokenKind::SectionEnd, start, length);
                    self.pos = start + length;
                    self.pending_section_end = None;
                    self.limit = self.bytes.len();
                    continue;
                }
            }

            if self.bol && self.scan_line_start() {
                continue;
            }
            self.scan_inline();
        }

        let len = self.bytes.len() as u32;
        self.tokens.push(Token {
            kind: TokenKind::End,
            start: len,
            length: 0,
        });
        self.tokens
    }

    fn push(&mut self, kind: TokenKind, start: usize, length: usize) {
        if kind == TokenKind::Text {
            if let Some(last) = self.tokens.last_mut() {
                if last.kind == TokenKind::Text && last.end() == start {
                    last.length += length as u32;
                    self.bol = false;
                    return;
                }
            }
        }

        self.tokens.push(Token {
            kind,
            start: start as u32,
            length: length as u32,
        });
        self.bol = matches!(kind, TokenKind::Newline | TokenKind::Break);
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..self.limit]
    }

    fn starts_with(&self, prefix: &[u8]) -> bool {
        self.rest().starts_with(prefix)
    }

    fn run_length(&self, at: usize, byte: u8) -> usize {
        self.bytes[at..self.limit]
            .iter()
            .take_while(|&&b| b == byte)
            .count()
    }

    fn line_end(&self, from: usize) -> usize {
        memchr(b'\n', &self.bytes[from..]).map_or(self.bytes.len(), |i| from + i)
    }

    // ----- beginning of line -----

    fn scan_line_start(&mut self) -> bool {
        match self.bytes[self.pos] {
            b'=' => self.scan_heading(),
            b'-' if self.starts_with(b"----") => {
                let length = self.run_length(self.pos, b'-');
                self.emit(TokenKind::HRule, length);
                true
            }
            b'*' | b'#' | b':' | b';' => {
                self.scan_list_prefix();
                true
            }
            b'{' if self.starts_with(b"{|") => {
                self.begin_table();
                true
            }
            b'|' | b'!' if self.table_depth > 0 => {
                self.scan_table_line_start();
                true
            }
            b' ' | b'\t' => self.scan_indented_line(),
            _ => false,
        }
    }

    fn emit(&mut self, kind: TokenKind, length: usize) {
        self.push(kind, self.pos, length);
        self.pos += length;
    }

    fn scan_heading(&mut self) -> bool {
        let start = self.pos;
        let line_end = self.line_end(start);
        let content_end = start
            + self.bytes[start..line_end]
                .iter()
                .rposition(|b| !matches!(b, b' ' | b'\t' | b'\r'))
                .map_or(0, |i| i + 1);

        let open = self.bytes[start..content_end]
            .iter()
            .take_while(|&&b| b == b'=')
            .count();
        let close = self.bytes[start..content_end]
            .iter()
            .rev()
            .take_while(|&&b| b == b'=')
            .count();
        if open < 2 || close < 2 || open + close >= content_end - start {
            return false;
        }

        let level = open.min(close).min(6);
        let end_start = content_end - level;
        self.push(TokenKind::Section, start, level);
        self.pos = start + level;
        self.pending_section_end = Some((end_start, line_end - end_start));
        self.limit = end_start;
        true
    }

    fn scan_list_prefix(&mut self) {
        while self.pos < self.limit {
            let kind = match self.bytes[self.pos] {
                b'*' | b'#' => TokenKind::Item,
                b':' => TokenKind::Colon,
                b';' => {
                    self.definition_line = true;
                    TokenKind::Semicolon
                }
                _ => break,
            };
            self.emit(kind, 1);
        }

        // indented tables (`:{|`) are legal
        if self.starts_with(b"{|") {
            self.begin_table();
        }
    }

    fn begin_table(&mut self) {
        self.table_depth += 1;
        self.emit(TokenKind::BeginTable, 2);
    }

    fn scan_table_line_start(&mut self) {
        let rest = self.rest();
        if rest.starts_with(b"|}") {
            self.table_depth -= 1;
            self.emit(TokenKind::EndTable, 2);
        } else if rest.starts_with(b"|-") {
            let length = 1 + self.run_length(self.pos + 1, b'-');
            self.emit(TokenKind::Row, length);
        } else if rest.starts_with(b"|+") {
            self.emit(TokenKind::TableCaption, 2);
        } else {
            self.cell_line = Some(rest[0]);
            self.emit(TokenKind::Column, 1);
        }
    }

    /// Leading whitespace either precedes table markup (and is skipped) or starts a
    /// preformatted line.
    fn scan_indented_line(&mut self) -> bool {
        let indent = self
            .rest()
            .iter()
            .take_while(|&&b| b == b' ' || b == b'\t')
            .count();
        let after = &self.bytes[self.pos + indent..self.limit];

        if after.starts_with(b"{|") {
            self.pos += indent;
            self.begin_table();
            return true;
        }
        if self.table_depth > 0 && matches!(after.first(), Some(b'|' | b'!')) {
            self.pos += indent;
            self.scan_table_line_start();
            return true;
        }

        let line_end = self.line_end(self.pos);
        let blank = self.bytes[self.pos..line_end]
            .iter()
            .all(|b| b.is_ascii_whitespace());
        if self.bytes[self.pos] == b' ' && !blank {
            self.emit(TokenKind::Pre, 1);
            return true;
        }
        false
    }

    // ----- inline -----

    fn scan_inline(&mut self) {
        let matched = match self.bytes[self.pos] {
            b'\n' => {
                self.scan_newline();
                true
            }
            b'[' => self.scan_open_bracket(),
            b']' => self.scan_close_bracket(),
            b'<' => self.scan_angle_bracket(),
            b'&' => self.scan_entity(),
            b'\'' => self.scan_run(b'\'', TokenKind::Style),
            b'{' => self.scan_run(b'{', TokenKind::Special),
            b'}' => self.scan_run(b'}', TokenKind::Special),
            b'|' => self.scan_pipe(),
            b'!' if self.cell_line == Some(b'!') && self.starts_with(b"!!") => {
                self.emit(TokenKind::Column, 2);
                true
            }
            b':' if self.definition_line => {
                self.definition_line = false;
                self.emit(TokenKind::Colon, 1);
                true
            }
            b'_' => self.scan_magic_word(),
            0x7f => self.scan_uniq(),
            _ => match self.url_at(self.pos) {
                Some(length) => {
                    self.emit(TokenKind::HttpUrl, length);
                    true
                }
                None => false,
            },
        };

        if !matched {
            self.scan_text();
        }
    }

    fn scan_text(&mut self) {
        let start = self.pos;
        let mut i = start + utf8_len(self.bytes[start]);
        while i < self.limit {
            let b = self.bytes[i];
            if is_stop_byte(b) || (b.is_ascii_alphabetic() && self.url_at(i).is_some()) {
                break;
            }
            i += utf8_len(b);
        }
        self.push(TokenKind::Text, start, i - start);
        self.pos = i;
    }

    fn scan_newline(&mut self) {
        // a blank line is a paragraph break
        let after = self.pos + 1;
        let blank_end = after
            + self.bytes[after..]
                .iter()
                .take_while(|&&b| b == b' ' || b == b'\t' || b == b'\r')
                .count();
        if self.bytes.get(blank_end) == Some(&b'\n') {
            self.emit(TokenKind::Break, blank_end + 1 - self.pos);
        } else {
            self.emit(TokenKind::Newline, 1);
        }

        self.cell_line = None;
        self.definition_line = false;
        self.in_urllink = false;
    }

    fn scan_open_bracket(&mut self) -> bool {
        if self.starts_with(b"[[") {
            self.link_depth += 1;
            self.emit(TokenKind::BoxOpen, 2);
            return true;
        }
        if let Some(length) = self.url_at(self.pos + 1) {
            self.in_urllink = true;
            self.emit(TokenKind::UrlLink, length + 1);
            return true;
        }
        false
    }

    fn scan_close_bracket(&mut self) -> bool {
        if self.starts_with(b"]]") {
            self.link_depth = self.link_depth.saturating_sub(1);
            self.emit(TokenKind::BoxClose, 2);
            return true;
        }
        if self.in_urllink {
            self.in_urllink = false;
            self.emit(TokenKind::Special, 1);
            return true;
        }
        false
    }

    fn scan_pipe(&mut self) -> bool {
        if self.cell_line.is_some() && self.starts_with(b"||") {
            self.emit(TokenKind::Column, 2);
            return true;
        }
        if self.link_depth > 0 || self.cell_line.is_some() {
            self.emit(TokenKind::Special, 1);
            return true;
        }
        false
    }

    fn scan_run(&mut self, byte: u8, kind: TokenKind) -> bool {
        let length = self.run_length(self.pos, byte);
        if length < 2 {
            return false;
        }
        self.emit(kind, length);
        true
    }

    fn scan_angle_bracket(&mut self) -> bool {
        if self.starts_with(b"<!--") {
            let body = self.pos + 4;
            let end = finder!("-->")
                .find(&self.bytes[body..self.limit])
                .map_or(self.limit, |i| body + i + 3);
            self.emit(TokenKind::Comment, end - self.pos);
            return true;
        }

        let Some((kind, length)) = self.tag_at(self.pos) else {
            return false;
        };
        self.emit(kind, length);
        true
    }

    /// Recognize `<name …>`, `<name …/>` or `</name>` for a known tag name.
    fn tag_at(&self, at: usize) -> Option<(TokenKind, usize)> {
        let bytes = &self.bytes[at..self.limit];
        let closing = bytes.get(1) == Some(&b'/');
        let name_start = if closing { 2 } else { 1 };
        let name_len = bytes[name_start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        if name_len == 0 {
            return None;
        }
        let name = &bytes[name_start..name_start + name_len];
        if !KNOWN_TAGS
            .iter()
            .any(|tag| tag.as_bytes().eq_ignore_ascii_case(name))
        {
            return None;
        }

        let mut i = name_start + name_len;
        match bytes.get(i) {
            Some(b'>') => return Some((tag_kind(closing), i + 1)),
            Some(b'/') if !closing && bytes.get(i + 1) == Some(&b'>') => {
                return Some((TokenKind::HtmlTag, i + 2))
            }
            Some(b) if b.is_ascii_whitespace() => {}
            _ => return None,
        }

        // attributes; quoted values may contain `>`
        let mut quote = None;
        while i < bytes.len() {
            let b = bytes[i];
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None => match b {
                    b'"' | b'\'' if !closing => quote = Some(b),
                    b'<' => return None,
                    b'>' => return Some((tag_kind(closing), i + 1)),
                    _ => {}
                },
            }
            i += 1;
        }
        None
    }

    fn scan_entity(&mut self) -> bool {
        let bytes = &self.bytes[self.pos..self.limit];
        let body = match bytes.get(1) {
            Some(b'#') => match bytes.get(2) {
                Some(b'x' | b'X') => {
                    let digits = bytes[3..]
                        .iter()
                        .take_while(|b| b.is_ascii_hexdigit())
                        .count();
                    (digits > 0).then_some(3 + digits)
                }
                _ => {
                    let digits = bytes[2..]
                        .iter()
                        .take_while(|b| b.is_ascii_digit())
                        .count();
                    (digits > 0).then_some(2 + digits)
                }
            },
            Some(b) if b.is_ascii_alphabetic() => Some(
                1 + bytes[1..]
                    .iter()
                    .take_while(|b| b.is_ascii_alphanumeric())
                    .count(),
            ),
            _ => None,
        };

        match body {
            Some(end) if bytes.get(end) == Some(&b';') => {
                self.emit(TokenKind::Entity, end + 1);
                true
            }
            _ => false,
        }
    }

    fn scan_magic_word(&mut self) -> bool {
        let bytes = self.rest();
        if !bytes.starts_with(b"__") {
            return false;
        }
        let name_len = bytes[2..]
            .iter()
            .take_while(|b| b.is_ascii_alphabetic())
            .count();
        if name_len == 0 || !bytes[2 + name_len..].starts_with(b"__") {
            return false;
        }
        let name = &bytes[2..2 + name_len];
        if !MAGIC_WORDS
            .iter()
            .any(|word| word.as_bytes().eq_ignore_ascii_case(name))
        {
            return false;
        }
        self.emit(TokenKind::MagicWord, name_len + 4);
        true
    }

    fn scan_uniq(&mut self) -> bool {
        match uniq::placeholder_len(self.rest()) {
            Some(length) => {
                self.emit(TokenKind::Uniq, length);
                true
            }
            None => false,
        }
    }

    /// Length of a bare URL starting at `at`, if there is one.
    fn url_at(&self, at: usize) -> Option<usize> {
        if at > 0 && self.bytes[at - 1].is_ascii_alphanumeric() {
            return None;
        }
        let bytes = &self.bytes[at..self.limit];
        let scheme = URL_SCHEMES.iter().find(|scheme| {
            bytes.len() > scheme.len() && bytes[..scheme.len()].eq_ignore_ascii_case(scheme.as_bytes())
        })?;

        let body = &bytes[scheme.len()..];
        let mut length = body.iter().take_while(|&&b| is_url_body_byte(b)).count();

        // trailing punctuation is not part of the URL; a closing paren only if none was opened
        while length > 0 {
            match body[length - 1] {
                b'.' | b',' | b';' | b':' | b'!' | b'?' => length -= 1,
                b')' if !body[..length].contains(&b'(') => length -= 1,
                _ => break,
            }
        }
        let host = &body[..length];
        let valid = match *scheme {
            "mailto:" => host.contains(&b'@'),
            _ => host.first().is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'['),
        };
        valid.then_some(scheme.len() + length)
    }
}

fn tag_kind(closing: bool) -> TokenKind {
    if closing {
        TokenKind::HtmlTagEnd
    } else {
        TokenKind::HtmlTag
    }
}
