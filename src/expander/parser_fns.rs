//! The built-in parser functions (`{{#if:…}}`, `{{lc:…}}`, …).
//!
//! Every function receives its arguments unevaluated and expands only the ones it needs, so the
//! branch of an `#if` that is not taken is never expanded.

use std::{collections::BTreeMap, sync::LazyLock};

use compact_str::CompactString;
use memchr::memmem;
use regex::Regex;

use super::{
    expr,
    parser::{Argument, Node},
    strip_marks, time, ExpansionWarning, Expander,
};
use crate::{
    entities::replace_entities,
    namespace::NS_MAIN,
    uniq::PRESERVED_TAGS,
    utils::{
        lcfirst, str_replace_opt, to_lowercase, to_uppercase, ucfirst, url_encode, UrlEncoding,
    },
};

/// `padleft`/`padright` never produce more characters than this.
const MAX_PAD_LENGTH: usize = 500;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").unwrap());

static PLAIN_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-]?)(\d+)(?:\.(\d+))?$").unwrap());

static ERROR_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:strong|span|p|div)\s[^>]*\bclass="(?:[^"]*\s)?error(?:\s[^"]*)?""#).unwrap()
});

static TAG_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserFn {
    If,
    IfEq,
    IfError,
    IfExpr,
    IfExist,
    Switch,
    Expr,
    Time,
    Lc,
    Uc,
    LcFirst,
    UcFirst,
    PadLeft,
    PadRight,
    UrlEncode,
    AnchorEncode,
    FormatNum,
    Len,
    Sub,
    Pos,
    Replace,
    TitleParts,
    Language,
    Ns,
    LocalUrl,
    FullUrl,
    Plural,
    Int,
    Tag,
}

impl ParserFn {
    pub const ALL: &'static [ParserFn] = &[
        ParserFn::If,
        ParserFn::IfEq,
        ParserFn::IfError,
        ParserFn::IfExpr,
        ParserFn::IfExist,
        ParserFn::Switch,
        ParserFn::Expr,
        ParserFn::Time,
        ParserFn::Lc,
        ParserFn::Uc,
        ParserFn::LcFirst,
        ParserFn::UcFirst,
        ParserFn::PadLeft,
        ParserFn::PadRight,
        ParserFn::UrlEncode,
        ParserFn::AnchorEncode,
        ParserFn::FormatNum,
        ParserFn::Len,
        ParserFn::Sub,
        ParserFn::Pos,
        ParserFn::Replace,
        ParserFn::TitleParts,
        ParserFn::Language,
        ParserFn::Ns,
        ParserFn::LocalUrl,
        ParserFn::FullUrl,
        ParserFn::Plural,
        ParserFn::Int,
        ParserFn::Tag,
    ];

    /// The English invocation name.
    pub fn name(self) -> &'static str {
        match self {
            ParserFn::If => "#if",
            ParserFn::IfEq => "#ifeq",
            ParserFn::IfError => "#iferror",
            ParserFn::IfExpr => "#ifexpr",
            ParserFn::IfExist => "#ifexist",
            ParserFn::Switch => "#switch",
            ParserFn::Expr => "#expr",
            ParserFn::Time => "#time",
            ParserFn::Lc => "lc",
            ParserFn::Uc => "uc",
            ParserFn::LcFirst => "lcfirst",
            ParserFn::UcFirst => "ucfirst",
            ParserFn::PadLeft => "padleft",
            ParserFn::PadRight => "padright",
            ParserFn::UrlEncode => "urlencode",
            ParserFn::AnchorEncode => "anchorencode",
            ParserFn::FormatNum => "formatnum",
            ParserFn::Len => "#len",
            ParserFn::Sub => "#sub",
            ParserFn::Pos => "#pos",
            ParserFn::Replace => "#replace",
            ParserFn::TitleParts => "#titleparts",
            ParserFn::Language => "#language",
            ParserFn::Ns => "ns",
            ParserFn::LocalUrl => "localurl",
            ParserFn::FullUrl => "fullurl",
            ParserFn::Plural => "plural",
            ParserFn::Int => "int",
            ParserFn::Tag => "#tag",
        }
    }

    /// The id under which the site info lists localized names.
    pub fn magic_id(self) -> &'static str {
        self.name().trim_start_matches('#')
    }

    /// Whether the function is invoked with a leading `#`.
    pub fn takes_hash(self) -> bool {
        self.name().starts_with('#')
    }

    pub fn from_magic_id(id: &str) -> Option<ParserFn> {
        ParserFn::ALL.iter().copied().find(|f| f.magic_id() == id)
    }
}

/// Evaluate `{{func:first|args…}}`.
pub(crate) fn call(ex: &mut Expander<'_>, func: ParserFn, first: &[Node], args: &[Argument]) -> String {
    match func {
        ParserFn::If => {
            let condition = ex.eval_trimmed(first);
            let branch = if strip_marks(&condition).trim().is_empty() { 1 } else { 0 };
            ex.arg_trimmed(args, branch)
        }
        ParserFn::IfEq => {
            let left = ex.eval_trimmed(first);
            let right = ex.arg_trimmed(args, 0);
            let branch = if values_equal(&strip_marks(&left), &strip_marks(&right)) { 1 } else { 2 };
            ex.arg_trimmed(args, branch)
        }
        ParserFn::IfError => {
            let test = ex.eval_trimmed(first);
            if ERROR_MARKER.is_match(&test) {
                ex.arg_trimmed(args, 0)
            } else if args.len() > 1 {
                ex.arg_trimmed(args, 1)
            } else {
                test
            }
        }
        ParserFn::IfExpr => {
            let expression = ex.eval_trimmed(first);
            match expr::evaluate(&strip_marks(&expression)) {
                Ok(Some(value)) if value != 0.0 => ex.arg_trimmed(args, 0),
                Ok(_) => ex.arg_trimmed(args, 1),
                Err(e) => expression_error(ex, e),
            }
        }
        ParserFn::IfExist => {
            let name = ex.eval_trimmed(first);
            let name = strip_marks(&name);
            let exists = !name.is_empty() && {
                let fqname = ex.ns.get_fqname(&name, NS_MAIN);
                ex.resolver.page_exists(&fqname)
            };
            ex.arg_trimmed(args, if exists { 0 } else { 1 })
        }
        ParserFn::Switch => switch(ex, first, args),
        ParserFn::Expr => {
            let expression = ex.eval_trimmed(first);
            match expr::evaluate(&strip_marks(&expression)) {
                Ok(Some(value)) => expr::format_number(value),
                Ok(None) => String::new(),
                Err(e) => expression_error(ex, e),
            }
        }
        ParserFn::Time => {
            let format = ex.eval_trimmed(first);
            let date = ex.arg_trimmed(args, 0);
            let lang = match ex.arg_trimmed(args, 1) {
                lang if lang.is_empty() => ex.resolver.site_info().lang().to_string(),
                lang => lang,
            };
            time::format(&format, &strip_marks(&date), ex.now, &lang).unwrap_or_else(|e| e.marker())
        }
        ParserFn::Lc => to_lowercase(&ex.eval_trimmed(first)),
        ParserFn::Uc => to_uppercase(&ex.eval_trimmed(first)),
        ParserFn::LcFirst => lcfirst(&ex.eval_trimmed(first)).into_owned(),
        ParserFn::UcFirst => ucfirst(&ex.eval_trimmed(first)).into_owned(),
        ParserFn::PadLeft | ParserFn::PadRight => {
            let value = ex.eval_trimmed(first);
            let length = ex.arg_trimmed(args, 0);
            let padding = match args.get(1) {
                Some(arg) => ex.eval_argument_trimmed(arg),
                None => "0".to_string(),
            };
            pad(value, &length, &padding, func == ParserFn::PadLeft)
        }
        ParserFn::UrlEncode => {
            let value = ex.eval_trimmed(first);
            let mode = match ex.arg_trimmed(args, 0).to_ascii_uppercase().as_str() {
                "PATH" => UrlEncoding::Path,
                "WIKI" => UrlEncoding::Wiki,
                _ => UrlEncoding::Query,
            };
            url_encode(&strip_marks(&value), mode)
        }
        ParserFn::AnchorEncode => {
            let value = ex.eval_trimmed(first);
            let value = strip_marks(&value);
            replace_entities(&value)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_")
        }
        ParserFn::FormatNum => {
            let number = ex.eval_trimmed(first);
            let flag = ex.arg_trimmed(args, 0);
            format_num(&number, ex.resolver.site_info().lang(), &flag)
        }
        ParserFn::Len => ex.eval_trimmed(first).chars().count().to_string(),
        ParserFn::Sub => {
            let value = ex.eval_trimmed(first);
            let start = parse_int(&ex.arg_trimmed(args, 0));
            let length = parse_int(&ex.arg_trimmed(args, 1));
            substring(&value, start, length)
        }
        ParserFn::Pos => {
            let haystack = ex.eval_trimmed(first);
            let needle = match ex.arg_trimmed(args, 0) {
                needle if needle.is_empty() => " ".to_string(),
                needle => needle,
            };
            let offset = parse_int(&ex.arg_trimmed(args, 1)).max(0) as usize;
            let Some((byte_offset, _)) = haystack.char_indices().nth(offset) else {
                return String::new();
            };
            match haystack[byte_offset..].find(&needle) {
                Some(found) => haystack[..byte_offset + found].chars().count().to_string(),
                None => String::new(),
            }
        }
        ParserFn::Replace => {
            let value = ex.eval_trimmed(first);
            let search = match ex.arg_trimmed(args, 0) {
                search if search.is_empty() => " ".to_string(),
                search => search,
            };
            let replacement = ex.arg_trimmed(args, 1);
            let finder = memmem::Finder::new(search.as_bytes());
            str_replace_opt(&value, &finder, &replacement).into_owned()
        }
        ParserFn::TitleParts => {
            let title = ex.eval_trimmed(first);
            let count = parse_int(&ex.arg_trimmed(args, 0));
            let first_part = parse_int(&ex.arg_trimmed(args, 1));
            if title.is_empty() {
                return title;
            }
            title_parts(&ex.ns.get_fqname(&title, NS_MAIN), count, first_part)
        }
        ParserFn::Language => {
            let code = to_lowercase(&ex.eval_trimmed(first));
            language_name(&code).map_or(code, str::to_string)
        }
        ParserFn::Ns => {
            let name = ex.eval_trimmed(first);
            let id = name.parse::<i32>().ok().or_else(|| ex.ns.namespace_id(&name));
            id.and_then(|id| ex.ns.namespace_name(id))
                .unwrap_or_default()
                .to_string()
        }
        ParserFn::LocalUrl | ParserFn::FullUrl => {
            let page = ex.eval_trimmed(first);
            let query = ex.arg_trimmed(args, 0);
            let local = local_url(ex, &strip_marks(&page), &query);
            if func == ParserFn::FullUrl {
                format!("{}{local}", ex.resolver.site_info().general.server)
            } else {
                local
            }
        }
        ParserFn::Plural => {
            if args.is_empty() {
                return String::new();
            }
            let number = ex.eval_trimmed(first);
            let number: f64 = strip_marks(&number).replace(',', "").parse().unwrap_or(0.0);
            let singular = match ex.resolver.site_info().lang() {
                "fr" | "pt-br" => number.abs() < 2.0,
                _ => number == 1.0,
            };
            let form = if singular { 0 } else { 1 };
            ex.arg_trimmed(args, form.min(args.len() - 1))
        }
        ParserFn::Int => format!("⧼{}⧽", ex.eval_trimmed(first)),
        ParserFn::Tag => tag(ex, first, args),
    }
}

fn expression_error(ex: &mut Expander<'_>, error: expr::ExprError) -> String {
    tracing::debug!(message = "expression error", error = %error);
    let marker = error.marker();
    ex.warnings.push(ExpansionWarning::Expression {
        message: error.to_string(),
    });
    marker
}

/// Numbers compare by value (`01` equals `1.0`), everything else as strings.
fn values_equal(left: &str, right: &str) -> bool {
    if NUMBER.is_match(left) && NUMBER.is_match(right) {
        if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
            return l == r;
        }
    }
    left == right
}

/// `{{#switch:value|case1=result1|case2|case3=result2|#default=default}}`
///
/// Cases without `=` fall through to the next case with a value. A trailing case without `=` is
/// the default.
fn switch(ex: &mut Expander<'_>, first: &[Node], args: &[Argument]) -> String {
    let primary = ex.eval_trimmed(first);
    let primary = strip_marks(&primary).into_owned();
    let mut found = false;
    let mut default = None;
    let mut trailing = None;

    for arg in args {
        match arg.eq {
            Some(split) => {
                trailing = None;
                let key = ex.eval_arg_name(arg, split);
                let key = strip_marks(&key);
                if found || values_equal(&key, &primary) {
                    return ex.eval_arg_value(arg, split);
                }
                if key == "#default" {
                    default = Some((arg, split));
                }
            }
            None => {
                let value = ex.eval_argument_trimmed(arg);
                if values_equal(&strip_marks(&value), &primary) {
                    found = true;
                }
                trailing = Some(value);
            }
        }
    }

    match (trailing, default) {
        (Some(value), _) => value,
        (None, Some((arg, split))) => ex.eval_arg_value(arg, split),
        (None, None) => String::new(),
    }
}

fn pad(value: String, length: &str, padding: &str, left: bool) -> String {
    let Ok(length) = length.parse::<usize>() else {
        return value;
    };
    let length = length.min(MAX_PAD_LENGTH);
    let current = value.chars().count();
    if padding.is_empty() || length <= current {
        return value;
    }
    let fill: String = padding.chars().cycle().take(length - current).collect();
    if left {
        fill + &value
    } else {
        value + &fill
    }
}

fn parse_int(text: &str) -> i64 {
    text.parse().unwrap_or(0)
}

/// Character-based substring: a negative `start` counts from the end, a negative `length` drops
/// characters from the end, a zero `length` takes the rest.
fn substring(value: &str, start: i64, length: i64) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len() as i64;
    let start = if start < 0 { len.saturating_add(start).max(0) } else { start.min(len) };
    let end = match length {
        0 => len,
        length if length > 0 => start.saturating_add(length).min(len),
        length => len.saturating_add(length).max(start),
    };
    chars[start as usize..end as usize].iter().collect()
}

fn title_parts(title: &str, count: i64, first: i64) -> String {
    let parts: Vec<&str> = title.split('/').collect();
    let n = parts.len() as i64;
    let start = match first {
        first if first > 0 => (first - 1).min(n),
        first if first < 0 => n.saturating_add(first).max(0),
        _ => 0,
    };
    let end = match count {
        count if count > 0 => start.saturating_add(count).min(n),
        count if count < 0 => n.saturating_add(count).max(start),
        _ => n,
    };
    parts[start as usize..end as usize].join("/")
}

/// Thousands and decimal separators.
fn separators(lang: &str) -> (&'static str, &'static str) {
    match lang {
        "de" | "nl" | "it" | "es" | "pt" | "da" | "id" | "tr" => (".", ","),
        "fr" => ("\u{202F}", ","),
        "pl" | "ru" | "sv" | "fi" | "nb" | "cs" | "uk" => ("\u{A0}", ","),
        _ => (",", "."),
    }
}

fn format_num(number: &str, lang: &str, flag: &str) -> String {
    let (group, decimal) = separators(lang);
    if flag == "R" {
        return number.replace(group, "").replace(decimal, ".");
    }
    let Some(caps) = PLAIN_NUMBER.captures(number) else {
        return number.to_string();
    };

    let digits = &caps[2];
    let mut result = caps[1].to_string();
    if flag == "NOSEP" {
        result.push_str(digits);
    } else {
        let len = digits.len();
        for (i, digit) in digits.chars().enumerate() {
            if i > 0 && (len - i) % 3 == 0 {
                result.push_str(group);
            }
            result.push(digit);
        }
    }
    if let Some(fraction) = caps.get(3) {
        result.push_str(decimal);
        result.push_str(fraction.as_str());
    }
    result
}

fn language_name(code: &str) -> Option<&'static str> {
    Some(match code {
        "ar" => "العربية",
        "cs" => "čeština",
        "da" => "dansk",
        "de" => "Deutsch",
        "en" => "English",
        "es" => "español",
        "fi" => "suomi",
        "fr" => "français",
        "it" => "italiano",
        "ja" => "日本語",
        "nl" => "Nederlands",
        "pl" => "polski",
        "pt" => "português",
        "ru" => "русский",
        "sv" => "svenska",
        "tr" => "Türkçe",
        "uk" => "українська",
        "zh" => "中文",
        _ => return None,
    })
}

fn local_url(ex: &Expander<'_>, page: &str, query: &str) -> String {
    let general = &ex.resolver.site_info().general;
    let title = url_encode(&ex.ns.get_fqname(page, NS_MAIN), UrlEncoding::Wiki);
    if query.is_empty() {
        let article_path = if general.articlepath.is_empty() {
            "/wiki/$1"
        } else {
            general.articlepath.as_str()
        };
        article_path.replace("$1", &title)
    } else {
        format!("{}/index.php?title={title}&{query}", general.scriptpath)
    }
}

/// `{{#tag:name|content|attr=value…}}`
fn tag(ex: &mut Expander<'_>, first: &[Node], args: &[Argument]) -> String {
    let name = ex.eval_trimmed(first);
    let name = to_lowercase(&strip_marks(&name));
    if !TAG_NAME.is_match(&name) {
        return String::new();
    }
    let body = args
        .first()
        .map(|arg| ex.eval_argument(arg))
        .unwrap_or_default();

    let mut attributes = BTreeMap::new();
    for arg in args.iter().skip(1) {
        let Some(split) = arg.eq else {
            continue;
        };
        let key = to_lowercase(&ex.eval_arg_name(arg, split));
        let value = ex.eval_arg_value(arg, split);
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .map(str::to_string)
            .unwrap_or(value);
        attributes.insert(CompactString::from(key), value);
    }

    if PRESERVED_TAGS.contains(&name.as_str()) {
        return ex.uniq.insert_tag(&name, attributes, body);
    }
    let mut html = format!("<{name}");
    for (key, value) in &attributes {
        html.push_str(&format!(" {key}=\"{}\"", value.replace('"', "&quot;")));
    }
    html.push('>');
    html.push_str(&body);
    html.push_str(&format!("</{name}>"));
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(ParserFn::from_magic_id("ifeq"), Some(ParserFn::IfEq));
        assert_eq!(ParserFn::from_magic_id("lc"), Some(ParserFn::Lc));
        assert_eq!(ParserFn::from_magic_id("#if"), None);
        assert!(ParserFn::Switch.takes_hash());
        assert!(!ParserFn::Ns.takes_hash());
        for &func in ParserFn::ALL {
            assert_eq!(ParserFn::from_magic_id(func.magic_id()), Some(func));
        }
    }

    #[test]
    fn test_values_equal() {
        assert!(values_equal("01", "1.0"));
        assert!(values_equal("1e3", "1000"));
        assert!(values_equal("abc", "abc"));
        assert!(!values_equal("abc", "ABC"));
        assert!(!values_equal("1", "1a"));
    }

    #[test]
    fn test_format_num() {
        assert_eq!(format_num("1234567.891", "en", ""), "1,234,567.891");
        assert_eq!(format_num("-1234", "de", ""), "-1.234");
        assert_eq!(format_num("1234,5", "de", "R"), "1234.5");
        assert_eq!(format_num("1,234.5", "en", "R"), "1234.5");
        assert_eq!(format_num("1234.5", "de", "NOSEP"), "1234,5");
        assert_eq!(format_num("1234", "fr", ""), "1\u{202F}234");
        assert_eq!(format_num("123", "en", ""), "123");
        assert_eq!(format_num("12ab", "en", ""), "12ab");
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(substring("Straße", 2, 3), "raß");
        assert_eq!(substring("Straße", -2, 0), "ße");
        assert_eq!(substring("Straße", 1, -2), "tra");
        assert_eq!(substring("abc", 5, 1), "");
        assert_eq!(pad("7".into(), "3", "0", true), "007");
        assert_eq!(pad("ab".into(), "5", "xy", false), "abxyx");
        assert_eq!(pad("abc".into(), "2", "0", true), "abc");
        assert_eq!(pad("a".into(), "100000", "0", true).len(), MAX_PAD_LENGTH);
        assert_eq!(title_parts("Talk:Foo/bar/baz/quok", 2, 0), "Talk:Foo/bar");
        assert_eq!(title_parts("Talk:Foo/bar/baz/quok", -1, 0), "Talk:Foo/bar/baz");
        assert_eq!(title_parts("Talk:Foo/bar/baz/quok", 2, 2), "bar/baz");
        assert_eq!(title_parts("Talk:Foo/bar/baz/quok", 1, -1), "quok");
    }

    #[test]
    fn test_extreme_numeric_arguments() {
        assert_eq!(substring("abc", 1, i64::MAX), "bc");
        assert_eq!(substring("abc", i64::MAX, i64::MAX), "");
        assert_eq!(substring("abc", i64::MIN, 2), "ab");
        assert_eq!(substring("abc", 0, i64::MIN), "");
        assert_eq!(title_parts("a/b/c", i64::MAX, 2), "b/c");
        assert_eq!(title_parts("a/b/c", i64::MIN, i64::MIN), "");
        assert_eq!(title_parts("a/b/c", 1, i64::MAX), "");
    }
}
