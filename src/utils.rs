use std::borrow::Cow;

use memchr::memmem;

/// Replace all occurrences of `from` with `to` in `input`.
///
/// This function is optimized for the case where no replacements are made: the input is then
/// returned borrowed and nothing is allocated.
///
/// # Arguments
///
/// * `input` - The input string to search for replacements.
/// * `from` - The `Finder` to search for. Must be created from valid UTF-8.
/// * `to` - The string to replace `from` with.
///
/// # Panics
///
/// Might panic if `from` is not valid UTF-8.
pub(crate) fn str_replace_opt<'a>(input: &'a str, from: &memmem::Finder, to: &str) -> Cow<'a, str> {
    let mut result = String::new();
    let mut last_end = 0;
    for start in from.find_iter(input.as_bytes()) {
        let end = start + from.needle().len();

        // string indexing could panic if the Finder is not valid UTF-8
        result.push_str(&input[last_end..start]);
        result.push_str(to);

        last_end = end;
    }

    if last_end == 0 {
        // no replacements were made
        Cow::Borrowed(input)
    } else {
        // copy the remaining text
        result.push_str(&input[last_end..]);
        Cow::Owned(result)
    }
}

macro_rules! finder {
    ($needle:expr) => {{
        static FINDER: std::sync::LazyLock<memchr::memmem::Finder> =
            std::sync::LazyLock::new(|| memchr::memmem::Finder::new($needle.as_bytes()));
        &FINDER
    }};
}
pub(crate) use finder;

fn trim_end_in_place(s: &mut String) {
    let trimmed = s.trim_end();
    s.truncate(trimmed.len());
}

fn trim_start_in_place(s: &mut String) {
    let trimmed = s.trim_start();
    s.replace_range(..(s.len() - trimmed.len()), "");
}

pub fn trim_in_place(mut input: String) -> String {
    trim_end_in_place(&mut input);
    trim_start_in_place(&mut input);
    input
}

/// Replace runs of whitespace (including underscores, which MediaWiki treats as spaces in titles)
/// with a single space and trim both ends.
pub fn collapse_title_whitespace(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut pending_space = false;
    for c in input.chars() {
        if c == '_' || c.is_whitespace() {
            pending_space = !result.is_empty();
        } else {
            if pending_space {
                result.push(' ');
                pending_space = false;
            }
            result.push(c);
        }
    }
    result
}

pub fn to_lowercase(input: &str) -> String {
    if cfg!(feature = "optimized-str") {
        to_lowercase_opt(input)
    } else {
        // for languages that have very little unicode (so basically: english), this is probably faster
        input.to_lowercase()
    }
}

#[doc(hidden)] /* only public for benchmarking */
pub fn to_lowercase_opt(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for c in input.chars() {
        push_lowercase(&mut result, c);
    }
    result
}

pub fn to_uppercase(input: &str) -> String {
    if cfg!(feature = "optimized-str") {
        to_uppercase_opt(input)
    } else {
        input.to_uppercase()
    }
}

#[doc(hidden)] /* only public for benchmarking */
pub fn to_uppercase_opt(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for c in input.chars() {
        push_uppercase(&mut result, c);
    }
    result
}

fn push_mapped(result: &mut String, c: char, mapped: &[u32]) {
    if mapped[0] == 0 {
        result.push(c);
        return;
    }
    for &code in mapped.iter().take_while(|&&code| code != 0) {
        // the mapping tables only contain valid scalar values
        result.extend(char::from_u32(code));
    }
}

fn push_lowercase(result: &mut String, c: char) {
    if cfg!(feature = "optimized-str") {
        push_mapped(result, c, &unicode_case_mapping::to_lowercase(c));
    } else {
        result.extend(c.to_lowercase());
    }
}

fn push_uppercase(result: &mut String, c: char) {
    if cfg!(feature = "optimized-str") {
        push_mapped(result, c, &unicode_case_mapping::to_uppercase(c));
    } else {
        result.extend(c.to_uppercase());
    }
}

/// Uppercase the first character of `input`, leaving the rest untouched.
pub fn ucfirst(input: &str) -> Cow<'_, str> {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => {
            let mut result = String::with_capacity(input.len() + 2);
            push_uppercase(&mut result, first);
            result.push_str(chars.as_str());
            Cow::Owned(result)
        }
        _ => Cow::Borrowed(input),
    }
}

/// Lowercase the first character of `input`, leaving the rest untouched.
pub fn lcfirst(input: &str) -> Cow<'_, str> {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            let mut result = String::with_capacity(input.len() + 2);
            push_lowercase(&mut result, first);
            result.push_str(chars.as_str());
            Cow::Owned(result)
        }
        _ => Cow::Borrowed(input),
    }
}

/// Flavors of `{{urlencode:…}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlEncoding {
    /// spaces become `+`
    Query,
    /// spaces become `%20`
    Path,
    /// spaces become `_`, title punctuation (`:/;@$!*(),~`) stays readable
    Wiki,
}

pub fn url_encode(input: &str, mode: UrlEncoding) -> String {
    let input = match mode {
        UrlEncoding::Wiki => Cow::Owned(input.replace(' ', "_")),
        _ => Cow::Borrowed(input),
    };
    let encoded: String = url::form_urlencoded::byte_serialize(input.as_bytes()).collect();
    match mode {
        UrlEncoding::Query => encoded,
        // byte_serialize escapes a literal '+', so every remaining '+' was a space
        UrlEncoding::Path => encoded.replace('+', "%20"),
        UrlEncoding::Wiki => {
            const KEPT: &[(&str, &str)] = &[
                ("%3A", ":"),
                ("%2F", "/"),
                ("%3B", ";"),
                ("%40", "@"),
                ("%24", "$"),
                ("%21", "!"),
                ("%28", "("),
                ("%29", ")"),
                ("%2C", ","),
                ("%7E", "~"),
            ];
            KEPT.iter()
                .fold(encoded, |acc, (escaped, plain)| acc.replace(escaped, plain))
        }
    }
}

/// Byte length of the UTF-8 character starting at `byte` (which must be a leading byte).
pub(crate) fn utf8_len(byte: u8) -> usize {
    match byte {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_str_replace_opt() {
        let result = str_replace_opt("a_b_c", finder!("_"), " ");
        assert_eq!(result, "a b c");
        assert!(matches!(
            str_replace_opt("abc", finder!("_"), " "),
            Cow::Borrowed("abc")
        ));
    }

    #[test]
    fn test_collapse_title_whitespace() {
        assert_eq!(collapse_title_whitespace("  Data__structure \t x "), "Data structure x");
        assert_eq!(collapse_title_whitespace("___"), "");
    }

    #[test]
    fn test_ucfirst_lcfirst() {
        assert_eq!(ucfirst("schmir"), "Schmir");
        assert_eq!(ucfirst("ärger"), "Ärger");
        assert_eq!(ucfirst("ß"), "SS");
        assert_eq!(ucfirst(""), "");
        assert_eq!(lcfirst("ABC"), "aBC");
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("a b&c=ä", UrlEncoding::Query), "a+b%26c%3D%C3%A4");
        assert_eq!(url_encode("a b+c", UrlEncoding::Path), "a%20b%2Bc");
        assert_eq!(
            url_encode("Vorlage:Foo bar/(x)", UrlEncoding::Wiki),
            "Vorlage:Foo_bar/(x)"
        );
    }

    #[test]
    fn test_trim_in_place() {
        assert_eq!(trim_in_place("  x y \n".to_string()), "x y");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 10000,
            ..ProptestConfig::default()
        })]
        #[test]
        // no capital sigma: std applies the context-sensitive final-sigma rule
        fn compare_case_mapping_optimized(input in "[a-zA-Z0-9 äöüÄÖÜßéÉçÇłŁ]*") {
            prop_assert_eq!(input.to_lowercase(), to_lowercase_opt(&input));
            prop_assert_eq!(input.to_uppercase(), to_uppercase_opt(&input));
        }
    }
}
