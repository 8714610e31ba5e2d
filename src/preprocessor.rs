//! Inclusion control for template sources.
//!
//! When a page is transcluded (`included`), `<noinclude>` regions disappear and, if the page has
//! `<onlyinclude>` sections, only their content is used. When the page is viewed by itself,
//! `<includeonly>` regions disappear instead. The tags themselves never survive. Tag names are
//! matched case-insensitively and an unterminated region extends to the end of the input.

use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;

static NOINCLUDE_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<noinclude(?:\s[^>]*)?>.*?(?:</noinclude\s*>|\z)|<noinclude\s*/>|</noinclude\s*>")
        .unwrap()
});

static INCLUDEONLY_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<includeonly(?:\s[^>]*)?>.*?(?:</includeonly\s*>|\z)|<includeonly\s*/>|</includeonly\s*>",
    )
    .unwrap()
});

static ONLYINCLUDE_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<onlyinclude(?:\s[^>]*)?>(.*?)(?:</onlyinclude\s*>|\z)").unwrap()
});

static INCLUDEONLY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?includeonly(?:\s[^>]*)?/?>").unwrap());

static PAGE_VIEW_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:noinclude|onlyinclude)(?:\s[^>]*)?/?>").unwrap());

/// Apply the inclusion rules to a template source.
pub fn preprocess(source: &str, included: bool) -> Cow<'_, str> {
    // nothing to do for the (very common) sources without inclusion tags
    if !source.contains('<') {
        return Cow::Borrowed(source);
    }

    if included {
        let source: Cow<'_, str> = if ONLYINCLUDE_REGION.is_match(source) {
            Cow::Owned(
                ONLYINCLUDE_REGION
                    .captures_iter(source)
                    .map(|caps| caps.get(1).map_or("", |m| m.as_str()))
                    .collect(),
            )
        } else {
            Cow::Borrowed(source)
        };

        let without_noinclude = match NOINCLUDE_REGION.replace_all(&source, "") {
            Cow::Borrowed(_) => source.clone(),
            Cow::Owned(s) => Cow::Owned(s),
        };
        match INCLUDEONLY_TAG.replace_all(&without_noinclude, "") {
            Cow::Borrowed(_) => without_noinclude,
            Cow::Owned(s) => Cow::Owned(s),
        }
    } else {
        let without_includeonly = INCLUDEONLY_REGION.replace_all(source, "");
        match PAGE_VIEW_TAG.replace_all(&without_includeonly, "") {
            Cow::Borrowed(_) => without_includeonly,
            Cow::Owned(s) => Cow::Owned(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_included_strips_noinclude() {
        assert_eq!(
            preprocess("a<noinclude>docs\nmore</noinclude>b<includeonly>c</includeonly>", true),
            "abc"
        );
        assert_eq!(preprocess("a<NOINCLUDE class=x>b</NoInclude >c", true), "ac");
        assert_eq!(preprocess("a<noinclude>never closed", true), "a");
        assert_eq!(preprocess("a<noinclude/>b", true), "ab");
    }

    #[test]
    fn test_included_onlyinclude_wins() {
        assert_eq!(
            preprocess(
                "head<onlyinclude>one</onlyinclude>middle<onlyinclude>two<noinclude>x</noinclude></onlyinclude>tail",
                true
            ),
            "onetwo"
        );
    }

    #[test]
    fn test_page_view() {
        assert_eq!(
            preprocess("a<noinclude>b</noinclude>c<includeonly>d</includeonly>e<onlyinclude>f</onlyinclude>", false),
            "abcef"
        );
        assert_eq!(preprocess("a<includeonly>b", false), "a");
    }

    #[test]
    fn test_no_tags_borrows() {
        assert!(matches!(preprocess("{{x}}", true), Cow::Borrowed(_)));
        assert!(matches!(preprocess("<b>x</b>", true), Cow::Borrowed(_)));
    }

    #[test]
    fn test_lookalike_tags_are_kept() {
        assert_eq!(preprocess("<noincludes>x</noincludes>", true), "<noincludes>x</noincludes>");
    }
}
