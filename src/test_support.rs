//! Fixtures shared by the unit and integration tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::{
    expander::ExpandOptions, namespace::NsHandler, resolver::DictResolver, siteinfo::SiteInfo,
};

pub mod prelude {
    pub(crate) use super::proptest as proptest_support;
    pub(crate) use super::{
        fixed_now, german_ns, german_resolver, german_site_info, test_options,
    };
    pub(crate) use proptest::prelude::*;
}

pub fn german_site_info() -> SiteInfo {
    SiteInfo::builtin("de").unwrap()
}

pub fn german_ns() -> NsHandler {
    NsHandler::new(&german_site_info())
}

/// An empty resolver on the German site info; add pages with `with_page`.
pub fn german_resolver() -> DictResolver {
    DictResolver::new(german_site_info())
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2008, 3, 4, 13, 5, 9).unwrap()
}

/// Default limits, a fixed clock and a user page as the current title.
pub fn test_options() -> ExpandOptions {
    ExpandOptions {
        now: Some(fixed_now()),
        title: Some("Benutzer:Schmir/Test".to_string()),
        ..ExpandOptions::default()
    }
}

pub mod proptest {
    use proptest::prelude::*;

    /// Text built from the pieces wiki markup is made of, so that generated inputs actually hit
    /// the interesting scanner and expander paths.
    pub fn wikitext() -> impl Strategy<Value = String> {
        let piece = prop_oneof![
            "[a-zA-Zäöü ]{1,8}",
            Just("\n".to_string()),
            Just("''".to_string()),
            Just("'''".to_string()),
            Just("[[".to_string()),
            Just("]]".to_string()),
            Just("{{".to_string()),
            Just("}}".to_string()),
            Just("{{{".to_string()),
            Just("}}}".to_string()),
            Just("|".to_string()),
            Just("=".to_string()),
            Just("{|".to_string()),
            Just("|}".to_string()),
            Just("&amp;".to_string()),
            Just("&#x41;".to_string()),
            Just("<nowiki>".to_string()),
            Just("</nowiki>".to_string()),
            Just("<!--".to_string()),
            Just("-->".to_string()),
            Just("<br/>".to_string()),
            Just("http://example.org/x".to_string()),
            Just("#if:".to_string()),
            Just("* ".to_string()),
            Just("== ".to_string()),
        ];
        prop::collection::vec(piece, 0..40).prop_map(|pieces| pieces.concat())
    }

    /// Template names and bodies for a small resolver.
    pub fn templates() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("[A-C]", wikitext()), 0..4)
    }
}
