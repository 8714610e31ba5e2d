//! Title canonicalization and redirect detection.

use std::collections::BTreeMap;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::{
    siteinfo::SiteInfo,
    utils::{collapse_title_whitespace, to_lowercase, ucfirst},
};

pub const NS_MAIN: i32 = 0;
pub const NS_TEMPLATE: i32 = 10;

/// English names every wiki accepts in addition to its localized ones.
const CANONICAL_NAMES: &[(i32, &str)] = &[
    (-2, "Media"),
    (-1, "Special"),
    (1, "Talk"),
    (2, "User"),
    (3, "User talk"),
    (4, "Project"),
    (5, "Project talk"),
    (6, "File"),
    (7, "File talk"),
    (8, "MediaWiki"),
    (9, "MediaWiki talk"),
    (10, "Template"),
    (11, "Template talk"),
    (12, "Help"),
    (13, "Help talk"),
    (14, "Category"),
    (15, "Category talk"),
];

/// How the first letter of titles in a namespace is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseRule {
    FirstLetter,
    CaseSensitive,
}

/// A title split into namespace and local part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub namespace: i32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct NsHandler {
    /// lowercased name (canonical, localized or alias) -> namespace id
    by_name: FxHashMap<String, i32>,
    /// namespace id -> name used in canonical titles
    display: BTreeMap<i32, String>,
    case_rules: FxHashMap<i32, CaseRule>,
    redirect: Regex,
}

impl NsHandler {
    pub fn new(site_info: &SiteInfo) -> Self {
        let mut by_name = FxHashMap::default();
        let mut display = BTreeMap::new();
        let mut case_rules = FxHashMap::default();

        let mut register = |name: &str, id: i32| {
            let key = to_lowercase(&collapse_title_whitespace(name));
            if !key.is_empty() {
                by_name.entry(key).or_insert(id);
            }
        };

        for &(id, name) in CANONICAL_NAMES {
            display.insert(id, name.to_string());
        }
        for (&id, ns) in &site_info.namespaces {
            register(&ns.name, id);
            if let Some(canonical) = &ns.canonical {
                register(canonical, id);
            }
            display.insert(id, collapse_title_whitespace(&ns.name));
            let rule = if ns.case == "case-sensitive" {
                CaseRule::CaseSensitive
            } else {
                CaseRule::FirstLetter
            };
            case_rules.insert(id, rule);
        }
        for alias in &site_info.namespacealiases {
            register(&alias.alias, alias.id);
        }
        for &(id, name) in CANONICAL_NAMES {
            register(name, id);
        }
        display.insert(NS_MAIN, String::new());

        let mut keywords: Vec<&str> = site_info
            .magic_word("redirect")
            .map(|m| m.aliases.iter().map(String::as_str).collect())
            .unwrap_or_default();
        if !keywords.iter().any(|k| k.eq_ignore_ascii_case("#REDIRECT")) {
            keywords.push("#REDIRECT");
        }
        // longest first so that alternation prefers the most specific keyword
        keywords.sort_by_key(|k| std::cmp::Reverse(k.len()));
        let keywords: Vec<String> = keywords.into_iter().map(regex::escape).collect();
        let redirect = Regex::new(&format!(
            r"(?is)\A\s*(?:{})\s*:?\s*\[\[([^\]\n]*)\]\]",
            keywords.join("|")
        ))
        .expect("escaped keywords form a valid pattern");

        NsHandler {
            by_name,
            display,
            case_rules,
            redirect,
        }
    }

    pub fn namespace_id(&self, name: &str) -> Option<i32> {
        self.by_name
            .get(&to_lowercase(&collapse_title_whitespace(name)))
            .copied()
    }

    pub fn namespace_name(&self, id: i32) -> Option<&str> {
        self.display.get(&id).map(String::as_str)
    }

    pub fn case_rule(&self, id: i32) -> CaseRule {
        self.case_rules
            .get(&id)
            .copied()
            .unwrap_or(CaseRule::FirstLetter)
    }

    /// Split a title into namespace and normalized local part.
    ///
    /// A leading `:` forces the main namespace instead of `default_ns`; an explicit namespace
    /// prefix after it is still honored (`:Template:X` is the template).
    pub fn split_title(&self, title: &str, default_ns: i32) -> Title {
        let collapsed = collapse_title_whitespace(title);
        let (mut namespace, rest) = match collapsed.strip_prefix(':') {
            Some(rest) => (NS_MAIN, rest.trim_start_matches([':', ' '])),
            None => (default_ns, collapsed.as_str()),
        };

        let mut local = rest;
        if let Some((prefix, after)) = rest.split_once(':') {
            if let Some(id) = self.namespace_id(prefix) {
                namespace = id;
                local = after.trim();
            }
        }

        let text = match self.case_rule(namespace) {
            CaseRule::FirstLetter => ucfirst(local).into_owned(),
            CaseRule::CaseSensitive => local.to_string(),
        };
        Title { namespace, text }
    }

    /// Canonical form of `title`, e.g. `user:Schmir` becomes `Benutzer:Schmir` on a German wiki.
    pub fn get_fqname(&self, title: &str, default_ns: i32) -> String {
        let title = self.split_title(title, default_ns);
        self.join(title.namespace, &title.text)
    }

    pub fn join(&self, namespace: i32, text: &str) -> String {
        match self.namespace_name(namespace) {
            Some(name) if !name.is_empty() => format!("{name}:{text}"),
            Some(_) => text.to_string(),
            None => format!("{namespace}:{text}"),
        }
    }

    /// The redirect target of `text`, if the page is a redirect.
    pub fn redirect_matcher(&self, text: &str) -> Option<String> {
        let target = self.redirect.captures(text)?.get(1)?.as_str();
        let target = target.split(['|', '#']).next().unwrap_or("");
        let fqname = self.get_fqname(target, NS_MAIN);
        if fqname.is_empty() {
            None
        } else {
            Some(fqname)
        }
    }
}

/// The talk namespace belonging to a subject namespace.
pub fn talk_namespace(id: i32) -> Option<i32> {
    match id {
        i32::MIN..=-1 => None,
        id if id % 2 == 0 => Some(id + 1),
        id => Some(id),
    }
}
