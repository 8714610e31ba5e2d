// SPDX-License-Identifier: MPL-2.0
//! # mwtext
//!
//! A front-end for MediaWiki wiki-text: it expands templates and parser functions, protects
//! verbatim content, tokenizes the result and resolves the meaning of apostrophe runs.
//!
//! ## Overview
//!
//! `mwtext` turns the raw source of a page into a flat token stream that a tree builder or writer
//! can consume. The stages are:
//!
//! 1. **Uniquifier** ([`uniq`]): `<nowiki>`, `<pre>`, `<math>`, `<ref>`, ... are cut out of the
//!    text and replaced by opaque `\x7fUNIQ-...-QINU\x7f` placeholders; HTML comments are dropped.
//! 2. **Template expansion** ([`expander`]): `{{templates}}`, `{{{parameters}}}`, parser
//!    functions (`{{#if:...}}`, `{{#switch:...}}`, `{{#expr:...}}`, `{{#time:...}}`, ...) and
//!    magic variables are expanded against a [`resolver::Resolver`] that supplies template
//!    sources. Expansion is bounded by depth, node-count and size limits and protected against
//!    template loops. Problems never abort the page: they show up as inline error markers.
//! 3. **Scanner** ([`scanner`]): the expanded text is split into `(kind, start, length)` tokens.
//! 4. **Style analysis** ([`style`]): runs of apostrophes are resolved into italic/bold toggles.
//!
//! [`document::Document`] runs the whole pipeline for a single page.
//!
//! ## Basic Usage
//!
//! ```rust
//! use mwtext::document::Document;
//! use mwtext::expander::ExpandOptions;
//! use mwtext::resolver::DictResolver;
//! use mwtext::siteinfo::SiteInfo;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = DictResolver::new(SiteInfo::builtin("en")?)
//!         .with_page("Template:Greet", "Hello {{{1|world}}}!");
//!
//!     let document = Document::parse("{{greet|you}} ''really''", &resolver, ExpandOptions::default());
//!     assert!(document.text().starts_with("Hello you!"));
//!
//!     for token in document.tokens() {
//!         println!("{:>10} {:?}", token.kind, document.token_text(token));
//!     }
//!     for emphasis in document.emphasis()? {
//!         println!("{:?}", emphasis.run);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! For plain template expansion without tokenizing there is [`expand`].
//!
//! ## Modules and API
//!
//! ### `siteinfo` and `namespace`
//!
//! [`siteinfo::SiteInfo`] holds the per-wiki configuration: namespaces and their aliases, magic
//! words with their localized spellings and the interwiki map. It is read from the JSON format of
//! the `siteinfo` API query (`siteinfo-<lang>.json`, `en` and `de` are bundled) or from the
//! `<siteinfo>` header of an XML dump. [`namespace::NsHandler`] uses it to canonicalize titles
//! (`user:schmir` becomes `Benutzer:Schmir` on the German Wikipedia) and to recognize redirects.
//!
//! ### `resolver`
//!
//! Template sources come from a [`resolver::Resolver`]. Implement it on top of a database, a dump
//! or an API client; [`resolver::DictResolver`] is an in-memory implementation.
//!
//! ### `entities`
//!
//! Decoding of HTML character references (`&amp;`, `&#32;`, `&#x41;`).
//!
//! ## Features and Configuration
//!
//! Expansion is configured through [`expander::ExpandOptions`]: the resource limits, the title of
//! the page being rendered and the timestamp used for `{{CURRENTYEAR}}` and `{{#time:...}}`.
//! Fixing the timestamp makes expansion fully deterministic.
//!
//! ### Optimized string functions
//!
//! The `optimized-str` feature switches case conversion to the `unicode-case-mapping` tables,
//! which is noticeably faster on title-heavy input.
//!
//! ```toml
//! [dependencies]
//! mwtext = { version = "0.1.0", features = ["optimized-str"] }
//! ```
//!
//! ### Logging and Error Handling
//!
//! - Uses the `tracing` crate for logging warnings (limits exceeded, template loops, resolver
//!   failures, cancellation). No subscriber is installed by the library.
//! - Expansion never fails. Recoverable problems are reported inline and as structured
//!   [`expander::ExpansionWarning`] values.
//!
//! ## Licensing
//!
//! This project is licensed under the Mozilla Public License 2.0.

pub mod document;
pub mod entities;
pub mod expander;
#[cfg(test)]
mod integration_tests;
pub mod magics;
pub mod namespace;
pub mod preprocessor;
pub mod resolver;
pub mod scanner;
pub mod siteinfo;
pub mod style;
#[cfg(test)]
mod test_support;
pub mod uniq;
pub mod utils;

use expander::{ExpandOptions, ExpansionLimits, Expander};
use resolver::Resolver;
use uniq::Uniquifier;

/// Expand all templates in `text` and return the result with verbatim tags restored.
///
/// Uses the current time and the main page of the resolver's wiki as the page context; use
/// [`Expander`] directly for full control.
pub fn expand(
    text: &str,
    resolver: &dyn Resolver,
    max_depth: usize,
    max_nodes: usize,
    max_expansion_size: usize,
) -> String {
    let options = ExpandOptions {
        limits: ExpansionLimits {
            max_depth,
            max_nodes,
            max_expansion_size,
        },
        ..ExpandOptions::default()
    };

    let mut uniq = Uniquifier::new();
    let uniquified = uniq.replace_tags(text);
    let expansion = Expander::new(resolver, &mut uniq, options).expand(&uniquified);
    uniq.replace_uniq(&expansion.text)
}
