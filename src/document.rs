//! One page through the whole front-end: verbatim tags are uniquified, templates expanded and the
//! result scanned into tokens.

use std::borrow::Cow;

use tracing::instrument;

use crate::{
    entities::resolve_entity,
    expander::{ExpandOptions, Expander, ExpansionWarning},
    resolver::Resolver,
    scanner::{scan, Token, TokenKind},
    style::{analyze_tokens, Emphasis, StyleError},
    uniq::{UniqEntry, Uniquifier},
};

/// An expanded and tokenized page.
#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    tokens: Vec<Token>,
    uniq: Uniquifier,
    warnings: Vec<ExpansionWarning>,
    cancelled: bool,
}

impl Document {
    #[instrument(skip_all, fields(len = source.len()))]
    pub fn parse(source: &str, resolver: &dyn Resolver, options: ExpandOptions) -> Document {
        Self::parse_with_cancel(source, resolver, options, None)
    }

    /// Like [`Document::parse`], but `cancel` is asked before every template inclusion whether to
    /// stop. A cancelled document holds the partial expansion.
    #[instrument(skip_all, fields(len = source.len()))]
    pub fn parse_with_cancel(
        source: &str,
        resolver: &dyn Resolver,
        options: ExpandOptions,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Document {
        let mut uniq = Uniquifier::new();
        let uniquified = uniq.replace_tags(source);

        let mut expander = Expander::new(resolver, &mut uniq, options);
        if let Some(cancel) = cancel {
            expander = expander.with_cancel(cancel);
        }
        let expansion = expander.expand(&uniquified);
        if expansion.cancelled {
            tracing::warn!(message = "document expansion was cancelled");
        }

        let tokens = scan(&expansion.text);
        Document {
            text: expansion.text,
            tokens,
            uniq,
            warnings: expansion.warnings,
            cancelled: expansion.cancelled,
        }
    }

    /// The expanded text, with uniq placeholders in place of verbatim tags.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn uniq(&self) -> &Uniquifier {
        &self.uniq
    }

    pub fn warnings(&self) -> &[ExpansionWarning] {
        &self.warnings
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn token_text(&self, token: &Token) -> &str {
        token.text(&self.text)
    }

    /// The token's text with character references decoded.
    pub fn resolved_text(&self, token: &Token) -> Cow<'_, str> {
        let text = self.token_text(token);
        match token.kind {
            TokenKind::Entity => resolve_entity(text),
            _ => Cow::Borrowed(text),
        }
    }

    /// The verbatim tag behind a [`TokenKind::Uniq`] token.
    pub fn uniq_entry(&self, token: &Token) -> Option<&UniqEntry> {
        match token.kind {
            TokenKind::Uniq => self.uniq.get(self.token_text(token)),
            _ => None,
        }
    }

    /// The interpretation of every apostrophe run, line by line.
    pub fn emphasis(&self) -> Result<Vec<Emphasis>, StyleError> {
        analyze_tokens(&self.tokens)
    }

    /// The expanded text with verbatim tags put back.
    pub fn expanded_source(&self) -> String {
        self.uniq.replace_uniq(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{style::Toggle, test_support::prelude::*};

    #[test]
    fn test_pipeline() {
        let resolver = german_resolver().with_page("Vorlage:Fett", "'''{{{1}}}'''");
        let document = Document::parse(
            "{{Fett|a &amp; b}}<ref name=x>{{Fett|y}}</ref>\n''z''",
            &resolver,
            test_options(),
        );

        assert_eq!(document.uniq().len(), 1);
        assert!(document.warnings().is_empty());
        assert!(!document.cancelled());

        let kinds: Vec<_> = document.tokens().iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::Uniq));
        assert_eq!(kinds.last(), Some(&TokenKind::End));

        let entity = document
            .tokens()
            .iter()
            .find(|t| t.kind == TokenKind::Entity)
            .unwrap();
        assert_eq!(document.token_text(entity), "&amp;");
        assert_eq!(document.resolved_text(entity), "&");

        let uniq = document
            .tokens()
            .iter()
            .find(|t| t.kind == TokenKind::Uniq)
            .unwrap();
        let entry = document.uniq_entry(uniq).unwrap();
        assert_eq!(entry.tag_name, "ref");
        // verbatim content is not expanded
        assert_eq!(entry.body, "{{Fett|y}}");
        assert_eq!(entry.attributes.get("name").map(String::as_str), Some("x"));

        let toggles: Vec<_> = document
            .emphasis()
            .unwrap()
            .into_iter()
            .map(|e| e.run.toggle)
            .collect();
        assert_eq!(
            toggles,
            vec![Toggle::Bold, Toggle::Bold, Toggle::Italic, Toggle::Italic]
        );

        assert_eq!(
            document.expanded_source(),
            "'''a &amp; b'''<ref name=x>{{Fett|y}}</ref>\n''z''"
        );
    }

    #[test]
    fn test_cancelled_document() {
        let resolver = german_resolver().with_page("Vorlage:X", "x");
        let cancel = || true;
        let document =
            Document::parse_with_cancel("a{{X}}b", &resolver, test_options(), Some(&cancel));
        assert!(document.cancelled());
        assert_eq!(
            document.text(),
            "a<span class=\"error\">Expansion cancelled</span>"
        );
        assert_eq!(document.warnings(), &[ExpansionWarning::Cancelled]);
    }
}
