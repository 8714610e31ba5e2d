use crate::{
    document::Document,
    entities::resolve_entity,
    expand,
    expander::{ExpansionLimits, ExpansionWarning},
    namespace::NS_TEMPLATE,
    resolver::DictResolver,
    scanner::{scan, TokenKind},
    style::{analyze, Toggle},
    test_support::prelude::*,
    uniq::Uniquifier,
};

fn expand_default(resolver: &DictResolver, text: &str) -> String {
    let limits = ExpansionLimits::default();
    expand(
        text,
        resolver,
        limits.max_depth,
        limits.max_nodes,
        limits.max_expansion_size,
    )
}

fn roundtrip(text: &str) -> String {
    let mut uniquifier = Uniquifier::new();
    let replaced = uniquifier.replace_tags(text);
    uniquifier.replace_uniq(&replaced)
}

#[test]
fn test_entity_scenarios() {
    assert_eq!(resolve_entity("&amp;"), "&");
    assert_eq!(resolve_entity("&#32;"), " ");
    assert_eq!(resolve_entity("&#x1000000;"), "&#x1000000;");
}

#[test]
fn test_scanner_scenarios() {
    for input in ["<code>{|</code>", "foo {| bar"] {
        let tokens = scan(input);
        assert!(
            tokens.iter().all(|t| t.kind != TokenKind::BeginTable),
            "{input:?} must not open a table"
        );
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::End));
    }
}

#[test]
fn test_uniquifier_scenarios() {
    assert_eq!(roundtrip("abc<nowiki></nowiki>def"), "abcdef");
    assert_eq!(roundtrip("foo<!-- bla -->bar"), "foobar");
}

#[test]
fn test_namespace_scenarios() {
    let ns = german_ns();
    assert_eq!(ns.get_fqname("user:Schmir", 0), "Benutzer:Schmir");
    assert_eq!(ns.get_fqname(":schmir", NS_TEMPLATE), "Schmir");
    assert_eq!(
        ns.redirect_matcher("#WEITERLEITUNG [[Data structure]]").as_deref(),
        Some("Data structure")
    );
}

#[test]
fn test_expand_scenarios() {
    let resolver = german_resolver();
    assert_eq!(expand_default(&resolver, "{{#if: x | yes | no}}"), "yes");
    assert_eq!(expand_default(&resolver, "{{#ifeq: a | a | eq | ne}}"), "eq");
}

#[test]
fn test_style_scenarios() {
    let toggles = |counts: &[u32]| -> Vec<Toggle> {
        analyze(counts).unwrap().into_iter().map(|r| r.toggle).collect()
    };
    assert_eq!(toggles(&[3, 3]), vec![Toggle::Bold, Toggle::Bold]);
    assert_eq!(
        toggles(&[2, 3, 2]),
        vec![Toggle::Italic, Toggle::Bold, Toggle::Italic]
    );
}

#[test]
fn test_expand_restores_verbatim_content() {
    let resolver = german_resolver().with_page("Vorlage:Hallo", "Hallo {{{1|Welt}}}!");
    assert_eq!(
        expand_default(&resolver, "{{Hallo|<nowiki>{{x}}</nowiki>}}"),
        "Hallo <nowiki>{{x}}</nowiki>!"
    );
    assert_eq!(
        expand_default(&resolver, "<pre>{{Hallo}}</pre>{{Hallo}}"),
        "<pre>{{Hallo}}</pre>Hallo Welt!"
    );
}

#[test]
fn test_document_with_templates() {
    let resolver = german_resolver()
        .with_page("Vorlage:Infobox", "{|\n! {{{titel|Ohne}}}\n|}")
        .with_page("Vorlage:Weiter", "#WEITERLEITUNG [[Vorlage:Infobox]]");
    let document = Document::parse(
        "{{Weiter|titel=''Berlin''}}\n{{#switch: b | a = 1 | b = 2 }}",
        &resolver,
        test_options(),
    );

    assert_eq!(document.text(), "{|\n! ''Berlin''\n|}\n2");
    assert!(document.warnings().is_empty());
    assert!(document
        .tokens()
        .iter()
        .any(|t| t.kind == TokenKind::BeginTable));

    let toggles: Vec<_> = document
        .emphasis()
        .unwrap()
        .into_iter()
        .map(|e| e.run.toggle)
        .collect();
    assert_eq!(toggles, vec![Toggle::Italic, Toggle::Italic]);
}

#[test]
fn test_document_reports_loops() {
    let resolver = german_resolver()
        .with_page("Vorlage:Ping", "{{Pong}}")
        .with_page("Vorlage:Pong", "{{Ping}}");
    let document = Document::parse("a{{Ping}}b", &resolver, test_options());

    assert!(document.text().starts_with('a'));
    assert!(document.text().ends_with('b'));
    assert!(matches!(
        document.warnings(),
        [ExpansionWarning::TemplateLoop { .. }]
    ));
}

fn resolver_with(templates: &[(String, String)]) -> DictResolver {
    templates
        .iter()
        .fold(german_resolver(), |resolver, (name, body)| {
            resolver.with_page(&format!("Vorlage:{name}"), body.as_str())
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 300,
        ..ProptestConfig::default()
    })]
    #[test]
    fn document_pipeline_is_total_and_deterministic(
        text in proptest_support::wikitext(),
        templates in proptest_support::templates(),
    ) {
        let resolver = resolver_with(&templates);
        let first = Document::parse(&text, &resolver, test_options());
        let second = Document::parse(&text, &resolver, test_options());

        prop_assert_eq!(first.expanded_source(), second.expanded_source());
        prop_assert_eq!(first.warnings(), second.warnings());

        let last = first.tokens().last().copied();
        prop_assert_eq!(last.map(|t| t.kind), Some(TokenKind::End));
        prop_assert_eq!(last.map(|t| t.start as usize), Some(first.text().len()));

        let emphasis = first.emphasis();
        prop_assert!(emphasis.is_ok());
        let styles = first
            .tokens()
            .iter()
            .filter(|t| t.kind == TokenKind::Style)
            .count();
        prop_assert_eq!(emphasis.map(|e| e.len()).unwrap_or_default(), styles);
    }
}
