//! Brace matching: turns (uniquified) wiki text into a tree of template invocations, template
//! parameters and parser-function calls.
//!
//! The parser keeps an explicit stack of open `{{…`/`[[…` elements. A closing brace run is
//! matched against the innermost open brace run (three braces form a parameter, two a template)
//! and any surplus is re-opened or emitted as text, so `{{{{{1}}}}}` is a template whose name is a
//! parameter. `[[…]]` is tracked only so that pipes inside links do not split arguments.
//! Unclosed elements degrade to literal text.

use crate::{
    expander::parser_fns::ParserFn,
    magics::MagicWords,
    uniq::placeholder_len,
};

/// Opening braces (and link brackets) that may be pending at once; further openings are taken
/// literally. This bounds the depth of the produced tree.
pub const MAX_OPEN_BRACES: usize = 120;

/// Prefixes that are stripped from template names; expansion always happens in place.
const NAME_PREFIXES: &[&str] = &["subst:", "safesubst:", "msg:", "raw:"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    /// `{{{name|default}}}`
    Variable {
        name: Vec<Node>,
        default: Option<Vec<Node>>,
    },
    /// `{{name|args}}`
    Template { name: Vec<Node>, args: Vec<Argument> },
    /// `{{#func:first|args}}`
    ParserFunction {
        func: ParserFn,
        first: Vec<Node>,
        args: Vec<Argument>,
    },
    /// a uniq placeholder, passed through untouched
    Tag(String),
}

/// Position of the first top-level `=` of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqSplit {
    /// index of the text node containing the `=`
    pub node: usize,
    /// byte offset of the `=` within that node
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub nodes: Vec<Node>,
    pub eq: Option<EqSplit>,
}

#[derive(Debug, Default)]
struct Part {
    nodes: Vec<Node>,
    eq: Option<EqSplit>,
}

impl Part {
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.nodes.last_mut() {
            Some(Node::Text(last)) => last.push_str(text),
            _ => self.nodes.push(Node::Text(text.to_string())),
        }
    }

    fn push_node(&mut self, node: Node) {
        match node {
            Node::Text(text) => self.push_text(&text),
            node => self.nodes.push(node),
        }
    }

    fn push_eq(&mut self) {
        if self.eq.is_none() {
            let split = match self.nodes.last() {
                Some(Node::Text(last)) => EqSplit {
                    node: self.nodes.len() - 1,
                    offset: last.len(),
                },
                _ => {
                    self.nodes.push(Node::Text(String::new()));
                    EqSplit {
                        node: self.nodes.len() - 1,
                        offset: 0,
                    }
                }
            };
            self.eq = Some(split);
        }
        self.push_text("=");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opening {
    Braces,
    Link,
}

#[derive(Debug)]
struct Element {
    opening: Opening,
    /// number of unmatched opening braces (always 2 for links)
    count: usize,
    parts: Vec<Part>,
}

impl Element {
    fn new(opening: Opening, count: usize) -> Self {
        Element {
            opening,
            count,
            parts: vec![Part::default()],
        }
    }

    /// Append this element as literal text (plus the nodes found inside it) to `into`.
    fn flatten_into(self, into: &mut Part, closing: &str) {
        match self.opening {
            Opening::Braces => into.push_text(&"{".repeat(self.count)),
            Opening::Link => into.push_text("[["),
        }
        for (i, part) in self.parts.into_iter().enumerate() {
            if i > 0 {
                into.push_text("|");
            }
            for node in part.nodes {
                into.push_node(node);
            }
        }
        into.push_text(closing);
    }
}

struct Parser<'m> {
    magic: &'m MagicWords,
    root: Part,
    stack: Vec<Element>,
}

impl<'m> Parser<'m> {
    fn current(&mut self) -> &mut Part {
        match self.stack.last_mut() {
            Some(element) => element
                .parts
                .last_mut()
                .expect("elements always have at least one part"),
            None => &mut self.root,
        }
    }

    fn open_braces(&self) -> usize {
        self.stack.iter().map(|e| e.count).sum()
    }

    fn close_braces(&mut self, mut closing: usize) {
        while closing >= 2 {
            let Some(element) = self.stack.last() else {
                break;
            };
            if element.opening != Opening::Braces {
                break;
            }

            let matched = if element.count >= 3 && closing >= 3 { 3 } else { 2 };
            let Some(mut element) = self.stack.pop() else {
                break;
            };
            closing -= matched;
            element.count -= matched;

            let node = if matched == 3 {
                let mut parts = element.parts.into_iter();
                let name = parts.next().map(|p| p.nodes).unwrap_or_default();
                Node::Variable {
                    name,
                    default: parts.next().map(|p| p.nodes),
                }
            } else {
                self.invocation(element.parts)
            };

            match element.count {
                0 => self.current().push_node(node),
                1 => {
                    let current = self.current();
                    current.push_text("{");
                    current.push_node(node);
                }
                count => {
                    let mut reopened = Element::new(Opening::Braces, count);
                    reopened.parts[0].push_node(node);
                    self.stack.push(reopened);
                }
            }
        }
        self.current().push_text(&"}".repeat(closing));
    }

    /// Build a template or parser-function node from the parts of `{{…}}`.
    fn invocation(&self, parts: Vec<Part>) -> Node {
        let mut parts = parts.into_iter();
        let mut name = parts.next().map(|p| p.nodes).unwrap_or_default();
        let args: Vec<Argument> = parts
            .map(|p| Argument {
                nodes: p.nodes,
                eq: p.eq,
            })
            .collect();

        if let Some(Node::Text(head)) = name.first_mut() {
            let mut stripped = head.trim_start();
            'prefixes: loop {
                for prefix in NAME_PREFIXES {
                    if stripped.len() >= prefix.len()
                        && stripped.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
                    {
                        stripped = stripped[prefix.len()..].trim_start();
                        continue 'prefixes;
                    }
                }
                break;
            }

            let function = stripped.split_once(':').and_then(|(candidate, rest)| {
                self.magic
                    .function(candidate)
                    .map(|func| (func, rest.to_string()))
            });
            let stripped = (stripped.len() != head.len()).then(|| stripped.to_string());

            if let Some((func, rest)) = function {
                let mut first = Vec::new();
                if !rest.is_empty() {
                    first.push(Node::Text(rest));
                }
                first.extend(name.drain(1..));
                return Node::ParserFunction { func, first, args };
            }
            if let Some(stripped) = stripped {
                *head = stripped;
            }
        }

        Node::Template { name, args }
    }

    fn finish(mut self) -> Vec<Node> {
        while let Some(element) = self.stack.pop() {
            element.flatten_into(self.current(), "");
        }
        self.root.nodes
    }
}

fn is_special(b: u8) -> bool {
    matches!(b, b'{' | b'}' | b'[' | b']' | b'|' | b'=' | 0x7f)
}

/// Parse `text` into template nodes, recognizing parser functions by the names in `magic`.
pub fn parse(text: &str, magic: &MagicWords) -> Vec<Node> {
    let bytes = text.as_bytes();
    let mut parser = Parser {
        magic,
        root: Part::default(),
        stack: Vec::new(),
    };

    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        while pos < bytes.len() && !is_special(bytes[pos]) {
            pos += 1;
        }
        if pos > start {
            parser.current().push_text(&text[start..pos]);
        }
        if pos >= bytes.len() {
            break;
        }

        let b = bytes[pos];
        let run = bytes[pos..].iter().take_while(|&&c| c == b).count();
        match b {
            b'{' => {
                if run >= 2 && parser.open_braces() + run <= MAX_OPEN_BRACES {
                    parser.stack.push(Element::new(Opening::Braces, run));
                } else {
                    parser.current().push_text(&text[pos..pos + run]);
                }
                pos += run;
            }
            b'}' => {
                parser.close_braces(run);
                pos += run;
            }
            b'[' => {
                if run >= 2 && parser.open_braces() + 2 <= MAX_OPEN_BRACES {
                    // a longer run leaves its surplus as text before the link
                    parser.current().push_text(&text[pos..pos + run - 2]);
                    parser.stack.push(Element::new(Opening::Link, 2));
                } else {
                    parser.current().push_text(&text[pos..pos + run]);
                }
                pos += run;
            }
            b']' => {
                if run >= 2 && matches!(parser.stack.last(), Some(e) if e.opening == Opening::Link) {
                    if let Some(link) = parser.stack.pop() {
                        link.flatten_into(parser.current(), "]]");
                    }
                    pos += 2;
                } else {
                    parser.current().push_text("]");
                    pos += 1;
                }
            }
            b'|' => {
                match parser.stack.last_mut() {
                    Some(element) => element.parts.push(Part::default()),
                    None => parser.root.push_text("|"),
                }
                pos += 1;
            }
            b'=' => {
                let in_argument = matches!(
                    parser.stack.last(),
                    Some(e) if e.opening == Opening::Braces && e.parts.len() > 1
                );
                if in_argument {
                    parser.current().push_eq();
                } else {
                    parser.current().push_text("=");
                }
                pos += 1;
            }
            _ => match placeholder_len(&bytes[pos..]) {
                Some(len) => {
                    parser
                        .current()
                        .push_node(Node::Tag(text[pos..pos + len].to_string()));
                    pos += len;
                }
                None => {
                    parser.current().push_text("\x7f");
                    pos += 1;
                }
            },
        }
    }

    parser.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::prelude::*;

    fn text(s: &str) -> Node {
        Node::Text(s.to_string())
    }

    fn p(input: &str) -> Vec<Node> {
        parse(input, &MagicWords::new(&german_site_info()))
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(p("a = b | c ]] }}"), vec![text("a = b | c ]] }}")]);
        assert_eq!(p(""), vec![]);
    }

    #[test]
    fn test_template_with_arguments() {
        let nodes = p("x{{Foo| a |k = v|[[l|m]]}}y");
        assert_eq!(nodes.len(), 3);
        let Node::Template { name, args } = &nodes[1] else {
            panic!("expected template, got {:?}", nodes[1]);
        };
        assert_eq!(name, &vec![text("Foo")]);
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].nodes, vec![text(" a ")]);
        assert_eq!(args[0].eq, None);
        assert_eq!(args[1].nodes, vec![text("k = v")]);
        assert_eq!(args[1].eq, Some(EqSplit { node: 0, offset: 2 }));
        assert_eq!(args[2].nodes, vec![text("[[l|m]]")]);
    }

    #[test]
    fn test_variable_and_default() {
        assert_eq!(
            p("{{{1|{{{2}}}}}}"),
            vec![Node::Variable {
                name: vec![text("1")],
                default: Some(vec![Node::Variable {
                    name: vec![text("2")],
                    default: None
                }]),
            }]
        );
    }

    #[test]
    fn test_brace_surplus() {
        // five braces: parameter inside a template name
        let nodes = p("{{{{{1}}}}}");
        let Node::Template { name, args } = &nodes[0] else {
            panic!("expected template, got {nodes:?}");
        };
        assert!(args.is_empty());
        assert!(matches!(name[0], Node::Variable { .. }));

        // four braces: one literal brace on each side
        let nodes = p("{{{{x}}}}");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], text("{"));
        assert!(matches!(nodes[1], Node::Variable { .. }));
        assert_eq!(nodes[2], text("}"));
    }

    #[test]
    fn test_unclosed_is_literal() {
        assert_eq!(p("{{a|b"), vec![text("{{a|b")]);
        assert_eq!(p("a}}b"), vec![text("a}}b")]);

        let nodes = p("[[a|{{b}}");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0], text("[[a|"));
        assert!(matches!(nodes[1], Node::Template { .. }));
    }

    #[test]
    fn test_parser_function_detection() {
        let nodes = p("{{#if: {{{1}}} | yes | no}}");
        let Node::ParserFunction { func, first, args } = &nodes[0] else {
            panic!("expected parser function, got {nodes:?}");
        };
        assert_eq!(*func, ParserFn::If);
        assert_eq!(first[0], text(" "));
        assert!(matches!(first[1], Node::Variable { .. }));
        assert_eq!(first[2], text(" "));
        assert_eq!(args.len(), 2);

        assert!(matches!(
            p("{{ subst:LC:ABC}}")[0],
            Node::ParserFunction { func: ParserFn::Lc, .. }
        ));
        assert!(matches!(
            p("{{#wenn:x|y}}")[0],
            Node::ParserFunction { func: ParserFn::If, .. }
        ));
        // not a function: template in the main namespace
        assert!(matches!(p("{{Foo:bar}}")[0], Node::Template { .. }));
        let Node::Template { name, .. } = &p("{{msg:Foo}}")[0] else {
            panic!();
        };
        assert_eq!(name, &vec![text("Foo")]);
    }

    #[test]
    fn test_parser_function_keeps_all_first_nodes() {
        let nodes = p("{{ safesubst: #if:a{{{1}}}b|y}}");
        let Node::ParserFunction { func, first, args } = &nodes[0] else {
            panic!("expected parser function, got {nodes:?}");
        };
        assert_eq!(*func, ParserFn::If);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0], text("a"));
        assert!(matches!(first[1], Node::Variable { .. }));
        assert_eq!(first[2], text("b"));
        assert_eq!(args.len(), 1);

        // only the head text node is rewritten for templates
        let Node::Template { name, .. } = &p("{{ raw:Foo{{{1}}}}}")[0] else {
            panic!();
        };
        assert_eq!(name[0], text("Foo"));
        assert!(matches!(name[1], Node::Variable { .. }));
    }

    #[test]
    fn test_placeholders_become_tags() {
        let placeholder = crate::uniq::placeholder("abcdefgh", 3);
        let nodes = p(&format!("a{placeholder}b"));
        assert_eq!(
            nodes,
            vec![text("a"), Node::Tag(placeholder.clone()), text("b")]
        );
        assert_eq!(p("\x7fx"), vec![text("\x7fx")]);
    }

    #[test]
    fn test_nesting_limit() {
        let run = "{{".repeat(MAX_OPEN_BRACES) + &"}}".repeat(MAX_OPEN_BRACES);
        assert_eq!(p(&run), vec![text(&run)]);

        let nested = "{{x|".repeat(MAX_OPEN_BRACES) + &"}}".repeat(MAX_OPEN_BRACES);
        let nodes = p(&nested);
        assert!(matches!(nodes[0], Node::Template { .. }));
    }
}
