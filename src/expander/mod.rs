//! Template expansion.
//!
//! [`Expander::expand`] parses its input into a [`parser::Node`] tree and evaluates it: template
//! invocations are looked up through the [`Resolver`], preprocessed for inclusion, uniquified,
//! parsed (once per expansion, the trees are cached) and evaluated in a new [`Frame`] holding
//! their arguments. Parser functions are dispatched to [`parser_fns`].
//!
//! Nothing in here fails. Exhausted limits, template loops, resolver errors and cancellation are
//! reported as inline error markers (stable `<span class="error">…</span>` strings) and as
//! [`ExpansionWarning`]s on the returned [`Expansion`].

pub mod expr;
pub mod parser;
pub mod parser_fns;
pub mod time;

use std::{borrow::Cow, rc::Rc};

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

use crate::{
    magics::{self, MagicWords, PageContext},
    namespace::{NsHandler, Title, NS_MAIN, NS_TEMPLATE},
    preprocessor::preprocess,
    resolver::Resolver,
    uniq::Uniquifier,
    utils::trim_in_place,
};
use parser::{Argument, EqSplit, Node};

/// Start of a template's output (only emitted with [`ExpandOptions::marks`]).
pub const MARK_START: char = '\u{E000}';
/// End of a template's output (only emitted with [`ExpandOptions::marks`]).
pub const MARK_END: char = '\u{E001}';
/// Placed before template output that starts with block markup (`{|`, `:`, `;`, `#`, `*`). Becomes
/// a newline unless the output already starts a line.
pub const MAYBE_NEWLINE: char = '\u{E002}';

const MAX_REDIRECTS: usize = 5;
const INVALID_TITLE_CHARS: &[char] = &['<', '>', '[', ']', '{', '}', '|', '\x7f', '\n'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    /// Templates open at the same time.
    pub max_depth: usize,
    /// Tree nodes evaluated in total.
    pub max_nodes: usize,
    /// Bytes produced by templates and parser functions in total.
    pub max_expansion_size: usize,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        ExpansionLimits {
            max_depth: 40,
            max_nodes: 1_000_000,
            max_expansion_size: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpandOptions {
    pub limits: ExpansionLimits,
    /// Title of the page being expanded; defaults to the main page.
    pub title: Option<String>,
    /// Time seen by `#time` and the `CURRENT*` variables; defaults to the time of the call.
    pub now: Option<DateTime<Utc>>,
    /// Wrap template output in [`MARK_START`]/[`MARK_END`].
    pub marks: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpansionWarning {
    #[error("expansion depth limit of {limit} exceeded when including {template}")]
    DepthLimit { template: String, limit: usize },
    #[error("node-count limit of {limit} exceeded")]
    NodeLimit { limit: usize },
    #[error("expansion size limit of {limit} bytes exceeded")]
    SizeLimit { limit: usize },
    #[error("template loop detected: {template}")]
    TemplateLoop { template: String },
    #[error("could not fetch {template}: {message}")]
    Resolver { template: String, message: String },
    #[error("{message}")]
    Expression { message: String },
    #[error("expansion cancelled")]
    Cancelled,
}

impl ExpansionWarning {
    /// The inline text inserted into the output, if any.
    pub fn marker(&self) -> Option<String> {
        let text = match self {
            ExpansionWarning::DepthLimit { .. } => "Expansion depth limit exceeded".to_string(),
            ExpansionWarning::NodeLimit { .. } => "Node-count limit exceeded".to_string(),
            ExpansionWarning::SizeLimit { .. } => "Expansion size limit exceeded".to_string(),
            ExpansionWarning::TemplateLoop { template } => {
                format!("Template loop detected: [[{template}]]")
            }
            ExpansionWarning::Cancelled => "Expansion cancelled".to_string(),
            ExpansionWarning::Resolver { .. } | ExpansionWarning::Expression { .. } => return None,
        };
        Some(format!("<span class=\"error\">{text}</span>"))
    }
}

#[derive(Debug, Clone)]
pub struct Expansion {
    pub text: String,
    pub warnings: Vec<ExpansionWarning>,
    pub cancelled: bool,
}

/// A template ready for evaluation.
#[derive(Debug)]
struct Template {
    /// Name the source was found under (differs from the invoked name after redirects).
    name: String,
    nodes: Vec<Node>,
}

/// Arguments of one template invocation. Positional arguments are stored under `"1"`, `"2"`, ….
#[derive(Debug)]
struct Frame {
    name: String,
    args: FxHashMap<String, String>,
}

pub struct Expander<'a> {
    resolver: &'a dyn Resolver,
    uniq: &'a mut Uniquifier,
    ns: NsHandler,
    magic: MagicWords,
    limits: ExpansionLimits,
    marks: bool,
    title: Title,
    now: DateTime<Utc>,
    cancel: Option<&'a dyn Fn() -> bool>,
    cache: FxHashMap<String, Option<Rc<Template>>>,
    frames: Vec<Frame>,
    nodes_visited: usize,
    expansion_size: usize,
    /// Marker of the limit that stopped evaluation.
    halted: Option<String>,
    cancelled: bool,
    warnings: Vec<ExpansionWarning>,
}

/// Remove [`MARK_START`], [`MARK_END`] and [`MAYBE_NEWLINE`].
pub fn strip_marks(text: &str) -> Cow<'_, str> {
    if text.contains(is_sentinel) {
        Cow::Owned(text.chars().filter(|&c| !is_sentinel(c)).collect())
    } else {
        Cow::Borrowed(text)
    }
}

fn is_sentinel(c: char) -> bool {
    matches!(c, MARK_START | MARK_END | MAYBE_NEWLINE)
}

fn starts_block(text: &str) -> bool {
    let text = text.trim_start_matches([MARK_START, MARK_END]);
    text.starts_with("{|") || text.starts_with([':', ';', '#', '*'])
}

/// Turn every [`MAYBE_NEWLINE`] into a newline unless it is at the start of the text or next to one.
fn resolve_maybe_newlines(text: String) -> String {
    if !text.contains(MAYBE_NEWLINE) {
        return text;
    }
    let mut result = String::with_capacity(text.len() + 8);
    for (i, c) in text.char_indices() {
        if c != MAYBE_NEWLINE {
            result.push(c);
            continue;
        }
        let before = result.chars().rev().find(|&c| !is_sentinel(c));
        let after = text[i + c.len_utf8()..].chars().find(|&c| !is_sentinel(c));
        if before.is_some_and(|b| b != '\n') && after != Some('\n') {
            result.push('\n');
        }
    }
    result
}

impl<'a> Expander<'a> {
    pub fn new(resolver: &'a dyn Resolver, uniq: &'a mut Uniquifier, options: ExpandOptions) -> Self {
        let site_info = resolver.site_info();
        let ns = NsHandler::new(site_info);
        let magic = MagicWords::new(site_info);
        let title = match &options.title {
            Some(title) => ns.split_title(title, NS_MAIN),
            None if !site_info.general.mainpage.is_empty() => {
                ns.split_title(&site_info.general.mainpage, NS_MAIN)
            }
            None => ns.split_title("Main Page", NS_MAIN),
        };

        Expander {
            resolver,
            uniq,
            ns,
            magic,
            limits: options.limits,
            marks: options.marks,
            title,
            now: options.now.unwrap_or_else(Utc::now),
            cancel: None,
            cache: FxHashMap::default(),
            frames: Vec::new(),
            nodes_visited: 0,
            expansion_size: 0,
            halted: None,
            cancelled: false,
            warnings: Vec::new(),
        }
    }

    /// Install a hook that is asked before every template inclusion whether to stop.
    pub fn with_cancel(mut self, cancel: &'a dyn Fn() -> bool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Expand all templates, parameters and parser functions in `text`.
    pub fn expand(mut self, text: &str) -> Expansion {
        let text = strip_marks(text);
        let nodes = parser::parse(&text, &self.magic);

        let mut out = String::with_capacity(text.len());
        self.eval_into(&mut out, &nodes);
        if let Some(marker) = &self.halted {
            if !out.contains(marker.as_str()) {
                out.push_str(marker);
            }
        }

        Expansion {
            text: resolve_maybe_newlines(out),
            warnings: self.warnings,
            cancelled: self.cancelled,
        }
    }

    fn page_context(&self) -> PageContext<'_> {
        PageContext {
            title: &self.title,
            ns: &self.ns,
            site_info: self.resolver.site_info(),
            now: self.now,
        }
    }

    /// Stop evaluating anything further.
    fn halt(&mut self, warning: ExpansionWarning, out: &mut String) {
        tracing::warn!(message = "expansion halted", reason = %warning);
        if let Some(marker) = warning.marker() {
            out.push_str(&marker);
            self.halted = Some(marker);
        } else {
            self.halted = Some(String::new());
        }
        self.warnings.push(warning);
    }

    fn eval_into(&mut self, out: &mut String, nodes: &[Node]) {
        for node in nodes {
            if self.halted.is_some() {
                return;
            }
            self.nodes_visited += 1;
            if self.nodes_visited > self.limits.max_nodes {
                let limit = self.limits.max_nodes;
                self.halt(ExpansionWarning::NodeLimit { limit }, out);
                return;
            }

            match node {
                Node::Text(text) | Node::Tag(text) => out.push_str(text),
                Node::Variable { name, default } => self.eval_variable(out, name, default.as_deref()),
                Node::Template { name, args } => self.eval_template(out, name, args),
                Node::ParserFunction { func, first, args } => {
                    let result = parser_fns::call(self, *func, first, args);
                    self.emit(out, result, false);
                }
            }
        }
    }

    /// Append the output of a template or parser function.
    fn emit(&mut self, out: &mut String, text: String, template: bool) {
        if self.halted.is_none() {
            self.expansion_size += text.len();
            if self.expansion_size > self.limits.max_expansion_size {
                let limit = self.limits.max_expansion_size;
                self.halt(ExpansionWarning::SizeLimit { limit }, out);
                return;
            }
        }
        if template && starts_block(&text) {
            out.push(MAYBE_NEWLINE);
        }
        if self.marks {
            out.push(MARK_START);
            out.push_str(&text);
            out.push(MARK_END);
        } else {
            out.push_str(&text);
        }
    }

    fn eval_variable(&mut self, out: &mut String, name: &[Node], default: Option<&[Node]>) {
        let name = self.eval_trimmed(name);
        if self.halted.is_some() {
            return;
        }
        let key = strip_marks(&name);
        if let Some(value) = self.frames.last().and_then(|frame| frame.args.get(key.as_ref())) {
            out.push_str(value);
            return;
        }
        match default {
            Some(default) => self.eval_into(out, default),
            None => {
                out.push_str("{{{");
                out.push_str(&name);
                out.push_str("}}}");
            }
        }
    }

    fn eval_template(&mut self, out: &mut String, name_nodes: &[Node], args: &[Argument]) {
        let name = self.eval_trimmed(name_nodes);
        let name = strip_marks(&name).into_owned();
        if self.halted.is_some() {
            return;
        }

        if args.is_empty() {
            if let Some(variable) = self.magic.variable(&name) {
                let value = magics::evaluate(variable, &self.page_context());
                self.emit(out, value, false);
                return;
            }
        }

        let target = match name.split_once('#') {
            Some((before, _)) => before.trim(),
            None => name.as_str(),
        };
        if target.is_empty() || target.contains(INVALID_TITLE_CHARS) {
            self.literal_invocation(out, &name, args);
            return;
        }

        if let Some(cancel) = self.cancel {
            if cancel() {
                self.cancelled = true;
                self.halt(ExpansionWarning::Cancelled, out);
                return;
            }
        }

        let fqname = self.ns.get_fqname(target, NS_TEMPLATE);
        if self.frames.iter().any(|frame| frame.name == fqname) {
            tracing::warn!(message = "template loop detected", template = fqname.as_str());
            let warning = ExpansionWarning::TemplateLoop { template: fqname };
            out.extend(warning.marker());
            self.warnings.push(warning);
            return;
        }
        if self.frames.len() >= self.limits.max_depth {
            tracing::warn!(
                message = "expansion depth limit exceeded",
                template = fqname.as_str(),
                limit = self.limits.max_depth
            );
            let warning = ExpansionWarning::DepthLimit {
                template: fqname,
                limit: self.limits.max_depth,
            };
            out.extend(warning.marker());
            self.warnings.push(warning);
            return;
        }

        let Some(template) = self.fetch(&fqname) else {
            self.literal_invocation(out, &name, args);
            return;
        };

        let frame = Frame {
            name: fqname,
            args: self.eval_template_args(args),
        };
        if template.name != frame.name {
            tracing::debug!(
                message = "following template redirect",
                from = frame.name.as_str(),
                to = template.name.as_str()
            );
        }
        self.frames.push(frame);
        let mut result = String::new();
        self.eval_into(&mut result, &template.nodes);
        self.frames.pop();

        self.emit(out, result, true);
    }

    /// Arguments in invocation order; later ones win.
    fn eval_template_args(&mut self, args: &[Argument]) -> FxHashMap<String, String> {
        let mut values = FxHashMap::default();
        let mut position = 0;
        for arg in args {
            match arg.eq {
                Some(split) => {
                    let key = self.eval_arg_name(arg, split);
                    let value = self.eval_arg_value(arg, split);
                    values.insert(strip_marks(&key).into_owned(), value);
                }
                None => {
                    position += 1;
                    let value = self.eval_argument(arg);
                    values.insert(position.to_string(), value);
                }
            }
        }
        values
    }

    /// `{{name|args}}` as text, for invocations that cannot be resolved.
    fn literal_invocation(&mut self, out: &mut String, name: &str, args: &[Argument]) {
        let mut literal = format!("{{{{{name}");
        for arg in args {
            literal.push('|');
            literal.push_str(&self.eval_argument(arg));
        }
        literal.push_str("}}");
        out.push_str(&literal);
    }

    /// Source of `fqname` ready for evaluation, following redirects.
    fn fetch(&mut self, fqname: &str) -> Option<Rc<Template>> {
        if let Some(cached) = self.cache.get(fqname) {
            tracing::debug!(message = "template cache hit", template = fqname);
            return cached.clone();
        }

        let template = self.load(fqname);
        self.cache.insert(fqname.to_string(), template.clone());
        template
    }

    fn load(&mut self, fqname: &str) -> Option<Rc<Template>> {
        let mut name = fqname.to_string();
        let mut visited = vec![name.clone()];
        loop {
            tracing::debug!(message = "fetching template", template = name.as_str());
            let source = match self.resolver.get_template(&name) {
                Ok(Some(source)) => source,
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(
                        message = "resolver failed",
                        template = name.as_str(),
                        error = %e
                    );
                    self.warnings.push(ExpansionWarning::Resolver {
                        template: name,
                        message: e.to_string(),
                    });
                    return None;
                }
            };

            match self.ns.redirect_matcher(&source) {
                Some(target)
                    if visited.len() <= MAX_REDIRECTS
                        && !visited.contains(&target)
                        && !self.frames.iter().any(|frame| frame.name == target) =>
                {
                    visited.push(target.clone());
                    name = target;
                }
                Some(_) => return None,
                None => {
                    let included = preprocess(&source, true);
                    let uniquified = self.uniq.replace_tags(&included);
                    let nodes = parser::parse(&uniquified, &self.magic);
                    return Some(Rc::new(Template { name, nodes }));
                }
            }
        }
    }

    pub(crate) fn eval_nodes(&mut self, nodes: &[Node]) -> String {
        let mut out = String::new();
        self.eval_into(&mut out, nodes);
        out
    }

    pub(crate) fn eval_trimmed(&mut self, nodes: &[Node]) -> String {
        trim_in_place(self.eval_nodes(nodes))
    }

    pub(crate) fn eval_argument(&mut self, arg: &Argument) -> String {
        self.eval_nodes(&arg.nodes)
    }

    pub(crate) fn eval_argument_trimmed(&mut self, arg: &Argument) -> String {
        self.eval_trimmed(&arg.nodes)
    }

    /// The trimmed value of argument `index`, or an empty string if there are fewer arguments.
    pub(crate) fn arg_trimmed(&mut self, args: &[Argument], index: usize) -> String {
        match args.get(index) {
            Some(arg) => self.eval_argument_trimmed(arg),
            None => String::new(),
        }
    }

    /// The part of a `name=value` argument before the `=`, trimmed.
    pub(crate) fn eval_arg_name(&mut self, arg: &Argument, split: EqSplit) -> String {
        let mut out = String::new();
        self.eval_into(&mut out, &arg.nodes[..split.node]);
        if let Some(Node::Text(text)) = arg.nodes.get(split.node) {
            out.push_str(&text[..split.offset]);
        }
        trim_in_place(out)
    }

    /// The part of a `name=value` argument after the `=`, trimmed.
    pub(crate) fn eval_arg_value(&mut self, arg: &Argument, split: EqSplit) -> String {
        let mut out = String::new();
        if let Some(Node::Text(text)) = arg.nodes.get(split.node) {
            out.push_str(&text[split.offset + 1..]);
        }
        self.eval_into(&mut out, &arg.nodes[split.node + 1..]);
        trim_in_place(out)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{resolver::DictResolver, test_support::prelude::*};

    fn expand_with(resolver: &DictResolver, text: &str, options: ExpandOptions) -> Expansion {
        let mut uniq = Uniquifier::with_nonce("test0000");
        Expander::new(resolver, &mut uniq, options).expand(text)
    }

    fn expand(resolver: &DictResolver, text: &str) -> String {
        let options = ExpandOptions {
            now: Some(fixed_now()),
            title: Some("Benutzer:Schmir/Test".to_string()),
            ..ExpandOptions::default()
        };
        expand_with(resolver, text, options).text
    }

    fn resolver() -> DictResolver {
        german_resolver()
            .with_page("Vorlage:Hallo", "Hallo {{{1|Welt}}}!")
            .with_page("Vorlage:Named", "[{{{a}}}|{{{b|-}}}|{{{1}}}]")
            .with_page("Vorlage:Umleitung", "#WEITERLEITUNG [[Vorlage:Hallo]]")
            .with_page("Vorlage:Selbst", "x{{Selbst}}y")
            .with_page("Vorlage:Ping", "{{Pong}}")
            .with_page("Vorlage:Pong", "{{Ping}}")
            .with_page("Vorlage:Doku", "<noinclude>Doku</noinclude>ok<includeonly>!</includeonly>")
            .with_page("Vorlage:Tabelle", "{|\n|a\n|}")
            .with_page("Vorlage:Rekursiv", "{{{1}}}{{Rekursiv2|{{{1}}}}}")
            .with_page("Vorlage:Rekursiv2", "-")
    }

    #[test]
    fn test_templates_and_parameters() {
        let resolver = resolver();
        assert_eq!(expand(&resolver, "{{Hallo}}"), "Hallo Welt!");
        assert_eq!(expand(&resolver, "{{hallo|Du}}"), "Hallo Du!");
        assert_eq!(expand(&resolver, "{{Vorlage:Hallo| Du }}"), "Hallo  Du !");
        assert_eq!(expand(&resolver, "{{Named| a = x |pos|b=}}"), "[x||pos]");
        assert_eq!(expand(&resolver, "{{Named|1=one|two}}"), "[{{{a}}}|-|two]");
        assert_eq!(expand(&resolver, "{{Doku}}"), "ok!");
        assert_eq!(expand(&resolver, "{{Hallo#Abschnitt|x}}"), "Hallo x!");
    }

    #[test]
    fn test_missing_and_invalid_templates_stay_literal() {
        let resolver = resolver();
        assert_eq!(expand(&resolver, "{{Fehlt|a|b=c}}"), "{{Fehlt|a|b=c}}");
        assert_eq!(expand(&resolver, "{{#unbekannt:x}}"), "{{#unbekannt:x}}");
        assert_eq!(expand(&resolver, "{{a<b}}"), "{{a<b}}");
        assert_eq!(expand(&resolver, "{{{1}}}"), "{{{1}}}");
        assert_eq!(expand(&resolver, "{{{1|dflt}}}"), "dflt");
    }

    #[test]
    fn test_redirect_is_followed() {
        assert_eq!(expand(&resolver(), "{{Umleitung|Du}}"), "Hallo Du!");
    }

    #[test]
    fn test_template_loop() {
        let resolver = resolver();
        let options = ExpandOptions {
            now: Some(fixed_now()),
            ..ExpandOptions::default()
        };
        let expansion = expand_with(&resolver, "{{Selbst}}", options.clone());
        assert_eq!(
            expansion.text,
            "x<span class=\"error\">Template loop detected: [[Vorlage:Selbst]]</span>y"
        );
        assert_eq!(
            expansion.warnings,
            vec![ExpansionWarning::TemplateLoop {
                template: "Vorlage:Selbst".to_string()
            }]
        );

        let expansion = expand_with(&resolver, "{{Ping}}", options);
        assert!(expansion.text.contains("Template loop detected: [[Vorlage:Ping]]"));
        assert!(!expansion.cancelled);
    }

    #[test]
    fn test_same_template_at_several_depths() {
        assert_eq!(expand(&resolver(), "{{Rekursiv|{{Rekursiv2}}}}"), "--");
    }

    #[test]
    fn test_depth_limit() {
        let mut resolver = german_resolver();
        for i in 0..10 {
            resolver.insert(&format!("Vorlage:T{i}"), format!("{i}{{{{T{}}}}}", i + 1));
        }
        let options = ExpandOptions {
            limits: ExpansionLimits {
                max_depth: 3,
                ..ExpansionLimits::default()
            },
            now: Some(fixed_now()),
            ..ExpandOptions::default()
        };
        let expansion = expand_with(&resolver, "{{T0}}", options);
        assert_eq!(
            expansion.text,
            "012<span class=\"error\">Expansion depth limit exceeded</span>"
        );
        assert!(matches!(
            expansion.warnings[..],
            [ExpansionWarning::DepthLimit { limit: 3, .. }]
        ));
    }

    #[test]
    fn test_node_and_size_limits() {
        let resolver = german_resolver().with_page("Vorlage:Lang", "x".repeat(100));
        let options = ExpandOptions {
            limits: ExpansionLimits {
                max_nodes: 5,
                ..ExpansionLimits::default()
            },
            now: Some(fixed_now()),
            ..ExpandOptions::default()
        };
        let expansion = expand_with(&resolver, "a{{!}}b{{!}}c{{!}}d", options);
        assert_eq!(
            expansion.text,
            "a|b<span class=\"error\">Node-count limit exceeded</span>"
        );

        let options = ExpandOptions {
            limits: ExpansionLimits {
                max_expansion_size: 250,
                ..ExpansionLimits::default()
            },
            now: Some(fixed_now()),
            ..ExpandOptions::default()
        };
        let expansion = expand_with(&resolver, "{{Lang}}{{Lang}}{{Lang}}{{Lang}}", options);
        assert_eq!(
            expansion.text,
            format!(
                "{}<span class=\"error\">Expansion size limit exceeded</span>",
                "x".repeat(200)
            )
        );
        assert_eq!(
            expansion.warnings,
            vec![ExpansionWarning::SizeLimit { limit: 250 }]
        );
    }

    #[test]
    fn test_cancellation() {
        let resolver = resolver();
        let calls = Cell::new(0);
        let cancel = || {
            calls.set(calls.get() + 1);
            calls.get() > 1
        };
        let mut uniq = Uniquifier::new();
        let expansion = Expander::new(&resolver, &mut uniq, ExpandOptions::default())
            .with_cancel(&cancel)
            .expand("{{Hallo}} {{Hallo}} {{Hallo}}");
        assert!(expansion.cancelled);
        assert_eq!(
            expansion.text,
            "Hallo Welt! <span class=\"error\">Expansion cancelled</span>"
        );
        assert_eq!(expansion.warnings, vec![ExpansionWarning::Cancelled]);
    }

    #[test]
    fn test_maybe_newline() {
        let resolver = resolver();
        assert_eq!(expand(&resolver, "{{Tabelle}}"), "{|\n|a\n|}");
        assert_eq!(expand(&resolver, "a{{Tabelle}}"), "a\n{|\n|a\n|}");
        assert_eq!(expand(&resolver, "a\n{{Tabelle}}"), "a\n{|\n|a\n|}");
    }

    #[test]
    fn test_marks() {
        let options = ExpandOptions {
            marks: true,
            now: Some(fixed_now()),
            ..ExpandOptions::default()
        };
        let expansion = expand_with(&resolver(), "a{{Hallo}}b", options);
        assert_eq!(expansion.text, "a\u{E000}Hallo Welt!\u{E001}b");
        assert_eq!(strip_marks(&expansion.text), "aHallo Welt!b");
        assert_eq!(resolve_maybe_newlines("x\u{E002}\u{E000}\ny".into()), "x\u{E000}\ny");
    }

    #[test]
    fn test_magic_variables() {
        let resolver = resolver();
        assert_eq!(expand(&resolver, "{{SEITENNAME}}"), "Schmir/Test");
        assert_eq!(expand(&resolver, "{{NAMESPACE}}"), "Benutzer");
        assert_eq!(expand(&resolver, "{{CURRENTYEAR}}-{{CURRENTMONTH}}"), "2008-03");
        assert_eq!(expand(&resolver, "a{{!}}b"), "a|b");
    }

    struct Counting {
        inner: DictResolver,
        fetches: Cell<usize>,
    }

    impl Resolver for Counting {
        fn get_template(&self, name: &str) -> Result<Option<String>, crate::resolver::ResolverError> {
            self.fetches.set(self.fetches.get() + 1);
            self.inner.get_template(name)
        }

        fn page_exists(&self, name: &str) -> bool {
            self.inner.page_exists(name)
        }

        fn site_info(&self) -> &crate::siteinfo::SiteInfo {
            self.inner.site_info()
        }
    }

    #[test]
    fn test_untaken_branches_are_not_expanded() {
        let resolver = Counting {
            inner: resolver(),
            fetches: Cell::new(0),
        };
        let run = |text: &str| {
            let mut uniq = Uniquifier::with_nonce("test0000");
            Expander::new(&resolver, &mut uniq, test_options()).expand(text).text
        };

        assert_eq!(run("{{#if: x | yes | {{Hallo}}}}"), "yes");
        assert_eq!(run("{{#ifeq: a | b | {{Hallo}} | no}}"), "no");
        assert_eq!(run("{{#switch: a | a = eins | b = {{Hallo}}}}"), "eins");
        assert_eq!(resolver.fetches.get(), 0);

        assert_eq!(run("{{#if: | yes | {{Hallo}}}}"), "Hallo Welt!");
        assert_eq!(resolver.fetches.get(), 1);
    }

    #[test]
    fn test_ifexist_asks_the_resolver() {
        let resolver = Counting {
            inner: resolver(),
            fetches: Cell::new(0),
        };
        let mut uniq = Uniquifier::with_nonce("test0000");
        let expansion = Expander::new(&resolver, &mut uniq, test_options())
            .expand("{{#ifexist: vorlage:hallo | ja | nein}} {{#ifexist: Fehlt | ja | nein}}");
        assert_eq!(expansion.text, "ja nein");
        assert_eq!(resolver.fetches.get(), 0);
    }

    #[test]
    fn test_expression_errors_stay_inline() {
        let expansion = expand_with(&resolver(), "a{{#expr: 1/0 }}b{{#expr: 2*3}}", test_options());
        assert_eq!(
            expansion.text,
            "a<strong class=\"error\">Division by zero.</strong>b6"
        );
        assert_eq!(
            expansion.warnings,
            vec![ExpansionWarning::Expression {
                message: "Division by zero.".to_string()
            }]
        );
        assert_eq!(
            expand(&resolver(), "{{#iferror: {{#expr: 1 + }} | kaputt | gut}}"),
            "kaputt"
        );
    }

    #[test]
    fn test_tag_creates_uniq_entry() {
        let resolver = resolver();
        let mut uniq = Uniquifier::with_nonce("test0000");
        let expansion = Expander::new(&resolver, &mut uniq, test_options())
            .expand("x{{#tag:ref|Inhalt {{Hallo}}|name=a}}y{{#tag:b|fett}}");
        assert_eq!(uniq.len(), 1);
        let entry = &uniq.entries()[0];
        assert_eq!(entry.tag_name, "ref");
        assert_eq!(entry.body, "Inhalt Hallo Welt!");
        assert_eq!(entry.attributes.get("name").map(String::as_str), Some("a"));
        assert_eq!(
            expansion.text,
            format!("x{}y<b>fett</b>", entry.placeholder)
        );
    }

    #[test]
    fn test_parser_functions_through_expansion() {
        let resolver = resolver();
        let cases = [
            ("{{#time: j. F Y | 2008-03-04}}", "4. März 2008"),
            ("{{#time: Y-m-d}}", "2008-03-04"),
            ("{{#date: Y | 1999}}", "1999"),
            ("{{padleft:7|3|0}}", "007"),
            ("{{padleft:7|3}}", "007"),
            ("{{padright:ab|5|xy}}", "abxyx"),
            ("{{urlencode:a b&c}}", "a+b%26c"),
            ("{{formatnum:1234567.5}}", "1.234.567,5"),
            ("{{formatnum:1.234,5|R}}", "1234.5"),
            ("{{#switch: b | a | b | c = abc | #default = d}}", "abc"),
            ("{{#switch: z | a = 1 | #default = d}}", "d"),
            ("{{#switch: z | a = 1 | #default = d | e}}", "e"),
            ("{{#switch: 01 | 1 = eins | zwei}}", "eins"),
            ("{{#sub:abc|1|9223372036854775807}}", "bc"),
            ("{{#titleparts:a/b/c|9223372036854775807|2}}", "b/c"),
            ("{{lc:ÄBC}}{{uc:äbc}}", "äbcÄBC"),
            ("{{#replace:a-b-c|-|+}}", "a+b+c"),
            ("{{#replace:a b|}}", "ab"),
        ];
        for (input, expected) in cases {
            assert_eq!(expand(&resolver, input), expected, "{input}");
        }
    }

    #[test]
    fn test_resolver_errors_are_recovered() {
        struct Failing(DictResolver);

        impl Resolver for Failing {
            fn get_template(&self, name: &str) -> Result<Option<String>, crate::resolver::ResolverError> {
                Err(crate::resolver::ResolverError::Unavailable {
                    name: name.to_string(),
                    reason: "offline".to_string(),
                })
            }

            fn page_exists(&self, name: &str) -> bool {
                self.0.page_exists(name)
            }

            fn site_info(&self) -> &crate::siteinfo::SiteInfo {
                self.0.site_info()
            }
        }

        let resolver = Failing(german_resolver());
        let mut uniq = Uniquifier::new();
        let expansion =
            Expander::new(&resolver, &mut uniq, ExpandOptions::default()).expand("a{{X|1}}b{{X}}");
        assert_eq!(expansion.text, "a{{X|1}}b{{X}}");
        // the failure is cached for the rest of the expansion
        assert!(matches!(
            expansion.warnings[..],
            [ExpansionWarning::Resolver { ref template, .. }] if template == "Vorlage:X"
        ));
    }
}
