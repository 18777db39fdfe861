use crate::error::Result;
use crate::model::{CallSite, ImportRecord, RouteDecl, Span, SymbolId, SymbolRecord};
use std::collections::HashSet;
use tree_sitter::{Language, Node, Parser};

/// Everything one parser produces for one file. Bundles are immutable once
/// handed to the reducer.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub symbols: Vec<SymbolRecord>,
    pub imports: Vec<ImportRecord>,
    pub routes: Vec<RouteDecl>,
    pub calls: Vec<CallSite>,
    /// Body text per symbol, for the content sidecar.
    pub bodies: Vec<(SymbolId, String)>,
    pub parse_error: bool,
}

impl ParsedFile {
    /// Shift every line-based position by `offset` lines. Used when a
    /// parser ran over an embedded block (Vue `<script>`).
    pub fn shift_lines(&mut self, offset: u32) {
        for symbol in &mut self.symbols {
            symbol.span.start_line += offset;
            symbol.span.end_line += offset;
        }
        for import in &mut self.imports {
            import.line += offset;
        }
        for call in &mut self.calls {
            call.line += offset;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FileContext<'a> {
    pub project: &'a str,
    pub rel_path: &'a str,
}

/// Uniform contract every language parser implements. Parsers are total: a
/// bad construct is skipped, never the whole file; undecodable input is the
/// caller's problem and arrives here already as UTF-8.
pub trait LanguageExtractor: Send {
    fn extract(&mut self, ctx: &FileContext<'_>, source: &str) -> Result<ParsedFile>;
}

pub fn new_parser(language: &Language) -> Result<Parser> {
    let mut parser = Parser::new();
    parser.set_language(language).map_err(|err| {
        crate::error::EngineError::Input(format!("tree-sitter language setup: {err}"))
    })?;
    let timeout_secs = crate::config::Config::get().parse_timeout_secs;
    parser.set_timeout_micros(timeout_secs * 1_000_000);
    Ok(parser)
}

pub fn node_text(node: Node<'_>, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or("").to_string()
}

/// 1-indexed inclusive line span.
pub fn node_span(node: Node<'_>) -> Span {
    Span::new(
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    )
}

pub fn node_line(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// Collapse whitespace runs in a signature to single spaces.
pub fn normalize_signature(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !last_space && !out.is_empty() {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim().to_string()
}

/// Collector for the per-symbol identifier sweep. Accepts bare identifiers
/// and dotted chains up to three segments, drops reserved words and
/// duplicates, keeps first-seen order for determinism.
pub struct RefSink<'a> {
    reserved: &'a HashSet<&'static str>,
    seen: HashSet<String>,
    refs: Vec<String>,
}

impl<'a> RefSink<'a> {
    pub fn new(reserved: &'a HashSet<&'static str>) -> Self {
        Self {
            reserved,
            seen: HashSet::new(),
            refs: Vec::new(),
        }
    }

    pub fn push(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() || name.len() > 200 {
            return;
        }
        let mut segments: Vec<&str> = name.split('.').collect();
        // `self.total()` refers to the sibling `total`, not to `self`.
        while segments.len() > 1 && matches!(segments[0], "self" | "this" | "cls") {
            segments.remove(0);
        }
        if segments.len() > 3 {
            return;
        }
        if !segments.iter().all(|seg| is_identifier(seg)) {
            return;
        }
        if self.reserved.contains(segments[0]) {
            return;
        }
        let name = segments.join(".");
        if self.seen.insert(name.clone()) {
            self.refs.push(name);
        }
    }

    pub fn finish(self) -> Vec<String> {
        self.refs
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Dotted-chain text for member-access style nodes, or None when the
/// expression is more complex than `a.b.c` (calls in the chain, indexing).
pub fn dotted_chain(node: Node<'_>, source: &str) -> Option<String> {
    let text = node_text(node, source);
    let trimmed = text.trim();
    if trimmed.contains(|c: char| c.is_whitespace() || c == '(' || c == '[' || c == '!') {
        return None;
    }
    let normalized = trimmed
        .replace("?.", ".")
        .replace("::", ".")
        .replace("->", ".");
    let segments: Vec<&str> = normalized.split('.').collect();
    if segments.is_empty() || segments.len() > 3 {
        return None;
    }
    if !segments.iter().all(|seg| is_identifier(seg)) {
        return None;
    }
    Some(segments.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_sink_filters_reserved_and_dedups() {
        let reserved: HashSet<&'static str> = ["if", "return"].into_iter().collect();
        let mut sink = RefSink::new(&reserved);
        sink.push("foo");
        sink.push("foo");
        sink.push("if");
        sink.push("obj.method");
        sink.push("a.b.c.d");
        sink.push("not an ident");
        assert_eq!(sink.finish(), vec!["foo", "obj.method"]);
    }

    #[test]
    fn normalize_signature_collapses_whitespace() {
        assert_eq!(
            normalize_signature("(a: int,\n    b: str) ->  bool"),
            "(a: int, b: str) -> bool"
        );
    }
}
