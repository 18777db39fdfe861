use crate::error::Result;
use crate::indexer::extract::{
    dotted_chain, new_parser, node_line, node_span, node_text, normalize_signature, FileContext,
    LanguageExtractor, ParsedFile, RefSink,
};
use crate::model::{ImportRecord, SymbolId, SymbolKind, SymbolRecord};
use crate::util;
use std::collections::HashSet;
use std::sync::OnceLock;
use tree_sitter::{Node, Parser};

fn reserved() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            "break", "case", "chan", "const", "continue", "default", "defer", "else",
            "fallthrough", "for", "func", "go", "goto", "if", "import", "interface", "map",
            "package", "range", "return", "select", "struct", "switch", "type", "var",
            // predeclared identifiers
            "append", "cap", "close", "complex", "copy", "delete", "imag", "len", "make", "new",
            "panic", "print", "println", "real", "recover", "bool", "byte", "complex64",
            "complex128", "error", "float32", "float64", "int", "int8", "int16", "int32", "int64",
            "rune", "string", "uint", "uint8", "uint16", "uint32", "uint64", "uintptr", "nil",
            "true", "false", "iota", "any", "comparable",
        ]
        .into_iter()
        .collect()
    })
}

pub struct GoExtractor {
    parser: Parser,
}

impl GoExtractor {
    pub fn new() -> Result<Self> {
        let language = tree_sitter_go::LANGUAGE;
        Ok(Self {
            parser: new_parser(&language.into())?,
        })
    }
}

impl LanguageExtractor for GoExtractor {
    fn extract(&mut self, ctx: &FileContext<'_>, source: &str) -> Result<ParsedFile> {
        let mut output = ParsedFile::default();
        let tree = match self.parser.parse(source, None) {
            Some(tree) => tree,
            None => {
                output.parse_error = true;
                return Ok(output);
            }
        };
        let root = tree.root_node();
        let package = package_name(root, source).unwrap_or_else(|| util::file_stem(ctx.rel_path));

        let mut pending = Vec::new();
        pending.push(Pending::new(
            SymbolRecord {
                id: SymbolId::new(ctx.project, ctx.rel_path, SymbolKind::Module, package),
                kind: SymbolKind::Module,
                span: node_span(root),
                signature: None,
                doc: None,
                decorators: Vec::new(),
                exports: true,
                refs_out: Vec::new(),
                extends: Vec::new(),
                body_hash: util::body_hash(source),
                ref_count: 0,
            },
            source.to_string(),
        ));

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "import_declaration" => collect_imports(child, source, &mut output.imports),
                "function_declaration" => {
                    handle_function(ctx, child, source, None, &mut pending);
                }
                "method_declaration" => {
                    let owner = receiver_type(child, source);
                    handle_function(ctx, child, source, owner, &mut pending);
                }
                "type_declaration" => handle_type_declaration(ctx, child, source, &mut pending),
                "const_declaration" => handle_const_declaration(ctx, child, source, &mut pending),
                "package_clause" => {}
                _ => sweep(child, source, &mut pending[0].sink),
            }
        }

        for item in pending {
            let mut record = item.record;
            record.refs_out = item.sink.finish();
            output.bodies.push((record.id.clone(), item.body));
            output.symbols.push(record);
        }
        Ok(output)
    }
}

struct Pending {
    record: SymbolRecord,
    body: String,
    sink: RefSink<'static>,
}

impl Pending {
    fn new(record: SymbolRecord, body: String) -> Self {
        Self {
            record,
            body,
            sink: RefSink::new(reserved()),
        }
    }
}

fn package_name(root: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() == "package_clause" {
            let mut inner = child.walk();
            for item in child.named_children(&mut inner) {
                if item.kind() == "package_identifier" {
                    return Some(node_text(item, source));
                }
            }
        }
    }
    None
}

fn handle_function(
    ctx: &FileContext<'_>,
    node: Node<'_>,
    source: &str,
    owner: Option<String>,
    pending: &mut Vec<Pending>,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    let exported = name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
    let (kind, qual) = match owner {
        Some(owner) => (SymbolKind::Method, format!("{owner}.{name}")),
        None => (SymbolKind::Function, name),
    };
    let body_text = node_text(node, source);
    let record = SymbolRecord {
        id: SymbolId::new(ctx.project, ctx.rel_path, kind, qual),
        kind,
        span: node_span(node),
        signature: go_signature(node, source),
        doc: preceding_line_comments(node, source, "//"),
        decorators: Vec::new(),
        exports: exported,
        refs_out: Vec::new(),
        extends: Vec::new(),
        body_hash: util::body_hash(&body_text),
        ref_count: 0,
    };
    pending.push(Pending::new(record, body_text));
    let index = pending.len() - 1;
    if let Some(body) = node.child_by_field_name("body") {
        sweep(body, source, &mut pending[index].sink);
    }
}

fn receiver_type(node: Node<'_>, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for param in receiver.named_children(&mut cursor) {
        if param.kind() != "parameter_declaration" {
            continue;
        }
        let ty = param.child_by_field_name("type")?;
        let text = node_text(ty, source);
        let cleaned = text.trim_start_matches('*').trim();
        // Drop generic type parameters from the owner name.
        let base = cleaned.split('[').next().unwrap_or(cleaned);
        if !base.is_empty() {
            return Some(base.to_string());
        }
    }
    None
}

fn handle_type_declaration(
    ctx: &FileContext<'_>,
    node: Node<'_>,
    source: &str,
    pending: &mut Vec<Pending>,
) {
    let mut cursor = node.walk();
    for spec in node.named_children(&mut cursor) {
        if spec.kind() != "type_spec" {
            continue;
        }
        let Some(name_node) = spec.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name_node, source);
        let kind = match spec.child_by_field_name("type").map(|t| t.kind()) {
            Some("struct_type") => SymbolKind::Struct,
            Some("interface_type") => SymbolKind::Interface,
            _ => SymbolKind::Type,
        };
        let exported = name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
        let body_text = node_text(spec, source);
        let record = SymbolRecord {
            id: SymbolId::new(ctx.project, ctx.rel_path, kind, name),
            kind,
            span: node_span(spec),
            signature: None,
            doc: preceding_line_comments(node, source, "//"),
            decorators: Vec::new(),
            exports: exported,
            refs_out: Vec::new(),
            extends: Vec::new(),
            body_hash: util::body_hash(&body_text),
            ref_count: 0,
        };
        pending.push(Pending::new(record, body_text));
        let index = pending.len() - 1;
        if let Some(ty) = spec.child_by_field_name("type") {
            sweep(ty, source, &mut pending[index].sink);
        }
    }
}

fn handle_const_declaration(
    ctx: &FileContext<'_>,
    node: Node<'_>,
    source: &str,
    pending: &mut Vec<Pending>,
) {
    let mut cursor = node.walk();
    for spec in node.named_children(&mut cursor) {
        if spec.kind() != "const_spec" {
            continue;
        }
        let Some(name_node) = spec.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name_node, source);
        let exported = name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
        let body_text = node_text(spec, source);
        pending.push(Pending::new(
            SymbolRecord {
                id: SymbolId::new(ctx.project, ctx.rel_path, SymbolKind::Constant, name),
                kind: SymbolKind::Constant,
                span: node_span(spec),
                signature: None,
                doc: None,
                decorators: Vec::new(),
                exports: exported,
                refs_out: Vec::new(),
                extends: Vec::new(),
                body_hash: util::body_hash(&body_text),
                ref_count: 0,
            },
            body_text,
        ));
    }
}

fn go_signature(node: Node<'_>, source: &str) -> Option<String> {
    let params = node
        .child_by_field_name("parameters")
        .map(|p| node_text(p, source))?;
    let mut signature = params;
    if let Some(result) = node.child_by_field_name("result") {
        signature.push(' ');
        signature.push_str(&node_text(result, source));
    }
    Some(normalize_signature(&signature))
}

/// Consecutive line comments immediately above a declaration.
pub(crate) fn preceding_line_comments(
    node: Node<'_>,
    source: &str,
    marker: &str,
) -> Option<String> {
    let mut lines = Vec::new();
    let mut prev = node.prev_sibling();
    let mut expected_row = node.start_position().row;
    while let Some(comment) = prev {
        if comment.kind() != "comment" && comment.kind() != "line_comment" {
            break;
        }
        if comment.end_position().row + 1 != expected_row {
            break;
        }
        let text = node_text(comment, source);
        if !text.starts_with(marker) {
            break;
        }
        lines.push(
            text.trim_start_matches(marker)
                .trim_start_matches('/')
                .trim()
                .to_string(),
        );
        expected_row = comment.start_position().row;
        prev = comment.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join(" "))
}

fn sweep(node: Node<'_>, source: &str, sink: &mut RefSink<'_>) {
    match node.kind() {
        "call_expression" => {
            if let Some(function) = node.child_by_field_name("function") {
                if let Some(chain) = dotted_chain(function, source) {
                    sink.push(&chain);
                } else {
                    sweep(function, source, sink);
                }
            }
            if let Some(arguments) = node.child_by_field_name("arguments") {
                sweep(arguments, source, sink);
            }
            return;
        }
        "selector_expression" => {
            if let Some(chain) = dotted_chain(node, source) {
                sink.push(&chain);
                return;
            }
        }
        "identifier" | "type_identifier" | "field_identifier" => {
            sink.push(&node_text(node, source));
            return;
        }
        "interpreted_string_literal" | "raw_string_literal" | "comment" => return,
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        sweep(child, source, sink);
    }
}

fn collect_imports(node: Node<'_>, source: &str, imports: &mut Vec<ImportRecord>) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            match child.kind() {
                "import_spec_list" => stack.push(child),
                "import_spec" => {
                    let path = child
                        .child_by_field_name("path")
                        .map(|p| node_text(p, source))
                        .unwrap_or_default();
                    let module = path.trim_matches('"').to_string();
                    if module.is_empty() {
                        continue;
                    }
                    let alias = child
                        .child_by_field_name("name")
                        .map(|n| node_text(n, source))
                        .filter(|n| n != "_" && n != ".");
                    let default_name = module.rsplit('/').next().unwrap_or(&module).to_string();
                    imports.push(ImportRecord {
                        names: vec![alias.clone().unwrap_or(default_name)],
                        module,
                        alias,
                        line: node_line(child),
                    });
                }
                _ => {}
            }
        }
    }
}
