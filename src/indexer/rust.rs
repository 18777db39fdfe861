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
            "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
            "extern", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
            "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait",
            "true", "false", "type", "unsafe", "use", "where", "while",
            // prelude names that never trace to a workspace definition
            "Some", "None", "Ok", "Err", "String", "Vec", "Box", "Option", "Result", "Arc", "Rc",
            "Clone", "Copy", "Debug", "Default", "Drop", "Send", "Sync", "Iterator", "Into",
            "From", "ToString", "println", "eprintln", "print", "format", "vec", "panic",
            "assert", "assert_eq", "assert_ne", "todo", "unimplemented", "unreachable", "write",
            "writeln", "matches", "usize", "isize", "u8", "u16", "u32", "u64", "u128", "i8",
            "i16", "i32", "i64", "i128", "f32", "f64", "bool", "char", "str",
        ]
        .into_iter()
        .collect()
    })
}

pub struct RustExtractor {
    parser: Parser,
}

impl RustExtractor {
    pub fn new() -> Result<Self> {
        let language = tree_sitter_rust::LANGUAGE;
        Ok(Self {
            parser: new_parser(&language.into())?,
        })
    }
}

impl LanguageExtractor for RustExtractor {
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
        let module = util::file_stem(ctx.rel_path);

        let mut pending = Vec::new();
        pending.push(Pending::new(
            SymbolRecord {
                id: SymbolId::new(ctx.project, ctx.rel_path, SymbolKind::Module, module),
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

        let walker = Walk { ctx: *ctx, source };
        walker.walk_items(root, None, &mut pending, &mut output);

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

struct Walk<'a> {
    ctx: FileContext<'a>,
    source: &'a str,
}

impl<'a> Walk<'a> {
    fn walk_items(
        &self,
        container: Node<'_>,
        owner_type: Option<&str>,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
    ) {
        let mut cursor = container.walk();
        for item in container.named_children(&mut cursor) {
            match item.kind() {
                "function_item" | "function_signature_item" => {
                    self.handle_function(item, owner_type, pending);
                }
                "struct_item" => {
                    self.handle_named(item, SymbolKind::Struct, pending);
                }
                "enum_item" => {
                    self.handle_named(item, SymbolKind::Enum, pending);
                }
                "trait_item" => {
                    self.handle_named(item, SymbolKind::Trait, pending);
                    if let Some(body) = item.child_by_field_name("body") {
                        let name = item
                            .child_by_field_name("name")
                            .map(|n| node_text(n, self.source));
                        self.walk_items(body, name.as_deref(), pending, output);
                    }
                }
                "type_item" => {
                    self.handle_named(item, SymbolKind::Type, pending);
                }
                "const_item" | "static_item" => {
                    self.handle_named(item, SymbolKind::Constant, pending);
                }
                "impl_item" => {
                    let type_name = item
                        .child_by_field_name("type")
                        .map(|t| base_type_name(t, self.source));
                    if let Some(body) = item.child_by_field_name("body") {
                        self.walk_items(body, type_name.as_deref(), pending, output);
                    }
                }
                "mod_item" => {
                    self.handle_mod(item, pending, output);
                }
                "use_declaration" => {
                    collect_use(item, self.source, &mut output.imports);
                }
                "line_comment" | "block_comment" | "attribute_item" | "inner_attribute_item" => {}
                _ => {
                    sweep(item, self.source, &mut pending[0].sink);
                }
            }
        }
    }

    fn handle_function(
        &self,
        node: Node<'_>,
        owner_type: Option<&str>,
        pending: &mut Vec<Pending>,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let (kind, qual) = match owner_type {
            Some(owner) => (SymbolKind::Method, format!("{owner}.{name}")),
            None => (SymbolKind::Function, name),
        };
        let body_text = node_text(node, self.source);
        let record = SymbolRecord {
            id: SymbolId::new(self.ctx.project, self.ctx.rel_path, kind, qual),
            kind,
            span: node_span(node),
            signature: rust_signature(node, self.source),
            doc: doc_comments(node, self.source),
            decorators: Vec::new(),
            exports: is_pub(node, self.source),
            refs_out: Vec::new(),
            extends: Vec::new(),
            body_hash: util::body_hash(&body_text),
            ref_count: 0,
        };
        pending.push(Pending::new(record, body_text));
        let index = pending.len() - 1;
        if let Some(body) = node.child_by_field_name("body") {
            sweep(body, self.source, &mut pending[index].sink);
        }
    }

    fn handle_named(&self, node: Node<'_>, kind: SymbolKind, pending: &mut Vec<Pending>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let body_text = node_text(node, self.source);
        let record = SymbolRecord {
            id: SymbolId::new(self.ctx.project, self.ctx.rel_path, kind, name),
            kind,
            span: node_span(node),
            signature: None,
            doc: doc_comments(node, self.source),
            decorators: Vec::new(),
            exports: is_pub(node, self.source),
            refs_out: Vec::new(),
            extends: Vec::new(),
            body_hash: util::body_hash(&body_text),
            ref_count: 0,
        };
        pending.push(Pending::new(record, body_text));
        let index = pending.len() - 1;
        if let Some(body) = node.child_by_field_name("body") {
            sweep(body, self.source, &mut pending[index].sink);
        }
    }

    fn handle_mod(&self, node: Node<'_>, pending: &mut Vec<Pending>, output: &mut ParsedFile) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let body_text = node_text(node, self.source);
        let record = SymbolRecord {
            id: SymbolId::new(
                self.ctx.project,
                self.ctx.rel_path,
                SymbolKind::Module,
                name.clone(),
            ),
            kind: SymbolKind::Module,
            span: node_span(node),
            signature: None,
            doc: doc_comments(node, self.source),
            decorators: Vec::new(),
            exports: is_pub(node, self.source),
            refs_out: Vec::new(),
            extends: Vec::new(),
            body_hash: util::body_hash(&body_text),
            ref_count: 0,
        };
        pending.push(Pending::new(record, body_text));
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_items(body, None, pending, output);
        }
    }
}

fn base_type_name(node: Node<'_>, source: &str) -> String {
    let text = node_text(node, source);
    let no_generics = text.split('<').next().unwrap_or(&text);
    no_generics
        .rsplit("::")
        .next()
        .unwrap_or(no_generics)
        .trim()
        .to_string()
}

fn is_pub(node: Node<'_>, source: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            return node_text(child, source).starts_with("pub");
        }
    }
    false
}

fn rust_signature(node: Node<'_>, source: &str) -> Option<String> {
    let params = node
        .child_by_field_name("parameters")
        .map(|p| node_text(p, source))?;
    let mut signature = params;
    if let Some(ret) = node.child_by_field_name("return_type") {
        signature.push_str(" -> ");
        signature.push_str(&node_text(ret, source));
    }
    Some(normalize_signature(&signature))
}

/// `///` doc comments directly above an item.
fn doc_comments(node: Node<'_>, source: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut prev = node.prev_sibling();
    let mut expected_row = node.start_position().row;
    while let Some(comment) = prev {
        match comment.kind() {
            "line_comment" | "attribute_item" => {}
            _ => break,
        }
        if comment.end_position().row + 1 != expected_row {
            break;
        }
        expected_row = comment.start_position().row;
        let text = node_text(comment, source);
        if comment.kind() == "line_comment" {
            if !text.starts_with("///") {
                break;
            }
            lines.push(text.trim_start_matches('/').trim().to_string());
        }
        prev = comment.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    let joined = lines
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
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
        "scoped_identifier" | "field_expression" => {
            if let Some(chain) = dotted_chain(node, source) {
                sink.push(&chain);
                return;
            }
        }
        "identifier" | "type_identifier" => {
            sink.push(&node_text(node, source));
            return;
        }
        "string_literal" | "raw_string_literal" | "line_comment" | "block_comment" => return,
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        sweep(child, source, sink);
    }
}

/// Flatten a `use` tree into import records: `use a::b::{c, d as e};`
/// yields module `a::b` with names `c` and `e`.
fn collect_use(node: Node<'_>, source: &str, imports: &mut Vec<ImportRecord>) {
    let Some(argument) = node.child_by_field_name("argument") else {
        return;
    };
    let line = node_line(node);
    flatten_use(argument, source, "", line, imports);
}

fn flatten_use(
    node: Node<'_>,
    source: &str,
    prefix: &str,
    line: u32,
    imports: &mut Vec<ImportRecord>,
) {
    match node.kind() {
        "scoped_use_list" => {
            let path = node
                .child_by_field_name("path")
                .map(|p| node_text(p, source))
                .unwrap_or_default();
            let module = join_use_path(prefix, &path);
            if let Some(list) = node.child_by_field_name("list") {
                let mut cursor = list.walk();
                for item in list.named_children(&mut cursor) {
                    flatten_use(item, source, &module, line, imports);
                }
            }
        }
        "use_list" => {
            let mut cursor = node.walk();
            for item in node.named_children(&mut cursor) {
                flatten_use(item, source, prefix, line, imports);
            }
        }
        "use_as_clause" => {
            let path = node
                .child_by_field_name("path")
                .map(|p| node_text(p, source))
                .unwrap_or_default();
            let alias = node
                .child_by_field_name("alias")
                .map(|a| node_text(a, source));
            let module = join_use_path(prefix, &path);
            imports.push(ImportRecord {
                names: vec![alias
                    .clone()
                    .unwrap_or_else(|| last_path_segment(&module).to_string())],
                module,
                alias,
                line,
            });
        }
        "use_wildcard" => {
            let path = node.named_child(0).map(|p| node_text(p, source));
            if let Some(path) = path {
                imports.push(ImportRecord {
                    module: join_use_path(prefix, &path),
                    alias: None,
                    names: vec!["*".to_string()],
                    line,
                });
            }
        }
        "scoped_identifier" | "identifier" | "crate" | "super" | "self" => {
            let module = join_use_path(prefix, &node_text(node, source));
            imports.push(ImportRecord {
                names: vec![last_path_segment(&module).to_string()],
                module,
                alias: None,
                line,
            });
        }
        _ => {}
    }
}

fn join_use_path(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else if path.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}::{path}")
    }
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}
