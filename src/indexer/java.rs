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
            "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class",
            "const", "continue", "default", "do", "double", "else", "enum", "extends", "final",
            "finally", "float", "for", "goto", "if", "implements", "import", "instanceof", "int",
            "interface", "long", "native", "new", "package", "private", "protected", "public",
            "return", "short", "static", "strictfp", "super", "switch", "synchronized", "this",
            "throw", "throws", "transient", "try", "void", "volatile", "while", "true", "false",
            "null", "var", "record", "sealed", "permits",
            // JDK names that never trace to a workspace definition
            "String", "Integer", "Long", "Double", "Float", "Boolean", "Object", "System", "Math",
            "List", "Map", "Set", "ArrayList", "HashMap", "HashSet", "Optional", "Stream",
            "Exception", "RuntimeException", "IllegalArgumentException", "Override",
        ]
        .into_iter()
        .collect()
    })
}

pub struct JavaExtractor {
    parser: Parser,
}

impl JavaExtractor {
    pub fn new() -> Result<Self> {
        let language = tree_sitter_java::LANGUAGE;
        Ok(Self {
            parser: new_parser(&language.into())?,
        })
    }
}

impl LanguageExtractor for JavaExtractor {
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

        let mut pending = Vec::new();
        pending.push(Pending::new(
            SymbolRecord {
                id: SymbolId::new(
                    ctx.project,
                    ctx.rel_path,
                    SymbolKind::Module,
                    util::file_stem(ctx.rel_path),
                ),
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
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "import_declaration" => collect_import(child, source, &mut output.imports),
                "class_declaration" | "enum_declaration" | "record_declaration" => {
                    walker.handle_class(child, &mut pending);
                }
                "interface_declaration" => {
                    walker.handle_interface(child, &mut pending);
                }
                "package_declaration" => {}
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

struct Walk<'a> {
    ctx: FileContext<'a>,
    source: &'a str,
}

impl<'a> Walk<'a> {
    fn handle_class(&self, node: Node<'_>, pending: &mut Vec<Pending>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let kind = if node.kind() == "enum_declaration" {
            SymbolKind::Enum
        } else {
            SymbolKind::Class
        };
        let mut extends = Vec::new();
        if let Some(superclass) = node.child_by_field_name("superclass") {
            let mut cursor = superclass.walk();
            for ty in superclass.named_children(&mut cursor) {
                if let Some(chain) = dotted_chain(ty, self.source) {
                    extends.push(chain);
                }
            }
        }
        if let Some(interfaces) = node.child_by_field_name("interfaces") {
            collect_type_names(interfaces, self.source, &mut extends);
        }
        let body_text = node_text(node, self.source);
        let record = SymbolRecord {
            id: SymbolId::new(self.ctx.project, self.ctx.rel_path, kind, name.clone()),
            kind,
            span: node_span(node),
            signature: None,
            doc: javadoc(node, self.source),
            decorators: annotations(node, self.source),
            exports: is_public(node, self.source),
            refs_out: Vec::new(),
            extends,
            body_hash: util::body_hash(&body_text),
            ref_count: 0,
        };
        pending.push(Pending::new(record, body_text));
        let class_index = pending.len() - 1;

        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "method_declaration" => {
                    self.handle_method(member, &name, pending);
                }
                "constructor_declaration" => {
                    if let Some(ctor_body) = member.child_by_field_name("body") {
                        sweep(ctor_body, self.source, &mut pending[class_index].sink);
                    }
                }
                "class_declaration" | "interface_declaration" | "enum_declaration" => {
                    // Nested types are indexed like top-level ones.
                    if member.kind() == "interface_declaration" {
                        self.handle_interface(member, pending);
                    } else {
                        self.handle_class(member, pending);
                    }
                }
                _ => sweep(member, self.source, &mut pending[class_index].sink),
            }
        }
    }

    fn handle_interface(&self, node: Node<'_>, pending: &mut Vec<Pending>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let mut extends = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "extends_interfaces" {
                collect_type_names(child, self.source, &mut extends);
            }
        }
        let body_text = node_text(node, self.source);
        let record = SymbolRecord {
            id: SymbolId::new(
                self.ctx.project,
                self.ctx.rel_path,
                SymbolKind::Interface,
                name.clone(),
            ),
            kind: SymbolKind::Interface,
            span: node_span(node),
            signature: None,
            doc: javadoc(node, self.source),
            decorators: annotations(node, self.source),
            exports: is_public(node, self.source),
            refs_out: Vec::new(),
            extends,
            body_hash: util::body_hash(&body_text),
            ref_count: 0,
        };
        pending.push(Pending::new(record, body_text));
        let index = pending.len() - 1;

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                if member.kind() == "method_declaration" {
                    self.handle_method(member, &name, pending);
                } else {
                    sweep(member, self.source, &mut pending[index].sink);
                }
            }
        }
    }

    fn handle_method(&self, node: Node<'_>, owner: &str, pending: &mut Vec<Pending>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let qual = format!("{owner}.{name}");
        let body_text = node_text(node, self.source);
        let record = SymbolRecord {
            id: SymbolId::new(self.ctx.project, self.ctx.rel_path, SymbolKind::Method, qual),
            kind: SymbolKind::Method,
            span: node_span(node),
            signature: java_signature(node, self.source),
            doc: javadoc(node, self.source),
            decorators: annotations(node, self.source),
            exports: is_public(node, self.source),
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
}

fn collect_type_names(node: Node<'_>, source: &str, out: &mut Vec<String>) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            match child.kind() {
                "type_identifier" | "scoped_type_identifier" => {
                    if let Some(chain) = dotted_chain(child, source) {
                        out.push(chain);
                    }
                }
                "type_list" => stack.push(child),
                _ => {}
            }
        }
    }
}

fn is_public(node: Node<'_>, source: &str) -> bool {
    modifier_text(node, source)
        .map(|text| text.contains("public"))
        .unwrap_or(false)
}

fn annotations(node: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "modifiers" {
            continue;
        }
        let mut inner = child.walk();
        for item in child.named_children(&mut inner) {
            if item.kind() == "annotation" || item.kind() == "marker_annotation" {
                if let Some(name) = item.child_by_field_name("name") {
                    names.push(node_text(name, source));
                }
            }
        }
    }
    names
}

fn modifier_text(node: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "modifiers" {
            return Some(node_text(child, source));
        }
    }
    None
}

fn java_signature(node: Node<'_>, source: &str) -> Option<String> {
    let params = node
        .child_by_field_name("parameters")
        .map(|p| node_text(p, source))?;
    let mut signature = params;
    if let Some(ret) = node.child_by_field_name("type") {
        signature.push_str(" : ");
        signature.push_str(&node_text(ret, source));
    }
    Some(normalize_signature(&signature))
}

/// Preceding `/** ... */` Javadoc, cleaned of markers and tags.
fn javadoc(node: Node<'_>, source: &str) -> Option<String> {
    let prev = node.prev_sibling()?;
    if prev.kind() != "block_comment" && prev.kind() != "comment" {
        return None;
    }
    let raw = node_text(prev, source);
    if !raw.starts_with("/**") {
        return None;
    }
    let mut cleaned = String::new();
    for line in raw
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
    {
        let line = line.trim().trim_start_matches('*').trim();
        if line.starts_with('@') {
            break;
        }
        if !line.is_empty() {
            if !cleaned.is_empty() {
                cleaned.push(' ');
            }
            cleaned.push_str(line);
        }
    }
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn sweep(node: Node<'_>, source: &str, sink: &mut RefSink<'_>) {
    match node.kind() {
        "method_invocation" => {
            let object = node
                .child_by_field_name("object")
                .and_then(|o| dotted_chain(o, source));
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source));
            match (object, name) {
                (Some(object), Some(name)) => sink.push(&format!("{object}.{name}")),
                (None, Some(name)) => sink.push(&name),
                _ => {}
            }
            if let Some(arguments) = node.child_by_field_name("arguments") {
                sweep(arguments, source, sink);
            }
            return;
        }
        "object_creation_expression" => {
            if let Some(ty) = node.child_by_field_name("type") {
                if let Some(chain) = dotted_chain(ty, source) {
                    sink.push(&chain);
                }
            }
            if let Some(arguments) = node.child_by_field_name("arguments") {
                sweep(arguments, source, sink);
            }
            return;
        }
        "field_access" => {
            if let Some(chain) = dotted_chain(node, source) {
                sink.push(&chain);
                return;
            }
        }
        "identifier" | "type_identifier" => {
            sink.push(&node_text(node, source));
            return;
        }
        "string_literal" | "line_comment" | "block_comment" => return,
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        sweep(child, source, sink);
    }
}

fn collect_import(node: Node<'_>, source: &str, imports: &mut Vec<ImportRecord>) {
    let mut module = String::new();
    let mut wildcard = false;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "scoped_identifier" | "identifier" => module = node_text(child, source),
            "asterisk" => wildcard = true,
            _ => {}
        }
    }
    if module.is_empty() {
        return;
    }
    let names = if wildcard {
        vec!["*".to_string()]
    } else {
        vec![module.rsplit('.').next().unwrap_or(&module).to_string()]
    };
    imports.push(ImportRecord {
        module,
        alias: None,
        names,
        line: node_line(node),
    });
}
