use crate::error::Result;
use crate::indexer::extract::{
    dotted_chain, new_parser, node_line, node_span, node_text, normalize_signature, FileContext,
    LanguageExtractor, ParsedFile, RefSink,
};
use crate::model::{
    CallSite, Framework, ImportRecord, RouteDecl, SymbolId, SymbolKind, SymbolRecord,
};
use crate::util;
use std::collections::HashSet;
use std::sync::OnceLock;
use tree_sitter::{Node, Parser};

const HTTP_VERBS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];

/// Receivers that declare Express-style routes when called with a path and
/// a handler.
const ROUTER_RECEIVERS: &[&str] = &["app", "router", "server"];

/// Receivers whose verb methods are HTTP client calls.
const CLIENT_RECEIVERS: &[&str] = &["axios", "$http", "http"];

fn reserved() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            "if", "for", "while", "switch", "catch", "function", "return", "new", "typeof",
            "instanceof", "delete", "void", "throw", "async", "await", "import", "export", "from",
            "class", "const", "let", "var", "else", "try", "finally", "in", "of", "this", "super",
            "yield", "static", "extends", "implements", "interface", "type", "enum", "true",
            "false", "null", "undefined",
            // builtins that never trace to a definition
            "console", "window", "document", "Array", "Object", "String", "Number", "Boolean",
            "JSON", "Math", "Date", "Promise", "Error", "Map", "Set", "Symbol", "RegExp", "fetch",
            "setTimeout", "setInterval", "clearTimeout", "clearInterval", "parseInt",
            "parseFloat", "isNaN", "isFinite", "encodeURI", "decodeURI", "encodeURIComponent",
            "decodeURIComponent", "require", "module", "exports", "process", "globalThis",
            // framework hooks that resolve outside the workspace
            "ref", "reactive", "computed", "watch", "watchEffect", "onMounted", "onUnmounted",
            "onBeforeMount", "onBeforeUnmount", "nextTick", "useState", "useEffect",
            "useCallback", "useMemo", "useRef", "useContext",
        ]
        .into_iter()
        .collect()
    })
}

pub struct JavascriptExtractor {
    parser: Parser,
}

impl JavascriptExtractor {
    pub fn new() -> Result<Self> {
        let language = tree_sitter_javascript::LANGUAGE;
        Ok(Self {
            parser: new_parser(&language.into())?,
        })
    }
}

impl LanguageExtractor for JavascriptExtractor {
    fn extract(&mut self, ctx: &FileContext<'_>, source: &str) -> Result<ParsedFile> {
        extract_script(&mut self.parser, ctx, source)
    }
}

pub struct TypescriptExtractor {
    parser: Parser,
    tsx_parser: Parser,
}

impl TypescriptExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: new_parser(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())?,
            tsx_parser: new_parser(&tree_sitter_typescript::LANGUAGE_TSX.into())?,
        })
    }
}

impl LanguageExtractor for TypescriptExtractor {
    fn extract(&mut self, ctx: &FileContext<'_>, source: &str) -> Result<ParsedFile> {
        let parser = if ctx.rel_path.ends_with(".tsx") {
            &mut self.tsx_parser
        } else {
            &mut self.parser
        };
        extract_script(parser, ctx, source)
    }
}

/// Shared walk for JS, TS and Vue `<script>` blocks.
pub(crate) fn extract_script(
    parser: &mut Parser,
    ctx: &FileContext<'_>,
    source: &str,
) -> Result<ParsedFile> {
    let mut output = ParsedFile::default();
    let tree = match parser.parse(source, None) {
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
            id: SymbolId::new(ctx.project, ctx.rel_path, SymbolKind::Module, module.clone()),
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

    let walk = Walk { ctx: *ctx, source };
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        walk.top_level(child, false, &mut pending, &mut output);
    }

    for item in pending {
        let mut record = item.record;
        record.refs_out = item.sink.finish();
        output.bodies.push((record.id.clone(), item.body));
        output.symbols.push(record);
    }
    Ok(output)
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
    fn top_level(
        &self,
        node: Node<'_>,
        exported: bool,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
    ) {
        match node.kind() {
            "export_statement" => {
                let mut handled = false;
                if let Some(declaration) = node.child_by_field_name("declaration") {
                    self.top_level(declaration, true, pending, output);
                    handled = true;
                }
                if !handled {
                    // `export { a, b }` re-export lists carry no definitions.
                    self.scan_body(node, 0, pending, output);
                }
            }
            "function_declaration" | "generator_function_declaration" => {
                self.handle_function(node, exported, None, pending, output);
            }
            "lexical_declaration" | "variable_declaration" => {
                self.handle_declaration(node, exported, pending, output);
            }
            "class_declaration" | "abstract_class_declaration" => {
                self.handle_class(node, exported, pending, output);
            }
            "interface_declaration" => {
                self.handle_named_type(node, SymbolKind::Interface, exported, pending, output);
            }
            "type_alias_declaration" => {
                self.handle_named_type(node, SymbolKind::Type, exported, pending, output);
            }
            "enum_declaration" => {
                self.handle_named_type(node, SymbolKind::Enum, exported, pending, output);
            }
            "import_statement" => {
                collect_imports(node, self.source, &mut output.imports);
            }
            _ => {
                self.scan_body(node, 0, pending, output);
            }
        }
    }

    fn handle_function(
        &self,
        node: Node<'_>,
        exported: bool,
        name_override: Option<String>,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
    ) {
        let name = match name_override.or_else(|| {
            node.child_by_field_name("name")
                .map(|n| node_text(n, self.source))
        }) {
            Some(name) if !name.is_empty() => name,
            _ => return,
        };
        let kind = composable_or_function(&name);
        let body_text = node_text(node, self.source);
        let record = SymbolRecord {
            id: SymbolId::new(self.ctx.project, self.ctx.rel_path, kind, name),
            kind,
            span: node_span(node),
            signature: function_signature(node, self.source),
            doc: preceding_doc(node, self.source),
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
            self.scan_body(body, index, pending, output);
        }
    }

    /// `const name = () => {}` and `const name = function () {}` at top
    /// level become function symbols; other declarators are swept.
    fn handle_declaration(
        &self,
        node: Node<'_>,
        exported: bool,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
    ) {
        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            let Some(value) = declarator.child_by_field_name("value") else {
                continue;
            };
            match value.kind() {
                "arrow_function" | "function_expression" | "function" => {
                    let name = node_text(name_node, self.source);
                    let kind = composable_or_function(&name);
                    let body_text = node_text(declarator, self.source);
                    let record = SymbolRecord {
                        id: SymbolId::new(self.ctx.project, self.ctx.rel_path, kind, name),
                        kind,
                        span: node_span(declarator),
                        signature: function_signature(value, self.source),
                        doc: preceding_doc(node, self.source),
                        decorators: Vec::new(),
                        exports: exported,
                        refs_out: Vec::new(),
                        extends: Vec::new(),
                        body_hash: util::body_hash(&body_text),
                        ref_count: 0,
                    };
                    pending.push(Pending::new(record, body_text));
                    let index = pending.len() - 1;
                    if let Some(body) = value.child_by_field_name("body") {
                        self.scan_body(body, index, pending, output);
                    }
                }
                _ => {
                    self.scan_body(value, 0, pending, output);
                }
            }
        }
    }

    fn handle_class(
        &self,
        node: Node<'_>,
        exported: bool,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let class_name = node_text(name_node, self.source);
        let body_text = node_text(node, self.source);
        let record = SymbolRecord {
            id: SymbolId::new(
                self.ctx.project,
                self.ctx.rel_path,
                SymbolKind::Class,
                class_name.clone(),
            ),
            kind: SymbolKind::Class,
            span: node_span(node),
            signature: None,
            doc: preceding_doc(node, self.source),
            decorators: class_decorators(node, self.source),
            exports: exported,
            refs_out: Vec::new(),
            extends: heritage_names(node, self.source),
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
            if member.kind() != "method_definition" {
                self.scan_body(member, class_index, pending, output);
                continue;
            }
            let Some(method_name_node) = member.child_by_field_name("name") else {
                continue;
            };
            let method_name = node_text(method_name_node, self.source);
            if method_name == "constructor" {
                if let Some(method_body) = member.child_by_field_name("body") {
                    self.scan_body(method_body, class_index, pending, output);
                }
                continue;
            }
            let qual = format!("{class_name}.{method_name}");
            let method_text = node_text(member, self.source);
            let record = SymbolRecord {
                id: SymbolId::new(self.ctx.project, self.ctx.rel_path, SymbolKind::Method, qual),
                kind: SymbolKind::Method,
                span: node_span(member),
                signature: function_signature(member, self.source),
                doc: preceding_doc(member, self.source),
                decorators: Vec::new(),
                exports: exported,
                refs_out: Vec::new(),
                extends: Vec::new(),
                body_hash: util::body_hash(&method_text),
                ref_count: 0,
            };
            pending.push(Pending::new(record, method_text));
            let index = pending.len() - 1;
            if let Some(method_body) = member.child_by_field_name("body") {
                self.scan_body(method_body, index, pending, output);
            }
        }
    }

    fn handle_named_type(
        &self,
        node: Node<'_>,
        kind: SymbolKind,
        exported: bool,
        pending: &mut Vec<Pending>,
        _output: &mut ParsedFile,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let body_text = node_text(node, self.source);
        let extends = if kind == SymbolKind::Interface {
            heritage_names(node, self.source)
        } else {
            Vec::new()
        };
        let record = SymbolRecord {
            id: SymbolId::new(self.ctx.project, self.ctx.rel_path, kind, name),
            kind,
            span: node_span(node),
            signature: None,
            doc: preceding_doc(node, self.source),
            decorators: Vec::new(),
            exports: exported,
            refs_out: Vec::new(),
            extends,
            body_hash: util::body_hash(&body_text),
            ref_count: 0,
        };
        pending.push(Pending::new(record, body_text));
    }

    /// Sweep a statement or expression subtree: HTTP call sites and route
    /// declarations are pulled out, everything identifier-shaped feeds the
    /// owner's refs_out.
    fn scan_body(
        &self,
        node: Node<'_>,
        owner: usize,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
    ) {
        match node.kind() {
            "call_expression" => {
                self.handle_call(node, owner, pending, output);
                return;
            }
            "member_expression" => {
                if let Some(chain) = dotted_chain(node, self.source) {
                    pending[owner].sink.push(&chain);
                    return;
                }
            }
            "identifier" => {
                pending[owner].sink.push(&node_text(node, self.source));
                return;
            }
            "string" | "template_string" | "comment" => return,
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.scan_body(child, owner, pending, output);
        }
    }

    fn handle_call(
        &self,
        node: Node<'_>,
        owner: usize,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
    ) {
        let Some(callee) = node.child_by_field_name("function") else {
            return;
        };
        let arguments = node.child_by_field_name("arguments");
        let callee_text = node_text(callee, self.source);
        let owner_id = pending[owner].record.id.clone();

        if let Some(arguments) = arguments {
            // fetch("/url", {...})
            if callee.kind() == "identifier" && callee_text == "fetch" {
                if let Some(url) = first_string_argument(arguments, self.source) {
                    output.calls.push(CallSite {
                        method: object_method_argument(arguments, self.source)
                            .unwrap_or_else(|| "GET".to_string()),
                        url_literal: url,
                        file: self.ctx.rel_path.to_string(),
                        line: node_line(node),
                        containing_symbol: Some(owner_id.clone()),
                    });
                }
            } else if callee.kind() == "member_expression" {
                let object = callee
                    .child_by_field_name("object")
                    .map(|o| node_text(o, self.source))
                    .unwrap_or_default();
                let property = callee
                    .child_by_field_name("property")
                    .map(|p| node_text(p, self.source))
                    .unwrap_or_default();
                let verb = property.to_ascii_lowercase();
                let arg_count = arguments.named_child_count();

                if CLIENT_RECEIVERS.contains(&object.as_str())
                    && HTTP_VERBS.contains(&verb.as_str())
                {
                    if let Some(url) = first_string_argument(arguments, self.source) {
                        output.calls.push(CallSite {
                            method: verb.to_ascii_uppercase(),
                            url_literal: url,
                            file: self.ctx.rel_path.to_string(),
                            line: node_line(node),
                            containing_symbol: Some(owner_id.clone()),
                        });
                    }
                } else if property == "request" {
                    // client.request("/url") / client.request({url, method})
                    if let Some(url) = first_string_argument(arguments, self.source) {
                        output.calls.push(CallSite {
                            method: object_method_argument(arguments, self.source)
                                .unwrap_or_else(|| "GET".to_string()),
                            url_literal: url,
                            file: self.ctx.rel_path.to_string(),
                            line: node_line(node),
                            containing_symbol: Some(owner_id.clone()),
                        });
                    }
                } else if ROUTER_RECEIVERS.contains(&object.as_str())
                    && (HTTP_VERBS.contains(&verb.as_str()) || verb == "all")
                    && arg_count >= 2
                {
                    if let Some(path) = first_string_argument(arguments, self.source) {
                        let method = if verb == "all" {
                            "ANY".to_string()
                        } else {
                            verb.to_ascii_uppercase()
                        };
                        self.push_route(node, method, path, &owner_id, output);
                    }
                }
            }
        }

        if let Some(chain) = dotted_chain(callee, self.source) {
            pending[owner].sink.push(&chain);
        } else {
            self.scan_body(callee, owner, pending, output);
        }
        if let Some(arguments) = arguments {
            let mut cursor = arguments.walk();
            for child in arguments.named_children(&mut cursor) {
                self.scan_body(child, owner, pending, output);
            }
        }
    }

    fn push_route(
        &self,
        node: Node<'_>,
        method: String,
        path: String,
        owner_id: &SymbolId,
        output: &mut ParsedFile,
    ) {
        let route = RouteDecl {
            method: method.clone(),
            path_pattern: path.clone(),
            handler: owner_id.clone(),
            framework: Framework::Express,
        };
        let route_name = format!("{method} {path}");
        let id = SymbolId::new(
            self.ctx.project,
            self.ctx.rel_path,
            SymbolKind::Route,
            route_name.clone(),
        );
        output.bodies.push((id.clone(), route_name.clone()));
        output.symbols.push(SymbolRecord {
            id,
            kind: SymbolKind::Route,
            span: node_span(node),
            signature: None,
            doc: None,
            decorators: Vec::new(),
            exports: true,
            refs_out: Vec::new(),
            extends: Vec::new(),
            body_hash: util::body_hash(&route_name),
            ref_count: 0,
        });
        output.routes.push(route);
    }
}

/// `useWallet` is a composable, `users` is not: the `use` prefix must be
/// followed by an uppercase letter.
fn composable_or_function(name: &str) -> SymbolKind {
    let is_composable = name
        .strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .map(|c| c.is_uppercase())
        .unwrap_or(false);
    if is_composable {
        SymbolKind::Composable
    } else {
        SymbolKind::Function
    }
}

fn function_signature(node: Node<'_>, source: &str) -> Option<String> {
    let params = node
        .child_by_field_name("parameters")
        .map(|p| node_text(p, source))?;
    let mut signature = params;
    if let Some(ret) = node.child_by_field_name("return_type") {
        signature.push_str(&node_text(ret, source));
    }
    Some(normalize_signature(&signature))
}

fn class_decorators(node: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "decorator" {
            let text = node_text(child, source);
            let name = text
                .trim_start_matches('@')
                .split('(')
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            if !name.is_empty() {
                names.push(name);
            }
        }
    }
    names
}

/// Base class and implemented interface names from `extends` / `implements`
/// clauses.
fn heritage_names(node: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "class_heritage" => {
                let mut inner = child.walk();
                for clause in child.named_children(&mut inner) {
                    match clause.kind() {
                        "extends_clause" | "implements_clause" => {
                            let mut items = clause.walk();
                            for item in clause.named_children(&mut items) {
                                if let Some(name) = dotted_chain(item, source) {
                                    names.push(name);
                                }
                            }
                        }
                        _ => {
                            if let Some(name) = dotted_chain(clause, source) {
                                names.push(name);
                            }
                        }
                    }
                }
            }
            "extends_type_clause" | "extends_clause" => {
                let mut items = child.walk();
                for item in child.named_children(&mut items) {
                    if let Some(name) = dotted_chain(item, source) {
                        names.push(name);
                    }
                }
            }
            _ => {}
        }
    }
    names
}

/// Leading `/** ... */` JSDoc comment, cleaned of markers and tags. For
/// exported declarations the comment sits before the export statement.
fn preceding_doc(node: Node<'_>, source: &str) -> Option<String> {
    doc_before(node, source).or_else(|| {
        let parent = node.parent()?;
        if parent.kind() == "export_statement" {
            doc_before(parent, source)
        } else {
            None
        }
    })
}

fn doc_before(node: Node<'_>, source: &str) -> Option<String> {
    let mut prev = node.prev_sibling()?;
    // Decorators may sit between the doc and the node.
    while prev.kind() == "decorator" {
        prev = prev.prev_sibling()?;
    }
    if prev.kind() != "comment" {
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

fn first_string_argument(arguments: Node<'_>, source: &str) -> Option<String> {
    let first = arguments.named_child(0)?;
    string_literal_value(first, source)
}

fn string_literal_value(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "string" => {
            let raw = node_text(node, source);
            Some(raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string())
        }
        "template_string" => {
            let raw = node_text(node, source);
            Some(raw.trim_matches('`').to_string())
        }
        _ => None,
    }
}

/// Pull `method: "POST"` out of an options-object argument.
fn object_method_argument(arguments: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = arguments.walk();
    for child in arguments.named_children(&mut cursor) {
        if child.kind() != "object" {
            continue;
        }
        let mut inner = child.walk();
        for pair in child.named_children(&mut inner) {
            if pair.kind() != "pair" {
                continue;
            }
            let key = pair
                .child_by_field_name("key")
                .map(|k| node_text(k, source))
                .unwrap_or_default();
            if key.trim_matches(|c| c == '"' || c == '\'') != "method" {
                continue;
            }
            if let Some(value) = pair.child_by_field_name("value") {
                if let Some(method) = string_literal_value(value, source) {
                    return Some(method.to_ascii_uppercase());
                }
            }
        }
    }
    None
}

fn collect_imports(node: Node<'_>, source: &str, imports: &mut Vec<ImportRecord>) {
    let line = node_line(node);
    let Some(module) = node
        .child_by_field_name("source")
        .and_then(|s| string_literal_value(s, source))
    else {
        return;
    };
    let mut names = Vec::new();
    let mut alias = None;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "import_clause" {
            continue;
        }
        let mut inner = child.walk();
        for clause in child.named_children(&mut inner) {
            match clause.kind() {
                "identifier" => names.push(node_text(clause, source)),
                "namespace_import" => {
                    let mut items = clause.walk();
                    for item in clause.named_children(&mut items) {
                        if item.kind() == "identifier" {
                            let name = node_text(item, source);
                            alias = Some(name.clone());
                            names.push(name);
                        }
                    }
                }
                "named_imports" => {
                    let mut items = clause.walk();
                    for item in clause.named_children(&mut items) {
                        if item.kind() != "import_specifier" {
                            continue;
                        }
                        let imported = item
                            .child_by_field_name("alias")
                            .or_else(|| item.child_by_field_name("name"))
                            .map(|n| node_text(n, source));
                        if let Some(name) = imported {
                            names.push(name);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    imports.push(ImportRecord {
        module,
        alias,
        names,
        line,
    });
}
