use crate::error::Result;
use crate::indexer::extract::{
    dotted_chain, new_parser, node_line, node_span, node_text, normalize_signature, FileContext,
    LanguageExtractor, ParsedFile, RefSink,
};
use crate::model::{
    Framework, ImportRecord, RouteDecl, Span, SymbolId, SymbolKind, SymbolRecord,
};
use crate::util;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tree_sitter::{Node, Parser};

const HTTP_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];

fn reserved() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            // keywords
            "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del",
            "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in",
            "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
            "with", "yield", "self", "cls", "None", "True", "False",
            // builtins that never trace to a definition
            "str", "int", "float", "bool", "dict", "list", "tuple", "set", "len", "range", "type",
            "isinstance", "hasattr", "getattr", "setattr", "open", "print", "input", "format",
            "sorted", "filter", "map", "zip", "min", "max", "sum", "abs", "round", "enumerate",
            "reversed", "super", "object", "Exception", "ValueError", "TypeError", "KeyError",
            "RuntimeError", "StopIteration", "staticmethod", "classmethod", "property", "repr",
            "bytes", "frozenset", "vars", "id", "iter", "next", "callable", "issubclass",
        ]
        .into_iter()
        .collect()
    })
}

pub struct PythonExtractor {
    parser: Parser,
}

impl PythonExtractor {
    pub fn new() -> Result<Self> {
        let language = tree_sitter_python::LANGUAGE;
        Ok(Self {
            parser: new_parser(&language.into())?,
        })
    }
}

impl LanguageExtractor for PythonExtractor {
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
        let module = module_name_from_rel_path(ctx.rel_path);

        let mut pending = Vec::new();
        let module_doc = block_docstring(root, source);
        pending.push(Pending::new(
            SymbolRecord {
                id: SymbolId::new(ctx.project, ctx.rel_path, SymbolKind::Module, module.clone()),
                kind: SymbolKind::Module,
                span: Span::new(1, root.end_position().row as u32 + 1),
                signature: None,
                doc: module_doc,
                decorators: Vec::new(),
                exports: true,
                refs_out: Vec::new(),
                extends: Vec::new(),
                body_hash: util::body_hash(source),
                ref_count: 0,
            },
            source.to_string(),
        ));

        let walker = Walk {
            ctx: *ctx,
            module,
            source,
        };
        walker.walk_block(root, 0, &mut Vec::new(), &mut pending, &mut output);

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
    module: String,
    source: &'a str,
}

impl<'a> Walk<'a> {
    /// Walk the statements of a module, class or function body. `owner` is
    /// the pending-symbol index collecting loose references, `scope` the
    /// name path below the module.
    fn walk_block(
        &self,
        block: Node<'_>,
        owner: usize,
        scope: &mut Vec<String>,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
    ) {
        let mut cursor = block.walk();
        for child in block.named_children(&mut cursor) {
            self.walk_node(child, owner, scope, pending, output, &[]);
        }
    }

    fn walk_node(
        &self,
        node: Node<'_>,
        owner: usize,
        scope: &mut Vec<String>,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
        decorators: &[Node<'_>],
    ) {
        match node.kind() {
            "decorated_definition" => {
                let mut decs = Vec::new();
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if child.kind() == "decorator" {
                        decs.push(child);
                    }
                }
                if let Some(definition) = node.child_by_field_name("definition") {
                    self.walk_node(definition, owner, scope, pending, output, &decs);
                }
            }
            "class_definition" => {
                self.handle_class(node, scope, pending, output, decorators);
            }
            "function_definition" | "async_function_definition" => {
                self.handle_function(node, scope, pending, output, decorators);
            }
            "import_statement" => {
                collect_plain_imports(node, self.source, &mut output.imports);
            }
            "import_from_statement" => {
                collect_from_imports(node, self.source, &mut output.imports);
            }
            _ => {
                sweep_expressions(node, self.source, &mut pending[owner].sink);
            }
        }
    }

    fn handle_class(
        &self,
        node: Node<'_>,
        scope: &mut Vec<String>,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
        decorators: &[Node<'_>],
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let qual = scoped_name(scope, &name);
        let body_text = node_text(node, self.source);
        let mut extends = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for child in superclasses.named_children(&mut cursor) {
                if let Some(base) = dotted_chain(child, self.source) {
                    extends.push(base);
                }
            }
        }
        let doc = node
            .child_by_field_name("body")
            .and_then(|body| block_docstring(body, self.source));
        let record = SymbolRecord {
            id: SymbolId::new(
                self.ctx.project,
                self.ctx.rel_path,
                SymbolKind::Class,
                qual.clone(),
            ),
            kind: SymbolKind::Class,
            span: node_span(node),
            signature: None,
            doc,
            decorators: decorator_names(decorators, self.source),
            exports: !name.starts_with('_'),
            refs_out: Vec::new(),
            extends,
            body_hash: util::body_hash(&body_text),
            ref_count: 0,
        };
        pending.push(Pending::new(record, body_text));
        let index = pending.len() - 1;

        scope.push(name);
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.named_children(&mut cursor) {
                self.walk_node(child, index, scope, pending, output, &[]);
            }
        }
        scope.pop();
    }

    fn handle_function(
        &self,
        node: Node<'_>,
        scope: &mut Vec<String>,
        pending: &mut Vec<Pending>,
        output: &mut ParsedFile,
        decorators: &[Node<'_>],
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let qual = scoped_name(scope, &name);
        let kind = if is_method_scope(scope, pending) {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        let body_text = node_text(node, self.source);
        let doc = node
            .child_by_field_name("body")
            .and_then(|body| block_docstring(body, self.source));
        let record = SymbolRecord {
            id: SymbolId::new(self.ctx.project, self.ctx.rel_path, kind, qual.clone()),
            kind,
            span: node_span(node),
            signature: function_signature(node, self.source),
            doc,
            decorators: decorator_names(decorators, self.source),
            exports: !name.starts_with('_'),
            refs_out: Vec::new(),
            extends: Vec::new(),
            body_hash: util::body_hash(&body_text),
            ref_count: 0,
        };
        let handler_id = record.id.clone();
        let span = record.span;
        pending.push(Pending::new(record, body_text));
        let index = pending.len() - 1;

        for decorator in decorators {
            if let Some(route) = route_from_decorator(*decorator, self.source, &handler_id) {
                self.push_route(route, span, output);
            }
        }

        scope.push(name);
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.named_children(&mut cursor) {
                self.walk_node(child, index, scope, pending, output, &[]);
            }
        }
        scope.pop();
    }

    fn push_route(&self, route: RouteDecl, span: Span, output: &mut ParsedFile) {
        let route_name = format!("{} {}", route.method, route.path_pattern);
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
            span,
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

/// True when the innermost enclosing pending symbol is a class, which makes
/// the function a method.
fn is_method_scope(scope: &[String], pending: &[Pending]) -> bool {
    if scope.is_empty() {
        return false;
    }
    let parent_name = scope.join(".");
    pending
        .iter()
        .rev()
        .find(|p| p.record.id.name == parent_name)
        .map(|p| p.record.kind == SymbolKind::Class)
        .unwrap_or(false)
}

fn scoped_name(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope.join("."), name)
    }
}

pub fn module_name_from_rel_path(rel_path: &str) -> String {
    let path = Path::new(rel_path);
    let mut parts: Vec<String> = path
        .components()
        .filter_map(|comp| comp.as_os_str().to_str().map(|s| s.to_string()))
        .collect();
    if parts.is_empty() {
        return "__init__".to_string();
    }
    let file = parts.pop().unwrap_or_default();
    let stem = Path::new(&file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&file)
        .to_string();
    if stem != "__init__" {
        parts.push(stem);
    }
    if parts.is_empty() {
        "__init__".to_string()
    } else {
        parts.join(".")
    }
}

fn decorator_names(decorators: &[Node<'_>], source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for decorator in decorators {
        let mut target = *decorator;
        if let Some(inner) = decorator.named_child(0) {
            target = inner;
        }
        let text = if target.kind() == "call" {
            target
                .child_by_field_name("function")
                .map(|f| node_text(f, source))
                .unwrap_or_default()
        } else {
            node_text(target, source)
        };
        let trimmed = text.trim_start_matches('@').trim().to_string();
        if !trimmed.is_empty() {
            names.push(trimmed);
        }
    }
    names
}

/// Recognize `@app.get("/p")`, `@router.post("/p")` and
/// `@app.route("/p", methods=[...])` decorators.
fn route_from_decorator(
    decorator: Node<'_>,
    source: &str,
    handler: &SymbolId,
) -> Option<RouteDecl> {
    let call = decorator
        .named_child(0)
        .filter(|node| node.kind() == "call")?;
    let function = call.child_by_field_name("function")?;
    if function.kind() != "attribute" {
        return None;
    }
    let attr = function.child_by_field_name("attribute")?;
    let verb = node_text(attr, source).to_ascii_lowercase();
    let arguments = call.child_by_field_name("arguments")?;
    let path = first_string_argument(arguments, source)?;

    if HTTP_METHODS.contains(&verb.as_str()) {
        let receiver = function
            .child_by_field_name("object")
            .map(|o| node_text(o, source))
            .unwrap_or_default();
        let framework = if receiver.contains("router") {
            Framework::Fastapi
        } else if receiver.contains("starlette") {
            Framework::Starlette
        } else {
            Framework::Fastapi
        };
        return Some(RouteDecl {
            method: verb.to_ascii_uppercase(),
            path_pattern: path,
            handler: handler.clone(),
            framework,
        });
    }
    if verb == "route" {
        let method = methods_kwarg(arguments, source).unwrap_or_else(|| "GET".to_string());
        return Some(RouteDecl {
            method,
            path_pattern: path,
            handler: handler.clone(),
            framework: Framework::Flask,
        });
    }
    None
}

fn first_string_argument(arguments: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = arguments.walk();
    for child in arguments.named_children(&mut cursor) {
        if child.kind() == "string" {
            return Some(string_value(child, source));
        }
        if child.kind() == "keyword_argument" {
            continue;
        }
        // First positional argument is not a plain string (f-string, name).
        return None;
    }
    None
}

fn methods_kwarg(arguments: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = arguments.walk();
    for child in arguments.named_children(&mut cursor) {
        if child.kind() != "keyword_argument" {
            continue;
        }
        let name = child
            .child_by_field_name("name")
            .map(|n| node_text(n, source))?;
        if name != "methods" {
            continue;
        }
        let value = child.child_by_field_name("value")?;
        let mut methods = Vec::new();
        let mut inner = value.walk();
        for elt in value.named_children(&mut inner) {
            if elt.kind() == "string" {
                methods.push(string_value(elt, source).to_ascii_uppercase());
            }
        }
        if !methods.is_empty() {
            return Some(methods.join(","));
        }
    }
    None
}

fn string_value(node: Node<'_>, source: &str) -> String {
    let raw = node_text(node, source);
    raw.trim_matches(|c| c == '"' || c == '\'').to_string()
}

fn function_signature(node: Node<'_>, source: &str) -> Option<String> {
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

/// Leading docstring of a module or definition body.
fn block_docstring(block: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = block.walk();
    let first = block.named_children(&mut cursor).next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let inner = first.named_child(0)?;
    if inner.kind() != "string" {
        return None;
    }
    let raw = node_text(inner, source);
    let stripped = raw
        .trim_start_matches(|c| c == 'r' || c == 'b' || c == 'u' || c == 'f')
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Identifier sweep over expression statements. Calls contribute their
/// callee chain; bare identifiers contribute themselves. Strings and
/// comments never reach here because they are distinct node kinds.
fn sweep_expressions(node: Node<'_>, source: &str, sink: &mut RefSink<'_>) {
    match node.kind() {
        "call" => {
            if let Some(function) = node.child_by_field_name("function") {
                if let Some(chain) = dotted_chain(function, source) {
                    sink.push(&chain);
                } else {
                    sweep_expressions(function, source, sink);
                }
            }
            if let Some(arguments) = node.child_by_field_name("arguments") {
                sweep_expressions(arguments, source, sink);
            }
            return;
        }
        "attribute" => {
            if let Some(chain) = dotted_chain(node, source) {
                sink.push(&chain);
                return;
            }
        }
        "identifier" => {
            sink.push(&node_text(node, source));
            return;
        }
        "keyword_argument" => {
            if let Some(value) = node.child_by_field_name("value") {
                sweep_expressions(value, source, sink);
            }
            return;
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        sweep_expressions(child, source, sink);
    }
}

fn collect_plain_imports(node: Node<'_>, source: &str, imports: &mut Vec<ImportRecord>) {
    let line = node_line(node);
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "dotted_name" => {
                let module = node_text(child, source);
                imports.push(ImportRecord {
                    names: vec![module.clone()],
                    module,
                    alias: None,
                    line,
                });
            }
            "aliased_import" => {
                let module = child
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source))
                    .unwrap_or_default();
                let alias = child
                    .child_by_field_name("alias")
                    .map(|n| node_text(n, source));
                if !module.is_empty() {
                    imports.push(ImportRecord {
                        names: vec![alias.clone().unwrap_or_else(|| module.clone())],
                        module,
                        alias,
                        line,
                    });
                }
            }
            _ => {}
        }
    }
}

fn collect_from_imports(node: Node<'_>, source: &str, imports: &mut Vec<ImportRecord>) {
    let line = node_line(node);
    let module = node
        .child_by_field_name("module_name")
        .map(|n| node_text(n, source))
        .unwrap_or_default();
    if module.is_empty() {
        return;
    }
    let mut names = Vec::new();
    let mut cursor = node.walk();
    let mut saw_module = false;
    for child in node.named_children(&mut cursor) {
        // The module_name field appears among named children; names follow.
        if !saw_module {
            if node
                .child_by_field_name("module_name")
                .map(|m| m.id() == child.id())
                .unwrap_or(false)
            {
                saw_module = true;
            }
            continue;
        }
        match child.kind() {
            "dotted_name" => names.push(node_text(child, source)),
            "aliased_import" => {
                if let Some(alias) = child.child_by_field_name("alias") {
                    names.push(node_text(alias, source));
                } else if let Some(name) = child.child_by_field_name("name") {
                    names.push(node_text(name, source));
                }
            }
            "wildcard_import" => names.push("*".to_string()),
            _ => {}
        }
    }
    imports.push(ImportRecord {
        module,
        alias: None,
        names,
        line,
    });
}
