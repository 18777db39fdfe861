use flyto_index::graph;
use flyto_index::model::{
    Confidence, EdgeKind, FileRecord, ImportRecord, Index, Span, SymbolId, SymbolKind,
    SymbolRecord,
};
use std::collections::BTreeMap;

struct Workspace {
    files: BTreeMap<String, FileRecord>,
    symbols: BTreeMap<String, SymbolRecord>,
}

impl Workspace {
    fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            symbols: BTreeMap::new(),
        }
    }

    fn file(&mut self, project: &str, path: &str, language: &str) -> &mut FileRecord {
        let key = format!("{project}:{path}");
        self.files.entry(key).or_insert_with(|| FileRecord {
            path: path.to_string(),
            project: project.to_string(),
            language: language.to_string(),
            content_hash: "0000000000000000".to_string(),
            symbols: Vec::new(),
            imports: Vec::new(),
            defined_routes: Vec::new(),
            outbound_calls: Vec::new(),
            parse_error: false,
        })
    }

    fn symbol(
        &mut self,
        project: &str,
        path: &str,
        kind: SymbolKind,
        name: &str,
        refs: &[&str],
    ) -> SymbolId {
        let id = SymbolId::new(project, path, kind, name);
        let record = SymbolRecord {
            id: id.clone(),
            kind,
            span: Span::new(1, 5),
            signature: None,
            doc: None,
            decorators: Vec::new(),
            exports: true,
            refs_out: refs.iter().map(|r| r.to_string()).collect(),
            extends: Vec::new(),
            body_hash: "abcdabcdabcdabcd".to_string(),
            ref_count: 0,
        };
        self.symbols.insert(id.to_string(), record);
        self.file(project, path, "python").symbols.push(id.clone());
        id
    }

    fn import(&mut self, project: &str, path: &str, module: &str, names: &[&str]) {
        let record = ImportRecord {
            module: module.to_string(),
            alias: None,
            names: names.iter().map(|n| n.to_string()).collect(),
            line: 1,
        };
        self.file(project, path, "python").imports.push(record);
    }

    fn build(&self) -> graph::GraphOutput {
        graph::build(&self.files, &self.symbols)
    }
}

#[test]
fn intra_file_references_bind_exact() {
    let mut ws = Workspace::new();
    ws.symbol("app", "a.py", SymbolKind::Module, "a", &[]);
    let helper = ws.symbol("app", "a.py", SymbolKind::Function, "helper", &[]);
    let main = ws.symbol("app", "a.py", SymbolKind::Function, "main", &["helper"]);

    let output = ws.build();
    let edge = output
        .edges
        .iter()
        .find(|e| e.from == main && e.to == helper)
        .unwrap();
    assert_eq!(edge.kind, EdgeKind::Calls);
    assert_eq!(edge.confidence, Confidence::Exact);
}

#[test]
fn named_import_binds_exact_and_rename_purges_the_edge() {
    let mut ws = Workspace::new();
    ws.symbol("app", "a.py", SymbolKind::Module, "a", &[]);
    let foo = ws.symbol("app", "a.py", SymbolKind::Function, "foo", &[]);
    let b_module = ws.symbol("app", "b.py", SymbolKind::Module, "b", &["foo"]);
    ws.import("app", "b.py", "a", &["foo"]);

    let output = ws.build();
    let edge = output
        .edges
        .iter()
        .find(|e| e.from == b_module && e.to == foo)
        .unwrap();
    assert_eq!(edge.kind, EdgeKind::Calls);
    assert_eq!(edge.confidence, Confidence::Exact);

    // Rename foo -> bar: the call edge disappears, nothing dangles, and
    // "foo" does not linger in the ambiguity bucket.
    let mut renamed = Workspace::new();
    renamed.symbol("app", "a.py", SymbolKind::Module, "a", &[]);
    renamed.symbol("app", "a.py", SymbolKind::Function, "bar", &[]);
    renamed.symbol("app", "b.py", SymbolKind::Module, "b", &["foo"]);
    renamed.import("app", "b.py", "a", &["foo"]);

    let output = renamed.build();
    assert!(!output.edges.iter().any(|e| e.to == foo));
    assert!(!output.unresolved.contains_key("foo"));
}

#[test]
fn alias_member_access_binds_likely() {
    let mut ws = Workspace::new();
    ws.symbol("app", "a.py", SymbolKind::Module, "a", &[]);
    let foo = ws.symbol("app", "a.py", SymbolKind::Function, "foo", &[]);
    let b_module = ws.symbol("app", "b.py", SymbolKind::Module, "b", &["a.foo"]);
    ws.import("app", "b.py", "a", &["a"]);

    let output = ws.build();
    let edge = output
        .edges
        .iter()
        .find(|e| e.from == b_module && e.to == foo)
        .unwrap();
    assert_eq!(edge.confidence, Confidence::Likely);
}

#[test]
fn workspace_unique_names_bind_heuristic() {
    let mut ws = Workspace::new();
    ws.symbol("app", "a.py", SymbolKind::Module, "a", &[]);
    let unique = ws.symbol("app", "a.py", SymbolKind::Function, "very_unique", &[]);
    let caller = ws.symbol("app", "c.py", SymbolKind::Function, "caller", &["very_unique"]);

    let output = ws.build();
    let edge = output
        .edges
        .iter()
        .find(|e| e.from == caller && e.to == unique)
        .unwrap();
    assert_eq!(edge.confidence, Confidence::Heuristic);
}

#[test]
fn ambiguous_names_produce_no_edge_and_are_surfaced() {
    let mut ws = Workspace::new();
    let first = ws.symbol("app", "a.py", SymbolKind::Function, "dup", &[]);
    let second = ws.symbol("app", "b.py", SymbolKind::Function, "dup", &[]);
    let caller = ws.symbol("app", "c.py", SymbolKind::Function, "caller", &["dup"]);

    let output = ws.build();
    assert!(!output.edges.iter().any(|e| e.from == caller));
    let candidates = &output.unresolved["dup"];
    assert!(candidates.contains(&first.to_string()));
    assert!(candidates.contains(&second.to_string()));
}

#[test]
fn tie_break_prefers_same_project() {
    let mut ws = Workspace::new();
    // Same file defines nothing; both candidates live elsewhere, one in the
    // caller's project, one in another project, both imported via the same
    // module name so they land in the same tier.
    let local = ws.symbol("app", "lib/util.py", SymbolKind::Function, "shared", &[]);
    ws.symbol("other", "lib/util.py", SymbolKind::Function, "shared", &[]);
    let caller = ws.symbol("app", "c.py", SymbolKind::Function, "caller", &["shared"]);
    ws.import("app", "c.py", "lib.util", &["shared"]);

    let output = ws.build();
    let edge = output
        .edges
        .iter()
        .find(|e| e.from == caller)
        .unwrap();
    assert_eq!(edge.to, local);
}

#[test]
fn import_statements_link_module_symbols() {
    let mut ws = Workspace::new();
    let a_module = ws.symbol("app", "a.py", SymbolKind::Module, "a", &[]);
    let b_module = ws.symbol("app", "b.py", SymbolKind::Module, "b", &[]);
    ws.import("app", "b.py", "a", &["a"]);

    let output = ws.build();
    let edge = output
        .edges
        .iter()
        .find(|e| e.from == b_module && e.to == a_module)
        .unwrap();
    assert_eq!(edge.kind, EdgeKind::Imports);
    assert_eq!(edge.confidence, Confidence::Exact);
}

#[test]
fn class_references_are_not_calls() {
    let mut ws = Workspace::new();
    let class = ws.symbol("app", "a.py", SymbolKind::Class, "Config", &[]);
    let user = ws.symbol("app", "a.py", SymbolKind::Function, "load", &["Config"]);

    let output = ws.build();
    let edge = output
        .edges
        .iter()
        .find(|e| e.from == user && e.to == class)
        .unwrap();
    assert_eq!(edge.kind, EdgeKind::References);
}

#[test]
fn extends_entries_produce_extends_edges() {
    let mut ws = Workspace::new();
    let base = ws.symbol("app", "a.py", SymbolKind::Class, "Base", &[]);
    let derived = ws.symbol("app", "a.py", SymbolKind::Class, "Derived", &[]);
    ws.symbols
        .get_mut(&derived.to_string())
        .unwrap()
        .extends
        .push("Base".to_string());

    let output = ws.build();
    let edge = output
        .edges
        .iter()
        .find(|e| e.from == derived && e.to == base)
        .unwrap();
    assert_eq!(edge.kind, EdgeKind::Extends);
    assert_eq!(edge.confidence, Confidence::Exact);
}

#[test]
fn reverse_index_is_bidirectionally_consistent() {
    let mut ws = Workspace::new();
    ws.symbol("app", "a.py", SymbolKind::Module, "a", &[]);
    ws.symbol("app", "a.py", SymbolKind::Function, "f", &[]);
    ws.symbol("app", "a.py", SymbolKind::Function, "g", &["f"]);
    ws.symbol("app", "b.py", SymbolKind::Function, "h", &["f"]);

    let output = ws.build();
    let reverse = graph::reverse_of(&output.edges);

    let index = Index {
        projects: Vec::new(),
        files: ws.files.clone(),
        symbols: ws.symbols.clone(),
        edges: output.edges.clone(),
        reverse: reverse.clone(),
        unresolved: output.unresolved.clone(),
        apis: Vec::new(),
        calls: Vec::new(),
        version: "0.0.0".to_string(),
    };
    graph::verify(&index).unwrap();

    for edge in &output.edges {
        let froms = &reverse[&edge.to.to_string()];
        assert!(froms.contains(&edge.from.to_string()));
    }
}

#[test]
fn verify_rejects_reverse_entries_without_forward_edges() {
    let mut ws = Workspace::new();
    let f = ws.symbol("app", "a.py", SymbolKind::Function, "f", &[]);
    ws.symbol("app", "a.py", SymbolKind::Function, "g", &["f"]);

    let output = ws.build();
    let mut reverse = graph::reverse_of(&output.edges);
    reverse
        .get_mut(&f.to_string())
        .unwrap()
        .push(SymbolId::new("app", "x.py", SymbolKind::Function, "ghost").to_string());

    let index = Index {
        projects: Vec::new(),
        files: ws.files.clone(),
        symbols: ws.symbols.clone(),
        edges: output.edges,
        reverse,
        unresolved: BTreeMap::new(),
        apis: Vec::new(),
        calls: Vec::new(),
        version: "0.0.0".to_string(),
    };
    assert!(graph::verify(&index).is_err());
}

#[test]
fn ref_counts_follow_the_reverse_index() {
    let mut ws = Workspace::new();
    let f = ws.symbol("app", "a.py", SymbolKind::Function, "f", &[]);
    ws.symbol("app", "a.py", SymbolKind::Function, "g", &["f"]);
    ws.symbol("app", "b.py", SymbolKind::Function, "h", &["f"]);

    let output = ws.build();
    let reverse = graph::reverse_of(&output.edges);
    let mut symbols = ws.symbols.clone();
    graph::apply_ref_counts(&mut symbols, &reverse);
    assert_eq!(symbols[&f.to_string()].ref_count, 2);
}
