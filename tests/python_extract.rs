use flyto_index::indexer::extract::{FileContext, LanguageExtractor, ParsedFile};
use flyto_index::indexer::python::{module_name_from_rel_path, PythonExtractor};
use flyto_index::model::{Framework, SymbolKind};

fn extract(rel_path: &str, source: &str) -> ParsedFile {
    let mut extractor = PythonExtractor::new().unwrap();
    let ctx = FileContext {
        project: "app",
        rel_path,
    };
    extractor.extract(&ctx, source).unwrap()
}

#[test]
fn module_name_from_path() {
    assert_eq!(module_name_from_rel_path("foo.py"), "foo");
    assert_eq!(module_name_from_rel_path("pkg/__init__.py"), "pkg");
    assert_eq!(module_name_from_rel_path("pkg/sub/mod.py"), "pkg.sub.mod");
    assert_eq!(module_name_from_rel_path("__init__.py"), "__init__");
}

#[test]
fn extracts_classes_methods_and_functions() {
    let source = r#""""module doc"""
import os

class Base:
    pass

class Wallet(Base):
    """Tracks a balance."""

    def top_up(self, amount: int) -> int:
        "adds funds"
        return self.balance + amount

def make_wallet(owner):
    w = Wallet()
    return w
"#;
    let parsed = extract("pkg/wallet.py", source);
    let names: Vec<(&str, &str)> = parsed
        .symbols
        .iter()
        .map(|s| (s.kind.as_str(), s.id.name.as_str()))
        .collect();

    assert!(names.contains(&("module", "pkg.wallet")));
    assert!(names.contains(&("class", "Base")));
    assert!(names.contains(&("class", "Wallet")));
    assert!(names.contains(&("method", "Wallet.top_up")));
    assert!(names.contains(&("function", "make_wallet")));

    let wallet = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "Wallet")
        .unwrap();
    assert_eq!(wallet.doc.as_deref(), Some("Tracks a balance."));
    assert_eq!(wallet.extends, vec!["Base"]);
    assert!(wallet.exports);

    let top_up = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "Wallet.top_up")
        .unwrap();
    assert_eq!(top_up.kind, SymbolKind::Method);
    assert_eq!(
        top_up.signature.as_deref(),
        Some("(self, amount: int) -> int")
    );
    assert_eq!(top_up.doc.as_deref(), Some("adds funds"));

    let make_wallet = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "make_wallet")
        .unwrap();
    assert!(make_wallet.refs_out.contains(&"Wallet".to_string()));
}

#[test]
fn nested_functions_become_symbols() {
    let source = r#"
def outer():
    def inner():
        return 1
    return inner
"#;
    let parsed = extract("a.py", source);
    let names: Vec<&str> = parsed.symbols.iter().map(|s| s.id.name.as_str()).collect();
    assert!(names.contains(&"outer"));
    assert!(names.contains(&"outer.inner"));
}

#[test]
fn underscore_names_are_not_exported() {
    let parsed = extract("a.py", "def _private():\n    pass\n");
    let private = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "_private")
        .unwrap();
    assert!(!private.exports);
}

#[test]
fn imports_capture_names_and_aliases() {
    let source = r#"
import os
import numpy as np
from pkg.core import Wallet, make_wallet as factory
"#;
    let parsed = extract("a.py", source);
    let os_import = parsed.imports.iter().find(|i| i.module == "os").unwrap();
    assert_eq!(os_import.names, vec!["os"]);

    let np_import = parsed.imports.iter().find(|i| i.module == "numpy").unwrap();
    assert_eq!(np_import.alias.as_deref(), Some("np"));

    let from_import = parsed
        .imports
        .iter()
        .find(|i| i.module == "pkg.core")
        .unwrap();
    assert!(from_import.names.contains(&"Wallet".to_string()));
    assert!(from_import.names.contains(&"factory".to_string()));
}

#[test]
fn fastapi_route_decorators_become_routes() {
    let source = r#"
@app.get("/api/users/{id}")
def get_user(id: int):
    return {"ok": True}

@router.post("/api/users")
async def create_user(payload):
    return payload
"#;
    let parsed = extract("backend/routes.py", source);
    assert_eq!(parsed.routes.len(), 2);

    let get = &parsed.routes[0];
    assert_eq!(get.method, "GET");
    assert_eq!(get.path_pattern, "/api/users/{id}");
    assert_eq!(get.handler.name, "get_user");
    assert_eq!(get.handler.kind, SymbolKind::Function);
    assert_eq!(get.framework, Framework::Fastapi);

    let post = &parsed.routes[1];
    assert_eq!(post.method, "POST");
    assert_eq!(post.path_pattern, "/api/users");

    // A searchable route symbol accompanies each declaration.
    assert!(parsed
        .symbols
        .iter()
        .any(|s| s.kind == SymbolKind::Route && s.id.name == "GET /api/users/{id}"));

    let handler = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "get_user")
        .unwrap();
    assert_eq!(handler.decorators, vec!["app.get"]);
}

#[test]
fn flask_route_with_methods_kwarg() {
    let source = r#"
@app.route("/health", methods=["GET", "POST"])
def health():
    return "ok"
"#;
    let parsed = extract("srv.py", source);
    assert_eq!(parsed.routes.len(), 1);
    assert_eq!(parsed.routes[0].method, "GET,POST");
    assert_eq!(parsed.routes[0].framework, Framework::Flask);
}

#[test]
fn module_level_calls_feed_module_refs() {
    let source = "from a import foo\nfoo()\n";
    let parsed = extract("b.py", source);
    let module = parsed
        .symbols
        .iter()
        .find(|s| s.kind == SymbolKind::Module)
        .unwrap();
    assert!(module.refs_out.contains(&"foo".to_string()));
}

#[test]
fn reserved_words_and_builtins_are_filtered() {
    let source = "def f(x):\n    return len(sorted(x))\n";
    let parsed = extract("a.py", source);
    let f = parsed.symbols.iter().find(|s| s.id.name == "f").unwrap();
    assert!(!f.refs_out.contains(&"len".to_string()));
    assert!(!f.refs_out.contains(&"sorted".to_string()));
    assert!(!f.refs_out.contains(&"return".to_string()));
}

#[test]
fn string_contents_never_produce_refs() {
    let source = "def f():\n    return \"fetch dispatch\"\n";
    let parsed = extract("a.py", source);
    let f = parsed.symbols.iter().find(|s| s.id.name == "f").unwrap();
    assert!(!f.refs_out.contains(&"dispatch".to_string()));
}

#[test]
fn unicode_identifiers_survive() {
    let source = "def grüße():\n    return 1\n";
    let parsed = extract("a.py", source);
    assert!(parsed.symbols.iter().any(|s| s.id.name == "grüße"));
}

#[test]
fn dotted_chains_are_limited_to_three_segments() {
    let source = "def f(client):\n    client.api.users.list.all()\n    client.api.users()\n";
    let parsed = extract("a.py", source);
    let f = parsed.symbols.iter().find(|s| s.id.name == "f").unwrap();
    assert!(f.refs_out.contains(&"client.api.users".to_string()));
    assert!(!f
        .refs_out
        .iter()
        .any(|r| r.matches('.').count() > 2));
}
