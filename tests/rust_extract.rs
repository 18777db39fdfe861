use flyto_index::indexer::extract::{FileContext, LanguageExtractor, ParsedFile};
use flyto_index::indexer::rust::RustExtractor;
use flyto_index::model::SymbolKind;

fn extract(rel_path: &str, source: &str) -> ParsedFile {
    let mut extractor = RustExtractor::new().unwrap();
    let ctx = FileContext {
        project: "svc",
        rel_path,
    };
    extractor.extract(&ctx, source).unwrap()
}

const LEDGER: &str = r#"use crate::store::Db;
use std::collections::HashMap;

pub const MAX_ENTRIES: usize = 1024;

/// A balance ledger.
pub struct Ledger {
    entries: HashMap<String, i64>,
}

pub enum Entry {
    Credit(i64),
    Debit(i64),
}

pub trait Persist {
    fn persist(&self, db: &Db);
}

impl Ledger {
    /// Apply one entry.
    pub fn apply(&mut self, entry: Entry) -> i64 {
        self.total()
    }

    fn total(&self) -> i64 {
        0
    }
}

pub mod summary {
    pub fn render() -> String {
        String::new()
    }
}

fn helper() {
    let ledger = Ledger {
        entries: Default::default(),
    };
}
"#;

#[test]
fn extracts_structs_enums_traits_impl_methods_and_mods() {
    let parsed = extract("src/ledger.rs", LEDGER);
    let names: Vec<(&str, &str)> = parsed
        .symbols
        .iter()
        .map(|s| (s.kind.as_str(), s.id.name.as_str()))
        .collect();

    assert!(names.contains(&("module", "ledger")));
    assert!(names.contains(&("struct", "Ledger")));
    assert!(names.contains(&("enum", "Entry")));
    assert!(names.contains(&("trait", "Persist")));
    assert!(names.contains(&("method", "Ledger.apply")));
    assert!(names.contains(&("method", "Ledger.total")));
    assert!(names.contains(&("module", "summary")));
    assert!(names.contains(&("function", "helper")));
    assert!(names.contains(&("constant", "MAX_ENTRIES")));
}

#[test]
fn visibility_maps_to_exports() {
    let parsed = extract("src/ledger.rs", LEDGER);
    let apply = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "Ledger.apply")
        .unwrap();
    assert!(apply.exports);
    let total = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "Ledger.total")
        .unwrap();
    assert!(!total.exports);
}

#[test]
fn doc_comments_and_signatures_attach() {
    let parsed = extract("src/ledger.rs", LEDGER);
    let ledger = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "Ledger" && s.kind == SymbolKind::Struct)
        .unwrap();
    assert_eq!(ledger.doc.as_deref(), Some("A balance ledger."));

    let apply = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "Ledger.apply")
        .unwrap();
    assert_eq!(apply.doc.as_deref(), Some("Apply one entry."));
    assert_eq!(
        apply.signature.as_deref(),
        Some("(&mut self, entry: Entry) -> i64")
    );
}

#[test]
fn use_declarations_flatten_into_imports() {
    let parsed = extract("src/ledger.rs", LEDGER);
    let db = parsed
        .imports
        .iter()
        .find(|i| i.module == "crate::store::Db")
        .unwrap();
    assert_eq!(db.names, vec!["Db"]);
    assert!(parsed
        .imports
        .iter()
        .any(|i| i.module == "std::collections::HashMap"));
}

#[test]
fn method_bodies_reference_sibling_methods() {
    let parsed = extract("src/ledger.rs", LEDGER);
    let apply = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "Ledger.apply")
        .unwrap();
    assert!(apply.refs_out.contains(&"total".to_string()));

    let helper = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "helper")
        .unwrap();
    assert!(helper.refs_out.contains(&"Ledger".to_string()));
}
