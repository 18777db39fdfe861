use criterion::{criterion_group, criterion_main, Criterion};
use flyto_index::bm25::{self, Bm25Index};
use flyto_index::graph;
use flyto_index::indexer::Snapshot;
use flyto_index::model::{
    FileRecord, Index, Span, SymbolId, SymbolKind, SymbolRecord,
};
use flyto_index::query;
use flyto_index::session::SessionTracker;
use std::collections::BTreeMap;

/// Synthetic workspace: `fan` callers per layer, `layers` deep, all
/// eventually reaching one hot function.
fn synthetic_snapshot(layers: usize, fan: usize) -> Snapshot {
    let mut files: BTreeMap<String, FileRecord> = BTreeMap::new();
    let mut symbols: BTreeMap<String, SymbolRecord> = BTreeMap::new();

    let mut add = |path: &str, name: &str, refs: Vec<String>| {
        let id = SymbolId::new("bench", path, SymbolKind::Function, name);
        symbols.insert(
            id.to_string(),
            SymbolRecord {
                id: id.clone(),
                kind: SymbolKind::Function,
                span: Span::new(1, 10),
                signature: None,
                doc: Some("benchmark fixture".to_string()),
                decorators: Vec::new(),
                exports: true,
                refs_out: refs,
                extends: Vec::new(),
                body_hash: "0123456789abcdef".to_string(),
                ref_count: 0,
            },
        );
        files
            .entry(format!("bench:{path}"))
            .or_insert_with(|| FileRecord {
                path: path.to_string(),
                project: "bench".to_string(),
                language: "python".to_string(),
                content_hash: "0123456789abcdef".to_string(),
                symbols: Vec::new(),
                imports: Vec::new(),
                defined_routes: Vec::new(),
                outbound_calls: Vec::new(),
                parse_error: false,
            })
            .symbols
            .push(id);
    };

    add("core.py", "hot", Vec::new());
    for layer in 0..layers {
        for i in 0..fan {
            let callee = if layer == 0 {
                "hot".to_string()
            } else {
                format!("f_{}_{i}", layer - 1)
            };
            add(
                &format!("layer{layer}/m{i}.py"),
                &format!("f_{layer}_{i}"),
                vec![callee],
            );
        }
    }

    let output = graph::build(&files, &symbols);
    let reverse = graph::reverse_of(&output.edges);
    graph::apply_ref_counts(&mut symbols, &reverse);
    let index = Index {
        projects: Vec::new(),
        files,
        symbols,
        edges: output.edges,
        reverse,
        unresolved: output.unresolved,
        apis: Vec::new(),
        calls: Vec::new(),
        version: "bench".to_string(),
    };
    let bm25 = Bm25Index::build(
        index
            .symbols
            .iter()
            .map(|(id, record)| (id.as_str(), bm25::document_text(record))),
    );
    Snapshot { index, bm25 }
}

fn bench_impact(c: &mut Criterion) {
    let snapshot = synthetic_snapshot(6, 50);
    c.bench_function("impact_depth_2", |b| {
        b.iter(|| query::impact(&snapshot, "bench:core.py:function:hot", 2).unwrap())
    });
    c.bench_function("impact_depth_4", |b| {
        b.iter(|| query::impact(&snapshot, "bench:core.py:function:hot", 4).unwrap())
    });
}

fn bench_search(c: &mut Criterion) {
    let snapshot = synthetic_snapshot(6, 50);
    let session = SessionTracker::new(128);
    c.bench_function("search_bm25", |b| {
        b.iter(|| query::search(&snapshot, &session, "benchmark fixture", 20))
    });
}

criterion_group!(benches, bench_impact, bench_search);
criterion_main!(benches);
