use crate::error::{EngineError, Result};
use crate::model::{
    Confidence, Edge, EdgeKind, FileRecord, Index, SymbolId, SymbolKind, SymbolRecord,
};
use crate::resolve::{NameResolver, Resolution};
use std::collections::{BTreeMap, BTreeSet};

/// Forward edges and the ambiguity bucket. The reverse index is derived
/// from the final edge set (including API join edges) with [`reverse_of`],
/// so the two can never disagree.
#[derive(Debug, Default)]
pub struct GraphOutput {
    pub edges: Vec<Edge>,
    pub unresolved: BTreeMap<String, Vec<String>>,
}

/// Derive the whole edge set from file and symbol records. Runs after every
/// scan: re-deriving from scratch keeps deletion semantics trivial (edges
/// into a removed file decay to unresolved names) and makes the output a
/// pure function of the records, which is what the determinism guarantee
/// rests on.
pub fn build(
    files: &BTreeMap<String, FileRecord>,
    symbols: &BTreeMap<String, SymbolRecord>,
) -> GraphOutput {
    let resolver = NameResolver::new(files, symbols);
    let mut edges: BTreeSet<Edge> = BTreeSet::new();
    let mut unresolved: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (file_key, file) in files {
        let module_symbol = file_symbol(file, symbols);

        // Import edges between file symbols.
        if let Some(from) = &module_symbol {
            for import in &file.imports {
                let Some(target_key) = resolver.resolve_module_file(file, &import.module) else {
                    continue;
                };
                if target_key == *file_key {
                    continue;
                }
                let Some(target_file) = files.get(&target_key) else {
                    continue;
                };
                if let Some(to) = file_symbol(target_file, symbols) {
                    edges.insert(Edge {
                        from: from.clone(),
                        to,
                        kind: EdgeKind::Imports,
                        confidence: Confidence::Exact,
                    });
                }
            }
        }

        for id in &file.symbols {
            let Some(record) = symbols.get(&id.to_string()) else {
                continue;
            };
            for base in &record.extends {
                match resolver.resolve(file_key, &record.id, base) {
                    Resolution::Bound(to, confidence) => {
                        edges.insert(Edge {
                            from: record.id.clone(),
                            to,
                            kind: EdgeKind::Extends,
                            confidence,
                        });
                    }
                    Resolution::Ambiguous(candidates) => {
                        unresolved
                            .entry(base.clone())
                            .or_default()
                            .extend(candidates);
                    }
                    Resolution::None => {}
                }
            }
            for name in &record.refs_out {
                match resolver.resolve(file_key, &record.id, name) {
                    Resolution::Bound(to, confidence) => {
                        if to == record.id {
                            continue;
                        }
                        let kind = edge_kind_for_target(symbols, &to);
                        edges.insert(Edge {
                            from: record.id.clone(),
                            to,
                            kind,
                            confidence,
                        });
                    }
                    Resolution::Ambiguous(candidates) => {
                        unresolved
                            .entry(name.clone())
                            .or_default()
                            .extend(candidates);
                    }
                    Resolution::None => {}
                }
            }
        }
    }

    GraphOutput {
        edges: edges.into_iter().collect(),
        unresolved: unresolved
            .into_iter()
            .map(|(name, ids)| (name, ids.into_iter().collect()))
            .collect(),
    }
}

/// Reverse index of an edge set: for every target, the sorted distinct
/// sources. Written together with the forward edges or not at all.
pub fn reverse_of(edges: &[Edge]) -> BTreeMap<String, Vec<String>> {
    let mut reverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for edge in edges {
        reverse
            .entry(edge.to.to_string())
            .or_default()
            .insert(edge.from.to_string());
    }
    reverse
        .into_iter()
        .map(|(to, froms)| (to, froms.into_iter().collect()))
        .collect()
}

fn edge_kind_for_target(symbols: &BTreeMap<String, SymbolRecord>, to: &SymbolId) -> EdgeKind {
    match symbols.get(&to.to_string()).map(|record| record.kind) {
        Some(kind) if kind.is_callable() => EdgeKind::Calls,
        _ => EdgeKind::References,
    }
}

/// The symbol standing for the whole file: its module, or the component for
/// single-file components.
pub fn file_symbol(
    file: &FileRecord,
    symbols: &BTreeMap<String, SymbolRecord>,
) -> Option<SymbolId> {
    file.symbols
        .iter()
        .find(|id| {
            symbols
                .get(&id.to_string())
                .map(|record| {
                    record.kind == SymbolKind::Module || record.kind == SymbolKind::Component
                })
                .unwrap_or(false)
        })
        .cloned()
}

/// Fill in per-symbol reference counts from the reverse index.
pub fn apply_ref_counts(
    symbols: &mut BTreeMap<String, SymbolRecord>,
    reverse: &BTreeMap<String, Vec<String>>,
) {
    for (id, record) in symbols.iter_mut() {
        record.ref_count = reverse.get(id).map(|froms| froms.len()).unwrap_or(0);
    }
}

/// Check the structural invariants the rest of the system relies on. A
/// failure here aborts the run before anything is persisted; queries never
/// repair silently.
pub fn verify(index: &Index) -> Result<()> {
    for edge in &index.edges {
        let from = edge.from.to_string();
        let to = edge.to.to_string();
        if !index.symbols.contains_key(&from) {
            return Err(EngineError::Invariant(format!(
                "edge source not in symbol table: {from}"
            )));
        }
        if !index.symbols.contains_key(&to) {
            return Err(EngineError::Invariant(format!(
                "edge target not in symbol table: {to}"
            )));
        }
        let listed = index
            .reverse
            .get(&to)
            .map(|froms| froms.iter().any(|f| *f == from))
            .unwrap_or(false);
        if !listed {
            return Err(EngineError::Invariant(format!(
                "reverse index missing entry {to} <- {from}"
            )));
        }
    }
    let mut forward: BTreeSet<(String, String)> = BTreeSet::new();
    for edge in &index.edges {
        forward.insert((edge.from.to_string(), edge.to.to_string()));
    }
    for (to, froms) in &index.reverse {
        if !index.symbols.contains_key(to) {
            return Err(EngineError::Invariant(format!(
                "reverse index names unknown symbol: {to}"
            )));
        }
        for from in froms {
            if !forward.contains(&(from.clone(), to.clone())) {
                return Err(EngineError::Invariant(format!(
                    "reverse entry without forward edge: {from} -> {to}"
                )));
            }
        }
    }
    for (key, file) in &index.files {
        for id in &file.symbols {
            if !index.symbols.contains_key(&id.to_string()) {
                return Err(EngineError::Invariant(format!(
                    "file {key} lists unknown symbol {id}"
                )));
            }
        }
    }
    Ok(())
}
