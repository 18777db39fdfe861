use crate::api::{self, ApiEntry};
use crate::error::{EngineError, Result};
use crate::indexer::Snapshot;
use crate::model::{Confidence, FileRecord, Index, SymbolId};
use crate::session::SessionTracker;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Serialize)]
pub struct ImpactEntry {
    pub id: SymbolId,
    pub depth: usize,
    pub confidence: Confidence,
}

/// Reverse closure of a symbol, grouped by project.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactResult {
    pub symbol: SymbolId,
    pub depth: usize,
    pub groups: BTreeMap<String, Vec<ImpactEntry>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceEntry {
    pub file: String,
    pub line: u32,
    pub containing_symbol: SymbolId,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: SymbolId,
    pub score: f64,
    pub bm25: f64,
    pub boost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    #[serde(flatten)]
    pub record: FileRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<serde_json::Value>,
}

/// Fraction of the top BM25 score the session boost may add; keeps boosts
/// from overriding relevance wholesale.
const BOOST_ALPHA: f64 = 0.2;

/// Accept a full `project:path:kind:name` id, a short `path:kind:name` id,
/// or a bare trailing name, resolved in that order.
pub fn resolve_symbol_id(index: &Index, raw: &str) -> Result<SymbolId> {
    if index.symbols.contains_key(raw) {
        return raw.parse();
    }
    for project in &index.projects {
        let qualified = format!("{}:{raw}", project.name);
        if index.symbols.contains_key(&qualified) {
            return qualified.parse();
        }
    }
    let suffix = format!(":{raw}");
    let mut candidates: Vec<&String> = index
        .symbols
        .keys()
        .filter(|id| id.ends_with(&suffix))
        .collect();
    candidates.sort();
    match candidates.first() {
        Some(id) => id.parse(),
        None => Err(EngineError::UnknownSymbol(raw.to_string())),
    }
}

/// Breadth-first reverse closure up to `depth`. Each node carries the
/// strongest confidence of any edge that pulled it in.
pub fn impact(snapshot: &Snapshot, raw_id: &str, depth: usize) -> Result<ImpactResult> {
    let index = &snapshot.index;
    let symbol = resolve_symbol_id(index, raw_id)?;
    let confidences = edge_confidences(index);

    let mut groups: BTreeMap<String, Vec<ImpactEntry>> = BTreeMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(symbol.to_string());
    let mut frontier = VecDeque::new();
    frontier.push_back((symbol.to_string(), 0usize));

    while let Some((current, level)) = frontier.pop_front() {
        if level >= depth {
            continue;
        }
        let Some(froms) = index.reverse.get(&current) else {
            continue;
        };
        for from in froms {
            if !visited.insert(from.clone()) {
                continue;
            }
            let Some(record) = index.symbols.get(from) else {
                continue;
            };
            let confidence = confidences
                .get(&(from.clone(), current.clone()))
                .copied()
                .unwrap_or(Confidence::Heuristic);
            groups
                .entry(record.id.project.clone())
                .or_default()
                .push(ImpactEntry {
                    id: record.id.clone(),
                    depth: level + 1,
                    confidence,
                });
            frontier.push_back((from.clone(), level + 1));
        }
    }

    for entries in groups.values_mut() {
        entries.sort_by(|a, b| (a.depth, a.id.to_string()).cmp(&(b.depth, b.id.to_string())));
    }
    Ok(ImpactResult {
        symbol,
        depth,
        groups,
    })
}

/// Every direct reverse edge of a symbol with location and confidence.
pub fn references(snapshot: &Snapshot, raw_id: &str) -> Result<Vec<ReferenceEntry>> {
    let index = &snapshot.index;
    let symbol = resolve_symbol_id(index, raw_id)?;
    let confidences = edge_confidences(index);
    let key = symbol.to_string();
    let mut entries = Vec::new();
    for from in index.reverse.get(&key).into_iter().flatten() {
        let Some(record) = index.symbols.get(from) else {
            continue;
        };
        entries.push(ReferenceEntry {
            file: record.id.path.clone(),
            line: record.span.start_line,
            containing_symbol: record.id.clone(),
            confidence: confidences
                .get(&(from.clone(), key.clone()))
                .copied()
                .unwrap_or(Confidence::Heuristic),
        });
    }
    entries.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
    Ok(entries)
}

/// BM25 ranking with the additive session boost. The boost per symbol is
/// `alpha * recency_weight` of its file, where alpha is 20% of the top
/// BM25 score for this query.
pub fn search(
    snapshot: &Snapshot,
    session: &SessionTracker,
    query: &str,
    max: usize,
) -> Vec<SearchResult> {
    let fetch = max.saturating_mul(4).max(50);
    let ranked = snapshot.bm25.search(query, fetch);
    let Some(top) = ranked.first().map(|(_, score)| *score) else {
        return Vec::new();
    };
    let alpha = BOOST_ALPHA * top;
    let weights = session.boost_weights();

    let mut results: Vec<SearchResult> = ranked
        .into_iter()
        .filter_map(|(id, bm25_score)| {
            let parsed: SymbolId = id.parse().ok()?;
            let boost = weights
                .get(&parsed.path)
                .map(|weight| alpha * weight)
                .unwrap_or(0.0);
            Some(SearchResult {
                id: parsed,
                score: bm25_score + boost,
                bm25: bm25_score,
                boost,
            })
        })
        .collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ra = snapshot.index.symbols.get(&a.id.to_string());
                let rb = snapshot.index.symbols.get(&b.id.to_string());
                let ca = ra.map(|r| r.ref_count).unwrap_or(0);
                let cb = rb.map(|r| r.ref_count).unwrap_or(0);
                cb.cmp(&ca)
            })
            .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
    });
    results.truncate(max);
    results
}

/// Look up a file by `project:path` key, or by bare path when it is
/// unambiguous across projects.
pub fn file_info(
    snapshot: &Snapshot,
    project_map: &BTreeMap<String, serde_json::Value>,
    path: &str,
) -> Result<FileInfo> {
    let index = &snapshot.index;
    let record = if let Some(record) = index.files.get(path) {
        record
    } else {
        let mut matches: Vec<&String> = index
            .files
            .iter()
            .filter(|(_, record)| record.path == path)
            .map(|(key, _)| key)
            .collect();
        matches.sort();
        match matches.len() {
            0 => return Err(EngineError::Input(format!("unknown file: {path}"))),
            1 => &index.files[matches[0]],
            _ => {
                return Err(EngineError::Input(format!(
                    "ambiguous file {path}: matches {}",
                    matches
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )))
            }
        }
    };
    let annotation = project_map.get(&record.path).cloned();
    Ok(FileInfo {
        record: record.clone(),
        annotation,
    })
}

/// All routes with their joined callers, including routes nobody calls.
pub fn apis(snapshot: &Snapshot) -> Vec<ApiEntry> {
    let (entries, _) = api::join(&snapshot.index.apis, &snapshot.index.calls);
    entries
}

fn edge_confidences(index: &Index) -> HashMap<(String, String), Confidence> {
    let mut map: HashMap<(String, String), Confidence> = HashMap::new();
    for edge in &index.edges {
        let key = (edge.from.to_string(), edge.to.to_string());
        map.entry(key)
            .and_modify(|existing| {
                if edge.confidence < *existing {
                    *existing = edge.confidence;
                }
            })
            .or_insert(edge.confidence);
    }
    map
}
