use crate::api;
use crate::bm25::{self, Bm25Index};
use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::graph;
use crate::model::{
    FileRecord, Index, Project, ProjectInfo, ScanSummary, SymbolId, SymbolRecord,
};
use crate::session::SessionTracker;
use crate::store::Store;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

pub mod extract;
pub mod go;
pub mod java;
pub mod javascript;
pub mod python;
pub mod rust;
pub mod scan;
pub mod vue;

use extract::{FileContext, LanguageExtractor, ParsedFile};
use scan::{ScanOptions, ScannedFile};

/// Immutable view of the graph handed to queries. Reindexing builds a new
/// one and swaps it in; readers keep whatever Arc they already cloned.
#[derive(Debug)]
pub struct Snapshot {
    pub index: Index,
    pub bm25: Bm25Index,
}

/// The indexing engine: owns the workspace definition, the on-disk store,
/// the current snapshot and the session tracker.
pub struct Engine {
    projects: Vec<Project>,
    store: Store,
    scan_options: ScanOptions,
    snapshot: RwLock<Arc<Snapshot>>,
    session: Mutex<SessionTracker>,
    parse_count: AtomicUsize,
}

/// One parsed-file bundle produced by a worker, consumed by the reducer.
struct Bundle {
    key: String,
    scanned: ScannedFile,
    parsed: ParsedFile,
    parsed_fresh: bool,
}

impl Engine {
    /// Open a single-project workspace rooted at `root`. The index
    /// directory lives inside the root.
    pub fn open(root: impl Into<std::path::PathBuf>) -> Result<Engine> {
        let root = root.into();
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("workspace")
            .to_string();
        let store_dir = root.join(scan::INDEX_DIR_NAME);
        Self::open_workspace(vec![Project::new(name, root)], store_dir)
    }

    /// Open a workspace of one or more projects with an explicit index
    /// directory.
    pub fn open_workspace(
        projects: Vec<Project>,
        store_dir: impl Into<std::path::PathBuf>,
    ) -> Result<Engine> {
        if projects.is_empty() {
            return Err(EngineError::Input("workspace has no projects".to_string()));
        }
        let store = Store::new(store_dir);
        let config = Config::get();
        let index = store.load_index()?.unwrap_or_default();
        let bm25 = store.load_bm25()?.unwrap_or_default();
        let session_state = store.load_session()?;
        Ok(Engine {
            projects,
            store,
            scan_options: ScanOptions::default(),
            snapshot: RwLock::new(Arc::new(Snapshot { index, bm25 })),
            session: Mutex::new(SessionTracker::from_state(
                config.session_capacity,
                session_state,
            )),
            parse_count: AtomicUsize::new(0),
        })
    }

    pub fn set_scan_options(&mut self, options: ScanOptions) {
        self.scan_options = options;
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().expect("snapshot lock").clone()
    }

    /// Files parsed by the most recent scan; unchanged files never count.
    pub fn parses_last_scan(&self) -> usize {
        self.parse_count.load(Ordering::SeqCst)
    }

    pub fn with_session<T>(&self, f: impl FnOnce(&mut SessionTracker) -> T) -> T {
        let mut session = self.session.lock().expect("session lock");
        let value = f(&mut session);
        if session.should_flush(false) {
            let state = session.state();
            if let Err(err) = self.store.write_session(&state) {
                tracing::warn!("session flush failed: {err}");
            }
        }
        value
    }

    /// Flush session state on clean shutdown.
    pub fn shutdown(&self) -> Result<()> {
        let mut session = self.session.lock().expect("session lock");
        if session.should_flush(true) {
            self.store.write_session(&session.state())?;
        }
        Ok(())
    }

    /// Full pipeline: walk, classify against the manifest, parse changed
    /// files on the worker pool, reduce, resolve, join, verify, persist,
    /// swap the snapshot. Cancellation or any I/O error commits nothing.
    pub fn scan(&self, cancel: &CancelFlag) -> Result<ScanSummary> {
        let started = Instant::now();
        let _lock = self.store.lock_writer()?;
        self.parse_count.store(0, Ordering::SeqCst);

        let mut scanned_all: Vec<ScannedFile> = Vec::new();
        for project in &self.projects {
            scanned_all.extend(scan::scan_project(project, self.scan_options, cancel)?);
        }

        let manifest_old = self.store.load_manifest()?;
        let previous = self.snapshot();

        let mut summary = ScanSummary::default();
        let mut current_keys: HashSet<String> = HashSet::new();
        let mut to_parse: Vec<ScannedFile> = Vec::new();
        let mut unchanged: Vec<ScannedFile> = Vec::new();
        for file in scanned_all {
            let key = file_key(&file.project, &file.rel_path);
            current_keys.insert(key.clone());
            match manifest_old.get(&key) {
                None => {
                    summary.added += 1;
                    to_parse.push(file);
                }
                Some(hash) if *hash != file.hash => {
                    summary.modified += 1;
                    to_parse.push(file);
                }
                Some(_) => {
                    // Hash match but no cached record (e.g. older index
                    // version): fall back to a parse.
                    if previous.index.files.contains_key(&key) {
                        summary.unchanged += 1;
                        unchanged.push(file);
                    } else {
                        summary.modified += 1;
                        to_parse.push(file);
                    }
                }
            }
        }
        summary.deleted = manifest_old
            .keys()
            .filter(|key| !current_keys.contains(*key))
            .count();

        let bundles = self.parse_files(to_parse, cancel)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Reduce: cached records for unchanged files, fresh bundles for the
        // rest. BTreeMaps keep everything in workspace-lexicographic order
        // regardless of which worker parsed what.
        let mut files: BTreeMap<String, FileRecord> = BTreeMap::new();
        let mut symbols: BTreeMap<String, SymbolRecord> = BTreeMap::new();
        let mut manifest_new: BTreeMap<String, String> = BTreeMap::new();
        let mut changed_bodies: Vec<(SymbolId, String)> = Vec::new();

        for file in unchanged {
            let key = file_key(&file.project, &file.rel_path);
            let Some(record) = previous.index.files.get(&key) else {
                continue;
            };
            files.insert(key.clone(), record.clone());
            manifest_new.insert(key, file.hash);
            for id in &record.symbols {
                if let Some(symbol) = previous.index.symbols.get(&id.to_string()) {
                    symbols.insert(id.to_string(), symbol.clone());
                }
            }
        }

        for bundle in bundles {
            let Bundle {
                key,
                scanned,
                parsed,
                parsed_fresh,
            } = bundle;
            if parsed_fresh {
                self.parse_count.fetch_add(1, Ordering::SeqCst);
            }
            if parsed.parse_error {
                summary.parse_errors += 1;
            }
            let mut ids = Vec::new();
            for symbol in parsed.symbols {
                ids.push(symbol.id.clone());
                symbols.insert(symbol.id.to_string(), symbol);
            }
            changed_bodies.extend(parsed.bodies);
            let record = FileRecord {
                path: scanned.rel_path.clone(),
                project: scanned.project.clone(),
                language: scanned.language.clone(),
                content_hash: scanned.hash.clone(),
                symbols: ids,
                imports: parsed.imports,
                defined_routes: parsed.routes,
                outbound_calls: parsed.calls,
                parse_error: parsed.parse_error,
            };
            manifest_new.insert(key.clone(), scanned.hash);
            files.insert(key, record);
        }

        // Graph derivation and the API join.
        let resolved = graph::build(&files, &symbols);
        let mut routes = Vec::new();
        let mut calls = Vec::new();
        for record in files.values() {
            routes.extend(record.defined_routes.iter().cloned());
            calls.extend(record.outbound_calls.iter().cloned());
        }
        let (_, route_edges) = api::join(&routes, &calls);
        let mut edges = resolved.edges;
        edges.extend(route_edges);
        edges.sort();
        edges.dedup();
        let reverse = graph::reverse_of(&edges);
        graph::apply_ref_counts(&mut symbols, &reverse);

        summary.symbols = symbols.len();
        summary.edges = edges.len();

        let index = Index {
            projects: self.project_infos(&files),
            files,
            symbols,
            edges,
            reverse,
            unresolved: resolved.unresolved,
            apis: routes,
            calls,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        graph::verify(&index)?;

        let bm25 = Bm25Index::build(
            index
                .symbols
                .iter()
                .map(|(id, record)| (id.as_str(), bm25::document_text(record))),
        );

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Persist: the manifest commits last so a partial failure never
        // claims files that were not fully written.
        self.store.write_index(&index)?;
        self.store.write_bm25(&bm25)?;
        self.store.append_content(&changed_bodies)?;
        let live: HashSet<String> = index.symbols.keys().cloned().collect();
        self.store.compact_content(&live)?;
        self.store.write_manifest(&manifest_new)?;

        *self.snapshot.write().expect("snapshot lock") = Arc::new(Snapshot { index, bm25 });

        summary.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            added = summary.added,
            modified = summary.modified,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            symbols = summary.symbols,
            edges = summary.edges,
            "scan complete"
        );
        Ok(summary)
    }

    /// Parse changed files on a pool of workers. Workers block on file I/O
    /// and on the bounded result queue; the reducer (caller) blocks on
    /// receiving. Each worker checks the cancel flag before every file.
    fn parse_files(&self, to_parse: Vec<ScannedFile>, cancel: &CancelFlag) -> Result<Vec<Bundle>> {
        if to_parse.is_empty() {
            return Ok(Vec::new());
        }
        let worker_count = Config::get().worker_count().min(to_parse.len());
        let queue: Arc<Mutex<VecDeque<ScannedFile>>> =
            Arc::new(Mutex::new(to_parse.into_iter().collect()));
        let (tx, rx) = mpsc::sync_channel::<Bundle>(worker_count * 2);

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let queue = Arc::clone(&queue);
                let tx = tx.clone();
                let cancel = cancel.clone();
                scope.spawn(move || {
                    let mut extractors = match ExtractorSet::new() {
                        Ok(set) => set,
                        Err(err) => {
                            tracing::warn!("worker setup failed: {err}");
                            return;
                        }
                    };
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let job = queue.lock().expect("job queue").pop_front();
                        let Some(file) = job else { break };
                        let bundle = parse_one(&mut extractors, file);
                        if tx.send(bundle).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut bundles = Vec::new();
            while let Ok(bundle) = rx.recv() {
                bundles.push(bundle);
            }
            bundles.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(bundles)
        })
    }

    fn project_infos(&self, files: &BTreeMap<String, FileRecord>) -> Vec<ProjectInfo> {
        self.projects
            .iter()
            .map(|project| {
                let mut language_counts: BTreeMap<String, usize> = BTreeMap::new();
                for record in files.values() {
                    if record.project == project.name {
                        *language_counts.entry(record.language.clone()).or_insert(0) += 1;
                    }
                }
                ProjectInfo {
                    name: project.name.clone(),
                    root: project.root.to_string_lossy().to_string(),
                    language_counts,
                }
            })
            .collect()
    }
}

pub fn file_key(project: &str, rel_path: &str) -> String {
    format!("{project}:{rel_path}")
}

fn parse_one(extractors: &mut ExtractorSet, file: ScannedFile) -> Bundle {
    let key = file_key(&file.project, &file.rel_path);
    let ctx = FileContext {
        project: &file.project,
        rel_path: &file.rel_path,
    };
    let source = match crate::util::read_to_string(&file.abs_path) {
        Ok(source) => source,
        Err(err) => {
            tracing::warn!("{err}");
            let mut parsed = ParsedFile::default();
            parsed.parse_error = true;
            return Bundle {
                key,
                scanned: file,
                parsed,
                parsed_fresh: false,
            };
        }
    };
    let parsed = match extractors.get(&file.language) {
        Some(extractor) => match extractor.extract(&ctx, &source) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!("extract error {}: {err}", file.rel_path);
                let mut parsed = ParsedFile::default();
                parsed.parse_error = true;
                parsed
            }
        },
        None => {
            let mut parsed = ParsedFile::default();
            parsed.parse_error = true;
            parsed
        }
    };
    Bundle {
        key,
        scanned: file,
        parsed,
        parsed_fresh: true,
    }
}

/// One parser per supported language, owned per worker because tree-sitter
/// parsers are not shareable across threads.
struct ExtractorSet {
    extractors: BTreeMap<&'static str, Box<dyn LanguageExtractor>>,
}

impl ExtractorSet {
    fn new() -> Result<Self> {
        let mut extractors: BTreeMap<&'static str, Box<dyn LanguageExtractor>> = BTreeMap::new();
        extractors.insert("python", Box::new(python::PythonExtractor::new()?));
        extractors.insert(
            "javascript",
            Box::new(javascript::JavascriptExtractor::new()?),
        );
        extractors.insert(
            "typescript",
            Box::new(javascript::TypescriptExtractor::new()?),
        );
        extractors.insert("vue", Box::new(vue::VueExtractor::new()?));
        extractors.insert("go", Box::new(go::GoExtractor::new()?));
        extractors.insert("rust", Box::new(rust::RustExtractor::new()?));
        extractors.insert("java", Box::new(java::JavaExtractor::new()?));
        Ok(Self { extractors })
    }

    fn get(&mut self, language: &str) -> Option<&mut Box<dyn LanguageExtractor>> {
        self.extractors.get_mut(language)
    }
}
