use crate::bm25::Bm25Index;
use crate::error::{EngineError, Result};
use crate::model::{Index, SymbolId};
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "index.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const BM25_FILE: &str = "bm25.json";
pub const CONTENT_FILE: &str = "content.jsonl";
pub const SESSION_FILE: &str = "session.json";
pub const PROJECT_MAP_FILE: &str = "project_map.json";
pub const LOCK_FILE: &str = "lock.pid";

/// On-disk layout under `.flyto-index/`. Writers commit each file with an
/// atomic rename; readers tolerate absent or momentarily stale targets but
/// never see partial content.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentRecord {
    id: String,
    body: String,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn load_index(&self) -> Result<Option<Index>> {
        self.load_json(INDEX_FILE)
    }

    pub fn load_manifest(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.load_json(MANIFEST_FILE)?.unwrap_or_default())
    }

    pub fn load_bm25(&self) -> Result<Option<Bm25Index>> {
        self.load_json(BM25_FILE)
    }

    pub fn load_session(&self) -> Result<SessionState> {
        Ok(self.load_json(SESSION_FILE)?.unwrap_or_default())
    }

    /// File-level annotations supplied by an external collaborator. The
    /// core only ever reads this file.
    pub fn load_project_map(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        Ok(self.load_json(PROJECT_MAP_FILE)?.unwrap_or_default())
    }

    fn load_json<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!("unreadable {name}, starting fresh: {err}");
                Ok(None)
            }
        }
    }

    pub fn write_index(&self, index: &Index) -> Result<()> {
        self.write_json(INDEX_FILE, index)
    }

    pub fn write_manifest(&self, manifest: &BTreeMap<String, String>) -> Result<()> {
        self.write_json(MANIFEST_FILE, manifest)
    }

    pub fn write_bm25(&self, index: &Bm25Index) -> Result<()> {
        self.write_json(BM25_FILE, index)
    }

    pub fn write_session(&self, state: &SessionState) -> Result<()> {
        self.write_json(SESSION_FILE, state)
    }

    /// Write to `<name>.tmp` in the same directory, fsync, rename onto the
    /// target, fsync the directory.
    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path(name);
        let tmp = self.path(&format!("{name}.tmp"));
        let bytes = serde_json::to_vec_pretty(value)?;
        let result = (|| -> Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &target)?;
            sync_dir(&self.dir);
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    /// Append changed symbol bodies to the content log.
    pub fn append_content(&self, records: &[(SymbolId, String)]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(CONTENT_FILE))?;
        let mut buffer = Vec::new();
        for (id, body) in records {
            let record = ContentRecord {
                id: id.to_string(),
                body: body.clone(),
            };
            serde_json::to_writer(&mut buffer, &record)?;
            buffer.push(b'\n');
        }
        file.write_all(&buffer)?;
        file.sync_all()?;
        Ok(())
    }

    /// Rewrite the content log keeping the latest record per live symbol,
    /// but only once dead records outnumber live ones.
    pub fn compact_content(&self, live_ids: &HashSet<String>) -> Result<()> {
        let path = self.path(CONTENT_FILE);
        if !path.exists() {
            return Ok(());
        }
        let mut latest: HashMap<String, String> = HashMap::new();
        let mut total = 0usize;
        let reader = BufReader::new(File::open(&path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            total += 1;
            if let Ok(record) = serde_json::from_str::<ContentRecord>(&line) {
                if live_ids.contains(&record.id) {
                    latest.insert(record.id, record.body);
                }
            }
        }
        if total <= latest.len() * 2 {
            return Ok(());
        }
        let mut ids: Vec<&String> = latest.keys().collect();
        ids.sort();
        let tmp = self.path(&format!("{CONTENT_FILE}.tmp"));
        let result = (|| -> Result<()> {
            let mut file = File::create(&tmp)?;
            let mut buffer = Vec::new();
            for id in ids {
                let record = ContentRecord {
                    id: id.clone(),
                    body: latest[id].clone(),
                };
                serde_json::to_writer(&mut buffer, &record)?;
                buffer.push(b'\n');
            }
            file.write_all(&buffer)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)?;
            sync_dir(&self.dir);
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    /// Lazy body retrieval: last record for the id wins.
    pub fn symbol_body(&self, id: &SymbolId) -> Result<Option<String>> {
        let path = self.path(CONTENT_FILE);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let wanted = id.to_string();
        let mut body = None;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<ContentRecord>(&line) {
                if record.id == wanted {
                    body = Some(record.body);
                }
            }
        }
        Ok(body)
    }

    /// Take the writer lock. Exactly one writer may hold it; a second
    /// writer fails fast with `index_locked`. Readers never lock.
    pub fn lock_writer(&self) -> Result<WriterLock> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let pid = std::process::id();
                let _ = write!(file, "{pid}");
                let _ = file.sync_all();
                Ok(WriterLock { path })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .ok()
                    .and_then(|text| text.trim().parse().ok())
                    .unwrap_or(0);
                Err(EngineError::IndexLocked(holder))
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}

/// Pid-file guard for the index directory; dropping it releases the lock.
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SymbolKind;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join(".flyto-index"));
        (dir, store)
    }

    #[test]
    fn absent_files_load_as_empty() {
        let (_dir, store) = temp_store();
        assert!(store.load_index().unwrap().is_none());
        assert!(store.load_manifest().unwrap().is_empty());
        assert!(store.load_bm25().unwrap().is_none());
        assert!(store.load_session().unwrap().events.is_empty());
    }

    #[test]
    fn manifest_round_trips_and_leaves_no_tmp() {
        let (_dir, store) = temp_store();
        let mut manifest = BTreeMap::new();
        manifest.insert("a.py".to_string(), "deadbeef00000000".to_string());
        store.write_manifest(&manifest).unwrap();
        assert_eq!(store.load_manifest().unwrap(), manifest);
        assert!(!store.dir().join("manifest.json.tmp").exists());
    }

    #[test]
    fn second_writer_is_rejected() {
        let (_dir, store) = temp_store();
        let lock = store.lock_writer().unwrap();
        match store.lock_writer() {
            Err(EngineError::IndexLocked(pid)) => assert_eq!(pid, std::process::id()),
            other => panic!("expected IndexLocked, got {other:?}"),
        }
        drop(lock);
        assert!(store.lock_writer().is_ok());
    }

    #[test]
    fn content_log_appends_and_compacts() {
        let (_dir, store) = temp_store();
        let id = |name: &str| SymbolId::new("p", "a.py", SymbolKind::Function, name);
        store
            .append_content(&[(id("f"), "def f(): pass".to_string())])
            .unwrap();
        store
            .append_content(&[
                (id("f"), "def f(): return 1".to_string()),
                (id("g"), "def g(): pass".to_string()),
            ])
            .unwrap();
        assert_eq!(
            store.symbol_body(&id("f")).unwrap().unwrap(),
            "def f(): return 1"
        );

        // Only g stays live: 3 records, 1 live -> compaction rewrites.
        let live: HashSet<String> = [id("g").to_string()].into_iter().collect();
        store.compact_content(&live).unwrap();
        assert!(store.symbol_body(&id("f")).unwrap().is_none());
        assert_eq!(store.symbol_body(&id("g")).unwrap().unwrap(), "def g(): pass");
    }
}
