use crate::cancel::CancelFlag;
use crate::error::{EngineError, Result};
use crate::model::Project;
use crate::util;
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

pub const INDEX_DIR_NAME: &str = ".flyto-index";

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub project: String,
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub hash: String,
    pub size: u64,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub no_ignore: bool,
    pub max_file_bytes: u64,
}

impl ScanOptions {
    pub fn new(no_ignore: bool, max_file_bytes: u64) -> Self {
        Self {
            no_ignore,
            max_file_bytes,
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            no_ignore: false,
            max_file_bytes: crate::config::Config::get().max_file_bytes,
        }
    }
}

static LANGUAGE_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        name: "python",
        extensions: &["py", "pyi"],
    },
    LanguageSpec {
        name: "typescript",
        extensions: &["ts", "tsx", "mts", "cts"],
    },
    LanguageSpec {
        name: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    LanguageSpec {
        name: "vue",
        extensions: &["vue"],
    },
    LanguageSpec {
        name: "go",
        extensions: &["go"],
    },
    LanguageSpec {
        name: "rust",
        extensions: &["rs"],
    },
    LanguageSpec {
        name: "java",
        extensions: &["java"],
    },
];

pub fn language_specs() -> &'static [LanguageSpec] {
    LANGUAGE_SPECS
}

/// Walk one project root and return its source files in lexicographic
/// rel-path order. Honors .gitignore (unless `no_ignore`), skips
/// dot-directories except `.flyto-index` itself is never descended into,
/// refuses symlinks pointing outside the root, and applies the size cap.
pub fn scan_project(
    project: &Project,
    options: ScanOptions,
    cancel: &CancelFlag,
) -> Result<Vec<ScannedFile>> {
    let root = fs::canonicalize(&project.root).unwrap_or_else(|_| project.root.clone());
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(&root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .follow_links(false)
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if let Ok(resolved) = fs::canonicalize(path) {
            if !resolved.starts_with(&root) {
                tracing::warn!("refusing symlink outside root: {}", path.display());
                continue;
            }
        }
        let metadata = match fs::metadata(path) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("stat error {}: {err}", path.display());
                continue;
            }
        };
        if metadata.len() > options.max_file_bytes {
            continue;
        }
        let language = match detect_language(path) {
            Some(value) => value,
            None => continue,
        };
        let rel_path = util::normalize_rel_path(&root, path)?;
        let bytes = match fs::read(path) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("read error {}: {err}", path.display());
                continue;
            }
        };
        files.push(ScannedFile {
            project: project.name.clone(),
            rel_path,
            abs_path: path.to_path_buf(),
            hash: util::content_hash(&bytes),
            size: metadata.len(),
            language: language.to_string(),
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    let name = entry.file_name();
    if name == OsStr::new(INDEX_DIR_NAME) || name == OsStr::new(".git") {
        return true;
    }
    // Skip other dot-directories outright; dot-files fall through to the
    // language filter.
    if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
        if let Some(text) = name.to_str() {
            if text.starts_with('.') {
                return true;
            }
        }
    }
    false
}

fn detect_language(path: &Path) -> Option<&'static str> {
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        for spec in LANGUAGE_SPECS {
            if spec.extensions.iter().any(|candidate| *candidate == ext) {
                return Some(spec.name);
            }
        }
        return None;
    }
    sniff_shebang(path)
}

/// First-line sniff for extensionless scripts.
fn sniff_shebang(path: &Path) -> Option<&'static str> {
    let mut head = [0u8; 64];
    let n = {
        use std::io::Read;
        let mut file = fs::File::open(path).ok()?;
        file.read(&mut head).ok()?
    };
    let line = std::str::from_utf8(&head[..n]).ok()?.lines().next()?;
    if !line.starts_with("#!") {
        return None;
    }
    if line.contains("python") {
        Some("python")
    } else if line.contains("node") {
        Some("javascript")
    } else {
        None
    }
}

pub fn language_for_path(path: &Path) -> Option<&'static str> {
    detect_language(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_languages_by_extension() {
        assert_eq!(detect_language(Path::new("a/b.py")), Some("python"));
        assert_eq!(detect_language(Path::new("a/b.tsx")), Some("typescript"));
        assert_eq!(detect_language(Path::new("a/b.vue")), Some("vue"));
        assert_eq!(detect_language(Path::new("a/b.rs")), Some("rust"));
        assert_eq!(detect_language(Path::new("a/b.txt")), None);
    }
}
