use crate::model::{Confidence, FileRecord, SymbolId, SymbolKind, SymbolRecord};
use std::collections::{BTreeMap, HashMap};

/// Outcome of binding one textual reference.
#[derive(Debug, Clone)]
pub enum Resolution {
    Bound(SymbolId, Confidence),
    /// Multiple same-tier candidates: surfaced, never guessed.
    Ambiguous(Vec<String>),
    None,
}

/// Workspace-wide name resolver. Binding order per reference:
///
/// 1. local symbols of the emitting file (`exact`)
/// 2. names pulled in by imports: directly-imported names bind `exact`,
///    members reached through a module alias bind `likely`
/// 3. workspace-wide fallback for globally-unique names (`heuristic`)
///
/// Ambiguity inside tiers 1-2 is broken deterministically (same project,
/// then exported, then lexicographic id); ambiguity in tier 3 produces no
/// edge and is reported instead.
pub struct NameResolver<'a> {
    files: &'a BTreeMap<String, FileRecord>,
    symbols: &'a BTreeMap<String, SymbolRecord>,
    /// symbol name -> ids (also indexes `Owner.method` under `method`).
    by_name: HashMap<&'a str, Vec<&'a str>>,
    by_leaf: HashMap<&'a str, Vec<&'a str>>,
    /// file key -> ids defined there.
    by_file: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> NameResolver<'a> {
    pub fn new(
        files: &'a BTreeMap<String, FileRecord>,
        symbols: &'a BTreeMap<String, SymbolRecord>,
    ) -> Self {
        let mut by_name: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut by_leaf: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut by_file: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, record) in symbols {
            by_name
                .entry(record.id.name.as_str())
                .or_default()
                .push(id.as_str());
            let leaf = record.id.leaf_name();
            if leaf != record.id.name {
                by_leaf.entry(leaf).or_default().push(id.as_str());
            }
        }
        for (key, file) in files {
            let ids = file
                .symbols
                .iter()
                .filter_map(|id| {
                    // FileRecord symbol lists and the symbol table are built
                    // together; the id string is interned in `symbols`.
                    symbols
                        .get_key_value(&id.to_string())
                        .map(|(k, _)| k.as_str())
                })
                .collect();
            by_file.insert(key.as_str(), ids);
        }
        Self {
            files,
            symbols,
            by_name,
            by_leaf,
            by_file,
        }
    }

    pub fn resolve(&self, file_key: &str, from: &SymbolId, name: &str) -> Resolution {
        let Some(file) = self.files.get(file_key) else {
            return Resolution::None;
        };

        // Tier 1: same file.
        let local = self.match_in_file(file_key, name, Some(from));
        if !local.is_empty() {
            let chosen = self.tie_break(local, from);
            return Resolution::Bound(chosen, Confidence::Exact);
        }

        // Tier 2: through the import map.
        let head = name.split('.').next().unwrap_or(name);
        for import in &file.imports {
            let via_name = import.names.iter().any(|n| n == head);
            let via_alias = import.alias.as_deref() == Some(head);
            if !via_name && !via_alias {
                continue;
            }
            let Some(target_key) = self.resolve_module_file(file, &import.module) else {
                continue;
            };
            if name == head {
                // `from m import foo` / `import {foo}` and a bare use of foo.
                let candidates = self.match_in_file(&target_key, head, None);
                if !candidates.is_empty() {
                    let chosen = self.tie_break(candidates, from);
                    return Resolution::Bound(chosen, Confidence::Exact);
                }
            } else {
                // `import m` / alias, then `m.member` (depth <= 3).
                let member = name.split('.').nth(1).unwrap_or_default();
                if member.is_empty() {
                    continue;
                }
                let candidates = self.match_in_file(&target_key, member, None);
                if !candidates.is_empty() {
                    let chosen = self.tie_break(candidates, from);
                    return Resolution::Bound(chosen, Confidence::Likely);
                }
            }
        }

        // Tier 3: globally unique name.
        let mut global: Vec<&str> = self
            .by_name
            .get(name)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        if global.is_empty() && !name.contains('.') {
            global = self
                .by_leaf
                .get(name)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default();
        }
        global.retain(|id| {
            self.symbols
                .get(*id)
                .map(|record| record.id != *from && record.kind != SymbolKind::Route)
                .unwrap_or(false)
        });
        match global.len() {
            0 => Resolution::None,
            1 => {
                let record = &self.symbols[global[0]];
                Resolution::Bound(record.id.clone(), Confidence::Heuristic)
            }
            _ => {
                let mut candidates: Vec<String> =
                    global.into_iter().map(|id| id.to_string()).collect();
                candidates.sort();
                Resolution::Ambiguous(candidates)
            }
        }
    }

    fn match_in_file(&self, file_key: &str, name: &str, exclude: Option<&SymbolId>) -> Vec<&str> {
        let Some(ids) = self.by_file.get(file_key) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for id in ids {
            let Some(record) = self.symbols.get(*id) else {
                continue;
            };
            if record.kind == SymbolKind::Route {
                continue;
            }
            if let Some(exclude) = exclude {
                if record.id == *exclude {
                    continue;
                }
            }
            if record.id.name == name || record.id.leaf_name() == name {
                out.push(*id);
            }
        }
        out
    }

    fn tie_break(&self, mut candidates: Vec<&str>, from: &SymbolId) -> SymbolId {
        candidates.sort_by(|a, b| {
            let ra = &self.symbols[*a];
            let rb = &self.symbols[*b];
            let project_a = ra.id.project == from.project;
            let project_b = rb.id.project == from.project;
            project_b
                .cmp(&project_a)
                .then_with(|| rb.exports.cmp(&ra.exports))
                .then_with(|| a.cmp(b))
        });
        self.symbols[candidates[0]].id.clone()
    }

    /// Resolve an import module string to the file that defines it, using
    /// suffix matching against the workspace file table. Returns the files
    /// map key. External packages resolve to nothing.
    pub fn resolve_module_file(&self, from: &FileRecord, module: &str) -> Option<String> {
        let candidates = match from.language.as_str() {
            "python" => python_module_candidates(&from.path, module),
            "javascript" | "typescript" | "vue" => script_module_candidates(&from.path, module),
            "rust" => rust_module_candidates(module),
            "go" => go_module_candidates(module),
            "java" => java_module_candidates(module),
            _ => Vec::new(),
        };
        for candidate in candidates {
            let mut matches: Vec<&String> = self
                .files
                .iter()
                .filter(|(_, record)| {
                    record.project == from.project && path_suffix_matches(&record.path, &candidate)
                })
                .map(|(key, _)| key)
                .collect();
            matches.sort();
            match matches.len() {
                0 => continue,
                _ => return Some(matches[0].clone()),
            }
        }
        None
    }
}

fn path_suffix_matches(path: &str, suffix: &str) -> bool {
    if path == suffix {
        return true;
    }
    path.ends_with(suffix)
        && path.as_bytes().get(path.len() - suffix.len() - 1) == Some(&b'/')
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn python_module_candidates(from_path: &str, module: &str) -> Vec<String> {
    let mut out = Vec::new();
    let dots = module.chars().take_while(|c| *c == '.').count();
    let rest = &module[dots..];
    if dots > 0 {
        // Relative import: one dot is the current package, each extra dot
        // walks one directory up.
        let mut base = parent_dir(from_path).to_string();
        for _ in 1..dots {
            base = parent_dir(&base).to_string();
        }
        let rel = rest.replace('.', "/");
        let joined = if rel.is_empty() {
            base.clone()
        } else if base.is_empty() {
            rel.clone()
        } else {
            format!("{base}/{rel}")
        };
        if !joined.is_empty() {
            out.push(format!("{joined}.py"));
            out.push(format!("{joined}/__init__.py"));
        }
        return out;
    }
    let rel = module.replace('.', "/");
    out.push(format!("{rel}.py"));
    out.push(format!("{rel}/__init__.py"));
    out
}

fn script_module_candidates(from_path: &str, module: &str) -> Vec<String> {
    const EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".vue", ".mjs"];
    let base = if let Some(rest) = module.strip_prefix("@/") {
        format!("src/{rest}")
    } else if module.starts_with("./") || module.starts_with("../") {
        join_relative(parent_dir(from_path), module)
    } else {
        // Bare specifiers are external packages.
        return Vec::new();
    };
    let mut out = Vec::new();
    let already_has_ext = EXTENSIONS.iter().any(|ext| base.ends_with(ext));
    if already_has_ext {
        out.push(base);
        return out;
    }
    for ext in EXTENSIONS {
        out.push(format!("{base}{ext}"));
    }
    for ext in EXTENSIONS {
        out.push(format!("{base}/index{ext}"));
    }
    out
}

fn join_relative(base_dir: &str, module: &str) -> String {
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in module.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn rust_module_candidates(module: &str) -> Vec<String> {
    let trimmed: Vec<&str> = module
        .split("::")
        .filter(|seg| !matches!(*seg, "crate" | "self" | "super" | ""))
        .collect();
    if trimmed.is_empty() {
        return Vec::new();
    }
    // The last segment may be an item, not a module: try both the full
    // path and the path without it.
    let full = trimmed.join("/");
    let mut out = vec![format!("{full}.rs"), format!("{full}/mod.rs")];
    if trimmed.len() > 1 {
        let parent = trimmed[..trimmed.len() - 1].join("/");
        out.push(format!("{parent}.rs"));
        out.push(format!("{parent}/mod.rs"));
    }
    out
}

fn go_module_candidates(module: &str) -> Vec<String> {
    let segment = module.rsplit('/').next().unwrap_or(module);
    if segment.is_empty() {
        return Vec::new();
    }
    // Go imports name directories; any file of the package works as the
    // edge target, so probe the conventional <pkg>/<pkg>.go layout.
    vec![format!("{segment}/{segment}.go"), format!("{segment}.go")]
}

fn java_module_candidates(module: &str) -> Vec<String> {
    if module.ends_with(".*") {
        return Vec::new();
    }
    vec![format!("{}.java", module.replace('.', "/"))]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_relative_candidates() {
        let candidates = python_module_candidates("pkg/sub/a.py", ".utils");
        assert!(candidates.contains(&"pkg/sub/utils.py".to_string()));
        let up = python_module_candidates("pkg/sub/a.py", "..core");
        assert!(up.contains(&"pkg/core.py".to_string()));
    }

    #[test]
    fn script_alias_candidates() {
        let candidates = script_module_candidates("src/pages/TopUp.vue", "@/composables/useWallet");
        assert!(candidates.contains(&"src/composables/useWallet.ts".to_string()));
        let relative = script_module_candidates("src/pages/TopUp.vue", "../api");
        assert!(relative.contains(&"src/api.ts".to_string()));
        assert!(script_module_candidates("src/a.ts", "vue").is_empty());
    }

    #[test]
    fn suffix_matching_respects_boundaries() {
        assert!(path_suffix_matches("src/pkg/mod.py", "pkg/mod.py"));
        assert!(!path_suffix_matches("src/mypkg/mod.py", "pkg/mod.py"));
        assert!(path_suffix_matches("a.py", "a.py"));
    }
}
