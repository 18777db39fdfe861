use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A project registered in the workspace. Symbol namespaces of distinct
/// projects never collide because every SymbolId carries the project name.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    pub language_hints: Vec<String>,
}

impl Project {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            language_hints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Interface,
    Trait,
    Component,
    Composable,
    Type,
    Enum,
    Constant,
    Module,
    Route,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Component => "component",
            SymbolKind::Composable => "composable",
            SymbolKind::Type => "type",
            SymbolKind::Enum => "enum",
            SymbolKind::Constant => "constant",
            SymbolKind::Module => "module",
            SymbolKind::Route => "route",
        }
    }

    /// Whether an edge to a symbol of this kind represents an invocation.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Composable
        )
    }
}

impl FromStr for SymbolKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        let kind = match s {
            "function" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "class" => SymbolKind::Class,
            "struct" => SymbolKind::Struct,
            "interface" => SymbolKind::Interface,
            "trait" => SymbolKind::Trait,
            "component" => SymbolKind::Component,
            "composable" => SymbolKind::Composable,
            "type" => SymbolKind::Type,
            "enum" => SymbolKind::Enum,
            "constant" => SymbolKind::Constant,
            "module" => SymbolKind::Module,
            "route" => SymbolKind::Route,
            _ => return Err(()),
        };
        Ok(kind)
    }
}

/// Stable primary key of the graph: `project:path:kind:name`.
///
/// IDs survive re-indexing as long as the four components are stable. The
/// `name` of a method includes its owner (`Owner.method`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId {
    pub project: String,
    pub path: String,
    pub kind: SymbolKind,
    pub name: String,
}

impl SymbolId {
    pub fn new(
        project: impl Into<String>,
        path: impl Into<String>,
        kind: SymbolKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            path: path.into(),
            kind,
            name: name.into(),
        }
    }

    /// Short form without the project prefix: `path:kind:name`.
    pub fn short(&self) -> String {
        format!("{}:{}:{}", self.path, self.kind.as_str(), self.name)
    }

    /// Trailing segment of the name (`Owner.method` -> `method`).
    pub fn leaf_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.project,
            self.path,
            self.kind.as_str(),
            self.name
        )
    }
}

impl FromStr for SymbolId {
    type Err = EngineError;

    fn from_str(raw: &str) -> std::result::Result<Self, EngineError> {
        // name and kind never contain ':', the path may in theory, so parse
        // from both ends: project first, then name and kind from the right.
        let mut tail = raw.rsplitn(3, ':');
        let name = tail.next().unwrap_or_default();
        let kind = tail.next().unwrap_or_default();
        let head = tail.next().unwrap_or_default();
        let mut lead = head.splitn(2, ':');
        let project = lead.next().unwrap_or_default();
        let path = lead.next().unwrap_or_default();
        if project.is_empty() || path.is_empty() || name.is_empty() {
            return Err(EngineError::MalformedSymbolId(raw.to_string()));
        }
        let kind = SymbolKind::from_str(kind)
            .map_err(|_| EngineError::MalformedSymbolId(raw.to_string()))?;
        Ok(SymbolId::new(project, path, kind, name))
    }
}

impl Serialize for SymbolId {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SymbolId {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub end_line: u32,
}

impl Span {
    pub fn new(start_line: u32, end_line: u32) -> Self {
        Self {
            start_line,
            end_line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Exact,
    Likely,
    Heuristic,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Exact => "exact",
            Confidence::Likely => "likely",
            Confidence::Heuristic => "heuristic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Imports,
    Extends,
    References,
    RoutesTo,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Calls => "calls",
            EdgeKind::Imports => "imports",
            EdgeKind::Extends => "extends",
            EdgeKind::References => "references",
            EdgeKind::RoutesTo => "routes_to",
        }
    }
}

/// One extracted symbol. Created during scan, replaced wholesale on file
/// re-parse, destroyed on file deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub id: SymbolId,
    pub kind: SymbolKind,
    pub span: Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
    pub exports: bool,
    /// Unresolved textual references the symbol body emits, in first-seen
    /// order: bare identifiers plus dotted chains of length <= 3, minus the
    /// language's reserved words.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs_out: Vec<String>,
    /// Base class / implemented interface names for class-like symbols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
    pub body_hash: String,
    /// Distinct referencing symbols, recomputed with the reverse index.
    #[serde(default)]
    pub ref_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Names pulled out of the module (`from m import a, b`; `import {a}`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Fastapi,
    Flask,
    Starlette,
    Express,
    Other,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Fastapi => "fastapi",
            Framework::Flask => "flask",
            Framework::Starlette => "starlette",
            Framework::Express => "express",
            Framework::Other => "other",
        }
    }
}

/// An HTTP route declaration on the backend side of the API join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecl {
    pub method: String,
    pub path_pattern: String,
    pub handler: SymbolId,
    pub framework: Framework,
}

/// An HTTP call site on the frontend side of the API join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSite {
    pub method: String,
    pub url_literal: String,
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containing_symbol: Option<SymbolId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub project: String,
    pub language: String,
    pub content_hash: String,
    pub symbols: Vec<SymbolId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defined_routes: Vec<RouteDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbound_calls: Vec<CallSite>,
    #[serde(default)]
    pub parse_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: SymbolId,
    pub to: SymbolId,
    pub kind: EdgeKind,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub root: String,
    pub language_counts: BTreeMap<String, usize>,
}

/// The complete persisted index. Field order matters: serde keeps it, so an
/// unchanged workspace re-serializes to identical bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub projects: Vec<ProjectInfo>,
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    pub symbols: BTreeMap<String, SymbolRecord>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub reverse: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub unresolved: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub apis: Vec<RouteDecl>,
    #[serde(default)]
    pub calls: Vec<CallSite>,
    #[serde(default)]
    pub version: String,
}

impl Index {
    pub fn symbol(&self, id: &SymbolId) -> Option<&SymbolRecord> {
        self.symbols.get(&id.to_string())
    }
}

/// Result of one scan run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub symbols: usize,
    pub edges: usize,
    pub parse_errors: usize,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_round_trips() {
        let id = SymbolId::new("shop", "src/api/users.py", SymbolKind::Function, "get_user");
        let text = id.to_string();
        assert_eq!(text, "shop:src/api/users.py:function:get_user");
        let parsed: SymbolId = text.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn symbol_id_method_owner_is_kept() {
        let id = SymbolId::new("shop", "src/svc.py", SymbolKind::Method, "Payment.charge");
        let parsed: SymbolId = id.to_string().parse().unwrap();
        assert_eq!(parsed.name, "Payment.charge");
        assert_eq!(parsed.leaf_name(), "charge");
    }

    #[test]
    fn symbol_id_rejects_garbage() {
        assert!("no-colons-here".parse::<SymbolId>().is_err());
        assert!("p:path:badkind:name".parse::<SymbolId>().is_err());
        assert!(":a:function:b".parse::<SymbolId>().is_err());
    }

    #[test]
    fn route_symbol_name_with_spaces_round_trips() {
        let id = SymbolId::new(
            "shop",
            "backend/routes.py",
            SymbolKind::Route,
            "GET /api/users/{id}",
        );
        let parsed: SymbolId = id.to_string().parse().unwrap();
        assert_eq!(parsed.name, "GET /api/users/{id}");
    }
}
