use crate::model::{CallSite, Confidence, Edge, EdgeKind, RouteDecl};
use serde::Serialize;

/// One route with every call site joined to it.
#[derive(Debug, Clone, Serialize)]
pub struct ApiEntry {
    pub route: RouteDecl,
    pub callers: Vec<ApiCaller>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiCaller {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<crate::model::SymbolId>,
    pub file: String,
    pub line: u32,
    pub url: String,
    pub confidence: Confidence,
}

/// Join route declarations and call sites on `(method, normalized_path)`.
///
/// Confidence: `exact` when method and literal path agree with no
/// normalization at all, `likely` after case and trailing-slash
/// normalization, `heuristic` only once placeholder collapse was needed.
pub fn join(routes: &[RouteDecl], calls: &[CallSite]) -> (Vec<ApiEntry>, Vec<Edge>) {
    let mut entries: Vec<ApiEntry> = routes
        .iter()
        .map(|route| ApiEntry {
            route: route.clone(),
            callers: Vec::new(),
        })
        .collect();
    let mut edges = Vec::new();

    for call in calls {
        for entry in &mut entries {
            let Some(confidence) = match_confidence(&entry.route, call) else {
                continue;
            };
            entry.callers.push(ApiCaller {
                symbol: call.containing_symbol.clone(),
                file: call.file.clone(),
                line: call.line,
                url: call.url_literal.clone(),
                confidence,
            });
            if let Some(from) = &call.containing_symbol {
                edges.push(Edge {
                    from: from.clone(),
                    to: entry.route.handler.clone(),
                    kind: EdgeKind::RoutesTo,
                    confidence,
                });
            }
        }
    }

    for entry in &mut entries {
        entry
            .callers
            .sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
    }
    edges.sort();
    edges.dedup();
    (entries, edges)
}

fn match_confidence(route: &RouteDecl, call: &CallSite) -> Option<Confidence> {
    if !method_matches(&route.method, &call.method) {
        return None;
    }
    if route.method == call.method && route.path_pattern == call.url_literal {
        return Some(Confidence::Exact);
    }
    let route_trimmed = strip_trailing_slash(&route.path_pattern);
    let call_trimmed = strip_trailing_slash(strip_query(&call.url_literal));
    if route_trimmed == call_trimmed {
        return Some(Confidence::Likely);
    }
    let route_collapsed = collapse_placeholders(route_trimmed);
    let call_collapsed = collapse_placeholders(call_trimmed);
    if wildcard_segments_match(&route_collapsed, &call_collapsed) {
        return Some(Confidence::Heuristic);
    }
    None
}

/// Route methods may be a comma list (`GET,POST`) or `ANY`.
fn method_matches(route_method: &str, call_method: &str) -> bool {
    let call = call_method.trim().to_ascii_lowercase();
    route_method
        .split(',')
        .map(|m| m.trim().to_ascii_lowercase())
        .any(|m| m == call || m == "any" || call == "any")
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

fn strip_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Collapse `{param}`, `:param` and `${expr}` segments to the `*` sentinel.
pub fn collapse_placeholders(path: &str) -> String {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        if segment.is_empty() {
            segments.push(String::new());
            continue;
        }
        let is_placeholder = (segment.starts_with('{') && segment.ends_with('}'))
            || segment.starts_with(':')
            || segment.contains("${");
        if is_placeholder {
            segments.push("*".to_string());
        } else {
            segments.push(segment.to_string());
        }
    }
    segments.join("/")
}

/// Segment-wise comparison where `*` on either side matches any single
/// segment on the other.
fn wildcard_segments_match(a: &str, b: &str) -> bool {
    let left: Vec<&str> = a.split('/').collect();
    let right: Vec<&str> = b.split('/').collect();
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right.iter())
        .all(|(l, r)| *l == "*" || *r == "*" || l == r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Framework, SymbolId, SymbolKind};

    fn route(method: &str, path: &str) -> RouteDecl {
        RouteDecl {
            method: method.to_string(),
            path_pattern: path.to_string(),
            handler: SymbolId::new(
                "backend",
                "routes.py",
                SymbolKind::Function,
                "handler",
            ),
            framework: Framework::Fastapi,
        }
    }

    fn call(method: &str, url: &str) -> CallSite {
        CallSite {
            method: method.to_string(),
            url_literal: url.to_string(),
            file: "src/api.ts".to_string(),
            line: 7,
            containing_symbol: Some(SymbolId::new(
                "frontend",
                "src/api.ts",
                SymbolKind::Function,
                "loadUser",
            )),
        }
    }

    #[test]
    fn literal_match_is_exact() {
        let (entries, edges) = join(&[route("GET", "/api/users")], &[call("GET", "/api/users")]);
        assert_eq!(entries[0].callers.len(), 1);
        assert_eq!(entries[0].callers[0].confidence, Confidence::Exact);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::RoutesTo);
    }

    #[test]
    fn trailing_slash_match_is_likely() {
        let (entries, _) = join(&[route("GET", "/api/users/")], &[call("GET", "/api/users")]);
        assert_eq!(entries[0].callers[0].confidence, Confidence::Likely);
    }

    #[test]
    fn placeholder_collapse_is_heuristic() {
        let (entries, _) = join(
            &[route("GET", "/api/users/{id}")],
            &[call("GET", "/api/users/42")],
        );
        assert_eq!(entries[0].callers[0].confidence, Confidence::Heuristic);

        let (entries, _) = join(
            &[route("GET", "/api/users/:id")],
            &[call("GET", "/api/users/${userId}")],
        );
        assert_eq!(entries[0].callers[0].confidence, Confidence::Heuristic);
    }

    #[test]
    fn method_mismatch_never_joins() {
        let (entries, edges) = join(&[route("POST", "/api/users")], &[call("GET", "/api/users")]);
        assert!(entries[0].callers.is_empty());
        assert!(edges.is_empty());
    }

    #[test]
    fn flask_method_lists_and_any_match() {
        let (entries, _) = join(
            &[route("GET,POST", "/api/users")],
            &[call("POST", "/api/users")],
        );
        assert_eq!(entries[0].callers.len(), 1);
        let (entries, _) = join(&[route("ANY", "/api/users")], &[call("DELETE", "/api/users")]);
        assert_eq!(entries[0].callers.len(), 1);
    }

    #[test]
    fn query_strings_are_ignored() {
        let (entries, _) = join(
            &[route("GET", "/api/users")],
            &[call("GET", "/api/users?page=2")],
        );
        assert_eq!(entries[0].callers[0].confidence, Confidence::Likely);
    }

    #[test]
    fn segment_count_must_agree() {
        let (entries, _) = join(
            &[route("GET", "/api/users/{id}")],
            &[call("GET", "/api/users")],
        );
        assert!(entries[0].callers.is_empty());
    }
}
