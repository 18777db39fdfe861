use crate::model::SymbolRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_K1: f64 = 1.5;
const DEFAULT_B: f64 = 0.75;

/// Tokenize text for indexing: words split on non-word characters, then on
/// camelCase boundaries and `_ - . / :` separators. Both the original word
/// and its split parts are kept, lowercased; single characters are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in split_words(text) {
        let lower = word.to_lowercase();
        if lower.len() >= 2 {
            tokens.push(lower.clone());
        }
        for part in split_identifier(&word) {
            let part_lower = part.to_lowercase();
            if part_lower.len() >= 2 && part_lower != lower {
                tokens.push(part_lower);
            }
        }
    }
    tokens
}

fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            current.push(ch);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// camelCase / PascalCase / snake_case splitter:
/// `useAuthToken` -> `use`, `Auth`, `Token`; `parse_url` -> `parse`, `url`.
fn split_identifier(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = word.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        if ch == '_' || ch == '-' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() && ch.is_uppercase() {
            let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_numeric();
            let next_lower = chars.get(i + 1).map(|c| c.is_lowercase()).unwrap_or(false);
            if prev_lower || (chars[i - 1].is_uppercase() && next_lower) {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// The term stream of one symbol document: identifier, kind, path
/// components, doc text and decorators.
pub fn document_text(record: &SymbolRecord) -> String {
    let mut text = String::new();
    text.push_str(&record.id.name);
    text.push(' ');
    text.push_str(record.kind.as_str());
    text.push(' ');
    text.push_str(&record.id.path.replace('/', " "));
    if let Some(doc) = &record.doc {
        text.push(' ');
        text.push_str(doc);
    }
    for decorator in &record.decorators {
        text.push(' ');
        text.push_str(decorator);
    }
    text
}

/// Okapi BM25 over symbol documents. IDF is computed over symbols, not
/// files. The on-disk form stores term -> postings and per-document
/// lengths, exactly what scoring needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Index {
    pub k1: f64,
    pub b: f64,
    pub avgdl: f64,
    pub n: usize,
    pub doc_ids: Vec<String>,
    pub doc_lens: Vec<u32>,
    /// term -> [(doc index, term frequency)]
    pub postings: BTreeMap<String, Vec<(u32, u32)>>,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
            avgdl: 0.0,
            n: 0,
            doc_ids: Vec::new(),
            doc_lens: Vec::new(),
            postings: BTreeMap::new(),
        }
    }
}

impl Bm25Index {
    /// Build from `(doc_id, text)` pairs. Input order defines doc indices,
    /// so callers pass documents in sorted order for reproducible output.
    pub fn build<'a>(documents: impl Iterator<Item = (&'a str, String)>) -> Self {
        let mut index = Bm25Index::default();
        let mut total_len = 0u64;
        for (doc_id, text) in documents {
            let tokens = tokenize(&text);
            let doc_index = index.doc_ids.len() as u32;
            index.doc_ids.push(doc_id.to_string());
            index.doc_lens.push(tokens.len() as u32);
            total_len += tokens.len() as u64;

            let mut counts: BTreeMap<String, u32> = BTreeMap::new();
            for token in tokens {
                *counts.entry(token).or_insert(0) += 1;
            }
            for (term, count) in counts {
                index.postings.entry(term).or_default().push((doc_index, count));
            }
        }
        index.n = index.doc_ids.len();
        index.avgdl = if index.n > 0 {
            total_len as f64 / index.n as f64
        } else {
            0.0
        };
        index
    }

    fn idf(&self, term: &str) -> Option<f64> {
        let df = self.postings.get(term)?.len() as f64;
        let n = self.n as f64;
        Some(((n - df + 0.5) / (df + 0.5) + 1.0).ln())
    }

    /// Ranked `(doc_id, score)` for a free-text query, highest first. Ties
    /// break on doc id so results are stable.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f64)> {
        if self.n == 0 {
            return Vec::new();
        }
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut scores: BTreeMap<u32, f64> = BTreeMap::new();
        for term in &query_tokens {
            let Some(idf) = self.idf(term) else {
                continue;
            };
            for (doc_index, tf) in &self.postings[term] {
                let dl = self.doc_lens[*doc_index as usize] as f64;
                let tf = *tf as f64;
                let numerator = tf * (self.k1 + 1.0);
                let denominator = tf + self.k1 * (1.0 - self.b + self.b * dl / self.avgdl);
                *scores.entry(*doc_index).or_insert(0.0) += idf * numerator / denominator;
            }
        }
        let mut ranked: Vec<(String, f64)> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(doc_index, score)| (self.doc_ids[doc_index as usize].clone(), score))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(top_k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_keeps_original_and_split_forms() {
        let tokens = tokenize("useAuthToken");
        assert!(tokens.contains(&"useauthtoken".to_string()));
        assert!(tokens.contains(&"use".to_string()));
        assert!(tokens.contains(&"auth".to_string()));
        assert!(tokens.contains(&"token".to_string()));
    }

    #[test]
    fn tokenize_handles_snake_and_kebab_and_paths() {
        let tokens = tokenize("parse_url src/api-client.ts");
        assert!(tokens.contains(&"parse".to_string()));
        assert!(tokens.contains(&"url".to_string()));
        assert!(tokens.contains(&"api".to_string()));
        assert!(tokens.contains(&"client".to_string()));
        assert!(tokens.contains(&"ts".to_string()));
    }

    #[test]
    fn tokenize_splits_consecutive_capitals() {
        let tokens = tokenize("HTTPServer");
        assert!(tokens.contains(&"http".to_string()));
        assert!(tokens.contains(&"server".to_string()));
    }

    #[test]
    fn search_ranks_matching_documents_first() {
        let docs = vec![
            ("a", "useAuth composable authentication".to_string()),
            ("b", "LoginForm component".to_string()),
            ("c", "parseConfig function config".to_string()),
        ];
        let index = Bm25Index::build(docs.into_iter());
        let results = index.search("auth login", 10);
        assert_eq!(results[0].0, "a");
        assert!(results.iter().any(|(id, _)| id == "b"));
        assert!(!results.iter().any(|(id, _)| id == "c"));
    }

    #[test]
    fn search_on_empty_index_is_empty() {
        let index = Bm25Index::default();
        assert!(index.search("anything", 5).is_empty());
    }

    #[test]
    fn rarer_terms_score_higher() {
        let docs = vec![
            ("a", "wallet wallet wallet common".to_string()),
            ("b", "wallet common".to_string()),
            ("c", "common".to_string()),
        ];
        let index = Bm25Index::build(docs.into_iter());
        let wallet = index.search("wallet", 10);
        assert_eq!(wallet[0].0, "a");
        let common = index.search("common", 10);
        assert_eq!(common.len(), 3);
    }
}
