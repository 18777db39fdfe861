use crate::error::{EngineError, Result};
use std::path::{Component, Path};

/// Read a file as UTF-8. Non-decodable bytes are an input error the caller
/// records on the file rather than propagating.
pub fn read_to_string(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes)
        .map_err(|_| EngineError::Input(format!("not utf-8: {}", path.display())))
}

pub fn normalize_rel_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        EngineError::Input(format!(
            "{} is outside root {}",
            path.display(),
            root.display()
        ))
    })?;
    Ok(normalize_path(rel))
}

pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir => {}
            _ => {}
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// 64-bit content hash as 16 hex chars, computed over LF-normalized bytes so
/// a checkout with CRLF endings hashes the same as the committed file.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    if bytes.contains(&b'\r') {
        let mut normalized = Vec::with_capacity(bytes.len());
        let mut iter = bytes.iter().peekable();
        while let Some(&b) = iter.next() {
            if b == b'\r' && iter.peek() == Some(&&b'\n') {
                continue;
            }
            normalized.push(b);
        }
        hasher.update(&normalized);
    } else {
        hasher.update(bytes);
    }
    let hex = hasher.finalize().to_hex();
    hex[..16].to_string()
}

pub fn body_hash(text: &str) -> String {
    content_hash(text.as_bytes())
}

/// Slice 1-indexed inclusive line range out of a source string.
pub fn slice_lines(content: &str, start_line: u32, end_line: u32) -> String {
    if content.is_empty() || end_line < start_line {
        return String::new();
    }
    let lines: Vec<&str> = content.lines().collect();
    let start = (start_line.max(1) - 1) as usize;
    if start >= lines.len() {
        return String::new();
    }
    let end = (end_line as usize).min(lines.len());
    lines[start..end].join("\n")
}

pub fn file_stem(rel_path: &str) -> String {
    Path::new(rel_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(rel_path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_crlf_insensitive() {
        assert_eq!(content_hash(b"a\nb\n"), content_hash(b"a\r\nb\r\n"));
        assert_ne!(content_hash(b"a\nb\n"), content_hash(b"a\nc\n"));
        assert_eq!(content_hash(b"x").len(), 16);
    }

    #[test]
    fn slice_lines_clamps_ranges() {
        let text = "one\ntwo\nthree";
        assert_eq!(slice_lines(text, 1, 2), "one\ntwo");
        assert_eq!(slice_lines(text, 2, 99), "two\nthree");
        assert_eq!(slice_lines(text, 9, 10), "");
    }
}
