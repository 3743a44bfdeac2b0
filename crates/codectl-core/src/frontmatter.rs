//! Leading `---` metadata blocks on spec and task documents.
//!
//! The syntax is deliberately small: `key: value` lines, optional quotes
//! around values, and lists written either inline (`[a, "b"]`) or as `- item`
//! lines following a key with an empty value.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const DELIMITER: &str = "---";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    fields: BTreeMap<String, String>,
    lists: BTreeMap<String, Vec<String>>,
}

impl FrontMatter {
    pub fn get(&self, key: &str) -> &str {
        self.fields
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// List value for `key`. A plain scalar is treated as a one-item list.
    pub fn list(&self, key: &str) -> Vec<String> {
        let key = key.to_ascii_lowercase();
        if let Some(items) = self.lists.get(&key) {
            return items.clone();
        }
        match self.fields.get(&key) {
            Some(value) if !value.is_empty() => vec![value.clone()],
            _ => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.lists.is_empty()
    }
}

/// Splits a document into its metadata block and the remaining body.
/// Returns `None` when the document does not open with a closed block.
pub fn split(text: &str) -> Option<(&str, &str)> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if trim_eol(first) != DELIMITER {
        return None;
    }
    let block_start = first.len();
    let mut offset = block_start;
    for line in lines {
        if trim_eol(line) == DELIMITER {
            let block = &text[block_start..offset];
            let body = &text[offset + line.len()..];
            return Some((block, body));
        }
        offset += line.len();
    }
    None
}

/// Document body without its leading metadata block.
pub fn strip(text: &str) -> &str {
    match split(text) {
        Some((_, body)) => body,
        None => text,
    }
}

pub fn parse(text: &str) -> FrontMatter {
    match split(text) {
        Some((block, _)) => parse_block(block),
        None => FrontMatter::default(),
    }
}

pub fn parse_block(block: &str) -> FrontMatter {
    let mut fm = FrontMatter::default();
    let mut list_key: Option<String> = None;

    for raw in block.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(item) = line.strip_prefix('-') {
            if let Some(key) = &list_key {
                let item = unquote(item.trim());
                if !item.is_empty() {
                    fm.lists.entry(key.clone()).or_default().push(item.to_string());
                }
                continue;
            }
        }
        let Some(caps) = key_regex().captures(line) else {
            list_key = None;
            continue;
        };
        let key = caps[1].trim().to_ascii_lowercase();
        let value = caps[2].trim();

        if value.is_empty() {
            fm.fields.insert(key.clone(), String::new());
            list_key = Some(key);
            continue;
        }
        list_key = None;

        if let Some(inner) = value.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let items: Vec<String> = inner
                .split(',')
                .map(|item| unquote(item.trim()).to_string())
                .filter(|item| !item.is_empty())
                .collect();
            fm.lists.insert(key.clone(), items);
            fm.fields.insert(key, value.to_string());
            continue;
        }

        fm.fields.insert(key, unquote(value).to_string());
    }

    fm
}

fn key_regex() -> &'static Regex {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    KEY_RE.get_or_init(|| Regex::new(r"^([A-Za-z0-9_-]+)\s*:\s*(.*)$").expect("valid key regex"))
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "---\r\ntitle: \"Login flow\"\nstatus: in-progress\nrelated: [vibe-docs/spec/a.spec.mdx, 'vibe-docs/spec/b.spec.mdx']\ndocs:\n  - one.md\n  - \"two.md\"\n# comment\n---\n# Body\n\ntext\n";

    #[test]
    fn splits_block_and_body() {
        let (block, body) = split(DOC).expect("front matter");
        assert!(block.starts_with("title:"));
        assert_eq!(body, "# Body\n\ntext\n");
        assert_eq!(strip(DOC), body);
    }

    #[test]
    fn unterminated_block_is_not_front_matter() {
        let text = "---\ntitle: x\nno closing\n";
        assert!(split(text).is_none());
        assert_eq!(strip(text), text);
        assert!(parse(text).is_empty());
    }

    #[test]
    fn parses_scalars_and_both_list_styles() {
        let fm = parse(DOC);
        assert_eq!(fm.get("title"), "Login flow");
        assert_eq!(fm.get("STATUS"), "in-progress");
        assert_eq!(fm.get("owner"), "");
        assert_eq!(
            fm.list("related"),
            vec![
                "vibe-docs/spec/a.spec.mdx".to_string(),
                "vibe-docs/spec/b.spec.mdx".to_string()
            ]
        );
        assert_eq!(fm.list("docs"), vec!["one.md".to_string(), "two.md".to_string()]);
        assert_eq!(fm.list("status"), vec!["in-progress".to_string()]);
        assert!(fm.list("missing").is_empty());
    }

    #[test]
    fn dash_lines_without_open_list_are_ignored() {
        let fm = parse_block("title: a\n- stray\nowner: bob\n");
        assert_eq!(fm.get("title"), "a");
        assert_eq!(fm.get("owner"), "bob");
        assert!(fm.list("title").len() == 1);
    }
}
