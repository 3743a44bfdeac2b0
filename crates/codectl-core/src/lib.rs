use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod frontmatter;
pub mod spec_docs;
pub mod store;
pub mod tasks;
pub mod tools;

pub const DOCS_DIR: &str = "vibe-docs";
pub const SPEC_DIR: &str = "spec";
pub const TASK_DIR: &str = "task";
pub const SPEC_SUFFIX: &str = ".spec.mdx";
pub const TASK_SUFFIX: &str = ".task.mdx";

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("empty path")]
    EmptyPath,
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub fn spec_dir(root: &Path) -> PathBuf {
    root.join(DOCS_DIR).join(SPEC_DIR)
}

pub fn task_dir(root: &Path) -> PathBuf {
    root.join(DOCS_DIR).join(TASK_DIR)
}

/// Repository-relative path with `/` separators, falling back to the input
/// when `path` is not under `root`.
pub fn rel_slash(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|part| part.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

/// True when a repository-relative path lies under the documentation tree.
pub fn is_docs_path(rel: &str) -> bool {
    let trimmed = rel.trim_start_matches("./");
    trimmed == DOCS_DIR || trimmed.starts_with(&format!("{DOCS_DIR}/"))
}

/// Recursively collects files under `dir` whose lowercase name ends with
/// `suffix`. A missing directory yields an empty list.
pub(crate) fn collect_files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, CoreError> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|err| CoreError::io(&current, err))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.ends_with(suffix) {
                out.push(path);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rel_slash_strips_root_and_uses_forward_slashes() {
        let root = Path::new("/repo");
        let path = root.join("vibe-docs").join("spec").join("a.spec.mdx");
        assert_eq!(rel_slash(root, &path), "vibe-docs/spec/a.spec.mdx");
        assert_eq!(rel_slash(root, Path::new("/elsewhere/x")), "/elsewhere/x");
    }

    #[test]
    fn docs_path_detection() {
        assert!(is_docs_path("vibe-docs/spec/a.spec.mdx"));
        assert!(is_docs_path("./vibe-docs/task/t.task.mdx"));
        assert!(!is_docs_path("vibe-docs-old/readme.md"));
        assert!(!is_docs_path("src/main.rs"));
    }

    #[test]
    fn collects_nested_files_by_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join("a.task.mdx"), "").expect("write");
        std::fs::write(nested.join("B.TASK.MDX"), "").expect("write");
        std::fs::write(nested.join("notes.md"), "").expect("write");

        let mut files = collect_files_with_suffix(dir.path(), TASK_SUFFIX).expect("collect");
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|path| path
            .to_string_lossy()
            .to_lowercase()
            .ends_with(TASK_SUFFIX)));
        assert!(collect_files_with_suffix(&dir.path().join("missing"), TASK_SUFFIX)
            .expect("missing dir")
            .is_empty());
    }
}
