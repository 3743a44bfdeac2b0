use crate::{collect_files_with_suffix, frontmatter, rel_slash, task_dir, CoreError, TASK_SUFFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Front-matter keys that may carry the related-document list.
pub const RELATED_KEYS: [&str; 4] = ["related", "related_docs", "docs", "specs"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub path: PathBuf,
    /// Repository-relative path with `/` separators.
    pub rel_path: String,
    pub file_name: String,
    pub title: String,
    pub status: String,
    pub owner: String,
    pub priority: String,
    pub due: String,
    pub related: Vec<String>,
}

impl TaskItem {
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.file_name
        } else {
            &self.title
        }
    }

    pub fn is_related_to(&self, rel_doc: &str) -> bool {
        let wanted = normalize_rel(rel_doc);
        self.related.iter().any(|doc| normalize_rel(doc) == wanted)
    }
}

pub fn parse_task_document(root: &Path, path: &Path, text: &str) -> TaskItem {
    let fm = frontmatter::parse(text);
    let mut related = Vec::new();
    for key in RELATED_KEYS {
        for doc in fm.list(key) {
            if !related.contains(&doc) {
                related.push(doc);
            }
        }
    }
    TaskItem {
        path: path.to_path_buf(),
        rel_path: rel_slash(root, path),
        file_name: path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default(),
        title: fm.get("title").to_string(),
        status: fm.get("status").to_string(),
        owner: fm.get("owner").to_string(),
        priority: fm.get("priority").to_string(),
        due: fm.get("due").to_string(),
        related,
    }
}

/// Loads every `*.task.mdx` under `<root>/vibe-docs/task`, newest-named
/// first (reverse path order). Unreadable documents keep their path with
/// empty fields.
pub fn load_tasks(root: &Path) -> Result<Vec<TaskItem>, CoreError> {
    let mut files = collect_files_with_suffix(&task_dir(root), TASK_SUFFIX)?;
    files.sort();
    files.reverse();
    let items = files
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path).unwrap_or_default();
            parse_task_document(root, path, &text)
        })
        .collect();
    Ok(items)
}

fn normalize_rel(path: &str) -> String {
    path.trim().trim_start_matches("./").replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, body).expect("write");
        path
    }

    #[test]
    fn parses_fields_and_merges_related_keys() {
        let root = Path::new("/repo");
        let path = root.join("vibe-docs/task/2024-01-login.task.mdx");
        let item = parse_task_document(
            root,
            &path,
            "---\ntitle: Login\nstatus: todo\nowner: ana\npriority: P1\ndue: 2024-02-01\nrelated: [vibe-docs/spec/login.spec.mdx]\nspecs:\n  - ./vibe-docs/spec/auth.spec.mdx\n---\nbody\n",
        );
        assert_eq!(item.title, "Login");
        assert_eq!(item.status, "todo");
        assert_eq!(item.owner, "ana");
        assert_eq!(item.priority, "P1");
        assert_eq!(item.due, "2024-02-01");
        assert_eq!(item.rel_path, "vibe-docs/task/2024-01-login.task.mdx");
        assert_eq!(item.file_name, "2024-01-login.task.mdx");
        assert!(item.is_related_to("vibe-docs/spec/login.spec.mdx"));
        assert!(item.is_related_to("vibe-docs/spec/auth.spec.mdx"));
        assert!(!item.is_related_to("vibe-docs/spec/other.spec.mdx"));
    }

    #[test]
    fn missing_front_matter_defaults_to_empty_fields() {
        let root = Path::new("/repo");
        let item = parse_task_document(root, &root.join("vibe-docs/task/x.task.mdx"), "no meta");
        assert_eq!(item.title, "");
        assert_eq!(item.display_title(), "x.task.mdx");
        assert!(item.related.is_empty());
    }

    #[test]
    fn load_orders_by_reverse_path_and_ignores_other_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "vibe-docs/task/2024-01-a.task.mdx", "---\ntitle: A\n---\n");
        write(dir.path(), "vibe-docs/task/2024-03-c.task.mdx", "---\ntitle: C\n---\n");
        write(dir.path(), "vibe-docs/task/2024-02-b.task.mdx", "---\ntitle: B\n---\n");
        write(dir.path(), "vibe-docs/task/readme.md", "ignored");

        let tasks = load_tasks(dir.path()).expect("load");
        let titles: Vec<&str> = tasks.iter().map(|task| task.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "B", "A"]);
    }

    #[test]
    fn load_without_task_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_tasks(dir.path()).expect("load").is_empty());
    }
}
