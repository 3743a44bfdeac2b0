use crate::{collect_files_with_suffix, frontmatter, rel_slash, spec_dir, CoreError, SPEC_SUFFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecDoc {
    pub path: PathBuf,
    pub rel_path: String,
    pub title: String,
}

/// Lists `*.spec.mdx` documents under `<root>/vibe-docs/spec`, sorted by path.
/// The title comes from front matter, else the first `# ` heading, else the
/// file name.
pub fn list_spec_docs(root: &Path) -> Result<Vec<SpecDoc>, CoreError> {
    let mut files = collect_files_with_suffix(&spec_dir(root), SPEC_SUFFIX)?;
    files.sort();
    let docs = files
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path).unwrap_or_default();
            let title = doc_title(&path, &text);
            SpecDoc {
                rel_path: rel_slash(root, &path),
                path,
                title,
            }
        })
        .collect();
    Ok(docs)
}

pub fn doc_title(path: &Path, text: &str) -> String {
    let fm = frontmatter::parse(text);
    let title = fm.get("title").trim();
    if !title.is_empty() {
        return title.to_string();
    }
    let heading = frontmatter::strip(text)
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
        .filter(|line| !line.is_empty());
    if let Some(heading) = heading {
        return heading.to_string();
    }
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_fall_back_from_front_matter_to_heading_to_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = dir.path().join("vibe-docs/spec");
        std::fs::create_dir_all(&spec).expect("mkdir");
        std::fs::write(spec.join("b.spec.mdx"), "---\ntitle: Billing\n---\n# Ignored\n").expect("write");
        std::fs::write(spec.join("a.spec.mdx"), "intro\n# Auth flow\n").expect("write");
        std::fs::write(spec.join("c.spec.mdx"), "plain").expect("write");
        std::fs::write(spec.join("notes.md"), "# not a spec").expect("write");

        let docs = list_spec_docs(dir.path()).expect("list");
        let titles: Vec<&str> = docs.iter().map(|doc| doc.title.as_str()).collect();
        assert_eq!(titles, vec!["Auth flow", "Billing", "c.spec.mdx"]);
        assert_eq!(docs[0].rel_path, "vibe-docs/spec/a.spec.mdx");
    }
}
