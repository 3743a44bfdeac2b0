//! Directory tree model for the explorer pane.
//!
//! Nodes live in an arena (`Vec<TreeNode>`) and refer to their parent by
//! index. The tree is rebuilt wholesale on every reload; the expand set is
//! keyed by path so it survives rebuilds.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const ROOT: usize = 0;

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRow {
    pub node: usize,
    pub depth: usize,
}

#[derive(Debug)]
pub struct FileTree {
    root: PathBuf,
    nodes: Vec<TreeNode>,
    expanded: HashSet<PathBuf>,
    rows: Vec<VisibleRow>,
    cursor: usize,
}

impl FileTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut expanded = HashSet::new();
        expanded.insert(root.clone());
        let mut tree = Self {
            root,
            nodes: Vec::new(),
            expanded,
            rows: Vec::new(),
            cursor: 0,
        };
        tree.reload();
        tree
    }

    /// Re-reads the whole subtree. The cursor follows the previously selected
    /// path when it still exists, otherwise it is clamped.
    pub fn reload(&mut self) {
        let previous = self.selected_path().map(Path::to_path_buf);
        self.nodes = build_nodes(&self.root);
        let known: HashSet<&Path> = self.nodes.iter().map(|node| node.path.as_path()).collect();
        let root = self.root.clone();
        self.expanded
            .retain(|path| *path == root || known.contains(path.as_path()));
        self.project();
        match previous.and_then(|path| self.row_of(&path)) {
            Some(row) => self.cursor = row,
            None => self.clamp_cursor(),
        }
    }

    pub fn rows(&self) -> &[VisibleRow] {
        &self.rows
    }

    pub fn node(&self, idx: usize) -> &TreeNode {
        &self.nodes[idx]
    }

    pub fn row_node(&self, row: usize) -> Option<&TreeNode> {
        self.rows.get(row).map(|visible| &self.nodes[visible.node])
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, row: usize) {
        self.cursor = row;
        self.clamp_cursor();
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let next = (self.cursor as isize + delta).clamp(0, self.rows.len() as isize - 1);
        self.cursor = next as usize;
    }

    pub fn selected(&self) -> Option<&TreeNode> {
        self.row_node(self.cursor)
    }

    pub fn selected_path(&self) -> Option<&Path> {
        self.selected().map(|node| node.path.as_path())
    }

    pub fn is_expanded(&self, path: &Path) -> bool {
        self.expanded.contains(path)
    }

    /// Flips expand-set membership for a directory. Returns false for files
    /// and unknown paths.
    pub fn toggle_expand(&mut self, path: &Path) -> bool {
        let Some(idx) = self.index_of(path) else {
            return false;
        };
        if !self.nodes[idx].is_dir {
            return false;
        }
        let selected = self.selected_path().map(Path::to_path_buf);
        if !self.expanded.remove(path) {
            self.expanded.insert(path.to_path_buf());
        }
        self.project();
        match selected.and_then(|path| self.row_of(&path)) {
            Some(row) => self.cursor = row,
            None => {
                self.cursor = self.row_of(path).unwrap_or(0);
                self.clamp_cursor();
            }
        }
        true
    }

    /// Collapses the selected directory, or moves to its parent row when it
    /// is a file or already collapsed.
    pub fn collapse_or_parent(&mut self) {
        let Some(node) = self.selected() else {
            return;
        };
        if node.is_dir && self.is_expanded(&node.path) && node.parent.is_some() {
            let path = node.path.clone();
            self.toggle_expand(&path);
            return;
        }
        if let Some(parent) = node.parent {
            let parent_path = self.nodes[parent].path.clone();
            if let Some(row) = self.row_of(&parent_path) {
                self.cursor = row;
            }
        }
    }

    /// Expands every ancestor of `path` and moves the cursor onto it.
    pub fn select_path(&mut self, path: &Path) -> bool {
        let Some(idx) = self.index_of(path) else {
            return false;
        };
        let mut parent = self.nodes[idx].parent;
        while let Some(p) = parent {
            self.expanded.insert(self.nodes[p].path.clone());
            parent = self.nodes[p].parent;
        }
        self.project();
        match self.row_of(path) {
            Some(row) => {
                self.cursor = row;
                true
            }
            None => false,
        }
    }

    /// Directories whose contents are currently on screen: the root plus
    /// every expanded directory that is itself visible.
    pub fn expanded_visible_dirs(&self) -> Vec<PathBuf> {
        self.rows
            .iter()
            .map(|row| &self.nodes[row.node])
            .filter(|node| node.is_dir && self.expanded.contains(&node.path))
            .map(|node| node.path.clone())
            .collect()
    }

    /// Root, its immediate sub-directories and the expanded visible ones.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.root.clone()];
        if let Some(root) = self.nodes.first() {
            for &child in &root.children {
                if self.nodes[child].is_dir {
                    dirs.push(self.nodes[child].path.clone());
                }
            }
        }
        for dir in self.expanded_visible_dirs() {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }

    pub fn row_of(&self, path: &Path) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| self.nodes[row.node].path == path)
    }

    fn index_of(&self, path: &Path) -> Option<usize> {
        self.nodes.iter().position(|node| node.path == path)
    }

    fn project(&mut self) {
        self.rows.clear();
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![VisibleRow { node: ROOT, depth: 0 }];
        while let Some(row) = stack.pop() {
            self.rows.push(row);
            let node = &self.nodes[row.node];
            if node.is_dir && self.expanded.contains(&node.path) {
                for &child in node.children.iter().rev() {
                    stack.push(VisibleRow {
                        node: child,
                        depth: row.depth + 1,
                    });
                }
            }
        }
    }

    fn clamp_cursor(&mut self) {
        if self.rows.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.rows.len() {
            self.cursor = self.rows.len() - 1;
        }
    }
}

fn build_nodes(root: &Path) -> Vec<TreeNode> {
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string());
    let mut nodes = vec![TreeNode {
        name,
        path: root.to_path_buf(),
        is_dir: true,
        parent: None,
        children: Vec::new(),
    }];
    let mut pending = vec![ROOT];
    while let Some(idx) = pending.pop() {
        let entries = match read_children(&nodes[idx].path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %nodes[idx].path.display(), error = %err, "tree_read_dir_failed");
                continue;
            }
        };
        for (name, path, is_dir) in entries {
            let child = nodes.len();
            nodes.push(TreeNode {
                name,
                path,
                is_dir,
                parent: Some(idx),
                children: Vec::new(),
            });
            nodes[idx].children.push(child);
            if is_dir {
                pending.push(child);
            }
        }
    }
    nodes
}

fn read_children(dir: &Path) -> std::io::Result<Vec<(String, PathBuf, bool)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
        entries.push((name, entry.path(), is_dir));
    }
    entries.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
            .then_with(|| a.0.cmp(&b.0))
    });
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/nested")).expect("mkdir");
        std::fs::create_dir_all(root.join("Docs")).expect("mkdir");
        std::fs::create_dir_all(root.join(".git")).expect("mkdir");
        std::fs::write(root.join("b.txt"), "b").expect("write");
        std::fs::write(root.join("A.md"), "a").expect("write");
        std::fs::write(root.join("src/main.rs"), "").expect("write");
        std::fs::write(root.join("src/nested/deep.rs"), "").expect("write");
        dir
    }

    fn names(tree: &FileTree) -> Vec<String> {
        tree.rows()
            .iter()
            .map(|row| tree.node(row.node).name.clone())
            .collect()
    }

    fn assert_consistent(tree: &FileTree) {
        let mut expected = 0;
        let mut stack = vec![ROOT];
        while let Some(idx) = stack.pop() {
            expected += 1;
            let node = tree.node(idx);
            if node.is_dir && tree.is_expanded(&node.path) {
                stack.extend(node.children.iter().copied());
            }
        }
        assert_eq!(tree.rows().len(), expected);
        for row in tree.rows().iter().skip(1) {
            let parent = tree.node(row.node).parent.expect("parent");
            assert!(tree.is_expanded(&tree.node(parent).path));
            assert!(tree.rows().iter().any(|r| r.node == parent));
        }
        assert!(tree.cursor() < tree.rows().len());
    }

    #[test]
    fn sorts_directories_first_and_skips_hidden() {
        let dir = fixture();
        let tree = FileTree::new(dir.path());
        let listed = names(&tree);
        assert_eq!(&listed[1..], &["Docs", "src", "A.md", "b.txt"]);
        assert!(!listed.iter().any(|name| name == ".git"));
    }

    #[test]
    fn visible_rows_track_toggles() {
        let dir = fixture();
        let mut tree = FileTree::new(dir.path());
        let src = dir.path().join("src");
        let nested = src.join("nested");
        assert_consistent(&tree);

        assert!(tree.toggle_expand(&src));
        assert_consistent(&tree);
        assert!(names(&tree).contains(&"main.rs".to_string()));

        assert!(tree.toggle_expand(&nested));
        assert_consistent(&tree);
        assert!(names(&tree).contains(&"deep.rs".to_string()));

        assert!(tree.toggle_expand(&src));
        assert_consistent(&tree);
        assert!(!names(&tree).contains(&"deep.rs".to_string()));
        // nested keeps its expand state while hidden
        assert!(tree.is_expanded(&nested));
        assert!(!tree.toggle_expand(&dir.path().join("b.txt")));
    }

    #[test]
    fn reload_preserves_selection_by_path() {
        let dir = fixture();
        let mut tree = FileTree::new(dir.path());
        let target = dir.path().join("b.txt");
        assert!(tree.select_path(&target));
        std::fs::write(dir.path().join("0-first.txt"), "").expect("write");
        tree.reload();
        assert_eq!(tree.selected_path(), Some(target.as_path()));

        std::fs::remove_file(&target).expect("remove");
        tree.set_cursor(usize::MAX);
        tree.reload();
        assert_consistent(&tree);
    }

    #[test]
    fn select_path_expands_ancestors() {
        let dir = fixture();
        let mut tree = FileTree::new(dir.path());
        let deep = dir.path().join("src/nested/deep.rs");
        assert!(tree.select_path(&deep));
        assert_eq!(tree.selected_path(), Some(deep.as_path()));
        assert_eq!(tree.rows()[tree.cursor()].depth, 3);
        let dirs = tree.expanded_visible_dirs();
        assert!(dirs.contains(&dir.path().join("src/nested")));

        tree.collapse_or_parent();
        assert_eq!(tree.selected_path(), Some(dir.path().join("src/nested").as_path()));
        tree.collapse_or_parent();
        assert!(!tree.is_expanded(&dir.path().join("src/nested")));
        assert_consistent(&tree);
    }

    #[test]
    fn watch_dirs_cover_root_children_and_expanded() {
        let dir = fixture();
        let mut tree = FileTree::new(dir.path());
        tree.toggle_expand(&dir.path().join("src"));
        tree.toggle_expand(&dir.path().join("src/nested"));
        let dirs = tree.watch_dirs();
        assert_eq!(dirs[0], dir.path());
        assert!(dirs.contains(&dir.path().join("Docs")));
        assert!(dirs.contains(&dir.path().join("src/nested")));
    }
}
