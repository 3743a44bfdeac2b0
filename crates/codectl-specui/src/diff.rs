//! Git change listing and per-file diff rendering. Everything shells out to
//! `git` (and optionally `delta`) and parses plain output.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

pub const NO_DIFF_HINT: &str = "(no diff) file is unchanged in this mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// HEAD against the working tree.
    #[default]
    All,
    Staged,
    Worktree,
}

impl DiffMode {
    pub fn label(self) -> &'static str {
        match self {
            DiffMode::All => "all",
            DiffMode::Staged => "staged",
            DiffMode::Worktree => "worktree",
        }
    }

    pub fn next(self) -> Self {
        match self {
            DiffMode::All => DiffMode::Staged,
            DiffMode::Staged => DiffMode::Worktree,
            DiffMode::Worktree => DiffMode::All,
        }
    }

    fn target_args(self) -> &'static [&'static str] {
        match self {
            DiffMode::All => &["HEAD"],
            DiffMode::Staged => &["--cached"],
            DiffMode::Worktree => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeGroup {
    Unstaged,
    Staged,
    Untracked,
}

impl ChangeGroup {
    pub const ORDER: [ChangeGroup; 3] = [
        ChangeGroup::Unstaged,
        ChangeGroup::Staged,
        ChangeGroup::Untracked,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ChangeGroup::Unstaged => "Unstaged",
            ChangeGroup::Staged => "Staged",
            ChangeGroup::Untracked => "Untracked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeItem {
    pub path: String,
    pub status: String,
    pub group: ChangeGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeRow {
    Header(ChangeGroup),
    /// Index into the change list.
    Item(usize),
}

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("git not found on PATH")]
    GitMissing,
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRender {
    pub path: String,
    pub mode: DiffMode,
    pub width: u16,
    pub text: String,
    pub via_delta: bool,
}

/// `??` is untracked, a non-blank index column is staged, anything else is
/// an unstaged worktree change.
pub fn classify(xy: &str) -> ChangeGroup {
    let mut chars = xy.chars();
    let x = chars.next().unwrap_or(' ');
    let y = chars.next().unwrap_or(' ');
    if x == '?' && y == '?' {
        ChangeGroup::Untracked
    } else if x != ' ' && x != '?' {
        ChangeGroup::Staged
    } else {
        ChangeGroup::Unstaged
    }
}

pub fn is_spec_path(path: &str) -> bool {
    path.starts_with("vibe-docs/spec/") || path.to_lowercase().ends_with(".spec.mdx")
}

/// Parses `git status --porcelain=v1 -z`. Renames and copies carry the
/// original path as a second record, which is skipped.
pub fn parse_porcelain_z(raw: &[u8]) -> Vec<ChangeItem> {
    let mut items = Vec::new();
    let mut records = raw.split(|byte| *byte == 0);
    while let Some(record) = records.next() {
        if record.len() < 4 {
            continue;
        }
        let record = String::from_utf8_lossy(record);
        let (xy, path) = record.split_at(2);
        let path = path[1..].replace('\\', "/");
        if xy.starts_with('R') || xy.starts_with('C') {
            records.next();
        }
        items.push(ChangeItem {
            group: classify(xy),
            status: xy.to_string(),
            path,
        });
    }
    items
}

/// Applies the spec-only restriction, then orders by display group and
/// case-insensitive path. The diff mode never narrows the list: a file
/// staged with further worktree edits (`MM`) has a diff in every mode.
pub fn filter_changes(items: Vec<ChangeItem>, spec_only: bool) -> Vec<ChangeItem> {
    let mut kept: Vec<ChangeItem> = items
        .into_iter()
        .filter(|item| !spec_only || is_spec_path(&item.path))
        .collect();
    kept.sort_by(|a, b| {
        a.group
            .cmp(&b.group)
            .then_with(|| a.path.to_lowercase().cmp(&b.path.to_lowercase()))
            .then_with(|| a.status.cmp(&b.status))
    });
    kept
}

/// Display rows: one header per non-empty group followed by its items.
pub fn group_rows(items: &[ChangeItem]) -> Vec<ChangeRow> {
    let mut rows = Vec::with_capacity(items.len() + ChangeGroup::ORDER.len());
    for group in ChangeGroup::ORDER {
        let mut header = false;
        for (idx, item) in items.iter().enumerate() {
            if item.group != group {
                continue;
            }
            if !header {
                rows.push(ChangeRow::Header(group));
                header = true;
            }
            rows.push(ChangeRow::Item(idx));
        }
    }
    rows
}

pub fn list_changes(root: &Path, spec_only: bool) -> Result<Vec<ChangeItem>, DiffError> {
    let output = run_git(root, &["status", "--porcelain=v1", "-z"], &[0])?;
    let items = parse_porcelain_z(&output.stdout);
    debug!(count = items.len(), spec_only, "changes_listed");
    Ok(filter_changes(items, spec_only))
}

/// Diff for one repository-relative path. With `use_secondary` and `delta`
/// on PATH, an uncolored diff is piped through it; otherwise git colors it.
pub fn render_diff(
    root: &Path,
    path: &str,
    mode: DiffMode,
    width: u16,
    use_secondary: bool,
) -> Result<DiffRender, DiffError> {
    let delta = if use_secondary { which_cmd("delta") } else { None };

    let mut text = String::new();
    let mut via_delta = false;
    if let Some(delta) = &delta {
        let plain = git_diff(root, path, mode, false)?;
        if plain.trim().is_empty() {
            text = plain;
        } else {
            match pipe_through(delta, &[&format!("--width={width}"), "--paging=never"], &plain) {
                Ok(pretty) if !pretty.trim().is_empty() => {
                    text = pretty;
                    via_delta = true;
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "delta_failed"),
            }
        }
    }
    if !via_delta && text.trim().is_empty() {
        text = git_diff(root, path, mode, true)?;
    }
    if text.trim().is_empty() && mode != DiffMode::Staged && is_untracked(root, path)? {
        text = untracked_diff(root, path)?;
    }
    if text.trim().is_empty() {
        text = NO_DIFF_HINT.to_string();
    }

    Ok(DiffRender {
        path: path.to_string(),
        mode,
        width,
        text,
        via_delta,
    })
}

fn git_diff(root: &Path, path: &str, mode: DiffMode, color: bool) -> Result<String, DiffError> {
    let color = if color { "color.ui=always" } else { "color.ui=never" };
    let mut args = vec!["-c", color, "-c", "core.pager=cat", "diff", "--no-ext-diff"];
    args.extend_from_slice(mode.target_args());
    args.push("--");
    args.push(path);
    let output = run_git(root, &args, &[0])?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn is_untracked(root: &Path, path: &str) -> Result<bool, DiffError> {
    let output = run_git(
        root,
        &["ls-files", "--others", "--exclude-standard", "--", path],
        &[0],
    )?;
    Ok(!output.stdout.iter().all(u8::is_ascii_whitespace))
}

fn untracked_diff(root: &Path, path: &str) -> Result<String, DiffError> {
    // --no-index exits 1 when the inputs differ
    let output = run_git(
        root,
        &["-c", "color.ui=always", "diff", "--no-index", "--", "/dev/null", path],
        &[0, 1],
    )?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn run_git(root: &Path, args: &[&str], ok_codes: &[i32]) -> Result<Output, DiffError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                DiffError::GitMissing
            } else {
                DiffError::Spawn {
                    program: "git".to_string(),
                    source,
                }
            }
        })?;
    let code = output.status.code().unwrap_or(-1);
    if !ok_codes.contains(&code) {
        return Err(DiffError::Failed {
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

fn pipe_through(program: &Path, args: &[&str], input: &str) -> Result<String, DiffError> {
    let spawn_err = |source| DiffError::Spawn {
        program: program.display().to_string(),
        source,
    };
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;
    // The formatter streams, so stdout must be drained while stdin is fed.
    let feeder = child.stdin.take().map(|mut stdin| {
        let input = input.as_bytes().to_vec();
        std::thread::spawn(move || stdin.write_all(&input))
    });
    let output = child.wait_with_output().map_err(spawn_err)?;
    if let Some(feeder) = feeder {
        match feeder.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(error = %err, "formatter_stdin_closed_early"),
            Err(_) => warn!("formatter_stdin_writer_panicked"),
        }
    }
    if !output.status.success() {
        return Err(DiffError::Failed {
            args: format!("{} {}", program.display(), args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub fn which_cmd(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var("PATH").ok()?;
    for part in path_var.split(':') {
        if part.is_empty() {
            continue;
        }
        let candidate = Path::new(part).join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::strip_ansi;

    fn item(path: &str, status: &str) -> ChangeItem {
        ChangeItem {
            path: path.to_string(),
            status: status.to_string(),
            group: classify(status),
        }
    }

    #[test]
    fn classifies_by_two_character_rule() {
        assert_eq!(classify("??"), ChangeGroup::Untracked);
        assert_eq!(classify("M "), ChangeGroup::Staged);
        assert_eq!(classify("MM"), ChangeGroup::Staged);
        assert_eq!(classify("A "), ChangeGroup::Staged);
        assert_eq!(classify(" M"), ChangeGroup::Unstaged);
        assert_eq!(classify(" D"), ChangeGroup::Unstaged);
    }

    #[test]
    fn parses_nul_separated_records_with_renames() {
        let raw = b" M src/lib.rs\0R  new.md\0old.md\0?? notes.txt\0A  vibe-docs/spec/a.spec.mdx\0";
        let items = parse_porcelain_z(raw);
        let paths: Vec<&str> = items.iter().map(|item| item.path.as_str()).collect();
        assert_eq!(paths, vec!["src/lib.rs", "new.md", "notes.txt", "vibe-docs/spec/a.spec.mdx"]);
        assert_eq!(items[1].status, "R ");
        assert_eq!(items[1].group, ChangeGroup::Staged);
        assert_eq!(items[2].group, ChangeGroup::Untracked);
    }

    #[test]
    fn groups_in_display_order_with_headers_only_when_needed() {
        let items = filter_changes(
            vec![item("z.txt", "??"), item("b.rs", "M "), item("A.rs", " M"), item("a2.rs", " M")],
            false,
        );
        let rows = group_rows(&items);
        assert_eq!(
            rows,
            vec![
                ChangeRow::Header(ChangeGroup::Unstaged),
                ChangeRow::Item(0),
                ChangeRow::Item(1),
                ChangeRow::Header(ChangeGroup::Staged),
                ChangeRow::Item(2),
                ChangeRow::Header(ChangeGroup::Untracked),
                ChangeRow::Item(3),
            ]
        );
        assert_eq!(items[0].path, "A.rs");
        assert!(group_rows(&[]).is_empty());
    }

    #[test]
    fn spec_only_keeps_documentation_paths() {
        let items = filter_changes(
            vec![
                item("vibe-docs/spec/a.md", " M"),
                item("docs/b.spec.mdx", " M"),
                item("src/c.rs", " M"),
            ],
            true,
        );
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| is_spec_path(&item.path)));
    }

    #[test]
    fn mode_cycles() {
        assert_eq!(DiffMode::All.next(), DiffMode::Staged);
        assert_eq!(DiffMode::Staged.next(), DiffMode::Worktree);
        assert_eq!(DiffMode::Worktree.next(), DiffMode::All);
    }

    fn git(root: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(root)
            .args(["-c", "user.name=t", "-c", "user.email=t@example.com"])
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .expect("git");
        assert!(status.success(), "git {args:?}");
    }

    #[test]
    fn lists_and_diffs_a_real_repository() {
        if which_cmd("git").is_none() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        git(root, &["init", "-q"]);
        std::fs::write(root.join("tracked.txt"), "one\n").expect("write");
        std::fs::write(root.join("staged.txt"), "s\n").expect("write");
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "init"]);

        std::fs::write(root.join("tracked.txt"), "one\ntwo\n").expect("write");
        std::fs::write(root.join("staged.txt"), "s\nmore\n").expect("write");
        git(root, &["add", "staged.txt"]);
        std::fs::write(root.join("new.txt"), "fresh\n").expect("write");

        let items = list_changes(root, false).expect("list");
        let summary: Vec<(&str, ChangeGroup)> =
            items.iter().map(|item| (item.path.as_str(), item.group)).collect();
        assert_eq!(
            summary,
            vec![
                ("tracked.txt", ChangeGroup::Unstaged),
                ("staged.txt", ChangeGroup::Staged),
                ("new.txt", ChangeGroup::Untracked),
            ]
        );

        let diff = render_diff(root, "tracked.txt", DiffMode::All, 80, false).expect("diff");
        assert!(strip_ansi(&diff.text).contains("+two"));
        assert!(!diff.via_delta);

        let cached = render_diff(root, "tracked.txt", DiffMode::Staged, 80, false).expect("diff");
        assert_eq!(cached.text, NO_DIFF_HINT);

        let untracked = render_diff(root, "new.txt", DiffMode::All, 80, false).expect("diff");
        assert!(strip_ansi(&untracked.text).contains("+fresh"));
    }

    #[test]
    fn partly_staged_file_has_a_diff_in_every_mode() {
        if which_cmd("git").is_none() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        git(root, &["init", "-q"]);
        std::fs::write(root.join("notes.md"), "base\n").expect("write");
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "init"]);
        std::fs::write(root.join("notes.md"), "base\nstaged\n").expect("write");
        git(root, &["add", "notes.md"]);
        std::fs::write(root.join("notes.md"), "base\nstaged\nworktree\n").expect("write");

        let items = list_changes(root, false).expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, "MM");

        let expect = [
            (DiffMode::All, "+worktree"),
            (DiffMode::Staged, "+staged"),
            (DiffMode::Worktree, "+worktree"),
        ];
        for (mode, needle) in expect {
            let diff = render_diff(root, "notes.md", mode, 80, false).expect("diff");
            assert!(strip_ansi(&diff.text).contains(needle), "{} diff", mode.label());
        }
        let worktree = render_diff(root, "notes.md", DiffMode::Worktree, 80, false).expect("diff");
        assert!(!strip_ansi(&worktree.text).contains("+staged"));
    }

    #[test]
    fn formatter_output_larger_than_a_pipe_buffer_completes() {
        let Some(cat) = which_cmd("cat") else {
            return;
        };
        let input: String = (0..40_000).map(|n| format!("+line {n}\n")).collect();
        let output = pipe_through(&cat, &[], &input).expect("cat");
        assert_eq!(output.len(), input.len());
        assert!(output.ends_with("+line 39999\n"));
    }

    #[test]
    fn outside_a_repository_is_an_error() {
        if which_cmd("git").is_none() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let err = list_changes(dir.path(), false).expect_err("not a repo");
        assert!(matches!(err, DiffError::Failed { .. }));
    }
}
