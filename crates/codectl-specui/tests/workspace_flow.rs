use codectl_specui::app::{App, Command, Msg};
use codectl_specui::config::Config;
use codectl_specui::diff::{which_cmd, DiffMode, NO_DIFF_HINT};
use codectl_specui::layout::Tab;
use codectl_specui::render::strip_ansi;
use codectl_specui::runtime::run_command;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use std::collections::VecDeque;
use std::path::Path;
use std::process::{Command as Process, Stdio};

/// Runs commands synchronously until the queue drains. Long-lived jobs
/// (watch waits and the shell) are not exercised here.
fn drain(app: &mut App, cmds: Vec<Command>) {
    let root = app.root().to_path_buf();
    let mut queue: VecDeque<Command> = cmds.into();
    while let Some(cmd) = queue.pop_front() {
        match cmd {
            Command::AwaitWatch(_) | Command::StartPty { .. } | Command::ReadPty { .. } => continue,
            other => {
                let msg = run_command(&root, other);
                queue.extend(app.update(msg));
            }
        }
    }
}

fn send(app: &mut App, msg: Msg) {
    let cmds = app.update(msg);
    drain(app, cmds);
}

fn press(app: &mut App, code: KeyCode) {
    send(app, Msg::Key(KeyEvent::new(code, KeyModifiers::NONE)));
}

fn type_text(app: &mut App, text: &str) {
    for ch in text.chars() {
        press(app, KeyCode::Char(ch));
    }
}

fn start(root: &Path) -> App {
    let config = Config {
        use_delta: false,
        live_watch: false,
        ..Config::for_root(root)
    };
    let mut app = App::new(&config);
    send(&mut app, Msg::Resize(120, 40));
    let cmds = app.init(None);
    drain(&mut app, cmds);
    app
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, body).expect("write");
}

fn docs_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    write(
        root,
        "vibe-docs/spec/login.spec.mdx",
        "---\ntitle: Login Flow\n---\n# Login\n\nUsers sign in.\n",
    );
    write(
        root,
        "vibe-docs/task/001-login.task.mdx",
        "---\ntitle: Build login\nstatus: todo\nowner: ana\npriority: P1\nrelated: [vibe-docs/spec/login.spec.mdx]\n---\n# Build login\n",
    );
    write(
        root,
        "vibe-docs/task/002-billing.task.mdx",
        "---\ntitle: Billing\nstatus: done\nowner: bo\npriority: P2\n---\n# Billing\n",
    );
    write(root, "README.md", "# Readme\n");
    dir
}

#[test]
fn opened_spec_renders_and_scopes_the_task_board() {
    let dir = docs_fixture();
    let root = dir.path();
    let spec = root.join("vibe-docs/spec/login.spec.mdx");
    let mut app = start(root);

    press(&mut app, KeyCode::Char(':'));
    type_text(&mut app, "vibe-docs/spec/login.spec.mdx");
    press(&mut app, KeyCode::Enter);

    assert_eq!(app.open.as_deref(), Some(spec.as_path()));
    assert!(app.preview_is_current());
    let plain = strip_ansi(&app.preview.text);
    assert!(plain.contains("Users sign in."));
    assert!(!plain.contains("title: Login Flow"));
    assert_eq!(app.spec_title(&spec), Some("Login Flow"));

    press(&mut app, KeyCode::Char('3'));
    assert_eq!(app.tab, Tab::Tasks);
    let titles: Vec<&str> = app
        .tasks
        .view
        .iter()
        .map(|idx| app.tasks.items[*idx].title.as_str())
        .collect();
    assert_eq!(titles, vec!["Build login"]);

    // drop the document restriction, then narrow by status
    press(&mut app, KeyCode::Char('d'));
    assert_eq!(app.tasks.view.len(), 2);
    press(&mut app, KeyCode::Char('s'));
    assert_eq!(app.tasks.filter.status, "done");
    assert_eq!(app.tasks.view.len(), 1);
    assert_eq!(
        app.tasks.selected().map(|task| task.title.as_str()),
        Some("Billing")
    );
    assert!(app.preview_is_current());
    assert!(strip_ansi(&app.preview.text).contains("Billing"));
}

#[test]
fn task_search_edits_live_from_the_input_line() {
    let dir = docs_fixture();
    let mut app = start(dir.path());
    press(&mut app, KeyCode::Char('3'));
    assert_eq!(app.tasks.view.len(), 2);

    press(&mut app, KeyCode::Char('/'));
    type_text(&mut app, "bill");
    assert_eq!(app.tasks.view.len(), 1);
    press(&mut app, KeyCode::Backspace);
    press(&mut app, KeyCode::Backspace);
    press(&mut app, KeyCode::Backspace);
    press(&mut app, KeyCode::Backspace);
    assert_eq!(app.tasks.view.len(), 2);
    press(&mut app, KeyCode::Enter);
    assert!(app.is_focused(codectl_specui::layout::Region::List));
}

#[test]
fn new_files_appear_after_fingerprint_change() {
    let dir = docs_fixture();
    let root = dir.path();
    let mut app = start(root);
    send(&mut app, Msg::Tick);
    assert!(app.tree.row_of(&root.join("later.md")).is_none());

    write(root, "later.md", "added\n");
    send(&mut app, Msg::Tick);
    assert!(app.tree.row_of(&root.join("later.md")).is_some());
}

#[test]
fn clicking_a_tree_row_opens_the_file() {
    let dir = docs_fixture();
    let root = dir.path();
    let readme = root.join("README.md");
    let mut app = start(root);
    let row = app.tree.row_of(&readme).expect("readme row");
    let list = app.layout.list;
    send(
        &mut app,
        Msg::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: list.x + 2,
            row: list.y + 1 + row as u16,
            modifiers: KeyModifiers::NONE,
        }),
    );
    assert_eq!(app.open.as_deref(), Some(readme.as_path()));
    assert!(strip_ansi(&app.preview.text).contains("Readme"));
}

fn git(root: &Path, args: &[&str]) {
    let status = Process::new("git")
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
fn diff_tab_lists_and_renders_worktree_changes() {
    if which_cmd("git").is_none() {
        return;
    }
    let dir = docs_fixture();
    let root = dir.path();
    git(root, &["init", "-q"]);
    git(root, &["add", "."]);
    git(root, &["commit", "-q", "-m", "init"]);
    write(root, "README.md", "# Readme\nsecond line\n");

    let mut app = start(root);
    press(&mut app, KeyCode::Char('2'));
    assert_eq!(app.tab, Tab::Diff);
    assert_eq!(
        app.diff.selected().map(|item| item.path.as_str()),
        Some("README.md")
    );
    assert!(strip_ansi(&app.diff.text).contains("+second line"));

    // nothing is staged, so the same file shows an empty staged diff
    press(&mut app, KeyCode::Char('m'));
    assert_eq!(app.diff.mode, DiffMode::Staged);
    assert_eq!(
        app.diff.selected().map(|item| item.path.as_str()),
        Some("README.md")
    );
    assert_eq!(app.diff.text, NO_DIFF_HINT);
}
