//! Workspace state machine. `App::update` consumes one message and returns
//! the background commands it wants run; results come back as messages.

use crate::config::Config;
use crate::diff::{self, ChangeItem, ChangeRow, DiffMode, DiffRender};
use crate::layout::{self, Focus, PaneLayout, Region, Tab};
use crate::render::{RenderCache, Rendered};
use crate::tasks::{self, FilterField, TaskFilter};
use crate::terminal::{self, PtyReader, PtyWriter, TerminalScreen, TerminalSession};
use crate::tree::FileTree;
use crate::watch::{ChangeReceiver, Fingerprint, WatchHandle};
use codectl_core::spec_docs::SpecDoc;
use codectl_core::tasks::TaskItem;
use codectl_core::{is_docs_path, rel_slash};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const STATUS_TTL: Duration = Duration::from_secs(4);

pub enum Msg {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    /// Once per second; drives the fingerprint fallback.
    Tick,
    /// Terminal repaint cadence.
    RenderTick,
    TreeChanged,
    WatchClosed,
    Fingerprint(Fingerprint),
    Rendered {
        path: PathBuf,
        width: u16,
        fast: bool,
        result: Result<Rendered, String>,
    },
    ChangesListed {
        spec_only: bool,
        result: Result<Vec<ChangeItem>, String>,
    },
    DiffRendered {
        path: String,
        mode: DiffMode,
        width: u16,
        result: Result<DiffRender, String>,
    },
    TasksLoaded {
        tasks: Result<Vec<TaskItem>, String>,
        specs: Vec<SpecDoc>,
    },
    PtyStarted {
        generation: u64,
        result: Result<TerminalSession, String>,
    },
    PtyChunk {
        generation: u64,
        reader: PtyReader,
        data: Vec<u8>,
    },
    PtyClosed {
        generation: u64,
    },
}

pub enum Command {
    Render {
        path: PathBuf,
        width: u16,
        force_fast: bool,
    },
    ListChanges {
        spec_only: bool,
    },
    RenderDiff {
        path: String,
        mode: DiffMode,
        width: u16,
        use_secondary: bool,
    },
    LoadTasks,
    ComputeFingerprint {
        dirs: Vec<PathBuf>,
    },
    AwaitWatch(ChangeReceiver),
    StartPty {
        generation: u64,
        cols: u16,
        rows: u16,
    },
    ReadPty {
        generation: u64,
        reader: PtyReader,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Render { .. } => "render",
            Command::ListChanges { .. } => "list_changes",
            Command::RenderDiff { .. } => "render_diff",
            Command::LoadTasks => "load_tasks",
            Command::ComputeFingerprint { .. } => "fingerprint",
            Command::AwaitWatch(_) => "await_watch",
            Command::StartPty { .. } => "start_pty",
            Command::ReadPty { .. } => "read_pty",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Command,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Idle,
    Starting,
    Running,
    Exited,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RenderKey {
    path: PathBuf,
    width: u16,
    fast: bool,
}

#[derive(Debug, Default)]
pub struct Preview {
    key: Option<RenderKey>,
    pub text: String,
    pub is_error: bool,
    pub scroll: u16,
}

#[derive(Debug, Default)]
pub struct DiffView {
    pub mode: DiffMode,
    pub spec_only: bool,
    pub changes: Vec<ChangeItem>,
    pub rows: Vec<ChangeRow>,
    /// Index into `rows`; always an item row when any exist.
    pub cursor: usize,
    pub text: String,
    pub shown: Option<(String, DiffMode, u16)>,
    pub error: Option<String>,
    pub scroll: u16,
    pending: Option<(String, DiffMode, u16)>,
}

impl DiffView {
    pub fn selected(&self) -> Option<&ChangeItem> {
        match self.rows.get(self.cursor) {
            Some(ChangeRow::Item(idx)) => self.changes.get(*idx),
            _ => None,
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let items: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| matches!(row, ChangeRow::Item(_)))
            .map(|(idx, _)| idx)
            .collect();
        if items.is_empty() {
            self.cursor = 0;
            return;
        }
        let pos = items.iter().position(|idx| *idx == self.cursor).unwrap_or(0) as isize;
        let next = (pos + delta).clamp(0, items.len() as isize - 1) as usize;
        self.cursor = items[next];
    }

    fn select_row(&mut self, row: usize) -> bool {
        if matches!(self.rows.get(row), Some(ChangeRow::Item(_))) {
            self.cursor = row;
            return true;
        }
        false
    }

    fn replace(&mut self, changes: Vec<ChangeItem>) {
        let previous = self.selected().map(|item| item.path.clone());
        self.rows = diff::group_rows(&changes);
        self.changes = changes;
        let restored = previous.and_then(|path| {
            self.rows.iter().position(|row| match row {
                ChangeRow::Item(idx) => self.changes[*idx].path == path,
                ChangeRow::Header(_) => false,
            })
        });
        match restored {
            Some(row) => self.cursor = row,
            None => {
                self.cursor = 0;
                self.move_cursor(0);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskBoard {
    pub items: Vec<TaskItem>,
    pub filter: TaskFilter,
    /// Indices into `items` that pass the filter.
    pub view: Vec<usize>,
    pub cursor: usize,
    pub follow_doc: bool,
    pub error: Option<String>,
    pub loaded: bool,
}

impl TaskBoard {
    pub fn selected(&self) -> Option<&TaskItem> {
        self.view.get(self.cursor).and_then(|idx| self.items.get(*idx))
    }
}

pub struct TerminalPane {
    pub session: Option<TerminalSession>,
    /// Input side of the live session; `None` once the shell is gone.
    pub writer: Option<PtyWriter>,
    pub screen: TerminalScreen,
    pub status: TerminalStatus,
    generation: u64,
}

pub struct App {
    root: PathBuf,
    pub tab: Tab,
    pub focus: Focus,
    pub layout: PaneLayout,
    pub tree: FileTree,
    pub open: Option<PathBuf>,
    pub preview: Preview,
    pub cache: RenderCache,
    pub fast_render: bool,
    pending_render: Option<RenderKey>,
    pub diff: DiffView,
    pub tasks: TaskBoard,
    pub input: String,
    pub input_mode: InputMode,
    pub terminal: TerminalPane,
    watch: Option<WatchHandle>,
    last_fingerprint: Option<Fingerprint>,
    use_delta: bool,
    spec_titles: HashMap<String, String>,
    list_offsets: [usize; 4],
    status: Option<(String, Instant)>,
    redraw: bool,
    should_quit: bool,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let tree = FileTree::new(&config.root);
        let layout = layout::compute_layout(Rect::new(0, 0, 120, 40));
        let (cols, rows) = layout.preview_grid();
        Self {
            root: config.root.clone(),
            tab: config.initial_tab,
            focus: Focus::Files,
            layout,
            tree,
            open: None,
            preview: Preview::default(),
            cache: RenderCache::new(),
            fast_render: config.fast_render,
            pending_render: None,
            diff: DiffView::default(),
            tasks: TaskBoard {
                follow_doc: true,
                ..TaskBoard::default()
            },
            input: String::new(),
            input_mode: InputMode::Command,
            terminal: TerminalPane {
                session: None,
                writer: None,
                screen: TerminalScreen::new(rows, cols),
                status: TerminalStatus::Idle,
                generation: 0,
            },
            watch: None,
            last_fingerprint: None,
            use_delta: config.use_delta,
            spec_titles: HashMap::new(),
            list_offsets: [0; 4],
            status: None,
            redraw: true,
            should_quit: false,
        }
    }

    /// Commands for the first frame: initial data loads, the optional file
    /// to open and the shell when starting on the terminal tab.
    pub fn init(&mut self, open: Option<&Path>) -> Vec<Command> {
        let mut cmds = vec![self.list_changes_cmd(), Command::LoadTasks];
        if let Some(path) = open {
            if self.tree.select_path(path) {
                self.open = Some(path.to_path_buf());
            } else {
                self.set_status(format!("cannot open {}", path.display()));
            }
        }
        cmds.extend(self.on_tab_changed());
        info!(root = %self.root.display(), tab = self.tab.title(), "workspace_ready");
        cmds
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// True once after any change that needs a repaint.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    pub fn has_live_watch(&self) -> bool {
        self.watch.is_some()
    }

    /// Installs a live watch; the returned command waits for its first
    /// change.
    pub fn attach_watch(&mut self, handle: WatchHandle) -> Vec<Command> {
        let changes = handle.changes();
        self.watch = Some(handle);
        self.last_fingerprint = None;
        vec![Command::AwaitWatch(changes)]
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status.as_ref().map(|(text, _)| text.as_str())
    }

    pub fn spec_title(&self, path: &Path) -> Option<&str> {
        self.spec_titles
            .get(&rel_slash(&self.root, path))
            .map(String::as_str)
    }

    pub fn list_offset(&self) -> usize {
        self.list_offsets[self.list_tab().index()]
    }

    /// True when keystrokes go straight to the shell.
    pub fn terminal_focused(&self) -> bool {
        self.tab == Tab::Terminal && self.focus == Focus::Preview
    }

    pub fn is_focused(&self, region: Region) -> bool {
        match region {
            Region::List => self.focus == Focus::Files,
            Region::Preview => self.focus == Focus::Preview,
            Region::Input => self.focus == Focus::Input,
            Region::Tabs | Region::Status => false,
        }
    }

    pub fn update(&mut self, msg: Msg) -> Vec<Command> {
        if !matches!(msg, Msg::RenderTick | Msg::PtyChunk { .. } | Msg::Tick) {
            self.redraw = true;
        }
        let cmds = match msg {
            Msg::Key(key) => self.handle_key(key),
            Msg::Mouse(mouse) => self.handle_mouse(mouse),
            Msg::Resize(width, height) => self.resize(width, height),
            Msg::Tick => self.on_tick(),
            Msg::RenderTick => {
                if self.tab == Tab::Terminal
                    && (self.terminal.screen.is_dirty() || self.terminal_focused())
                {
                    self.redraw = true;
                }
                Vec::new()
            }
            Msg::TreeChanged => {
                let mut cmds = self.on_disk_change();
                if let Some(watch) = &self.watch {
                    cmds.push(Command::AwaitWatch(watch.changes()));
                }
                cmds
            }
            Msg::WatchClosed => {
                warn!("watch_closed_falling_back_to_fingerprint");
                self.watch = None;
                Vec::new()
            }
            Msg::Fingerprint(print) => {
                let changed = self
                    .last_fingerprint
                    .map_or(false, |previous| previous != print);
                self.last_fingerprint = Some(print);
                if changed {
                    debug!("fingerprint_changed");
                    self.on_disk_change()
                } else {
                    Vec::new()
                }
            }
            Msg::Rendered {
                path,
                width,
                fast,
                result,
            } => self.on_rendered(RenderKey { path, width, fast }, result),
            Msg::ChangesListed { spec_only, result } => self.on_changes_listed(spec_only, result),
            Msg::DiffRendered {
                path,
                mode,
                width,
                result,
            } => self.on_diff_rendered(path, mode, width, result),
            Msg::TasksLoaded { tasks, specs } => self.on_tasks_loaded(tasks, specs),
            Msg::PtyStarted { generation, result } => self.on_pty_started(generation, result),
            Msg::PtyChunk {
                generation,
                reader,
                data,
            } => {
                if generation != self.terminal.generation || self.terminal.session.is_none() {
                    return Vec::new();
                }
                self.terminal.screen.feed(&data);
                vec![Command::ReadPty { generation, reader }]
            }
            Msg::PtyClosed { generation } => {
                if generation == self.terminal.generation && self.terminal.session.is_some() {
                    info!("terminal_exited");
                    self.terminal.session = None;
                    self.terminal.writer = None;
                    self.terminal.status = TerminalStatus::Exited;
                    if self.focus == Focus::Preview && self.tab == Tab::Terminal {
                        self.focus = Focus::Input;
                    }
                }
                Vec::new()
            }
        };
        self.sync_list_offset();
        cmds
    }

    fn on_tick(&mut self) -> Vec<Command> {
        if let Some((_, at)) = &self.status {
            if at.elapsed() >= STATUS_TTL {
                self.status = None;
                self.redraw = true;
            }
        }
        if self.watch.is_some() {
            return Vec::new();
        }
        vec![Command::ComputeFingerprint {
            dirs: self.tree.expanded_visible_dirs(),
        }]
    }

    /// Reload everything derived from disk.
    fn on_disk_change(&mut self) -> Vec<Command> {
        self.tree.reload();
        if let Some(open) = self.open.clone() {
            if !open.exists() {
                self.cache.invalidate(&open);
                self.set_status(format!("{} was removed", rel_slash(&self.root, &open)));
            }
        }
        if let Some(watch) = self.watch.as_mut() {
            watch.sync_dirs(&self.tree.watch_dirs());
        }
        let mut cmds = vec![self.list_changes_cmd()];
        if self.tab == Tab::Tasks {
            cmds.push(Command::LoadTasks);
        }
        cmds.extend(self.refresh_preview());
        cmds
    }

    fn set_status(&mut self, text: String) {
        self.status = Some((text, Instant::now()));
    }

    fn resize(&mut self, width: u16, height: u16) -> Vec<Command> {
        self.layout = layout::compute_layout(Rect::new(0, 0, width, height));
        self.sync_terminal_size();
        let mut cmds = self.refresh_preview();
        if self.tab == Tab::Diff {
            cmds.extend(self.request_diff(false));
        }
        cmds
    }

    fn preview_width(&self) -> u16 {
        self.layout.preview_grid().0
    }

    /// Tab whose list is shown in the left pane.
    fn list_tab(&self) -> Tab {
        match self.tab {
            Tab::Terminal => Tab::Explorer,
            other => other,
        }
    }

    fn on_tab_changed(&mut self) -> Vec<Command> {
        let mut cmds = Vec::new();
        match self.tab {
            Tab::Explorer => {}
            Tab::Diff => {
                cmds.push(self.list_changes_cmd());
                cmds.extend(self.request_diff(false));
            }
            Tab::Tasks => {
                cmds.push(Command::LoadTasks);
                self.refilter_tasks();
            }
            Tab::Terminal => {
                cmds.extend(self.ensure_terminal());
                if self.terminal.session.is_some() {
                    self.focus = Focus::Preview;
                }
            }
        }
        cmds.extend(self.refresh_preview());
        cmds
    }

    fn switch_tab(&mut self, tab: Tab) -> Vec<Command> {
        if self.tab == tab {
            return Vec::new();
        }
        self.tab = tab;
        if self.focus == Focus::Preview && tab != Tab::Terminal {
            self.focus = Focus::Files;
        }
        self.on_tab_changed()
    }

    // ----- preview / render cache -----

    /// Document the preview should show on the current tab.
    fn current_doc(&self) -> Option<PathBuf> {
        match self.tab {
            Tab::Explorer | Tab::Terminal => self.open.clone(),
            Tab::Tasks => self.tasks.selected().map(|task| task.path.clone()),
            Tab::Diff => None,
        }
    }

    fn refresh_preview(&mut self) -> Vec<Command> {
        let Some(path) = self.current_doc() else {
            return Vec::new();
        };
        let key = RenderKey {
            path,
            width: self.preview_width(),
            fast: self.fast_render,
        };
        if let Some(text) = self.cache.lookup(&key.path, key.width, key.fast) {
            let text = text.to_string();
            if self.preview.key.as_ref() != Some(&key) {
                self.preview.scroll = 0;
            }
            self.preview.text = text;
            self.preview.is_error = false;
            self.preview.key = Some(key);
            return Vec::new();
        }
        if self.pending_render.as_ref() == Some(&key) {
            return Vec::new();
        }
        self.pending_render = Some(key.clone());
        vec![Command::Render {
            path: key.path,
            width: key.width,
            force_fast: key.fast,
        }]
    }

    pub fn preview_is_current(&self) -> bool {
        let Some(key) = &self.preview.key else {
            return false;
        };
        self.current_doc().as_deref() == Some(key.path.as_path())
    }

    fn on_rendered(&mut self, key: RenderKey, result: Result<Rendered, String>) -> Vec<Command> {
        if self.pending_render.as_ref() == Some(&key) {
            self.pending_render = None;
        }
        if let Ok(rendered) = &result {
            self.cache.insert(rendered);
        }
        let current = self.current_doc();
        if current.as_deref() != Some(key.path.as_path())
            || key.width != self.preview_width()
            || key.fast != self.fast_render
        {
            debug!(path = %key.path.display(), "stale_render_dropped");
            return Vec::new();
        }
        if self.preview.key.as_ref().map(|k| &k.path) != Some(&key.path) {
            self.preview.scroll = 0;
        }
        // a change that landed while this render was in flight was
        // coalesced into it, so the result is only good if the stat held
        let outdated = match &result {
            Ok(rendered) => !rendered.matches_disk(),
            Err(_) => false,
        };
        match result {
            Ok(rendered) => {
                self.preview.text = rendered.text;
                self.preview.is_error = false;
            }
            Err(err) => {
                self.preview.text = err;
                self.preview.is_error = true;
            }
        }
        self.preview.key = Some(key);
        if outdated {
            debug!("render_outdated_rescheduled");
            return self.refresh_preview();
        }
        Vec::new()
    }

    fn open_path(&mut self, path: PathBuf) -> Vec<Command> {
        self.open = Some(path);
        self.refilter_tasks();
        self.refresh_preview()
    }

    // ----- diff -----

    fn list_changes_cmd(&self) -> Command {
        Command::ListChanges {
            spec_only: self.diff.spec_only,
        }
    }

    fn request_diff(&mut self, force: bool) -> Vec<Command> {
        let Some(item) = self.diff.selected() else {
            self.diff.shown = None;
            self.diff.text.clear();
            return Vec::new();
        };
        let key = (item.path.clone(), self.diff.mode, self.preview_width());
        if !force && (self.diff.shown.as_ref() == Some(&key) || self.diff.pending.as_ref() == Some(&key)) {
            return Vec::new();
        }
        self.diff.pending = Some(key.clone());
        vec![Command::RenderDiff {
            path: key.0,
            mode: key.1,
            width: key.2,
            use_secondary: self.use_delta,
        }]
    }

    fn on_changes_listed(&mut self, spec_only: bool, result: Result<Vec<ChangeItem>, String>) -> Vec<Command> {
        if spec_only != self.diff.spec_only {
            return Vec::new();
        }
        match result {
            Ok(changes) => {
                self.diff.error = None;
                self.diff.replace(changes);
                if self.tab == Tab::Diff {
                    return self.request_diff(true);
                }
            }
            Err(err) => {
                self.diff.error = Some(err);
                self.diff.replace(Vec::new());
            }
        }
        Vec::new()
    }

    fn on_diff_rendered(
        &mut self,
        path: String,
        mode: DiffMode,
        width: u16,
        result: Result<DiffRender, String>,
    ) -> Vec<Command> {
        let key = (path, mode, width);
        if self.diff.pending.as_ref() == Some(&key) {
            self.diff.pending = None;
        }
        let current = self
            .diff
            .selected()
            .map(|item| (item.path.clone(), self.diff.mode, self.preview_width()));
        if current.as_ref() != Some(&key) {
            return Vec::new();
        }
        if self.diff.shown.as_ref().map(|shown| &shown.0) != Some(&key.0) {
            self.diff.scroll = 0;
        }
        self.diff.text = match result {
            Ok(render) => render.text,
            Err(err) => err,
        };
        self.diff.shown = Some(key);
        Vec::new()
    }

    // ----- tasks -----

    fn task_doc(&self) -> Option<String> {
        if !self.tasks.follow_doc {
            return None;
        }
        let open = self.open.as_ref()?;
        let rel = rel_slash(&self.root, open);
        is_docs_path(&rel).then_some(rel)
    }

    fn refilter_tasks(&mut self) {
        let selected = self.tasks.selected().map(|task| task.path.clone());
        let doc = self.task_doc();
        self.tasks.view = tasks::apply_filter(&self.tasks.items, doc.as_deref(), &self.tasks.filter);
        self.tasks.cursor = selected
            .and_then(|path| {
                self.tasks
                    .view
                    .iter()
                    .position(|idx| self.tasks.items[*idx].path == path)
            })
            .unwrap_or(0)
            .min(self.tasks.view.len().saturating_sub(1));
    }

    fn on_tasks_loaded(&mut self, result: Result<Vec<TaskItem>, String>, specs: Vec<SpecDoc>) -> Vec<Command> {
        self.spec_titles = specs
            .into_iter()
            .map(|doc| (doc.rel_path, doc.title))
            .collect();
        match result {
            Ok(items) => {
                self.tasks.items = items;
                self.tasks.error = None;
            }
            Err(err) => {
                self.tasks.items.clear();
                self.tasks.error = Some(err);
            }
        }
        self.tasks.loaded = true;
        self.refilter_tasks();
        if self.tab == Tab::Tasks {
            return self.refresh_preview();
        }
        Vec::new()
    }

    // ----- terminal -----

    fn ensure_terminal(&mut self) -> Vec<Command> {
        if !matches!(
            self.terminal.status,
            TerminalStatus::Idle | TerminalStatus::Exited | TerminalStatus::Failed(_)
        ) {
            return Vec::new();
        }
        self.terminal.generation += 1;
        self.terminal.status = TerminalStatus::Starting;
        let (cols, rows) = self.layout.preview_grid();
        self.terminal.screen = TerminalScreen::new(rows, cols);
        vec![Command::StartPty {
            generation: self.terminal.generation,
            cols,
            rows,
        }]
    }

    fn on_pty_started(&mut self, generation: u64, result: Result<TerminalSession, String>) -> Vec<Command> {
        if generation != self.terminal.generation {
            return Vec::new();
        }
        match result {
            Ok(mut session) => {
                let reader = session.take_reader();
                self.terminal.writer = Some(session.writer());
                self.terminal.session = Some(session);
                self.sync_terminal_size();
                self.terminal.status = TerminalStatus::Running;
                if self.tab == Tab::Terminal && self.focus != Focus::Input {
                    self.focus = Focus::Preview;
                }
                reader
                    .map(|reader| vec![Command::ReadPty { generation, reader }])
                    .unwrap_or_default()
            }
            Err(err) => {
                warn!(error = %err, "terminal_start_failed");
                self.terminal.status = TerminalStatus::Failed(err);
                if self.focus == Focus::Preview && self.tab == Tab::Terminal {
                    self.focus = Focus::Input;
                }
                Vec::new()
            }
        }
    }

    /// Keeps the emulator and the PTY at the preview pane's grid.
    fn sync_terminal_size(&mut self) {
        let (cols, rows) = self.layout.preview_grid();
        self.terminal.screen.resize(rows, cols);
        let Some(session) = &self.terminal.session else {
            return;
        };
        if session.size().ok() == Some((cols, rows)) {
            return;
        }
        if let Err(err) = session.resize(cols, rows) {
            warn!(error = %err, "terminal_resize_failed");
        }
    }

    /// Writes on the caller's thread so bytes reach the shell in key order.
    fn write_pty(&self, bytes: &[u8]) {
        let Some(writer) = &self.terminal.writer else {
            return;
        };
        if let Err(err) = terminal::write_bytes(writer, bytes) {
            warn!(error = %err, "terminal_write_failed");
        }
    }

    // ----- input -----

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Command> {
        if !matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
            return Vec::new();
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if self.terminal_focused() {
            if key.code == KeyCode::Esc {
                self.focus = Focus::Input;
                return Vec::new();
            }
            if self.terminal.writer.is_none() {
                if key.code == KeyCode::Enter {
                    return self.ensure_terminal();
                }
                return Vec::new();
            }
            if let Some(bytes) = terminal::key_to_bytes(&key) {
                self.write_pty(&bytes);
            }
            return Vec::new();
        }

        if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
            self.should_quit = true;
            return Vec::new();
        }
        if ctrl && key.code == KeyCode::Char('t') {
            let next = self.tab.next();
            return self.switch_tab(next);
        }
        match key.code {
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return Vec::new();
            }
            KeyCode::BackTab => {
                self.focus = self.focus.next().next();
                return Vec::new();
            }
            _ => {}
        }

        if self.focus == Focus::Input {
            return self.handle_input_key(key);
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                return Vec::new();
            }
            KeyCode::Char(ch @ '1'..='4') => {
                if let Some(tab) = Tab::from_digit(ch) {
                    return self.switch_tab(tab);
                }
            }
            KeyCode::Char('r') => {
                self.set_status("refreshed".to_string());
                let mut cmds = self.on_disk_change();
                cmds.push(Command::LoadTasks);
                return cmds;
            }
            KeyCode::Char('f') => {
                self.fast_render = !self.fast_render;
                self.set_status(format!(
                    "fast render {}",
                    if self.fast_render { "on" } else { "off" }
                ));
                return self.refresh_preview();
            }
            KeyCode::Char(':') | KeyCode::Char('i') => {
                self.focus = Focus::Input;
                self.input_mode = InputMode::Command;
                return Vec::new();
            }
            KeyCode::Esc => {
                self.focus = Focus::Files;
                return Vec::new();
            }
            _ => {}
        }

        if self.focus == Focus::Preview {
            return self.handle_preview_key(key);
        }
        match self.list_tab() {
            Tab::Diff => self.handle_diff_key(key),
            Tab::Tasks => self.handle_tasks_key(key),
            _ => self.handle_tree_key(key),
        }
    }

    fn handle_tree_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let page = self.layout.list_rows().max(1) as isize;
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => self.tree.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.tree.move_cursor(-1),
            KeyCode::PageDown => self.tree.move_cursor(page),
            KeyCode::PageUp => self.tree.move_cursor(-page),
            KeyCode::Home | KeyCode::Char('g') => self.tree.set_cursor(0),
            KeyCode::End | KeyCode::Char('G') => self.tree.set_cursor(usize::MAX),
            KeyCode::Left | KeyCode::Char('h') => self.tree.collapse_or_parent(),
            KeyCode::Char(' ') => {
                if let Some(path) = self.tree.selected_path().map(Path::to_path_buf) {
                    self.tree.toggle_expand(&path);
                    return self.sync_watch_dirs();
                }
            }
            KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => return self.activate_tree_row(),
            _ => {}
        }
        Vec::new()
    }

    fn activate_tree_row(&mut self) -> Vec<Command> {
        let Some(node) = self.tree.selected() else {
            return Vec::new();
        };
        let path = node.path.clone();
        if node.is_dir {
            self.tree.toggle_expand(&path);
            return self.sync_watch_dirs();
        }
        self.open_path(path)
    }

    fn sync_watch_dirs(&mut self) -> Vec<Command> {
        if let Some(watch) = self.watch.as_mut() {
            watch.sync_dirs(&self.tree.watch_dirs());
        }
        Vec::new()
    }

    fn handle_diff_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => self.diff.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.diff.move_cursor(-1),
            KeyCode::PageDown => self.diff.move_cursor(self.layout.list_rows() as isize),
            KeyCode::PageUp => self.diff.move_cursor(-(self.layout.list_rows() as isize)),
            KeyCode::Char('m') => {
                self.diff.mode = self.diff.mode.next();
                self.diff.shown = None;
                self.diff.text.clear();
                self.set_status(format!("diff mode: {}", self.diff.mode.label()));
            }
            KeyCode::Char('s') => {
                self.diff.spec_only = !self.diff.spec_only;
                self.set_status(format!(
                    "spec files only: {}",
                    if self.diff.spec_only { "on" } else { "off" }
                ));
                return vec![self.list_changes_cmd()];
            }
            KeyCode::Char('o') => {
                let Some(item) = self.diff.selected() else {
                    return Vec::new();
                };
                let path = self.root.join(&item.path);
                self.tree.select_path(&path);
                let mut cmds = self.switch_tab(Tab::Explorer);
                cmds.extend(self.open_path(path));
                return cmds;
            }
            KeyCode::Enter => return self.request_diff(true),
            _ => return Vec::new(),
        }
        self.request_diff(false)
    }

    fn handle_tasks_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let len = self.tasks.view.len();
        let field = match key.code {
            KeyCode::Char('s') => Some(FilterField::Status),
            KeyCode::Char('o') => Some(FilterField::Owner),
            KeyCode::Char('p') => Some(FilterField::Priority),
            _ => None,
        };
        if let Some(field) = field {
            self.tasks.filter.cycle(field, &self.tasks.items);
            self.refilter_tasks();
            return self.refresh_preview();
        }
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                self.tasks.cursor = (self.tasks.cursor + 1).min(len.saturating_sub(1));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.tasks.cursor = self.tasks.cursor.saturating_sub(1);
            }
            KeyCode::Home | KeyCode::Char('g') => self.tasks.cursor = 0,
            KeyCode::End | KeyCode::Char('G') => self.tasks.cursor = len.saturating_sub(1),
            KeyCode::Char('/') => {
                self.focus = Focus::Input;
                self.input_mode = InputMode::Search;
                self.input = self.tasks.filter.search.clone();
                return Vec::new();
            }
            KeyCode::Char('x') => {
                self.tasks.filter = TaskFilter::default();
                self.refilter_tasks();
            }
            KeyCode::Char('d') => {
                self.tasks.follow_doc = !self.tasks.follow_doc;
                self.refilter_tasks();
            }
            KeyCode::Enter => {
                self.focus = Focus::Preview;
            }
            _ => return Vec::new(),
        }
        self.refresh_preview()
    }

    fn handle_preview_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let page = self.layout.preview_grid().1.max(1);
        let delta: i32 = match key.code {
            KeyCode::Down | KeyCode::Char('j') => 1,
            KeyCode::Up | KeyCode::Char('k') => -1,
            KeyCode::PageDown | KeyCode::Char(' ') => page as i32,
            KeyCode::PageUp => -(page as i32),
            KeyCode::Home | KeyCode::Char('g') => i32::MIN / 2,
            KeyCode::End | KeyCode::Char('G') => i32::MAX / 2,
            _ => return Vec::new(),
        };
        self.scroll_preview(delta);
        Vec::new()
    }

    fn scroll_preview(&mut self, delta: i32) {
        let (text, scroll) = match self.tab {
            Tab::Diff => (&self.diff.text, &mut self.diff.scroll),
            Tab::Terminal => return,
            _ => (&self.preview.text, &mut self.preview.scroll),
        };
        let max = text.lines().count().saturating_sub(1) as i32;
        let next = (*scroll as i32).saturating_add(delta).clamp(0, max.max(0));
        *scroll = next.min(u16::MAX as i32) as u16;
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Esc => {
                if self.input_mode == InputMode::Search {
                    self.input_mode = InputMode::Command;
                }
                self.input.clear();
                self.focus = Focus::Files;
                Vec::new()
            }
            KeyCode::Enter => self.submit_input(),
            KeyCode::Backspace => {
                self.input.pop();
                self.on_input_edited()
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.input.push(ch);
                self.on_input_edited()
            }
            _ => Vec::new(),
        }
    }

    fn on_input_edited(&mut self) -> Vec<Command> {
        if self.input_mode != InputMode::Search {
            return Vec::new();
        }
        self.tasks.filter.search = self.input.clone();
        self.refilter_tasks();
        self.refresh_preview()
    }

    fn submit_input(&mut self) -> Vec<Command> {
        let line = std::mem::take(&mut self.input);
        if self.input_mode == InputMode::Search {
            self.input_mode = InputMode::Command;
            self.focus = Focus::Files;
            return Vec::new();
        }
        if self.tab == Tab::Terminal {
            if self.terminal.writer.is_none() {
                return self.ensure_terminal();
            }
            if line.is_empty() {
                return Vec::new();
            }
            let mut bytes = line.into_bytes();
            bytes.push(b'\r');
            self.write_pty(&bytes);
            return Vec::new();
        }
        let target = line.trim();
        if target.is_empty() {
            return Vec::new();
        }
        let path = self.root.join(target);
        if !self.tree.select_path(&path) {
            self.set_status(format!("not found: {target}"));
            return Vec::new();
        }
        self.focus = Focus::Files;
        let mut cmds = self.switch_tab(Tab::Explorer);
        if path.is_file() {
            cmds.extend(self.open_path(path));
        }
        cmds
    }

    // ----- mouse -----

    fn handle_mouse(&mut self, mouse: MouseEvent) -> Vec<Command> {
        let region = layout::hit_test(&self.layout, mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => match region {
                Some(Region::Tabs) => match layout::tab_at(&self.layout, mouse.column) {
                    Some(tab) => self.switch_tab(tab),
                    None => Vec::new(),
                },
                Some(Region::List) => {
                    self.focus = Focus::Files;
                    match self.layout.list_row_at(mouse.column, mouse.row) {
                        Some(row) => self.click_list_row(self.list_offset() + row),
                        None => Vec::new(),
                    }
                }
                Some(Region::Preview) => {
                    self.focus = Focus::Preview;
                    if self.tab == Tab::Terminal {
                        return self.ensure_terminal();
                    }
                    Vec::new()
                }
                Some(Region::Input) => {
                    self.focus = Focus::Input;
                    Vec::new()
                }
                _ => Vec::new(),
            },
            MouseEventKind::ScrollDown | MouseEventKind::ScrollUp => {
                let delta = if mouse.kind == MouseEventKind::ScrollDown { 3i32 } else { -3 };
                match region {
                    Some(Region::List) => {
                        match self.list_tab() {
                            Tab::Diff => {
                                self.diff.move_cursor(delta.signum() as isize);
                                return self.request_diff(false);
                            }
                            Tab::Tasks => {
                                let len = self.tasks.view.len();
                                let next = (self.tasks.cursor as isize + delta.signum() as isize)
                                    .clamp(0, len.saturating_sub(1) as isize);
                                self.tasks.cursor = next as usize;
                                return self.refresh_preview();
                            }
                            _ => self.tree.move_cursor(delta.signum() as isize),
                        }
                        Vec::new()
                    }
                    Some(Region::Preview) => {
                        self.scroll_preview(delta);
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    fn click_list_row(&mut self, row: usize) -> Vec<Command> {
        match self.list_tab() {
            Tab::Diff => {
                if self.diff.select_row(row) {
                    return self.request_diff(false);
                }
                Vec::new()
            }
            Tab::Tasks => {
                if row < self.tasks.view.len() {
                    self.tasks.cursor = row;
                    return self.refresh_preview();
                }
                Vec::new()
            }
            _ => {
                if row >= self.tree.rows().len() {
                    return Vec::new();
                }
                self.tree.set_cursor(row);
                self.activate_tree_row()
            }
        }
    }

    fn list_cursor_and_len(&self) -> (usize, usize) {
        match self.list_tab() {
            Tab::Diff => (self.diff.cursor, self.diff.rows.len()),
            Tab::Tasks => (self.tasks.cursor, self.tasks.view.len()),
            _ => (self.tree.cursor(), self.tree.rows().len()),
        }
    }

    /// Keeps the list cursor inside the visible window so clicks map to
    /// the rows that are actually drawn.
    fn sync_list_offset(&mut self) {
        let height = self.layout.list_rows().max(1);
        let (cursor, len) = self.list_cursor_and_len();
        let tab = self.list_tab().index();
        let slot = &mut self.list_offsets[tab];
        if cursor < *slot {
            *slot = cursor;
        } else if cursor >= *slot + height {
            *slot = cursor + 1 - height;
        }
        let max_offset = len.saturating_sub(height);
        if *slot > max_offset {
            *slot = max_offset;
        }
    }
}
