use crate::layout::Tab;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub initial_tab: Tab,
    pub open: Option<PathBuf>,
    pub fast_render: bool,
    pub live_watch: bool,
    pub use_delta: bool,
}

impl Config {
    /// Defaults for a root without consulting the environment.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            initial_tab: Tab::Explorer,
            open: None,
            fast_render: false,
            live_watch: true,
            use_delta: true,
        }
    }
}

pub fn load_config() -> Config {
    let root = resolve_root();
    let open = resolve_open(&root);
    Config {
        initial_tab: resolve_initial_tab(),
        open,
        fast_render: resolve_flag("CODECTL_SPECUI_FAST", false),
        live_watch: resolve_flag("CODECTL_SPECUI_WATCH", true),
        use_delta: resolve_flag("CODECTL_SPECUI_DELTA", true),
        root,
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn resolve_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(default)
}

fn resolve_initial_tab() -> Tab {
    std::env::var("CODECTL_SPECUI_TAB")
        .ok()
        .and_then(|value| Tab::parse(&value))
        .unwrap_or(Tab::Explorer)
}

fn resolve_open(root: &Path) -> Option<PathBuf> {
    let value = std::env::var("CODECTL_SPECUI_OPEN").ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let path = PathBuf::from(trimmed);
    if path.is_absolute() {
        Some(path)
    } else {
        Some(root.join(path))
    }
}

fn resolve_root() -> PathBuf {
    if let Ok(value) = std::env::var("CODECTL_ROOT") {
        if !value.trim().is_empty() {
            return PathBuf::from(value.trim());
        }
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    git_toplevel(&cwd).unwrap_or(cwd)
}

fn git_toplevel(cwd: &Path) -> Option<PathBuf> {
    let output = Command::new("git")
        .arg("-C")
        .arg(cwd)
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let top = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if top.is_empty() {
        None
    } else {
        Some(PathBuf::from(top))
    }
}
