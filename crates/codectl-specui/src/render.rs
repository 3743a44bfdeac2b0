//! Document rendering for the preview pane and the per-width render cache.

use codectl_core::frontmatter;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Documents at or above this size skip markdown formatting.
pub const FAST_THRESHOLD: u64 = 64 * 1024;
pub const GUTTER: u16 = 2;
pub const MIN_WRAP: u16 = 10;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const STRIKE: &str = "\x1b[9m";
const LINK: &str = "\x1b[4;34m";
const CODE: &str = "\x1b[33m";
const CODE_BLOCK: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const QUOTE: &str = "\x1b[2;37m";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub path: PathBuf,
    pub width: u16,
    pub fast: bool,
    pub text: String,
    pub mtime: Option<SystemTime>,
    pub size: u64,
}

impl Rendered {
    /// True while the file still has the stat this render was taken from.
    pub fn matches_disk(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|meta| meta.modified().ok() == self.mtime && meta.len() == self.size)
            .unwrap_or(false)
    }
}

pub fn wrap_width(width: u16) -> usize {
    width.saturating_sub(GUTTER).max(MIN_WRAP) as usize
}

pub fn is_markdown(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".md") || name.ends_with(".mdx") || name.ends_with(".markdown")
}

/// Reads and formats a document. `fast` on the result records whether the
/// caller asked for raw output, so cache hits respect the toggle.
pub fn render_document(path: &Path, width: u16, force_fast: bool) -> Result<Rendered, RenderError> {
    let io_err = |source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };
    let meta = std::fs::metadata(path).map_err(io_err)?;
    let bytes = std::fs::read(path).map_err(io_err)?;
    let size = meta.len();

    let text = if bytes.contains(&0) {
        format!("(binary file, {size} bytes)")
    } else {
        let source = String::from_utf8_lossy(&bytes);
        if !is_markdown(path) {
            source.trim_end().to_string()
        } else {
            let body = frontmatter::strip(&source);
            if force_fast || size >= FAST_THRESHOLD {
                body.trim().to_string()
            } else {
                format_markdown(body, wrap_width(width))
            }
        }
    };

    Ok(Rendered {
        path: path.to_path_buf(),
        width,
        fast: force_fast,
        text,
        mtime: meta.modified().ok(),
        size,
    })
}

#[derive(Debug, Clone)]
struct CacheEntry {
    text: String,
    mtime: Option<SystemTime>,
    size: u64,
    fast: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Rendered output keyed by path then width. An entry is only served while
/// a fresh stat reports the same mtime and size.
#[derive(Debug, Default)]
pub struct RenderCache {
    entries: HashMap<PathBuf, HashMap<u16, CacheEntry>>,
    stats: CacheStats,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&mut self, path: &Path, width: u16, fast: bool) -> Option<&str> {
        let fresh = std::fs::metadata(path)
            .ok()
            .map(|meta| (meta.modified().ok(), meta.len()));
        let valid = match (self.entries.get(path).and_then(|by_width| by_width.get(&width)), fresh) {
            (Some(entry), Some((mtime, size))) => {
                entry.fast == fast && entry.mtime == mtime && entry.size == size
            }
            _ => false,
        };
        if !valid {
            self.stats.misses += 1;
            return None;
        }
        self.stats.hits += 1;
        self.entries
            .get(path)
            .and_then(|by_width| by_width.get(&width))
            .map(|entry| entry.text.as_str())
    }

    pub fn insert(&mut self, rendered: &Rendered) {
        self.entries
            .entry(rendered.path.clone())
            .or_default()
            .insert(
                rendered.width,
                CacheEntry {
                    text: rendered.text.clone(),
                    mtime: rendered.mtime,
                    size: rendered.size,
                    fast: rendered.fast,
                },
            );
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn widths(&self, path: &Path) -> Vec<u16> {
        let mut widths: Vec<u16> = self
            .entries
            .get(path)
            .map(|by_width| by_width.keys().copied().collect())
            .unwrap_or_default();
        widths.sort_unstable();
        widths
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Formats markdown into ANSI-styled text wrapped at `width` columns.
pub fn format_markdown(source: &str, width: usize) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut writer = AnsiWriter::new(width.max(MIN_WRAP as usize));
    for event in Parser::new_ext(source, options) {
        match event {
            Event::Start(tag) => writer.start(tag),
            Event::End(tag) => writer.end(tag),
            Event::Text(text) => writer.text(&text),
            Event::Code(code) => writer.inline_code(&code),
            Event::Html(html) | Event::InlineHtml(html) => writer.text(&html),
            Event::SoftBreak => writer.text(" "),
            Event::HardBreak => writer.flush(),
            Event::Rule => writer.rule(),
            Event::TaskListMarker(done) => writer.text(if done { "[x] " } else { "[ ] " }),
            _ => {}
        }
    }
    writer.finish()
}

struct ListState {
    next: Option<u64>,
}

struct AnsiWriter {
    width: usize,
    lines: Vec<String>,
    buf: String,
    styles: Vec<&'static str>,
    lists: Vec<ListState>,
    marker: Option<String>,
    quote_depth: usize,
    code: Option<String>,
    link: Option<(String, usize)>,
    cell: Vec<String>,
}

impl AnsiWriter {
    fn new(width: usize) -> Self {
        Self {
            width,
            lines: Vec::new(),
            buf: String::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            marker: None,
            quote_depth: 0,
            code: None,
            link: None,
            cell: Vec::new(),
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                self.push_style("\x1b[1;36m");
                let hashes = "#".repeat(heading_rank(level));
                self.buf.push_str(&hashes);
                self.buf.push(' ');
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
                self.push_style(QUOTE);
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some(lang);
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(ListState { next: start });
            }
            Tag::Item => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(ListState { next: Some(n) }) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.marker = Some(marker);
            }
            Tag::Emphasis => self.push_style(ITALIC),
            Tag::Strong => self.push_style(BOLD),
            Tag::Strikethrough => self.push_style(STRIKE),
            Tag::Link { dest_url, .. } => {
                self.link = Some((dest_url.to_string(), self.buf.len()));
                self.push_style(LINK);
            }
            Tag::TableRow | Tag::TableHead => self.cell.clear(),
            Tag::TableCell => self.cell.push(String::new()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Heading(_) => {
                self.pop_style();
                self.flush();
                self.blank();
            }
            TagEnd::BlockQuote => {
                self.flush();
                self.pop_style();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank();
            }
            TagEnd::CodeBlock => {
                self.code = None;
                self.blank();
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => {
                self.flush();
                self.marker = None;
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                if let Some((url, start)) = self.link.take() {
                    let label = strip_ansi(self.buf.get(start..).unwrap_or(""));
                    if !url.is_empty() && label.trim() != url {
                        self.buf.push_str(&format!(" {DIM}({url}){RESET}"));
                        self.reapply();
                    }
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                let row = format!("| {} |", self.cell.join(" | "));
                self.cell.clear();
                let is_head = matches!(tag, TagEnd::TableHead);
                if is_head {
                    self.buf.push_str(BOLD);
                }
                self.buf.push_str(&row);
                if is_head {
                    self.buf.push_str(RESET);
                }
                self.emit_raw_line();
            }
            TagEnd::Table => self.blank(),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.code.is_some() {
            for line in text.lines() {
                let mut out = self.prefix();
                out.push_str("  ");
                out.push_str(CODE_BLOCK);
                out.push_str(line);
                out.push_str(RESET);
                self.lines.push(out);
            }
            return;
        }
        if let Some(cell) = self.cell.last_mut() {
            cell.push_str(text);
            return;
        }
        self.buf.push_str(text);
    }

    fn inline_code(&mut self, code: &str) {
        if let Some(cell) = self.cell.last_mut() {
            cell.push_str(code);
            return;
        }
        self.buf.push_str(CODE);
        self.buf.push_str(code);
        self.buf.push_str(RESET);
        self.reapply();
    }

    fn rule(&mut self) {
        self.flush();
        let mut line = self.prefix();
        line.push_str(DIM);
        line.push_str(&"─".repeat(self.width));
        line.push_str(RESET);
        self.lines.push(line);
        self.blank();
    }

    fn push_style(&mut self, style: &'static str) {
        self.styles.push(style);
        self.buf.push_str(style);
    }

    fn pop_style(&mut self) {
        self.styles.pop();
        self.buf.push_str(RESET);
        self.reapply();
    }

    fn reapply(&mut self) {
        for style in &self.styles {
            self.buf.push_str(style);
        }
    }

    fn prefix(&self) -> String {
        let mut prefix = String::new();
        for _ in 0..self.quote_depth {
            prefix.push_str("│ ");
        }
        if !self.lists.is_empty() {
            prefix.push_str(&"  ".repeat(self.lists.len() - 1));
        }
        prefix
    }

    /// Wraps the pending inline buffer and moves it to the output.
    fn flush(&mut self) {
        if strip_ansi(&self.buf).trim().is_empty() {
            self.buf.clear();
            self.reapply();
            return;
        }
        let base = self.prefix();
        let (first, rest) = match self.marker.take() {
            Some(marker) => {
                let indent = format!("{base}{}", " ".repeat(marker.chars().count()));
                (format!("{base}{marker}"), indent)
            }
            None if !self.lists.is_empty() => {
                let indent = format!("{base}  ");
                (indent.clone(), indent)
            }
            None => (base.clone(), base),
        };
        let options = textwrap::Options::new(self.width)
            .initial_indent(&first)
            .subsequent_indent(&rest);
        let content = std::mem::take(&mut self.buf);
        for line in textwrap::wrap(content.trim(), options) {
            let mut line = line.into_owned();
            line.push_str(RESET);
            self.lines.push(line);
        }
        self.reapply();
    }

    fn emit_raw_line(&mut self) {
        let mut line = self.prefix();
        line.push_str(&std::mem::take(&mut self.buf));
        self.lines.push(line);
    }

    fn blank(&mut self) {
        if self.lines.last().map_or(false, |line| !line.is_empty()) {
            self.lines.push(String::new());
        }
    }

    fn finish(mut self) -> String {
        self.flush();
        while self.lines.last().map_or(false, String::is_empty) {
            self.lines.pop();
        }
        self.lines.join("\n")
    }
}

fn heading_rank(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Removes SGR/CSI sequences, leaving the visible text.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if ('@'..='~').contains(&next) {
                    break;
                }
            }
            continue;
        }
        out.push(ch);
    }
    out
}
