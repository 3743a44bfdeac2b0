//! Embedded shell: PTY session, byte filtering, VT emulation and key
//! translation.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};
use unicode_width::UnicodeWidthChar;

pub const READ_CHUNK: usize = 4096;
const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const INVERSE_ON: &str = "\x1b[7m";
const INVERSE_OFF: &str = "\x1b[27m";

pub type PtyReader = Box<dyn Read + Send>;
pub type PtyWriter = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("failed to open pty: {0}")]
    Open(String),
    #[error("failed to start {shell}: {message}")]
    Spawn { shell: String, message: String },
    #[error("pty resize failed: {0}")]
    Resize(String),
    #[error("pty write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// Drops OSC sequences (`ESC ]` ... `BEL` or `ESC \`) from a byte stream.
/// State survives across chunks, including an `ESC` that ends a chunk, so a
/// split stream filters exactly like the joined one.
#[derive(Debug, Default, Clone)]
pub struct OscFilter {
    in_osc: bool,
    held_esc: bool,
}

impl OscFilter {
    pub fn in_osc(&self) -> bool {
        self.in_osc
    }

    pub fn filter(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len());
        let mut after_esc = std::mem::take(&mut self.held_esc);
        for &byte in chunk {
            if self.in_osc {
                if after_esc {
                    after_esc = false;
                    if byte == b'\\' {
                        self.in_osc = false;
                        continue;
                    }
                }
                match byte {
                    BEL => self.in_osc = false,
                    ESC => after_esc = true,
                    _ => {}
                }
                continue;
            }
            if after_esc {
                after_esc = false;
                if byte == b']' {
                    self.in_osc = true;
                    continue;
                }
                out.push(ESC);
            }
            if byte == ESC {
                after_esc = true;
                continue;
            }
            out.push(byte);
        }
        self.held_esc = after_esc;
        out
    }
}

/// Highlights display column `col` of an ANSI-formatted line with inverse
/// video, padding with spaces when the cursor sits past the content.
pub fn overlay_cursor(line: &str, col: usize) -> String {
    let mut out = String::with_capacity(line.len() + 16);
    let mut visible = 0usize;
    let mut chars = line.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch == '\x1b' {
            let mut end = start + ch.len_utf8();
            let kind = chars.peek().map(|(_, next)| *next);
            if let Some(kind @ ('[' | ']' | '(' | ')' | 'P')) = kind {
                let (idx, _) = chars.next().unwrap_or((end, kind));
                end = idx + 1;
                let mut prev_esc = false;
                for (idx, next) in chars.by_ref() {
                    end = idx + next.len_utf8();
                    if kind == ']' {
                        if next == '\x07' || (next == '\\' && prev_esc) {
                            break;
                        }
                        prev_esc = next == '\x1b';
                        continue;
                    }
                    if ('\x40'..='\x7e').contains(&next) {
                        break;
                    }
                }
            }
            out.push_str(&line[start..end]);
            continue;
        }
        let width = ch.width().unwrap_or(0).max(1);
        // a wide glyph owns both of its cells
        if (visible..visible + width).contains(&col) {
            out.push_str(INVERSE_ON);
            out.push(ch);
            out.push_str(INVERSE_OFF);
        } else {
            out.push(ch);
        }
        visible += width;
    }
    if col >= visible {
        out.push_str(&" ".repeat(col - visible));
        out.push_str(INVERSE_ON);
        out.push(' ');
        out.push_str(INVERSE_OFF);
    }
    out
}

/// Bytes a terminal would send for a key press. Returns `None` for keys
/// with no PTY meaning.
pub fn key_to_bytes(key: &KeyEvent) -> Option<Vec<u8>> {
    let bytes: Vec<u8> = match key.code {
        KeyCode::Char(ch) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            vec![control_byte(ch)?]
        }
        KeyCode::Char(ch) => {
            let mut buf = [0u8; 4];
            let encoded = ch.encode_utf8(&mut buf).as_bytes().to_vec();
            if key.modifiers.contains(KeyModifiers::ALT) {
                let mut out = vec![ESC];
                out.extend(encoded);
                out
            } else {
                encoded
            }
        }
        KeyCode::Enter => b"\r".to_vec(),
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => b"\t".to_vec(),
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Esc => vec![ESC],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::F(n) => function_key(n)?.as_bytes().to_vec(),
        _ => return None,
    };
    Some(bytes)
}

fn control_byte(ch: char) -> Option<u8> {
    match ch {
        'a'..='z' => Some(ch as u8 - b'a' + 1),
        'A'..='Z' => Some(ch as u8 - b'A' + 1),
        ' ' | '@' | '2' => Some(0),
        '[' | '3' => Some(ESC),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '7' | '/' => Some(0x1f),
        '8' | '?' => Some(0x7f),
        _ => None,
    }
}

fn function_key(n: u8) -> Option<&'static str> {
    let seq = match n {
        1 => "\x1bOP",
        2 => "\x1bOQ",
        3 => "\x1bOR",
        4 => "\x1bOS",
        5 => "\x1b[15~",
        6 => "\x1b[17~",
        7 => "\x1b[18~",
        8 => "\x1b[19~",
        9 => "\x1b[20~",
        10 => "\x1b[21~",
        11 => "\x1b[23~",
        12 => "\x1b[24~",
        _ => return None,
    };
    Some(seq)
}

/// VT emulator state for the terminal pane. Output is filtered for OSC
/// sequences before it reaches the emulator.
pub struct TerminalScreen {
    parser: vt100::Parser,
    filter: OscFilter,
    rows: u16,
    cols: u16,
    dirty: bool,
}

impl TerminalScreen {
    pub fn new(rows: u16, cols: u16) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            parser: vt100::Parser::new(rows, cols, 0),
            filter: OscFilter::default(),
            rows,
            cols,
            dirty: true,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        let filtered = self.filter.filter(chunk);
        if filtered.is_empty() {
            return;
        }
        self.parser.process(&filtered);
        self.dirty = true;
    }

    pub fn size(&self) -> (u16, u16) {
        (self.rows, self.cols)
    }

    pub fn resize(&mut self, rows: u16, cols: u16) -> bool {
        let rows = rows.max(1);
        let cols = cols.max(1);
        if (rows, cols) == (self.rows, self.cols) {
            return false;
        }
        self.parser.set_size(rows, cols);
        self.rows = rows;
        self.cols = cols;
        self.dirty = true;
        true
    }

    pub fn cursor(&self) -> (u16, u16) {
        self.parser.screen().cursor_position()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Formatted screen rows; with `show_cursor` the cursor cell is drawn
    /// in inverse video.
    pub fn lines(&self, show_cursor: bool) -> Vec<String> {
        let screen = self.parser.screen();
        let (cursor_row, cursor_col) = screen.cursor_position();
        screen
            .rows_formatted(0, self.cols)
            .enumerate()
            .map(|(idx, row)| {
                let line = String::from_utf8_lossy(&row).to_string();
                if show_cursor && !screen.hide_cursor() && idx == cursor_row as usize {
                    overlay_cursor(&line, cursor_col as usize)
                } else {
                    line
                }
            })
            .collect()
    }

    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }
}

/// Live shell under a PTY. Dropping it kills and reaps the child and closes
/// the master, which ends any pending read with EOF.
pub struct TerminalSession {
    master: Box<dyn MasterPty + Send>,
    child: Option<Box<dyn Child + Send + Sync>>,
    writer: PtyWriter,
    reader: Option<PtyReader>,
    shell: String,
}

impl TerminalSession {
    pub fn spawn(cwd: &Path, cols: u16, rows: u16) -> Result<Self, TerminalError> {
        let shell = resolve_shell();
        let pair = native_pty_system()
            .openpty(pty_size(cols, rows))
            .map_err(|err| TerminalError::Open(err.to_string()))?;

        let mut builder = CommandBuilder::new(&shell);
        builder.arg("-l");
        builder.env("TERM", "xterm-256color");
        builder.cwd(cwd);

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|err| TerminalError::Spawn {
                shell: shell.clone(),
                message: err.to_string(),
            })?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| TerminalError::Open(err.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| TerminalError::Open(err.to_string()))?;
        info!(shell = %shell, cols, rows, "terminal_started");

        Ok(Self {
            master: pair.master,
            child: Some(child),
            writer: Arc::new(Mutex::new(writer)),
            reader: Some(reader),
            shell,
        })
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// The reader is handed out once; reads then cycle through the event loop.
    pub fn take_reader(&mut self) -> Option<PtyReader> {
        self.reader.take()
    }

    pub fn writer(&self) -> PtyWriter {
        Arc::clone(&self.writer)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        self.master
            .resize(pty_size(cols, rows))
            .map_err(|err| TerminalError::Resize(err.to_string()))
    }

    /// Current PTY grid as `(cols, rows)`.
    pub fn size(&self) -> Result<(u16, u16), TerminalError> {
        self.master
            .get_size()
            .map(|size| (size.cols, size.rows))
            .map_err(|err| TerminalError::Resize(err.to_string()))
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(err) = child.kill() {
            debug!(error = %err, "terminal_kill_failed");
        }
        match child.try_wait() {
            Ok(Some(_)) => {}
            // the signal may not have landed yet; reap off the UI thread
            _ => {
                std::thread::spawn(move || {
                    if let Err(err) = child.wait() {
                        debug!(error = %err, "terminal_reap_failed");
                    }
                });
            }
        }
    }
}

pub enum ReadOutcome {
    Data(PtyReader, Vec<u8>),
    Closed,
}

/// One bounded blocking read. EOF and errors both end the session.
pub fn read_chunk(mut reader: PtyReader) -> ReadOutcome {
    let mut buf = vec![0u8; READ_CHUNK];
    match reader.read(&mut buf) {
        Ok(0) | Err(_) => ReadOutcome::Closed,
        Ok(count) => {
            buf.truncate(count);
            ReadOutcome::Data(reader, buf)
        }
    }
}

pub fn write_bytes(writer: &PtyWriter, bytes: &[u8]) -> Result<(), TerminalError> {
    let mut guard = writer
        .lock()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "pty writer poisoned"))?;
    guard.write_all(bytes)?;
    guard.flush()?;
    Ok(())
}

pub fn resolve_shell() -> String {
    if let Ok(shell) = std::env::var("SHELL") {
        if !shell.trim().is_empty() {
            return shell;
        }
    }
    if crate::diff::which_cmd("bash").is_some() {
        return "bash".to_string();
    }
    "sh".to_string()
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows: rows.max(1),
        cols: cols.max(1),
        pixel_width: 0,
        pixel_height: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::strip_ansi;

    const STREAM: &[u8] = b"before\x1b]11;rgb:0000/0000/0000\x07mid\x1b]0;title\x1b\\after\x1b[1mbold";

    fn filter_split(at: &[usize]) -> Vec<u8> {
        let mut filter = OscFilter::default();
        let mut out = Vec::new();
        let mut start = 0;
        for &cut in at {
            out.extend(filter.filter(&STREAM[start..cut]));
            start = cut;
        }
        out.extend(filter.filter(&STREAM[start..]));
        out
    }

    #[test]
    fn strips_osc_and_keeps_other_escapes() {
        let out = OscFilter::default().filter(STREAM);
        assert_eq!(out, b"beforemidafter\x1b[1mbold".to_vec());
    }

    #[test]
    fn every_split_point_matches_the_unsplit_stream() {
        let expected = filter_split(&[]);
        for cut in 1..STREAM.len() {
            assert_eq!(filter_split(&[cut]), expected, "split at {cut}");
        }
        for first in 1..STREAM.len() {
            for second in first..STREAM.len() {
                assert_eq!(filter_split(&[first, second]), expected);
            }
        }
    }

    #[test]
    fn pending_state_spans_chunks() {
        let mut filter = OscFilter::default();
        assert_eq!(filter.filter(b"ab\x1b]2;long title"), b"ab".to_vec());
        assert!(filter.in_osc());
        assert_eq!(filter.filter(b" still title"), Vec::<u8>::new());
        assert_eq!(filter.filter(b"\x07cd"), b"cd".to_vec());
        assert!(!filter.in_osc());
        assert_eq!(filter.filter(b"x\x1b"), b"x".to_vec());
        assert_eq!(filter.filter(b"[A"), b"\x1b[A".to_vec());
    }

    #[test]
    fn cursor_overlay_inverts_the_right_cell() {
        let line = "\x1b[31mab\x1b[0mcd";
        let out = overlay_cursor(line, 1);
        assert_eq!(out, "\x1b[31ma\x1b[7mb\x1b[27m\x1b[0mcd");
        assert_eq!(strip_ansi(&out), "abcd");

        let padded = overlay_cursor("ab", 4);
        assert_eq!(padded, "ab  \x1b[7m \x1b[27m");

        let wide = overlay_cursor("日x", 2);
        assert_eq!(wide, "日\x1b[7mx\x1b[27m");

        // cursor on the trailing cell of a wide glyph
        let inside = overlay_cursor("a日x", 2);
        assert_eq!(inside, "a\x1b[7m日\x1b[27mx");
        assert_eq!(strip_ansi(&inside), "a日x");
    }

    #[test]
    fn keys_translate_to_terminal_bytes() {
        let key = |code, modifiers| KeyEvent::new(code, modifiers);
        assert_eq!(key_to_bytes(&key(KeyCode::Char('a'), KeyModifiers::NONE)), Some(b"a".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::Char('é'), KeyModifiers::NONE)), Some("é".as_bytes().to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::Enter, KeyModifiers::NONE)), Some(b"\r".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::Backspace, KeyModifiers::NONE)), Some(vec![0x7f]));
        assert_eq!(key_to_bytes(&key(KeyCode::Tab, KeyModifiers::NONE)), Some(b"\t".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::Up, KeyModifiers::NONE)), Some(b"\x1b[A".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::End, KeyModifiers::NONE)), Some(b"\x1b[F".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::PageDown, KeyModifiers::NONE)), Some(b"\x1b[6~".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)), Some(vec![0x03]));
        assert_eq!(key_to_bytes(&key(KeyCode::Char('l'), KeyModifiers::CONTROL)), Some(vec![0x0c]));
        assert_eq!(key_to_bytes(&key(KeyCode::Char('b'), KeyModifiers::ALT)), Some(b"\x1bb".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::F(5), KeyModifiers::NONE)), Some(b"\x1b[15~".to_vec()));
        assert_eq!(key_to_bytes(&key(KeyCode::F(30), KeyModifiers::NONE)), None);
        assert_eq!(key_to_bytes(&key(KeyCode::CapsLock, KeyModifiers::NONE)), None);
    }

    #[test]
    fn screen_tracks_output_and_cursor() {
        let mut screen = TerminalScreen::new(4, 20);
        screen.feed(b"hello\x1b]0;title\x07\r\nworld");
        assert!(screen.take_dirty());
        assert!(!screen.is_dirty());
        assert_eq!(screen.cursor(), (1, 5));
        let lines = screen.lines(true);
        assert_eq!(lines.len(), 4);
        assert!(strip_ansi(&lines[0]).starts_with("hello"));
        assert!(lines[1].contains(INVERSE_ON));
        assert!(!screen.contents().contains("title"));

        assert!(screen.resize(6, 30));
        assert!(!screen.resize(6, 30));
        assert_eq!(screen.size(), (6, 30));
        assert_eq!(screen.lines(false).len(), 6);
    }

    #[test]
    fn session_resize_reaches_the_pty() {
        let dir = tempfile::tempdir().expect("tempdir");
        // sandboxes without a pty device cannot run this
        let Ok(session) = TerminalSession::spawn(dir.path(), 80, 24) else {
            return;
        };
        assert_eq!(session.size().expect("size"), (80, 24));
        session.resize(100, 30).expect("resize");
        assert_eq!(session.size().expect("size"), (100, 30));

        let writer = session.writer();
        write_bytes(&writer, b"exit\r").expect("write");
        drop(session);
    }
}
