//! ANSI-styled text to ratatui lines. The text is replayed through a vt100
//! screen sized to fit it and the cells are read back as styled spans.

use crate::render::strip_ansi;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use unicode_width::UnicodeWidthStr;

const MAX_COLS: usize = 512;
const TAB: &str = "    ";

/// Styled lines `skip..skip + take` of `text`. Lines wider than the
/// emulator limit wrap onto extra rows.
pub fn to_text(text: &str, skip: usize, take: usize) -> Text<'static> {
    // nothing past `take` wrapped rows of a line can be shown
    let byte_cap = take.max(1) * MAX_COLS * 4;
    let window: Vec<String> = text
        .lines()
        .skip(skip)
        .take(take)
        .map(|line| clip(line, byte_cap).replace('\t', TAB))
        .collect();
    if window.is_empty() {
        return Text::default();
    }
    let widths: Vec<usize> = window
        .iter()
        .map(|line| UnicodeWidthStr::width(strip_ansi(line).as_str()))
        .collect();
    let cols = widths.iter().copied().max().unwrap_or(1).clamp(1, MAX_COLS);
    // one spare row per line absorbs early wraps before wide glyphs
    let rows: usize = widths.iter().map(|width| width / cols + 1).sum();
    let rows = rows.min(u16::MAX as usize) as u16;

    let mut parser = vt100::Parser::new(rows, cols as u16, 0);
    parser.process(window.join("\r\n").as_bytes());
    let mut lines = screen_lines(parser.screen());
    while lines.last().map_or(false, |line| line.spans.is_empty()) {
        lines.pop();
    }
    lines.truncate(take);
    Text::from(lines)
}

fn clip(line: &str, max_bytes: usize) -> &str {
    if line.len() <= max_bytes {
        return line;
    }
    let mut end = max_bytes;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

/// One line per screen row, trailing blank cells dropped.
pub fn screen_lines(screen: &vt100::Screen) -> Vec<Line<'static>> {
    let (rows, cols) = screen.size();
    (0..rows)
        .map(|row| {
            let end = (0..cols)
                .rev()
                .find(|col| screen.cell(row, *col).map_or(false, is_visible))
                .map_or(0, |col| col + 1);
            let mut spans: Vec<Span<'static>> = Vec::new();
            let mut run = String::new();
            let mut run_style = Style::default();
            for col in 0..end {
                let Some(cell) = screen.cell(row, col) else {
                    continue;
                };
                if cell.is_wide_continuation() {
                    continue;
                }
                let style = cell_style(cell);
                if style != run_style && !run.is_empty() {
                    spans.push(Span::styled(std::mem::take(&mut run), run_style));
                }
                run_style = style;
                if cell.has_contents() {
                    run.push_str(&cell.contents());
                } else {
                    run.push(' ');
                }
            }
            if !run.is_empty() {
                spans.push(Span::styled(run, run_style));
            }
            Line::from(spans)
        })
        .collect()
}

fn is_visible(cell: &vt100::Cell) -> bool {
    cell.has_contents() || cell.inverse() || cell.bgcolor() != vt100::Color::Default
}

fn cell_style(cell: &vt100::Cell) -> Style {
    let mut style = Style::default();
    let fg = vt_color(cell.fgcolor());
    let bg = vt_color(cell.bgcolor());
    if let Some(fg) = fg {
        style = style.fg(fg);
    }
    if let Some(bg) = bg {
        style = style.bg(bg);
    }
    if cell.bold() {
        style = style.add_modifier(Modifier::BOLD);
    }
    if cell.italic() {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if cell.underline() {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if cell.inverse() {
        style = style.add_modifier(Modifier::REVERSED);
    }
    style
}

fn vt_color(color: vt100::Color) -> Option<Color> {
    let color = match color {
        vt100::Color::Default => return None,
        vt100::Color::Idx(idx) => match idx {
            0 => Color::Black,
            1 => Color::Red,
            2 => Color::Green,
            3 => Color::Yellow,
            4 => Color::Blue,
            5 => Color::Magenta,
            6 => Color::Cyan,
            7 => Color::Gray,
            8 => Color::DarkGray,
            9 => Color::LightRed,
            10 => Color::LightGreen,
            11 => Color::LightYellow,
            12 => Color::LightBlue,
            13 => Color::LightMagenta,
            14 => Color::LightCyan,
            15 => Color::White,
            other => Color::Indexed(other),
        },
        vt100::Color::Rgb(r, g, b) => Color::Rgb(r, g, b),
    };
    Some(color)
}
