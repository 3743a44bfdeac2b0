use crate::ansi;
use crate::app::{App, InputMode, TerminalStatus};
use crate::diff::{ChangeRow, NO_DIFF_HINT};
use crate::layout::{self, Focus, Region, Tab};
use crate::theme::{self, icons};
use codectl_core::rel_slash;
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table},
    Frame,
};

pub fn render(f: &mut Frame, app: &mut App) {
    let layout = app.layout;
    render_tabs(f, app, layout.tabs);
    match app.tab {
        Tab::Diff => render_changes(f, app, layout.list),
        Tab::Tasks => render_tasks(f, app, layout.list),
        Tab::Explorer | Tab::Terminal => render_tree(f, app, layout.list),
    }
    match app.tab {
        Tab::Explorer | Tab::Tasks => render_document(f, app, layout.preview),
        Tab::Diff => render_diff(f, app, layout.preview),
        Tab::Terminal => render_terminal(f, app, layout.preview),
    }
    render_input(f, app, layout.input);
    render_status(f, app, layout.status);
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(theme::border_style(focused))
}

fn hint(message: &str) -> Paragraph<'static> {
    Paragraph::new(Text::styled(
        message.to_string(),
        Style::default().fg(theme::MUTED),
    ))
}

fn render_tabs(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();
    for (idx, tab) in Tab::ALL.into_iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled(layout::tab_separator(), Style::default().fg(theme::MUTED)));
        }
        let style = if tab == app.tab {
            theme::ACTIVE_TAB_STYLE
        } else {
            Style::default()
        };
        spans.push(Span::styled(tab.label(), style));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_tree(f: &mut Frame, app: &App, area: Rect) {
    let block = pane_block(" Files ".to_string(), app.is_focused(Region::List));
    let height = app.layout.list_rows();
    let offset = app.list_offset();
    let items: Vec<ListItem> = app
        .tree
        .rows()
        .iter()
        .enumerate()
        .skip(offset)
        .take(height)
        .map(|(row_idx, row)| {
            let node = app.tree.node(row.node);
            let icon = if !node.is_dir {
                icons::FILE
            } else if app.tree.is_expanded(&node.path) {
                icons::EXPANDED
            } else {
                icons::COLLAPSED
            };
            let name_style = if node.is_dir {
                Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD)
            } else if app.open.as_deref() == Some(node.path.as_path()) {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            let line = Line::from(vec![
                Span::raw("  ".repeat(row.depth)),
                Span::styled(format!("{icon} "), Color::Blue),
                Span::styled(node.name.clone(), name_style),
            ]);
            let style = if row_idx == app.tree.cursor() {
                theme::SELECTED_STYLE
            } else {
                theme::zebra_row_style(row_idx)
            };
            ListItem::new(line).style(style)
        })
        .collect();
    f.render_widget(List::new(items).block(block), area);
}

fn render_changes(f: &mut Frame, app: &App, area: Rect) {
    let diff = &app.diff;
    let mut title = format!(" Changes [{}]", diff.mode.label());
    if diff.spec_only {
        title.push_str(" spec");
    }
    title.push(' ');
    let block = pane_block(title, app.is_focused(Region::List));
    if let Some(err) = &diff.error {
        let inner = block.inner(area);
        f.render_widget(block, area);
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(err.clone(), theme::ERROR))),
            inner,
        );
        return;
    }
    if diff.rows.is_empty() {
        let inner = block.inner(area);
        f.render_widget(block, area);
        f.render_widget(hint("No changes"), inner);
        return;
    }
    let height = app.layout.list_rows();
    let items: Vec<ListItem> = diff
        .rows
        .iter()
        .enumerate()
        .skip(app.list_offset())
        .take(height)
        .map(|(row_idx, row)| match row {
            ChangeRow::Header(group) => {
                let count = diff.changes.iter().filter(|item| item.group == *group).count();
                ListItem::new(Line::from(Span::styled(
                    format!("{} ({count})", group.label()),
                    theme::HEADER_STYLE,
                )))
            }
            ChangeRow::Item(idx) => {
                let item = &diff.changes[*idx];
                let line = Line::from(vec![
                    Span::styled(format!(" {} ", item.status), theme::group_color(item.group)),
                    Span::raw(item.path.clone()),
                ]);
                let style = if row_idx == diff.cursor {
                    theme::SELECTED_STYLE
                } else {
                    theme::zebra_row_style(row_idx)
                };
                ListItem::new(line).style(style)
            }
        })
        .collect();
    f.render_widget(List::new(items).block(block), area);
}

fn render_tasks(f: &mut Frame, app: &App, area: Rect) {
    let board = &app.tasks;
    let mut title = format!(" Tasks {}/{} ", board.view.len(), board.items.len());
    if !board.filter.is_default() {
        title = format!(" Tasks {}/{} filtered ", board.view.len(), board.items.len());
    }
    let block = pane_block(title, app.is_focused(Region::List));
    if board.view.is_empty() {
        let inner = block.inner(area);
        f.render_widget(block, area);
        let message = match &board.error {
            Some(err) => err.clone(),
            None if !board.loaded => "Loading tasks...".to_string(),
            None => "No tasks match".to_string(),
        };
        f.render_widget(hint(&message), inner);
        return;
    }
    let height = app.layout.list_rows();
    let rows: Vec<Row> = board
        .view
        .iter()
        .enumerate()
        .skip(app.list_offset())
        .take(height)
        .map(|(visual_idx, task_idx)| {
            let task = &board.items[*task_idx];
            let style = if visual_idx == board.cursor {
                theme::SELECTED_STYLE
            } else {
                theme::zebra_row_style(visual_idx)
            };
            Row::new(vec![
                Cell::from(Span::styled(
                    task.status.clone(),
                    theme::status_color(&task.status),
                )),
                Cell::from(Span::styled(
                    task.priority.clone(),
                    theme::priority_color(&task.priority),
                )),
                Cell::from(task.display_title().to_string()),
            ])
            .style(style)
        })
        .collect();
    let widths = [
        Constraint::Length(11),
        Constraint::Length(4),
        Constraint::Min(10),
    ];
    f.render_widget(Table::new(rows, widths).block(block), area);
}

fn render_document(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.tab {
        Tab::Tasks => app
            .tasks
            .selected()
            .map(|task| format!(" {} ", task.rel_path))
            .unwrap_or_else(|| " Task ".to_string()),
        _ => match &app.open {
            Some(path) => {
                let rel = rel_slash(app.root(), path);
                match app.spec_title(path) {
                    Some(spec) => format!(" {rel} · {spec} "),
                    None => format!(" {rel} "),
                }
            }
            None => " Preview ".to_string(),
        },
    };
    let block = pane_block(title, app.is_focused(Region::Preview));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let nothing_open = match app.tab {
        Tab::Tasks => app.tasks.selected().is_none(),
        _ => app.open.is_none(),
    };
    if nothing_open {
        f.render_widget(hint("Select a file and press Enter"), inner);
        return;
    }
    if !app.preview_is_current() {
        f.render_widget(hint("Rendering..."), inner);
        return;
    }
    let preview = &app.preview;
    if preview.is_error {
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(preview.text.clone(), theme::ERROR))),
            inner,
        );
        return;
    }
    let text = ansi::to_text(&preview.text, preview.scroll as usize, inner.height as usize);
    f.render_widget(Paragraph::new(text), inner);
}

fn render_diff(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.diff.selected() {
        Some(item) => format!(" {} [{}] ", item.path, app.diff.mode.label()),
        None => " Diff ".to_string(),
    };
    let block = pane_block(title, app.is_focused(Region::Preview));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if app.diff.selected().is_none() {
        f.render_widget(hint("Nothing selected"), inner);
        return;
    }
    if app.diff.shown.is_none() {
        f.render_widget(hint("Loading diff..."), inner);
        return;
    }
    if app.diff.text.is_empty() {
        f.render_widget(hint(NO_DIFF_HINT), inner);
        return;
    }
    let text = ansi::to_text(&app.diff.text, app.diff.scroll as usize, inner.height as usize);
    f.render_widget(Paragraph::new(text), inner);
}

fn render_terminal(f: &mut Frame, app: &mut App, area: Rect) {
    let focused = app.terminal_focused();
    let title = match &app.terminal.session {
        Some(session) if focused => format!(" {} (Esc to leave) ", session.shell()),
        Some(session) => format!(" {} ", session.shell()),
        None => " Terminal ".to_string(),
    };
    let block = pane_block(title, focused);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let message = match &app.terminal.status {
        TerminalStatus::Running => None,
        TerminalStatus::Idle | TerminalStatus::Starting => Some("Starting shell...".to_string()),
        TerminalStatus::Exited => Some("Shell exited. Press Enter to restart.".to_string()),
        TerminalStatus::Failed(err) => Some(format!("{err}\nPress Enter to retry.")),
    };
    if let Some(message) = message {
        f.render_widget(hint(&message), inner);
        return;
    }
    app.terminal.screen.take_dirty();
    let lines = app.terminal.screen.lines(focused);
    let text = ansi::to_text(&lines.join("\n"), 0, inner.height as usize);
    f.render_widget(Paragraph::new(text), inner);
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let title = match (app.input_mode, app.tab) {
        (InputMode::Search, _) => " Search tasks ",
        (InputMode::Command, Tab::Terminal) => " Send to shell ",
        (InputMode::Command, _) => " Go to path ",
    };
    let focused = app.is_focused(Region::Input);
    let block = pane_block(title.to_string(), focused);
    let inner = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(Paragraph::new(app.input.as_str()), inner);
    if focused {
        let width = unicode_width::UnicodeWidthStr::width(app.input.as_str()) as u16;
        let x = inner.x + width.min(inner.width.saturating_sub(1));
        f.set_cursor(x, inner.y);
    }
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(format!(" {} ", app.focus.label()), theme::ACTIVE_TAB_STYLE),
        Span::raw(" "),
    ];
    if let Some(message) = app.status_message() {
        spans.push(Span::styled(message.to_string(), Color::Yellow));
        spans.push(Span::raw("  "));
    }
    let keys = match (app.tab, app.focus) {
        (_, Focus::Input) => "Enter submit  Esc back  Tab focus",
        (Tab::Terminal, Focus::Preview) => "keys go to the shell  Esc leave",
        (Tab::Explorer, _) => "j/k move  Enter open  h collapse  f fast  r refresh  q quit",
        (Tab::Diff, _) => "j/k move  m mode  s spec-only  o open  q quit",
        (Tab::Tasks, _) => "s/o/p filter  / search  x clear  d doc  q quit",
        (Tab::Terminal, _) => "Tab focus shell  : send line  q quit",
    };
    spans.push(Span::styled(keys, Style::default().fg(theme::MUTED)));
    if app.tab == Tab::Tasks && !app.tasks.filter.is_default() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(app.tasks.filter.summary(), Color::Cyan));
    }
    if app.fast_render {
        spans.push(Span::styled("  [fast]", Color::Magenta));
    }
    if !app.has_live_watch() {
        spans.push(Span::styled("  [polling]", Style::default().fg(theme::MUTED)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
