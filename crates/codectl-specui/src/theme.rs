use crate::diff::ChangeGroup;
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const ACTIVE_TAB_STYLE: Style = Style::new()
    .bg(Color::Rgb(69, 133, 136))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const MUTED: Color = Color::Rgb(146, 131, 116);
pub const ERROR: Color = Color::Rgb(251, 73, 52);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        Color::Rgb(24, 27, 34)
    };
    Style::new().bg(bg)
}

pub fn border_style(focused: bool) -> Style {
    if focused {
        Style::new().fg(Color::Rgb(250, 189, 47))
    } else {
        Style::new().fg(Color::Rgb(80, 73, 69))
    }
}

pub mod icons {
    pub const EXPANDED: &str = "▾";
    pub const COLLAPSED: &str = "▸";
    pub const FILE: &str = " ";
}

pub fn status_color(status: &str) -> Color {
    match status.trim().to_lowercase().as_str() {
        "done" | "complete" | "completed" => Color::Rgb(184, 187, 38),
        "in-progress" | "in progress" | "doing" | "active" => Color::Rgb(131, 165, 152),
        "blocked" => Color::Rgb(254, 128, 25),
        "review" => Color::Rgb(250, 189, 47),
        "cancelled" | "canceled" => Color::Rgb(214, 93, 14),
        _ => MUTED,
    }
}

pub fn priority_color(priority: &str) -> Color {
    match priority.trim().to_lowercase().as_str() {
        "p0" | "critical" | "urgent" | "high" | "p1" => Color::Rgb(254, 128, 25),
        "p2" | "medium" => Color::Rgb(250, 189, 47),
        "p3" | "low" => Color::Rgb(131, 165, 152),
        _ => MUTED,
    }
}

pub fn group_color(group: ChangeGroup) -> Color {
    match group {
        ChangeGroup::Unstaged => Color::Rgb(250, 189, 47),
        ChangeGroup::Staged => Color::Rgb(184, 187, 38),
        ChangeGroup::Untracked => Color::Rgb(211, 134, 155),
    }
}
