use ratatui::layout::{Constraint, Direction, Layout, Rect};

pub const LIST_PREFERRED_WIDTH: u16 = 36;
pub const PREVIEW_MIN_WIDTH: u16 = 40;
const TAB_SEPARATOR: &str = "│";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Files,
    Preview,
    Input,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Files => Focus::Preview,
            Focus::Preview => Focus::Input,
            Focus::Input => Focus::Files,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Focus::Files => "files",
            Focus::Preview => "preview",
            Focus::Input => "input",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Explorer,
    Diff,
    Tasks,
    Terminal,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Explorer, Tab::Diff, Tab::Tasks, Tab::Terminal];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Explorer => "Explorer",
            Tab::Diff => "Diff",
            Tab::Tasks => "Tasks",
            Tab::Terminal => "Terminal",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Tab::Explorer => 0,
            Tab::Diff => 1,
            Tab::Tasks => 2,
            Tab::Terminal => 3,
        }
    }

    pub fn next(self) -> Self {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    pub fn from_digit(ch: char) -> Option<Self> {
        let idx = ch.to_digit(10)? as usize;
        idx.checked_sub(1).and_then(|idx| Tab::ALL.get(idx).copied())
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "explorer" | "files" | "1" => Some(Tab::Explorer),
            "diff" | "2" => Some(Tab::Diff),
            "tasks" | "task" | "3" => Some(Tab::Tasks),
            "terminal" | "term" | "shell" | "4" => Some(Tab::Terminal),
            _ => None,
        }
    }

    /// Label drawn in the tab bar; `tab_at` relies on the same text.
    pub fn label(self) -> String {
        format!(" {} {} ", self.index() + 1, self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaneLayout {
    pub tabs: Rect,
    pub list: Rect,
    pub preview: Rect,
    pub input: Rect,
    pub status: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Tabs,
    List,
    Preview,
    Input,
    Status,
}

impl PaneLayout {
    /// Inner grid of the preview pane (inside its border), as (cols, rows).
    pub fn preview_grid(&self) -> (u16, u16) {
        (
            self.preview.width.saturating_sub(2).max(1),
            self.preview.height.saturating_sub(2).max(1),
        )
    }

    pub fn list_rows(&self) -> usize {
        self.list.height.saturating_sub(2) as usize
    }

    /// Row index within the list pane's visible body, if `row` hits it.
    pub fn list_row_at(&self, column: u16, row: u16) -> Option<usize> {
        if !contains(self.list, column, row) || self.list.height <= 2 {
            return None;
        }
        let first = self.list.y + 1;
        let last = self.list.y + self.list.height - 1;
        if row < first || row >= last {
            return None;
        }
        Some((row - first) as usize)
    }
}

/// List width: the preferred width, shrunk so the preview keeps its minimum.
pub fn list_width(total: u16) -> u16 {
    LIST_PREFERRED_WIDTH.min(total.saturating_sub(PREVIEW_MIN_WIDTH))
}

pub fn compute_layout(area: Rect) -> PaneLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(area);
    let list = list_width(area.width);
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(list), Constraint::Min(0)])
        .split(rows[1]);
    PaneLayout {
        tabs: rows[0],
        list: body[0],
        preview: body[1],
        input: rows[2],
        status: rows[3],
    }
}

pub fn hit_test(layout: &PaneLayout, column: u16, row: u16) -> Option<Region> {
    [
        (layout.tabs, Region::Tabs),
        (layout.list, Region::List),
        (layout.preview, Region::Preview),
        (layout.input, Region::Input),
        (layout.status, Region::Status),
    ]
    .into_iter()
    .find(|(area, _)| contains(*area, column, row))
    .map(|(_, region)| region)
}

/// Tab under `column` in the tab bar.
pub fn tab_at(layout: &PaneLayout, column: u16) -> Option<Tab> {
    let mut x = layout.tabs.x;
    for tab in Tab::ALL {
        let width = tab.label().chars().count() as u16;
        if column >= x && column < x + width {
            return Some(tab);
        }
        x += width + TAB_SEPARATOR.chars().count() as u16;
    }
    None
}

pub fn tab_separator() -> &'static str {
    TAB_SEPARATOR
}

pub fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && column < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}
