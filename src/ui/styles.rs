//! Polkadot-flavoured palette and the few styles the dashboard draws with.

use multi_provider_balance::FailureKind;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders},
};

use crate::app::Verdict;

const PINK: Color = Color::Rgb(230, 0, 122);
const PINK_SOFT: Color = Color::Rgb(255, 128, 194);
const NIGHT: Color = Color::Rgb(24, 20, 37);
const LINE: Color = Color::Rgb(72, 60, 96);
const INK: Color = Color::Rgb(226, 222, 240);
const DIM: Color = Color::Rgb(134, 126, 160);
const GREEN: Color = Color::Rgb(86, 243, 154);
const AMBER: Color = Color::Rgb(255, 209, 102);
const RED: Color = Color::Rgb(255, 92, 92);

/// Bordered panel with a bold title.
pub fn panel(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .title_style(Style::default().fg(INK).add_modifier(Modifier::BOLD))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(LINE))
}

pub fn banner() -> Style {
    Style::default().bg(NIGHT).fg(PINK).add_modifier(Modifier::BOLD)
}

pub fn column_header() -> Style {
    Style::default().fg(PINK_SOFT).add_modifier(Modifier::BOLD)
}

pub fn selected_row() -> Style {
    Style::default().bg(PINK).fg(Color::White).add_modifier(Modifier::BOLD)
}

pub fn text() -> Style {
    Style::default().fg(INK)
}

pub fn label() -> Style {
    Style::default().fg(DIM)
}

pub fn good() -> Style {
    Style::default().fg(GREEN).add_modifier(Modifier::BOLD)
}

pub fn caution() -> Style {
    Style::default().fg(AMBER).add_modifier(Modifier::BOLD)
}

pub fn bad() -> Style {
    Style::default().fg(RED).add_modifier(Modifier::BOLD)
}

/// A count cell: dimmed at zero, `style` otherwise.
pub fn count(n: u64, style: Style) -> Style {
    if n == 0 {
        label()
    } else {
        style
    }
}

/// Colour for a provider attempt; `None` means it answered.
pub fn failure(kind: Option<FailureKind>) -> Style {
    match kind {
        None => good(),
        Some(FailureKind::NoData) => caution(),
        Some(FailureKind::NotConfigured | FailureKind::Cancelled) => label(),
        Some(FailureKind::Fault) => bad(),
    }
}

pub fn verdict(verdict: Verdict) -> Style {
    match verdict {
        Verdict::Found => good(),
        Verdict::NotFound => caution(),
        Verdict::Failed => bad(),
    }
}

/// Colors a resolver progress line by its marker.
pub fn progress_line(line: &str) -> Style {
    let trimmed = line.trim_start();
    if trimmed.starts_with('✓') || trimmed.starts_with("Success") {
        good()
    } else if trimmed.starts_with('✗') || trimmed.starts_with("All ") {
        bad()
    } else if trimmed.starts_with("---") {
        caution()
    } else if line.starts_with("  ") {
        label()
    } else {
        text()
    }
}
