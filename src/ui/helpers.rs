use anyhow::Error;
use chrono::{NaiveDate, NaiveDateTime};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};

use crate::models::LoanStatus;

/// Produce a rectangle centered within `area` that spans the requested percent
/// of the width and height. Used for modal dialogs.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1]);

    vertical[1]
}

/// Extract the most relevant error message from a chained error.
pub(crate) fn surface_error(err: &Error) -> String {
    err.chain()
        .last()
        .map(|cause| cause.to_string())
        .unwrap_or_else(|| err.to_string())
}

/// Pad or cut `text` to exactly `width` characters so list rows line up.
pub(crate) fn fit_column(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count <= width {
        format!("{text:<width$}")
    } else if width <= 1 {
        text.chars().take(width).collect()
    } else {
        let mut cut: String = text.chars().take(width - 1).collect();
        cut.push('…');
        cut
    }
}

pub(crate) fn short_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn short_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%d %H:%M").to_string()
}

/// Borrower name for display; loans outlive removed users.
pub(crate) fn borrower_name(username: Option<&str>) -> &str {
    username.unwrap_or("(removed)")
}

pub(crate) fn status_style(status: LoanStatus) -> Style {
    match status {
        LoanStatus::Overdue { .. } => Style::default().fg(Color::Red),
        LoanStatus::Active => Style::default().fg(Color::Green),
        LoanStatus::Returned => Style::default().fg(Color::Gray),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_column_pads_and_truncates() {
        assert_eq!(fit_column("Dune", 6), "Dune  ");
        assert_eq!(fit_column("The Left Hand of Darkness", 8), "The Lef…");
        assert_eq!(fit_column("abc", 0), "");
    }

    #[test]
    fn surface_error_reports_root_cause() {
        let err = anyhow::anyhow!("disk full").context("failed to save book");
        assert_eq!(surface_error(&err), "disk full");
    }
}
