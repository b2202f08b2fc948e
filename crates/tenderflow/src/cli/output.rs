//! Table and timestamp formatting shared by the list commands.

use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use tenderflow_protocol::{DecisionStatus, DisputeStatus, SubmissionStatus, TenderStatus};

/// A condensed table with the standard preset and headers.
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h)).collect::<Vec<_>>());
    table
}

/// Local wall-clock rendering of a stored UTC timestamp.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub fn fmt_opt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(fmt_ts).unwrap_or_else(|| "-".to_string())
}

pub fn fmt_money(value: f64) -> String {
    format!("{value:.2}")
}

pub fn tender_status_cell(status: TenderStatus) -> Cell {
    let color = match status {
        TenderStatus::Draft => Color::Grey,
        TenderStatus::Open => Color::Green,
        TenderStatus::Closed => Color::Yellow,
        TenderStatus::Awarded => Color::Cyan,
        TenderStatus::Cancelled => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

pub fn submission_status_cell(status: SubmissionStatus) -> Cell {
    let color = match status {
        SubmissionStatus::Pending => Color::Yellow,
        SubmissionStatus::Approved => Color::Green,
        SubmissionStatus::Rejected => Color::Red,
        SubmissionStatus::Awarded => Color::Cyan,
    };
    Cell::new(status.as_str()).fg(color)
}

pub fn decision_status_cell(status: DecisionStatus) -> Cell {
    let color = match status {
        DecisionStatus::Pending => Color::Yellow,
        DecisionStatus::Approved => Color::Green,
        DecisionStatus::Rejected => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

pub fn dispute_status_cell(status: DisputeStatus) -> Cell {
    let color = match status {
        DisputeStatus::Pending => Color::Yellow,
        DisputeStatus::Investigating => Color::Cyan,
        DisputeStatus::Resolved => Color::Green,
        DisputeStatus::Dismissed => Color::Grey,
    };
    Cell::new(status.as_str()).fg(color)
}
