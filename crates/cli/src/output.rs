use crate::error::CliError;
use model::{
    checkpoint::{CheckpointKey, CheckpointRecord},
    harvest::HarvestReport,
};
use rust_decimal::Decimal;
use serde::Serialize;

pub fn print_report(report: &HarvestReport) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// JSON shape of a stored checkpoint, matching the persisted columns.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressView<'a> {
    scope_key: Option<&'a str>,
    window_start: String,
    window_end: String,
    status: &'static str,
    cursor: Option<&'a str>,
    pages_processed: u64,
    accumulated_total: Decimal,
    last_error: Option<&'a str>,
    updated_at: String,
    completed_at: Option<String>,
}

impl<'a> From<&'a CheckpointRecord> for ProgressView<'a> {
    fn from(record: &'a CheckpointRecord) -> Self {
        Self {
            scope_key: record.key.scope.as_key(),
            window_start: record.key.start.to_rfc3339(),
            window_end: record.key.end.to_rfc3339(),
            status: record.status.as_str(),
            cursor: record.cursor.as_ref().map(|c| c.as_str()),
            pages_processed: record.pages_processed,
            accumulated_total: record.accumulated_total,
            last_error: record.last_error.as_deref(),
            updated_at: record.updated_at.to_rfc3339(),
            completed_at: record.completed_at.map(|ts| ts.to_rfc3339()),
        }
    }
}

pub fn print_progress_json(record: Option<&CheckpointRecord>) -> Result<(), CliError> {
    let view = record.map(ProgressView::from);
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

pub fn print_progress_table(key: &CheckpointKey, record: Option<&CheckpointRecord>) {
    println!("Progress for {key}:");
    println!("-----------------------------");
    let Some(record) = record else {
        println!("No checkpoint stored");
        return;
    };

    println!("{:<16} {}", "Status", record.status);
    println!("{:<16} {}", "Pages", record.pages_processed);
    println!("{:<16} {}", "Total", record.accumulated_total);
    let cursor = record
        .cursor
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<16} {}", "Cursor", cursor);
    println!("{:<16} {}", "Updated", record.updated_at.to_rfc3339());
    if let Some(done) = record.completed_at {
        println!("{:<16} {}", "Completed", done.to_rfc3339());
    }
    if let Some(err) = &record.last_error {
        println!("{:<16} {}", "Last error", err);
    }
}
