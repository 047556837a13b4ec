//! Spreadsheet and plain-text exports of the filtered record list.
//!
//! Both exports are synchronous in-memory transforms; the caller decides
//! filtering beforehand but passes stats computed over the FULL record
//! set, so cumulative totals stay correct under an active search filter.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::state::{AbsenceRecord, Reason};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv output was not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// File name for the spreadsheet download, embedding the export date.
#[must_use]
pub fn spreadsheet_filename(date: NaiveDate) -> String {
    format!("attendance-{}.csv", date.format("%Y-%m-%d"))
}

/// File name for the text download, embedding the export date.
#[must_use]
pub fn text_filename(date: NaiveDate) -> String {
    format!("absent-list-{}.txt", date.format("%Y-%m-%d"))
}

// =============================================================================
// SPREADSHEET
// =============================================================================

/// Render the filtered records as CSV, one row per record.
///
/// Returns `None` when there is nothing to export.
///
/// # Errors
///
/// Returns an [`ExportError`] if a row fails to serialize.
pub fn spreadsheet_csv(
    filtered: &[AbsenceRecord],
    stats: &HashMap<String, usize>,
) -> Result<Option<String>, ExportError> {
    if filtered.is_empty() {
        return Ok(None);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["report_date", "teacher", "student", "total_absences", "status", "session_note"])?;

    for record in filtered {
        let total = stats.get(&record.student_name).copied().unwrap_or(0);
        let status = match record.reason {
            Reason::Absent => "absent",
            Reason::Late => "late",
        };
        writer.write_record([
            record.date.format("%Y-%m-%d %H:%M").to_string().as_str(),
            &record.teacher_name,
            &record.student_name,
            total.to_string().as_str(),
            status,
            record.message_to_supervisor.as_deref().unwrap_or("-"),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    Ok(Some(String::from_utf8(bytes)?))
}

// =============================================================================
// TEXT LIST
// =============================================================================

/// Render the absent-only student list as numbered plain text.
///
/// Lateness records are omitted entirely. Returns `None` when no absent
/// records remain after filtering.
#[must_use]
pub fn absent_list_text(
    filtered: &[AbsenceRecord],
    stats: &HashMap<String, usize>,
    date: NaiveDate,
) -> Option<String> {
    let absent: Vec<String> = filtered
        .iter()
        .filter(|r| r.reason == Reason::Absent)
        .map(|r| {
            let total = stats.get(&r.student_name).copied().unwrap_or(0);
            format!("{} ({} absences)", r.student_name, total)
        })
        .collect();

    if absent.is_empty() {
        return None;
    }

    let mut content = format!("Absent students - {}\n", date.format("%Y-%m-%d"));
    content.push_str("===================================\n\n");
    let lines: Vec<String> = absent
        .iter()
        .enumerate()
        .map(|(index, entry)| format!("{}. {entry}", index + 1))
        .collect();
    content.push_str(&lines.join("\n"));
    Some(content)
}
