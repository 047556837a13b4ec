//! School record REST routes — listing, delete intents, and export downloads.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::dashboard::{export, roster};
use crate::frame::{Data, FRAME_DELETED, Frame};
use crate::services::record::{self, RecordError, normalize_school_code};
use crate::state::{AbsenceRecord, AppState};

#[derive(Deserialize)]
pub struct SearchQuery {
    /// Case-insensitive student/teacher filter. Empty matches all.
    #[serde(default)]
    pub q: String,
}

fn record_error_to_status(e: &RecordError) -> StatusCode {
    match e {
        RecordError::NotJoined => StatusCode::CONFLICT,
        RecordError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `GET /api/schools/:code/records` — filtered record list, oldest first.
pub async fn list_records(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<AbsenceRecord>>, StatusCode> {
    let school_code = normalize_school_code(&code);
    let records = record::list_records(&state, &school_code)
        .await
        .map_err(|e| record_error_to_status(&e))?;

    Ok(Json(roster::filter_records(&records, &query.q)))
}

/// `DELETE /api/schools/:code/records/:id` — delete one record and notify
/// live peers with the same tombstone marker the WS relay uses.
pub async fn delete_record(
    State(state): State<AppState>,
    Path((code, id)): Path<(String, Uuid)>,
) -> Result<StatusCode, StatusCode> {
    let school_code = normalize_school_code(&code);
    record::delete_record(&state, &school_code, id)
        .await
        .map_err(|e| record_error_to_status(&e))?;

    let mut data = Data::new();
    data.insert("id".into(), serde_json::json!(id));
    data.insert(FRAME_DELETED.into(), serde_json::json!(true));
    let marker = Frame::request("record:delete", data).with_school(school_code.clone());
    record::broadcast(&state, &school_code, &marker, None).await;

    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/schools/:code/records` — clear every record for the school.
pub async fn clear_records(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let school_code = normalize_school_code(&code);
    let cleared = record::clear_records(&state, &school_code)
        .await
        .map_err(|e| record_error_to_status(&e))?;

    let mut data = Data::new();
    data.insert("cleared".into(), serde_json::json!(cleared));
    let notif = Frame::request("record:clear", data).with_school(school_code.clone());
    record::broadcast(&state, &school_code, &notif, None).await;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// EXPORTS
// =============================================================================

/// `GET /api/schools/:code/export.csv` — spreadsheet download of the
/// filtered record list. `204 No Content` when there is nothing to export.
pub async fn export_csv(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, StatusCode> {
    let (filtered, stats) = filtered_with_stats(&state, &code, &query.q).await?;

    let csv = export::spreadsheet_csv(&filtered, &stats)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let Some(csv) = csv else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let filename = export::spreadsheet_filename(Utc::now().date_naive());
    Ok(download_response("text/csv; charset=utf-8", &filename, csv))
}

/// `GET /api/schools/:code/export.txt` — numbered absent-student list.
/// `204 No Content` when no absent records match.
pub async fn export_text(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, StatusCode> {
    let (filtered, stats) = filtered_with_stats(&state, &code, &query.q).await?;

    let today = Utc::now().date_naive();
    let Some(text) = export::absent_list_text(&filtered, &stats, today) else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let filename = export::text_filename(today);
    Ok(download_response("text/plain; charset=utf-8", &filename, text))
}

/// Load a school's records and split into (filtered view, full-set stats).
/// Stats always come from the unfiltered set so cumulative totals hold
/// under an active search.
async fn filtered_with_stats(
    state: &AppState,
    code: &str,
    query: &str,
) -> Result<(Vec<AbsenceRecord>, std::collections::HashMap<String, usize>), StatusCode> {
    let school_code = normalize_school_code(code);
    let records = record::list_records(state, &school_code)
        .await
        .map_err(|e| record_error_to_status(&e))?;

    let stats = roster::student_stats(&records);
    Ok((roster::filter_records(&records, query), stats))
}

fn download_response(content_type: &'static str, filename: &str, body: String) -> Response {
    (
        [
            (CONTENT_TYPE, content_type.to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response()
}
