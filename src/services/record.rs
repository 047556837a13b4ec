//! Record service — school namespaces, sync CRUD, and broadcast.
//!
//! DESIGN
//! ======
//! A school's record set is hydrated from Postgres when its first client
//! joins and kept in memory while any client is connected. Writes, deletes,
//! and clears mutate the in-memory map (last write wins) and leave flags —
//! dirty ids, tombstones, a clear-pending bit — for the persistence task to
//! flush. When a school is not live, delete/clear fall through to the
//! database directly.
//!
//! ERROR HANDLING
//! ==============
//! On last-client part, pending changes are flushed before eviction. If
//! that flush fails, the school is kept in memory with its flags intact so
//! the persistence worker can retry instead of losing reports.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::Frame;
use crate::state::{AbsenceRecord, AppState, Reason, SchoolState};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("must join a school first")]
    NotJoined,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for RecordError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotJoined => "E_NOT_JOINED",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

// =============================================================================
// NAMESPACE
// =============================================================================

/// Normalize a school code the way clients address namespaces:
/// trimmed and lowercased, with empty input mapping to `"default"`.
#[must_use]
pub fn normalize_school_code(raw: &str) -> String {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        "default".to_string()
    } else {
        normalized
    }
}

// =============================================================================
// JOIN / PART
// =============================================================================

/// Join a school. Hydrates from Postgres if not already in memory.
/// Returns the current record snapshot, oldest first.
///
/// # Errors
///
/// Returns a database error if hydration fails.
pub async fn join_school(
    state: &AppState,
    school_code: &str,
    client_id: Uuid,
    tx: mpsc::Sender<Frame>,
) -> Result<Vec<AbsenceRecord>, RecordError> {
    // Fetch the snapshot outside locks; we'll apply it only if needed.
    let hydration_snapshot = hydrate_records(&state.pool, school_code).await?;

    let mut schools = state.schools.write().await;
    let school = schools
        .entry(school_code.to_string())
        .or_insert_with(SchoolState::new);

    // Hydrate from Postgres if this is the first live client for this school.
    if school.clients.is_empty() {
        school.records = hydration_snapshot;
        info!(%school_code, count = school.records.len(), "hydrated school from database");
    }

    school.clients.insert(client_id, tx);
    let mut records: Vec<AbsenceRecord> = school.records.values().cloned().collect();
    records.sort_by_key(|r| r.date);

    info!(%school_code, %client_id, clients = school.clients.len(), "client joined school");
    Ok(records)
}

/// Leave a school. Removes the client sender. If last client, flushes
/// pending changes and evicts the school state from memory.
pub async fn part_school(state: &AppState, school_code: &str, client_id: Uuid) {
    let mut schools = state.schools.write().await;
    let Some(school) = schools.get_mut(school_code) else {
        return;
    };

    school.clients.remove(&client_id);
    info!(%school_code, %client_id, remaining = school.clients.len(), "client left school");

    if school.clients.is_empty() {
        let Some(plan) = snapshot_flush_plan(school) else {
            schools.remove(school_code);
            info!(%school_code, "evicted school from memory");
            return;
        };

        // Release lock before writing to Postgres.
        drop(schools);
        let flush_result = apply_flush_plan(&state.pool, school_code, &plan).await;

        let mut schools = state.schools.write().await;
        let Some(school) = schools.get_mut(school_code) else {
            return;
        };
        if !school.clients.is_empty() {
            return;
        }

        match flush_result {
            Ok(()) => {
                ack_flush_plan(school, &plan);
                if school.dirty.is_empty() && school.deleted.is_empty() && !school.clear_pending {
                    schools.remove(school_code);
                    info!(%school_code, "evicted school from memory");
                } else {
                    warn!(
                        %school_code,
                        remaining_dirty = school.dirty.len(),
                        "retaining school after final flush because newer pending changes exist"
                    );
                }
            }
            Err(e) => {
                tracing::error!(error = %e, %school_code, "final flush failed; school retained for retry");
            }
        }
    }
}

// =============================================================================
// SYNC CRUD
// =============================================================================

/// Upsert a record into the school's live map. Last write wins.
///
/// # Errors
///
/// Returns [`RecordError::NotJoined`] when the school is not live.
pub async fn save_record(
    state: &AppState,
    school_code: &str,
    record: AbsenceRecord,
) -> Result<AbsenceRecord, RecordError> {
    let mut schools = state.schools.write().await;
    let school = schools.get_mut(school_code).ok_or(RecordError::NotJoined)?;

    school.deleted.remove(&record.id);
    school.dirty.insert(record.id);
    school.records.insert(record.id, record.clone());
    Ok(record)
}

/// Remove a record, leaving a tombstone for the flush task. Idempotent.
/// Falls through to the database when the school is not live.
///
/// # Errors
///
/// Returns a database error if the cold-path delete fails.
pub async fn delete_record(state: &AppState, school_code: &str, id: Uuid) -> Result<(), RecordError> {
    {
        let mut schools = state.schools.write().await;
        if let Some(school) = schools.get_mut(school_code) {
            school.records.remove(&id);
            school.dirty.remove(&id);
            school.deleted.insert(id);
            return Ok(());
        }
    }

    sqlx::query("DELETE FROM absence_records WHERE school_code = $1 AND id = $2")
        .bind(school_code)
        .bind(id)
        .execute(&state.pool)
        .await?;
    Ok(())
}

/// Clear every record for a school. Returns how many live records were
/// dropped. Falls through to the database when the school is not live.
///
/// # Errors
///
/// Returns a database error if the cold-path delete fails.
pub async fn clear_records(state: &AppState, school_code: &str) -> Result<usize, RecordError> {
    {
        let mut schools = state.schools.write().await;
        if let Some(school) = schools.get_mut(school_code) {
            let count = school.records.len();
            school.records.clear();
            school.dirty.clear();
            school.deleted.clear();
            school.clear_pending = true;
            info!(%school_code, cleared = count, "cleared school records");
            return Ok(count);
        }
    }

    sqlx::query("DELETE FROM absence_records WHERE school_code = $1")
        .bind(school_code)
        .execute(&state.pool)
        .await?;

    info!(%school_code, "cleared school records (cold path)");
    Ok(0)
}

/// Current records for a school, oldest first. Reads the live map when the
/// school is in memory, otherwise the database (without hydrating).
///
/// # Errors
///
/// Returns a database error if the fallback query fails.
pub async fn list_records(state: &AppState, school_code: &str) -> Result<Vec<AbsenceRecord>, RecordError> {
    {
        let schools = state.schools.read().await;
        if let Some(school) = schools.get(school_code) {
            let mut records: Vec<AbsenceRecord> = school.records.values().cloned().collect();
            records.sort_by_key(|r| r.date);
            return Ok(records);
        }
    }

    let mut records: Vec<AbsenceRecord> = hydrate_records(&state.pool, school_code)
        .await?
        .into_values()
        .collect();
    records.sort_by_key(|r| r.date);
    Ok(records)
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Broadcast a frame to all clients in a school, optionally excluding one.
pub async fn broadcast(state: &AppState, school_code: &str, frame: &Frame, exclude: Option<Uuid>) {
    let schools = state.schools.read().await;
    let Some(school) = schools.get(school_code) else {
        return;
    };

    for (client_id, tx) in &school.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        let _ = tx.try_send(frame.clone());
    }
}

// =============================================================================
// FLUSH PLAN
// =============================================================================

/// Everything the persistence layer must write for one school: an optional
/// namespace clear, tombstoned ids, and upserts — snapshotted under the
/// state lock, applied outside it.
#[derive(Debug)]
pub(crate) struct FlushPlan {
    pub(crate) clear_pending: bool,
    pub(crate) deleted: Vec<Uuid>,
    pub(crate) records: Vec<AbsenceRecord>,
}

/// Snapshot pending changes. `None` when there is nothing to flush.
pub(crate) fn snapshot_flush_plan(school: &SchoolState) -> Option<FlushPlan> {
    if school.dirty.is_empty() && school.deleted.is_empty() && !school.clear_pending {
        return None;
    }

    let records = school
        .dirty
        .iter()
        .filter_map(|id| school.records.get(id).cloned())
        .collect::<Vec<_>>();
    Some(FlushPlan {
        clear_pending: school.clear_pending,
        deleted: school.deleted.iter().copied().collect(),
        records,
    })
}

/// Write one school's pending changes: clear, then tombstones, then upserts.
pub(crate) async fn apply_flush_plan(
    pool: &PgPool,
    school_code: &str,
    plan: &FlushPlan,
) -> Result<(), sqlx::Error> {
    if plan.clear_pending {
        sqlx::query("DELETE FROM absence_records WHERE school_code = $1")
            .bind(school_code)
            .execute(pool)
            .await?;
    }

    for id in &plan.deleted {
        sqlx::query("DELETE FROM absence_records WHERE school_code = $1 AND id = $2")
            .bind(school_code)
            .bind(id)
            .execute(pool)
            .await?;
    }

    flush_records(pool, school_code, &plan.records).await
}

/// Acknowledge a successful flush: drop flags for changes the plan covered,
/// keeping any record re-modified since the snapshot.
pub(crate) fn ack_flush_plan(school: &mut SchoolState, plan: &FlushPlan) {
    if plan.clear_pending {
        school.clear_pending = false;
    }
    for id in &plan.deleted {
        school.deleted.remove(id);
    }
    for flushed_record in &plan.records {
        let can_clear = match school.records.get(&flushed_record.id) {
            Some(current) => current == flushed_record,
            None => true,
        };
        if can_clear {
            school.dirty.remove(&flushed_record.id);
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn hydrate_records(
    pool: &PgPool,
    school_code: &str,
) -> Result<HashMap<Uuid, AbsenceRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, String, String, DateTime<Utc>, String, Option<String>)>(
        "SELECT id, student_name, teacher_name, date, reason, message_to_supervisor \
         FROM absence_records WHERE school_code = $1",
    )
    .bind(school_code)
    .fetch_all(pool)
    .await?;

    let mut records = HashMap::new();
    for (id, student_name, teacher_name, date, reason, message_to_supervisor) in rows {
        // Rows that fail to decode are skipped, not fatal.
        let reason = match reason.as_str() {
            "absent" => Reason::Absent,
            "late" => Reason::Late,
            other => {
                warn!(%id, reason = other, "skipping record with unknown reason");
                continue;
            }
        };
        records.insert(id, AbsenceRecord { id, student_name, teacher_name, date, reason, message_to_supervisor });
    }
    Ok(records)
}

/// Batch upsert records to Postgres.
pub(crate) async fn flush_records(
    pool: &PgPool,
    school_code: &str,
    records: &[AbsenceRecord],
) -> Result<(), sqlx::Error> {
    for record in records {
        let reason = match record.reason {
            Reason::Absent => "absent",
            Reason::Late => "late",
        };
        sqlx::query(
            "INSERT INTO absence_records (id, school_code, student_name, teacher_name, date, reason, message_to_supervisor, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, now()) \
             ON CONFLICT (id) DO UPDATE SET \
                 student_name = EXCLUDED.student_name, teacher_name = EXCLUDED.teacher_name, \
                 date = EXCLUDED.date, reason = EXCLUDED.reason, \
                 message_to_supervisor = EXCLUDED.message_to_supervisor, updated_at = now()",
        )
        .bind(record.id)
        .bind(school_code)
        .bind(&record.student_name)
        .bind(&record.teacher_name)
        .bind(record.date)
        .bind(reason)
        .bind(&record.message_to_supervisor)
        .execute(pool)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "record_test.rs"]
mod tests;
