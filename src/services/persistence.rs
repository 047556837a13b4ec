//! Persistence service — background flush for dirty records.
//!
//! DESIGN
//! ======
//! A background task flushes dirty records per school, then sleeps before
//! the next cycle. Dirty flags are cleared only after successful writes
//! and only for records unchanged since the flush snapshot, so a failed
//! write retries next cycle instead of losing a report.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::state::AppState;

const DEFAULT_RECORD_FLUSH_INTERVAL_MS: u64 = 100;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Spawn the background persistence task. Returns a handle for shutdown.
pub fn spawn_persistence_task(state: AppState) -> JoinHandle<()> {
    let flush_interval_ms = env_parse("RECORD_FLUSH_INTERVAL_MS", DEFAULT_RECORD_FLUSH_INTERVAL_MS);
    info!(flush_interval_ms, "record persistence flush configured");
    tokio::spawn(async move {
        loop {
            flush_all_dirty(&state).await;
            tokio::time::sleep(Duration::from_millis(flush_interval_ms)).await;
        }
    })
}

async fn flush_all_dirty(state: &AppState) {
    // Snapshot pending changes under the lock, then perform I/O lock-free.
    let batches = {
        let schools = state.schools.read().await;
        schools
            .iter()
            .filter_map(|(school_code, school)| {
                super::record::snapshot_flush_plan(school).map(|plan| (school_code.clone(), plan))
            })
            .collect::<Vec<_>>()
    };

    // Flush per school; on failure keep the flags for retry.
    for (school_code, plan) in batches {
        match super::record::apply_flush_plan(&state.pool, &school_code, &plan).await {
            Ok(()) => {
                let mut schools = state.schools.write().await;
                if let Some(school) = schools.get_mut(&school_code) {
                    super::record::ack_flush_plan(school, &plan);
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    count = plan.records.len(),
                    %school_code,
                    "persistence flush failed"
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) async fn flush_all_dirty_for_tests(state: &AppState) {
    flush_all_dirty(state).await;
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
