//! Per-student absence tallies, threshold tiers, and search filtering.

use std::collections::HashMap;

use serde::Serialize;

use crate::state::{AbsenceRecord, Reason};

// =============================================================================
// STUDENT STATS
// =============================================================================

/// Cumulative absence count per student. Lateness does not count toward
/// the tally; only `Reason::Absent` records do.
#[must_use]
pub fn student_stats(records: &[AbsenceRecord]) -> HashMap<String, usize> {
    let mut stats: HashMap<String, usize> = HashMap::new();
    for record in records {
        if record.reason == Reason::Absent {
            *stats.entry(record.student_name.clone()).or_insert(0) += 1;
        }
    }
    stats
}

// =============================================================================
// TIERS
// =============================================================================

/// Threshold-based severity bucket derived from a cumulative absence count.
///
/// Fixed school policy, evaluated highest-first. Every count maps to a
/// tier; 0–2 is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    None,
    FirstNotice,
    WeekExceeded,
    FinalWarning,
    Critical,
}

impl Tier {
    /// Map an absence count to its tier.
    #[must_use]
    pub fn for_count(count: usize) -> Self {
        match count {
            32.. => Tier::Critical,
            16.. => Tier::FinalWarning,
            7.. => Tier::WeekExceeded,
            3.. => Tier::FirstNotice,
            _ => Tier::None,
        }
    }

    /// Display label for clients. Empty for the default tier.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Tier::None => "",
            Tier::FirstNotice => "first notice (3+)",
            Tier::WeekExceeded => "week exceeded (7+)",
            Tier::FinalWarning => "final warning (16+)",
            Tier::Critical => "critical (32+)",
        }
    }

    /// Severity color name for clients.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Tier::None => "slate",
            Tier::FirstNotice => "yellow",
            Tier::WeekExceeded => "orange",
            Tier::FinalWarning => "red",
            Tier::Critical => "purple",
        }
    }
}

/// Tier for one student given the full stats map. Unknown students count 0.
#[must_use]
pub fn tier_for_student(stats: &HashMap<String, usize>, student_name: &str) -> Tier {
    Tier::for_count(stats.get(student_name).copied().unwrap_or(0))
}

// =============================================================================
// SEARCH FILTER
// =============================================================================

/// Case-insensitive substring match against student or teacher name.
/// An empty query matches everything. Input order is preserved.
#[must_use]
pub fn filter_records(records: &[AbsenceRecord], query: &str) -> Vec<AbsenceRecord> {
    let needle = query.to_lowercase();
    records
        .iter()
        .filter(|r| {
            r.student_name.to_lowercase().contains(&needle)
                || r.teacher_name.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}
