//! AI insight service — attendance trend analysis and teacher summaries.
//!
//! DESIGN
//! ======
//! Two stateless request/response wrappers around the hosted model. Both
//! swallow every failure: errors are logged and replaced with a fixed
//! fallback value, never surfaced to the caller. No retries, no caching.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::GenerateText;
use crate::state::AbsenceRecord;

/// Insight returned when the model call or parse fails.
pub const INSIGHTS_FALLBACK: &str = "Unable to analyze data at this time.";

/// Message returned when the free-text call fails.
pub const MESSAGE_FALLBACK: &str = "Failed to generate professional message.";

/// Structured trend analysis for the supervisor dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightReport {
    pub insights: Vec<String>,
}

impl InsightReport {
    #[must_use]
    pub fn fallback() -> Self {
        Self { insights: vec![INSIGHTS_FALLBACK.to_string()] }
    }
}

/// Response schema declared to the model for the insights call.
#[must_use]
pub fn insights_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "insights": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["insights"]
    })
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Analyze the record set and return a short list of trends.
///
/// Degrades to [`InsightReport::fallback`] on any network, HTTP, or parse
/// failure.
pub async fn attendance_insights(llm: &dyn GenerateText, records: &[AbsenceRecord]) -> InsightReport {
    let data = serde_json::to_string(records).unwrap_or_else(|_| "[]".to_string());
    let prompt = format!(
        "Analyze the following attendance data and provide 3 key insights or trends \
         for the school supervisor: {data}. Return the response in a structured JSON format."
    );

    match llm.generate_json(&prompt, insights_schema()).await {
        Ok(text) => match serde_json::from_str::<InsightReport>(&text) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "insight response was not valid JSON; using fallback");
                InsightReport::fallback()
            }
        },
        Err(e) => {
            warn!(error = %e, "insight request failed; using fallback");
            InsightReport::fallback()
        }
    }
}

/// Write a formal absence summary on behalf of a teacher.
///
/// Degrades to [`MESSAGE_FALLBACK`] on any failure.
pub async fn professional_message(
    llm: &dyn GenerateText,
    teacher_name: &str,
    student_names: &[String],
    date: &str,
) -> String {
    let prompt = format!(
        "As a professional teacher named {teacher_name}, write a concise summary message \
         to a school supervisor about the following students who were absent today ({date}): {}. \
         The tone should be formal and informative.",
        student_names.join(", ")
    );

    match llm.generate(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "professional message request failed; using fallback");
            MESSAGE_FALLBACK.to_string()
        }
    }
}

#[cfg(test)]
#[path = "insights_test.rs"]
mod tests;
