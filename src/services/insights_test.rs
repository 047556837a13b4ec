use super::*;
use crate::llm::types::LlmError;
use crate::state::Reason;
use crate::state::test_helpers::dummy_record;
use std::sync::Mutex;

// =========================================================================
// MockLlm
// =========================================================================

struct MockLlm {
    responses: Mutex<Vec<Result<String, LlmError>>>,
    last_prompt: Mutex<Option<String>>,
}

impl MockLlm {
    fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self { responses: Mutex::new(responses), last_prompt: Mutex::new(None) }
    }

    fn prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone().unwrap_or_default()
    }

    fn next(&self, prompt: &str) -> Result<String, LlmError> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("done".to_string())
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait::async_trait]
impl GenerateText for MockLlm {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.next(prompt)
    }

    async fn generate_json(&self, prompt: &str, _schema: serde_json::Value) -> Result<String, LlmError> {
        self.next(prompt)
    }
}

// =========================================================================
// attendance_insights
// =========================================================================

#[tokio::test]
async fn parses_structured_insights() {
    let llm = MockLlm::new(vec![Ok(
        r#"{ "insights": ["Monday absences doubled.", "Two students passed 7 days."] }"#.to_string(),
    )]);
    let records = vec![dummy_record("Yassine", "Mr. Kaddour", Reason::Absent)];

    let report = attendance_insights(&llm, &records).await;
    assert_eq!(report.insights.len(), 2);
    assert_eq!(report.insights[0], "Monday absences doubled.");
}

#[tokio::test]
async fn request_failure_yields_exact_fallback() {
    let llm = MockLlm::new(vec![Err(LlmError::ApiRequest("connection refused".into()))]);
    let report = attendance_insights(&llm, &[]).await;
    assert_eq!(report, InsightReport { insights: vec!["Unable to analyze data at this time.".to_string()] });
}

#[tokio::test]
async fn unparseable_response_yields_exact_fallback() {
    let llm = MockLlm::new(vec![Ok("I am not JSON".to_string())]);
    let report = attendance_insights(&llm, &[]).await;
    assert_eq!(report, InsightReport::fallback());
}

#[tokio::test]
async fn prompt_embeds_the_record_data() {
    let llm = MockLlm::new(vec![Ok(r#"{ "insights": [] }"#.to_string())]);
    let records = vec![dummy_record("Yassine Brahimi", "Mr. Kaddour", Reason::Absent)];

    attendance_insights(&llm, &records).await;
    let prompt = llm.prompt();
    assert!(prompt.contains("Yassine Brahimi"));
    assert!(prompt.contains("3 key insights"));
}

// =========================================================================
// professional_message
// =========================================================================

#[tokio::test]
async fn message_returns_model_text() {
    let llm = MockLlm::new(vec![Ok("Dear supervisor, ...".to_string())]);
    let names = vec!["Yassine".to_string(), "Sara".to_string()];

    let text = professional_message(&llm, "Mr. Kaddour", &names, "2026-03-14").await;
    assert_eq!(text, "Dear supervisor, ...");
}

#[tokio::test]
async fn message_failure_yields_exact_fallback() {
    let llm = MockLlm::new(vec![Err(LlmError::ApiResponse { status: 500, body: String::new() })]);
    let text = professional_message(&llm, "Mr. Kaddour", &[], "2026-03-14").await;
    assert_eq!(text, "Failed to generate professional message.");
}

#[tokio::test]
async fn message_prompt_names_teacher_students_and_date() {
    let llm = MockLlm::new(vec![Ok("ok".to_string())]);
    let names = vec!["Yassine".to_string(), "Sara".to_string()];

    professional_message(&llm, "Mr. Kaddour", &names, "2026-03-14").await;
    let prompt = llm.prompt();
    assert!(prompt.contains("Mr. Kaddour"));
    assert!(prompt.contains("Yassine, Sara"));
    assert!(prompt.contains("2026-03-14"));
}
