//! Gemini `generateContent` API client.
//!
//! One endpoint, two request shapes: free text, and JSON-mode responses
//! constrained by a declared schema (`responseMimeType` +
//! `responseSchema`). The client returns the first candidate's
//! concatenated text parts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::LlmTimeouts;
use super::types::LlmError;

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Build a Gemini client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(api_key: String, base_url: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, base_url })
    }

    /// Request a completion. `generation_config` switches on JSON mode.
    pub async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
        generation_config: Option<GenerationConfig>,
    ) -> Result<String, LlmError> {
        let body = GenerateContentRequest {
            contents: vec![Content { role: "user", parts: vec![Part { text: prompt }] }],
            generation_config,
        };
        let text = self.send_json(model, &body).await?;
        parse_generate_response(&text)
    }

    async fn send_json(&self, model: &str, body: &impl Serialize) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }
        Ok(text)
    }
}

// =============================================================================
// WIRE TYPES — request
// =============================================================================

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// JSON-mode switches for `generateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: &'static str,
    pub response_schema: serde_json::Value,
}

impl GenerationConfig {
    /// Constrain the response to JSON matching `schema`.
    #[must_use]
    pub fn json(schema: serde_json::Value) -> Self {
        Self { response_mime_type: "application/json", response_schema: schema }
    }
}

// =============================================================================
// WIRE TYPES — response
// =============================================================================

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn parse_generate_response(raw: &str) -> Result<String, LlmError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(raw).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(LlmError::ApiParse("no text in first candidate".into()));
    }
    Ok(text)
}

#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;
