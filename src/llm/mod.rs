//! LLM — hosted generative-AI adapter for attendance insights.
//!
//! DESIGN
//! ======
//! Configured from environment variables. `LlmClient` wraps the Gemini
//! `generateContent` client behind the provider-neutral [`GenerateText`]
//! trait so services can be tested against a mock.

pub mod config;
pub mod gemini;
pub mod types;

use config::LlmConfig;
use gemini::{GeminiClient, GenerationConfig};
pub use types::GenerateText;
use types::LlmError;

// =============================================================================
// CLIENT
// =============================================================================

/// Concrete LLM client configured from the environment.
pub struct LlmClient {
    inner: GeminiClient,
    model: String,
}

impl LlmClient {
    /// Build an LLM client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(config)
    }

    /// Build an LLM client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let model = config.model.clone();
        let inner = GeminiClient::new(config.api_key, config.base_url, config.timeouts)?;
        Ok(Self { inner, model })
    }

    /// Return the configured model name (e.g. `"gemini-3-flash-preview"`).
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl GenerateText for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.inner.generate_content(&self.model, prompt, None).await
    }

    async fn generate_json(&self, prompt: &str, schema: serde_json::Value) -> Result<String, LlmError> {
        self.inner
            .generate_content(&self.model, prompt, Some(GenerationConfig::json(schema)))
            .await
    }
}
