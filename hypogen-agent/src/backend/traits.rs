//! The backend seam: one rendered prompt in, one completion out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::request::Prompt;

/// Why a model call produced no text.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// The server could not be reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The server answered with an error status
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The call did not finish in time
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// The response body was not a completion
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// An inference engine answering single-turn prompts.
///
/// Implementations must be shareable across the concurrent calls issued by
/// [`crate::LlmClient::batched_generate`].
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Model identifier, also part of the response cache key.
    fn id(&self) -> &str;

    /// Whether the backend answers at all. Checked once before a run.
    async fn is_available(&self) -> bool;

    /// Complete one prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// A prompt plus sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: Prompt,
    pub max_tokens: Option<u32>,
    /// Clamped to 0.0-2.0
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Request with only a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Prompt::new(content))
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp.clamp(0.0, 2.0));
        self
    }

    /// The user turn.
    pub fn user_text(&self) -> &str {
        &self.prompt.user
    }
}

/// Completion text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    /// Generation stopped at the token limit
    pub truncated: bool,
}

impl CompletionResponse {
    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            truncated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_keeps_prompt() {
        let prompt = Prompt::new("Classify this").with_system("You are a scientist");
        let request = CompletionRequest::new(prompt).with_max_tokens(64);

        assert_eq!(request.prompt.system.as_deref(), Some("You are a scientist"));
        assert_eq!(request.user_text(), "Classify this");
        assert_eq!(request.max_tokens, Some(64));
    }

    #[test]
    fn test_temperature_clamped() {
        let request = CompletionRequest::user("hi").with_temperature(5.0);
        assert_eq!(request.temperature, Some(2.0));
    }
}
