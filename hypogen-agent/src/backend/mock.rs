//! Scripted backend for tests and dry runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::traits::*;

type Handler = Arc<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// Answers with a fixed text, or with whatever a handler computes from the
/// request. Counts every call.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    fixed: String,
    handler: Option<Handler>,
    calls: AtomicU32,
}

impl MockBackend {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            fixed: String::new(),
            handler: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Answer every call with `content`.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.fixed = content.into();
        self
    }

    /// Compute each answer from the request.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// An unavailable mock fails its availability check and every call.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable(self.model_id.clone()));
        }

        let content = match &self.handler {
            Some(handler) => handler(&request)?,
            None => self.fixed.clone(),
        };
        Ok(CompletionResponse::complete(content))
    }
}
