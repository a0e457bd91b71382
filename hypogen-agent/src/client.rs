//! LlmClient - the model-call collaborator used by the hypothesis loop.
//!
//! Wraps a backend with per-call timeouts, an optional seeded response
//! cache, and order-preserving batched generation with bounded concurrency.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::traits::{CompletionRequest, LlmBackend, LlmError};
use crate::cache::ResponseCache;
use crate::request::Prompt;

/// Configuration for model calls.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Default maximum tokens per completion
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Per-call timeout (ms)
    pub timeout_ms: u64,
    /// Default cap on in-flight calls for batched generation
    pub max_concurrent: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: Some(1e-5),
            timeout_ms: 60_000,
            max_concurrent: 3,
        }
    }
}

/// Model caller shared by generation and inference.
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
    cache: Arc<ResponseCache>,
    config: ClientConfig,
}

impl LlmClient {
    /// Create a client over a backend.
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            cache: Arc::new(ResponseCache::new()),
            config: ClientConfig::default(),
        }
    }

    /// Create with configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing response cache.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Identifier of the underlying model.
    pub fn model_id(&self) -> &str {
        self.backend.id()
    }

    /// Whether the backend answers. Used as a startup check.
    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    /// Current configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Generate a single response.
    ///
    /// With `cache_seed` set, a cached response for the same seed and prompt
    /// is returned without calling the backend.
    pub async fn generate(
        &self,
        prompt: &Prompt,
        cache_seed: Option<u64>,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        let cache_key = cache_seed.map(|seed| ResponseCache::key(seed, self.backend.id(), prompt));

        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key) {
                debug!(model = %self.backend.id(), "Response cache hit");
                return Ok(hit);
            }
        }

        let mut request = CompletionRequest::new(prompt.clone())
            .with_max_tokens(max_tokens.unwrap_or(self.config.max_tokens));
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let response = tokio::time::timeout(timeout, self.backend.complete(request))
            .await
            .map_err(|_| LlmError::Timeout(self.config.timeout_ms))??;

        if response.truncated {
            debug!(model = %self.backend.id(), "Completion stopped at the token limit");
        }
        if let Some(key) = cache_key {
            self.cache.insert(key, response.content.clone());
        }

        Ok(response.content)
    }

    /// Generate responses for a batch of prompts.
    ///
    /// At most `max_concurrent` calls are in flight; the output is aligned
    /// 1:1 with `prompts`. A failed or timed-out call yields `None` for that
    /// slot only.
    pub async fn batched_generate(
        &self,
        prompts: &[Prompt],
        cache_seed: Option<u64>,
        max_concurrent: usize,
    ) -> Vec<Option<String>> {
        let limit = max_concurrent.max(1);
        debug!(
            model = %self.backend.id(),
            batch = prompts.len(),
            max_concurrent = limit,
            "Issuing batched generation"
        );

        let calls: Vec<_> = prompts
            .iter()
            .enumerate()
            .map(|(index, prompt)| self.generate_slot(index, prompt, cache_seed))
            .collect();
        stream::iter(calls).buffered(limit).collect().await
    }

    async fn generate_slot(
        &self,
        index: usize,
        prompt: &Prompt,
        cache_seed: Option<u64>,
    ) -> Option<String> {
        match self.generate(prompt, cache_seed, None).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(index, error = %e, "Model call failed, abstaining for this prompt");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::traits::CompletionResponse;
    use crate::backend::MockBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps longer for earlier prompts and records peak concurrency.
    struct SlowBackend {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowBackend {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for SlowBackend {
        fn id(&self) -> &str {
            "slow"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let n: u64 = request.user_text().parse().unwrap_or(0);
            if n == 99 {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return Err(LlmError::RequestFailed("boom".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(40 - n * 5)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(CompletionResponse::complete(format!("answer {}", n)))
        }
    }

    #[tokio::test]
    async fn test_batched_generate_preserves_order() {
        let backend = Arc::new(SlowBackend::new());
        let client = LlmClient::new(backend.clone());

        let prompts: Vec<Prompt> = (0..6).map(|i| Prompt::new(i.to_string())).collect();
        let responses = client.batched_generate(&prompts, None, 2).await;

        let expected: Vec<Option<String>> =
            (0..6).map(|i| Some(format!("answer {}", i))).collect();
        assert_eq!(responses, expected);
        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failed_call_degrades_to_none() {
        let client = LlmClient::new(Arc::new(SlowBackend::new()));

        let prompts = vec![Prompt::new("1"), Prompt::new("99"), Prompt::new("2")];
        let responses = client.batched_generate(&prompts, None, 3).await;

        assert_eq!(responses[0].as_deref(), Some("answer 1"));
        assert!(responses[1].is_none());
        assert_eq!(responses[2].as_deref(), Some("answer 2"));
    }

    #[tokio::test]
    async fn test_seeded_cache_skips_backend() {
        let backend = Arc::new(MockBackend::default().with_response("cached"));
        let client = LlmClient::new(backend.clone());
        let prompt = Prompt::new("same prompt");

        client.generate(&prompt, Some(7), None).await.unwrap();
        client.generate(&prompt, Some(7), None).await.unwrap();
        assert_eq!(backend.call_count(), 1);

        client.generate(&prompt, None, None).await.unwrap();
        client.generate(&prompt, Some(8), None).await.unwrap();
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_availability_follows_backend() {
        let up = LlmClient::new(Arc::new(MockBackend::default()));
        let down = LlmClient::new(Arc::new(MockBackend::default().with_available(false)));

        assert!(up.is_available().await);
        assert!(!down.is_available().await);
    }

    #[tokio::test]
    async fn test_timeout() {
        let client = LlmClient::new(Arc::new(SlowBackend::new())).with_config(ClientConfig {
            timeout_ms: 1,
            ..Default::default()
        });

        let result = client.generate(&Prompt::new("0"), None, None).await;
        assert!(matches!(result, Err(LlmError::Timeout(1))));
    }
}
