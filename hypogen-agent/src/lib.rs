//! Hypogen Agent - model calls for hypothesis discovery
//!
//! Provides the model-call collaborator used by the hypothesis loop:
//! - Trait-based LLM backends (OpenAI-compatible servers, mock)
//! - `LlmClient` with single and batched generation
//! - Bounded concurrency with order-preserving batches
//! - Optional response cache keyed by seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              LlmClient                  │
//! │  generate / batched_generate            │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ LlmBackend  │       │ Response    │
//! │ (OpenAI/    │       │ Cache       │
//! │  Mock)      │       │             │
//! └─────────────┘       └─────────────┘
//! ```

pub mod backend;
pub mod cache;
pub mod client;
pub mod request;

// Re-export main types for convenience
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use backend::{MockBackend, OpenAiBackend};
pub use cache::ResponseCache;
pub use client::{ClientConfig, LlmClient};
pub use request::Prompt;
