//! LLM Provider trait

use crate::types::{LlmRequest, StreamDelta};
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Stream type for LLM responses
pub type LlmStream = Pin<Box<dyn Stream<Item = LlmResult<StreamDelta>> + Send>>;

/// LLM Provider trait
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Stream a completion response.
    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream>;

    /// Drain the stream into the final answer text. Thinking deltas are dropped.
    async fn complete(&self, request: LlmRequest) -> LlmResult<String> {
        let mut stream = self.complete_stream(request).await?;
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::Text(t) => text.push_str(&t),
                StreamDelta::Thinking(_) => {}
                StreamDelta::Done { .. } => break,
                StreamDelta::Error(e) => return Err(LlmError::StreamError(e)),
            }
        }
        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty completion".into()));
        }
        Ok(text)
    }
}
