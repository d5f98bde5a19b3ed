//! Completion provider abstraction. The orchestrator only sees this trait;
//! the OpenAI-compatible client and the test mock both live behind it.

pub mod mock;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use mock::MockCompletionProvider;
pub use openai::OpenAiProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider API error: {0}")]
    ApiError(String),

    #[error("Provider network error: {0}")]
    NetworkError(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// One completed turn from the model.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub total_tokens: i64,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce a reply to `user_message`, optionally grounded in class
    /// document `context`.
    async fn complete(
        &self,
        user_message: &str,
        context: Option<&str>,
    ) -> Result<Completion, ProviderError>;

    fn model_name(&self) -> &str;
}
