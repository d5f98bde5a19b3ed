use super::{Completion, CompletionProvider, ProviderError};
use async_trait::async_trait;

/// Canned provider for tests: fixed reply and token count, or a forced
/// failure.
pub struct MockCompletionProvider {
    reply: String,
    total_tokens: i64,
    fail: bool,
}

impl MockCompletionProvider {
    pub fn succeeding(reply: &str, total_tokens: i64) -> Self {
        Self {
            reply: reply.to_string(),
            total_tokens,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: String::new(),
            total_tokens: 0,
            fail: true,
        }
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(
        &self,
        _user_message: &str,
        _context: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        if self.fail {
            return Err(ProviderError::ApiError("mock failure".to_string()));
        }
        Ok(Completion {
            text: self.reply.clone(),
            total_tokens: self.total_tokens,
        })
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
