use super::{Completion, CompletionProvider, ProviderError};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

const SYSTEM_PROMPT: &str = "You are a study assistant. Answer using the provided class \
material when it is relevant, and say so when it is not. Keep answers focused and cite \
which document you drew on.";

/// Client for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "PROVIDER_API_KEY is not set".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: i64,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    #[instrument(skip(self, user_message, context), fields(model = %self.model))]
    async fn complete(
        &self,
        user_message: &str,
        context: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        let mut messages = vec![json!({"role": "system", "content": SYSTEM_PROMPT})];
        if let Some(context) = context {
            messages.push(json!({
                "role": "system",
                "content": format!("Class material:\n{}", context)
            }));
        }
        messages.push(json!({"role": "user", "content": user_message}));

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError(format!("{}: {}", status, body)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices returned".to_string()))?;

        debug!(tokens = completion.usage.total_tokens, "Completion received");

        Ok(Completion {
            text: choice.message.content,
            total_tokens: completion.usage.total_tokens,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
