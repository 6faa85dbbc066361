//! Completion service implementations.

use std::sync::Arc;

use async_trait::async_trait;
use relaygraph_core::config::{CompletionConfig, CompletionProvider};
use relaygraph_core::{CompletionError, CompletionOptions, CompletionService};

/// Offline completion: answers with the last non-empty line of the prompt.
///
/// Deterministic, needs no network. Used when `completion.provider = "echo"`.
#[derive(Debug, Clone, Default)]
pub struct EchoCompletion;

#[async_trait]
impl CompletionService for EchoCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        Ok(prompt
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Build the configured completion service.
pub fn completion_from_config(
    config: &CompletionConfig,
) -> Result<Arc<dyn CompletionService>, CompletionError> {
    match config.provider {
        CompletionProvider::Echo => Ok(Arc::new(EchoCompletion)),
        #[cfg(feature = "network")]
        CompletionProvider::OpenAi => Ok(Arc::new(openai::OpenAiCompletion::from_config(config)?)),
        #[cfg(not(feature = "network"))]
        CompletionProvider::OpenAi => Err(CompletionError::NotConfigured(
            "the openai provider requires the `network` feature".to_string(),
        )),
    }
}

#[cfg(feature = "network")]
pub mod openai {
    //! OpenAI-compatible chat-completions client.

    use std::time::Duration;

    use async_trait::async_trait;
    use relaygraph_core::config::CompletionConfig;
    use relaygraph_core::{CompletionError, CompletionOptions, CompletionService};
    use serde::{Deserialize, Serialize};
    use tracing::{debug, warn};

    const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

    #[derive(Debug, Serialize)]
    struct ChatMessage<'a> {
        role: &'a str,
        content: &'a str,
    }

    #[derive(Debug, Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: Vec<ChatMessage<'a>>,
        temperature: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    }

    #[derive(Debug, Deserialize)]
    struct ChatResponse {
        choices: Vec<ChatChoice>,
    }

    #[derive(Debug, Deserialize)]
    struct ChatChoice {
        message: ChatMessageResponse,
    }

    #[derive(Debug, Deserialize)]
    struct ChatMessageResponse {
        #[serde(default)]
        content: Option<String>,
    }

    /// Client for `POST {endpoint}/chat/completions`.
    ///
    /// Retries connection failures, timeouts, 429 and 5xx answers up to
    /// `max_retries` times with exponential backoff.
    #[derive(Debug, Clone)]
    pub struct OpenAiCompletion {
        client: reqwest::Client,
        url: String,
        api_key: Option<String>,
        model: String,
        temperature: f32,
        timeout: Duration,
        max_retries: u32,
        backoff: Duration,
    }

    impl OpenAiCompletion {
        /// Reads the API key from the environment variable named in the
        /// config. A missing key is an error.
        pub fn from_config(config: &CompletionConfig) -> Result<Self, CompletionError> {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                CompletionError::NotConfigured(format!(
                    "environment variable {} is not set",
                    config.api_key_env
                ))
            })?;
            Self::new(config, Some(api_key))
        }

        pub fn new(config: &CompletionConfig, api_key: Option<String>) -> Result<Self, CompletionError> {
            let client = reqwest::Client::builder()
                .timeout(config.timeout())
                .build()
                .map_err(|e| CompletionError::NotConfigured(e.to_string()))?;
            Ok(Self {
                client,
                url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
                api_key,
                model: config.model.clone(),
                temperature: config.temperature,
                timeout: config.timeout(),
                max_retries: config.max_retries,
                backoff: INITIAL_BACKOFF,
            })
        }

        /// Override the first retry delay (doubles on every retry).
        pub fn with_backoff(mut self, backoff: Duration) -> Self {
            self.backoff = backoff;
            self
        }

        async fn attempt(
            &self,
            prompt: &str,
            options: &CompletionOptions,
        ) -> Result<String, CompletionError> {
            let body = ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: options.temperature.unwrap_or(self.temperature),
                max_tokens: options.max_tokens,
            };

            let mut request = self.client.post(&self.url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout {
                        elapsed_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    CompletionError::Connection(e.to_string())
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(CompletionError::Status {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| CompletionError::InvalidResponse("missing choices".to_string()))
        }
    }

    #[async_trait]
    impl CompletionService for OpenAiCompletion {
        async fn complete(
            &self,
            prompt: &str,
            options: &CompletionOptions,
        ) -> Result<String, CompletionError> {
            let mut delay = self.backoff;
            let mut attempt = 0;
            loop {
                match self.attempt(prompt, options).await {
                    Ok(text) => {
                        debug!(model = %self.model, attempt, chars = text.len(), "Completion received");
                        return Ok(text);
                    }
                    Err(err) if err.is_retryable() && attempt < self.max_retries => {
                        attempt += 1;
                        warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "Retrying completion");
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        fn name(&self) -> &str {
            "openai"
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_last_line() {
        let echo = EchoCompletion;
        let text = echo
            .complete("context\n\nQuestion: 환불 규정은?\n  \n", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "Question: 환불 규정은?");
        assert_eq!(echo.complete("", &CompletionOptions::default()).await.unwrap(), "");
    }

    #[test]
    fn test_provider_selection() {
        let service = completion_from_config(&CompletionConfig::default()).unwrap();
        assert_eq!(service.name(), "echo");
    }
}
