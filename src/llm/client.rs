use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatRequest, CompletionResponse, Platform};
use super::LlmTransport;
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

#[derive(Clone)]
struct Endpoint {
    base_url: String,
    api_key: Option<String>,
}

/// Client for OpenAI-compatible chat-completion APIs (OpenAI and Perplexity)
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    openai: Endpoint,
    perplexity: Endpoint,
    request_config: RequestConfig,
}

impl LlmClient {
    /// Create a new client
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            openai: Endpoint {
                base_url: config.openai_base_url.trim_end_matches('/').to_string(),
                api_key: Some(config.openai_api_key.clone()),
            },
            perplexity: Endpoint {
                base_url: config.perplexity_base_url.trim_end_matches('/').to_string(),
                api_key: config.perplexity_api_key.clone(),
            },
            request_config,
        })
    }

    fn endpoint(&self, platform: Platform) -> &Endpoint {
        match platform {
            Platform::OpenAi => &self.openai,
            Platform::Perplexity => &self.perplexity,
        }
    }

    /// Get the base URL for a platform (for testing)
    pub fn base_url(&self, platform: Platform) -> &str {
        &self.endpoint(platform).base_url
    }

    /// Call the chat-completions endpoint, retrying transient failures
    pub async fn call_chat(&self, request: &ChatRequest) -> LlmResult<String> {
        let endpoint = self.endpoint(request.platform);
        let api_key = endpoint
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey {
                platform: request.platform.to_string(),
            })?;
        let url = format!("{}/chat/completions", endpoint.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    label = %request.label,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying chat request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, api_key, request).await {
                Ok(content) => {
                    info!(
                        platform = %request.platform,
                        model = %request.model,
                        label = %request.label,
                        latency_ms = start.elapsed().as_millis(),
                        "Chat call succeeded"
                    );
                    return Ok(content);
                }
                Err(e) if !is_retryable(&e) => {
                    error!(
                        label = %request.label,
                        error = %e,
                        "Chat call failed with non-retryable error"
                    );
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        label = %request.label,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Chat call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LlmError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        api_key: &str,
        request: &ChatRequest,
    ) -> LlmResult<String> {
        debug!(
            label = %request.label,
            model = %request.model,
            system_len = request.system_prompt.len(),
            user_len = request.user_prompt.len(),
            "Calling chat completions"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request.to_completion_request())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            if error_body.contains("context_length_exceeded") {
                return Err(LlmError::ContextLengthExceeded {
                    message: error_body,
                });
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let completion: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        completion
            .first_content()
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "Response contained no choices".to_string(),
            })
    }
}

/// Client errors (4xx), malformed bodies and the context-length category
/// are returned as-is.
fn is_retryable(error: &LlmError) -> bool {
    match error {
        LlmError::ContextLengthExceeded { .. }
        | LlmError::InvalidResponse { .. }
        | LlmError::MissingApiKey { .. } => false,
        LlmError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => true,
    }
}

#[async_trait]
impl LlmTransport for LlmClient {
    async fn chat(&self, request: &ChatRequest) -> LlmResult<String> {
        self.call_chat(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            openai_api_key: "test_key".to_string(),
            openai_base_url: "https://api.openai.com/v1/".to_string(),
            perplexity_api_key: None,
            perplexity_base_url: "https://api.perplexity.ai".to_string(),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = LlmClient::new(&test_config(), RequestConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = LlmClient::new(&test_config(), RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(Platform::OpenAi), "https://api.openai.com/v1");
        assert_eq!(
            client.base_url(Platform::Perplexity),
            "https://api.perplexity.ai"
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_is_reported_before_any_request() {
        let client = LlmClient::new(&test_config(), RequestConfig::default()).unwrap();
        let request = ChatRequest::new(Platform::Perplexity, "sonar", "s", "u");

        let err = client.call_chat(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey { .. }));
    }

    #[test]
    fn test_retry_classification() {
        assert!(!is_retryable(&LlmError::ContextLengthExceeded {
            message: String::new()
        }));
        assert!(!is_retryable(&LlmError::Api {
            status: 400,
            message: String::new()
        }));
        assert!(is_retryable(&LlmError::Api {
            status: 429,
            message: String::new()
        }));
        assert!(is_retryable(&LlmError::Api {
            status: 503,
            message: String::new()
        }));
        assert!(!is_retryable(&LlmError::InvalidResponse {
            message: String::new()
        }));
        assert!(is_retryable(&LlmError::Timeout { timeout_ms: 1 }));
    }
}
