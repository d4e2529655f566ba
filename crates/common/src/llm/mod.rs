//! Language-model service abstraction
//!
//! Provides a unified interface for the completion service used by the
//! query classifier and the hypothesis generator:
//! - OpenAI-compatible chat completion endpoints
//! - Scripted mock for tests
//!
//! Calls are side-effect free on retry; retries are bounded (pending ->
//! retrying(<= max_attempts) -> complete | exhausted), never an open loop.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// A completed generation with its token cost
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text
    pub text: String,

    /// Tokens consumed by the call (prompt + completion)
    pub tokens_used: usize,
}

/// Trait for text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for a prompt within a token budget
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<Completion>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat completion client
pub struct HttpLanguageModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    max_attempts: u32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: usize,
}

impl HttpLanguageModel {
    /// Create a new client against an OpenAI-compatible endpoint
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            timeout,
            max_attempts: max_attempts.max(1),
        })
    }

    async fn request_with_retry(&self, prompt: &str, max_tokens: usize) -> Result<Completion> {
        with_retry(self.max_attempts, || self.make_request(prompt, max_tokens)).await
    }

    async fn make_request(&self, prompt: &str, max_tokens: usize) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::LlmTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::LlmError {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::LlmError {
            message: format!("Failed to parse response: {}", e),
        })?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LlmError {
                message: "Empty completion".to_string(),
            })?;

        let tokens_used = result.usage.map(|u| u.total_tokens).unwrap_or(0);

        Ok(Completion { text, tokens_used })
    }
}

/// Run `op` up to `max_attempts` times with exponential backoff.
///
/// Bounded, never an open loop: after the last failure the whole call ends
/// in `LlmExhausted` carrying the attempt count and the final error.
async fn with_retry<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    error = %e,
                    "Completion request failed, retrying"
                );
                last_error = Some(e);
            }
        }
    }

    Err(AppError::LlmExhausted {
        attempts: max_attempts,
        message: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<Completion> {
        self.request_with_retry(prompt, max_tokens).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scripted mock for testing
///
/// Replies with queued responses in order; an exhausted queue or a scripted
/// failure yields an `LlmError`.
pub struct MockLanguageModel {
    responses: Mutex<VecDeque<Result<String>>>,
}

impl MockLanguageModel {
    /// Mock that answers each call with the next queued text
    pub fn with_responses(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|s| Ok(s.to_string())).collect()),
        }
    }

    /// Mock that fails every call
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a scripted failure
    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .expect("mock lock poisoned")
            .push_back(Err(AppError::LlmError {
                message: message.to_string(),
            }));
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, _prompt: &str, max_tokens: usize) -> Result<Completion> {
        let next = self
            .responses
            .lock()
            .expect("mock lock poisoned")
            .pop_front();

        match next {
            Some(Ok(text)) => Ok(Completion {
                text,
                tokens_used: max_tokens.min(64),
            }),
            Some(Err(e)) => Err(e),
            None => Err(AppError::LlmError {
                message: "Mock has no scripted response".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

/// Create a language model based on configuration
pub fn create_language_model(config: &crate::config::LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" | "local" => {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| AppError::Configuration {
                    message: "Completion API key required".to_string(),
                })?;
            Ok(Arc::new(HttpLanguageModel::new(
                key,
                Some(config.model.clone()),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
                config.max_attempts,
            )?))
        }
        "mock" => Ok(Arc::new(MockLanguageModel::with_responses(vec![]))),
        other => Err(AppError::Configuration {
            message: format!("Unknown completion provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scripted_responses() {
        let model = MockLanguageModel::with_responses(vec!["first", "second"]);
        let a = model.complete("p", 100).await.unwrap();
        let b = model.complete("p", 100).await.unwrap();
        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
    }

    #[tokio::test]
    async fn test_mock_exhausted_queue_errors() {
        let model = MockLanguageModel::failing();
        let err = model.complete("p", 100).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let err = with_retry::<Completion, _, _>(3, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::LlmError {
                    message: "service down".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, AppError::LlmExhausted { attempts: 3, .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_retry_recovers_before_exhaustion() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let completion = with_retry(3, move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AppError::LlmError {
                        message: "transient".to_string(),
                    })
                } else {
                    Ok(Completion {
                        text: "recovered".to_string(),
                        tokens_used: 4,
                    })
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(completion.text, "recovered");
    }

    #[tokio::test]
    async fn test_mock_scripted_error() {
        let model = MockLanguageModel::with_responses(vec![]);
        model.push_error("service down");
        let err = model.complete("p", 100).await.unwrap_err();
        assert!(matches!(err, AppError::LlmError { .. }));
    }
}
