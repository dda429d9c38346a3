//! Together AI chat completions client.
//!
//! Speaks the OpenAI-compatible `/chat/completions` endpoint over a blocking
//! `reqwest` client. Calls are paced by a [`RateLimiter`] and retried with
//! backoff on timeouts, connection failures, 429 and 5xx responses.

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::domain::error::TraderError;
use crate::domain::rate_limit::RateLimiter;
use crate::domain::retry::{AttemptError, RetryError, RetryPolicy};
use crate::ports::llm_port::{LlmPort, Prompt};

pub const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);
pub const API_KEY_ENV: &str = "TOGETHER_API_KEY";

#[derive(Clone, PartialEq)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub api_key: String,
    pub timeout: Duration,
    pub min_interval: Duration,
    pub retry: RetryPolicy,
}

impl LlmConfig {
    pub fn new(api_key: &str) -> Self {
        LlmConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key: api_key.to_string(),
            timeout: DEFAULT_TIMEOUT,
            min_interval: DEFAULT_MIN_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("min_interval", &self.min_interval)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
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

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn build_request<'a>(config: &'a LlmConfig, prompt: &'a Prompt) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &prompt.system,
            },
            ChatMessage {
                role: "user",
                content: &prompt.user,
            },
        ],
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Human-readable reason from an error response body.
fn error_reason(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => format!("{status}: {}", parsed.error.message),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => format!("{status}: {}", body.trim()),
    }
}

fn extract_content(body: &str) -> Result<String, String> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed completion response: {e}"))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| "completion response has no content".to_string())
}

pub struct TogetherClient {
    client: Client,
    config: LlmConfig,
    limiter: Mutex<RateLimiter>,
}

impl TogetherClient {
    pub fn new(config: LlmConfig) -> Result<Self, TraderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TraderError::Llm {
                reason: format!("cannot build HTTP client: {e}"),
            })?;
        let limiter = Mutex::new(RateLimiter::new(config.min_interval));
        Ok(TogetherClient {
            client,
            config,
            limiter,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn attempt(&self, prompt: &Prompt) -> Result<String, AttemptError<String>> {
        self.limiter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .acquire();

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&build_request(&self.config, prompt))
            .send()
            .map_err(|e| AttemptError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| AttemptError::Transient(format!("reading response failed: {e}")))?;

        if !status.is_success() {
            let reason = error_reason(status, &body);
            return Err(if is_transient_status(status) {
                AttemptError::Transient(reason)
            } else {
                AttemptError::Fatal(reason)
            });
        }

        extract_content(&body).map_err(AttemptError::Fatal)
    }
}

impl LlmPort for TogetherClient {
    fn complete(&self, prompt: &Prompt) -> Result<String, TraderError> {
        debug!(role = %prompt.role, model = %self.config.model, "requesting completion");
        self.config
            .retry
            .run(&mut thread::sleep, |_| self.attempt(prompt))
            .map_err(|e| match e {
                RetryError::Fatal(reason) => TraderError::Llm { reason },
                RetryError::Exhausted { attempts, last } => TraderError::LlmExhausted {
                    attempts,
                    reason: last,
                },
            })
    }
}
