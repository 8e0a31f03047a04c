//! Hugging Face inference client.
//!
//! Talks to the Hugging Face router's OpenAI-compatible chat-completions
//! endpoint. One request per call: the pipeline owns the overall deadline and
//! falls back to templates on failure, so there is no retry loop here.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default chat model served through the router.
pub const DEFAULT_MODEL: &str = "deepseek-ai/DeepSeek-V3.2:novita";

/// Router chat-completions endpoint.
pub const DEFAULT_BASE_URL: &str = "https://router.huggingface.co/v1/chat/completions";

/// Prefix every valid access token carries.
pub const TOKEN_PREFIX: &str = "hf_";

const MAX_TOKENS: u32 = 512;

/// Hugging Face client configuration.
#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    /// Access token, sent as a bearer token.
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl HuggingFaceConfig {
    /// Creates a new config with the given token.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the endpoint URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Returns true if `token` looks like a Hugging Face access token.
pub fn is_valid_token(token: &str) -> bool {
    token.trim().starts_with(TOKEN_PREFIX)
}

/// Hugging Face LLM client.
#[derive(Debug, Clone)]
pub struct HuggingFaceClient {
    config: HuggingFaceConfig,
    client: Client,
}

impl HuggingFaceClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: HuggingFaceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TallyError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| ChatMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Maps a non-success HTTP response to an error.
    fn parse_error(status: reqwest::StatusCode, body: &str) -> TallyError {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return TallyError::llm("Authentication failed. Check your HF_TOKEN.");
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return TallyError::llm("Rate limited by the inference provider.");
        }

        if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(body) {
            return TallyError::llm(format!(
                "Inference API error: {}",
                error_response.error.message()
            ));
        }

        TallyError::llm(format!("Inference API error ({}): {}", status, body))
    }
}

#[async_trait]
impl LlmClient for HuggingFaceClient {
    async fn complete(&self, model: &str, messages: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: Self::convert_messages(messages),
            temperature: 0.0,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        debug!(model = %model, "Sending chat completion request");

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TallyError::timeout("Inference request timed out")
                } else if e.is_connect() {
                    TallyError::llm("Failed to connect to the inference API. Check your network.")
                } else {
                    TallyError::llm(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TallyError::llm(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &body));
        }

        let response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| TallyError::llm(format!("Failed to parse response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TallyError::llm("Empty response from inference API"))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// The router returns either `{"error": "..."}` or `{"error": {"message": "..."}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Text(String),
    Detailed { message: String },
}

impl ErrorBody {
    fn message(&self) -> &str {
        match self {
            Self::Text(message) | Self::Detailed { message } => message,
        }
    }
}
