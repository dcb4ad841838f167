//! LLM client used by the router and the analysis agents.
//!
//! Every external model call in the crate goes through [`LlmClient`]:
//! a system prompt and a user prompt in, one JSON object out. The
//! production implementation talks to Ollama's chat API in JSON mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from a single LLM call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to LLM endpoint at {0}")]
    Connect(String),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM returned invalid JSON: {0}")]
    InvalidJson(String),

    #[error("failed to send request: {0}")]
    Request(String),
}

impl LlmError {
    /// Transport-level failures worth another attempt.
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::Connect(_) | LlmError::Request(_) => true,
            LlmError::Api { status, .. } => *status >= 500 || *status == 429,
            LlmError::InvalidJson(_) => false,
        }
    }
}

/// A prompt for a JSON-returning completion.
#[derive(Debug, Clone)]
pub struct JsonPrompt {
    pub system: String,
    pub user: String,
}

impl JsonPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Prompt in, structured JSON out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_json(&self, prompt: &JsonPrompt) -> Result<Value, LlmError>;

    fn model_name(&self) -> &str;
}

/// Configuration for the Ollama client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub retries: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.1,
            timeout_seconds: 60,
            retries: 2,
        }
    }
}

/// Message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    format: &'static str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// [`LlmClient`] backed by a local or remote Ollama server.
pub struct OllamaClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: ClientConfig) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn send_once(&self, prompt: &JsonPrompt) -> Result<Value, LlmError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: &self.config.model_name,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            format: "json",
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout_seconds)
                } else if e.is_connect() {
                    LlmError::Connect(self.config.ollama_url.clone())
                } else {
                    LlmError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidJson(e.to_string()))?;

        parse_json_content(&chat_response.message.content)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete_json(&self, prompt: &JsonPrompt) -> Result<Value, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.retries => {
                    attempt += 1;
                    warn!("LLM call failed ({}), retry {}/{}", e, attempt, self.config.retries);
                    tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Extract a JSON object from model output.
///
/// JSON mode normally yields a bare object, but some models still wrap
/// it in a Markdown fence or add a sentence around it.
pub fn parse_json_content(content: &str) -> Result<Value, LlmError> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            debug!("Recovering JSON object from wrapped model output");
            return serde_json::from_str::<Value>(&trimmed[start..=end])
                .map_err(|e| LlmError::InvalidJson(e.to_string()));
        }
    }

    Err(LlmError::InvalidJson(format!(
        "no JSON object in response: {}",
        truncate(trimmed, 120)
    )))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
