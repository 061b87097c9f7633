//! HTTP clients for text-completion services.
//!
//! Two flavours are supported:
//! - Ollama's `/api/chat` endpoint (local models)
//! - OpenAI-compatible `/chat/completions` endpoints
//!
//! Both send the prompt as a single user message and return the text of
//! the first reply. Streaming is never requested.

use crate::agent::traits::CompletionService;
use crate::config::{ModelConfig, Provider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Connection settings shared by both clients.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub api_key: Option<String>,
}

impl From<&ModelConfig> for LlmSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            base_url: config.effective_base_url(),
            model: config.effective_name(),
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
            api_key: config.api_key.clone(),
        }
    }
}

/// Message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
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

/// OpenAI chat completions request.
#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

/// OpenAI chat completions response.
#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

fn build_http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .context("Failed to create HTTP client")
}

/// Map a transport error to a message naming the likely cause.
fn describe_send_error(e: reqwest::Error, settings: &LlmSettings) -> anyhow::Error {
    if e.is_timeout() {
        anyhow::anyhow!("Request timed out after {}s", settings.timeout_seconds)
    } else if e.is_connect() {
        anyhow::anyhow!("Cannot connect to language model at {}", settings.base_url)
    } else {
        anyhow::anyhow!("Failed to send request: {}", e)
    }
}

/// Client for a local Ollama server.
pub struct OllamaClient {
    settings: LlmSettings,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let http_client = build_http_client(settings.timeout_seconds)?;
        Ok(Self {
            settings,
            http_client,
        })
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.settings.base_url);

        let request = OllamaChatRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            stream: false,
            options: OllamaOptions {
                temperature: self.settings.temperature,
            },
        };

        debug!("POST {} ({} prompt chars)", url, prompt.len());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| describe_send_error(e, &self.settings))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {}: {}", status, body));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat_response.message.content)
    }

    fn describe(&self) -> String {
        format!("ollama:{}", self.settings.model)
    }
}

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiClient {
    settings: LlmSettings,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .context("An API key is required for the openai provider (use --api-key or OPENAI_API_KEY)")?;

        let http_client = build_http_client(settings.timeout_seconds)?;
        Ok(Self {
            settings,
            api_key,
            http_client,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.settings.base_url);

        let request = OpenAiChatRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.settings.temperature,
        };

        debug!("POST {} ({} prompt chars)", url, prompt.len());

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| describe_send_error(e, &self.settings))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("OpenAI API error {}: {}", status, body));
        }

        let chat_response: OpenAiChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("OpenAI response contained no choices")
    }

    fn describe(&self) -> String {
        format!("openai:{}", self.settings.model)
    }
}

/// Build the completion service selected by the configuration.
pub fn build_completion_service(config: &ModelConfig) -> Result<Arc<dyn CompletionService>> {
    let settings = LlmSettings::from(config);
    let service: Arc<dyn CompletionService> = match config.provider {
        Provider::Ollama => Arc::new(OllamaClient::new(settings)?),
        Provider::Openai => Arc::new(OpenAiClient::new(settings)?),
    };
    Ok(service)
}
