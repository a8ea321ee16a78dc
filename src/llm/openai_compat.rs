//! OpenAI-compatible chat completions adapter
//!
//! Groq and the Hugging Face router both speak this format with a bearer
//! token; they differ only in endpoint, system prompt and limits.
//!
//! SECURITY: Credentials are only sent to the configured endpoint.

use super::LlmError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Types
// ============================================================================

/// Configuration for an OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Provider name for logs (e.g., "groq", "hf")
    pub name: String,
    /// Full chat completions URL
    pub base_url: String,
    /// Optional leading system message
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl OpenAiCompatConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

// ============================================================================
// Adapter
// ============================================================================

pub struct OpenAiCompatAdapter {
    client: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatAdapter {
    pub fn new(client: reqwest::Client, config: OpenAiCompatConfig) -> Self {
        Self { client, config }
    }

    fn build_request(&self, model: &str, prompt: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.config.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        ChatRequest {
            model: model.to_string(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    pub async fn chat(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!(
            provider = self.config.name.as_str(),
            model,
            "Sending chat request"
        );

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(api_key)
            .json(&self.build_request(model, prompt))
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_response(status, &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(LlmError::from_network_error)?;
        self.parse_response(body)
    }

    /// `choices[0].message.content`, verbatim
    fn parse_response(&self, response: ChatResponse) -> Result<String, LlmError> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                LlmError::InvalidResponse(format!("{} returned no message content", self.config.name))
            })
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// Groq chat completions
pub fn create_groq(client: reqwest::Client, base_url: impl Into<String>) -> OpenAiCompatAdapter {
    OpenAiCompatAdapter::new(client, OpenAiCompatConfig::new("groq", base_url))
}

/// Hugging Face router chat completions
pub fn create_huggingface(
    client: reqwest::Client,
    base_url: impl Into<String>,
) -> OpenAiCompatAdapter {
    OpenAiCompatAdapter::new(
        client,
        OpenAiCompatConfig::new("hf", base_url)
            .with_system_prompt("You are a helpful assistant.")
            .with_max_tokens(1000),
    )
}

// ============================================================================
// Tests
// ============================================================================
