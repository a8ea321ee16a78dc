//! Google Gemini `generateContent` adapter
//!
//! SECURITY: the API key travels as the `key` query parameter and is only
//! ever sent to the configured Gemini endpoint. It is never logged.

use super::LlmError;
use serde::{Deserialize, Serialize};

pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Request URL for `model`, without credentials
    pub fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            normalize_model_name(model)
        )
    }

    pub async fn generate(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, LlmError> {
        let url = self.endpoint(model);
        tracing::debug!(provider = "gemini", url = url.as_str(), "Sending request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&GeminiRequest::from_prompt(prompt))
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_response(status, &body));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(LlmError::from_network_error)?;
        body.into_text()
    }
}

/// Gemini wants a bare model name; the UI may store `models/...` or another
/// namespaced form
pub fn normalize_model_name(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

impl GeminiRequest {
    fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl GeminiResponse {
    /// `candidates[0].content.parts[0].text`, verbatim
    fn into_text(self) -> Result<String, LlmError> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| LlmError::InvalidResponse("Gemini returned no candidate text".to_string()))
    }
}
