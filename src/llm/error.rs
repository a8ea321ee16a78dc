//! Typed errors for provider calls
//!
//! Every variant is scoped to one provider; the dispatcher turns them into an
//! inline message and never lets one abort the other calls.

use super::Provider;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured; the request was never sent
    #[error("{} API key is required", .0.display_name())]
    MissingKey(Provider),

    /// Non-2xx response
    ///
    /// `message` comes from the body's `error` field when there is one,
    /// otherwise it is `HTTP {status}`.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Connection refused, DNS failure, timeout and the like
    #[error("Network error: {0}")]
    Network(String),

    /// 2xx response without the expected reply text
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Build an `Http` error from a failed response
    pub fn from_http_response(status: reqwest::StatusCode, body: &str) -> Self {
        let message = extract_error_message(body)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        LlmError::Http {
            status: status.as_u16(),
            message,
        }
    }

    /// Convert transport errors
    ///
    /// The request URL is dropped first: Gemini carries the API key in it.
    pub fn from_network_error(e: reqwest::Error) -> Self {
        let e = e.without_url();
        if e.is_timeout() {
            LlmError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            LlmError::Network(format!("Connection failed: {}", e))
        } else if e.is_decode() {
            LlmError::InvalidResponse(e.to_string())
        } else {
            LlmError::Network(e.to_string())
        }
    }

    /// HTTP status, for `Http` errors
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_missing_key(&self) -> bool {
        matches!(self, LlmError::MissingKey(_))
    }
}

/// `error.message`, or `error` itself when it is a plain string
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = match error {
        serde_json::Value::String(s) => s.as_str(),
        other => other.get("message")?.as_str()?,
    };
    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}
