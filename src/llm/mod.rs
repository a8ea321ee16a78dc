//! LLM provider adapters

mod error;
mod gemini;
mod openai_compat;
mod types;

pub use error::LlmError;
pub use gemini::{normalize_model_name, GeminiAdapter};
pub use openai_compat::{create_groq, create_huggingface, OpenAiCompatAdapter, OpenAiCompatConfig};
pub use types::{Provider, UnknownProvider};

use crate::config::{ConfigStore, EndpointSettings};
use async_trait::async_trait;
use std::sync::Arc;

/// One prompt in, one reply text out
///
/// Implementations do transport only; history and usage bookkeeping belong to
/// the dispatcher.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, provider: Provider, prompt: &str) -> Result<String, LlmError>;
}

/// Real HTTP adapters for all three providers
///
/// Key and model are read from the [`ConfigStore`] on every call, so a
/// configuration change takes effect on the next prompt.
pub struct HttpCompleter {
    config: Arc<ConfigStore>,
    gemini: GeminiAdapter,
    groq: OpenAiCompatAdapter,
    huggingface: OpenAiCompatAdapter,
}

impl HttpCompleter {
    pub fn new(config: Arc<ConfigStore>, endpoints: &EndpointSettings) -> Self {
        let client = reqwest::Client::new();
        Self {
            config,
            gemini: GeminiAdapter::new(client.clone(), endpoints.gemini.clone()),
            groq: create_groq(client.clone(), endpoints.groq.clone()),
            huggingface: create_huggingface(client, endpoints.huggingface.clone()),
        }
    }
}

#[async_trait]
impl Completer for HttpCompleter {
    async fn complete(&self, provider: Provider, prompt: &str) -> Result<String, LlmError> {
        let api_key = self.config.key_for(provider);
        if api_key.is_empty() {
            return Err(LlmError::MissingKey(provider));
        }
        let model = self.config.model_for(provider);

        match provider {
            Provider::Gemini => self.gemini.generate(&api_key, &model, prompt).await,
            Provider::Groq => self.groq.chat(&api_key, &model, prompt).await,
            Provider::HuggingFace => self.huggingface.chat(&api_key, &model, prompt).await,
        }
    }
}
