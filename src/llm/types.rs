//! Provider identity shared by the stores, adapters and presenter

use crate::config::ConfigField;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The three supported text-generation services
///
/// The set is closed: adding a provider means adding a variant, and every
/// `match` below (plus the history buckets and usage counters) must follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "groq")]
    Groq,
    #[serde(rename = "hf")]
    HuggingFace,
}

impl Provider {
    /// Fixed dispatch and display order
    pub const ALL: [Provider; 3] = [Provider::Gemini, Provider::Groq, Provider::HuggingFace];

    /// Identifier used in persisted records and on the command line
    pub fn id(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Groq => "groq",
            Provider::HuggingFace => "hf",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::Groq => "Groq",
            Provider::HuggingFace => "Hugging Face",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Provider::Gemini => "🤖",
            Provider::Groq => "⚡",
            Provider::HuggingFace => "🤗",
        }
    }

    pub fn default_model(self) -> &'static str {
        self.model_field().default_value()
    }

    /// Configuration field holding this provider's API key
    pub fn key_field(self) -> ConfigField {
        match self {
            Provider::Gemini => ConfigField::GeminiKey,
            Provider::Groq => ConfigField::GroqKey,
            Provider::HuggingFace => ConfigField::HfKey,
        }
    }

    /// Configuration field holding this provider's model identifier
    pub fn model_field(self) -> ConfigField {
        match self {
            Provider::Gemini => ConfigField::GeminiModel,
            Provider::Groq => ConfigField::GroqModel,
            Provider::HuggingFace => ConfigField::HfModel,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Error)]
#[error("Unknown provider: {0}. Supported: gemini, groq, hf")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "groq" => Ok(Provider::Groq),
            "hf" | "huggingface" | "hugging-face" => Ok(Provider::HuggingFace),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_ids_roundtrip() {
        for provider in Provider::ALL {
            assert_eq!(provider.id().parse::<Provider>().unwrap(), provider);
        }
    }

    #[test]
    fn test_provider_aliases() {
        assert_eq!("HuggingFace".parse::<Provider>().unwrap(), Provider::HuggingFace);
        assert_eq!("google".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!("openai".parse::<Provider>().is_err());
    }

    #[test]
    fn test_serde_uses_storage_ids() {
        let json = serde_json::to_string(&Provider::HuggingFace).unwrap();
        assert_eq!(json, "\"hf\"");
    }

    #[test]
    fn test_default_models() {
        assert_eq!(Provider::Gemini.default_model(), "gemini-2.5-flash");
        assert_eq!(Provider::Groq.default_model(), "llama-3.3-70b-versatile");
        assert_eq!(
            Provider::HuggingFace.default_model(),
            "Qwen/Qwen2.5-72B-Instruct"
        );
    }
}
