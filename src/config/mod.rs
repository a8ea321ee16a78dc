//! Configuration management for promptdeck
//!
//! Two layers:
//! - [`Settings`]: application settings read from `config.toml` in the user
//!   config directory (data directory, provider endpoints).
//! - [`ConfigStore`]: the provider keys/models record, persisted alongside
//!   history and usage in the data directory.

mod store;

pub use store::{mask_secret, ConfigField, ConfigPatch, ConfigStore, ProviderConfig, CONFIG_KEY};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub endpoints: EndpointSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    /// Where the namespaced records live (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
}

/// Provider endpoints, overridable for proxies and local testing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Base for `{base}/{model}:generateContent`
    pub gemini: String,
    /// Full chat completions URL
    pub groq: String,
    /// Full chat completions URL
    pub huggingface: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            gemini: "https://generativelanguage.googleapis.com/v1/models".to_string(),
            groq: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            huggingface: "https://router.huggingface.co/v1/chat/completions".to_string(),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "promptdeck")
}

impl Settings {
    /// Load settings from the default location or fall back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Settings::default())
        }
    }

    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Effective data directory: explicit override, then settings, then the
    /// platform data dir
    pub fn data_dir(&self, override_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = override_dir {
            return dir.to_path_buf();
        }
        if let Some(dir) = &self.storage.data_dir {
            return dir.clone();
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".promptdeck"))
    }
}
