//! Provider keys and model identifiers
//!
//! Persisted through [`SafeStore`] under `config` with the JSON field names
//! `geminiKey`, `groqKey`, `hfKey`, `geminiModel`, `groqModel`, `hfModel`.
//! Nothing here validates key or model format.

use crate::llm::Provider;
use crate::storage::SafeStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Storage key (without namespace prefix)
pub const CONFIG_KEY: &str = "config";

/// Addressable fields of [`ProviderConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    GeminiKey,
    GroqKey,
    HfKey,
    GeminiModel,
    GroqModel,
    HfModel,
}

impl ConfigField {
    pub const ALL: [ConfigField; 6] = [
        ConfigField::GeminiKey,
        ConfigField::GroqKey,
        ConfigField::HfKey,
        ConfigField::GeminiModel,
        ConfigField::GroqModel,
        ConfigField::HfModel,
    ];

    /// Name used in the persisted record
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigField::GeminiKey => "geminiKey",
            ConfigField::GroqKey => "groqKey",
            ConfigField::HfKey => "hfKey",
            ConfigField::GeminiModel => "geminiModel",
            ConfigField::GroqModel => "groqModel",
            ConfigField::HfModel => "hfModel",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            ConfigField::GeminiKey | ConfigField::GroqKey | ConfigField::HfKey => "",
            ConfigField::GeminiModel => "gemini-2.5-flash",
            ConfigField::GroqModel => "llama-3.3-70b-versatile",
            ConfigField::HfModel => "Qwen/Qwen2.5-72B-Instruct",
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(
            self,
            ConfigField::GeminiKey | ConfigField::GroqKey | ConfigField::HfKey
        )
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The configuration record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub gemini_key: String,
    pub groq_key: String,
    pub hf_key: String,
    pub gemini_model: String,
    pub groq_model: String,
    pub hf_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            gemini_key: ConfigField::GeminiKey.default_value().to_string(),
            groq_key: ConfigField::GroqKey.default_value().to_string(),
            hf_key: ConfigField::HfKey.default_value().to_string(),
            gemini_model: ConfigField::GeminiModel.default_value().to_string(),
            groq_model: ConfigField::GroqModel.default_value().to_string(),
            hf_model: ConfigField::HfModel.default_value().to_string(),
        }
    }
}

impl ProviderConfig {
    /// Raw stored value, possibly empty
    pub fn field(&self, field: ConfigField) -> &str {
        match field {
            ConfigField::GeminiKey => &self.gemini_key,
            ConfigField::GroqKey => &self.groq_key,
            ConfigField::HfKey => &self.hf_key,
            ConfigField::GeminiModel => &self.gemini_model,
            ConfigField::GroqModel => &self.groq_model,
            ConfigField::HfModel => &self.hf_model,
        }
    }

    fn field_mut(&mut self, field: ConfigField) -> &mut String {
        match field {
            ConfigField::GeminiKey => &mut self.gemini_key,
            ConfigField::GroqKey => &mut self.groq_key,
            ConfigField::HfKey => &mut self.hf_key,
            ConfigField::GeminiModel => &mut self.gemini_model,
            ConfigField::GroqModel => &mut self.groq_model,
            ConfigField::HfModel => &mut self.hf_model,
        }
    }

    /// Stored value, or the built-in default when empty
    pub fn get(&self, field: ConfigField) -> &str {
        let value = self.field(field);
        if value.is_empty() {
            field.default_value()
        } else {
            value
        }
    }

    pub fn has_any_key(&self) -> bool {
        Provider::ALL
            .iter()
            .any(|p| !self.field(p.key_field()).is_empty())
    }
}

/// A partial update; `None` fields are left untouched
///
/// Also the shape used to read the persisted record, so unknown or missing
/// fields never fail a load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groq_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hf_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groq_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hf_model: Option<String>,
}

impl ConfigPatch {
    pub fn get(&self, field: ConfigField) -> Option<&str> {
        match field {
            ConfigField::GeminiKey => self.gemini_key.as_deref(),
            ConfigField::GroqKey => self.groq_key.as_deref(),
            ConfigField::HfKey => self.hf_key.as_deref(),
            ConfigField::GeminiModel => self.gemini_model.as_deref(),
            ConfigField::GroqModel => self.groq_model.as_deref(),
            ConfigField::HfModel => self.hf_model.as_deref(),
        }
    }

    /// Builder-style setter
    pub fn with(mut self, field: ConfigField, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match field {
            ConfigField::GeminiKey => self.gemini_key = value,
            ConfigField::GroqKey => self.groq_key = value,
            ConfigField::HfKey => self.hf_key = value,
            ConfigField::GeminiModel => self.gemini_model = value,
            ConfigField::GroqModel => self.groq_model = value,
            ConfigField::HfModel => self.hf_model = value,
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        ConfigField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    fn apply_to(&self, config: &mut ProviderConfig, skip_empty: bool) {
        for field in ConfigField::ALL {
            match self.get(field) {
                Some(value) if skip_empty && value.is_empty() => {}
                Some(value) => *config.field_mut(field) = value.to_string(),
                None => {}
            }
        }
    }
}

/// Owner of the in-memory [`ProviderConfig`]
pub struct ConfigStore {
    store: SafeStore,
    config: Mutex<ProviderConfig>,
}

impl ConfigStore {
    /// Build the store and load the persisted record over the defaults
    pub fn load(store: SafeStore) -> Self {
        let this = Self {
            store,
            config: Mutex::new(ProviderConfig::default()),
        };
        this.reload();
        this
    }

    fn lock(&self) -> MutexGuard<'_, ProviderConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-read the persisted record; persisted values win only when non-empty
    pub fn reload(&self) -> ProviderConfig {
        let saved: ConfigPatch = self.store.load(CONFIG_KEY, ConfigPatch::default());
        let mut config = ProviderConfig::default();
        saved.apply_to(&mut config, true);

        let mut current = self.lock();
        *current = config;
        current.clone()
    }

    /// Merge `patch` into the current record and persist the full result
    pub fn save(&self, patch: &ConfigPatch) -> ProviderConfig {
        let mut current = self.lock();
        patch.apply_to(&mut current, false);
        if !self.store.save(CONFIG_KEY, &*current) {
            tracing::warn!("Configuration kept in memory only; storage is unavailable");
        }
        current.clone()
    }

    /// Current value, or the default when empty
    pub fn get(&self, field: ConfigField) -> String {
        self.lock().get(field).to_string()
    }

    /// API key for `provider`; empty when not configured
    pub fn key_for(&self, provider: Provider) -> String {
        self.get(provider.key_field())
    }

    pub fn model_for(&self, provider: Provider) -> String {
        self.get(provider.model_field())
    }

    pub fn snapshot(&self) -> ProviderConfig {
        self.lock().clone()
    }

    /// Restore defaults and drop the persisted record
    pub fn reset(&self) -> ProviderConfig {
        let mut current = self.lock();
        *current = ProviderConfig::default();
        if !self.store.remove(CONFIG_KEY) {
            tracing::warn!("Failed to remove persisted configuration");
        }
        current.clone()
    }

    pub fn has_any_key(&self) -> bool {
        self.lock().has_any_key()
    }
}

/// Show only enough of a secret to recognise it
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "(not set)".to_string(),
        1..=8 => "•".repeat(chars.len()),
        n => {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{}…{}", head, tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::sync::Arc;

    #[test]
    fn test_defaults_on_first_load() {
        let config = ConfigStore::load(SafeStore::in_memory());
        assert_eq!(config.get(ConfigField::GeminiModel), "gemini-2.5-flash");
        assert_eq!(config.key_for(Provider::Groq), "");
        assert!(!config.has_any_key());
    }

    #[test]
    fn test_save_merges_and_persists_full_record() {
        let store = SafeStore::in_memory();
        let config = ConfigStore::load(store.clone());
        config.save(&ConfigPatch::default().with(ConfigField::GroqKey, "gsk_123"));
        config.save(&ConfigPatch::default().with(ConfigField::HfModel, "meta-llama/Llama-3.1-8B"));

        let persisted: ProviderConfig = store.load(CONFIG_KEY, ProviderConfig::default());
        assert_eq!(persisted.groq_key, "gsk_123");
        assert_eq!(persisted.hf_model, "meta-llama/Llama-3.1-8B");
        assert_eq!(persisted.gemini_model, "gemini-2.5-flash");

        let reloaded = ConfigStore::load(store);
        assert_eq!(reloaded.key_for(Provider::Groq), "gsk_123");
        assert!(reloaded.has_any_key());
    }

    #[test]
    fn test_empty_persisted_values_fall_back_to_defaults() {
        let store = SafeStore::in_memory();
        store.save(
            CONFIG_KEY,
            &serde_json::json!({ "geminiModel": "", "groqKey": "abc", "extra": 1 }),
        );
        let config = ConfigStore::load(store);
        assert_eq!(config.get(ConfigField::GeminiModel), "gemini-2.5-flash");
        assert_eq!(config.key_for(Provider::Groq), "abc");
    }

    #[test]
    fn test_get_falls_back_when_saved_empty() {
        let config = ConfigStore::load(SafeStore::in_memory());
        config.save(&ConfigPatch::default().with(ConfigField::GroqModel, ""));
        assert_eq!(config.snapshot().groq_model, "");
        assert_eq!(config.model_for(Provider::Groq), "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_reset_restores_defaults_and_removes_record() {
        let store = SafeStore::in_memory();
        let config = ConfigStore::load(store.clone());
        config.save(&ConfigPatch::default().with(ConfigField::GeminiKey, "AIza-key"));
        config.reset();

        assert!(!config.has_any_key());
        let persisted: Option<ProviderConfig> = store.load(CONFIG_KEY, None);
        assert!(persisted.is_none());
    }

    #[test]
    fn test_unavailable_storage_still_returns_defaults() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_unavailable(true);
        let config = ConfigStore::load(SafeStore::new(backend));

        for field in ConfigField::ALL {
            if !field.default_value().is_empty() {
                assert!(!config.get(field).is_empty(), "{} was empty", field);
            }
        }

        // Saving still updates the in-memory record
        config.save(&ConfigPatch::default().with(ConfigField::HfKey, "hf_x"));
        assert_eq!(config.key_for(Provider::HuggingFace), "hf_x");
    }

    #[test]
    fn test_any_non_empty_string_is_a_key() {
        let config = ConfigStore::load(SafeStore::in_memory());
        config.save(&ConfigPatch::default().with(ConfigField::HfKey, " "));
        assert!(config.has_any_key());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(not set)");
        assert_eq!(mask_secret("abc"), "•••");
        assert_eq!(mask_secret("gsk_abcdefghijkl"), "gsk_…ijkl");
    }
}
