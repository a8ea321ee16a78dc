//! Per-provider prompt/response history
//!
//! Each provider owns a bucket of at most [`MAX_ENTRIES_PER_PROVIDER`]
//! entries, newest first. The whole record is persisted after every mutation.

use super::SafeStore;
use crate::llm::Provider;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Storage key (without namespace prefix)
pub const HISTORY_KEY: &str = "history";

/// Bucket capacity; inserting past it evicts the oldest entry
pub const MAX_ENTRIES_PER_PROVIDER: usize = 50;

/// A single prompt and the reply one provider gave to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub prompt: String,
    pub response: String,
    pub model: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

/// ISO-8601 with exactly three fractional digits and a `Z` suffix
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(d)
    }
}

impl HistoryEntry {
    /// Build an entry stamped with the current time
    ///
    /// Millisecond precision keeps the serialized form stable across export
    /// and re-import.
    pub fn now(prompt: &str, response: &str, model: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            response: response.to_string(),
            model: model.to_string(),
            timestamp: Utc::now().trunc_subsecs(3),
        }
    }
}

/// All buckets, keyed by provider id in the persisted JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct History {
    pub gemini: Vec<HistoryEntry>,
    pub groq: Vec<HistoryEntry>,
    pub hf: Vec<HistoryEntry>,
}

impl History {
    pub fn bucket(&self, provider: Provider) -> &[HistoryEntry] {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::Groq => &self.groq,
            Provider::HuggingFace => &self.hf,
        }
    }

    pub fn bucket_mut(&mut self, provider: Provider) -> &mut Vec<HistoryEntry> {
        match provider {
            Provider::Gemini => &mut self.gemini,
            Provider::Groq => &mut self.groq,
            Provider::HuggingFace => &mut self.hf,
        }
    }

    pub fn total_entries(&self) -> usize {
        Provider::ALL.iter().map(|p| self.bucket(*p).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_entries() == 0
    }

    fn enforce_capacity(&mut self) {
        for provider in Provider::ALL {
            self.bucket_mut(provider).truncate(MAX_ENTRIES_PER_PROVIDER);
        }
    }
}

/// An entry annotated with where it came from, for the unified listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlattenedEntry {
    pub provider: Provider,
    /// Position within the provider bucket at the time of listing
    pub original_index: usize,
    #[serde(flatten)]
    pub entry: HistoryEntry,
}

/// Owner of the in-memory [`History`] record
pub struct HistoryStore {
    store: SafeStore,
    history: Mutex<History>,
    revision: watch::Sender<u64>,
}

impl HistoryStore {
    /// Load the persisted history, or start empty
    pub fn load(store: SafeStore) -> Self {
        let mut history: History = store.load(HISTORY_KEY, History::default());
        history.enforce_capacity();
        let (revision, _) = watch::channel(0);

        tracing::debug!(entries = history.total_entries(), "Loaded history");

        Self {
            store,
            history: Mutex::new(history),
            revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, history: &History) {
        if !self.store.save(HISTORY_KEY, history) {
            tracing::warn!("History kept in memory only; storage is unavailable");
        }
    }

    fn notify(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Receiver that changes whenever the history is mutated
    ///
    /// Views use it to redraw history-dependent output only after a change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Record a successful response at the front of the provider bucket
    pub fn add(&self, provider: Provider, prompt: &str, response: &str, model: &str) -> HistoryEntry {
        let entry = HistoryEntry::now(prompt, response, model);
        {
            let mut history = self.lock();
            let bucket = history.bucket_mut(provider);
            bucket.insert(0, entry.clone());
            bucket.truncate(MAX_ENTRIES_PER_PROVIDER);
            self.persist(&history);
        }
        self.notify();
        entry
    }

    /// Entry at `index` in the provider bucket as it is right now
    ///
    /// The index is positional, not a stable id: an `add` between listing and
    /// lookup shifts every entry down by one.
    pub fn get(&self, provider: Provider, index: usize) -> Option<HistoryEntry> {
        self.lock().bucket(provider).get(index).cloned()
    }

    /// Every entry across all buckets, newest first
    ///
    /// Ties keep encounter order (provider order, then bucket index).
    pub fn get_all_flattened(&self) -> Vec<FlattenedEntry> {
        let history = self.lock();
        let mut all: Vec<FlattenedEntry> = Provider::ALL
            .iter()
            .flat_map(|&provider| {
                history
                    .bucket(provider)
                    .iter()
                    .enumerate()
                    .map(move |(idx, entry)| FlattenedEntry {
                        provider,
                        original_index: idx,
                        entry: entry.clone(),
                    })
            })
            .collect();

        // `sort_by` is stable
        all.sort_by(|a, b| b.entry.timestamp.cmp(&a.entry.timestamp));
        all
    }

    /// Copy of the whole record
    pub fn snapshot(&self) -> History {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().total_entries()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty all buckets and drop the persisted record
    pub fn clear(&self) {
        *self.lock() = History::default();
        if !self.store.remove(HISTORY_KEY) {
            tracing::warn!("Failed to remove persisted history");
        }
        self.notify();
    }

    /// Full record as pretty-printed JSON
    pub fn export_history(&self) -> Result<String> {
        let history = self.snapshot();
        serde_json::to_string_pretty(&history).context("Failed to serialize history")
    }

    /// Replace the whole record with a previously exported one
    ///
    /// Oversized buckets keep their first (newest) entries. Returns the number
    /// of entries now held. Usage counters must be resynced by the caller.
    pub fn import_history(&self, json: &str) -> Result<usize> {
        let mut imported: History =
            serde_json::from_str(json).context("Failed to parse history file")?;
        imported.enforce_capacity();
        let count = imported.total_entries();
        {
            let mut history = self.lock();
            *history = imported;
            self.persist(&history);
        }
        self.notify();
        Ok(count)
    }

    /// Download-style file name for an export taken on `date`
    pub fn export_file_name(date: NaiveDate) -> String {
        format!("promptdeck_history_{}.json", date.format("%Y-%m-%d"))
    }
}
