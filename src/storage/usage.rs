//! Usage counters
//!
//! Four counters (one per provider plus a total) persisted under
//! `usage_stats`. `total` always equals the sum of the provider counters.

use super::history::History;
use super::SafeStore;
use crate::llm::Provider;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Storage key (without namespace prefix)
pub const USAGE_KEY: &str = "usage_stats";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageCounters {
    pub total: u64,
    pub gemini: u64,
    pub groq: u64,
    pub hf: u64,
}

impl UsageCounters {
    pub fn for_provider(&self, provider: Provider) -> u64 {
        match provider {
            Provider::Gemini => self.gemini,
            Provider::Groq => self.groq,
            Provider::HuggingFace => self.hf,
        }
    }

    fn slot_mut(&mut self, provider: Provider) -> &mut u64 {
        match provider {
            Provider::Gemini => &mut self.gemini,
            Provider::Groq => &mut self.groq,
            Provider::HuggingFace => &mut self.hf,
        }
    }

    /// Counters derived from bucket lengths
    pub fn from_history(history: &History) -> Self {
        let mut counters = Self::default();
        for provider in Provider::ALL {
            *counters.slot_mut(provider) = history.bucket(provider).len() as u64;
        }
        counters.total = counters.gemini + counters.groq + counters.hf;
        counters
    }

    /// Sum of the provider counters; `None` on overflow
    fn provider_sum(&self) -> Option<u64> {
        self.gemini.checked_add(self.groq)?.checked_add(self.hf)
    }

    pub fn is_consistent(&self) -> bool {
        self.provider_sum() == Some(self.total)
    }
}

/// Owner of the in-memory [`UsageCounters`]
pub struct UsageTracker {
    store: SafeStore,
    counters: Mutex<UsageCounters>,
}

impl UsageTracker {
    /// Load persisted counters
    ///
    /// A record that violates the sum invariant is rebuilt from its provider
    /// counters, or zeroed when they cannot be summed; callers normally resync
    /// with the history right after.
    pub fn load(store: SafeStore) -> Self {
        let mut counters: UsageCounters = store.load(USAGE_KEY, UsageCounters::default());
        if !counters.is_consistent() {
            tracing::warn!(?counters, "Inconsistent usage record, recomputing total");
            counters = match counters.provider_sum() {
                Some(total) => UsageCounters { total, ..counters },
                None => UsageCounters::default(),
            };
        }

        Self {
            store,
            counters: Mutex::new(counters),
        }
    }

    fn lock(&self) -> MutexGuard<'_, UsageCounters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, counters: &UsageCounters) {
        if !self.store.save(USAGE_KEY, counters) {
            tracing::warn!("Usage counters kept in memory only; storage is unavailable");
        }
    }

    /// Recompute every counter from the history buckets
    pub fn sync_with_history(&self, history: &History) -> UsageCounters {
        let mut counters = self.lock();
        *counters = UsageCounters::from_history(history);
        self.persist(&counters);
        *counters
    }

    /// Count one successful response from `provider`
    pub fn record_usage(&self, provider: Provider) -> UsageCounters {
        let mut counters = self.lock();
        let slot = counters.slot_mut(provider);
        *slot = slot.saturating_add(1);
        counters.total = counters.total.saturating_add(1);
        self.persist(&counters);
        *counters
    }

    pub fn snapshot(&self) -> UsageCounters {
        *self.lock()
    }

    pub fn reset(&self) -> UsageCounters {
        let mut counters = self.lock();
        *counters = UsageCounters::default();
        self.persist(&counters);
        *counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::HistoryStore;
    use proptest::prelude::*;

    #[test]
    fn test_record_usage_increments_provider_and_total() {
        let tracker = UsageTracker::load(SafeStore::in_memory());
        tracker.record_usage(Provider::Groq);
        let counters = tracker.record_usage(Provider::Groq);

        assert_eq!(counters.groq, 2);
        assert_eq!(counters.gemini, 0);
        assert_eq!(counters.total, 2);
        assert!(counters.is_consistent());
    }

    #[test]
    fn test_sync_with_history_matches_bucket_lengths() {
        let store = SafeStore::in_memory();
        let history = HistoryStore::load(store.clone());
        history.add(Provider::Gemini, "a", "b", "m");
        history.add(Provider::Gemini, "c", "d", "m");
        history.add(Provider::HuggingFace, "e", "f", "m");

        let tracker = UsageTracker::load(store);
        // Stray increment that the resync must discard
        tracker.record_usage(Provider::Groq);

        let counters = tracker.sync_with_history(&history.snapshot());
        assert_eq!(
            counters,
            UsageCounters {
                total: 3,
                gemini: 2,
                groq: 0,
                hf: 1
            }
        );
    }

    #[test]
    fn test_sync_is_idempotent() {
        let history = History {
            groq: vec![crate::storage::HistoryEntry::now("p", "r", "m")],
            ..Default::default()
        };
        let tracker = UsageTracker::load(SafeStore::in_memory());
        let first = tracker.sync_with_history(&history);
        let second = tracker.sync_with_history(&history);
        assert_eq!(first, second);
    }

    #[test]
    fn test_counters_persist() {
        let store = SafeStore::in_memory();
        let tracker = UsageTracker::load(store.clone());
        tracker.record_usage(Provider::Gemini);

        let reloaded = UsageTracker::load(store);
        assert_eq!(reloaded.snapshot().gemini, 1);
        assert_eq!(reloaded.snapshot().total, 1);
    }

    #[test]
    fn test_inconsistent_record_is_repaired_on_load() {
        let store = SafeStore::in_memory();
        store.save(
            USAGE_KEY,
            &UsageCounters {
                total: 99,
                gemini: 1,
                groq: 2,
                hf: 3,
            },
        );
        let tracker = UsageTracker::load(store);
        assert_eq!(tracker.snapshot().total, 6);
    }

    #[test]
    fn test_overflowing_record_falls_back_to_zero() {
        let store = SafeStore::in_memory();
        store.save(
            USAGE_KEY,
            &UsageCounters {
                total: 0,
                gemini: u64::MAX,
                groq: 1,
                hf: 0,
            },
        );

        let tracker = UsageTracker::load(store);
        assert_eq!(tracker.snapshot(), UsageCounters::default());
        assert!(tracker.snapshot().is_consistent());
    }

    #[test]
    fn test_overflowing_sum_is_inconsistent() {
        let counters = UsageCounters {
            total: u64::MAX,
            gemini: u64::MAX,
            groq: u64::MAX,
            hf: 0,
        };
        assert!(!counters.is_consistent());
    }

    #[test]
    fn test_reset() {
        let tracker = UsageTracker::load(SafeStore::in_memory());
        tracker.record_usage(Provider::HuggingFace);
        assert_eq!(tracker.reset(), UsageCounters::default());
    }

    fn provider_strategy() -> impl Strategy<Value = Provider> {
        prop_oneof![
            Just(Provider::Gemini),
            Just(Provider::Groq),
            Just(Provider::HuggingFace),
        ]
    }

    proptest! {
        #[test]
        fn prop_total_is_sum_after_any_sequence(
            ops in prop::collection::vec(prop::option::of(provider_strategy()), 0..80)
        ) {
            let store = SafeStore::in_memory();
            let history = HistoryStore::load(store.clone());
            let tracker = UsageTracker::load(store);

            for op in ops {
                match op {
                    Some(provider) => {
                        history.add(provider, "p", "r", "m");
                        prop_assert!(tracker.record_usage(provider).is_consistent());
                    }
                    None => {
                        let counters = tracker.sync_with_history(&history.snapshot());
                        prop_assert!(counters.is_consistent());
                        prop_assert_eq!(counters.total as usize, history.len());
                    }
                }
            }
        }
    }
}
