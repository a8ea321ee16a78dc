//! Service layer for promptdeck
//!
//! [`AppContext`] constructs every store once and hands shared handles to the
//! dispatcher and the presentation layer.

pub mod dispatcher;

pub use dispatcher::{
    DispatchObserver, DispatchReport, FanOutDispatcher, NoopObserver, Outcome, ProviderOutcome,
};

use crate::config::{ConfigStore, EndpointSettings};
use crate::llm::{Completer, HttpCompleter};
use crate::storage::{HistoryStore, SafeStore, UsageCounters, UsageTracker};
use anyhow::Result;
use std::sync::Arc;

/// Everything a command needs, wired together
pub struct AppContext {
    pub store: SafeStore,
    pub config: Arc<ConfigStore>,
    pub history: Arc<HistoryStore>,
    pub usage: Arc<UsageTracker>,
    pub dispatcher: FanOutDispatcher,
}

impl AppContext {
    /// Load all records and talk to the real provider endpoints
    pub fn open(store: SafeStore, endpoints: &EndpointSettings) -> Self {
        let config = Arc::new(ConfigStore::load(store.clone()));
        let completer = Arc::new(HttpCompleter::new(config.clone(), endpoints));
        Self::assemble(store, config, completer)
    }

    /// Same as [`AppContext::open`] with a caller-supplied transport
    pub fn with_completer(store: SafeStore, completer: Arc<dyn Completer>) -> Self {
        let config = Arc::new(ConfigStore::load(store.clone()));
        Self::assemble(store, config, completer)
    }

    fn assemble(store: SafeStore, config: Arc<ConfigStore>, completer: Arc<dyn Completer>) -> Self {
        let history = Arc::new(HistoryStore::load(store.clone()));
        let usage = Arc::new(UsageTracker::load(store.clone()));

        // Counters always start out agreeing with the history on disk
        usage.sync_with_history(&history.snapshot());

        let dispatcher =
            FanOutDispatcher::new(config.clone(), history.clone(), usage.clone(), completer);

        Self {
            store,
            config,
            history,
            usage,
            dispatcher,
        }
    }

    /// Empty the history and resync the counters
    pub fn clear_history(&self) -> UsageCounters {
        self.history.clear();
        self.usage.sync_with_history(&self.history.snapshot())
    }

    /// Replace the history from an export and resync the counters
    pub fn import_history(&self, json: &str) -> Result<UsageCounters> {
        self.history.import_history(json)?;
        Ok(self.usage.sync_with_history(&self.history.snapshot()))
    }

    /// Drop every namespaced record and return to a first-run state
    pub fn reset_all(&self) -> bool {
        self.config.reset();
        self.history.clear();
        self.usage.reset();
        self.store.clear()
    }
}
