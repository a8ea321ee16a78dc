//! Fan-out dispatcher
//!
//! Sends one prompt to every provider that has a key. Calls run concurrently
//! and settle independently: whichever provider answers first is reported
//! first, and a failure in one never affects the others. There is no retry,
//! no timeout of our own and no cancellation.

use crate::config::ConfigStore;
use crate::llm::{Completer, Provider};
use crate::storage::{HistoryStore, UsageTracker};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

/// Callbacks driven by [`FanOutDispatcher::dispatch`]
///
/// Each call happens as soon as the corresponding provider settles.
pub trait DispatchObserver: Send + Sync {
    /// Provider skipped because it has no key
    fn on_missing_key(&self, provider: Provider);

    /// Requests are about to go out to `active`
    fn on_dispatch_started(&self, active: &[Provider]) {
        let _ = active;
    }

    fn on_success(&self, provider: Provider, response: &str, prompt: &str);

    fn on_failure(&self, provider: Provider, message: &str, prompt: &str);
}

/// Observer that ignores everything
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {
    fn on_missing_key(&self, _provider: Provider) {}
    fn on_success(&self, _provider: Provider, _response: &str, _prompt: &str) {}
    fn on_failure(&self, _provider: Provider, _message: &str, _prompt: &str) {}
}

/// How one provider's call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        response: String,
        model: String,
    },
    Failed {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
    },
    MissingKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderOutcome {
    pub provider: Provider,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Every provider's outcome for one prompt, in fixed provider order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub prompt: String,
    pub outcomes: Vec<ProviderOutcome>,
}

impl DispatchReport {
    pub fn outcome(&self, provider: Provider) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.provider == provider)
            .map(|o| &o.outcome)
    }

    pub fn success_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Success { .. }))
            .count()
    }
}

pub struct FanOutDispatcher {
    config: Arc<ConfigStore>,
    history: Arc<HistoryStore>,
    usage: Arc<UsageTracker>,
    completer: Arc<dyn Completer>,
}

impl FanOutDispatcher {
    pub fn new(
        config: Arc<ConfigStore>,
        history: Arc<HistoryStore>,
        usage: Arc<UsageTracker>,
        completer: Arc<dyn Completer>,
    ) -> Self {
        Self {
            config,
            history,
            usage,
            completer,
        }
    }

    /// Send `prompt` to every configured provider and wait for all to settle
    pub async fn dispatch(&self, prompt: &str, observer: &dyn DispatchObserver) -> DispatchReport {
        let mut outcomes = Vec::with_capacity(Provider::ALL.len());
        let mut active = Vec::with_capacity(Provider::ALL.len());

        // Key check happens once per provider, before anything is sent
        for provider in Provider::ALL {
            if self.config.key_for(provider).is_empty() {
                observer.on_missing_key(provider);
                outcomes.push(ProviderOutcome {
                    provider,
                    outcome: Outcome::MissingKey,
                });
            } else {
                active.push(provider);
            }
        }

        tracing::info!(
            providers = ?active,
            prompt_chars = prompt.chars().count(),
            "Dispatching prompt"
        );
        observer.on_dispatch_started(&active);

        let settled = join_all(
            active
                .iter()
                .map(|&provider| self.settle(provider, prompt, observer)),
        )
        .await;

        outcomes.extend(settled);
        outcomes.sort_by_key(|o| o.provider);

        DispatchReport {
            prompt: prompt.to_string(),
            outcomes,
        }
    }

    async fn settle(
        &self,
        provider: Provider,
        prompt: &str,
        observer: &dyn DispatchObserver,
    ) -> ProviderOutcome {
        let outcome = match self.completer.complete(provider, prompt).await {
            Ok(response) => {
                let model = self.config.model_for(provider);
                self.history.add(provider, prompt, &response, &model);
                self.usage.record_usage(provider);
                tracing::debug!(provider = provider.id(), chars = response.len(), "Provider answered");
                observer.on_success(provider, &response, prompt);
                Outcome::Success { response, model }
            }
            Err(e) => {
                tracing::warn!(provider = provider.id(), error = %e, "Provider call failed");
                let message = e.to_string();
                observer.on_failure(provider, &message, prompt);
                Outcome::Failed {
                    message,
                    http_status: e.status(),
                }
            }
        };

        ProviderOutcome { provider, outcome }
    }
}
