//! Priority-ordered provider fallback.
//!
//! The cascade tries each configured provider in descending priority order
//! and returns the first audio it gets. Cost and quality decrease down the
//! list, so a vendor outage degrades the voice instead of dropping the call.
//! `None` means every provider failed and the caller must use its own
//! baseline voice.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::base::{AudioRef, SpeechProvider};

/// Ordered fallback chain over interchangeable speech providers.
pub struct SpeechCascade {
    providers: Vec<Arc<dyn SpeechProvider>>,
}

impl SpeechCascade {
    /// Build a cascade. The list is sorted by descending priority once, at
    /// construction; the order never changes afterwards.
    pub fn new(mut providers: Vec<Arc<dyn SpeechProvider>>) -> Self {
        providers.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { providers }
    }

    /// Synthesize `text` with the first provider that delivers.
    ///
    /// Unavailable providers are skipped without cost. A provider returning
    /// `None` (its own failure or its circuit breaker) falls through to the
    /// next one. At most one provider call succeeds per invocation.
    pub async fn synthesize(&self, text: &str) -> Option<AudioRef> {
        for provider in &self.providers {
            if !provider.is_available() {
                debug!("skipping unavailable provider: {}", provider.name());
                continue;
            }

            match provider.synthesize(text).await {
                Some(audio) => {
                    info!("synthesized via {}", provider.name());
                    return Some(audio);
                }
                None => debug!("provider {} failed, falling through", provider.name()),
            }
        }

        warn!("all speech providers failed, falling back to the baseline voice");
        None
    }

    /// Per-provider statistics, keyed by provider name.
    pub fn stats(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.providers
                .iter()
                .map(|p| (p.name().to_string(), p.stats()))
                .collect(),
        )
    }

    /// Provider names in the order they are tried.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
