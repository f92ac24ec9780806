//! Provider Gateway (spec.md §4.E "Selection algorithm" and
//! "Health probing").
//!
//! Grounded on the teacher's `LlmBackend` retry/fallback loop
//! (`crates/llm/src/backend.rs`) and the `ProcessorChain`'s background
//! task shape (`crates/pipeline/src/processors/chain.rs`) for the
//! periodic health-probe loop spawned on a `tokio::time::interval`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::prompt::PromptEnvelope;
use crate::providers::{Completion, LlmProvider};
use crate::LlmError;

/// A provider's last-observed reachability, spec.md §4.E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Healthy,
    Degraded,
    Unavailable,
    /// Not probed yet; treated as eligible, same as `Healthy`, during
    /// selection (spec.md §4.E step 2).
    Unknown,
}

struct Entry {
    provider: Arc<dyn LlmProvider>,
    status: RwLock<ProviderStatus>,
    last_probed_at: RwLock<Option<DateTime<Utc>>>,
}

/// A read-only view of one provider's health, returned by `status()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHandle {
    pub name: String,
    pub status: ProviderStatus,
    pub last_probed_at: Option<DateTime<Utc>>,
}

/// Owns the ordered provider table and runs selection + fallback +
/// health probing over it, spec.md §4.E.
pub struct ProviderGateway {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    max_fallbacks: u32,
}

impl ProviderGateway {
    /// `providers` is inserted in priority order; `order` is derived
    /// from insertion order (spec.md §4.E "providers are tried in
    /// configured order").
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>, max_fallbacks: u32) -> Self {
        let mut order = Vec::with_capacity(providers.len());
        let mut entries = HashMap::with_capacity(providers.len());

        for provider in providers {
            let name = provider.name().to_string();
            order.push(name.clone());
            entries.insert(
                name,
                Entry {
                    provider,
                    status: RwLock::new(ProviderStatus::Unknown),
                    last_probed_at: RwLock::new(None),
                },
            );
        }

        Self {
            order,
            entries,
            max_fallbacks,
        }
    }

    pub fn status(&self) -> Vec<ProviderHandle> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| ProviderHandle {
                name: entry.provider.name().to_string(),
                status: *entry.status.read(),
                last_probed_at: *entry.last_probed_at.read(),
            })
            .collect()
    }

    /// Selection order, spec.md §4.E:
    /// 1. `preferred_provider` if present and not `Unavailable`.
    /// 2. The first provider in configured order whose status is
    ///    `Healthy` or `Unknown`.
    /// 3. On failure, fall through remaining providers in order, up to
    ///    `max_fallbacks` additional attempts.
    /// 4. [`LlmError::Unavailable`] if every attempt fails.
    pub async fn generate(&self, prompt: &PromptEnvelope) -> Result<Completion, LlmError> {
        let candidates = self.candidate_order(prompt.preferred_provider.as_deref());
        let attempt_cap = (self.max_fallbacks as usize + 1).min(candidates.len().max(1));

        let mut last_error = LlmError::Unavailable;
        for name in candidates.into_iter().take(attempt_cap) {
            let Some(entry) = self.entries.get(&name) else {
                continue;
            };
            match entry.provider.generate(prompt).await {
                Ok(completion) => return Ok(completion),
                Err(err) => {
                    warn!(provider = %name, error = %err, "provider generation failed, trying next");
                    *entry.status.write() = ProviderStatus::Degraded;
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    fn candidate_order(&self, preferred: Option<&str>) -> Vec<String> {
        let mut candidates = Vec::with_capacity(self.order.len());

        if let Some(preferred) = preferred {
            if self
                .entries
                .get(preferred)
                .map(|e| *e.status.read() != ProviderStatus::Unavailable)
                .unwrap_or(false)
            {
                candidates.push(preferred.to_string());
            }
        }

        let mut eligible: Vec<String> = self
            .order
            .iter()
            .filter(|name| name.as_str() != preferred.unwrap_or(""))
            .filter(|name| {
                self.entries
                    .get(*name)
                    .map(|e| matches!(*e.status.read(), ProviderStatus::Healthy | ProviderStatus::Unknown))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let mut degraded: Vec<String> = self
            .order
            .iter()
            .filter(|name| name.as_str() != preferred.unwrap_or(""))
            .filter(|name| !eligible.contains(name))
            .filter(|name| {
                self.entries
                    .get(*name)
                    .map(|e| *e.status.read() != ProviderStatus::Unavailable)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        candidates.append(&mut eligible);
        candidates.append(&mut degraded);
        candidates
    }

    /// Probe every provider once, updating its status in place. Intended
    /// to run on a `tokio::time::interval` tick (spec.md §4.E "Health
    /// probing").
    pub async fn probe_all(&self) {
        for name in &self.order {
            let Some(entry) = self.entries.get(name) else {
                continue;
            };
            let outcome = entry.provider.probe().await;
            *entry.last_probed_at.write() = Some(Utc::now());

            let new_status = match outcome {
                Ok(()) => ProviderStatus::Healthy,
                Err(LlmError::RateLimited) | Err(LlmError::Timeout) => ProviderStatus::Degraded,
                Err(_) => ProviderStatus::Unavailable,
            };
            info!(provider = %name, status = ?new_status, "provider health probe complete");
            *entry.status.write() = new_status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptParams;
    use async_trait::async_trait;
    use shellwright_memory::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        name: String,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> crate::providers::ProviderKind {
            crate::providers::ProviderKind::Custom
        }

        async fn generate(&self, _prompt: &PromptEnvelope) -> Result<Completion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(LlmError::Unavailable)
            } else {
                Ok(Completion {
                    text: format!("reply from {}", self.name),
                    provider_name: self.name.clone(),
                    usage: Default::default(),
                })
            }
        }

        async fn probe(&self) -> Result<(), LlmError> {
            if self.fail {
                Err(LlmError::Unavailable)
            } else {
                Ok(())
            }
        }
    }

    fn envelope() -> PromptEnvelope {
        PromptEnvelope {
            system_prompt: "be terse".to_string(),
            messages: vec![Message::user("hi")],
            params: PromptParams {
                temperature: 0.1,
                max_tokens: 64,
                stop: None,
                timeout_ms: 1_000,
            },
            preferred_provider: None,
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_provider_on_failure() {
        let primary = Arc::new(StubProvider {
            name: "primary".to_string(),
            fail: true,
            calls: AtomicUsize::new(0),
        });
        let secondary = Arc::new(StubProvider {
            name: "secondary".to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        });

        let gateway = ProviderGateway::new(vec![primary.clone(), secondary.clone()], 3);
        let completion = gateway.generate(&envelope()).await.unwrap();

        assert_eq!(completion.provider_name, "secondary");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn returns_unavailable_when_every_provider_fails() {
        let only = Arc::new(StubProvider {
            name: "only".to_string(),
            fail: true,
            calls: AtomicUsize::new(0),
        });

        let gateway = ProviderGateway::new(vec![only], 3);
        let err = gateway.generate(&envelope()).await.unwrap_err();
        assert_eq!(err, LlmError::Unavailable);
    }

    #[tokio::test]
    async fn probe_all_marks_failing_provider_unavailable() {
        let bad = Arc::new(StubProvider {
            name: "bad".to_string(),
            fail: true,
            calls: AtomicUsize::new(0),
        });
        let gateway = ProviderGateway::new(vec![bad], 3);

        gateway.probe_all().await;

        let status = gateway.status();
        assert_eq!(status[0].status, ProviderStatus::Unavailable);
    }

    #[tokio::test]
    async fn preferred_provider_is_tried_first_when_not_unavailable() {
        let primary = Arc::new(StubProvider {
            name: "primary".to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        });
        let secondary = Arc::new(StubProvider {
            name: "secondary".to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        });
        let gateway = ProviderGateway::new(vec![primary.clone(), secondary.clone()], 3);

        let mut prompt = envelope();
        prompt.preferred_provider = Some("secondary".to_string());

        let completion = gateway.generate(&prompt).await.unwrap();
        assert_eq!(completion.provider_name, "secondary");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }
}
