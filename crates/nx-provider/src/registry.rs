// registry.rs - Name → provider and name → breaker directory.
//
// Built once at startup and then shared read-only; the breakers carry
// their own locks, so calls through the registry only need `&self`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::breaker::{BreakerConfig, BreakerStatus, CircuitBreaker, Clock, SystemClock};
use crate::error::{BreakerError, ProviderError, RegistryError};
use crate::mock::MockProvider;
use crate::provider::{CompletionOptions, LlmProvider};
use crate::spec::ProviderSpec;

struct Entry {
    provider: Arc<dyn LlmProvider>,
    breaker: CircuitBreaker,
}

pub struct ProviderRegistry {
    /// Registration order is preserved for listing.
    entries: Vec<Entry>,
    default: Option<String>,
    clock: Arc<dyn Clock>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// A registry whose breakers read time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Vec::new(),
            default: None,
            clock,
        }
    }

    /// Resolve every declared provider. Entries that fail to resolve are
    /// skipped; if none remain, the mock provider is registered.
    pub fn from_specs(specs: &[ProviderSpec], default_breaker: BreakerConfig) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            match spec.resolve() {
                Ok(provider) => {
                    registry.register(provider, spec.breaker.unwrap_or(default_breaker));
                }
                Err(e) => {
                    tracing::warn!(provider = %spec.name, error = %e, "skipping provider");
                }
            }
        }
        if registry.is_empty() {
            tracing::info!("no providers resolved, registering mock provider");
            registry.register(Arc::new(MockProvider::new()), default_breaker);
        }
        registry
    }

    /// Add a provider with its own breaker. The first registration becomes
    /// the default. Re-registering a name replaces the provider and its breaker.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>, breaker: BreakerConfig) {
        let name = provider.name().to_string();
        let entry = Entry {
            breaker: CircuitBreaker::with_clock(name.clone(), breaker, self.clock.clone()),
            provider,
        };
        match self.entries.iter_mut().find(|e| e.provider.name() == name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        tracing::info!(provider = %name, "provider registered");
    }

    pub fn get_provider(&self, name: &str) -> Result<Arc<dyn LlmProvider>, RegistryError> {
        self.entry(name)
            .map(|e| e.provider.clone())
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                available: self.available(),
            })
    }

    pub fn get_default(&self) -> Result<Arc<dyn LlmProvider>, RegistryError> {
        match &self.default {
            Some(name) => self.get_provider(name),
            None => Err(RegistryError::Empty),
        }
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), RegistryError> {
        if !self.has_provider(name) {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
                available: self.available(),
            });
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn list_providers(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.provider.name().to_string())
            .collect()
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn breaker(&self, name: &str) -> Option<&CircuitBreaker> {
        self.entry(name).map(|e| &e.breaker)
    }

    pub fn breaker_status(&self, name: &str) -> Option<BreakerStatus> {
        self.breaker(name).map(CircuitBreaker::status)
    }

    pub fn all_breaker_status(&self) -> BTreeMap<String, BreakerStatus> {
        self.entries
            .iter()
            .map(|e| (e.provider.name().to_string(), e.breaker.status()))
            .collect()
    }

    /// Force a provider's breaker closed.
    pub fn reset(&self, name: &str) -> Result<(), RegistryError> {
        match self.breaker(name) {
            Some(b) => {
                b.reset();
                Ok(())
            }
            None => Err(RegistryError::NotFound {
                name: name.to_string(),
                available: self.available(),
            }),
        }
    }

    /// Run `op` through the named provider's breaker.
    pub async fn call_with_circuit_breaker<T, E, F, Fut>(
        &self,
        name: &str,
        op: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.breaker(name) {
            Some(breaker) => breaker.execute(op).await,
            None => Err(BreakerError::NotRegistered {
                provider: name.to_string(),
                available: self.available(),
            }),
        }
    }

    /// `complete` on the named provider, guarded by its breaker.
    pub async fn complete(
        &self,
        name: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, BreakerError<ProviderError>> {
        let provider = self.get_provider(name).map_err(|_| BreakerError::NotRegistered {
            provider: name.to_string(),
            available: self.available(),
        })?;
        self.call_with_circuit_breaker(name, || async move {
            provider.complete(prompt, options).await
        })
        .await
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.provider.name() == name)
    }

    fn available(&self) -> String {
        self.list_providers().join(", ")
    }
}
