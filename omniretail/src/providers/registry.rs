//! Provider registry keyed by [`ProviderId`].

use super::{Provider, ProviderId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Reported readiness of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    /// The provider can serve queries.
    Ready,
    /// The provider is registered but has no endpoint.
    Unconfigured,
}

/// Holds the providers an executor may invoke.
///
/// Registering a provider under an id that is already present replaces it.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own id.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.id();
        debug!(provider = %id, "Registering provider");
        self.providers.insert(id, provider);
    }

    /// Registers a provider, builder style.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    /// Looks up a provider.
    #[must_use]
    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn Provider>> {
        self.providers.get(&id).cloned()
    }

    /// Checks if a provider is registered.
    #[must_use]
    pub fn contains(&self, id: ProviderId) -> bool {
        self.providers.contains_key(&id)
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Reports readiness for every provider, registered or not, in
    /// canonical order.
    #[must_use]
    pub fn readiness(&self) -> BTreeMap<ProviderId, Readiness> {
        ProviderId::ALL
            .into_iter()
            .map(|id| {
                let state = match self.providers.get(&id) {
                    Some(p) if p.is_ready() => Readiness::Ready,
                    _ => Readiness::Unconfigured,
                };
                (id, state)
            })
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
