//! The provider capability contract and its shipped adapters.
//!
//! A provider answers a query for one data domain. The orchestrator treats
//! all providers uniformly through the [`Provider`] trait and looks them up
//! by [`ProviderId`] in a [`ProviderRegistry`].

#[cfg(feature = "http-providers")]
mod http;
mod id;
mod registry;
mod result;

#[cfg(feature = "http-providers")]
pub use http::HttpProvider;
pub use id::{ProviderId, ProviderSet};
pub use registry::{ProviderRegistry, Readiness};
pub use result::ProviderResult;

use crate::context::Context;
use crate::errors::ProviderError;
use async_trait::async_trait;

/// A data-domain capability.
///
/// Implementations must be cheap to share across tasks; the executor holds
/// them as `Arc<dyn Provider>` and may call one provider concurrently for
/// different requests.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The domain this provider answers for.
    fn id(&self) -> ProviderId;

    /// Whether the provider is able to serve queries.
    fn is_ready(&self) -> bool {
        true
    }

    /// Answers a query given a snapshot of the working context.
    ///
    /// A returned `Err` is converted by the executor into a failed
    /// [`ProviderResult`]; an `Ok` result with `success == false` is passed
    /// through unchanged.
    async fn process_query(
        &self,
        query: &str,
        context: &Context,
    ) -> Result<ProviderResult, ProviderError>;
}

/// Placeholder for a provider that has no endpoint configured.
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredProvider {
    id: ProviderId,
}

impl UnconfiguredProvider {
    /// Creates a placeholder for `id`.
    #[must_use]
    pub const fn new(id: ProviderId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Provider for UnconfiguredProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn is_ready(&self) -> bool {
        false
    }

    async fn process_query(
        &self,
        _query: &str,
        _context: &Context,
    ) -> Result<ProviderResult, ProviderError> {
        Err(ProviderError::NotConfigured { provider: self.id })
    }
}
