//! Configuration file handling.
//!
//! Settings live in `omniretail.toml`. Every field has a default, so an
//! absent file or an empty section is valid.

use crate::errors::ConfigError;
use crate::executor::ExecutorConfig;
use crate::providers::ProviderId;
use crate::synthesis::SynthesisConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "omniretail.toml";

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Executor limits.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Narrative generation settings.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Provider endpoints.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Where a provider is reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// URL receiving `POST {query, context}`. Empty means unconfigured.
    #[serde(default)]
    pub url: String,
}

impl ProviderEndpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Endpoints keyed by provider name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    /// Orders and products.
    #[serde(rename = "ShopCore", default, skip_serializing_if = "Option::is_none")]
    pub shop_core: Option<ProviderEndpoint>,
    /// Shipments.
    #[serde(rename = "ShipStream", default, skip_serializing_if = "Option::is_none")]
    pub ship_stream: Option<ProviderEndpoint>,
    /// Payments and refunds.
    #[serde(rename = "PayGuard", default, skip_serializing_if = "Option::is_none")]
    pub pay_guard: Option<ProviderEndpoint>,
    /// Support tickets.
    #[serde(rename = "CareDesk", default, skip_serializing_if = "Option::is_none")]
    pub care_desk: Option<ProviderEndpoint>,
}

impl ProvidersConfig {
    const fn slot(&self, id: ProviderId) -> Option<&ProviderEndpoint> {
        match id {
            ProviderId::ShopCore => self.shop_core.as_ref(),
            ProviderId::ShipStream => self.ship_stream.as_ref(),
            ProviderId::PayGuard => self.pay_guard.as_ref(),
            ProviderId::CareDesk => self.care_desk.as_ref(),
        }
    }

    /// Returns the configured URL for a provider, if non-empty.
    #[must_use]
    pub fn url(&self, id: ProviderId) -> Option<&str> {
        self.slot(id)
            .map(|e| e.url.trim())
            .filter(|url| !url.is_empty())
    }

    /// Sets a provider's URL.
    #[must_use]
    pub fn with_url(mut self, id: ProviderId, url: impl Into<String>) -> Self {
        let endpoint = Some(ProviderEndpoint::new(url));
        match id {
            ProviderId::ShopCore => self.shop_core = endpoint,
            ProviderId::ShipStream => self.ship_stream = endpoint,
            ProviderId::PayGuard => self.pay_guard = endpoint,
            ProviderId::CareDesk => self.care_desk = endpoint,
        }
        self
    }

    /// Returns the providers that have a URL.
    #[must_use]
    pub fn configured(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.url(*id).is_some())
            .collect()
    }
}

impl OrchestratorConfig {
    /// Loads configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `omniretail.toml` from the working directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but
    /// can't be parsed.
    pub fn load_default() -> Result<Option<Self>, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Fills the API key from `GEMINI_API_KEY` when the file leaves it empty.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Like [`apply_env`](Self::apply_env) with an injectable lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.synthesis.api_key().is_none() {
            if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
                self.synthesis.api_key = key;
            }
        }
    }

    /// A starting configuration pointing at local provider services.
    #[must_use]
    pub fn example() -> Self {
        Self {
            providers: ProvidersConfig::default()
                .with_url(ProviderId::ShopCore, "http://localhost:9001/query")
                .with_url(ProviderId::ShipStream, "http://localhost:9002/query")
                .with_url(ProviderId::PayGuard, "http://localhost:9003/query")
                .with_url(ProviderId::CareDesk, "http://localhost:9004/query"),
            ..Self::default()
        }
    }

    /// Renders the example configuration as TOML.
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Self::example())?)
    }
}
