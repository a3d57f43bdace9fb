//! Narrative synthesis.
//!
//! Provider results are turned into one narrative by an external generation
//! capability. When that capability is absent, fails, times out or returns
//! nothing, a deterministic summary is produced instead.

#[cfg(feature = "gemini")]
mod gemini;
mod prompt;

#[cfg(feature = "gemini")]
pub use gemini::GeminiClient;
pub use prompt::{build_prompt, transcript};

use crate::context::Context;
use crate::errors::GenerationError;
use crate::providers::{ProviderId, ProviderResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Narrative used when the plan invoked no provider.
pub const NO_SOURCES_NARRATIVE: &str = "No data sources were consulted for this query.";

/// A text-generation capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generates text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// API key. Empty means "use `GEMINI_API_KEY`", and no key at all
    /// disables generation.
    #[serde(default)]
    pub api_key: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Base endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Timeout for one generation call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

const fn default_temperature() -> f64 {
    0.3
}

const fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            endpoint: default_endpoint(),
            temperature: default_temperature(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SynthesisConfig {
    /// Returns the API key if one is set.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty()).then_some(key)
    }
}

/// Inputs to one synthesis.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    /// The customer's query.
    pub query: &'a str,
    /// Results keyed by provider, iterated in canonical order.
    pub results: &'a BTreeMap<ProviderId, ProviderResult>,
    /// Facts the plan inherited from earlier turns.
    pub carried_context: &'a Context,
}

impl<'a> SynthesisRequest<'a> {
    /// Creates a request.
    #[must_use]
    pub const fn new(
        query: &'a str,
        results: &'a BTreeMap<ProviderId, ProviderResult>,
        carried_context: &'a Context,
    ) -> Self {
        Self {
            query,
            results,
            carried_context,
        }
    }
}

/// Where a narrative came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    /// The generation capability wrote it.
    Generated,
    /// The deterministic fallback wrote it.
    Fallback,
    /// Nothing was consulted.
    NoSources,
}

/// A synthesized narrative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrative {
    /// The text returned to the caller.
    pub text: String,
    /// How it was produced.
    pub source: NarrativeSource,
}

/// Turns provider results into a narrative. Never fails.
#[derive(Clone)]
pub struct Synthesizer {
    client: Option<Arc<dyn GenerationClient>>,
    timeout: Duration,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("generation", &self.client.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::fallback_only()
    }
}

impl Synthesizer {
    /// Creates a synthesizer backed by `client`.
    #[must_use]
    pub fn new(client: Arc<dyn GenerationClient>, timeout: Duration) -> Self {
        Self {
            client: Some(client),
            timeout,
        }
    }

    /// Creates a synthesizer that always uses the deterministic fallback.
    #[must_use]
    pub const fn fallback_only() -> Self {
        Self {
            client: None,
            timeout: Duration::from_millis(default_timeout_ms()),
        }
    }

    /// Whether a generation capability is configured.
    #[must_use]
    pub const fn has_generation(&self) -> bool {
        self.client.is_some()
    }

    /// Produces the narrative for a request.
    pub async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Narrative {
        if request.results.is_empty() {
            return Narrative {
                text: NO_SOURCES_NARRATIVE.to_string(),
                source: NarrativeSource::NoSources,
            };
        }

        match self.generate(request).await {
            Ok(text) => Narrative {
                text,
                source: NarrativeSource::Generated,
            },
            Err(GenerationError::NotConfigured) => {
                debug!("No generation capability; using fallback narrative");
                Narrative {
                    text: fallback_narrative(request.results),
                    source: NarrativeSource::Fallback,
                }
            }
            Err(e) => {
                warn!(error = %e, "Synthesis unavailable; using fallback narrative");
                Narrative {
                    text: fallback_narrative(request.results),
                    source: NarrativeSource::Fallback,
                }
            }
        }
    }

    async fn generate(&self, request: &SynthesisRequest<'_>) -> Result<String, GenerationError> {
        let client = self.client.as_ref().ok_or(GenerationError::NotConfigured)?;
        let prompt = build_prompt(request);
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);

        let text = tokio::time::timeout(self.timeout, client.generate(&prompt))
            .await
            .map_err(|_| GenerationError::Timeout { timeout_ms })??;

        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

/// Deterministic per-provider summary, in canonical order.
#[must_use]
pub fn fallback_narrative(results: &BTreeMap<ProviderId, ProviderResult>) -> String {
    results
        .iter()
        .map(|(id, result)| {
            if !result.success {
                format!("{id}: Error occurred.")
            } else if result.record_count > 0 {
                format!("{id}: Found {} records.", result.record_count)
            } else {
                format!("{id}: No data found.")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
