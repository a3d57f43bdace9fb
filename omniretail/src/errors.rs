//! Error types for the omniretail orchestration engine.
//!
//! Provider and synthesis failures never escape the orchestrator: they are
//! folded into per-provider results or the fallback narrative. The types here
//! describe those failures precisely so they can be logged and surfaced as
//! structured data.

use crate::context::ValueKind;
use crate::providers::ProviderId;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for orchestrator construction and configuration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The orchestrator could not be assembled.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A provider could not be constructed.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// The generation client could not be constructed.
    #[error("{0}")]
    Generation(#[from] GenerationError),
}

/// Errors raised while loading or writing configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the config schema.
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// The config could not be rendered as TOML.
    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Errors raised by a provider invocation.
///
/// The stage executor converts every variant into a failed
/// [`ProviderResult`](crate::providers::ProviderResult).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider has no endpoint configured.
    #[error("{provider} is not configured")]
    NotConfigured {
        /// The provider.
        provider: ProviderId,
    },

    /// The plan named a provider the registry does not hold.
    #[error("{provider} provider not registered")]
    NotRegistered {
        /// The provider.
        provider: ProviderId,
    },

    /// The call exceeded its timeout.
    #[error("{provider} timed out after {timeout_ms}ms")]
    Timeout {
        /// The provider.
        provider: ProviderId,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider answered with a non-success status.
    #[error("Provider returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// The provider answer could not be decoded.
    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    /// The provider task panicked or was aborted.
    #[error("{provider} task failed: {reason}")]
    Crashed {
        /// The provider.
        provider: ProviderId,
        /// Join error description.
        reason: String,
    },

    /// The provider reported a domain failure.
    #[error("{0}")]
    Failed(String),
}

/// Errors raised by the text-generation capability.
///
/// Any of these makes the synthesizer fall back to deterministic text.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// No API key or client configured.
    #[error("Generation capability not configured")]
    NotConfigured,

    /// The call exceeded its timeout.
    #[error("Generation timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with an error.
    #[error("Generation API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode generation response: {0}")]
    Decode(String),

    /// The API returned no usable text.
    #[error("Generation returned an empty response")]
    EmptyResponse,
}

/// A context delta value whose kind disagrees with the stored value.
///
/// The conflicting key is dropped; the rest of the delta is still applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Merge conflict on key '{key}': stored {stored} but delta carries {incoming}")]
pub struct MergeConflict {
    /// The conflicting key.
    pub key: String,
    /// Kind of the value already stored.
    pub stored: ValueKind,
    /// Kind of the rejected delta value.
    pub incoming: ValueKind,
}

impl MergeConflict {
    /// Creates a new merge conflict.
    #[must_use]
    pub fn new(key: impl Into<String>, stored: ValueKind, incoming: ValueKind) -> Self {
        Self {
            key: key.into(),
            stored,
            incoming,
        }
    }

    /// Converts to a JSON value for event payloads.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "key": self.key,
            "stored": self.stored.to_string(),
            "incoming": self.incoming.to_string(),
        })
    }
}
