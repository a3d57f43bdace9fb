//! Provider adapter that forwards queries to a remote domain service.

use super::{Provider, ProviderId, ProviderResult};
use crate::context::Context;
use crate::errors::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const MAX_ERROR_BODY: usize = 512;

/// A provider reached over HTTP.
///
/// POSTs `{query, context}` as JSON and decodes a [`ProviderResult`] from
/// the answer.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    id: ProviderId,
    url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    context: &'a Context,
}

/// Wire form of a provider answer. `record_count` is optional on the wire.
#[derive(Debug, Deserialize)]
struct WireResult {
    success: bool,
    #[serde(default)]
    record_count: Option<usize>,
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, alias = "context")]
    context_delta: Option<Context>,
    #[serde(default)]
    message: Option<String>,
}

impl From<WireResult> for ProviderResult {
    fn from(wire: WireResult) -> Self {
        Self {
            success: wire.success,
            record_count: wire.record_count.unwrap_or(wire.data.len()),
            data: wire.data,
            error: wire.error,
            context_delta: wire.context_delta,
            message: wire.message,
        }
    }
}

impl HttpProvider {
    /// Creates a provider posting to `url`.
    ///
    /// The client timeout is a backstop; the executor applies its own
    /// per-call timeout.
    pub fn new(
        id: ProviderId,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Self {
            id,
            url: url.into(),
            client,
        })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn decode(body: &str) -> Result<ProviderResult, ProviderError> {
        serde_json::from_str::<WireResult>(body)
            .map(ProviderResult::from)
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn process_query(
        &self,
        query: &str,
        context: &Context,
    ) -> Result<ProviderResult, ProviderError> {
        debug!(provider = %self.id, url = %self.url, "Forwarding query");

        let response = self
            .client
            .post(&self.url)
            .json(&QueryBody { query, context })
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        Self::decode(&text)
    }
}
