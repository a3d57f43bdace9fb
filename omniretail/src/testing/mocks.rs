//! Mock providers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::errors::ProviderError;
use crate::providers::{Provider, ProviderId, ProviderResult};

/// A provider that returns a fixed result and records every call.
#[derive(Debug)]
pub struct ScriptedProvider {
    id: ProviderId,
    result: Mutex<ProviderResult>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Context)>>,
}

impl ScriptedProvider {
    /// Creates a provider answering with `result`.
    #[must_use]
    pub fn new(id: ProviderId, result: ProviderResult) -> Self {
        Self {
            id,
            result: Mutex::new(result),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the scripted result.
    pub fn set_result(&self, result: ProviderResult) {
        *self.result.lock() = result;
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the context snapshot passed to each call.
    #[must_use]
    pub fn recorded_contexts(&self) -> Vec<Context> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Returns the query passed to each call.
    #[must_use]
    pub fn recorded_queries(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(q, _)| q.clone()).collect()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn process_query(
        &self,
        query: &str,
        context: &Context,
    ) -> Result<ProviderResult, ProviderError> {
        self.calls.lock().push((query.to_string(), context.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.result.lock().clone())
    }
}

/// A provider that always returns an error.
#[derive(Debug)]
pub struct FailingProvider {
    id: ProviderId,
    message: String,
    calls: AtomicUsize,
}

impl FailingProvider {
    /// Creates a provider failing with `message`.
    #[must_use]
    pub fn new(id: ProviderId, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FailingProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn process_query(
        &self,
        _query: &str,
        _context: &Context,
    ) -> Result<ProviderResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Failed(self.message.clone()))
    }
}

/// A provider that sleeps before answering with no records.
#[derive(Debug)]
pub struct SlowProvider {
    id: ProviderId,
    delay: Duration,
}

impl SlowProvider {
    /// Creates a provider that takes `delay` to answer.
    #[must_use]
    pub const fn new(id: ProviderId, delay: Duration) -> Self {
        Self { id, delay }
    }
}

#[async_trait]
impl Provider for SlowProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn process_query(
        &self,
        _query: &str,
        _context: &Context,
    ) -> Result<ProviderResult, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(ProviderResult::empty())
    }
}

/// A provider whose call panics.
#[derive(Debug)]
pub struct PanickingProvider {
    id: ProviderId,
}

impl PanickingProvider {
    /// Creates a panicking provider.
    #[must_use]
    pub const fn new(id: ProviderId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Provider for PanickingProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    #[allow(clippy::panic)]
    async fn process_query(
        &self,
        _query: &str,
        _context: &Context,
    ) -> Result<ProviderResult, ProviderError> {
        panic!("{} exploded", self.id);
    }
}

/// Shared counter of overlapping provider calls.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    /// Creates a gauge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the highest number of simultaneous calls observed.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A provider that holds each call for a while and reports overlap to a
/// shared [`ConcurrencyGauge`].
#[derive(Debug)]
pub struct ConcurrencyProbe {
    id: ProviderId,
    hold: Duration,
    gauge: Arc<ConcurrencyGauge>,
}

impl ConcurrencyProbe {
    /// Creates a probe.
    #[must_use]
    pub const fn new(id: ProviderId, hold: Duration, gauge: Arc<ConcurrencyGauge>) -> Self {
        Self { id, hold, gauge }
    }
}

#[async_trait]
impl Provider for ConcurrencyProbe {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn process_query(
        &self,
        _query: &str,
        _context: &Context,
    ) -> Result<ProviderResult, ProviderError> {
        self.gauge.enter();
        tokio::time::sleep(self.hold).await;
        self.gauge.exit();
        Ok(ProviderResult::empty())
    }
}
