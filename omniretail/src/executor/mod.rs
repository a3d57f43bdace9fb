//! Stage execution.
//!
//! Runs a [`Plan`] stage by stage. Providers within a stage run concurrently
//! in their own tasks; the stage ends at a barrier, after which successful
//! context deltas are merged into the working context. The next stage only
//! starts once the merge is settled.


use crate::context::{Context, MergeOutcome, ORDER_ID_KEY, PRODUCT_NAME_KEY};
use crate::errors::{MergeConflict, ProviderError};
use crate::events::{
    EventSink, NoOpEventSink, CONTEXT_MERGED, CONTEXT_MERGE_CONFLICT, PROVIDER_COMPLETED,
    PROVIDER_FAILED, STAGE_COMPLETED, STAGE_STARTED,
};
use crate::planner::Plan;
use crate::providers::{ProviderId, ProviderRegistry, ProviderResult, ProviderSet};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Executor limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Timeout applied to each provider call, in milliseconds.
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    /// Maximum simultaneous provider calls across all requests.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

const fn default_provider_timeout_ms() -> u64 {
    10_000
}

const fn default_max_concurrency() -> usize {
    8
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: default_provider_timeout_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl ExecutorConfig {
    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_provider_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.provider_timeout_ms = timeout_ms;
        self
    }

    /// Sets the concurrency cap.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }
}

/// Everything a plan execution produced.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// One result per invoked provider.
    pub results: BTreeMap<ProviderId, ProviderResult>,
    /// The working context after the last merge.
    pub context: Context,
    /// Delta keys merged into the working context, in merge order.
    pub applied: Vec<String>,
    /// Delta keys dropped because their kind disagreed.
    pub conflicts: Vec<MergeConflict>,
    /// Wall-clock time of the whole plan in milliseconds.
    pub duration_ms: f64,
}

impl ExecutionOutcome {
    /// Providers that were invoked, in canonical order.
    #[must_use]
    pub fn invoked(&self) -> Vec<ProviderId> {
        self.results.keys().copied().collect()
    }

    /// Returns true if every invoked provider succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(|r| r.success)
    }
}

/// Runs plans against a provider registry.
pub struct StageExecutor {
    registry: Arc<ProviderRegistry>,
    permits: Arc<Semaphore>,
    config: ExecutorConfig,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StageExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, config: ExecutorConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            registry,
            permits,
            config,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the provider registry.
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Returns the executor limits.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes every stage of `plan` in order.
    ///
    /// Never fails: provider errors, panics and timeouts become failed
    /// results for that provider alone.
    pub async fn execute(&self, plan: &Plan, query: &str) -> ExecutionOutcome {
        let start = Instant::now();
        let query: Arc<str> = Arc::from(query);
        let mut context = plan.initial_context.clone();
        let mut results = BTreeMap::new();
        let mut merged = MergeOutcome::default();

        for (index, stage) in plan.stages.iter().enumerate() {
            let stage_start = Instant::now();
            let stage_results = self.run_stage(index, *stage, &query, &context).await;
            let outcome = self.merge_stage(index, &stage_results, &mut context).await;

            let duration_ms = stage_start.elapsed().as_secs_f64() * 1000.0;
            self.events
                .emit(
                    STAGE_COMPLETED,
                    Some(json!({"stage": index, "duration_ms": duration_ms})),
                )
                .await;
            debug!(stage = index, duration_ms, "Stage completed");

            merged.absorb(outcome);
            results.extend(stage_results);
        }

        ExecutionOutcome {
            results,
            context,
            applied: merged.applied,
            conflicts: merged.conflicts,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }

    /// Fans out one stage and waits for every member (the barrier).
    async fn run_stage(
        &self,
        index: usize,
        stage: ProviderSet,
        query: &Arc<str>,
        context: &Context,
    ) -> BTreeMap<ProviderId, ProviderResult> {
        self.events
            .emit(STAGE_STARTED, Some(json!({"stage": index, "providers": stage})))
            .await;
        debug!(stage = index, providers = ?stage, "Stage started");

        let snapshot = Arc::new(context.clone());

        let mut tasks = FuturesUnordered::new();
        for id in stage.iter() {
            let handle = self.spawn_invocation(id, Arc::clone(query), Arc::clone(&snapshot));
            tasks.push(async move { (id, handle.await) });
        }

        let mut results = BTreeMap::new();
        while let Some((id, joined)) = tasks.next().await {
            let result = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => ProviderResult::failure(e.to_string()),
                Err(e) => ProviderResult::failure(
                    ProviderError::Crashed {
                        provider: id,
                        reason: e.to_string(),
                    }
                    .to_string(),
                ),
            };
            self.report(index, id, &result).await;
            results.insert(id, result);
        }

        results
    }

    fn spawn_invocation(
        &self,
        id: ProviderId,
        query: Arc<str>,
        snapshot: Arc<Context>,
    ) -> JoinHandle<Result<ProviderResult, ProviderError>> {
        let provider = self.registry.get(id);
        let permits = Arc::clone(&self.permits);
        let timeout_ms = self.config.provider_timeout_ms;

        tokio::spawn(async move {
            let provider = provider.ok_or(ProviderError::NotRegistered { provider: id })?;

            // The deadline covers the wait for a permit as well as the call.
            let call = async {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ProviderError::Failed(e.to_string()))?;
                provider.process_query(&query, &snapshot).await
            };

            tokio::time::timeout(Duration::from_millis(timeout_ms), call)
                .await
                .unwrap_or(Err(ProviderError::Timeout {
                    provider: id,
                    timeout_ms,
                }))
        })
    }

    async fn report(&self, stage: usize, id: ProviderId, result: &ProviderResult) {
        if result.success {
            info!(stage, provider = %id, record_count = result.record_count, "Provider completed");
            self.events
                .emit(
                    PROVIDER_COMPLETED,
                    Some(json!({
                        "stage": stage,
                        "provider": id,
                        "record_count": result.record_count,
                    })),
                )
                .await;
        } else {
            warn!(stage, provider = %id, error = ?result.error, "Provider failed");
            self.events
                .emit(
                    PROVIDER_FAILED,
                    Some(json!({
                        "stage": stage,
                        "provider": id,
                        "error": result.error,
                    })),
                )
                .await;
        }
    }

    /// Merges the stage's deltas in canonical provider order.
    async fn merge_stage(
        &self,
        stage: usize,
        results: &BTreeMap<ProviderId, ProviderResult>,
        context: &mut Context,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for (id, result) in results {
            let Some(delta) = delta_of(*id, result) else {
                continue;
            };
            let merged = context.merge(&delta);
            for conflict in &merged.conflicts {
                warn!(stage, provider = %id, error = %conflict, "Context merge conflict");
                let mut payload = conflict.to_json();
                payload["provider"] = json!(id);
                payload["stage"] = json!(stage);
                self.events.emit(CONTEXT_MERGE_CONFLICT, Some(payload)).await;
            }
            if !merged.withheld.is_empty() {
                warn!(stage, provider = %id, keys = ?merged.withheld, "Order facts withheld");
            }
            outcome.absorb(merged);
        }

        if !outcome.applied.is_empty() {
            debug!(stage, keys = ?outcome.applied, "Context merged");
            self.events
                .emit(
                    CONTEXT_MERGED,
                    Some(json!({"stage": stage, "keys": outcome.applied})),
                )
                .await;
        }

        outcome
    }
}

/// The delta a successful result contributes.
///
/// The identifier resolver's first record supplies `order_id` and
/// `product_name` when it reports no explicit delta.
fn delta_of(id: ProviderId, result: &ProviderResult) -> Option<Context> {
    if !result.success {
        return None;
    }
    if let Some(delta) = &result.context_delta {
        return Some(delta.clone());
    }
    if !id.is_identifier_resolver() {
        return None;
    }

    let record = result.first_record()?.as_object()?;
    let order_id = record.get(ORDER_ID_KEY).filter(|v| !v.is_null())?;

    let mut delta = Context::new().with(ORDER_ID_KEY, order_id.clone());
    if let Some(name) = record.get(PRODUCT_NAME_KEY).filter(|v| !v.is_null()) {
        delta.insert(PRODUCT_NAME_KEY, name.clone());
    }
    Some(delta)
}
