//! Per-request control flow.
//!
//! The [`Orchestrator`] owns explicit references to every collaborator:
//! planner, stage executor, synthesizer, session store, conversation log and
//! event sink. One call to [`Orchestrator::process_query`] runs
//!
//! 1. session lookup
//! 2. planning (reset plans stop here)
//! 3. staged execution
//! 4. session merge of the facts the request established
//! 5. synthesis
//! 6. history append
//!
//! and returns a [`QueryResponse`]. Nothing in that flow can fail: provider
//! and generation errors are folded into the response.

#[cfg(test)]
mod orchestrator_tests;

use crate::config::OrchestratorConfig;
use crate::context::{Context, USER_ID_KEY};
use crate::errors::OrchestratorError;
use crate::events::{
    EventSink, NoOpEventSink, CONTEXT_MERGE_CONFLICT, QUERY_COMPLETED, SESSION_RESET,
    SYNTHESIS_FALLBACK,
};
use crate::executor::{ExecutorConfig, StageExecutor};
use crate::planner::Planner;
use crate::providers::{
    Provider, ProviderId, ProviderRegistry, ProviderResult, Readiness, UnconfiguredProvider,
};
use crate::session::{ConversationEntry, ConversationLog, SessionStore};
use crate::synthesis::{NarrativeSource, SynthesisRequest, Synthesizer};
use crate::utils::format_iso;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// The answer to one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// When the answer was produced.
    pub timestamp: String,
    /// The query as received.
    pub original_query: String,
    /// Invoked providers in canonical order.
    pub agents_invoked: Vec<ProviderId>,
    /// The synthesized narrative.
    pub narrative_response: String,
    /// Per-provider results.
    pub data_sources: BTreeMap<ProviderId, ProviderResult>,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    registry: ProviderRegistry,
    planner: Planner,
    executor_config: ExecutorConfig,
    synthesizer: Synthesizer,
    events: Arc<dyn EventSink>,
}

impl OrchestratorBuilder {
    /// Starts a builder over `registry`.
    #[must_use]
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            planner: Planner::new(),
            executor_config: ExecutorConfig::default(),
            synthesizer: Synthesizer::fallback_only(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the planner.
    #[must_use]
    pub fn planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    /// Sets executor limits.
    #[must_use]
    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Sets the synthesizer.
    #[must_use]
    pub fn synthesizer(mut self, synthesizer: Synthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Sets the event sink shared by the orchestrator and its executor.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Starts a builder from configuration.
    ///
    /// Providers with a URL are reached over HTTP; the rest are registered
    /// as unconfigured and fail every call. Generation is enabled only when
    /// an API key is present.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, OrchestratorError> {
        let mut registry = ProviderRegistry::new();
        for id in ProviderId::ALL {
            registry.register(provider_from_config(config, id)?);
        }

        Ok(Self::new(registry)
            .executor_config(config.executor.clone())
            .synthesizer(synthesizer_from_config(config)?))
    }

    /// Builds the orchestrator with an empty session store and log.
    #[must_use]
    pub fn build(self) -> Orchestrator {
        let executor = StageExecutor::new(Arc::new(self.registry), self.executor_config)
            .with_event_sink(Arc::clone(&self.events));
        Orchestrator {
            planner: self.planner,
            executor,
            synthesizer: self.synthesizer,
            sessions: SessionStore::new(),
            history: ConversationLog::new(),
            events: self.events,
        }
    }
}

/// Runs queries end to end.
pub struct Orchestrator {
    planner: Planner,
    executor: StageExecutor,
    synthesizer: Synthesizer,
    sessions: SessionStore,
    history: ConversationLog,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("executor", &self.executor)
            .field("synthesizer", &self.synthesizer)
            .field("sessions", &self.sessions.user_count())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Starts a builder.
    #[must_use]
    pub fn builder(registry: ProviderRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder::new(registry)
    }

    /// Assembles an orchestrator from configuration with no event sink.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, OrchestratorError> {
        OrchestratorBuilder::from_config(config).map(OrchestratorBuilder::build)
    }

    /// Answers one query.
    pub async fn process_query(&self, query: &str, user_id: Option<i64>) -> QueryResponse {
        let request_id = Uuid::new_v4();
        let span = info_span!("query", %request_id, user_id);
        self.run(request_id, query, user_id).instrument(span).await
    }

    async fn run(&self, request_id: Uuid, query: &str, user_id: Option<i64>) -> QueryResponse {
        let snapshot = user_id.map(|uid| self.sessions.get(uid));
        let plan = self.planner.plan(query, user_id, snapshot.as_ref());

        if plan.reset {
            if let Some(uid) = user_id {
                self.sessions.reset(uid);
            }
            self.events
                .emit(SESSION_RESET, Some(json!({"user_id": user_id})))
                .await;
            info!("Session reset");

            let narrative = plan.acknowledgement.unwrap_or_default();
            return self.finish(request_id, query, user_id, narrative, BTreeMap::new()).await;
        }

        if plan.is_degraded() {
            debug!("No provider matched the query");
        }

        let outcome = self.executor.execute(&plan, query).await;

        if let Some(uid) = user_id {
            if let Some(order_id) = plan.extracted_identifier {
                self.sessions.set_order_id(uid, order_id);
            }
            let merged = self
                .sessions
                .merge(uid, &established_facts(&outcome.context, &plan.initial_context));
            for conflict in &merged.conflicts {
                let mut payload = conflict.to_json();
                payload["user_id"] = json!(uid);
                self.events.emit(CONTEXT_MERGE_CONFLICT, Some(payload)).await;
            }
        }

        let carried = snapshot
            .map(|before| carried_facts(&before, &plan.initial_context))
            .unwrap_or_default();
        let narrative = self
            .synthesizer
            .synthesize(&SynthesisRequest::new(query, &outcome.results, &carried))
            .await;
        if narrative.source == NarrativeSource::Fallback {
            self.events
                .emit(
                    SYNTHESIS_FALLBACK,
                    Some(json!({"providers": outcome.invoked()})),
                )
                .await;
        }

        info!(
            providers = ?outcome.invoked(),
            duration_ms = outcome.duration_ms,
            all_succeeded = outcome.all_succeeded(),
            "Query answered"
        );
        self.finish(request_id, query, user_id, narrative.text, outcome.results)
            .await
    }

    async fn finish(
        &self,
        request_id: Uuid,
        query: &str,
        user_id: Option<i64>,
        narrative: String,
        data_sources: BTreeMap<ProviderId, ProviderResult>,
    ) -> QueryResponse {
        let now = Utc::now();
        let agents_invoked: Vec<ProviderId> = data_sources.keys().copied().collect();

        self.history.append(ConversationEntry {
            timestamp: now,
            request_id,
            user_id,
            query: query.to_string(),
            narrative: narrative.clone(),
            providers_invoked: agents_invoked.clone(),
        });
        self.events
            .emit(
                QUERY_COMPLETED,
                Some(json!({
                    "request_id": request_id,
                    "user_id": user_id,
                    "providers": agents_invoked,
                })),
            )
            .await;

        QueryResponse {
            timestamp: format_iso(&now),
            original_query: query.to_string(),
            agents_invoked,
            narrative_response: narrative,
            data_sources,
        }
    }

    /// Returns logged turns, optionally for one user.
    #[must_use]
    pub fn history(&self, user_id: Option<i64>) -> Vec<ConversationEntry> {
        self.history.entries(user_id)
    }

    /// Returns the number of logged turns.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Returns the readiness of every provider.
    #[must_use]
    pub fn agent_status(&self) -> BTreeMap<ProviderId, Readiness> {
        self.executor.registry().readiness()
    }

    /// Returns the session store.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Returns a snapshot of the user's session, if one exists.
    #[must_use]
    pub fn session(&self, user_id: i64) -> Option<Context> {
        self.sessions.peek(user_id)
    }
}

/// Session facts the plan kept as they were, minus the user id.
fn carried_facts(snapshot: &Context, seeded: &Context) -> Context {
    snapshot
        .iter()
        .filter(|(key, value)| key.as_str() != USER_ID_KEY && seeded.get(key) == Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Facts in `after` that are new or changed relative to `before`.
fn established_facts(after: &Context, before: &Context) -> Context {
    let mut delta = Context::new();
    for (key, value) in after.iter() {
        if before.get(key) != Some(value) {
            delta.insert(key.clone(), value.clone());
        }
    }
    delta
}

#[cfg(feature = "http-providers")]
fn provider_from_config(
    config: &OrchestratorConfig,
    id: ProviderId,
) -> Result<Arc<dyn Provider>, OrchestratorError> {
    use crate::providers::HttpProvider;
    use std::time::Duration;

    match config.providers.url(id) {
        Some(url) => {
            let timeout = Duration::from_millis(config.executor.provider_timeout_ms);
            info!(provider = %id, url, "Provider configured");
            Ok(Arc::new(HttpProvider::new(id, url, timeout)?))
        }
        None => {
            info!(provider = %id, "Provider has no URL; registering as unconfigured");
            Ok(Arc::new(UnconfiguredProvider::new(id)))
        }
    }
}

#[cfg(not(feature = "http-providers"))]
#[allow(clippy::unnecessary_wraps)]
fn provider_from_config(
    _config: &OrchestratorConfig,
    id: ProviderId,
) -> Result<Arc<dyn Provider>, OrchestratorError> {
    Ok(Arc::new(UnconfiguredProvider::new(id)))
}

#[cfg(feature = "gemini")]
fn synthesizer_from_config(config: &OrchestratorConfig) -> Result<Synthesizer, OrchestratorError> {
    use crate::synthesis::GeminiClient;
    use std::time::Duration;

    if config.synthesis.api_key().is_none() {
        info!("No generation API key; narratives use the deterministic fallback");
        return Ok(Synthesizer::fallback_only());
    }
    let client = GeminiClient::from_config(&config.synthesis)?;
    info!(model = client.model(), "Generation enabled");
    Ok(Synthesizer::new(
        Arc::new(client),
        Duration::from_millis(config.synthesis.timeout_ms),
    ))
}

#[cfg(not(feature = "gemini"))]
#[allow(clippy::unnecessary_wraps)]
fn synthesizer_from_config(_config: &OrchestratorConfig) -> Result<Synthesizer, OrchestratorError> {
    Ok(Synthesizer::fallback_only())
}
