//! Query planning.
//!
//! The planner is a pure function of (query, user id, session snapshot). It
//! decides which providers a query needs and partitions them into stages so
//! that the order-identifier resolver runs before providers that depend on
//! the identifier it produces.

mod identifier;
mod rules;

pub use identifier::extract_order_id;
pub use rules::{
    Companion, KeywordRule, MatchMode, QueryText, CONTINUATION_RULES, DOMAIN_RULES,
    RESET_ACKNOWLEDGEMENT, RESET_PHRASES,
};

use crate::context::{Context, USER_ID_KEY};
use crate::providers::{ProviderId, ProviderSet};
use serde::Serialize;
use tracing::debug;

/// An immutable execution plan.
///
/// Every provider appears in exactly one stage and the union of the stages
/// equals `required_providers`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    /// Every provider the query needs.
    pub required_providers: ProviderSet,
    /// Provider groups, run in order; members of a group run concurrently.
    pub stages: Vec<ProviderSet>,
    /// Facts visible to the first stage.
    pub initial_context: Context,
    /// Whether the utterance asked to clear the session.
    pub reset: bool,
    /// Canned reply for terminal plans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledgement: Option<String>,
    /// Order identifier found in the query text, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_identifier: Option<i64>,
}

impl Plan {
    /// Creates a plan that invokes nothing.
    #[must_use]
    pub fn empty(initial_context: Context) -> Self {
        Self {
            required_providers: ProviderSet::EMPTY,
            stages: Vec::new(),
            initial_context,
            reset: false,
            acknowledgement: None,
            extracted_identifier: None,
        }
    }

    /// Creates the terminal plan for a reset utterance.
    #[must_use]
    pub fn reset(acknowledgement: impl Into<String>) -> Self {
        Self {
            reset: true,
            acknowledgement: Some(acknowledgement.into()),
            ..Self::empty(Context::new())
        }
    }

    /// Returns true when no provider was selected for a non-reset query.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.reset && self.required_providers.is_empty()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the index of the stage holding `id`.
    #[must_use]
    pub fn stage_of(&self, id: ProviderId) -> Option<usize> {
        self.stages.iter().position(|stage| stage.contains(id))
    }

    /// Checks the stage invariants: no empty stage, no provider in two
    /// stages, and stages covering exactly the required providers.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut seen = ProviderSet::EMPTY;
        for stage in &self.stages {
            if stage.is_empty() || !stage.is_disjoint(seen) {
                return false;
            }
            seen |= *stage;
        }
        seen == self.required_providers
    }
}

/// Maps queries to plans using keyword rule tables.
#[derive(Debug, Clone)]
pub struct Planner {
    domain_rules: Vec<KeywordRule>,
    continuation_rules: Vec<KeywordRule>,
    reset_phrases: Vec<String>,
    acknowledgement: String,
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            domain_rules: DOMAIN_RULES.to_vec(),
            continuation_rules: CONTINUATION_RULES.to_vec(),
            reset_phrases: RESET_PHRASES.iter().map(|p| (*p).to_string()).collect(),
            acknowledgement: RESET_ACKNOWLEDGEMENT.to_string(),
        }
    }
}

impl Planner {
    /// Creates a planner with the built-in rule tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a domain rule.
    #[must_use]
    pub fn with_domain_rule(mut self, rule: KeywordRule) -> Self {
        self.domain_rules.push(rule);
        self
    }

    /// Adds a continuation rule.
    #[must_use]
    pub fn with_continuation_rule(mut self, rule: KeywordRule) -> Self {
        self.continuation_rules.push(rule);
        self
    }

    /// Adds a reset phrase. The phrase is normalized the same way queries are.
    #[must_use]
    pub fn with_reset_phrase(mut self, phrase: &str) -> Self {
        self.reset_phrases
            .push(QueryText::new(phrase).normalized().to_string());
        self
    }

    /// Sets the reply used for reset plans.
    #[must_use]
    pub fn with_acknowledgement(mut self, text: impl Into<String>) -> Self {
        self.acknowledgement = text.into();
        self
    }

    /// Builds a plan. Never fails; unmatched queries yield an empty plan.
    #[must_use]
    pub fn plan(&self, query: &str, user_id: Option<i64>, session: Option<&Context>) -> Plan {
        let text = QueryText::new(query);

        if text.is_one_of(self.reset_phrases.as_slice()) {
            debug!(?user_id, "Reset requested");
            return Plan::reset(self.acknowledgement.clone());
        }

        let extracted = extract_order_id(query);
        let carried = session.and_then(Context::order_id);
        let identifier_active = extracted.is_some() || carried.is_some();
        // A different explicit order makes the carried facts stale.
        let identifier_settled =
            carried.is_some() && extracted.map_or(true, |id| Some(id) == carried);

        let mut selected = select(&self.domain_rules, &text);
        if identifier_active {
            selected |= select(&self.continuation_rules, &text);
        }

        let initial_context = seed_context(session, user_id, extracted);

        if selected.is_empty() {
            debug!(?user_id, query = %query, "No provider matched; plan degraded");
            return Plan {
                extracted_identifier: extracted,
                ..Plan::empty(initial_context)
            };
        }

        let stages = partition(selected, identifier_settled);
        debug!(
            ?user_id,
            providers = ?selected,
            stages = stages.len(),
            order_id = ?extracted.or(carried),
            "Plan built"
        );

        Plan {
            required_providers: selected,
            stages,
            initial_context,
            reset: false,
            acknowledgement: None,
            extracted_identifier: extracted,
        }
    }
}

fn select(rules: &[KeywordRule], text: &QueryText) -> ProviderSet {
    rules
        .iter()
        .fold(ProviderSet::EMPTY, |acc, rule| acc | rule.evaluate(text))
}

/// Session snapshot, then the user id, then a freshly extracted identifier.
///
/// An extracted identifier that differs from the carried one also drops the
/// facts bound to the carried order.
fn seed_context(session: Option<&Context>, user_id: Option<i64>, extracted: Option<i64>) -> Context {
    let mut context = session.cloned().unwrap_or_default();
    if let Some(user_id) = user_id {
        context.insert(USER_ID_KEY, user_id);
    }
    if let Some(order_id) = extracted {
        context.set_order_id(order_id);
    }
    context
}

/// The resolver goes first unless the session already holds the identifier
/// the query is about.
fn partition(selected: ProviderSet, identifier_settled: bool) -> Vec<ProviderSet> {
    let resolver = ProviderId::ALL
        .into_iter()
        .find(|id| id.is_identifier_resolver() && selected.contains(*id));

    match resolver {
        Some(resolver) if !identifier_settled => {
            let dependents = selected.without(resolver);
            if dependents.is_empty() {
                vec![selected]
            } else {
                vec![ProviderSet::of(resolver), dependents]
            }
        }
        _ => vec![selected],
    }
}
