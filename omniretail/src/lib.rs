//! # Omniretail
//!
//! An orchestration engine for customer-service queries that span several
//! independently owned data domains: orders and products, shipments,
//! payments and refunds, and support tickets.
//!
//! One query flows through:
//!
//! - **Planning**: keyword rules and carried-over session facts decide which
//!   providers are needed and in which stages they run
//! - **Staged execution**: providers in a stage run concurrently with
//!   per-call timeouts; context deltas merge at the stage barrier
//! - **Session carry-over**: facts such as the order in discussion persist
//!   across a user's turns
//! - **Synthesis**: results become one narrative, with a deterministic
//!   fallback when generation is unavailable
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use omniretail::prelude::*;
//!
//! let config = OrchestratorConfig::load_default()?.unwrap_or_default();
//! let orchestrator = Orchestrator::from_config(&config)?;
//!
//! let response = orchestrator.process_query("Where is my order 7?", Some(1)).await;
//! println!("{}", response.narrative_response);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod providers;
pub mod session;
pub mod synthesis;
pub mod utils;

/// Testing utilities
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{OrchestratorConfig, ProviderEndpoint, ProvidersConfig};
    pub use crate::context::{Context, MergeOutcome, ValueKind};
    pub use crate::errors::{
        ConfigError, GenerationError, MergeConflict, OrchestratorError, ProviderError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::{ExecutionOutcome, ExecutorConfig, StageExecutor};
    pub use crate::orchestrator::{Orchestrator, OrchestratorBuilder, QueryResponse};
    pub use crate::planner::{KeywordRule, MatchMode, Plan, Planner};
    pub use crate::providers::{
        Provider, ProviderId, ProviderRegistry, ProviderResult, ProviderSet, Readiness,
        UnconfiguredProvider,
    };
    #[cfg(feature = "http-providers")]
    pub use crate::providers::HttpProvider;
    pub use crate::session::{ConversationEntry, ConversationLog, SessionStore};
    #[cfg(feature = "gemini")]
    pub use crate::synthesis::GeminiClient;
    pub use crate::synthesis::{
        GenerationClient, Narrative, NarrativeSource, SynthesisConfig, SynthesisRequest,
        Synthesizer,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
