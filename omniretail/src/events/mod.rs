//! Lifecycle events for observability.
//!
//! The executor and orchestrator emit into an explicitly injected
//! [`EventSink`]; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A stage is about to fan out.
pub const STAGE_STARTED: &str = "stage.started";
/// All members of a stage have finished and deltas are merged.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A provider returned a successful result.
pub const PROVIDER_COMPLETED: &str = "provider.completed";
/// A provider errored, timed out, panicked or reported failure.
pub const PROVIDER_FAILED: &str = "provider.failed";
/// Deltas were merged into a context.
pub const CONTEXT_MERGED: &str = "context.merged";
/// A delta key was dropped because its kind disagreed.
pub const CONTEXT_MERGE_CONFLICT: &str = "context.merge_conflict";
/// The orchestrator finished a request.
pub const QUERY_COMPLETED: &str = "query.completed";
/// A user's session was cleared.
pub const SESSION_RESET: &str = "session.reset";
/// Synthesis fell back to deterministic text.
pub const SYNTHESIS_FALLBACK: &str = "synthesis.fallback";

/// Whether an event type signals something an operator should look at.
#[must_use]
pub fn is_warning(event_type: &str) -> bool {
    event_type.ends_with(".failed") || event_type == CONTEXT_MERGE_CONFLICT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_classification() {
        assert!(is_warning(PROVIDER_FAILED));
        assert!(is_warning(CONTEXT_MERGE_CONFLICT));
        assert!(!is_warning(STAGE_COMPLETED));
        assert!(!is_warning(SYNTHESIS_FALLBACK));
    }
}
