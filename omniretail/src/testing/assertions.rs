//! Test assertions for provider results and plans.

use crate::planner::Plan;
use crate::providers::{ProviderId, ProviderResult};

/// Asserts that the result indicates success.
pub fn assert_result_succeeded(result: &ProviderResult) {
    assert!(
        result.success,
        "Expected success, got error: {:?}",
        result.error
    );
}

/// Asserts that the result indicates failure and its error mentions `needle`.
pub fn assert_result_failed(result: &ProviderResult, needle: &str) {
    assert!(!result.success, "Expected failure, got success: {result:?}");
    let error = result.error.as_deref().unwrap_or_default();
    assert!(
        error.contains(needle),
        "Expected error containing '{needle}', got '{error}'"
    );
}

/// Asserts that `earlier` runs in a strictly earlier stage than `later`.
pub fn assert_runs_before(plan: &Plan, earlier: ProviderId, later: ProviderId) {
    let (Some(a), Some(b)) = (plan.stage_of(earlier), plan.stage_of(later)) else {
        panic!("Expected both {earlier} and {later} in plan, got {:?}", plan.stages);
    };
    assert!(
        a < b,
        "Expected {earlier} (stage {a}) before {later} (stage {b})"
    );
}

/// Asserts that a narrative contains a clause.
pub fn assert_narrative_contains(narrative: &str, clause: &str) {
    assert!(
        narrative.contains(clause),
        "Expected narrative to contain '{clause}', got '{narrative}'"
    );
}
