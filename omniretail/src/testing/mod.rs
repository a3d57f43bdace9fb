//! Testing utilities.
//!
//! This module provides:
//! - Mock providers (scripted, failing, slow, panicking, concurrency probe)
//! - Canned records and registries
//! - Assertions for provider results and plans

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_narrative_contains, assert_result_failed, assert_result_succeeded, assert_runs_before,
};
pub use fixtures::{order_record, registry_of, resolved_order, shipment_record};
pub use mocks::{
    ConcurrencyGauge, ConcurrencyProbe, FailingProvider, PanickingProvider, ScriptedProvider, SlowProvider,
};
