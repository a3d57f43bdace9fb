//! Context management for query orchestration.
//!
//! This module provides:
//! - The [`Context`] fact map shared by planner, executor and session store
//! - Kind-checked merging that rejects conflicting deltas key by key

mod values;

pub use values::{
    Context, MergeOutcome, ValueKind, ORDER_BOUND_KEYS, ORDER_ID_KEY, PRODUCT_NAME_KEY,
    USER_ID_KEY,
};
