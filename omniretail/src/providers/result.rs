//! Provider result type with factory methods.

use crate::context::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The outcome of a single provider invocation.
///
/// Immutable once created. Failures of any kind (error, timeout, panic,
/// unregistered provider) are represented as a result with
/// `success == false`, never as an error escaping the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Whether the provider answered successfully.
    pub success: bool,

    /// Number of records returned.
    #[serde(default)]
    pub record_count: usize,

    /// The returned records.
    #[serde(default)]
    pub data: Vec<Value>,

    /// Error description for failed invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Facts to merge into the working context after the stage.
    #[serde(
        default,
        alias = "context",
        skip_serializing_if = "Option::is_none"
    )]
    pub context_delta: Option<Context>,

    /// A human note from the provider, carried through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProviderResult {
    /// Creates a successful result. `record_count` is the number of records.
    #[must_use]
    pub fn success(data: Vec<Value>) -> Self {
        Self {
            success: true,
            record_count: data.len(),
            data,
            error: None,
            context_delta: None,
            message: None,
        }
    }

    /// Creates a successful result with no records.
    #[must_use]
    pub fn empty() -> Self {
        Self::success(Vec::new())
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            record_count: 0,
            data: Vec::new(),
            error: Some(error.into()),
            context_delta: None,
            message: None,
        }
    }

    /// Attaches a context delta.
    #[must_use]
    pub fn with_context_delta(mut self, delta: Context) -> Self {
        self.context_delta = Some(delta);
        self
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns true if the provider succeeded with at least one record.
    #[must_use]
    pub const fn has_records(&self) -> bool {
        self.success && self.record_count > 0
    }

    /// Returns the first record, if any.
    #[must_use]
    pub fn first_record(&self) -> Option<&Value> {
        self.data.first()
    }

    /// Converts to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
