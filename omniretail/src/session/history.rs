//! Append-only record of answered queries.

use crate::providers::ProviderId;
use crate::utils::serialize_iso;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

/// One answered query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationEntry {
    /// When the answer was produced.
    #[serde(serialize_with = "serialize_iso")]
    pub timestamp: DateTime<Utc>,
    /// Identifier of the request that produced the answer.
    pub request_id: Uuid,
    /// The requesting user, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// The raw query.
    pub query: String,
    /// The narrative returned to the caller.
    pub narrative: String,
    /// Providers that were invoked, in canonical order.
    pub providers_invoked: Vec<ProviderId>,
}

/// Process-lifetime conversation log. Observability only; nothing reads it
/// back into planning.
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: RwLock<Vec<ConversationEntry>>,
}

impl ConversationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn append(&self, entry: ConversationEntry) {
        self.entries.write().push(entry);
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns all entries, or only those of `user_id`.
    #[must_use]
    pub fn entries(&self, user_id: Option<i64>) -> Vec<ConversationEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| user_id.is_none() || e.user_id == user_id)
            .cloned()
            .collect()
    }
}
