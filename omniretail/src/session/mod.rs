//! Per-user session facts and the conversation log.

mod history;

pub use history::{ConversationEntry, ConversationLog};

use crate::context::{Context, MergeOutcome};
use dashmap::DashMap;
use tracing::{debug, warn};

/// Carries facts across a user's turns for the life of the process.
///
/// Each user's context sits behind its own map shard lock, so merges for one
/// user serialize while different users proceed independently. Entries are
/// never evicted.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<i64, Context>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the user's context, creating an empty one on
    /// first access.
    pub fn get(&self, user_id: i64) -> Context {
        self.sessions.entry(user_id).or_default().clone()
    }

    /// Returns a snapshot without creating an entry.
    #[must_use]
    pub fn peek(&self, user_id: i64) -> Option<Context> {
        self.sessions.get(&user_id).map(|c| c.clone())
    }

    /// Merges a delta into the user's context, key by key.
    ///
    /// Keys whose kind disagrees with the stored value are dropped and
    /// reported in the outcome.
    pub fn merge(&self, user_id: i64, delta: &Context) -> MergeOutcome {
        if delta.is_empty() {
            return MergeOutcome::default();
        }

        let outcome = self.sessions.entry(user_id).or_default().merge(delta);

        for conflict in &outcome.conflicts {
            warn!(user_id, key = %conflict.key, error = %conflict, "Session merge conflict");
        }
        if !outcome.withheld.is_empty() {
            warn!(user_id, keys = ?outcome.withheld, "Order facts withheld");
        }
        debug!(user_id, applied = ?outcome.applied, "Session merged");
        outcome
    }

    /// Makes `order_id` the user's active order without kind validation.
    ///
    /// Facts bound to a different previous order are dropped. Returns true
    /// if the active order changed.
    pub fn set_order_id(&self, user_id: i64, order_id: i64) -> bool {
        let changed = self.sessions.entry(user_id).or_default().set_order_id(order_id);
        if changed {
            debug!(user_id, order_id, "Active order switched");
        }
        changed
    }

    /// Replaces the user's context with an empty one.
    pub fn reset(&self, user_id: i64) {
        self.sessions.insert(user_id, Context::new());
        debug!(user_id, "Session reset");
    }

    /// Returns the number of users with a session.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no user has a session.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ORDER_ID_KEY;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_get_creates_lazily() {
        let store = SessionStore::new();
        assert!(store.peek(1).is_none());
        assert!(store.get(1).is_empty());
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn test_merge_upserts_per_key() {
        let store = SessionStore::new();
        store.merge(1, &Context::new().with(ORDER_ID_KEY, 5).with("carrier", "UPS"));
        store.merge(1, &Context::new().with("carrier", "DHL").with("ticket_id", 3));

        assert_eq!(
            store.get(1).to_json(),
            json!({"carrier": "DHL", "order_id": 5, "ticket_id": 3})
        );
    }

    #[test]
    fn test_new_order_replaces_order_bound_facts() {
        let store = SessionStore::new();
        store.merge(1, &Context::new().with(ORDER_ID_KEY, "7").with("product_name", "Widget"));

        store.merge(1, &Context::new().with(ORDER_ID_KEY, 42).with("product_name", "Lamp"));

        assert_eq!(
            store.get(1).to_json(),
            json!({"order_id": 42, "product_name": "Lamp"})
        );
    }

    #[test]
    fn test_set_order_id_bypasses_kind_check() {
        let store = SessionStore::new();
        store.merge(1, &Context::new().with(ORDER_ID_KEY, "A-7").with("product_name", "Widget"));

        assert!(store.set_order_id(1, 42));
        assert!(!store.set_order_id(1, 42));

        assert_eq!(store.get(1).to_json(), json!({"order_id": 42}));
    }

    #[test]
    fn test_merge_conflict_keeps_other_keys() {
        let store = SessionStore::new();
        store.merge(1, &Context::new().with(ORDER_ID_KEY, 5));

        let outcome = store.merge(
            1,
            &Context::new().with(ORDER_ID_KEY, "five").with("carrier", "UPS"),
        );

        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.applied, vec!["carrier".to_string()]);
        assert_eq!(store.get(1).order_id(), Some(5));
    }

    #[test]
    fn test_reset_empties_only_that_user() {
        let store = SessionStore::new();
        store.merge(1, &Context::new().with(ORDER_ID_KEY, 5));
        store.merge(2, &Context::new().with(ORDER_ID_KEY, 9));

        store.reset(1);

        assert!(store.get(1).is_empty());
        assert_eq!(store.get(2).order_id(), Some(9));
    }

    #[test]
    fn test_empty_delta_does_not_create_session() {
        let store = SessionStore::new();
        let outcome = store.merge(4, &Context::new());
        assert!(outcome.is_clean());
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_users_do_not_interfere() {
        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();

        for user_id in 0..16_i64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for step in 0..50_i64 {
                    store.merge(user_id, &Context::new().with(format!("k{step}"), user_id));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.user_count(), 16);
        for user_id in 0..16_i64 {
            let ctx = store.get(user_id);
            assert_eq!(ctx.len(), 50);
            assert!(ctx.iter().all(|(_, v)| v == &json!(user_id)));
        }
    }
}
