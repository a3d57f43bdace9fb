//! The string-keyed fact map shared by planner, executor and session store.

use crate::errors::MergeConflict;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Key of the shared order identifier.
pub const ORDER_ID_KEY: &str = "order_id";
/// Key of the requesting user.
pub const USER_ID_KEY: &str = "user_id";
/// Key of the product name resolved alongside an order.
pub const PRODUCT_NAME_KEY: &str = "product_name";

/// Facts that describe the active order and go stale when it changes.
pub const ORDER_BOUND_KEYS: &[&str] = &[PRODUCT_NAME_KEY];

/// The JSON kind of a context value, used for merge validation.
///
/// Integers and floats share the `Number` kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool,
    /// JSON number.
    Number,
    /// JSON string.
    String,
    /// JSON array.
    Array,
    /// JSON object (a record).
    Object,
}

impl ValueKind {
    /// Returns the kind of a JSON value.
    #[must_use]
    pub const fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool => write!(f, "bool"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Array => write!(f, "array"),
            Self::Object => write!(f, "object"),
        }
    }
}

/// Result of merging a delta into a context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Keys that were inserted or overwritten.
    pub applied: Vec<String>,
    /// Keys that were dropped because their kind disagreed.
    pub conflicts: Vec<MergeConflict>,
    /// Order-bound keys dropped because the delta's `order_id` was rejected.
    pub withheld: Vec<String>,
}

impl MergeOutcome {
    /// Returns true if no key was rejected.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Folds another outcome into this one.
    pub fn absorb(&mut self, other: Self) {
        self.applied.extend(other.applied);
        self.conflicts.extend(other.conflicts);
        self.withheld.extend(other.withheld);
    }
}

/// A mapping of string keys to scalar or record values.
///
/// Keys are kept sorted so serialized contexts and merge order are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: BTreeMap<String, Value>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Sets a value unconditionally, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Returns all keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Returns the active order identifier, if any.
    ///
    /// Accepts integers and numeric strings, since providers are not
    /// consistent about which they report.
    #[must_use]
    pub fn order_id(&self) -> Option<i64> {
        match self.entries.get(ORDER_ID_KEY)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the user identifier, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.entries.get(USER_ID_KEY).and_then(Value::as_i64)
    }

    /// Makes `id` the active order. Facts bound to a different previous
    /// order are removed. Returns true if the active order changed.
    pub fn set_order_id(&mut self, id: i64) -> bool {
        let changed = self.order_id() != Some(id);
        if changed {
            self.clear_order_bound();
        }
        self.entries.insert(ORDER_ID_KEY.to_string(), Value::from(id));
        changed
    }

    /// Merges a delta key by key, last writer wins.
    ///
    /// A delta value whose kind differs from the stored value's kind is
    /// rejected and reported; `null` delta values are ignored. Keys not yet
    /// present are always accepted.
    ///
    /// Numeric string order identifiers are stored as numbers. A delta that
    /// moves to another order replaces the facts bound to the old one; a
    /// delta whose `order_id` is rejected has its order-bound facts withheld
    /// as well.
    pub fn merge(&mut self, delta: &Self) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut delta = delta.clone();
        delta.canonicalize_order_id();
        self.canonicalize_order_id();

        let mut withhold_bound = false;
        if let Some(incoming) = delta.entries.get(ORDER_ID_KEY).filter(|v| !v.is_null()) {
            match self.entries.get(ORDER_ID_KEY).filter(|v| !v.is_null()) {
                Some(stored) if ValueKind::of(stored) != ValueKind::of(incoming) => {
                    withhold_bound = true;
                }
                Some(stored) if stored != incoming => self.clear_order_bound(),
                _ => {}
            }
        }

        for (key, incoming) in &delta.entries {
            if incoming.is_null() {
                continue;
            }
            if withhold_bound && ORDER_BOUND_KEYS.contains(&key.as_str()) {
                outcome.withheld.push(key.clone());
                continue;
            }
            if let Some(stored) = self.entries.get(key) {
                let stored_kind = ValueKind::of(stored);
                let incoming_kind = ValueKind::of(incoming);
                if !stored.is_null() && stored_kind != incoming_kind {
                    outcome
                        .conflicts
                        .push(MergeConflict::new(key, stored_kind, incoming_kind));
                    continue;
                }
            }
            self.entries.insert(key.clone(), incoming.clone());
            outcome.applied.push(key.clone());
        }

        outcome
    }

    fn canonicalize_order_id(&mut self) {
        let parsed = match self.entries.get(ORDER_ID_KEY) {
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        if let Some(id) = parsed {
            self.entries.insert(ORDER_ID_KEY.to_string(), Value::from(id));
        }
    }

    fn clear_order_bound(&mut self) {
        for key in ORDER_BOUND_KEYS {
            self.entries.remove(*key);
        }
    }

    /// Copies every entry of `other` over this context without validation.
    pub fn overwrite_from(&mut self, other: &Self) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Returns a context holding only the given keys that are present.
    #[must_use]
    pub fn project(&self, keys: &[&str]) -> Self {
        keys.iter()
            .filter_map(|k| self.entries.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect()
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.entries.clone().into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<serde_json::Map<String, Value>> for Context {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}
