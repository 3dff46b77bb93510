//! Context variables threaded through a run.
//!
//! A run owns one [`ContextVariables`] map. Tools and post-turn hooks return
//! deltas that are merged in after every dispatch; instruction functions see
//! the up-to-date map before every model call. The map is never shown to the
//! model itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A string-keyed map of run-scoped values.
///
/// Merging is key-by-key with last-write-wins semantics: merging an empty
/// delta is a no-op, and merging `{"k": v2}` over `{"k": v1}` leaves `v2`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextVariables(Map<String, Value>);

impl ContextVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy when seeding a run.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Merge `delta` into this map, overwriting existing keys.
    pub fn merge(&mut self, delta: ContextVariables) {
        for (key, value) in delta.0 {
            self.0.insert(key, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The map as a JSON object, for injection into tool arguments.
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for ContextVariables {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for ContextVariables {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_merge_empty_delta_is_noop() {
        let mut ctx = ContextVariables::new().with("user", "ada");
        let before = ctx.clone();
        ctx.merge(ContextVariables::new());
        assert_eq!(ctx, before);
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut ctx = ContextVariables::new();
        ctx.merge(ContextVariables::new().with("k", json!(1)));
        ctx.merge(ContextVariables::new().with("k", json!(2)));
        assert_eq!(ctx.get("k"), Some(&json!(2)));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_merge_preserves_unrelated_keys() {
        let mut ctx = ContextVariables::new().with("a", 1).with("b", 2);
        ctx.merge(ContextVariables::new().with("b", 3));
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.get("b"), Some(&json!(3)));
    }

    #[test]
    fn test_as_value_round_trip() {
        let ctx = ContextVariables::new().with("id", 42);
        let value = ctx.as_value();
        assert_eq!(value, json!({"id": 42}));
        let back: ContextVariables = serde_json::from_value(value).unwrap();
        assert_eq!(back, ctx);
    }
}
