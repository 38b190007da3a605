//! The shared artifact/config store threaded through recipe execution.
//!
//! Artifacts and config values are plain `serde_json::Value`, so cloning a
//! context is already a structurally deep copy with no aliased nested
//! containers. That's what keeps `loop` and `parallel` iterations isolated
//! from each other and from the live context.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// A read-only view over the context's config map, handed to templates and
/// to the restricted expression evaluator.
#[derive(Debug, Clone)]
pub struct ConfigView(HashMap<String, Value>);

impl ConfigView {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &HashMap<String, Value> {
        &self.0
    }
}

/// The shared state passed through sequential steps and cloned at the
/// boundary of concurrent work (`loop`, `parallel`).
#[derive(Debug, Clone, Default)]
pub struct Context {
    artifacts: HashMap<String, Value>,
    config: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HashMap<String, Value>) -> Self {
        Self {
            artifacts: HashMap::new(),
            config,
        }
    }

    /// Read an artifact. Returns `None` if the key is absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.artifacts.get(key)
    }

    /// Write (or overwrite) an artifact.
    ///
    /// # Panics
    /// Panics if `key` is empty. Artifact keys are non-empty strings by
    /// invariant; callers that accept keys from recipe data should validate
    /// before calling this.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        assert!(!key.is_empty(), "artifact keys must be non-empty");
        self.artifacts.insert(key, value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.artifacts.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.artifacts.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.artifacts.keys().cloned().collect()
    }

    /// Deep-copy snapshot of the artifacts, as an object `Value`, ready to
    /// hand to the template engine. `serde_json::Value::clone` is already a
    /// structural (deep) copy, so no nested container is shared with the
    /// live context.
    pub fn dict(&self) -> Map<String, Value> {
        self.artifacts.clone().into_iter().collect()
    }

    pub fn config_view(&self) -> ConfigView {
        ConfigView(self.config.clone())
    }

    /// Resolve a dotted path (`a.b.c`) against the live artifacts, used by
    /// the `loop` step to locate its `items` source.
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let head = segments.next()?;
        let mut current = self.artifacts.get(head)?.clone();
        for segment in segments {
            current = current.get(segment)?.clone();
        }
        Some(current)
    }

    /// Deep, independent copy of both artifacts and config. Mutations on the
    /// clone are never visible on the original, and vice versa.
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clone_is_independent() {
        let mut ctx = Context::new();
        ctx.set("list", json!([1, 2, 3]));

        let mut clone = ctx.deep_clone();
        if let Some(Value::Array(arr)) = clone.get("list").cloned().as_mut() {
            arr.push(json!(4));
            clone.set("list", Value::Array(arr.clone()));
        }

        assert_eq!(ctx.get("list"), Some(&json!([1, 2, 3])));
        assert_eq!(clone.get("list"), Some(&json!([1, 2, 3, 4])));
    }

    #[test]
    fn dict_does_not_alias_artifacts() {
        let mut ctx = Context::new();
        ctx.set("nested", json!({"a": [1, 2]}));
        let mut snapshot = ctx.dict();
        if let Some(Value::Object(obj)) = snapshot.get_mut("nested") {
            obj.insert("b".to_string(), json!(true));
        }
        assert_eq!(ctx.get("nested"), Some(&json!({"a": [1, 2]})));
    }

    #[test]
    fn resolve_path_walks_nested_maps() {
        let mut ctx = Context::new();
        ctx.set("a", json!({"b": {"c": [1, 2, 3]}}));
        assert_eq!(ctx.resolve_path("a.b.c"), Some(json!([1, 2, 3])));
        assert_eq!(ctx.resolve_path("a.missing"), None);
    }
}
