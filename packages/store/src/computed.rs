//! Computed properties: values derived from the state and cached until one of
//! their dependency paths changes.

use crate::subscriptions::SubscriptionId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use trellis_common::get_path;

pub type ComputeFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

pub(crate) struct ComputedEntry {
    compute: ComputeFn,
    deps: Vec<String>,
    value: Value,
    /// State the cached value was last checked against
    source: Arc<Value>,
    pub watcher: SubscriptionId,
}

impl ComputedEntry {
    pub fn new(compute: ComputeFn, deps: Vec<String>, state: &Arc<Value>, watcher: SubscriptionId) -> Self {
        let value = compute(&**state);
        Self {
            compute,
            deps,
            value,
            source: Arc::clone(state),
            watcher,
        }
    }

    /// Value for `state`, recomputed only if a dependency differs from the
    /// state the cache was built against.
    pub fn value_for(&mut self, state: &Arc<Value>) -> &Value {
        if !Arc::ptr_eq(&self.source, state) {
            let changed = self
                .deps
                .iter()
                .any(|dep| get_path(&self.source, dep) != get_path(state, dep));
            if changed {
                self.value = (self.compute)(&**state);
            }
            self.source = Arc::clone(state);
        }
        &self.value
    }
}

#[derive(Default)]
pub(crate) struct ComputedRegistry {
    entries: HashMap<String, ComputedEntry>,
}

impl ComputedRegistry {
    /// Register `name`, returning the entry it replaced.
    pub fn insert(&mut self, name: String, entry: ComputedEntry) -> Option<ComputedEntry> {
        self.entries.insert(name, entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<ComputedEntry> {
        self.entries.remove(name)
    }

    pub fn value(&mut self, name: &str, state: &Arc<Value>) -> Option<Value> {
        self.entries
            .get_mut(name)
            .map(|entry| entry.value_for(state).clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}
