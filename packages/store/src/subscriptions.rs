//! # Subscriptions
//!
//! Listeners registered with `subscribe` (whole state), `watch` (one path),
//! or internally by `computed` (a set of dependency paths).
//!
//! Path and computed subscriptions compare the watched values of the old and
//! new state first and are skipped when nothing they watch changed.

use crate::action::ChangeInfo;
use crate::errors::SubscriptionError;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trellis_common::get_path;

/// `(new, prev, info)`; path watchers get the values at their path
pub type Listener =
    Arc<dyn Fn(&Value, &Value, &ChangeInfo) -> Result<(), SubscriptionError> + Send + Sync>;

/// Gate over the same `(new, prev)` pair the listener would receive
pub type Condition = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionKind {
    Global,
    Path(String),
    Computed { name: String, deps: Vec<String> },
}

#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Dispose after the first delivered call
    pub once: bool,
    pub condition: Option<Condition>,
    /// Deliver only after this long without another notification
    pub debounce: Option<Duration>,
    /// Higher runs first
    pub priority: i32,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self {
            once: true,
            ..Default::default()
        }
    }

    pub fn with_condition(
        mut self,
        condition: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("once", &self.once)
            .field("condition", &self.condition.is_some())
            .field("debounce", &self.debounce)
            .field("priority", &self.priority)
            .finish()
    }
}

pub struct Subscription {
    pub id: SubscriptionId,
    pub kind: SubscriptionKind,
    pub options: SubscribeOptions,
    listener: Listener,
    active: AtomicBool,
    debounce_generation: AtomicU64,
}

/// Values a subscription is handed for one notification
pub(crate) struct Delivery {
    pub new: Value,
    pub prev: Value,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        kind: SubscriptionKind,
        options: SubscribeOptions,
        listener: Listener,
    ) -> Self {
        Self {
            id,
            kind,
            options,
            listener,
            active: AtomicBool::new(true),
            debounce_generation: AtomicU64::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// What this subscription should receive for a `prev -> new` transition,
    /// or `None` if nothing it watches changed or its condition says no.
    pub(crate) fn delivery(&self, new: &Value, prev: &Value) -> Option<Delivery> {
        let delivery = match &self.kind {
            SubscriptionKind::Global => Delivery {
                new: new.clone(),
                prev: prev.clone(),
            },
            SubscriptionKind::Path(path) => {
                let after = get_path(new, path);
                let before = get_path(prev, path);
                if after == before {
                    return None;
                }
                Delivery {
                    new: after.cloned().unwrap_or(Value::Null),
                    prev: before.cloned().unwrap_or(Value::Null),
                }
            }
            SubscriptionKind::Computed { deps, .. } => {
                let changed = deps.iter().any(|dep| get_path(new, dep) != get_path(prev, dep));
                if !changed {
                    return None;
                }
                Delivery {
                    new: new.clone(),
                    prev: prev.clone(),
                }
            }
        };

        if let Some(condition) = &self.options.condition {
            if !condition(&delivery.new, &delivery.prev) {
                return None;
            }
        }
        Some(delivery)
    }

    pub(crate) fn call(&self, delivery: &Delivery, info: &ChangeInfo) -> Result<(), SubscriptionError> {
        (self.listener)(&delivery.new, &delivery.prev, info)
    }

    /// Start a new debounce window, returning its generation.
    pub(crate) fn next_generation(&self) -> u64 {
        self.debounce_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `generation` is still the latest window.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.debounce_generation.load(Ordering::SeqCst) == generation
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("options", &self.options)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Live subscriptions in notification order
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: Vec<Arc<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn insert(&mut self, subscription: Arc<Subscription>) {
        self.entries.push(subscription);
        self.entries
            .sort_by(|a, b| b.options.priority.cmp(&a.options.priority));
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        match self.entries.iter().position(|s| s.id == id) {
            Some(index) => {
                self.entries.remove(index).deactivate();
                true
            }
            None => false,
        }
    }

    /// Copy of the list, so listeners run without the registry locked
    pub fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
