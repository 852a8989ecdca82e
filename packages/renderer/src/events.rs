//! # Event collaborator
//!
//! The renderer never registers listeners itself. Whenever an `on*` attribute
//! carrying an [`EventHandler`] is set, replaced or removed it calls into an
//! [`EventManager`], and it asks for a full cleanup when an element unmounts.

use crate::dom::NodeId;
use crate::vnode::{Event, EventHandler};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Owner of listener registration and delegation
pub trait EventManager: Send + Sync {
    /// Bind (or rebind) `handler` for `event` on `node`
    fn attach(&self, node: NodeId, event: &str, handler: &EventHandler);

    /// Drop the handler for `event` on `node`
    fn detach(&self, node: NodeId, event: &str);

    /// Drop every handler bound to `node`; called on unmount
    fn cleanup(&self, node: NodeId);
}

/// Event manager that ignores every request
#[derive(Debug, Default)]
pub struct NoopEvents;

impl EventManager for NoopEvents {
    fn attach(&self, _node: NodeId, _event: &str, _handler: &EventHandler) {}
    fn detach(&self, _node: NodeId, _event: &str) {}
    fn cleanup(&self, _node: NodeId) {}
}

/// Map an attribute name to the event it binds: `onClick` → `click`.
pub fn event_name(attr: &str) -> Option<String> {
    let rest = attr.strip_prefix("on")?;
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_lowercase())
    }
}

/// In-process event manager keeping one handler per node and event
#[derive(Debug, Default)]
pub struct ListenerTable {
    handlers: Mutex<HashMap<NodeId, HashMap<String, EventHandler>>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke the handler bound for `event` on `node`. Returns whether one ran.
    pub fn dispatch(&self, node: NodeId, event: &str, detail: Value) -> bool {
        let handler = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node)
            .and_then(|events| events.get(event))
            .cloned();

        match handler {
            Some(handler) => {
                handler.call(&Event {
                    name: event.to_string(),
                    target: node,
                    detail,
                });
                true
            }
            None => false,
        }
    }

    pub fn has_handler(&self, node: NodeId, event: &str) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node)
            .map(|events| events.contains_key(event))
            .unwrap_or(false)
    }

    /// Total number of bound handlers
    pub fn handler_count(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }
}

impl EventManager for ListenerTable {
    fn attach(&self, node: NodeId, event: &str, handler: &EventHandler) {
        debug!(?node, event, "Attaching handler");
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(node)
            .or_default()
            .insert(event.to_string(), handler.clone());
    }

    fn detach(&self, node: NodeId, event: &str) {
        debug!(?node, event, "Detaching handler");
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(events) = handlers.get_mut(&node) {
            events.remove(event);
            if events.is_empty() {
                handlers.remove(&node);
            }
        }
    }

    fn cleanup(&self, node: NodeId) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&node);
    }
}
