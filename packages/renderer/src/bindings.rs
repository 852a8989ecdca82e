//! # Live node bindings
//!
//! Non-owning association from a live node to the key and ref of the VNode
//! that produced it. Entries are keyed by [`NodeId`], which is only an
//! identity token: the document owns the node, and a discarded node leaves a
//! stale id behind rather than being kept alive by this table.

use crate::dom::NodeId;
use crate::vnode::NodeRef;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub key: Option<String>,
    pub node_ref: Option<NodeRef>,
}

#[derive(Debug, Default)]
pub struct BindingTable {
    entries: HashMap<NodeId, Binding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the binding for `node` and fill its ref.
    pub fn bind(&mut self, node: NodeId, key: Option<String>, node_ref: Option<NodeRef>) {
        if key.is_none() && node_ref.is_none() {
            self.entries.remove(&node);
            return;
        }
        if let Some(node_ref) = &node_ref {
            node_ref.set(Some(node));
        }
        self.entries.insert(node, Binding { key, node_ref });
    }

    /// Forget `node`, clearing its ref if it still points at it.
    pub fn release(&mut self, node: NodeId) -> Option<Binding> {
        let binding = self.entries.remove(&node)?;
        if let Some(node_ref) = &binding.node_ref {
            if node_ref.get() == Some(node) {
                node_ref.set(None);
            }
        }
        Some(binding)
    }

    pub fn get(&self, node: NodeId) -> Option<&Binding> {
        self.entries.get(&node)
    }

    pub fn key_of(&self, node: NodeId) -> Option<&str> {
        self.entries.get(&node).and_then(|b| b.key.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
