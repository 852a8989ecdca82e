//! # History
//!
//! Bounded log of committed states for undo/redo.
//!
//! ## Design
//!
//! - Entry 0 is the oldest state still reachable; it starts as the initial state
//! - The cursor points at the entry matching the live state
//! - Undo/redo move the cursor and hand back the snapshot to replay
//! - Recording a new state drops everything after the cursor (the redo branch)
//! - Past capacity, the oldest entries are evicted first
//!
//! Snapshots are shared `Arc`s, so recording costs no copy of the state tree.

use crate::action::{ActionMeta, ActionType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use trellis_common::now_millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub state: Arc<Value>,
    pub timestamp: i64,
    pub action: ActionMeta,
}

#[derive(Debug)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    capacity: usize,
}

impl History {
    pub fn new(initial: Arc<Value>, capacity: usize) -> Self {
        let mut history = Self {
            entries: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
        };
        history.clear(initial);
        history
    }

    /// Record the state just committed.
    pub fn record(&mut self, state: Arc<Value>, action: ActionMeta) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(HistoryEntry {
            state,
            timestamp: now_millis(),
            action,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Overwrite the entry under the cursor with a state committed outside
    /// the log. Undo from there steps to the entry before it.
    pub fn amend(&mut self, state: Arc<Value>) {
        if let Some(entry) = self.entries.get_mut(self.cursor) {
            entry.state = state;
            entry.timestamp = now_millis();
        }
    }

    /// Step back, returning the state to replay. `None` at the oldest entry.
    pub fn undo(&mut self) -> Option<Arc<Value>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(Arc::clone(&self.entries[self.cursor].state))
    }

    /// Step forward, returning the state to replay. `None` at the newest entry.
    pub fn redo(&mut self) -> Option<Arc<Value>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(Arc::clone(&self.entries[self.cursor].state))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Forget everything; `current` becomes the only entry.
    pub fn clear(&mut self, current: Arc<Value>) {
        self.entries.clear();
        self.entries.push_back(HistoryEntry {
            state: current,
            timestamp: now_millis(),
            action: ActionMeta {
                kind: ActionType::Reset,
                path: None,
                metadata: None,
            },
        });
        self.cursor = 0;
    }

    /// Replace the log, e.g. from an import. Keeps at most `capacity` of the
    /// newest entries and clamps the cursor into range.
    pub fn restore(&mut self, entries: Vec<HistoryEntry>, cursor: usize) {
        if entries.is_empty() {
            return;
        }
        let excess = entries.len().saturating_sub(self.capacity);
        self.entries = entries.into_iter().skip(excess).collect();
        self.cursor = cursor
            .saturating_sub(excess)
            .min(self.entries.len() - 1);
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
