//! # Actions
//!
//! Every `set_state` call is normalized into an [`Action`] describing what it
//! does. The action travels through middleware, decides which validators run,
//! and is recorded in history and handed to listeners.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use trellis_common::{delete_path, merged, object_paths, set_path, CommonResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Set,
    Update,
    Merge,
    Delete,
    Reset,
}

/// Description of one update, as seen by middleware and listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Action {
    pub fn new(kind: ActionType) -> Self {
        Self {
            kind,
            path: None,
            value: None,
        }
    }

    /// Paths whose validators must run for this action.
    ///
    /// Updater functions and resets can change anything, so they touch the
    /// root and every validator runs.
    pub fn touched_paths(&self) -> Vec<String> {
        match (self.kind, &self.path, &self.value) {
            (ActionType::Set, Some(path), _) | (ActionType::Delete, Some(path), _) => {
                vec![path.clone()]
            }
            (ActionType::Merge, _, Some(partial)) => object_paths(partial, ""),
            _ => vec![String::new()],
        }
    }
}

/// Pure `state -> state` updater
pub type Updater = Box<dyn FnOnce(&Value) -> Value + Send>;

/// The three input shapes of `set_state`, plus delete and reset
pub enum StateUpdate {
    /// Write `value` at a dot path
    Set { path: String, value: Value },
    /// Derive the next state from the current one
    Update(Updater),
    /// Recursively merge a partial object; arrays and primitives replace
    Merge(Value),
    Delete { path: String },
    /// Back to the given state, or to the initial state
    Reset(Option<Value>),
}

impl StateUpdate {
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        StateUpdate::Set {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn update(f: impl FnOnce(&Value) -> Value + Send + 'static) -> Self {
        StateUpdate::Update(Box::new(f))
    }

    pub fn merge(partial: Value) -> Self {
        StateUpdate::Merge(partial)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        StateUpdate::Delete { path: path.into() }
    }

    pub fn action(&self) -> Action {
        match self {
            StateUpdate::Set { path, value } => Action {
                kind: ActionType::Set,
                path: Some(path.clone()),
                value: Some(value.clone()),
            },
            StateUpdate::Update(_) => Action::new(ActionType::Update),
            StateUpdate::Merge(partial) => Action {
                kind: ActionType::Merge,
                path: None,
                value: Some(partial.clone()),
            },
            StateUpdate::Delete { path } => Action {
                kind: ActionType::Delete,
                path: Some(path.clone()),
                value: None,
            },
            StateUpdate::Reset(state) => Action {
                kind: ActionType::Reset,
                path: None,
                value: state.clone(),
            },
        }
    }

    /// Produce the candidate state from `prev` without touching it.
    pub fn apply(self, prev: &Value, initial: &Value) -> CommonResult<Value> {
        match self {
            StateUpdate::Set { path, value } => {
                let mut next = prev.clone();
                set_path(&mut next, &path, value)?;
                Ok(next)
            }
            StateUpdate::Update(f) => Ok(f(prev)),
            StateUpdate::Merge(partial) => Ok(merged(prev, &partial)),
            StateUpdate::Delete { path } => {
                let mut next = prev.clone();
                delete_path(&mut next, &path)?;
                Ok(next)
            }
            StateUpdate::Reset(state) => Ok(state.unwrap_or_else(|| initial.clone())),
        }
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateUpdate::Set { path, value } => f
                .debug_struct("Set")
                .field("path", path)
                .field("value", value)
                .finish(),
            StateUpdate::Update(_) => f.write_str("Update(<fn>)"),
            StateUpdate::Merge(partial) => f.debug_tuple("Merge").field(partial).finish(),
            StateUpdate::Delete { path } => f.debug_struct("Delete").field("path", path).finish(),
            StateUpdate::Reset(state) => f.debug_tuple("Reset").field(state).finish(),
        }
    }
}

/// Per-call switches for `set_state`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOptions {
    /// Commit without notifying listeners
    pub silent: bool,
    /// Commit without recording a history entry
    pub skip_history: bool,
    /// Attached to the history entry and to the change info
    pub metadata: Option<Value>,
}

impl SetOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Default::default()
        }
    }

    pub fn skip_history() -> Self {
        Self {
            skip_history: true,
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Which time-travel step produced a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Replay {
    Undo,
    Redo,
    Hydrate,
}

/// Third argument of every listener call
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeInfo {
    /// The (last) action behind this notification
    pub action: Action,
    pub replay: Option<Replay>,
    /// Commits folded into this notification; more than one inside a batch
    pub commits: usize,
    pub metadata: Option<Value>,
    pub timestamp: i64,
}

/// What a history entry remembers about the action that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ActionMeta {
    pub fn from_action(action: &Action, metadata: Option<Value>) -> Self {
        Self {
            kind: action.kind,
            path: action.path.clone(),
            metadata,
        }
    }
}
