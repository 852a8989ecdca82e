//! Error types for the renderer

use crate::dom::NodeId;
use thiserror::Error;

/// Live document failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomError {
    #[error("Invalid character in element name '{0}'")]
    InvalidCharacter(String),

    #[error("Node {0:?} does not exist or was discarded")]
    NodeNotFound(NodeId),

    #[error("Node {node:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, node: NodeId },

    #[error("Node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("Node {0:?} has no character data")]
    NotCharacterData(NodeId),

    #[error("Hierarchy request error: {0}")]
    Hierarchy(String),
}

/// VNode construction failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VNodeError {
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Failure while creating or patching a subtree
///
/// Never escapes `create_element` or `patch`: the failing subtree is replaced
/// by an inert fallback node and the error is logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("Invalid vnode: {0}")]
    VNode(#[from] VNodeError),
}

pub type RenderResult<T> = Result<T, RenderError>;
