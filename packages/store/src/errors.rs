//! Error types for the store
//!
//! Only [`StoreError`] reaches the caller of `set_state`. Middleware,
//! listener and persistence failures are values the store receives from its
//! collaborators, logs, and contains where they happen.

use thiserror::Error;
use trellis_common::CommonError;

/// A registered validator rejected a candidate state
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Validation failed at '{path}': {message}")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Returned by a middleware; the failing middleware's transform is dropped
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Middleware error: {0}")]
pub struct MiddlewareError(pub String);

impl From<&str> for MiddlewareError {
    fn from(s: &str) -> Self {
        MiddlewareError(s.to_string())
    }
}

impl From<String> for MiddlewareError {
    fn from(s: String) -> Self {
        MiddlewareError(s)
    }
}

/// Returned by a listener; other listeners still run
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Listener error: {0}")]
pub struct SubscriptionError(pub String);

impl From<&str> for SubscriptionError {
    fn from(s: &str) -> Self {
        SubscriptionError(s.to_string())
    }
}

impl From<String> for SubscriptionError {
    fn from(s: String) -> Self {
        SubscriptionError(s)
    }
}

/// Persistence collaborator failures
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persistence backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid update: {0}")]
    InvalidUpdate(#[from] CommonError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Import error: {0}")]
    Import(String),
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
