//! # Middleware
//!
//! A middleware sees the action, the committed state, and the candidate state
//! produced so far, and returns the candidate to pass on. Returning the input
//! unchanged is a veto of nothing; returning `prev` vetoes the update.
//!
//! The chain runs in descending priority, registration order breaking ties.

use crate::action::Action;
use crate::errors::MiddlewareError;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

pub type MiddlewareResult = Result<Value, MiddlewareError>;

/// One step of the update pipeline
pub trait Middleware: Send + Sync {
    fn apply<'a>(
        &'a self,
        action: &'a Action,
        prev: &'a Arc<Value>,
        next: Value,
    ) -> BoxFuture<'a, MiddlewareResult>;
}

/// Middleware from a synchronous function
pub struct FnMiddleware<F>(pub F);

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&Action, &Value, Value) -> MiddlewareResult + Send + Sync,
{
    fn apply<'a>(
        &'a self,
        action: &'a Action,
        prev: &'a Arc<Value>,
        next: Value,
    ) -> BoxFuture<'a, MiddlewareResult> {
        futures::future::ready((self.0)(action, &**prev, next)).boxed()
    }
}

/// Middleware from a function returning a future
pub struct AsyncFnMiddleware<F>(pub F);

impl<F, Fut> Middleware for AsyncFnMiddleware<F>
where
    F: Fn(Action, Arc<Value>, Value) -> Fut + Send + Sync,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    fn apply<'a>(
        &'a self,
        action: &'a Action,
        prev: &'a Arc<Value>,
        next: Value,
    ) -> BoxFuture<'a, MiddlewareResult> {
        (self.0)(action.clone(), Arc::clone(prev), next).boxed()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MiddlewareOptions {
    pub priority: i32,
    pub name: Option<String>,
}

impl MiddlewareOptions {
    pub fn priority(priority: i32) -> Self {
        Self {
            priority,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

pub(crate) struct MiddlewareEntry {
    pub id: u64,
    pub options: MiddlewareOptions,
    pub middleware: Arc<dyn Middleware>,
}

/// Registered middleware, kept in execution order
#[derive(Default)]
pub(crate) struct MiddlewareChain {
    entries: Vec<MiddlewareEntry>,
}

impl MiddlewareChain {
    pub fn insert(&mut self, entry: MiddlewareEntry) {
        self.entries.push(entry);
        // stable: equal priorities keep registration order
        self.entries
            .sort_by(|a, b| b.options.priority.cmp(&a.options.priority));
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Middleware to run, with a label for logging
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn Middleware>)> {
        self.entries
            .iter()
            .map(|entry| {
                let label = entry
                    .options
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("middleware#{}", entry.id));
                (label, Arc::clone(&entry.middleware))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
