//! # Validators
//!
//! Path-scoped checks run against the candidate state before commit. A
//! validator registered at `user.age` runs for any action touching a path
//! that overlaps it (`user`, `user.age`, `user.age.x`, or the root) and
//! receives the candidate value at its own path.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use trellis_common::paths_overlap;

/// `Err(message)` rejects the update
pub type ValidatorResult = Result<(), String>;

pub trait Validator: Send + Sync {
    fn validate<'a>(&'a self, value: &'a Value, state: &'a Value) -> BoxFuture<'a, ValidatorResult>;
}

/// Validator from a synchronous function of `(value_at_path, candidate_state)`
pub struct FnValidator<F>(pub F);

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value, &Value) -> ValidatorResult + Send + Sync,
{
    fn validate<'a>(&'a self, value: &'a Value, state: &'a Value) -> BoxFuture<'a, ValidatorResult> {
        futures::future::ready((self.0)(value, state)).boxed()
    }
}

/// Validator from a function returning a future; receives owned copies
pub struct AsyncFnValidator<F>(pub F);

impl<F, Fut> Validator for AsyncFnValidator<F>
where
    F: Fn(Value, Value) -> Fut + Send + Sync,
    Fut: Future<Output = ValidatorResult> + Send + 'static,
{
    fn validate<'a>(&'a self, value: &'a Value, state: &'a Value) -> BoxFuture<'a, ValidatorResult> {
        (self.0)(value.clone(), state.clone()).boxed()
    }
}

struct ValidatorEntry {
    id: u64,
    path: String,
    validator: Arc<dyn Validator>,
}

#[derive(Default)]
pub(crate) struct ValidatorRegistry {
    entries: Vec<ValidatorEntry>,
}

impl ValidatorRegistry {
    pub fn insert(&mut self, id: u64, path: String, validator: Arc<dyn Validator>) {
        self.entries.push(ValidatorEntry {
            id,
            path,
            validator,
        });
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Validators that must run for an action touching `touched`, in
    /// registration order.
    pub fn relevant(&self, touched: &[String]) -> Vec<(String, Arc<dyn Validator>)> {
        self.entries
            .iter()
            .filter(|entry| touched.iter().any(|path| paths_overlap(&entry.path, path)))
            .map(|entry| (entry.path.clone(), Arc::clone(&entry.validator)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
