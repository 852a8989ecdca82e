//! # Store
//!
//! [`Store`] is a cheap, cloneable handle to one state tree. Writes go through
//! the update pipeline (`pipeline.rs`); this module holds the shared state,
//! reads, and the registration APIs for listeners, middleware, validators and
//! computed values.
//!
//! ## Locking
//!
//! - `pipeline` (async, fair) is held for a whole update, so updates commit
//!   in the order they were submitted even when middleware suspends
//! - every other lock is a short `std::sync` critical section and is never
//!   held across an `.await` or while user callbacks run

use crate::action::{Action, ChangeInfo, StateUpdate};
use crate::computed::{ComputedEntry, ComputedRegistry};
use crate::config::StoreConfig;
use crate::errors::{StoreResult, SubscriptionError};
use crate::history::History;
use crate::middleware::{
    AsyncFnMiddleware, FnMiddleware, Middleware, MiddlewareChain, MiddlewareEntry,
    MiddlewareOptions, MiddlewareResult,
};
use crate::persistence::Persistence;
use crate::pipeline::BatchState;
use crate::subscriptions::{
    Listener, SubscribeOptions, Subscription, SubscriptionId, SubscriptionKind,
    SubscriptionRegistry,
};
use crate::validators::{AsyncFnValidator, FnValidator, Validator, ValidatorRegistry, ValidatorResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use trellis_common::get_path_or_null;

/// Counters over the lifetime of a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreStats {
    /// Committed updates, replays included
    pub updates: u64,
    /// Notification cycles (one per unbatched commit, one per batch)
    pub notifications: u64,
    pub validation_failures: u64,
    pub middleware_errors: u64,
    pub listener_errors: u64,
    pub undos: u64,
    pub redos: u64,
}

pub(crate) struct StoreInner {
    pub config: StoreConfig,
    pub initial: Arc<Value>,
    pub state: RwLock<Arc<Value>>,
    pub pipeline: tokio::sync::Mutex<()>,
    pub middleware: RwLock<MiddlewareChain>,
    pub validators: RwLock<ValidatorRegistry>,
    pub subscriptions: Mutex<SubscriptionRegistry>,
    pub computed: Mutex<ComputedRegistry>,
    pub history: Mutex<History>,
    pub batch: Mutex<BatchState>,
    pub persistence: Option<Arc<dyn Persistence>>,
    /// Sequence number of the latest scheduled write
    pub persist_seq: AtomicU64,
    /// Sequence number of the latest completed write; also serializes writes
    pub persist_written: tokio::sync::Mutex<u64>,
    pub pending_writes: Mutex<Vec<JoinHandle<()>>>,
    pub stats: Mutex<StoreStats>,
    next_id: AtomicU64,
}

impl StoreInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub struct StoreBuilder {
    initial: Value,
    config: StoreConfig,
    persistence: Option<Arc<dyn Persistence>>,
}

impl StoreBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn build(self) -> Store {
        if self.config.persist && self.persistence.is_none() {
            warn!(
                key = %self.config.persist_key,
                "Persistence enabled without a backend - writes are skipped"
            );
        }

        let initial = Arc::new(self.initial);
        let history = History::new(Arc::clone(&initial), self.config.history_capacity);
        Store {
            inner: Arc::new(StoreInner {
                state: RwLock::new(Arc::clone(&initial)),
                initial,
                config: self.config,
                pipeline: tokio::sync::Mutex::new(()),
                middleware: RwLock::new(MiddlewareChain::default()),
                validators: RwLock::new(ValidatorRegistry::default()),
                subscriptions: Mutex::new(SubscriptionRegistry::default()),
                computed: Mutex::new(ComputedRegistry::default()),
                history: Mutex::new(history),
                batch: Mutex::new(BatchState::default()),
                persistence: self.persistence,
                persist_seq: AtomicU64::new(0),
                persist_written: tokio::sync::Mutex::new(0),
                pending_writes: Mutex::new(Vec::new()),
                stats: Mutex::new(StoreStats::default()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

/// Handle to a state tree and its pipeline
#[derive(Clone, Debug)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    pub fn new(initial: Value) -> Self {
        Self::builder(initial).build()
    }

    pub fn with_config(initial: Value, config: StoreConfig) -> Self {
        Self::builder(initial).config(config).build()
    }

    pub fn builder(initial: Value) -> StoreBuilder {
        StoreBuilder {
            initial,
            config: StoreConfig::default(),
            persistence: None,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Deep copy of the whole state
    pub fn get_state(&self) -> Value {
        (*self.snapshot()).clone()
    }

    /// Deep copy of the value at `path`; `null` if it is missing
    pub fn get_state_at(&self, path: &str) -> Value {
        get_path_or_null(&self.snapshot(), path)
    }

    /// The live state tree. Shared and immutable: commits swap in a new tree.
    pub fn snapshot(&self) -> Arc<Value> {
        Arc::clone(&read(&self.inner.state))
    }

    pub fn stats(&self) -> StoreStats {
        lock(&self.inner.stats).clone()
    }

    // ------------------------------------------------------------------
    // Write shorthands
    // ------------------------------------------------------------------

    pub async fn set(&self, path: &str, value: impl Into<Value>) -> StoreResult<()> {
        self.set_state(StateUpdate::set(path, value), Default::default())
            .await
    }

    pub async fn update(
        &self,
        f: impl FnOnce(&Value) -> Value + Send + 'static,
    ) -> StoreResult<()> {
        self.set_state(StateUpdate::update(f), Default::default())
            .await
    }

    pub async fn merge(&self, partial: Value) -> StoreResult<()> {
        self.set_state(StateUpdate::merge(partial), Default::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> StoreResult<()> {
        self.set_state(StateUpdate::delete(path), Default::default())
            .await
    }

    /// Back to the initial state
    pub async fn reset(&self) -> StoreResult<()> {
        self.set_state(StateUpdate::Reset(None), Default::default())
            .await
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Listen to every change of the state
    pub fn subscribe<F>(&self, listener: F, options: SubscribeOptions) -> Disposer
    where
        F: Fn(&Value, &Value, &ChangeInfo) -> Result<(), SubscriptionError> + Send + Sync + 'static,
    {
        let id = self.register(SubscriptionKind::Global, options, Arc::new(listener));
        self.disposer(DisposeTarget::Subscription(id))
    }

    /// Listen to changes of the value at `path`
    pub fn watch<F>(&self, path: &str, listener: F, options: SubscribeOptions) -> Disposer
    where
        F: Fn(&Value, &Value, &ChangeInfo) -> Result<(), SubscriptionError> + Send + Sync + 'static,
    {
        let kind = SubscriptionKind::Path(path.to_string());
        let id = self.register(kind, options, Arc::new(listener));
        self.disposer(DisposeTarget::Subscription(id))
    }

    pub(crate) fn register(
        &self,
        kind: SubscriptionKind,
        options: SubscribeOptions,
        listener: Listener,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id());
        debug!(id = id.0, ?kind, ?options, "Registering subscription");
        let subscription = Arc::new(Subscription::new(id, kind, options, listener));
        lock(&self.inner.subscriptions).insert(subscription);
        id
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.inner.subscriptions).len()
    }

    // ------------------------------------------------------------------
    // Computed values
    // ------------------------------------------------------------------

    /// Derive `name` from the state, recomputing when a path in `deps`
    /// changes. An empty `deps` depends on the whole state.
    pub fn computed<F>(&self, name: &str, compute: F, deps: Vec<String>) -> Disposer
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let deps = if deps.is_empty() {
            vec![String::new()]
        } else {
            deps
        };

        let weak = Arc::downgrade(&self.inner);
        let refresh_name = name.to_string();
        let refresh = move |_: &Value, _: &Value, _: &ChangeInfo| {
            if let Some(inner) = weak.upgrade() {
                let state = Arc::clone(&read(&inner.state));
                lock(&inner.computed).value(&refresh_name, &state);
            }
            Ok::<(), SubscriptionError>(())
        };
        let kind = SubscriptionKind::Computed {
            name: name.to_string(),
            deps: deps.clone(),
        };
        // refresh before any user listener reads the value
        let options = SubscribeOptions::default().with_priority(i32::MAX);
        let watcher = self.register(kind, options, Arc::new(refresh));

        let entry = ComputedEntry::new(Arc::new(compute), deps, &self.snapshot(), watcher);
        let replaced = lock(&self.inner.computed).insert(name.to_string(), entry);
        if let Some(replaced) = replaced {
            lock(&self.inner.subscriptions).remove(replaced.watcher);
        }
        self.disposer(DisposeTarget::Computed(name.to_string()))
    }

    pub fn computed_names(&self) -> Vec<String> {
        lock(&self.inner.computed).names()
    }

    /// Current value of computed property `name`
    pub fn computed_value(&self, name: &str) -> Option<Value> {
        let state = self.snapshot();
        lock(&self.inner.computed).value(name, &state)
    }

    // ------------------------------------------------------------------
    // Middleware and validators
    // ------------------------------------------------------------------

    pub fn use_middleware<F>(&self, middleware: F, options: MiddlewareOptions) -> Disposer
    where
        F: Fn(&Action, &Value, Value) -> MiddlewareResult + Send + Sync + 'static,
    {
        self.add_middleware(Arc::new(FnMiddleware(middleware)), options)
    }

    pub fn use_async_middleware<F, Fut>(&self, middleware: F, options: MiddlewareOptions) -> Disposer
    where
        F: Fn(Action, Arc<Value>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        self.add_middleware(Arc::new(AsyncFnMiddleware(middleware)), options)
    }

    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>, options: MiddlewareOptions) -> Disposer {
        let id = self.inner.next_id();
        debug!(id, priority = options.priority, name = ?options.name, "Registering middleware");
        write(&self.inner.middleware).insert(MiddlewareEntry {
            id,
            options,
            middleware,
        });
        self.disposer(DisposeTarget::Middleware(id))
    }

    /// Validate the value at `path` whenever an update touches it
    pub fn add_validator<F>(&self, path: &str, validator: F) -> Disposer
    where
        F: Fn(&Value, &Value) -> ValidatorResult + Send + Sync + 'static,
    {
        self.add_validator_impl(path, Arc::new(FnValidator(validator)))
    }

    pub fn add_async_validator<F, Fut>(&self, path: &str, validator: F) -> Disposer
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ValidatorResult> + Send + 'static,
    {
        self.add_validator_impl(path, Arc::new(AsyncFnValidator(validator)))
    }

    pub fn add_validator_impl(&self, path: &str, validator: Arc<dyn Validator>) -> Disposer {
        let id = self.inner.next_id();
        debug!(id, path, "Registering validator");
        write(&self.inner.validators).insert(id, path.to_string(), validator);
        self.disposer(DisposeTarget::Validator(id))
    }

    pub fn middleware_count(&self) -> usize {
        read(&self.inner.middleware).len()
    }

    pub fn validator_count(&self) -> usize {
        read(&self.inner.validators).len()
    }

    fn disposer(&self, target: DisposeTarget) -> Disposer {
        Disposer {
            inner: Arc::downgrade(&self.inner),
            target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DisposeTarget {
    Subscription(SubscriptionId),
    Middleware(u64),
    Validator(u64),
    Computed(String),
}

/// Removes one registration from its store
///
/// Dropping a disposer leaves the registration in place.
#[must_use = "the registration stays active until `dispose` is called"]
#[derive(Debug)]
pub struct Disposer {
    inner: Weak<StoreInner>,
    target: DisposeTarget,
}

impl Disposer {
    /// Remove the registration. Returns `false` if it was already gone.
    pub fn dispose(self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        match self.target {
            DisposeTarget::Subscription(id) => lock(&inner.subscriptions).remove(id),
            DisposeTarget::Middleware(id) => write(&inner.middleware).remove(id),
            DisposeTarget::Validator(id) => write(&inner.validators).remove(id),
            DisposeTarget::Computed(name) => {
                let removed = lock(&inner.computed).remove(&name);
                match removed {
                    Some(entry) => {
                        lock(&inner.subscriptions).remove(entry.watcher);
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

impl std::fmt::Debug for StoreInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreInner")
            .field("config", &self.config)
            .field("state", &read(&self.state))
            .finish_non_exhaustive()
    }
}
