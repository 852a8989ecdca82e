//! # Update Pipeline
//!
//! Every write goes through the same stages:
//! Apply → Middleware → Validate → No-op check → Commit → History → Notify → Persist
//!
//! The pipeline lock is held from the snapshot of `prev` to the end of commit,
//! so concurrent `set_state` calls commit one at a time in submission order,
//! even when a middleware or validator suspends.

use crate::action::{Action, ActionMeta, ChangeInfo, Replay, SetOptions, StateUpdate};
use crate::errors::{StoreResult, ValidationError};
use crate::persistence::PersistedSnapshot;
use crate::store::{lock, read, write, Store};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};
use trellis_common::{get_path_or_null, now_millis};

/// Open batches and the notification they are holding back
#[derive(Debug, Default)]
pub(crate) struct BatchState {
    depth: usize,
    pending: Option<PendingBatch>,
}

#[derive(Debug)]
struct PendingBatch {
    /// State before the first commit of the batch
    prev: Arc<Value>,
    /// Info of the last commit
    info: ChangeInfo,
    commits: usize,
}

/// Depth slot of one running `batch` call. Closing it, or dropping it
/// unclosed, gives the slot back.
struct BatchScope<'a> {
    store: &'a Store,
    open: bool,
}

impl<'a> BatchScope<'a> {
    fn open(store: &'a Store) -> Self {
        lock(&store.inner.batch).depth += 1;
        Self { store, open: true }
    }

    /// Leave the batch, handing back the held notification if this was the
    /// outermost one.
    fn close(&mut self) -> Option<PendingBatch> {
        if !self.open {
            return None;
        }
        self.open = false;
        let mut batch = lock(&self.store.inner.batch);
        batch.depth = batch.depth.saturating_sub(1);
        if batch.depth == 0 {
            batch.pending.take()
        } else {
            None
        }
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let Some(pending) = self.close() else {
            debug!("Abandoned inner batch closed");
            return;
        };
        warn!(commits = pending.commits, "Batch abandoned before it finished - flushing its notification");

        let store = self.store.clone();
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _turn = store.inner.pipeline.lock().await;
                    store.notify_batch(pending);
                });
            }
            Err(_) => store.notify_batch(pending),
        }
    }
}

impl Store {
    /// Run one update through the pipeline.
    ///
    /// Returns `Err` if the update is malformed (e.g. a path through a
    /// primitive) or a validator rejects it; the state is untouched then.
    /// An update that leaves the state deep-equal is a successful no-op.
    #[instrument(skip_all)]
    pub async fn set_state(&self, update: StateUpdate, options: SetOptions) -> StoreResult<()> {
        let _turn = self.inner.pipeline.lock().await;
        self.run_pipeline(update, &options).await
    }

    /// Pipeline body. The caller holds the pipeline lock.
    pub(crate) async fn run_pipeline(&self, update: StateUpdate, options: &SetOptions) -> StoreResult<()> {
        // 1. Apply against the committed state
        let action = update.action();
        self.log_step("apply", &action);
        let prev = self.snapshot();
        let candidate = update.apply(&prev, &self.inner.initial)?;

        // 2. Middleware
        let candidate = self.run_middleware(&action, &prev, candidate).await;

        // 3. Validation
        self.run_validators(&action, &candidate).await?;

        // 4. No-op
        if candidate == *prev {
            self.log_step("unchanged", &action);
            return Ok(());
        }

        // 5. Commit, record, notify, persist
        self.commit(Arc::new(candidate), prev, action, options, None);
        Ok(())
    }

    async fn run_middleware(&self, action: &Action, prev: &Arc<Value>, mut candidate: Value) -> Value {
        let chain = read(&self.inner.middleware).snapshot();
        for (label, middleware) in chain {
            let input = candidate.clone();
            match middleware.apply(action, prev, candidate).await {
                Ok(next) => candidate = next,
                Err(e) => {
                    warn!(middleware = %label, error = %e, "Middleware failed - discarding its transform");
                    lock(&self.inner.stats).middleware_errors += 1;
                    candidate = input;
                }
            }
        }
        candidate
    }

    async fn run_validators(&self, action: &Action, candidate: &Value) -> StoreResult<()> {
        let touched = action.touched_paths();
        let validators = read(&self.inner.validators).relevant(&touched);
        for (path, validator) in validators {
            let value = get_path_or_null(candidate, &path);
            if let Err(message) = validator.validate(&value, candidate).await {
                warn!(path = %path, message = %message, "Validation failed - update rejected");
                lock(&self.inner.stats).validation_failures += 1;
                return Err(ValidationError::new(path, message).into());
            }
        }
        Ok(())
    }

    /// Install `next` as the live state. Must run under the pipeline lock.
    ///
    /// Replays (undo, redo, hydrate) are never recorded in history. A commit
    /// that skips history overwrites the entry under the cursor instead, so
    /// the cursor keeps matching the live state.
    pub(crate) fn commit(
        &self,
        next: Arc<Value>,
        prev: Arc<Value>,
        action: Action,
        options: &SetOptions,
        replay: Option<Replay>,
    ) {
        *write(&self.inner.state) = Arc::clone(&next);
        lock(&self.inner.stats).updates += 1;
        self.log_step("commit", &action);

        if self.inner.config.enable_history && replay.is_none() {
            let mut history = lock(&self.inner.history);
            if options.skip_history {
                history.amend(Arc::clone(&next));
            } else {
                let meta = ActionMeta::from_action(&action, options.metadata.clone());
                history.record(Arc::clone(&next), meta);
            }
        }

        if !options.silent {
            let info = ChangeInfo {
                action,
                replay,
                commits: 1,
                metadata: options.metadata.clone(),
                timestamp: now_millis(),
            };
            if let Some(info) = self.defer_to_batch(&prev, info) {
                self.notify(&next, &prev, &info);
            }
        }

        if replay != Some(Replay::Hydrate) {
            self.persist(next);
        }
    }

    /// Fold a notification into the open batch. Hands `info` back if no
    /// batch is open.
    fn defer_to_batch(&self, prev: &Arc<Value>, info: ChangeInfo) -> Option<ChangeInfo> {
        let mut guard = lock(&self.inner.batch);
        let batch = &mut *guard;
        if batch.depth == 0 {
            return Some(info);
        }
        match batch.pending.as_mut() {
            Some(pending) => {
                pending.commits += 1;
                pending.info = info;
            }
            None => {
                batch.pending = Some(PendingBatch {
                    prev: Arc::clone(prev),
                    info,
                    commits: 1,
                });
            }
        }
        None
    }

    /// Run `f` with notifications held back; listeners then see one
    /// notification from the state before the batch to the state after it.
    ///
    /// Commits made by `f` stay in place if it returns `Err`. Nested batches
    /// notify once, when the outermost one ends. A batch future dropped
    /// before it finishes still closes and delivers its notification from a
    /// spawned task.
    pub async fn batch<F, Fut, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(Store) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut scope = BatchScope::open(self);
        let result = f(self.clone()).await;

        let _turn = self.inner.pipeline.lock().await;
        if let Some(pending) = scope.close() {
            self.notify_batch(pending);
        }
        result
    }

    /// Deliver the notification a closed batch held back. Must run under the
    /// pipeline lock.
    fn notify_batch(&self, pending: PendingBatch) {
        let current = self.snapshot();
        if *current == *pending.prev {
            debug!(commits = pending.commits, "Batch ended where it started - nothing to notify");
            return;
        }
        let info = ChangeInfo {
            commits: pending.commits,
            ..pending.info
        };
        self.notify(&current, &pending.prev, &info);
    }

    /// Schedule a write of `state`. Writes are serialized and a write that
    /// lost the race to a newer one is skipped.
    fn persist(&self, state: Arc<Value>) {
        if !self.inner.config.persist {
            return;
        }
        let Some(persistence) = self.inner.persistence.clone() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime - skipping persistence write");
            return;
        };

        let seq = self.inner.persist_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::downgrade(&self.inner);
        let handle = runtime.spawn(async move {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut written = inner.persist_written.lock().await;
            if seq <= *written || seq < inner.persist_seq.load(Ordering::SeqCst) {
                debug!(seq, "Skipping superseded persistence write");
                return;
            }

            let snapshot = PersistedSnapshot {
                state: (*state).clone(),
                timestamp: now_millis(),
            };
            let payload = match serde_json::to_string(&snapshot) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize state for persistence");
                    return;
                }
            };
            match persistence.save(payload).await {
                Ok(()) => *written = seq,
                Err(e) => warn!(
                    key = %inner.config.persist_key,
                    error = %e,
                    "Persistence write failed"
                ),
            }
        });

        let mut tasks = lock(&self.inner.pending_writes);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait for every scheduled persistence write to finish
    pub async fn flush_persistence(&self) {
        let tasks = std::mem::take(&mut *lock(&self.inner.pending_writes));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Persistence task failed");
            }
        }
    }

    pub(crate) fn log_step(&self, step: &str, action: &Action) {
        if self.inner.config.debug {
            info!(step, kind = ?action.kind, path = ?action.path, "Pipeline");
        } else {
            debug!(step, kind = ?action.kind, path = ?action.path, "Pipeline");
        }
    }
}
