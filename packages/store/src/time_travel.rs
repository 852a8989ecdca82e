//! # Time Travel
//!
//! Undo/redo over the history log, export/import of the whole store, and
//! hydration from the persistence collaborator.
//!
//! Replays bypass middleware and validation: the states they install were
//! already accepted once. Listeners are notified as for any other commit,
//! with [`ChangeInfo::replay`](crate::ChangeInfo) set.

use crate::action::{Action, ActionType, Replay, SetOptions, StateUpdate};
use crate::errors::{StoreError, StoreResult};
use crate::history::HistoryEntry;
use crate::persistence::PersistedSnapshot;
use crate::store::{lock, Store, StoreStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trellis_common::now_millis;

/// Everything needed to rebuild a store elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreExport {
    pub state: Value,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub history_cursor: usize,
    #[serde(default)]
    pub stats: StoreStats,
    pub timestamp: i64,
}

impl Store {
    /// Step back one history entry. `Ok(false)` if there is nothing to undo.
    pub async fn undo(&self) -> StoreResult<bool> {
        self.replay(Replay::Undo).await
    }

    /// Step forward one history entry. `Ok(false)` if there is nothing to redo.
    pub async fn redo(&self) -> StoreResult<bool> {
        self.replay(Replay::Redo).await
    }

    async fn replay(&self, direction: Replay) -> StoreResult<bool> {
        let _turn = self.inner.pipeline.lock().await;
        if !self.inner.config.enable_history {
            warn!(?direction, "History is disabled");
            return Ok(false);
        }

        let target = {
            let mut history = lock(&self.inner.history);
            match direction {
                Replay::Redo => history.redo(),
                _ => history.undo(),
            }
        };
        let Some(target) = target else {
            warn!(?direction, "Nothing to replay");
            return Ok(false);
        };

        {
            let mut stats = lock(&self.inner.stats);
            match direction {
                Replay::Redo => stats.redos += 1,
                _ => stats.undos += 1,
            }
        }

        let prev = self.snapshot();
        self.commit(
            target,
            prev,
            Action::new(ActionType::Reset),
            &SetOptions::default(),
            Some(direction),
        );
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.inner.config.enable_history && lock(&self.inner.history).can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.inner.config.enable_history && lock(&self.inner.history).can_redo()
    }

    /// History entries, oldest first, and the index of the live one
    pub fn history(&self) -> (Vec<HistoryEntry>, usize) {
        let history = lock(&self.inner.history);
        (history.entries(), history.cursor())
    }

    /// Forget all history; the live state becomes the only entry
    pub fn clear_history(&self) {
        let current = self.snapshot();
        lock(&self.inner.history).clear(current);
        debug!("History cleared");
    }

    pub fn export(&self) -> StoreExport {
        let (history, history_cursor) = self.history();
        StoreExport {
            state: self.get_state(),
            history,
            history_cursor,
            stats: self.stats(),
            timestamp: now_millis(),
        }
    }

    pub fn export_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(&self.export())?)
    }

    /// Install an exported state and its history.
    ///
    /// The state goes through the pipeline, so validators can reject it.
    /// An export without history leaves the imported state as the only entry.
    pub async fn import(&self, data: StoreExport) -> StoreResult<()> {
        let StoreExport {
            state,
            history,
            history_cursor,
            ..
        } = data;
        if state.is_null() {
            return Err(StoreError::Import("export has no state".to_string()));
        }

        let _turn = self.inner.pipeline.lock().await;
        self.run_pipeline(StateUpdate::Reset(Some(state)), &SetOptions::skip_history())
            .await?;

        let current = self.snapshot();
        let mut log = lock(&self.inner.history);
        if history.is_empty() {
            log.clear(current);
        } else {
            log.restore(history, history_cursor);
        }
        info!(entries = log.len(), cursor = log.cursor(), "Imported store");
        Ok(())
    }

    pub async fn import_json(&self, payload: &str) -> StoreResult<()> {
        let data: StoreExport =
            serde_json::from_str(payload).map_err(|e| StoreError::Import(e.to_string()))?;
        self.import(data).await
    }

    /// Replace the state with the last persisted snapshot.
    ///
    /// Returns `false` when there is no collaborator, nothing saved, or the
    /// saved payload is unreadable. History restarts at the hydrated state.
    pub async fn hydrate(&self) -> bool {
        let Some(persistence) = self.inner.persistence.clone() else {
            return false;
        };
        let payload = match persistence.load().await {
            Ok(Some(payload)) => payload,
            Ok(None) => return false,
            Err(e) => {
                warn!(key = %self.inner.config.persist_key, error = %e, "Failed to load persisted state");
                return false;
            }
        };
        let snapshot: PersistedSnapshot = match serde_json::from_str(&payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(key = %self.inner.config.persist_key, error = %e, "Persisted state is unreadable");
                return false;
            }
        };

        let _turn = self.inner.pipeline.lock().await;
        let prev = self.snapshot();
        let next = Arc::new(snapshot.state);
        lock(&self.inner.history).clear(Arc::clone(&next));
        self.commit(
            next,
            prev,
            Action::new(ActionType::Reset),
            &SetOptions::default(),
            Some(Replay::Hydrate),
        );
        info!(saved_at = snapshot.timestamp, "Hydrated state");
        true
    }
}
