//! # Persistence
//!
//! The store hands every committed state to a [`Persistence`] collaborator as
//! a serialized [`PersistedSnapshot`]. Writes happen on spawned tasks and
//! failures are only logged.

use crate::errors::PersistenceError;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// On-disk / in-storage format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub state: Value,
    /// Epoch milliseconds of the write
    pub timestamp: i64,
}

pub trait Persistence: Send + Sync {
    fn save(&self, payload: String) -> BoxFuture<'_, Result<(), PersistenceError>>;

    /// `Ok(None)` when nothing was saved yet
    fn load(&self) -> BoxFuture<'_, Result<Option<String>, PersistenceError>>;
}

/// Keeps the last saved payload in memory
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    payload: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a payload, as if saved by an earlier session
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Mutex::new(Some(payload.into())),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn payload(&self) -> Option<String> {
        self.payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> Option<PersistedSnapshot> {
        self.payload()
            .and_then(|payload| serde_json::from_str(&payload).ok())
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Persistence for MemoryPersistence {
    fn save(&self, payload: String) -> BoxFuture<'_, Result<(), PersistenceError>> {
        *self.payload.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload);
        self.saves.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok(())).boxed()
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<String>, PersistenceError>> {
        futures::future::ready(Ok(self.payload())).boxed()
    }
}

/// One JSON file per persist key
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", key)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for FilePersistence {
    fn save(&self, payload: String) -> BoxFuture<'_, Result<(), PersistenceError>> {
        async move {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            // write-then-rename: readers never see a partial file
            let tmp = self.path.with_extension("json.tmp");
            tokio::fs::write(&tmp, payload).await?;
            tokio::fs::rename(&tmp, &self.path).await?;
            Ok::<(), PersistenceError>(())
        }
        .boxed()
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<String>, PersistenceError>> {
        async move {
            let loaded: Result<Option<String>, PersistenceError> =
                match tokio::fs::read_to_string(&self.path).await {
                    Ok(content) => Ok(Some(content)),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e.into()),
                };
            loaded
        }
        .boxed()
    }
}
