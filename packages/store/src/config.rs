use crate::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PERSIST_KEY: &str = "trellis-state";

/// Store configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Maximum number of history entries kept, the initial state included
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_true")]
    pub enable_history: bool,

    /// Write every committed state to the persistence collaborator
    #[serde(default)]
    pub persist: bool,

    #[serde(default = "default_persist_key")]
    pub persist_key: String,

    /// Log every pipeline step at `info` instead of `debug`
    #[serde(default)]
    pub debug: bool,
}

fn default_history_capacity() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_persist_key() -> String {
    DEFAULT_PERSIST_KEY.to_string()
}

impl StoreConfig {
    /// Load config from a JSON file, falling back to defaults if it is missing
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> StoreResult<Self> {
        let config: StoreConfig = serde_json::from_str(content)?;
        if config.history_capacity == 0 {
            return Err(StoreError::Config(
                "historyCapacity must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            enable_history: true,
            persist: false,
            persist_key: default_persist_key(),
            debug: false,
        }
    }
}
