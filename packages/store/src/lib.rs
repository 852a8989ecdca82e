//! # Trellis Store
//!
//! A single observable state tree with a serialized update pipeline.
//!
//! ## Architecture
//!
//! ```text
//! set_state(update) → Apply → Middleware → Validate → Commit
//!                                                        ↓
//!                         History ← Notify (or batch) ← Persist
//! ```
//!
//! - Updates are serialized: each one runs against the result of the previous
//! - Listeners see `(new, prev, info)`; path watchers see the values at their path
//! - A commit swaps in a new immutable `Arc<Value>`; old snapshots stay valid
//! - Middleware and listener failures are contained and logged; validation
//!   failures and malformed updates are returned to the caller
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> trellis_store::StoreResult<()> {
//! use serde_json::json;
//! use trellis_store::{Store, SubscribeOptions};
//!
//! let store = Store::new(json!({"count": 0}));
//! let _sub = store.watch("count", |new, prev, _| {
//!     println!("count {} -> {}", prev, new);
//!     Ok(())
//! }, SubscribeOptions::default());
//!
//! store.set("count", 1).await?;
//! store.undo().await?;
//! # Ok(())
//! # }
//! ```

mod action;
mod computed;
mod config;
mod errors;
mod history;
mod middleware;
mod notify;
mod persistence;
mod pipeline;
mod store;
mod subscriptions;
mod time_travel;
mod validators;

pub use action::{Action, ActionMeta, ActionType, ChangeInfo, Replay, SetOptions, StateUpdate, Updater};
pub use computed::ComputeFn;
pub use config::{StoreConfig, DEFAULT_PERSIST_KEY};
pub use errors::{
    MiddlewareError, PersistenceError, StoreError, StoreResult, SubscriptionError,
    ValidationError,
};
pub use history::{History, HistoryEntry};
pub use middleware::{AsyncFnMiddleware, FnMiddleware, Middleware, MiddlewareOptions, MiddlewareResult};
pub use persistence::{FilePersistence, MemoryPersistence, PersistedSnapshot, Persistence};
pub use store::{Disposer, Store, StoreBuilder, StoreStats};
pub use subscriptions::{
    Condition, Listener, SubscribeOptions, Subscription, SubscriptionId, SubscriptionKind,
};
pub use time_travel::StoreExport;
pub use validators::{AsyncFnValidator, FnValidator, Validator, ValidatorResult};
