//! Listener dispatch for committed changes.
//!
//! Listeners run synchronously, in priority order, on the task that
//! committed. A failing listener is logged and the rest still run. Debounced
//! listeners are delivered from a spawned timer task, and only the last
//! notification of a burst gets through.

use crate::action::ChangeInfo;
use crate::store::{lock, Store};
use crate::subscriptions::{Delivery, Subscription};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

impl Store {
    pub(crate) fn notify(&self, next: &Arc<Value>, prev: &Arc<Value>, info: &ChangeInfo) {
        let subscriptions = lock(&self.inner.subscriptions).snapshot();
        lock(&self.inner.stats).notifications += 1;
        debug!(listeners = subscriptions.len(), commits = info.commits, "Notifying");

        for subscription in subscriptions {
            // disposed by an earlier listener of this round
            if !subscription.is_active() {
                continue;
            }
            let Some(delivery) = subscription.delivery(next, prev) else {
                continue;
            };
            match subscription.options.debounce {
                Some(delay) => self.deliver_later(subscription, delivery, info.clone(), delay),
                None => self.deliver(&subscription, &delivery, info),
            }
        }
    }

    fn deliver(&self, subscription: &Subscription, delivery: &Delivery, info: &ChangeInfo) {
        if subscription.options.once && !lock(&self.inner.subscriptions).remove(subscription.id) {
            return;
        }
        if let Err(e) = subscription.call(delivery, info) {
            warn!(subscription = subscription.id.0, error = %e, "Listener failed");
            lock(&self.inner.stats).listener_errors += 1;
        }
    }

    fn deliver_later(
        &self,
        subscription: Arc<Subscription>,
        delivery: Delivery,
        info: ChangeInfo,
        delay: Duration,
    ) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(
                subscription = subscription.id.0,
                "No async runtime for debounce - delivering now"
            );
            self.deliver(&subscription, &delivery, &info);
            return;
        };

        let generation = subscription.next_generation();
        let inner = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !subscription.is_current(generation) || !subscription.is_active() {
                return;
            }
            if let Some(inner) = inner.upgrade() {
                Store { inner }.deliver(&subscription, &delivery, &info);
            }
        });
    }
}
