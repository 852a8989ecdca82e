//! # Render loop
//!
//! Shared handle that serializes patches against one [`Renderer`].
//!
//! A patch requested while another is running (a subscriber that re-renders
//! from inside a notification, an event manager that reacts to an attach) is
//! queued instead of run. The call that holds the renderer drains the queue
//! before it returns, so every request is applied exactly once and in
//! submission order.

use crate::dom::NodeId;
use crate::renderer::{PatchStats, Renderer};
use crate::vnode::VNode;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use tracing::debug;

/// One queued `patch` call
#[derive(Debug, Clone)]
pub struct PatchRequest {
    pub container: NodeId,
    pub old: Option<VNode>,
    pub new: Option<VNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    /// Ran on this call; stats cover every request drained along the way
    Applied(PatchStats),
    /// Queued behind a patch already in progress
    Deferred,
}

struct LoopInner {
    renderer: Mutex<Renderer>,
    queue: Mutex<VecDeque<PatchRequest>>,
}

#[derive(Clone)]
pub struct RenderLoop {
    inner: Arc<LoopInner>,
}

impl RenderLoop {
    pub fn new(renderer: Renderer) -> Self {
        Self {
            inner: Arc::new(LoopInner {
                renderer: Mutex::new(renderer),
                queue: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn request_patch(
        &self,
        container: NodeId,
        old: Option<VNode>,
        new: Option<VNode>,
    ) -> PatchOutcome {
        self.queue().push_back(PatchRequest {
            container,
            old,
            new,
        });

        let mut total = PatchStats::default();
        let mut ran = false;
        loop {
            let mut renderer = match self.inner.renderer.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => break,
            };
            ran = true;

            while let Some(request) = self.next_request() {
                total.absorb(renderer.patch(
                    request.container,
                    request.old.as_ref(),
                    request.new.as_ref(),
                ));
            }
            drop(renderer);

            // A request queued between the last drain and the unlock found
            // the renderer busy; pick it up here.
            if self.pending() == 0 {
                break;
            }
        }

        if ran {
            PatchOutcome::Applied(total)
        } else {
            debug!(?container, "Patch in progress - request deferred");
            PatchOutcome::Deferred
        }
    }

    /// Run `f` with exclusive access to the renderer.
    pub fn with_renderer<R>(&self, f: impl FnOnce(&mut Renderer) -> R) -> R {
        let mut renderer = self
            .inner
            .renderer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut renderer)
    }

    /// Requests waiting for the renderer
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    fn next_request(&self) -> Option<PatchRequest> {
        self.queue().pop_front()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<PatchRequest>> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
