//! # Worker pool for handler invocations.
//!
//! [`WorkerPool`] bounds how many handler invocations run at once. Workers
//! are tokio tasks; the bound is a semaphore slot held for the lifetime of
//! the invocation.
//!
//! ## Detach-and-replace
//! The timeout path must never starve: when the supervisor stops waiting for
//! a hung handler, it calls [`DetachHandle::detach`], which
//! - releases a **replacement** slot immediately (`add_permits(1)`), and
//! - marks the running task abandoned, so that when it eventually finishes
//!   it *forgets* its own slot instead of releasing it.
//!
//! Net effect: the pool temporarily grows by one slot per hung handler and
//! shrinks back when the handler completes — the abandoned execution is
//! never force-killed. A single `AtomicBool::swap` settles the race between
//! "handler completed" and "supervisor detached".
//!
//! ## Rules
//! - No limit (`None`) → unbounded: every invocation gets a worker
//!   immediately and `detach` is a pure counter bump.
//! - Slots are acquired **before** the delivery deadline clock starts.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Bounded (or unbounded) set of reusable execution slots.
pub(crate) struct WorkerPool {
    slots: Option<Arc<Semaphore>>,
    abandoned: Arc<AtomicUsize>,
}

/// One acquired execution slot, consumed by [`WorkerPool::spawn`].
pub(crate) struct WorkerSlot {
    permit: Option<OwnedSemaphorePermit>,
}

/// Handle for the timeout-handoff path of one spawned invocation.
pub(crate) struct DetachHandle {
    flag: Arc<AtomicBool>,
    slots: Option<Arc<Semaphore>>,
    abandoned: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Creates a pool with `limit` slots; `None` means unbounded.
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            slots: limit.map(|n| Arc::new(Semaphore::new(n))),
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a free execution slot.
    ///
    /// Returns immediately in unbounded mode.
    pub(crate) async fn acquire(&self) -> WorkerSlot {
        let permit = match &self.slots {
            Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
            None => None,
        };
        WorkerSlot { permit }
    }

    /// Runs the future on a tokio task holding the slot.
    ///
    /// The returned [`DetachHandle`] implements the abandon-and-replace
    /// contract; dropping it unused has no effect.
    pub(crate) fn spawn<F, T>(&self, slot: WorkerSlot, fut: F) -> (JoinHandle<T>, DetachHandle)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let flag = Arc::new(AtomicBool::new(false));
        let task_flag = Arc::clone(&flag);

        let handle = tokio::spawn(async move {
            let out = fut.await;
            if let Some(permit) = slot.permit {
                if task_flag.swap(true, Ordering::AcqRel) {
                    // Detached while running: a replacement slot was already
                    // handed out, so this one must not be returned as well.
                    permit.forget();
                }
            }
            out
        });

        let detach = DetachHandle {
            flag,
            slots: self.slots.clone(),
            abandoned: Arc::clone(&self.abandoned),
        };
        (handle, detach)
    }

    /// Number of invocations abandoned via [`DetachHandle::detach`] so far.
    pub(crate) fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Currently free slots (`None` in unbounded mode).
    #[cfg(test)]
    pub(crate) fn available(&self) -> Option<usize> {
        self.slots.as_ref().map(|s| s.available_permits())
    }
}

impl DetachHandle {
    /// Stops accounting the invocation against the pool bound.
    ///
    /// If the invocation already completed, this is a no-op.
    pub(crate) fn detach(self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            self.abandoned.fetch_add(1, Ordering::Relaxed);
            if let Some(sem) = &self.slots {
                sem.add_permits(1);
            }
        }
    }
}
