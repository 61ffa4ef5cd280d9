//! # Timeout supervisor: one handler invocation, raced against a deadline.
//!
//! [`DeliverySupervisor::invoke`] runs a single `(event, registration)`
//! dispatch on a pooled worker and classifies the result as a
//! [`DeliveryOutcome`].
//!
//! ## Outcome flow
//! ```text
//! handler returns Ok      → Completed
//! handler returns Err     → Failed (logged, swallowed — no blacklist)
//! handler panics          → Failed (caught, logged)
//! deadline elapses first  → TimedOut
//!                            ├─ stop awaiting the worker (never force-killed)
//!                            └─ DetachHandle::detach() → replacement slot
//! ```
//!
//! Distinguishing `Failed` from `TimedOut` is the point of this component:
//! a handler error is the handler's own business; *hanging* is a
//! shared-resource hazard the bus defends against. The blacklisting decision
//! itself belongs to the coordinator, not to this layer.
//!
//! ## Rules
//! - `deadline = None` disables the race entirely (trusted subscribers,
//!   test environments); the invocation is awaited to completion.
//! - The worker slot is acquired **before** the deadline clock starts, so a
//!   busy pool does not eat into the handler's time budget.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time;
use tracing::warn;

use crate::events::Event;
use crate::handlers::Registration;

use super::pool::WorkerPool;

/// Result of one supervised handler invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DeliveryOutcome {
    /// Handler returned normally.
    Completed,
    /// Handler returned an error or panicked; carries the message.
    Failed(String),
    /// Deadline elapsed; the worker was detached and keeps running unawaited.
    TimedOut,
}

/// Wraps handler invocations with pool slots and the delivery deadline.
pub(crate) struct DeliverySupervisor {
    pool: Arc<WorkerPool>,
    deadline: Option<Duration>,
}

impl DeliverySupervisor {
    pub(crate) fn new(pool: Arc<WorkerPool>, deadline: Option<Duration>) -> Self {
        Self { pool, deadline }
    }

    /// Invokes `registration`'s handler for `event` and classifies the result.
    ///
    /// On timeout the invoking path stops waiting, obtains a replacement
    /// worker for the pool, and reports [`DeliveryOutcome::TimedOut`]; the
    /// abandoned execution runs to natural completion (or forever).
    pub(crate) async fn invoke(
        &self,
        registration: &Arc<Registration>,
        event: Event,
    ) -> DeliveryOutcome {
        let slot = self.pool.acquire().await;

        let handler = Arc::clone(registration.handler());
        let call = async move {
            let fut = async { handler.on_event(&event).await };
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => DeliveryOutcome::Completed,
                Ok(Err(err)) => DeliveryOutcome::Failed(err.to_string()),
                Err(panic) => DeliveryOutcome::Failed(panic_message(&*panic)),
            }
        };
        let (mut join, detach) = self.pool.spawn(slot, call);

        let joined = match self.deadline {
            None => join.await,
            Some(deadline) => match time::timeout(deadline, &mut join).await {
                Ok(joined) => joined,
                Err(_elapsed) => {
                    detach.detach();
                    return DeliveryOutcome::TimedOut;
                }
            },
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            // The worker task itself failed to join; report it like a
            // handler failure (panics are already caught inside the task).
            Err(join_err) => DeliveryOutcome::Failed(format!("worker failed: {join_err}")),
        };

        if let DeliveryOutcome::Failed(reason) = &outcome {
            warn!(
                handler = registration.name(),
                id = %registration.id(),
                %reason,
                "handler failed; error isolated from publisher"
            );
        }
        outcome
    }

    /// Number of invocations abandoned due to timeouts so far.
    #[cfg(test)]
    pub(crate) fn abandoned(&self) -> usize {
        self.pool.abandoned()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {msg}")
    } else {
        "handler panicked".to_string()
    }
}
