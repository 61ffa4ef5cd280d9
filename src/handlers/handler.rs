//! # Core handler trait
//!
//! [`Handle`] is the extension point for subscribers: a single async method
//! invoked once per matching event. The delivery layer runs each invocation
//! on a pooled worker, so implementations may be slow without blocking the
//! publisher — but one that *hangs* past the configured deadline gets its
//! registration blacklisted.
//!
//! ## Contract
//! - An `Err` return is the handler's own business: it is logged and
//!   swallowed, other handlers still receive the event, and the handler is
//!   **not** blacklisted.
//! - Panics are caught and treated like an `Err` return.
//! - Exceeding the delivery deadline detaches the worker and blacklists the
//!   registration (unless it is timeout-exempt).

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::Event;

/// Contract for event handlers.
///
/// Called from a pooled worker task. Implementations should prefer async
/// I/O and cooperative waits; blocking the thread still works but eats a
/// worker for the duration.
#[async_trait]
pub trait Handle: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Shared handle to a handler, as stored in the registry.
pub type HandlerRef = Arc<dyn Handle>;

/// Function-backed handler implementation.
///
/// Wraps a closure that *creates* a new future per invocation. The closure
/// receives an owned [`Event`] clone (cheap: `Arc`-backed), which keeps the
/// produced future `'static`.
///
/// ## Example
/// ```rust
/// use topicbus::{Event, HandlerFn, HandlerRef};
///
/// let h: HandlerRef = HandlerFn::arc(|ev: Event| async move {
///     println!("got {}", ev.topic());
///     Ok(())
/// });
/// ```
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> HandlerFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    /// Creates the handler and returns it as a shared [`HandlerRef`].
    pub fn arc(f: F) -> HandlerRef {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Handle for HandlerFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn on_event(&self, event: &Event) -> Result<(), HandlerError> {
        (self.f)(event.clone()).await
    }
}
