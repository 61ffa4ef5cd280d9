//! Subscriber side of the bus: the handler trait, filters, and the registry.
//!
//! ## Contents
//! - [`Handle`], [`HandlerRef`], [`HandlerFn`] — the single-method handler
//!   abstraction and its closure-backed implementation
//! - [`PropertyFilter`] — optional secondary predicate over event properties
//! - [`HandlerRegistry`], [`Subscription`], [`Registration`], [`HandlerId`],
//!   [`HandlerInfo`] — the concurrent index delivery resolves candidates
//!   from, including the per-instance blacklist
//!
//! ## Quick reference
//! - **Writers**: the hosting discovery layer (`register` / `reregister` /
//!   `unregister`) and the delivery coordinator (`blacklist`).
//! - **Readers**: the delivery coordinator (`candidates_for`) and
//!   administrative tooling (`list`).

mod filter;
mod handler;
mod registry;

pub use filter::PropertyFilter;
pub use handler::{Handle, HandlerFn, HandlerRef};
pub use registry::{HandlerId, HandlerInfo, HandlerRegistry, Registration, Subscription};
