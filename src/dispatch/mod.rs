//! Delivery machinery: worker pool, timeout supervision, and coordination.
//!
//! Internal modules:
//! - [`pool`]: bounded execution slots with the detach-and-replace path;
//! - [`supervisor`]: races one handler invocation against the deadline and
//!   classifies the outcome;
//! - [`coordinator`]: ignore-topic admission, enrichment, candidate
//!   resolution, and the sequential per-event delivery loop.
//!
//! The only public API from this module is [`SubjectProvider`]; everything
//! else is wired together by the [`EventBus`](crate::EventBus) facade.

mod coordinator;
mod pool;
mod supervisor;

pub use coordinator::SubjectProvider;

pub(crate) use coordinator::Coordinator;
pub(crate) use pool::WorkerPool;
pub(crate) use supervisor::DeliverySupervisor;
