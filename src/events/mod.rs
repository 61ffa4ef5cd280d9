//! Event data model: immutable events and topic patterns.
//!
//! ## Contents
//! - [`Event`], [`Properties`] — the immutable (topic, properties) value
//!   published on the bus, plus the well-known enrichment property names
//!   [`TIMESTAMP_PROPERTY`] / [`SUBJECT_PROPERTY`]
//! - [`TopicPattern`] — validated topic patterns (exact, `prefix/*`, `*`)
//!   with pure, lock-free matching
//!
//! Pattern validation happens once, at registration or at
//! [`EventBus::start`](crate::EventBus::start); matching during delivery is
//! side-effect free.

mod event;
mod topic;

pub use event::{Event, Properties, SUBJECT_PROPERTY, TIMESTAMP_PROPERTY};
pub use topic::TopicPattern;
