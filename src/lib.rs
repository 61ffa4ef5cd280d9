//! # topicbus
//!
//! **topicbus** is an in-process publish/subscribe event bus for Rust.
//!
//! Publishers hand the bus immutable, topic-addressed [`Event`]s; the bus
//! delivers them to every registered handler whose topic patterns and
//! optional property filter match. A handler that *hangs* past the
//! configured deadline is detached and blacklisted so it can never stall
//! the bus again; a handler that merely *fails* is logged and left alone.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  Publishers (many):
//!    send(event) ──┐                       ┌► HandlerRegistry
//!    post(event) ──┤                       │   (patterns + filters + blacklist)
//!                  ▼                       │
//!        ┌───────────────────────────────────────────────┐
//!        │  EventBus (facade)                            │
//!        │  - ignore-topic admission                     │
//!        │  - enrichment (timestamp / subject)           │
//!        │  - post queue (FIFO) + dispatcher task        │
//!        └──────────────────┬────────────────────────────┘
//!                           ▼
//!        ┌───────────────────────────────────────────────┐
//!        │  Coordinator (per-event delivery loop)        │
//!        │  - resolve candidates once per event          │
//!        │  - invoke each sequentially via Supervisor    │
//!        │  - blacklist on timeout (unless exempt)       │
//!        └──────────────────┬────────────────────────────┘
//!                           ▼
//!        ┌───────────────────────────────────────────────┐
//!        │  DeliverySupervisor + WorkerPool              │
//!        │  - one pooled worker per invocation           │
//!        │  - race against deadline                      │
//!        │  - on expiry: detach worker, obtain           │
//!        │    replacement slot, report TimedOut          │
//!        └──────────────────┬────────────────────────────┘
//!                           ▼
//!                handler.on_event(&event)
//! ```
//!
//! ### Delivery contracts
//! ```text
//! send(event)   blocking: resolves candidates at call time, returns only
//!               after every candidate completed / failed / timed out.
//!               No ordering across candidates.
//!
//! post(event)   fire-and-forget: returns immediately; candidates resolved
//!               when the dispatcher processes the event (last-moment
//!               registrations are visible). FIFO per submitter.
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                       |
//! |-------------------|---------------------------------------------------------------|------------------------------------------|
//! | **Events**        | Immutable topic + property values, validated at construction. | [`Event`], [`Properties`]                |
//! | **Patterns**      | Exact, `prefix/*`, and bare `*` topic matching.               | [`TopicPattern`]                         |
//! | **Handlers**      | Single-method async subscriber abstraction.                   | [`Handle`], [`HandlerFn`], [`HandlerRef`]|
//! | **Registry**      | Concurrent add/remove/lookup with per-instance blacklist.     | [`HandlerRegistry`], [`Subscription`]    |
//! | **Filters**       | Optional predicate over event properties.                     | [`PropertyFilter`]                       |
//! | **Fault isolation**| Deadline + blacklist for hung handlers; errors swallowed.    | [`BusConfig`], [`HandlerError`]          |
//! | **Lifecycle**     | `start`/`stop` driven by the hosting environment.             | [`EventBus`]                             |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use topicbus::{
//!     BusConfig, Event, EventBus, HandlerFn, PropertyFilter, Subscription, TopicPattern,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::new();
//!
//!     bus.register(
//!         Subscription::new(
//!             "alerts",
//!             HandlerFn::arc(|ev: Event| async move {
//!                 println!("alert on {}: {:?}", ev.topic(), ev.properties());
//!                 Ok(())
//!             }),
//!         )
//!         .with_pattern(TopicPattern::parse("alarm/*")?)
//!         .with_filter(PropertyFilter::property_equals("level", "high")),
//!     )?;
//!
//!     let mut cfg = BusConfig::default();
//!     cfg.timeout = Duration::from_secs(2);
//!     bus.start(cfg)?;
//!
//!     // Blocking delivery: returns once the handler is done (or timed out).
//!     bus.send(Event::new("alarm/engine")?.with_property("level", "high")).await;
//!
//!     // Fire-and-forget delivery.
//!     bus.post(Event::new("alarm/cabin")?.with_property("level", "high"));
//!
//!     bus.stop();
//!     Ok(())
//! }
//! ```

mod bus;
mod config;
mod dispatch;
mod error;
mod events;
mod handlers;

// ---- Public re-exports ----

pub use bus::EventBus;
pub use config::BusConfig;
pub use dispatch::SubjectProvider;
pub use error::{BusError, HandlerError};
pub use events::{Event, Properties, TopicPattern, SUBJECT_PROPERTY, TIMESTAMP_PROPERTY};
pub use handlers::{
    Handle, HandlerFn, HandlerId, HandlerInfo, HandlerRef, HandlerRegistry, PropertyFilter,
    Registration, Subscription,
};
