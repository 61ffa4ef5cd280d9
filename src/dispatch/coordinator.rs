//! # Delivery coordinator: admission, enrichment, and the per-event loop.
//!
//! The [`Coordinator`] owns the delivery contracts on top of the registry
//! and the timeout supervisor:
//!
//! ```text
//! send(event) ──► admit() ─── ignore-topic? ──► drop (no handler sees it)
//!                   │
//!                   ▼ enrich (timestamp/subject, never overwriting)
//!               deliver()
//!                   ├─ registry.candidates_for(event)   (resolved ONCE)
//!                   └─ for each candidate, sequentially:
//!                        supervisor.invoke()
//!                          ├─ Completed → next
//!                          ├─ Failed    → logged, next
//!                          └─ TimedOut  → blacklist (unless exempt), next
//! ```
//!
//! ## Rules
//! - Candidates are resolved once per event, up front; registry changes
//!   after resolution do not affect the event in flight.
//! - Invocations for one event run sequentially; when `deliver` returns,
//!   every candidate has produced an outcome (timed-out ones included).
//! - No ordering guarantee across candidates.
//! - Nothing a handler does propagates to the publisher.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::BusConfig;
use crate::events::{Event, TopicPattern, SUBJECT_PROPERTY, TIMESTAMP_PROPERTY};
use crate::handlers::{HandlerRegistry, Registration};

use super::supervisor::{DeliveryOutcome, DeliverySupervisor};

/// Source of the ambient caller identity used for `subject` enrichment.
///
/// Consumed from the hosting environment; only queried when
/// [`BusConfig::add_subject`] is enabled.
pub trait SubjectProvider: Send + Sync + 'static {
    /// The current subject, if any ambient identity exists.
    fn subject(&self) -> Option<String>;
}

/// Implements the delivery contracts for one started bus instance.
pub(crate) struct Coordinator {
    registry: Arc<HandlerRegistry>,
    supervisor: DeliverySupervisor,
    config: BusConfig,
    ignore_topics: Vec<TopicPattern>,
    subject: Option<Arc<dyn SubjectProvider>>,
}

impl Coordinator {
    pub(crate) fn new(
        registry: Arc<HandlerRegistry>,
        supervisor: DeliverySupervisor,
        config: BusConfig,
        ignore_topics: Vec<TopicPattern>,
        subject: Option<Arc<dyn SubjectProvider>>,
    ) -> Self {
        Self {
            registry,
            supervisor,
            config,
            ignore_topics,
            subject,
        }
    }

    /// Synchronous delivery: admission plus the full sequential loop.
    ///
    /// Returns only when every resolved candidate has completed, failed, or
    /// been timed out and detached.
    pub(crate) async fn send(&self, event: Event) {
        if let Some(event) = self.admit(event) {
            self.deliver(event).await;
        }
    }

    /// Ignore-topic short-circuit and enrichment.
    ///
    /// `None` means the event is dropped: no candidate resolution, no
    /// handler invocation, no blacklisting logic.
    pub(crate) fn admit(&self, event: Event) -> Option<Event> {
        if self.ignore_topics.iter().any(|p| p.matches(event.topic())) {
            debug!(topic = event.topic(), "event dropped by ignore-topic rule");
            return None;
        }
        Some(self.enrich(event))
    }

    /// Delivers an admitted event to every matching candidate.
    pub(crate) async fn deliver(&self, event: Event) {
        let candidates = self.registry.candidates_for(&event);
        if candidates.is_empty() {
            return;
        }
        debug!(
            topic = event.topic(),
            candidates = candidates.len(),
            "delivering event"
        );
        for registration in candidates {
            match self.supervisor.invoke(&registration, event.clone()).await {
                DeliveryOutcome::Completed => {}
                // Already logged by the supervisor; isolation means we just
                // move on to the next candidate.
                DeliveryOutcome::Failed(_) => {}
                DeliveryOutcome::TimedOut => self.on_timeout(&registration),
            }
        }
    }

    fn on_timeout(&self, registration: &Arc<Registration>) {
        if self.config.is_timeout_exempt(registration.name()) {
            warn!(
                handler = registration.name(),
                id = %registration.id(),
                "handler exceeded its deadline (timeout-exempt, not blacklisted)"
            );
            return;
        }
        if self.registry.blacklist(registration.id()) {
            warn!(
                handler = registration.name(),
                id = %registration.id(),
                "handler exceeded its deadline; blacklisted"
            );
        }
    }

    fn enrich(&self, mut event: Event) -> Event {
        if self.config.add_timestamp {
            event = event.with_property_if_absent(TIMESTAMP_PROPERTY, Event::timestamp_now());
        }
        if self.config.add_subject {
            if let Some(subject) = self.subject.as_ref().and_then(|s| s.subject()) {
                event = event.with_property_if_absent(SUBJECT_PROPERTY, subject);
            }
        }
        event
    }
}
